//! Built-in `execute_python_script_from_file` tool: runs a saved script
//! with optional stdin and stores its stdout as a new artifact.
//!
//! The child runs with a cleared environment, a fixed `PATH`, the
//! artifacts directory as working directory, and is killed when the
//! timeout elapses.

use serde_json::{json, Value};
use std::fmt::Write as _;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;

use crate::tools::{handler, str_arg, ToolBox, ToolContext, ToolMeta};

pub const NAME: &str = "execute_python_script_from_file";

const CHILD_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Execute a script file and save its stdout.
///
/// Args: `{ "script_path_file": "…", "input?": "…", "output_extension?": "txt" }`
/// Returns a plain-text report:
///
/// ```text
/// Script executed successfully.
/// Stdout saved to: /abs/path/<id>.json
/// STDERR:
/// ...
/// Exit code: 1
/// ```
///
/// The `STDERR` and `Exit code` sections only appear when non-empty or
/// non-zero. A timeout is an error.
pub async fn execute_script(ctx: &ToolContext, args: Value) -> anyhow::Result<Value> {
    let raw = str_arg(&args, NAME, "script_path_file")?;
    let input = args.get("input").and_then(Value::as_str).map(str::to_owned);
    let ext = args
        .get("output_extension")
        .and_then(Value::as_str)
        .unwrap_or("txt");

    let script = ctx.resolve(raw)?;
    if !tokio::fs::try_exists(&script).await.unwrap_or(false) {
        anyhow::bail!("File '{raw}' does not exist");
    }
    // Validate before spawning so a bad extension doesn't waste a run.
    let out_path = ctx.new_artifact_path(ext)?;

    let settings = &ctx.settings;
    let workdir = &settings.artifacts_dir;
    tracing::info!(
        script = %script.display(),
        interpreter = %settings.script_interpreter,
        has_input = input.is_some(),
        "executing script"
    );

    let mut child = tokio::process::Command::new(&settings.script_interpreter)
        .arg(&script)
        .current_dir(workdir)
        .env_clear()
        .env("PATH", CHILD_PATH)
        .env("HOME", workdir.to_string_lossy().to_string())
        .env("PYTHONIOENCODING", "utf-8")
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| anyhow::anyhow!("{NAME}: spawn failed: {e}"))?;

    // Feed stdin from a separate task so a script that writes before it
    // reads cannot deadlock against a full pipe.
    if let (Some(data), Some(mut stdin)) = (input, child.stdin.take()) {
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(data.as_bytes()).await {
                tracing::debug!(error = %e, "script closed stdin early");
            }
        });
    }

    let timeout = settings.script_timeout;
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| anyhow::anyhow!("{NAME}: {e}"))?,
        Err(_elapsed) => {
            tracing::warn!(script = %script.display(), "script timed out");
            anyhow::bail!(
                "Script execution timed out ({} seconds)",
                timeout.as_secs()
            );
        }
    };

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    let mut report = String::from("Script executed successfully.\n");
    if stdout.is_empty() {
        report.push_str("No stdout output to save.\n");
    } else {
        tokio::fs::write(&out_path, stdout.as_bytes())
            .await
            .map_err(|e| anyhow::anyhow!("{NAME}: cannot write {}: {e}", out_path.display()))?;
        let _ = writeln!(report, "Stdout saved to: {}", out_path.display());
    }
    if !stderr.is_empty() {
        let _ = writeln!(report, "STDERR:\n{stderr}");
    }
    if code != 0 {
        let _ = writeln!(report, "Exit code: {code}");
    }

    tracing::info!(
        script = %script.display(),
        exit_code = code,
        stdout_bytes = stdout.len(),
        stderr_bytes = stderr.len(),
        "script finished"
    );
    Ok(Value::String(report))
}

pub fn register(tb: &mut ToolBox) {
    tb.register(
        ToolMeta {
            name: NAME.into(),
            description: "Execute a Python script file with optional stdin input and save its stdout to a new file. Returns a report with the output file path, stderr and exit code.".into(),
            args_schema: json!({
                "type": "object",
                "properties": {
                    "script_path_file": {
                        "type": "string",
                        "description": "Absolute path of the script file (as returned by save_content_to_file)."
                    },
                    "input": {
                        "type": "string",
                        "description": "Optional text passed to the script on stdin, e.g. comma-separated file paths."
                    },
                    "output_extension": {
                        "type": "string",
                        "description": "Extension of the stdout file, e.g. \"json\". Default: \"txt\"."
                    }
                },
                "required": ["script_path_file"],
                "additionalProperties": false
            }),
        },
        handler(|args, ctx| async move { execute_script(&ctx, args).await }),
    );
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::tools::ToolSettings;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Context that runs scripts through `sh` so tests don't need Python.
    fn ctx(dir: &TempDir, timeout: Duration) -> ToolContext {
        let mut settings = ToolSettings::with_artifacts_dir(dir.path());
        settings.script_interpreter = "sh".into();
        settings.script_timeout = timeout;
        ToolContext {
            settings,
            http: reqwest::Client::new(),
        }
    }

    fn script(dir: &TempDir, body: &str) -> String {
        let p = dir.path().join("s.sh");
        std::fs::write(&p, body).unwrap();
        p.canonicalize().unwrap().to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn stdout_is_saved_and_reported() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "echo '{\"ok\": true}'\n");
        let out = execute_script(
            &ctx(&dir, Duration::from_secs(10)),
            json!({"script_path_file": path, "output_extension": "json"}),
        )
        .await
        .unwrap();
        let report = out.as_str().unwrap();
        assert!(report.starts_with("Script executed successfully.\n"));
        let saved = report
            .lines()
            .find_map(|l| l.strip_prefix("Stdout saved to: "))
            .unwrap();
        assert!(saved.ends_with(".json"));
        assert_eq!(std::fs::read_to_string(saved).unwrap().trim(), "{\"ok\": true}");
        assert!(!report.contains("Exit code"));
    }

    #[tokio::test]
    async fn stdin_is_forwarded() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "cat\n");
        let out = execute_script(
            &ctx(&dir, Duration::from_secs(10)),
            json!({"script_path_file": path, "input": "a.html,b.html"}),
        )
        .await
        .unwrap();
        let saved = out
            .as_str()
            .unwrap()
            .lines()
            .find_map(|l| l.strip_prefix("Stdout saved to: "))
            .map(str::to_owned)
            .unwrap();
        assert_eq!(std::fs::read_to_string(saved).unwrap(), "a.html,b.html");
    }

    #[tokio::test]
    async fn stderr_and_exit_code_reported() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "echo boom >&2\nexit 3\n");
        let out = execute_script(
            &ctx(&dir, Duration::from_secs(10)),
            json!({"script_path_file": path}),
        )
        .await
        .unwrap();
        let report = out.as_str().unwrap();
        assert!(report.contains("No stdout output to save."));
        assert!(report.contains("STDERR:\nboom"));
        assert!(report.contains("Exit code: 3"));
    }

    #[tokio::test]
    async fn timeout_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "sleep 5\n");
        let err = execute_script(
            &ctx(&dir, Duration::from_secs(1)),
            json!({"script_path_file": path}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Script execution timed out (1 seconds)");
    }

    #[tokio::test]
    async fn script_outside_artifacts_rejected() {
        let dir = TempDir::new().unwrap();
        let err = execute_script(
            &ctx(&dir, Duration::from_secs(1)),
            json!({"script_path_file": "/etc/hostname"}),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("escapes"));
    }
}
