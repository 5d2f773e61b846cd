//! Built-in `read_file_content` tool: returns the content of an artifact.

use serde_json::{json, Value};

use crate::tools::{handler, str_arg, ToolBox, ToolContext, ToolMeta};
use crate::utils::truncate_utf8_owned;

pub const NAME: &str = "read_file_content";

/// Read a file inside the artifacts directory.
///
/// Args: `{ "file_path": "…" }`
/// Returns the file content as a string. Content beyond
/// `max_read_bytes` is cut and a marker line appended.
pub async fn read_file_content(ctx: &ToolContext, args: Value) -> anyhow::Result<Value> {
    let raw = str_arg(&args, NAME, "file_path")?;
    let path = ctx.resolve(raw)?;

    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        anyhow::bail!("File '{raw}' does not exist");
    }

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| anyhow::anyhow!("{NAME}: cannot read {}: {e}", path.display()))?;
    let total = bytes.len();
    let content = String::from_utf8_lossy(&bytes).into_owned();

    let max = ctx.settings.max_read_bytes;
    if total > max {
        let mut cut = truncate_utf8_owned(content, max);
        cut.push_str(&format!("\n[... truncated, file is {total} bytes]"));
        tracing::debug!(path = %path.display(), total, max, "read truncated");
        return Ok(Value::String(cut));
    }

    tracing::debug!(path = %path.display(), bytes = total, "file read");
    Ok(Value::String(content))
}

pub fn register(tb: &mut ToolBox) {
    tb.register(
        ToolMeta {
            name: NAME.into(),
            description: "Read and return the content of a file created by the other tools.".into(),
            args_schema: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Absolute path of the file to read (as returned by another tool)."
                    }
                },
                "required": ["file_path"],
                "additionalProperties": false
            }),
        },
        handler(|args, ctx| async move { read_file_content(&ctx, args).await }),
    );
}
