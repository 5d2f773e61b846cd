//! Tool collaborator: the named operations the agent can invoke.
//!
//! A [`ToolBox`] owns the tool metadata, the async handlers, and the
//! shared [`ToolContext`] (settings plus an HTTP client). Every file a
//! tool creates or reads lives inside the artifacts directory.

pub mod builtins;
pub mod fetch;

use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tracing::{debug, info, warn};

use crate::config::{FetchBackend, ToolsConfig};

// ── Tool metadata ────────────────────────────────────────────

/// Metadata describing a tool available to the agent.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolMeta {
    /// Machine-friendly name (e.g. `"read_file_content"`).
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON Schema object describing the expected `args` value.
    pub args_schema: Value,
}

impl ToolMeta {
    /// OpenAI `tools` entry for this tool.
    pub fn function_def(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.args_schema,
            }
        })
    }
}

/// Async handler function that tools register for dispatch.
pub type ToolHandler = Arc<
    dyn Fn(Value, Arc<ToolContext>) -> Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>
        + Send
        + Sync,
>;

/// Wrap an async function or closure as a [`ToolHandler`].
pub fn handler<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(Value, Arc<ToolContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(
        move |args, ctx| -> Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>> {
            Box::pin(f(args, ctx))
        },
    )
}

// ── Settings / context ───────────────────────────────────────

/// Resolved tool settings.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub artifacts_dir: PathBuf,
    pub script_interpreter: String,
    pub script_timeout: Duration,
    pub fetch_timeout: Duration,
    pub user_agent: String,
    pub max_read_bytes: usize,
    pub fetch_backend: FetchBackend,
    pub render_settle: Duration,
}

impl ToolSettings {
    pub fn from_config(cfg: &ToolsConfig) -> Self {
        Self {
            artifacts_dir: cfg.artifacts_dir(),
            script_interpreter: cfg.script_interpreter.clone(),
            script_timeout: Duration::from_secs(cfg.script_timeout_secs),
            fetch_timeout: Duration::from_secs(cfg.fetch_timeout_secs),
            user_agent: cfg.user_agent.clone(),
            max_read_bytes: cfg.max_read_bytes,
            fetch_backend: cfg.fetch_backend,
            render_settle: Duration::from_millis(cfg.render_settle_ms),
        }
    }

    /// Defaults with a custom artifacts directory.
    pub fn with_artifacts_dir(dir: impl Into<PathBuf>) -> Self {
        let mut s = Self::from_config(&ToolsConfig::default());
        s.artifacts_dir = dir.into();
        s
    }
}

/// State shared by every tool invocation.
#[derive(Debug)]
pub struct ToolContext {
    pub settings: ToolSettings,
    pub http: reqwest::Client,
}

impl ToolContext {
    /// Absolute path of a fresh artifact file with the given extension.
    ///
    /// Names are `<uuid-hex>.<ext>`; a leading `.` on `ext` is ignored.
    pub fn new_artifact_path(&self, extension: &str) -> anyhow::Result<PathBuf> {
        let ext = extension.trim().trim_start_matches('.');
        if ext.is_empty() || ext.len() > 16 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            anyhow::bail!("invalid file extension: {extension:?}");
        }
        let name = format!("{}.{ext}", uuid::Uuid::new_v4().simple());
        Ok(self.artifacts_root()?.join(name))
    }

    /// Resolve a tool-supplied path inside the artifacts directory.
    pub fn resolve(&self, raw: &str) -> anyhow::Result<PathBuf> {
        sandbox_path(&self.settings.artifacts_dir, raw)
    }

    fn artifacts_root(&self) -> anyhow::Result<PathBuf> {
        self.settings.artifacts_dir.canonicalize().with_context(|| {
            format!(
                "artifacts dir {} is not accessible",
                self.settings.artifacts_dir.display()
            )
        })
    }
}

// ── ToolBox ──────────────────────────────────────────────────

struct ToolEntry {
    meta: ToolMeta,
    handler: ToolHandler,
}

/// Registry of callable tools plus their shared context.
pub struct ToolBox {
    ctx: Arc<ToolContext>,
    entries: Vec<ToolEntry>,
}

impl ToolBox {
    /// Empty tool box. Creates the artifacts directory if needed.
    pub fn new(settings: ToolSettings) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&settings.artifacts_dir).with_context(|| {
            format!(
                "create artifacts dir {}",
                settings.artifacts_dir.display()
            )
        })?;
        let http = reqwest::Client::builder()
            .timeout(settings.fetch_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(settings.user_agent.clone())
            .build()
            .context("build tool HTTP client")?;
        Ok(Self {
            ctx: Arc::new(ToolContext { settings, http }),
            entries: Vec::new(),
        })
    }

    /// Tool box with the four built-in web-scraping tools registered.
    pub fn with_builtins(settings: ToolSettings) -> anyhow::Result<Self> {
        let mut tb = Self::new(settings)?;
        builtins::register_all(&mut tb);
        info!(
            tools = tb.entries.len(),
            artifacts_dir = %tb.ctx.settings.artifacts_dir.display(),
            "tool box ready"
        );
        Ok(tb)
    }

    /// Register a tool. A later registration with the same name replaces
    /// the earlier one.
    pub fn register(&mut self, meta: ToolMeta, handler: ToolHandler) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.meta.name == meta.name) {
            warn!(tool = %meta.name, "tool re-registered, replacing handler");
            existing.meta = meta;
            existing.handler = handler;
        } else {
            debug!(tool = %meta.name, "tool registered");
            self.entries.push(ToolEntry { meta, handler });
        }
    }

    /// Metadata for every registered tool.
    pub fn list(&self) -> Vec<ToolMeta> {
        self.entries.iter().map(|e| e.meta.clone()).collect()
    }

    /// OpenAI `tools` array for every registered tool.
    pub fn function_defs(&self) -> Vec<Value> {
        self.entries.iter().map(|e| e.meta.function_def()).collect()
    }

    pub fn context(&self) -> &Arc<ToolContext> {
        &self.ctx
    }

    /// Invoke a tool by name.
    pub async fn call(&self, name: &str, args: Value) -> anyhow::Result<Value> {
        let handler = self
            .entries
            .iter()
            .find(|e| e.meta.name == name)
            .map(|e| e.handler.clone())
            .ok_or_else(|| anyhow::anyhow!("unknown tool: {name}"))?;
        handler(args, self.ctx.clone()).await
    }
}

// ── Sandboxing ───────────────────────────────────────────────

/// Resolve `raw` against `root` and ensure the result lives inside it.
///
/// Relative paths are joined onto `root`. Absolute paths are accepted only
/// when they already point inside `root` (tools hand out absolute artifact
/// paths). Any `..` component is rejected outright.
pub fn sandbox_path(root: &Path, raw: &str) -> anyhow::Result<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        anyhow::bail!("empty path");
    }
    let given = Path::new(raw);
    if given
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        anyhow::bail!("path traversal ('..') is not allowed: {raw}");
    }

    let root_canon = root
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("artifacts dir canonicalize failed: {e}"))?;

    let candidate = if given.is_absolute() {
        given.to_path_buf()
    } else {
        root_canon.join(given)
    };

    // The file may not exist yet, so canonicalize the longest existing
    // prefix and re-append the rest.
    let resolved = canon_or_resolve(&candidate)?;

    if !resolved.starts_with(&root_canon) {
        anyhow::bail!(
            "path escapes artifacts dir: {} is not under {}",
            resolved.display(),
            root_canon.display()
        );
    }

    Ok(resolved)
}

/// Best-effort canonicalize: if the full path doesn't exist yet,
/// canonicalize the longest existing prefix and append the rest.
pub(crate) fn canon_or_resolve(p: &Path) -> anyhow::Result<PathBuf> {
    if p.exists() {
        return Ok(p.canonicalize()?);
    }
    let mut existing = p.to_path_buf();
    let mut tail = Vec::new();
    while !existing.exists() {
        if let Some(file) = existing.file_name() {
            tail.push(file.to_os_string());
        } else {
            anyhow::bail!("cannot resolve path: {}", p.display());
        }
        existing = existing
            .parent()
            .ok_or_else(|| anyhow::anyhow!("cannot resolve path: {}", p.display()))?
            .to_path_buf();
    }
    let mut resolved = existing.canonicalize()?;
    for component in tail.into_iter().rev() {
        resolved.push(component);
    }
    Ok(resolved)
}

/// Fetch a required string argument.
pub(crate) fn str_arg<'a>(args: &'a Value, tool: &str, key: &str) -> anyhow::Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("{tool}: missing `{key}` argument"))
}
