use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from `config.yaml`.
///
/// Every section has defaults, so an empty file (or no file at all, see
/// [`Config::load_or_default`]) is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Model provider definitions.
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    /// Agent / tool-loop settings.
    #[serde(default)]
    pub agent: AgentSettings,
    /// Tool sandbox settings.
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Session store backend.
    #[serde(default)]
    pub sessions: SessionsConfig,
    /// HTTP front door.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// A configured LLM provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Unique identifier for this provider entry (e.g. "openai-default").
    pub id: String,
    /// Provider kind: "openai", "openai-compat", "groq", "ollama", "openrouter".
    pub provider: String,
    /// Model name to request (e.g. "gpt-5-mini").
    #[serde(default)]
    pub model: Option<String>,
    /// API key (plain text or env-var reference like `$OPENAI_API_KEY`).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Chat-completions endpoint URL. Required for `openai-compat`.
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Settings for the agent that runs the tool loop.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentSettings {
    /// Which model config id the agent uses. `None` picks the first entry
    /// in `models`, or an OpenAI default when `models` is empty.
    #[serde(default)]
    pub model: Option<String>,
    /// Ordered list of fallback model config ids.
    #[serde(default)]
    pub fallback_models: Vec<String>,
    /// Maximum tool-call iterations per conversation.
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,
    /// Attempts per provider before falling back to the next one.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Sampling temperature. Omitted from requests when unset.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Inject the stored session summary into the next call's system prompt.
    #[serde(default = "default_true")]
    pub reuse_session_context: bool,
    /// Replace the built-in system prompt with the contents of this file.
    #[serde(default)]
    pub system_prompt_file: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: None,
            fallback_models: Vec::new(),
            max_tool_iterations: default_max_tool_iterations(),
            max_retries: default_max_retries(),
            temperature: None,
            reuse_session_context: true,
            system_prompt_file: None,
        }
    }
}

/// Tool sandbox configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Directory where tools create and read artifacts. Relative paths are
    /// resolved against the scrapeflow home. Default: `<home>/temp`.
    #[serde(default)]
    pub artifacts_dir: Option<String>,
    /// Interpreter used by `execute_python_script_from_file`.
    #[serde(default = "default_interpreter")]
    pub script_interpreter: String,
    /// Scripts are killed after this many seconds.
    #[serde(default = "default_script_timeout")]
    pub script_timeout_secs: u64,
    /// Page fetch timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// User-Agent header sent when fetching pages.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Upper bound on bytes returned by `read_file_content`.
    #[serde(default = "default_max_read_bytes")]
    pub max_read_bytes: usize,
    /// How `scrape_url_to_file` obtains page HTML.
    #[serde(default)]
    pub fetch_backend: FetchBackend,
    /// Time a rendered page is given to settle after navigation, in ms.
    #[serde(default = "default_render_settle_ms")]
    pub render_settle_ms: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: None,
            script_interpreter: default_interpreter(),
            script_timeout_secs: default_script_timeout(),
            fetch_timeout_secs: default_fetch_timeout(),
            user_agent: default_user_agent(),
            max_read_bytes: default_max_read_bytes(),
            fetch_backend: FetchBackend::default(),
            render_settle_ms: default_render_settle_ms(),
        }
    }
}

impl ToolsConfig {
    /// Resolved artifacts directory.
    pub fn artifacts_dir(&self) -> PathBuf {
        match self.artifacts_dir.as_deref() {
            Some(dir) => resolve_against_home(dir),
            None => crate::scrapeflow_home().join("temp"),
        }
    }
}

/// Page fetch strategy for `scrape_url_to_file`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchBackend {
    /// Headless Chromium render, falling back to a plain GET.
    #[default]
    Browser,
    /// Plain GET only.
    Http,
}

/// Which [`SessionStore`](crate::session::SessionStore) backs the dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    /// Process-lifetime map.
    #[default]
    Memory,
    /// JSONL append log on disk.
    File,
}

/// Session store configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionsConfig {
    #[serde(default)]
    pub backend: SessionBackend,
    /// Log file for the `file` backend. Default: `<home>/sessions.jsonl`.
    #[serde(default)]
    pub path: Option<String>,
}

impl SessionsConfig {
    /// Resolved path of the JSONL session log.
    pub fn path(&self) -> PathBuf {
        match self.path.as_deref() {
            Some(p) => resolve_against_home(p),
            None => crate::scrapeflow_home().join("sessions.jsonl"),
        }
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Listen address.
    #[serde(default = "default_gateway_addr")]
    pub addr: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            addr: default_gateway_addr(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_tool_iterations() -> usize {
    25
}

fn default_max_retries() -> usize {
    2
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_script_timeout() -> u64 {
    60
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/116.0.0.0 Safari/537.36".to_string()
}

fn default_max_read_bytes() -> usize {
    512 * 1024
}

fn default_render_settle_ms() -> u64 {
    5_000
}

fn default_gateway_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn resolve_against_home(raw: &str) -> PathBuf {
    let p = Path::new(raw);
    if p.is_relative() {
        crate::scrapeflow_home().join(p)
    } else {
        p.to_path_buf()
    }
}

impl Config {
    /// Read and parse a YAML configuration file.
    pub async fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config = Self::from_yaml(&contents)?;

        tracing::debug!(
            path = %path.display(),
            models = config.models.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Like [`load`](Config::load), but a missing file yields the
    /// built-in defaults instead of an error.
    pub async fn load_or_default(path: &Path) -> anyhow::Result<Config> {
        match tokio::fs::metadata(path).await {
            Ok(_) => Self::load(path).await,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "config file not found, using built-in defaults"
                );
                Ok(Config::default())
            }
            Err(e) => Err(e).with_context(|| format!("failed to stat {}", path.display())),
        }
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(contents: &str) -> anyhow::Result<Config> {
        // An empty document deserialises to `null`, which serde rejects
        // for a struct; treat it as "all defaults".
        if contents.trim().is_empty() {
            return Ok(Config::default());
        }
        let config: Config =
            serde_yaml_ng::from_str(contents).context("failed to parse config YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate semantic constraints that serde cannot enforce.
    fn validate(&self) -> anyhow::Result<()> {
        use std::collections::HashSet;

        let model_ids: HashSet<&str> = self.models.iter().map(|m| m.id.as_str()).collect();
        if model_ids.len() != self.models.len() {
            anyhow::bail!("config: duplicate model IDs detected");
        }

        if let Some(ref model) = self.agent.model {
            if !model_ids.contains(model.as_str()) {
                anyhow::bail!("config: agent references unknown model '{model}'");
            }
        }
        for fb in &self.agent.fallback_models {
            if !model_ids.contains(fb.as_str()) {
                anyhow::bail!("config: agent fallback references unknown model '{fb}'");
            }
        }

        if self.agent.max_tool_iterations == 0 {
            anyhow::bail!("config: agent.max_tool_iterations must be at least 1");
        }
        if self.tools.script_timeout_secs == 0 || self.tools.fetch_timeout_secs == 0 {
            anyhow::bail!("config: tool timeouts must be greater than zero");
        }
        if self.tools.script_interpreter.trim().is_empty() {
            anyhow::bail!("config: tools.script_interpreter is empty");
        }

        Ok(())
    }
}
