//! System prompt assembly.
//!
//! The dispatcher never concatenates strings by hand; it fills in a
//! [`PromptContext`] and calls [`render_system_prompt`], which is pure and
//! therefore easy to test.

use std::path::Path;

use anyhow::Context as _;

/// Built-in web-scraping system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("system_prompt.md");

/// Heading that introduces the carried-over session summary.
pub const SESSION_CONTEXT_HEADING: &str = "## Previous session context";

/// Per-call inputs to the system prompt.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    /// Summary stored for this session by the previous successful call.
    pub prior_summary: Option<serde_json::Value>,
}

impl PromptContext {
    pub fn with_summary(summary: serde_json::Value) -> Self {
        Self {
            prior_summary: Some(summary),
        }
    }
}

/// Render the system prompt for one agent call.
///
/// With a prior summary, a context block is prepended to `base`. The
/// summary is included verbatim: strings as-is, anything else as
/// pretty-printed JSON. Without one, `base` is returned unchanged.
pub fn render_system_prompt(base: &str, ctx: &PromptContext) -> String {
    let Some(summary) = ctx.prior_summary.as_ref() else {
        return base.to_string();
    };

    let rendered = match summary {
        serde_json::Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };

    format!(
        "{SESSION_CONTEXT_HEADING}\n\
         This conversation continues an earlier session. Summary of the work so far:\n\n\
         {rendered}\n\n\
         ---\n\n\
         {base}"
    )
}

/// Load the base system prompt: `override_file` when given, otherwise
/// [`DEFAULT_SYSTEM_PROMPT`].
pub async fn load_base_prompt(override_file: Option<&Path>) -> anyhow::Result<String> {
    match override_file {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("read system prompt file {}", path.display()))?;
            tracing::debug!(path = %path.display(), "custom system prompt loaded");
            Ok(text)
        }
        None => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
    }
}
