//! Model provider abstractions.
//!
//! Defines the [`ModelProvider`] trait, the [`ChatMessage`] type,
//! [`ProviderManager`] for retry/fallback semantics, and the concrete
//! chat-completions backends ([`OpenAIProvider`], [`OpenAICompatProvider`]).

pub mod openai;
pub mod openai_compat;

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::{Config, ModelConfig};

pub use openai::OpenAIProvider;
pub use openai_compat::OpenAICompatProvider;

// ---------------------------------------------------------------------------
// ChatMessage – shared message representation
// ---------------------------------------------------------------------------

/// A single chat message with a role and content.
///
/// Optionally carries OpenAI tool-calling metadata so that
/// `tool` role messages and assistant `tool_calls` responses
/// are serialised correctly for the API.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// For assistant messages that invoke tools: the raw
    /// OpenAI-format `tool_calls` array.
    pub tool_calls: Option<Vec<serde_json::Value>>,
    /// For `role: "tool"` messages: the id of the tool call
    /// this result corresponds to.
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    /// Convenience constructor for a plain message (no tool metadata).
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// A `role: "tool"` message answering the call with `call_id`.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".into(),
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }

    /// The assistant turn that requested `calls`, echoed back to the API.
    pub fn assistant_tool_calls(calls: &[ToolCallItem]) -> Self {
        let raw = calls
            .iter()
            .map(|c| {
                serde_json::json!({
                    "id": c.id,
                    "type": "function",
                    "function": { "name": c.name, "arguments": c.arguments },
                })
            })
            .collect();
        Self {
            role: "assistant".into(),
            content: String::new(),
            tool_calls: Some(raw),
            tool_call_id: None,
        }
    }
}

/// Serialise a slice of [`ChatMessage`]s into the OpenAI-compatible
/// JSON array format, including `tool_calls` and `tool_call_id` when
/// present.
pub fn serialize_messages(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| {
            let mut msg = serde_json::json!({ "role": m.role });
            if let Some(ref tcs) = m.tool_calls {
                msg["tool_calls"] = serde_json::json!(tcs);
                // OpenAI expects content to be null on assistant
                // messages that only carry tool_calls.
                if m.content.is_empty() {
                    msg["content"] = serde_json::Value::Null;
                } else {
                    msg["content"] = serde_json::json!(m.content);
                }
            } else {
                msg["content"] = serde_json::json!(m.content);
            }
            if let Some(ref tcid) = m.tool_call_id {
                msg["tool_call_id"] = serde_json::json!(tcid);
            }
            msg
        })
        .collect()
}

// ---------------------------------------------------------------------------
// ProviderResponse – tool-calling aware response
// ---------------------------------------------------------------------------

/// Token usage statistics returned by the API.
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A single tool call requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCallItem {
    /// Tool call id (from the API).
    pub id: String,
    pub name: String,
    /// Raw JSON-encoded arguments string.
    pub arguments: String,
}

/// Response from a model that may be a final text reply or tool calls.
#[derive(Debug, Clone)]
pub enum ProviderResponse {
    /// Plain text reply from the model.
    Final(String),
    /// The model wants to invoke one or more tools.
    ToolCalls(Vec<ToolCallItem>),
}

// ---------------------------------------------------------------------------
// ModelProvider trait
// ---------------------------------------------------------------------------

/// Trait implemented by every LLM backend.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Send chat messages together with tool definitions
    /// (`{"type": "function", "function": {...}}` objects) and return
    /// either the final reply or the tool calls the model requested.
    async fn send_chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> anyhow::Result<(ProviderResponse, Option<TokenUsage>)>;

    /// Downcast helper.
    fn as_any(&self) -> &dyn Any;
}

/// Extract token usage statistics from an OpenAI-style response JSON.
pub fn parse_token_usage(json: &serde_json::Value) -> Option<TokenUsage> {
    let usage = json.get("usage")?;
    Some(TokenUsage {
        prompt_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0),
        completion_tokens: usage["completion_tokens"].as_u64().unwrap_or(0),
        total_tokens: usage["total_tokens"].as_u64().unwrap_or(0),
    })
}

/// Parse `tool_calls` from an OpenAI-style chat completion response.
///
/// Returns `None` when the first choice carries no tool calls.
pub fn parse_tool_calls(json: &serde_json::Value) -> Option<ProviderResponse> {
    let message = json.get("choices")?.get(0)?.get("message")?;
    let tool_calls = message.get("tool_calls")?.as_array()?;

    let items: Vec<ToolCallItem> = tool_calls
        .iter()
        .filter_map(|tc| {
            let func = tc.get("function")?;
            let name = func.get("name")?.as_str()?.to_string();
            let arguments = func
                .get("arguments")
                .and_then(|a| a.as_str())
                .unwrap_or("{}")
                .to_string();
            let id = tc
                .get("id")
                .and_then(|i| i.as_str())
                .unwrap_or("")
                .to_string();
            Some(ToolCallItem { id, name, arguments })
        })
        .collect();

    if items.is_empty() {
        None
    } else {
        Some(ProviderResponse::ToolCalls(items))
    }
}

// ---------------------------------------------------------------------------
// Shared chat-completions transport
// ---------------------------------------------------------------------------

/// HTTP client with the timeouts every provider uses.
pub(crate) fn http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(180))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Build a chat-completions request body.
pub(crate) fn completion_body(
    model: &str,
    messages: &[ChatMessage],
    tools: &[serde_json::Value],
    temperature: Option<f32>,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": model,
        "messages": serialize_messages(messages),
    });
    if let Some(t) = temperature {
        body["temperature"] = serde_json::json!(t);
    }
    if !tools.is_empty() {
        body["tools"] = serde_json::Value::Array(tools.to_vec());
        body["tool_choice"] = serde_json::json!("auto");
    }
    body
}

/// POST a chat-completions body and decode the reply.
///
/// `label` names the backend in error messages, e.g.
/// `"OpenAI API returned 401 Unauthorized: ..."`.
pub(crate) async fn post_completion(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    body: &serde_json::Value,
    label: &str,
) -> anyhow::Result<(ProviderResponse, Option<TokenUsage>)> {
    let mut req = client.post(endpoint).json(body);
    if !api_key.is_empty() {
        req = req.bearer_auth(api_key);
    }
    let resp = req.send().await?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!("{label} returned {status}: {text}");
    }

    let json: serde_json::Value = resp.json().await?;
    let usage = parse_token_usage(&json);
    if let Some(u) = &usage {
        debug!(
            prompt_tokens = u.prompt_tokens,
            completion_tokens = u.completion_tokens,
            "{label} usage"
        );
    }

    if let Some(pr) = parse_tool_calls(&json) {
        return Ok((pr, usage));
    }

    let content = json["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string();
    Ok((ProviderResponse::Final(content), usage))
}

// ---------------------------------------------------------------------------
// ProviderManager
// ---------------------------------------------------------------------------

type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Manages an ordered list of providers with per-provider retry and
/// automatic fallback to the next provider on exhaustion.
///
/// Implements [`ModelProvider`] itself so it can be used transparently
/// anywhere a single provider is expected.
pub struct ProviderManager {
    providers: Vec<Box<dyn ModelProvider>>,
    max_retries: usize,
}

impl ProviderManager {
    /// Create a new manager.
    ///
    /// * `providers` – ordered list (first = preferred).
    /// * `max_retries` – attempts per provider (clamped to ≥ 1).
    pub fn new(providers: Vec<Box<dyn ModelProvider>>, max_retries: usize) -> Self {
        Self {
            providers,
            max_retries: max_retries.max(1),
        }
    }

    /// Number of configured providers.
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Run `call` against each provider in order.
    ///
    /// Each provider gets up to `max_retries` attempts with exponential
    /// backoff (100 ms × 2^attempt). Permanent errors (400, 401, 403,
    /// 404, 422) skip the remaining attempts for that provider.
    async fn with_retry<'a, T>(
        &'a self,
        call: impl Fn(&'a dyn ModelProvider) -> ProviderFuture<'a, T>,
    ) -> anyhow::Result<T> {
        let attempts = self.max_retries;
        let mut last_err = anyhow::anyhow!("no providers configured");

        for (idx, provider) in self.providers.iter().enumerate() {
            for attempt in 0..attempts {
                match call(provider.as_ref()).await {
                    Ok(reply) => return Ok(reply),
                    Err(e) => {
                        let is_permanent = is_permanent_error(&e);
                        warn!(
                            provider_idx = idx,
                            attempt = attempt + 1,
                            max_attempts = attempts,
                            permanent = is_permanent,
                            error = %e,
                            "provider call failed"
                        );
                        last_err = e;

                        if is_permanent {
                            break;
                        }

                        if attempt + 1 < attempts {
                            let delay = Duration::from_millis(100 * 2u64.pow(attempt as u32));
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
            if idx + 1 < self.providers.len() {
                warn!(provider_idx = idx, "all retries exhausted, trying next provider");
            }
        }

        Err(last_err.context("all providers exhausted"))
    }
}

/// Check if an error represents a permanent HTTP failure that should not
/// be retried (bad request, auth errors, not found, unprocessable).
///
/// Matches status codes in messages like "OpenAI API returned 401 Unauthorized: …".
fn is_permanent_error(err: &anyhow::Error) -> bool {
    let msg = err.to_string();
    ["400", "401", "403", "404", "422"]
        .iter()
        .any(|code| msg.contains(&format!("returned {code}")))
}

#[async_trait]
impl ModelProvider for ProviderManager {
    async fn send_chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> anyhow::Result<(ProviderResponse, Option<TokenUsage>)> {
        self.with_retry(|p| p.send_chat_with_tools(messages, tools))
            .await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Provider factory
// ---------------------------------------------------------------------------

/// Model requested when no `models` are configured.
pub const DEFAULT_MODEL: &str = "gpt-5-mini";

/// Build a concrete provider from a model config entry.
pub fn build_provider(
    mc: &ModelConfig,
    temperature: Option<f32>,
) -> anyhow::Result<Box<dyn ModelProvider>> {
    let model_name = mc.model.as_deref().unwrap_or(&mc.id).to_string();
    let provider_id = mc.provider.as_str();

    if matches!(
        provider_id,
        "openai-compat" | "openai_compat" | "compat" | "openrouter" | "ollama" | "groq"
    ) {
        let Some(endpoint) = mc.endpoint.clone().filter(|e| !e.is_empty()) else {
            anyhow::bail!("model '{}': provider '{provider_id}' requires an endpoint", mc.id);
        };
        let key = resolve_config_key(mc.api_key.as_deref(), provider_id);
        Ok(Box::new(
            OpenAICompatProvider::new(endpoint, key, model_name).with_temperature(temperature),
        ))
    } else if provider_id == "openai" {
        let key = resolve_config_key(mc.api_key.as_deref(), provider_id);
        if key.is_empty() {
            anyhow::bail!("model '{}': no API key (set api_key or OPENAI_API_KEY)", mc.id);
        }
        let endpoint = mc
            .endpoint
            .clone()
            .unwrap_or_else(|| openai::DEFAULT_ENDPOINT.to_string());
        Ok(Box::new(
            OpenAIProvider::with_config(key, endpoint, model_name).with_temperature(temperature),
        ))
    } else {
        anyhow::bail!("model '{}': unknown provider '{provider_id}'", mc.id)
    }
}

/// Build the agent's [`ProviderManager`] from configuration.
///
/// Chains the primary model and `agent.fallback_models` in order. With no
/// `models` configured, uses OpenAI [`DEFAULT_MODEL`] keyed by
/// `OPENAI_API_KEY`.
pub fn build_provider_manager_from_config(cfg: &Config) -> anyhow::Result<ProviderManager> {
    let agent = &cfg.agent;
    let temperature = agent.temperature;

    let default_model;
    let primary = match agent.model.as_deref() {
        Some(id) => cfg
            .models
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| anyhow::anyhow!("agent model '{id}' not found in models"))?,
        None => match cfg.models.first() {
            Some(first) => first,
            None => {
                default_model = ModelConfig {
                    id: "openai-default".into(),
                    provider: "openai".into(),
                    model: Some(DEFAULT_MODEL.into()),
                    api_key: None,
                    endpoint: None,
                };
                &default_model
            }
        },
    };

    let mut providers = vec![build_provider(primary, temperature)?];
    for fb_id in &agent.fallback_models {
        match cfg.models.iter().find(|m| &m.id == fb_id) {
            Some(mc) => providers.push(build_provider(mc, temperature)?),
            None => warn!(model_ref = %fb_id, "fallback model not found in config, skipping"),
        }
    }

    debug!(
        primary = %primary.id,
        providers = providers.len(),
        "provider manager built"
    );
    Ok(ProviderManager::new(providers, agent.max_retries))
}

/// Resolve an API key: config value → `<PROVIDER>_API_KEY` env var → empty.
///
/// If the config value starts with `$`, it's treated as an env-var reference.
fn resolve_config_key(config_key: Option<&str>, provider_id: &str) -> String {
    if let Some(k) = config_key.filter(|k| !k.is_empty()) {
        return crate::utils::resolve_env_ref(k);
    }
    let env_name = format!("{}_API_KEY", provider_id.to_uppercase().replace('-', "_"));
    std::env::var(env_name).unwrap_or_default()
}
