//! Generic OpenAI-compatible provider.
//!
//! Works with any API that implements the OpenAI chat completions
//! interface: OpenRouter, Ollama, Groq, LM Studio, vLLM, etc.
//!
//! Config example:
//! ```yaml
//! models:
//!   - id: local-llama
//!     provider: openai-compat
//!     model: llama3
//!     endpoint: http://localhost:11434/v1/chat/completions
//!     api_key: $OLLAMA_KEY   # optional, some local servers need none
//! ```

use std::any::Any;

use async_trait::async_trait;
use reqwest::Client;

use super::{ChatMessage, ModelProvider, ProviderResponse, TokenUsage};

/// Provider that talks to any OpenAI-compatible chat completions API.
pub struct OpenAICompatProvider {
    api_key: String,
    endpoint: String,
    model: String,
    client: Client,
    temperature: Option<f32>,
}

impl OpenAICompatProvider {
    /// Create a provider with explicit configuration.
    ///
    /// `api_key` may be empty for local servers that don't require auth.
    pub fn new(endpoint: String, api_key: String, model: String) -> Self {
        Self {
            api_key,
            endpoint,
            model,
            client: super::http_client(),
            temperature: None,
        }
    }

    /// Set the sampling temperature sent with every request.
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl ModelProvider for OpenAICompatProvider {
    async fn send_chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> anyhow::Result<(ProviderResponse, Option<TokenUsage>)> {
        let body = super::completion_body(&self.model, messages, tools, self.temperature);
        super::post_completion(
            &self.client,
            &self.endpoint,
            &self.api_key,
            &body,
            "OpenAI-compat API",
        )
        .await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
