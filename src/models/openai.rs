//! OpenAI chat-completions provider.

use std::any::Any;

use async_trait::async_trait;
use reqwest::Client;

use super::{ChatMessage, ModelProvider, ProviderResponse, TokenUsage};

/// Default endpoint for OpenAI chat completions.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Provider that talks to the OpenAI chat completions API.
pub struct OpenAIProvider {
    api_key: String,
    endpoint: String,
    client: Client,
    /// Model name sent in the request body (e.g. "gpt-5-mini").
    model: String,
    temperature: Option<f32>,
}

impl OpenAIProvider {
    /// Create a provider with explicit configuration (useful for tests
    /// or non-default endpoints).
    pub fn with_config(api_key: String, endpoint: String, model: String) -> Self {
        Self {
            api_key,
            endpoint,
            client: super::http_client(),
            model,
            temperature: None,
        }
    }

    /// Set the sampling temperature sent with every request.
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> anyhow::Result<(ProviderResponse, Option<TokenUsage>)> {
        let body = super::completion_body(&self.model, messages, tools, self.temperature);
        super::post_completion(&self.client, &self.endpoint, &self.api_key, &body, "OpenAI API")
            .await
    }
}

#[async_trait]
impl ModelProvider for OpenAIProvider {
    async fn send_chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> anyhow::Result<(ProviderResponse, Option<TokenUsage>)> {
        self.complete(messages, tools).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
