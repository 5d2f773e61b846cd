//! Agent execution: the [`AgentRunner`] seam and the tool-calling loop
//! that implements it on top of a [`ModelProvider`] and a [`ToolBox`].

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::models::{ChatMessage, ModelProvider, ProviderResponse, TokenUsage, ToolCallItem};
use crate::tools::ToolBox;

/// Input to one agent conversation.
#[derive(Debug, Clone)]
pub struct ConversationRequest {
    /// Fully rendered system prompt (session context already injected).
    pub system_prompt: String,
    /// The user's instruction.
    pub instruction: String,
}

/// Runs a tool-using conversation and returns the model's final answer.
///
/// The answer is expected to be JSON, but runners do not check that;
/// interpreting it is the caller's job.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run_tooled_conversation(&self, request: &ConversationRequest)
        -> anyhow::Result<String>;
}

// ---------------------------------------------------------------------------
// ToolLoopAgent
// ---------------------------------------------------------------------------

/// Prefix of the reply produced when the iteration budget runs out.
pub const TOOL_LOOP_EXHAUSTED: &str = "[tool loop exhausted]";

/// Aggregated statistics for one conversation.
#[derive(Debug, Clone, Default)]
struct LoopStats {
    model_calls: u32,
    tool_calls: u32,
    tool_failures: u32,
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl LoopStats {
    fn accumulate(&mut self, usage: Option<&TokenUsage>) {
        self.model_calls += 1;
        if let Some(u) = usage {
            self.prompt_tokens += u.prompt_tokens;
            self.completion_tokens += u.completion_tokens;
        }
    }
}

/// [`AgentRunner`] that alternates model calls and tool invocations
/// until the model produces a plain reply.
pub struct ToolLoopAgent {
    provider: Arc<dyn ModelProvider>,
    tools: Arc<ToolBox>,
    max_tool_iterations: usize,
}

impl ToolLoopAgent {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        tools: Arc<ToolBox>,
        max_tool_iterations: usize,
    ) -> Self {
        Self {
            provider,
            tools,
            max_tool_iterations: max_tool_iterations.max(1),
        }
    }

    /// Execute one tool call, turning failures into an error string the
    /// model can read.
    async fn invoke_tool(&self, call: &ToolCallItem, stats: &mut LoopStats) -> String {
        let args: serde_json::Value =
            serde_json::from_str(&call.arguments).unwrap_or_else(|_| serde_json::json!({}));

        debug!(
            tool = %call.name,
            args = %crate::utils::truncate_str(&call.arguments, 200),
            "invoking tool"
        );
        let timer = std::time::Instant::now();
        let result = self.tools.call(&call.name, args).await;
        stats.tool_calls += 1;

        match result {
            Ok(serde_json::Value::String(s)) => {
                debug!(tool = %call.name, elapsed_ms = timer.elapsed().as_millis() as u64, "tool ok");
                s
            }
            Ok(other) => other.to_string(),
            Err(e) => {
                stats.tool_failures += 1;
                warn!(tool = %call.name, error = %e, "tool execution failed, feeding error back");
                format!("Error: {e}")
            }
        }
    }
}

#[async_trait]
impl AgentRunner for ToolLoopAgent {
    async fn run_tooled_conversation(
        &self,
        request: &ConversationRequest,
    ) -> anyhow::Result<String> {
        let function_defs = self.tools.function_defs();
        let mut messages = vec![
            ChatMessage::new("system", &request.system_prompt),
            ChatMessage::new("user", &request.instruction),
        ];
        let mut stats = LoopStats::default();
        let mut iterations = 0usize;

        loop {
            let (response, usage) = self
                .provider
                .send_chat_with_tools(&messages, &function_defs)
                .await
                .context("model call failed")?;
            stats.accumulate(usage.as_ref());

            let calls = match response {
                ProviderResponse::Final(text) => {
                    info!(
                        model_calls = stats.model_calls,
                        tool_calls = stats.tool_calls,
                        tool_failures = stats.tool_failures,
                        prompt_tokens = stats.prompt_tokens,
                        completion_tokens = stats.completion_tokens,
                        "conversation finished"
                    );
                    return Ok(text);
                }
                ProviderResponse::ToolCalls(calls) => calls,
            };

            if iterations >= self.max_tool_iterations {
                warn!(
                    max_tool_iterations = self.max_tool_iterations,
                    tool_calls = stats.tool_calls,
                    "tool loop exhausted"
                );
                let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
                return Ok(format!(
                    "{TOOL_LOOP_EXHAUSTED} last calls: {}",
                    names.join(", ")
                ));
            }
            iterations += 1;

            // The API needs an id on every call to pair it with its result.
            let calls: Vec<ToolCallItem> = calls
                .into_iter()
                .map(|mut c| {
                    if c.id.is_empty() {
                        c.id = format!("call_{}", uuid::Uuid::new_v4().simple());
                    }
                    c
                })
                .collect();

            messages.push(ChatMessage::assistant_tool_calls(&calls));
            for call in &calls {
                let content = self.invoke_tool(call, &mut stats).await;
                messages.push(ChatMessage::tool_result(&call.id, content));
            }
        }
    }
}
