//! Query dispatch: one instruction in, one result out, with the session's
//! previous summary carried into the agent's system prompt.

pub mod reply;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::agent::{AgentRunner, ConversationRequest};
use crate::prompt::{render_system_prompt, PromptContext};
use crate::session::{new_session_id, SessionStore};

pub use reply::{parse_agent_reply, AgentReply, ReplyParseError, ResultsRef};

/// Error marker returned when the agent's answer cannot be parsed.
pub const PARSE_FAILED: &str = "parse failed";

/// A successfully parsed query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultsRef>,
    pub summary: Value,
    pub session_id: String,
}

/// Result of a call whose answer could not be parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseFailure {
    /// Always [`PARSE_FAILED`].
    pub error: String,
    pub session_id: String,
    /// Parser diagnostic, kept out of the wire format.
    #[serde(skip)]
    pub reason: String,
}

/// Outcome of [`QueryDispatcher::invoke`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutcome {
    Answered(QueryResult),
    ParseFailed(ParseFailure),
}

impl QueryOutcome {
    pub fn session_id(&self) -> &str {
        match self {
            QueryOutcome::Answered(r) => &r.session_id,
            QueryOutcome::ParseFailed(f) => &f.session_id,
        }
    }
}

/// Resolves the session, injects its prior summary, delegates to the
/// agent runner and records the new summary.
///
/// Only a reply that fails to parse is handled here; every other
/// failure (store, model, tools) is returned to the caller untouched.
pub struct QueryDispatcher {
    store: Arc<dyn SessionStore>,
    runner: Arc<dyn AgentRunner>,
    base_prompt: String,
    reuse_context: bool,
}

impl QueryDispatcher {
    pub fn new(
        store: Arc<dyn SessionStore>,
        runner: Arc<dyn AgentRunner>,
        base_prompt: impl Into<String>,
    ) -> Self {
        Self {
            store,
            runner,
            base_prompt: base_prompt.into(),
            reuse_context: true,
        }
    }

    /// Enable or disable injecting the stored summary into the prompt.
    pub fn with_context_reuse(mut self, enabled: bool) -> Self {
        self.reuse_context = enabled;
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Run one instruction against a session.
    ///
    /// A missing or blank `session_id` starts a new session with a fresh
    /// UUID. Any other id is used exactly as given.
    pub async fn invoke(
        &self,
        instruction: &str,
        session_id: Option<&str>,
    ) -> anyhow::Result<QueryOutcome> {
        let session_id = session_id
            .filter(|s| !s.trim().is_empty())
            .map(str::to_owned)
            .unwrap_or_else(new_session_id);

        let prior_summary = if self.reuse_context {
            self.store.get(&session_id).await?
        } else {
            None
        };
        debug!(
            session_id = %session_id,
            has_prior_summary = prior_summary.is_some(),
            reuse_context = self.reuse_context,
            "dispatching query"
        );

        let ctx = PromptContext { prior_summary };
        let request = ConversationRequest {
            system_prompt: render_system_prompt(&self.base_prompt, &ctx),
            instruction: instruction.to_string(),
        };

        let raw = self.runner.run_tooled_conversation(&request).await?;

        match parse_agent_reply(&raw) {
            Ok(reply) => {
                self.store.put(&session_id, reply.summary.clone()).await?;
                info!(
                    session_id = %session_id,
                    has_results = reply.results.is_some(),
                    "query answered"
                );
                Ok(QueryOutcome::Answered(QueryResult {
                    text: reply.text,
                    results: reply.results,
                    summary: reply.summary,
                    session_id,
                }))
            }
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    error = %e,
                    reply = %crate::utils::truncate_str(&raw, 300),
                    "agent reply could not be parsed, session left unchanged"
                );
                Ok(QueryOutcome::ParseFailed(ParseFailure {
                    error: PARSE_FAILED.to_string(),
                    session_id,
                    reason: e.to_string(),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct FixedRunner {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl FixedRunner {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.into(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AgentRunner for FixedRunner {
        async fn run_tooled_conversation(
            &self,
            request: &ConversationRequest,
        ) -> anyhow::Result<String> {
            self.prompts
                .lock()
                .unwrap()
                .push(request.system_prompt.clone());
            Ok(self.reply.clone())
        }
    }

    #[test]
    fn outcomes_serialize_to_wire_shape() {
        let ok = QueryOutcome::Answered(QueryResult {
            text: Some("t".into()),
            results: Some(ResultsRef::FilePath("/r.json".into())),
            summary: json!("s"),
            session_id: "abc".into(),
        });
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"text": "t", "results_json_file_path": "/r.json", "summary": "s", "session_id": "abc"})
        );

        let failed = QueryOutcome::ParseFailed(ParseFailure {
            error: PARSE_FAILED.into(),
            session_id: "abc".into(),
            reason: "bad".into(),
        });
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"error": "parse failed", "session_id": "abc"})
        );
    }

    #[tokio::test]
    async fn blank_session_id_gets_generated() {
        let store = Arc::new(MemorySessionStore::new());
        let d = QueryDispatcher::new(store, FixedRunner::new(r#"{"summary":"s"}"#), "BASE");
        let out = d.invoke("q", Some("  ")).await.unwrap();
        assert!(uuid::Uuid::parse_str(out.session_id()).is_ok());
    }

    #[tokio::test]
    async fn reuse_disabled_skips_injection() {
        let store = Arc::new(MemorySessionStore::new());
        store.put("abc", json!("PRIOR")).await.unwrap();
        let runner = FixedRunner::new(r#"{"summary":"next"}"#);
        let d = QueryDispatcher::new(store.clone(), runner.clone(), "BASE")
            .with_context_reuse(false);
        d.invoke("q", Some("abc")).await.unwrap();
        assert_eq!(runner.prompts.lock().unwrap()[0], "BASE");
        // The summary is still recorded.
        assert_eq!(store.get("abc").await.unwrap(), Some(json!("next")));
    }
}
