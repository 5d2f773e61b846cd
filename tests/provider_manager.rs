//! Tests for ProviderManager retry/fallback and the OpenAI tool-calling
//! wire format.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use scrapeflow::models::{
    ChatMessage, ModelProvider, OpenAICompatProvider, OpenAIProvider, ProviderManager,
    ProviderResponse, TokenUsage, ToolCallItem,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Mock providers
// ---------------------------------------------------------------------------

/// A provider that fails `fail_count` times then succeeds.
struct FailNProvider {
    fail_count: usize,
    calls: AtomicUsize,
    reply: String,
}

impl FailNProvider {
    fn new(fail_count: usize, reply: &str) -> Self {
        Self {
            fail_count,
            calls: AtomicUsize::new(0),
            reply: reply.to_string(),
        }
    }
}

#[async_trait]
impl ModelProvider for FailNProvider {
    async fn send_chat_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: &[serde_json::Value],
    ) -> anyhow::Result<(ProviderResponse, Option<TokenUsage>)> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_count {
            Err(anyhow::anyhow!("intentional failure #{}", n + 1))
        } else {
            Ok((ProviderResponse::Final(self.reply.clone()), None))
        }
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// A provider that always fails with `message`, with a shared call counter.
struct CountingFailProvider {
    calls: Arc<AtomicUsize>,
    message: &'static str,
}

#[async_trait]
impl ModelProvider for CountingFailProvider {
    async fn send_chat_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: &[serde_json::Value],
    ) -> anyhow::Result<(ProviderResponse, Option<TokenUsage>)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(anyhow::anyhow!("{}", self.message))
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn counting(message: &'static str) -> (CountingFailProvider, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    (
        CountingFailProvider {
            calls: Arc::clone(&calls),
            message,
        },
        calls,
    )
}

/// A provider that asks for one tool call, exactly as the tool loop sees it.
struct ToolCallingProvider;

#[async_trait]
impl ModelProvider for ToolCallingProvider {
    async fn send_chat_with_tools(
        &self,
        _messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> anyhow::Result<(ProviderResponse, Option<TokenUsage>)> {
        let name = tools[0]["function"]["name"].as_str().unwrap_or_default();
        Ok((
            ProviderResponse::ToolCalls(vec![ToolCallItem {
                id: "call_1".into(),
                name: name.into(),
                arguments: "{}".into(),
            }]),
            Some(TokenUsage {
                prompt_tokens: 7,
                completion_tokens: 2,
                total_tokens: 9,
            }),
        ))
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn hello() -> Vec<ChatMessage> {
    vec![ChatMessage::new("user", "hello")]
}

fn scrape_tool() -> Vec<serde_json::Value> {
    vec![serde_json::json!({
        "type": "function",
        "function": {"name": "scrape_url_to_file", "parameters": {"type": "object"}}
    })]
}

/// Run one manager call with the tool list the agent sends.
async fn ask(manager: &ProviderManager) -> anyhow::Result<String> {
    match manager.send_chat_with_tools(&hello(), &scrape_tool()).await? {
        (ProviderResponse::Final(text), _) => Ok(text),
        (other, _) => anyhow::bail!("expected a final reply, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// ProviderManager – retry tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retry_succeeds_after_transient_failures() {
    // Fails twice, then succeeds on the 3rd attempt.
    let manager = ProviderManager::new(
        vec![Box::new(FailNProvider::new(2, "success after retries"))],
        3,
    );
    let result = ask(&manager).await.unwrap();
    assert_eq!(result, "success after retries");
}

#[tokio::test]
async fn fallback_to_next_provider_on_exhausted_retries() {
    let (failing, _) = counting("always fails");
    let working = FailNProvider::new(0, "fallback reply");
    let manager = ProviderManager::new(vec![Box::new(failing), Box::new(working)], 2);
    assert_eq!(ask(&manager).await.unwrap(), "fallback reply");
}

#[tokio::test]
async fn all_providers_fail_returns_error() {
    let (a, _) = counting("always fails");
    let (b, _) = counting("always fails");
    let manager = ProviderManager::new(vec![Box::new(a), Box::new(b)], 2);
    let err_msg = format!("{:#}", ask(&manager).await.unwrap_err());
    assert!(
        err_msg.contains("all providers exhausted"),
        "expected 'all providers exhausted' in: {err_msg}"
    );
}

#[tokio::test]
async fn retry_count_respected() {
    let (provider, calls) = counting("503 upstream busy");
    let manager = ProviderManager::new(vec![Box::new(provider)], 3);
    let _ = ask(&manager).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3, "expected exactly 3 attempts");
}

#[tokio::test]
async fn permanent_error_skips_retries_but_still_falls_back() {
    let (provider, calls) = counting("OpenAI API returned 401 Unauthorized: bad key");
    let backup = FailNProvider::new(0, "from backup");
    let manager = ProviderManager::new(vec![Box::new(provider), Box::new(backup)], 3);
    assert_eq!(ask(&manager).await.unwrap(), "from backup");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "401 must not be retried");
}

#[tokio::test]
async fn tool_calls_pass_through_after_fallback() {
    let (failing, calls) = counting("503 upstream busy");
    let manager = ProviderManager::new(vec![Box::new(failing), Box::new(ToolCallingProvider)], 2);
    let (resp, usage) = manager
        .send_chat_with_tools(&hello(), &scrape_tool())
        .await
        .unwrap();
    match resp {
        ProviderResponse::ToolCalls(items) => {
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].name, "scrape_url_to_file");
        }
        other => panic!("expected tool calls, got {other:?}"),
    }
    assert_eq!(usage.unwrap().total_tokens, 9);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn empty_manager_errors() {
    let manager = ProviderManager::new(Vec::new(), 2);
    assert!(ask(&manager).await.is_err());
}

// ---------------------------------------------------------------------------
// OpenAI wire format via wiremock
// ---------------------------------------------------------------------------

fn openai(server: &MockServer) -> OpenAIProvider {
    OpenAIProvider::with_config(
        "sk-test".into(),
        format!("{}/v1/chat/completions", server.uri()),
        "gpt-5-mini".into(),
    )
}

#[tokio::test]
async fn tool_calls_are_parsed() {
    let server = MockServer::start().await;
    let body = serde_json::json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {
                        "name": "scrape_url_to_file",
                        "arguments": "{\"url\":\"https://example.com\"}"
                    }
                }]
            },
            "finish_reason": "tool_calls"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
    });
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({"model": "gpt-5-mini", "tool_choice": "auto"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .expect(1)
        .mount(&server)
        .await;

    let (resp, usage) = openai(&server)
        .send_chat_with_tools(&hello(), &scrape_tool())
        .await
        .unwrap();

    match resp {
        ProviderResponse::ToolCalls(calls) => {
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].id, "call_1");
            assert_eq!(calls[0].name, "scrape_url_to_file");
            assert!(calls[0].arguments.contains("example.com"));
        }
        other => panic!("expected tool calls, got {other:?}"),
    }
    assert_eq!(usage.unwrap().prompt_tokens, 12);
}

#[tokio::test]
async fn plain_reply_is_final() {
    let server = MockServer::start().await;
    let body = serde_json::json!({
        "choices": [{
            "message": {"role": "assistant", "content": "{\"summary\":\"s\"}"},
            "finish_reason": "stop"
        }]
    });
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let (resp, _) = openai(&server)
        .send_chat_with_tools(&hello(), &[])
        .await
        .unwrap();
    assert!(matches!(resp, ProviderResponse::Final(ref t) if t == "{\"summary\":\"s\"}"));

    let manager = ProviderManager::new(vec![Box::new(openai(&server))], 1);
    assert_eq!(ask(&manager).await.unwrap(), "{\"summary\":\"s\"}");
}

#[tokio::test]
async fn http_error_is_not_retried_when_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .expect(1)
        .mount(&server)
        .await;

    let manager = ProviderManager::new(vec![Box::new(openai(&server))], 3);
    let err = format!("{:#}", ask(&manager).await.unwrap_err());
    assert!(err.contains("401"), "unexpected error: {err}");
}

#[tokio::test]
async fn compat_provider_sends_to_custom_endpoint() {
    let server = MockServer::start().await;
    let body = serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": "hi from groq"}}]
    });
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .and(body_partial_json(serde_json::json!({"model": "llama-3.3-70b"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAICompatProvider::new(
        format!("{}/openai/v1/chat/completions", server.uri()),
        "gsk-test".into(),
        "llama-3.3-70b".into(),
    );
    let manager = ProviderManager::new(vec![Box::new(provider)], 1);
    assert_eq!(ask(&manager).await.unwrap(), "hi from groq");
}
