//! Parsing of the agent's final answer.
//!
//! The answer must be a JSON object carrying `summary`, and optionally
//! `text` plus one of `results_json_file_path` / `results`. A single
//! fenced ```` ```json ```` block around the object is tolerated.

use serde::Serialize;
use serde_json::Value;

/// Why a reply could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ReplyParseError {
    #[error("reply is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("reply is JSON but not an object")]
    NotAnObject,
    #[error("reply has no `summary` field")]
    MissingSummary,
}

/// Where the structured results of a query live.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ResultsRef {
    /// Path of a JSON artifact written by the agent's tools.
    #[serde(rename = "results_json_file_path")]
    FilePath(String),
    /// Results returned directly in the reply.
    #[serde(rename = "results")]
    Inline(Value),
}

/// A successfully parsed agent answer.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub text: Option<String>,
    pub results: Option<ResultsRef>,
    pub summary: Value,
}

/// Return the inner content of a reply wrapped in one ```` ``` ```` fence
/// (with or without a `json` tag), or `None` when the reply is not fenced.
///
/// The fence may span lines or sit on a single line.
pub fn strip_code_fence(reply: &str) -> Option<&str> {
    let body = reply.trim().strip_prefix("```")?.strip_suffix("```")?;
    // The info string runs up to whitespace or the opening of the JSON.
    let tag_end = body
        .find(|c: char| c.is_whitespace() || c == '{' || c == '[')
        .unwrap_or(body.len());
    let tag = &body[..tag_end];
    if !(tag.is_empty() || tag.eq_ignore_ascii_case("json")) {
        return None;
    }
    Some(body[tag_end..].trim())
}

/// Parse the agent's final answer.
pub fn parse_agent_reply(raw: &str) -> Result<AgentReply, ReplyParseError> {
    let body = strip_code_fence(raw).unwrap_or_else(|| raw.trim());
    let value: Value = serde_json::from_str(body)?;
    let Value::Object(mut obj) = value else {
        return Err(ReplyParseError::NotAnObject);
    };

    let summary = obj.remove("summary").ok_or(ReplyParseError::MissingSummary)?;

    let text = match obj.remove("text") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    };

    let results = match obj.remove("results_json_file_path") {
        Some(Value::String(p)) if !p.trim().is_empty() => Some(ResultsRef::FilePath(p)),
        _ => obj.remove("results").map(ResultsRef::Inline),
    };

    Ok(AgentReply {
        text,
        results,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_reply_with_path() {
        let r = parse_agent_reply(
            r#"{"text":"found it","results_json_file_path":"/tmp/r.json","summary":"scraped x"}"#,
        )
        .unwrap();
        assert_eq!(r.text.as_deref(), Some("found it"));
        assert_eq!(r.results, Some(ResultsRef::FilePath("/tmp/r.json".into())));
        assert_eq!(r.summary, json!("scraped x"));
    }

    #[test]
    fn inline_results_and_structured_summary() {
        let r = parse_agent_reply(r#"{"results":[1,2],"summary":{"files":["a"]}}"#).unwrap();
        assert_eq!(r.text, None);
        assert_eq!(r.results, Some(ResultsRef::Inline(json!([1, 2]))));
        assert_eq!(r.summary, json!({"files": ["a"]}));
    }

    #[test]
    fn null_path_falls_back_to_inline_results() {
        let r = parse_agent_reply(
            r#"{"results_json_file_path":null,"results":{"a":1},"summary":"s"}"#,
        )
        .unwrap();
        assert_eq!(r.results, Some(ResultsRef::Inline(json!({"a": 1}))));
    }

    #[test]
    fn fenced_reply_accepted() {
        let raw = "```json\n{\"text\":\"t\",\"summary\":\"s\"}\n```";
        assert_eq!(parse_agent_reply(raw).unwrap().summary, json!("s"));
        let bare = "```\n{\"summary\":\"s\"}\n```\n";
        assert!(parse_agent_reply(bare).is_ok());
    }

    #[test]
    fn single_line_fence_accepted() {
        let r = parse_agent_reply(r#"```json {"summary":"s"} ```"#).unwrap();
        assert_eq!(r.summary, json!("s"));
        assert_eq!(strip_code_fence(r#"```{"summary":1}```"#), Some(r#"{"summary":1}"#));
        assert_eq!(strip_code_fence("```JSON[1]```"), Some("[1]"));
    }

    #[test]
    fn other_fence_languages_rejected() {
        assert!(strip_code_fence("```python print(1) ```").is_none());
        assert!(strip_code_fence("```python\nprint(1)\n```").is_none());
    }

    #[test]
    fn prose_is_invalid_json() {
        assert!(matches!(
            parse_agent_reply("Sure! Here are the jobs."),
            Err(ReplyParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn non_object_rejected() {
        assert!(matches!(
            parse_agent_reply("[1,2,3]"),
            Err(ReplyParseError::NotAnObject)
        ));
    }

    #[test]
    fn missing_summary_rejected() {
        assert!(matches!(
            parse_agent_reply(r#"{"text":"hi"}"#),
            Err(ReplyParseError::MissingSummary)
        ));
    }

    #[test]
    fn results_ref_serializes_under_its_field_name() {
        let v = serde_json::to_value(ResultsRef::FilePath("/p".into())).unwrap();
        assert_eq!(v, json!({"results_json_file_path": "/p"}));
    }
}
