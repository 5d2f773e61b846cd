//! Session abstraction: the `SessionStore` trait and its backends.
//!
//! A session maps an opaque id to the last summary the model produced
//! for it. The summary is whatever JSON value the model returned (a
//! string or a structured object); the store never looks inside it.

pub mod file;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

pub use file::FileSessionStore;

/// Generate a new UUIDv4 session id.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ── SessionRecord ────────────────────────────────────────────

/// One stored summary, serialised as a line in the JSONL session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    /// Opaque summary from the most recent successful reply.
    pub summary: serde_json::Value,
    /// Unix-epoch timestamp in milliseconds.
    pub updated_at: u64,
}

impl SessionRecord {
    pub fn new(session_id: impl Into<String>, summary: serde_json::Value) -> Self {
        Self {
            session_id: session_id.into(),
            summary,
            updated_at: crate::utils::now_ms(),
        }
    }
}

// ── SessionStore ─────────────────────────────────────────────

/// Keyed storage for per-session summaries.
///
/// Implementations are shared between concurrent requests; writes to
/// the same id are last-writer-wins. There is no eviction.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Summary stored for `session_id`, if any.
    async fn get(&self, session_id: &str) -> anyhow::Result<Option<serde_json::Value>>;

    /// Replace the summary stored for `session_id`.
    async fn put(&self, session_id: &str, summary: serde_json::Value) -> anyhow::Result<()>;

    /// Every known session id with its summary.
    async fn list(&self) -> anyhow::Result<BTreeMap<String, serde_json::Value>>;
}

// ── MemorySessionStore ───────────────────────────────────────

/// Process-lifetime store backed by a map behind an async lock.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str) -> anyhow::Result<Option<serde_json::Value>> {
        let map = self.inner.read().await;
        Ok(map.get(session_id).map(|r| r.summary.clone()))
    }

    async fn put(&self, session_id: &str, summary: serde_json::Value) -> anyhow::Result<()> {
        let record = SessionRecord::new(session_id, summary);
        self.inner
            .write()
            .await
            .insert(session_id.to_string(), record);
        debug!(session_id = %session_id, "session summary stored");
        Ok(())
    }

    async fn list(&self) -> anyhow::Result<BTreeMap<String, serde_json::Value>> {
        let map = self.inner.read().await;
        Ok(map
            .iter()
            .map(|(id, r)| (id.clone(), r.summary.clone()))
            .collect())
    }
}

// ── Tests ────────────────────────────────────────────────────
