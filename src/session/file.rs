//! JSONL-backed session store that survives restarts.
//!
//! Every `put` appends one [`SessionRecord`] line to the log. On open the
//! log is replayed and the latest record per id wins.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{SessionRecord, SessionStore};

/// Append-log session store.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    // The write lock also serialises appends to the log file.
    cache: RwLock<HashMap<String, SessionRecord>>,
}

impl FileSessionStore {
    /// Open (or lazily create) the log at `path` and replay it.
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let records = load_records(&path).await?;
        info!(
            path = %path.display(),
            sessions = records.len(),
            "file session store opened"
        );
        Ok(Self {
            path,
            cache: RwLock::new(records),
        })
    }
}

async fn load_records(path: &Path) -> anyhow::Result<HashMap<String, SessionRecord>> {
    let content = match fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };

    let mut records = HashMap::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<SessionRecord>(line) {
            Ok(rec) => {
                records.insert(rec.session_id.clone(), rec);
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    error = %e,
                    "skipping malformed session log line"
                );
            }
        }
    }
    Ok(records)
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, session_id: &str) -> anyhow::Result<Option<serde_json::Value>> {
        let cache = self.cache.read().await;
        Ok(cache.get(session_id).map(|r| r.summary.clone()))
    }

    async fn put(&self, session_id: &str, summary: serde_json::Value) -> anyhow::Result<()> {
        let record = SessionRecord::new(session_id, summary);
        let line = serde_json::to_string(&record).context("serialize SessionRecord")?;

        let mut cache = self.cache.write().await;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create sessions dir {}", parent.display()))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("open session log {}", self.path.display()))?;
        file.write_all(format!("{line}\n").as_bytes()).await?;
        file.flush().await?;

        cache.insert(session_id.to_string(), record);
        debug!(session_id = %session_id, path = %self.path.display(), "session summary appended");
        Ok(())
    }

    async fn list(&self) -> anyhow::Result<BTreeMap<String, serde_json::Value>> {
        let cache = self.cache.read().await;
        Ok(cache
            .iter()
            .map(|(id, r)| (id.clone(), r.summary.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tracing_subscriber::layer::SubscriberExt;

    #[tokio::test]
    async fn missing_log_opens_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::open(dir.path().join("s.jsonl"))
            .await
            .unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn latest_record_wins_after_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("s.jsonl");

        let store = FileSessionStore::open(&path).await.unwrap();
        store.put("abc", json!("old")).await.unwrap();
        store.put("abc", json!("new")).await.unwrap();
        store.put("xyz", json!({"k": 1})).await.unwrap();
        drop(store);

        let reopened = FileSessionStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("abc").await.unwrap(), Some(json!("new")));
        assert_eq!(reopened.get("xyz").await.unwrap(), Some(json!({"k": 1})));
        assert_eq!(reopened.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.jsonl");
        let good = serde_json::to_string(&SessionRecord::new("ok", json!("sum"))).unwrap();
        tokio::fs::write(&path, format!("not json\n\n{good}\n"))
            .await
            .unwrap();

        let store = FileSessionStore::open(&path).await.unwrap();
        assert_eq!(store.get("ok").await.unwrap(), Some(json!("sum")));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    /// Counts WARN events seen while it is the default subscriber.
    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarnCounter {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn malformed_lines_are_logged_at_warn() {
        let warns = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(warns.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.jsonl");
        let good = serde_json::to_string(&SessionRecord::new("ok", json!("sum"))).unwrap();
        tokio::fs::write(&path, format!("{{broken\n{good}\ntrailing garbage\n"))
            .await
            .unwrap();

        let records = load_records(&path).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(warns.load(Ordering::SeqCst), 2);
    }
}
