//! Integration test: verify that `templates/config.yaml` parses into a
//! valid `Config`, and that overrides are read back from disk.

use std::path::Path;

use scrapeflow::config::{Config, FetchBackend, SessionBackend};

#[tokio::test]
async fn template_config_parses() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("templates/config.yaml");
    let cfg = Config::load(&path).await.expect("template config should parse");

    assert_eq!(cfg.models.len(), 2);
    assert_eq!(cfg.agent.model.as_deref(), Some("gpt"));
    assert_eq!(cfg.agent.fallback_models, vec!["groq-llama".to_string()]);
    assert!(cfg.agent.reuse_session_context);
    assert_eq!(cfg.sessions.backend, SessionBackend::File);
    assert_eq!(cfg.tools.script_timeout_secs, 60);
    assert_eq!(cfg.tools.fetch_backend, FetchBackend::Browser);
    assert_eq!(cfg.tools.render_settle_ms, 5000);
}

#[tokio::test]
async fn template_builds_provider_chain() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("templates/config.yaml");
    let mut cfg = Config::load(&path).await.unwrap();
    // Inline keys so the test doesn't depend on the environment.
    for m in &mut cfg.models {
        m.api_key = Some("test-key".into());
    }
    let manager = scrapeflow::models::build_provider_manager_from_config(&cfg).unwrap();
    assert_eq!(manager.provider_count(), 2);
}

#[tokio::test]
async fn missing_file_yields_defaults() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = Config::load_or_default(&tmp.path().join("absent.yaml"))
        .await
        .unwrap();
    assert!(cfg.models.is_empty());
    assert_eq!(cfg.agent.max_tool_iterations, 25);

    // An explicit load of a missing file is an error.
    assert!(Config::load(&tmp.path().join("absent.yaml")).await.is_err());
}

#[tokio::test]
async fn load_reads_overrides_from_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.yaml");
    tokio::fs::write(
        &path,
        "agent:\n  reuse_session_context: false\ntools:\n  fetch_backend: http\ngateway:\n  addr: 127.0.0.1:8080\n",
    )
    .await
    .unwrap();

    let loaded = Config::load(&path).await.unwrap();
    assert!(!loaded.agent.reuse_session_context);
    assert_eq!(loaded.tools.fetch_backend, FetchBackend::Http);
    assert_eq!(loaded.gateway.addr, "127.0.0.1:8080");
}
