//! scrapeflow — session-aware web scraping agent.
//!
//! This library crate re-exports modules so integration tests
//! (under `tests/`) can access them.

pub mod agent;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod mcp;
pub mod models;
pub mod prompt;
pub mod session;
pub mod tools;
pub mod utils;

/// Return the scrapeflow home directory.
///
/// Resolution order:
/// 1. `SCRAPEFLOW_HOME` environment variable
/// 2. `$HOME/.scrapeflow`
pub fn scrapeflow_home() -> std::path::PathBuf {
    if let Ok(p) = std::env::var("SCRAPEFLOW_HOME") {
        std::path::PathBuf::from(p)
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".scrapeflow")
    }
}
