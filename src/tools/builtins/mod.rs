//! Built-in tool implementations.
//!
//! Each sub-module implements one tool and exposes a `register`
//! function that adds its metadata and handler to a [`ToolBox`].

pub mod read_file;
pub mod run_script;
pub mod save_content;
pub mod scrape_url;

use super::ToolBox;

/// Register every built-in tool.
pub fn register_all(tb: &mut ToolBox) {
    scrape_url::register(tb);
    save_content::register(tb);
    read_file::register(tb);
    run_script::register(tb);
}
