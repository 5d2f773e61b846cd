//! Built-in `scrape_url_to_file` tool: fetches a page, strips the noise,
//! and stores the cleaned HTML as an artifact.

use std::sync::OnceLock;

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use regex::Regex;
use serde_json::{json, Value};

use crate::tools::fetch::fetch_page;
use crate::tools::{handler, str_arg, ToolBox, ToolContext, ToolMeta};

pub const NAME: &str = "scrape_url_to_file";

/// Fetch `url` and save its cleaned HTML to a new `.html` artifact.
///
/// Args: `{ "url": "https://…" }`
/// Returns the absolute path of the saved file.
pub async fn scrape_url_to_file(ctx: &ToolContext, args: Value) -> anyhow::Result<Value> {
    let raw_url = str_arg(&args, NAME, "url")?;
    let url = reqwest::Url::parse(raw_url.trim())
        .map_err(|e| anyhow::anyhow!("invalid URL {raw_url}: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("unsupported URL scheme '{}': only http and https are allowed", url.scheme());
    }

    tracing::info!(url = %url, backend = ?ctx.settings.fetch_backend, "scraping page");
    let body = fetch_page(ctx, &url).await?;
    let cleaned = clean_html(&body);

    let path = ctx.new_artifact_path("html")?;
    tokio::fs::write(&path, &cleaned)
        .await
        .map_err(|e| anyhow::anyhow!("{NAME}: cannot write {}: {e}", path.display()))?;

    tracing::info!(
        url = %url,
        path = %path.display(),
        raw_bytes = body.len(),
        cleaned_bytes = cleaned.len(),
        "page saved"
    );
    Ok(Value::String(path.to_string_lossy().into_owned()))
}

/// Elements dropped together with everything inside them.
const DROPPED: &[&str] = &[
    "script", "style", "noscript", "svg", "iframe", "link", "meta",
];

/// Elements serialised without a closing tag.
const VOID: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "source", "track", "wbr",
];

/// Strip scripts, styles, comments and other non-content markup from a page.
///
/// The page is parsed into a DOM first, so markup inside comments or
/// attribute values never changes what is kept. Structure and attributes
/// of the remaining elements survive so that selectors found while reading
/// the file still match in extraction scripts.
pub fn clean_html(raw: &str) -> String {
    let dom = parse_document(RcDom::default(), Default::default()).one(raw);
    let mut out = String::with_capacity(raw.len());
    write_node(&dom.document, &mut out);
    match blank_lines() {
        Some(re) => re.replace_all(&out, "\n").trim().to_string(),
        None => out.trim().to_string(),
    }
}

fn write_node(node: &Handle, out: &mut String) {
    match &node.data {
        NodeData::Document => write_children(node, out),
        NodeData::Doctype { name, .. } => {
            out.push_str("<!DOCTYPE ");
            out.push_str(name);
            out.push('>');
        }
        NodeData::Text { contents } => escape_into(&contents.borrow(), false, out),
        NodeData::Element { name, attrs, .. } => {
            let tag: &str = &name.local;
            if DROPPED.contains(&tag) {
                return;
            }
            out.push('<');
            out.push_str(tag);
            for attr in attrs.borrow().iter() {
                out.push(' ');
                out.push_str(&attr.name.local);
                out.push_str("=\"");
                escape_into(&attr.value, true, out);
                out.push('"');
            }
            out.push('>');
            if VOID.contains(&tag) {
                return;
            }
            write_children(node, out);
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        // Comments and processing instructions.
        _ => {}
    }
}

fn write_children(node: &Handle, out: &mut String) {
    for child in node.children.borrow().iter() {
        write_node(child, out);
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

/// Runs of blank lines left behind by the removals.
fn blank_lines() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t]*(?:\n[ \t]*)+").ok())
        .as_ref()
}

pub fn register(tb: &mut ToolBox) {
    tb.register(
        ToolMeta {
            name: NAME.into(),
            description: "Scrape a webpage and save its cleaned HTML content to a new file. Returns the absolute file path.".into(),
            args_schema: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The http(s) URL of the page to scrape."
                    }
                },
                "required": ["url"],
                "additionalProperties": false
            }),
        },
        handler(|args, ctx| async move { scrape_url_to_file(&ctx, args).await }),
    );
}
