//! Page fetching for `scrape_url_to_file`.
//!
//! Two back-ends are available:
//!
//! * **http** — a plain GET with the configured User-Agent.
//! * **browser** — renders the page in headless Chromium so script-built
//!   content is present in the saved HTML. Only compiled in with the
//!   `playwright` feature; without it, or when rendering fails, the
//!   plain GET is used instead.

use reqwest::Url;

use crate::config::FetchBackend;
use crate::tools::ToolContext;

/// Fetch the HTML of `url` with the backend configured on `ctx`.
pub async fn fetch_page(ctx: &ToolContext, url: &Url) -> anyhow::Result<String> {
    match ctx.settings.fetch_backend {
        FetchBackend::Http => http_get(ctx, url).await,
        FetchBackend::Browser => match rendered::render(ctx, url).await {
            Ok(html) => Ok(html),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "browser render unavailable, using plain GET");
                http_get(ctx, url).await
            }
        },
    }
}

/// Plain GET. Non-2xx statuses are errors.
pub async fn http_get(ctx: &ToolContext, url: &Url) -> anyhow::Result<String> {
    let resp = ctx
        .http
        .get(url.clone())
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("Error scraping URL {url}: {e}"))?;

    let status = resp.status();
    if !status.is_success() {
        anyhow::bail!("Error scraping URL {url} with status code {}", status.as_u16());
    }

    resp.text()
        .await
        .map_err(|e| anyhow::anyhow!("Error reading body of {url}: {e}"))
}

// ── Playwright-backed rendering ─────────────────────────────
#[cfg(feature = "playwright")]
mod rendered {
    use std::time::Duration;

    use playwright::api::LaunchOptions;
    use playwright::protocol::Playwright;
    use reqwest::Url;

    use crate::tools::ToolContext;

    const SCROLL_TO_BOTTOM: &str =
        "(window.scrollTo(0, document.body.scrollHeight), document.body.scrollHeight)";
    const OUTER_HTML: &str = "document.documentElement.outerHTML";
    /// Pause after scrolling so lazy-loaded content can arrive.
    const AFTER_SCROLL: Duration = Duration::from_millis(1_000);

    /// Launch Chromium, load `url`, let it settle and return the live DOM.
    pub(super) async fn render(ctx: &ToolContext, url: &Url) -> anyhow::Result<String> {
        let playwright = Playwright::launch()
            .await
            .map_err(|e| anyhow::anyhow!("failed to launch Playwright server: {e}"))?;
        let browser = playwright
            .chromium()
            .launch_with_options(LaunchOptions::new().headless(true))
            .await
            .map_err(|e| anyhow::anyhow!("failed to launch Chromium: {e}"))?;
        let page = browser
            .new_page()
            .await
            .map_err(|e| anyhow::anyhow!("failed to create page: {e}"))?;

        tracing::debug!(url = %url, "rendering page");
        page.goto(url.as_str(), None)
            .await
            .map_err(|e| anyhow::anyhow!("Error scraping URL {url}: {e}"))?;
        tokio::time::sleep(ctx.settings.render_settle).await;

        page.evaluate_value(SCROLL_TO_BOTTOM)
            .await
            .map_err(|e| anyhow::anyhow!("scroll failed on {url}: {e}"))?;
        tokio::time::sleep(AFTER_SCROLL).await;

        let html = page
            .evaluate_value(OUTER_HTML)
            .await
            .map_err(|e| anyhow::anyhow!("reading DOM of {url} failed: {e}"))?;

        if let Err(e) = page.close().await {
            tracing::debug!(error = %e, "page close failed");
        }
        Ok(html)
    }
}

#[cfg(not(feature = "playwright"))]
mod rendered {
    use reqwest::Url;

    use crate::tools::ToolContext;

    pub(super) async fn render(_ctx: &ToolContext, _url: &Url) -> anyhow::Result<String> {
        anyhow::bail!("built without the `playwright` feature")
    }
}
