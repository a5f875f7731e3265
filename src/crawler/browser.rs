//! Headless Chromium page fetcher
//!
//! One browser process is shared by every concurrent fetch; each fetch gets
//! its own tab, which is closed again whether rendering succeeded or not.

use super::fetcher::{PageFetcher, RenderedPage};
use crate::config::Config;
use crate::{FetchCause, FetchError, GleanError};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, trace, warn};
use url::Url;

/// Resource count must hold still this long to count as quiet
const QUIESCENCE_WINDOW: Duration = Duration::from_millis(500);
const QUIESCENCE_POLL: Duration = Duration::from_millis(100);

const SCROLL_STEP_PX: f64 = 100.0;
const SCROLL_INTERVAL: Duration = Duration::from_millis(100);

/// Time kept back from the page budget for the final DOM snapshot
const SNAPSHOT_RESERVE: Duration = Duration::from_millis(1_000);

const RESOURCE_COUNT_SCRIPT: &str = "performance.getEntriesByType('resource').length";

const SCROLL_STEP_SCRIPT: &str = r#"
    (() => {
        window.scrollBy(0, 100);
        return document.body ? document.body.scrollHeight : 0;
    })()
"#;

const SNAPSHOT_SCRIPT: &str = r#"
    (() => {
        const backgrounds = [];
        for (const el of document.querySelectorAll('*')) {
            const bg = window.getComputedStyle(el).backgroundImage;
            if (bg && bg !== 'none') {
                backgrounds.push(bg);
            }
        }
        return {
            url: location.href,
            html: document.documentElement ? document.documentElement.outerHTML : '',
            backgrounds: backgrounds
        };
    })()
"#;

#[derive(Debug, Deserialize)]
struct DomSnapshot {
    url: String,
    html: String,
    #[serde(default)]
    backgrounds: Vec<String>,
}

/// Renders pages in a shared headless Chromium instance
pub struct BrowserFetcher {
    browser: Browser,
    handler: JoinHandle<()>,
    settle_delay: Duration,
}

impl BrowserFetcher {
    /// Launches the browser with the run's user agent and viewport
    pub async fn launch(config: &Config) -> Result<Self, GleanError> {
        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .request_timeout(config.page_timeout)
            .arg(format!("--user-agent={}", config.user_agent))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--hide-scrollbars")
            .arg("--mute-audio");

        if let Some(path) = &config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let browser_config = builder.build().map_err(GleanError::Browser)?;
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| GleanError::Browser(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    trace!("Browser handler event error: {}", e);
                }
            }
        });

        info!("Launched headless browser");
        Ok(Self {
            browser,
            handler,
            settle_delay: config.settle_delay,
        })
    }

    /// Closes the browser process and stops the event handler
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Failed to wait for browser exit: {}", e);
        }
        self.handler.abort();
        debug!("Browser shut down");
    }

    async fn render(&self, page: &Page, url: &Url, deadline: Instant) -> Result<RenderedPage, FetchCause> {
        page.goto(url.as_str())
            .await
            .map_err(|e| FetchCause::Navigation(e.to_string()))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| FetchCause::Navigation(e.to_string()))?;

        wait_for_quiescence(page, deadline.checked_sub(self.settle_delay + SNAPSHOT_RESERVE)).await;
        auto_scroll(page, deadline.checked_sub(self.settle_delay + SNAPSHOT_RESERVE)).await;
        sleep(self.settle_delay).await;

        let snapshot: DomSnapshot = page
            .evaluate(SNAPSHOT_SCRIPT)
            .await
            .map_err(|e| FetchCause::Navigation(format!("DOM snapshot failed: {}", e)))?
            .into_value()
            .map_err(|e| FetchCause::Navigation(format!("DOM snapshot unreadable: {}", e)))?;

        Ok(snapshot.into_page(url))
    }
}

impl DomSnapshot {
    fn into_page(self, requested: &Url) -> RenderedPage {
        let url = Url::parse(&self.url)
            .ok()
            .filter(|u| u.scheme() == "http" || u.scheme() == "https")
            .unwrap_or_else(|| requested.clone());
        RenderedPage {
            url,
            html: self.html,
            computed_backgrounds: self.backgrounds,
        }
    }
}

impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<RenderedPage, FetchError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::new(url.as_str(), FetchCause::Navigation(format!("could not open tab: {}", e))))?;

        let deadline = Instant::now() + timeout;
        let rendered = match tokio::time::timeout(timeout, self.render(&page, url, deadline)).await {
            Ok(result) => result,
            Err(_) => Err(FetchCause::Timeout),
        };

        if let Err(e) = page.close().await {
            debug!("Failed to close tab for {}: {}", url, e);
        }

        rendered.map_err(|cause| FetchError::new(url.as_str(), cause))
    }
}

/// Waits until the loaded-resource count stops changing
///
/// Gives up quietly at `stop_by`; a busy page is still snapshotted.
async fn wait_for_quiescence(page: &Page, stop_by: Option<Instant>) {
    let mut last_count: Option<u64> = None;
    let mut stable_since = Instant::now();

    loop {
        if stop_by.is_some_and(|t| Instant::now() >= t) {
            debug!("Network never went quiet, continuing");
            return;
        }

        match page.evaluate(RESOURCE_COUNT_SCRIPT).await {
            Ok(result) => {
                let count = result.into_value::<u64>().ok();
                if count.is_some() && count == last_count {
                    if stable_since.elapsed() >= QUIESCENCE_WINDOW {
                        return;
                    }
                } else {
                    last_count = count;
                    stable_since = Instant::now();
                }
            }
            Err(e) => debug!("Resource count check failed: {}, retrying", e),
        }

        sleep(QUIESCENCE_POLL).await;
    }
}

/// Scrolls down in fixed steps until the whole document has been passed
///
/// Stops early at `stop_by` for pages that keep growing.
async fn auto_scroll(page: &Page, stop_by: Option<Instant>) {
    let mut scrolled = 0.0;

    loop {
        if stop_by.is_some_and(|t| Instant::now() >= t) {
            debug!("Stopped scrolling after {}px", scrolled);
            return;
        }

        let height = match page.evaluate(SCROLL_STEP_SCRIPT).await {
            Ok(result) => result.into_value::<f64>().unwrap_or(0.0),
            Err(e) => {
                debug!("Scroll step failed: {}", e);
                return;
            }
        };
        scrolled += SCROLL_STEP_PX;

        if scroll_complete(scrolled, height) {
            return;
        }
        sleep(SCROLL_INTERVAL).await;
    }
}

fn scroll_complete(scrolled: f64, scroll_height: f64) -> bool {
    scrolled >= scroll_height
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_into_page() {
        let snapshot: DomSnapshot = serde_json::from_value(serde_json::json!({
            "url": "https://example.test/landing",
            "html": "<html><body></body></html>",
            "backgrounds": ["url(\"https://example.test/bg.png\")"]
        }))
        .unwrap();

        let requested = Url::parse("https://example.test/").unwrap();
        let page = snapshot.into_page(&requested);
        assert_eq!(page.url.as_str(), "https://example.test/landing");
        assert_eq!(page.computed_backgrounds.len(), 1);
    }

    #[test]
    fn test_snapshot_keeps_requested_url_for_odd_locations() {
        let snapshot: DomSnapshot = serde_json::from_value(serde_json::json!({
            "url": "chrome-error://chromewebdata/",
            "html": ""
        }))
        .unwrap();

        let requested = Url::parse("https://example.test/a").unwrap();
        let page = snapshot.into_page(&requested);
        assert_eq!(page.url, requested);
        assert!(page.computed_backgrounds.is_empty());
    }

    #[test]
    fn test_scroll_complete() {
        assert!(!scroll_complete(100.0, 2400.0));
        assert!(scroll_complete(2400.0, 2400.0));
        // Pages shorter than one step finish after the first scroll
        assert!(scroll_complete(100.0, 0.0));
    }
}
