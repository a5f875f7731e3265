//! Page fetching
//!
//! This module defines the seam between the crawl loop and whatever turns a
//! URL into a DOM snapshot:
//! - [`PageFetcher`], implemented by the headless-browser fetcher and by
//!   [`HttpFetcher`]
//! - [`RenderedPage`], the snapshot handed to the extractors
//! - HTTP client construction shared with robots.txt fetching

use super::images::stylesheet_backgrounds;
use crate::{FetchCause, FetchError};
use reqwest::{redirect::Policy, Client};
use std::future::Future;
use std::time::Duration;
use url::Url;

/// Redirect hops a page load may follow
const PAGE_REDIRECT_LIMIT: usize = 10;

/// DOM snapshot of one loaded page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// Document URL after redirects
    pub url: Url,

    /// Serialized document markup
    pub html: String,

    /// Non-`none` computed `background-image` values, e.g. `url("https://...")`
    pub computed_backgrounds: Vec<String>,
}

impl RenderedPage {
    /// Snapshot with no computed styles
    pub fn from_html(url: Url, html: impl Into<String>) -> Self {
        Self {
            url,
            html: html.into(),
            computed_backgrounds: Vec::new(),
        }
    }
}

/// Turns a URL into a rendered DOM snapshot
///
/// Implementations must release any per-page resources (tabs, connections)
/// before the returned future completes, whether it succeeds or not.
pub trait PageFetcher: Send + Sync + 'static {
    fn fetch(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> impl Future<Output = Result<RenderedPage, FetchError>> + Send;
}

/// Builds the HTTP client used for robots.txt and the HTTP renderer
///
/// # Arguments
///
/// * `user_agent` - Sent verbatim on every request
/// * `timeout` - Whole-request timeout
///
/// # Example
///
/// ```no_run
/// use site_gleaner::crawler::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client("Mozilla/5.0", Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(PAGE_REDIRECT_LIMIT))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Maps a reqwest failure onto a fetch cause
pub(crate) fn classify_request_error(error: &reqwest::Error) -> FetchCause {
    if error.is_timeout() {
        FetchCause::Timeout
    } else if error.is_connect() {
        FetchCause::Network(format!("connection failed: {}", error))
    } else if error.is_redirect() {
        FetchCause::Navigation(format!("redirect error: {}", error))
    } else {
        FetchCause::Network(error.to_string())
    }
}

/// Fetches raw HTML with a plain GET request
///
/// No scripts run, so lazy-loaded images never appear. Computed backgrounds
/// are approximated from inline `<style>` rules whose selectors match the
/// static document.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<RenderedPage, FetchError> {
        let fail = |cause: FetchCause| FetchError::new(url.as_str(), cause);

        let response = self
            .client
            .get(url.as_str())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| fail(classify_request_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(FetchCause::Status(status.as_u16())));
        }

        // A missing Content-Type is treated as HTML
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_ascii_lowercase();
        if !content_type.contains("html") {
            return Err(fail(FetchCause::NotHtml(content_type)));
        }

        let final_url = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|e| fail(classify_request_error(&e)))?;

        let computed_backgrounds = stylesheet_backgrounds(&html);
        Ok(RenderedPage {
            url: final_url,
            html,
            computed_backgrounds,
        })
    }
}
