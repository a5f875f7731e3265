//! Site-Gleaner: a polite image harvester
//!
//! This crate implements a bounded, concurrent web crawler that renders pages,
//! collects every image they reference (including lazy-loaded, responsive and
//! CSS background images) and mirrors those images into a local directory,
//! respecting robots.txt and same-origin scope along the way.

pub mod config;
pub mod crawler;
pub mod download;
pub mod output;
pub mod robots;
pub mod state;
pub mod url;

use std::sync::Arc;
use thiserror::Error;

/// Main error type for Site-Gleaner operations
///
/// Only initialization failures surface through this type. Per-page and
/// per-image failures are recorded in the run statistics instead.
#[derive(Debug, Error)]
pub enum GleanError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to launch browser: {0}")]
    Browser(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::RunState,
        to: state::RunState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report serialization error: {0}")]
    Report(#[from] serde_json::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// A page could not be rendered
///
/// Non-fatal: the coordinator logs it, counts the page as failed and keeps
/// crawling.
#[derive(Debug, Clone, Error)]
#[error("Failed to fetch {url}: {cause}")]
pub struct FetchError {
    pub url: String,
    pub cause: FetchCause,
}

impl FetchError {
    pub fn new(url: impl Into<String>, cause: FetchCause) -> Self {
        Self {
            url: url.into(),
            cause,
        }
    }
}

/// Why a page fetch failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchCause {
    #[error("page load timed out")]
    Timeout,

    #[error("HTTP {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("not an HTML document ({0})")]
    NotHtml(String),
}

/// Why an image download failed
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
pub enum DownloadError {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("invalid image URL: {0}")]
    InvalidUrl(String),

    #[error("download already in progress")]
    Duplicate,
}

/// Result type alias for Site-Gleaner operations
pub type Result<T> = std::result::Result<T, GleanError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{Config, Renderer};
pub use crawler::{CrawlOutcome, Crawler, PageFetcher, RenderedPage};
pub use download::{DownloadRecord, DownloadStatus, Downloader};
pub use output::RunReport;
pub use state::{PageState, RunState};
pub use url::normalize_url;

/// Runs a complete harvest: crawl, download, report
///
/// Builds the page fetcher selected by `config.renderer`, traverses the site,
/// drains the discovered image set through the [`Downloader`] and returns the
/// aggregated report. Only initialization failures (browser launch, HTTP
/// client construction, an unusable seed) are returned as errors.
pub async fn run(config: Config) -> Result<RunReport> {
    let started_at = chrono::Utc::now();
    let clock = std::time::Instant::now();
    let config = Arc::new(config);

    let client = crawler::build_http_client(&config.user_agent, config.page_timeout)?;

    let outcome = match config.renderer {
        Renderer::Browser => {
            let fetcher = Arc::new(crawler::BrowserFetcher::launch(&config).await?);
            let outcome = Crawler::new(Arc::clone(&config), Arc::clone(&fetcher), client)
                .run()
                .await;
            match Arc::try_unwrap(fetcher) {
                Ok(fetcher) => fetcher.shutdown().await,
                Err(_) => tracing::warn!("Browser still referenced after crawl, skipping shutdown"),
            }
            outcome?
        }
        Renderer::Http => {
            let fetcher = Arc::new(crawler::HttpFetcher::new(client.clone()));
            Crawler::new(Arc::clone(&config), fetcher, client).run().await?
        }
    };

    let downloader = Downloader::new(&config)?;
    let jobs = download::plan_jobs(&outcome, &config.folders);
    tracing::info!("Downloading {} images into {}", jobs.len(), config.out_dir.display());
    let records = downloader.download_all(jobs).await;

    Ok(RunReport::new(
        &config,
        started_at,
        clock.elapsed(),
        &outcome,
        &records,
    ))
}
