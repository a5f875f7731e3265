//! Crawler module for page rendering and site traversal
//!
//! This module contains the core crawling logic, including:
//! - Page fetching (headless browser or plain HTTP)
//! - Image and link extraction from rendered pages
//! - Admission policy (scope and robots.txt)
//! - Frontier scheduling and concurrency limiting
//! - Overall crawl coordination

mod browser;
mod coordinator;
mod fetcher;
mod images;
mod parser;
mod policy;
mod scheduler;

pub use browser::BrowserFetcher;
pub use coordinator::{CrawlOutcome, Crawler, PageFailure};
pub use fetcher::{build_http_client, HttpFetcher, PageFetcher, RenderedPage};
pub use images::{css_urls, extract_images, srcset_urls, stylesheet_backgrounds};
pub use parser::extract_links;
pub use policy::{CrawlPolicy, PolicyDecision, PolicyRejection};
pub use scheduler::{CrawlTask, ScheduledTask, Scheduler};
