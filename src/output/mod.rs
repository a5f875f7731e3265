//! Output module for run statistics and the final report
//!
//! This module handles:
//! - Counters collected during the crawl and derived from download records
//! - The stdout summary
//! - The optional JSON report file

pub mod stats;
mod summary;

pub use stats::{CrawlStats, DownloadStats};
pub use summary::{format_bytes, format_summary, print_summary, write_json_report, RunReport};
