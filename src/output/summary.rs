//! Final run report
//!
//! Assembled once after the downloads finish, printed to stdout and
//! optionally written as JSON.

use super::stats::{CrawlStats, DownloadStats};
use crate::config::Config;
use crate::crawler::{CrawlOutcome, PageFailure};
use crate::download::{DownloadRecord, DownloadStatus};
use crate::state::RunState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything a finished run reports
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub seed: String,
    pub out_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub state: RunState,
    pub crawl: CrawlStats,
    pub downloads: DownloadStats,
    pub page_images: BTreeMap<String, BTreeSet<String>>,
    pub failed_pages: Vec<PageFailure>,
    pub records: Vec<DownloadRecord>,
}

impl RunReport {
    pub fn new(
        config: &Config,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        outcome: &CrawlOutcome,
        records: &[DownloadRecord],
    ) -> Self {
        Self {
            seed: config.seed.to_string(),
            out_dir: config.out_dir.clone(),
            started_at,
            duration_secs: elapsed.as_secs_f64(),
            state: outcome.state,
            crawl: outcome.stats.clone(),
            downloads: DownloadStats::from_records(records),
            page_images: outcome.page_images.clone(),
            failed_pages: outcome.failures.clone(),
            records: records.to_vec(),
        }
    }

    pub fn failed_downloads(&self) -> impl Iterator<Item = &DownloadRecord> {
        self.records.iter().filter(|r| !r.is_success())
    }
}

/// Renders the human-readable summary
pub fn format_summary(report: &RunReport) -> String {
    let crawl = &report.crawl;
    let downloads = &report.downloads;
    let mut out = String::new();

    out.push_str("=== Harvest Summary ===\n\n");
    out.push_str(&format!("Crawl ({}):\n", report.seed));
    out.push_str(&format!("  Pages visited: {}\n", crawl.pages_visited));
    out.push_str(&format!("  Pages failed: {}\n", crawl.pages_failed));
    out.push_str(&format!("  Images found: {}\n", crawl.images_found));
    if crawl.total_rejected() > 0 {
        out.push_str(&format!(
            "  Skipped URLs: {} (robots.txt: {}, other origin: {}, too deep: {})\n",
            crawl.total_rejected(),
            crawl.rejected_robots,
            crawl.rejected_cross_origin,
            crawl.rejected_depth
        ));
    }
    out.push('\n');

    out.push_str("Downloads:\n");
    out.push_str(&format!("  Downloaded: {}\n", downloads.downloaded));
    out.push_str(&format!("  Already present: {}\n", downloads.already_present));
    out.push_str(&format!("  Failed: {}\n", downloads.failed));
    out.push_str(&format!("  Total size: {}\n\n", format_bytes(downloads.bytes)));

    if !report.page_images.is_empty() {
        out.push_str("Images per page:\n");
        for (page, images) in &report.page_images {
            out.push_str(&format!("  {} - {}\n", images.len(), page));
        }
        out.push('\n');
    }

    if !report.failed_pages.is_empty() {
        out.push_str("Failed pages:\n");
        for failure in &report.failed_pages {
            out.push_str(&format!("  - {} ({})\n", failure.url, failure.reason));
        }
        out.push('\n');
    }

    let failed: Vec<(&str, &crate::DownloadError)> = report
        .failed_downloads()
        .filter_map(|record| match &record.status {
            DownloadStatus::Failed { error } => Some((record.url.as_str(), error)),
            _ => None,
        })
        .collect();
    if !failed.is_empty() {
        out.push_str("Failed downloads:\n");
        for (url, error) in failed {
            out.push_str(&format!("  - {} ({})\n", url, error));
        }
        out.push('\n');
    }

    out.push_str(&format!("Duration: {:.1}s\n", report.duration_secs));
    out.push_str(&format!("Output directory: {}\n", report.out_dir.display()));
    out
}

/// Prints the summary to stdout
pub fn print_summary(report: &RunReport) {
    print!("{}", format_summary(report));
}

/// Writes the report as pretty-printed JSON
pub fn write_json_report(report: &RunReport, path: &Path) -> Result<(), crate::GleanError> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    tracing::info!("Wrote run report to {}", path.display());
    Ok(())
}

/// Human-readable byte count, e.g. `1.5 KB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        let rounded = format!("{:.2}", value);
        let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
        format!("{} {}", trimmed, UNITS[unit])
    }
}
