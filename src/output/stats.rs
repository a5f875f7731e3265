//! Run statistics
//!
//! Counters accumulated by the crawl loop and derived from the download
//! records, in the form they are printed and serialized.

use crate::crawler::PolicyRejection;
use crate::download::{DownloadRecord, DownloadStatus};
use serde::Serialize;

/// Crawl-phase counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlStats {
    /// Pages claimed in the visited set and handed to the fetcher
    pub pages_visited: usize,

    /// Pages rendered and run through the extractors
    pub pages_extracted: usize,

    /// Pages whose fetch failed
    pub pages_failed: usize,

    /// Unique image URLs collected across all pages
    pub images_found: usize,

    /// Links seen on extracted pages (before dedup and policy)
    pub links_discovered: usize,

    /// Candidates rejected for exceeding the depth limit
    pub rejected_depth: usize,

    /// Candidates rejected for leaving the seed origin
    pub rejected_cross_origin: usize,

    /// Candidates rejected by robots.txt
    pub rejected_robots: usize,
}

impl CrawlStats {
    pub fn record_rejection(&mut self, reason: PolicyRejection) {
        match reason {
            PolicyRejection::DepthExceeded => self.rejected_depth += 1,
            PolicyRejection::CrossOrigin => self.rejected_cross_origin += 1,
            PolicyRejection::Robots => self.rejected_robots += 1,
        }
    }

    pub fn total_rejected(&self) -> usize {
        self.rejected_depth + self.rejected_cross_origin + self.rejected_robots
    }
}

/// Download-phase counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadStats {
    /// Image URLs handed to the downloader
    pub attempted: usize,

    /// Files fetched over the network
    pub downloaded: usize,

    /// Files skipped because they were already on disk
    pub already_present: usize,

    /// Downloads that failed
    pub failed: usize,

    /// Bytes transferred over the network
    pub bytes: u64,
}

impl DownloadStats {
    pub fn from_records(records: &[DownloadRecord]) -> Self {
        let mut stats = Self {
            attempted: records.len(),
            ..Self::default()
        };

        for record in records {
            match &record.status {
                DownloadStatus::Downloaded => {
                    stats.downloaded += 1;
                    stats.bytes += record.size;
                }
                DownloadStatus::AlreadyPresent => stats.already_present += 1,
                DownloadStatus::Failed { .. } => stats.failed += 1,
            }
        }
        stats
    }

    /// Downloads that left a file on disk
    pub fn succeeded(&self) -> usize {
        self.downloaded + self.already_present
    }
}
