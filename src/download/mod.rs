//! Image downloader
//!
//! Mirrors image URLs into the output directory. Each URL is fetched at most
//! once per run; a local path is claimed for it before any I/O so that two
//! URLs never write to the same file. Failures are recorded, never raised.

mod path;

pub use path::{
    has_image_extension, infer_extension, local_path, unique_path, with_suffix, DEFAULT_EXTENSION,
    IMAGE_EXTENSIONS,
};

use crate::config::{Config, FolderRule};
use crate::crawler::CrawlOutcome;
use crate::output::format_bytes;
use crate::{DownloadError, GleanError};
use futures::stream::{self, StreamExt};
use reqwest::{redirect::Policy, Client};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

/// Outcome of one image download
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Fetched over the network and written to disk
    Downloaded,
    /// The target file already existed; nothing was fetched
    AlreadyPresent,
    Failed { error: DownloadError },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRecord {
    pub url: String,

    /// Target file, when one was assigned
    pub path: Option<PathBuf>,

    /// Bytes written, or the on-disk size for files already present
    pub size: u64,

    #[serde(flatten)]
    pub status: DownloadStatus,
}

impl DownloadRecord {
    fn failed(url: &str, path: Option<PathBuf>, error: DownloadError) -> Self {
        Self {
            url: url.to_string(),
            path,
            size: 0,
            status: DownloadStatus::Failed { error },
        }
    }

    /// True if the image ended up on disk
    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            DownloadStatus::Downloaded | DownloadStatus::AlreadyPresent
        )
    }
}

/// One image to fetch, with its optional output subfolder
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DownloadJob {
    pub url: String,
    pub folder: Option<String>,
}

impl DownloadJob {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            folder: None,
        }
    }

    pub fn in_folder(url: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            folder: Some(folder.into()),
        }
    }
}

/// Per-run bookkeeping; never held across an await
#[derive(Debug, Default)]
struct Ledger {
    /// Finished downloads by URL
    records: HashMap<String, DownloadRecord>,

    /// URLs with a transfer in progress
    in_flight: HashSet<String>,

    /// Relative paths already assigned, and the URL that owns each
    claimed: HashMap<PathBuf, String>,
}

enum Claim {
    /// Fetch into this absolute path
    Ready(PathBuf),
    /// The URL already has a final record
    Settled(DownloadRecord),
    InFlight,
}

/// Downloads images into an output root, at most once per URL
pub struct Downloader {
    client: Client,
    out_dir: PathBuf,
    concurrency: usize,
    ledger: Mutex<Ledger>,
}

impl Downloader {
    /// Creates a downloader using the run's user agent, timeout and redirect limit
    pub fn new(config: &Config) -> Result<Self, GleanError> {
        let client = build_download_client(
            &config.user_agent,
            config.download_timeout,
            config.max_redirects,
        )?;
        Ok(Self::with_client(
            client,
            config.out_dir.clone(),
            config.concurrency,
        ))
    }

    pub fn with_client(client: Client, out_dir: PathBuf, concurrency: usize) -> Self {
        Self {
            client,
            out_dir,
            concurrency: concurrency.max(1),
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Downloads `url` into the output root
    pub async fn download(&self, url: &str) -> DownloadRecord {
        self.download_job(DownloadJob::new(url)).await
    }

    /// Downloads one job
    ///
    /// A repeat call for a URL returns its existing record, or a
    /// [`DownloadError::Duplicate`] failure while the first call is still
    /// running. Neither touches the network or the disk.
    pub async fn download_job(&self, job: DownloadJob) -> DownloadRecord {
        match self.claim(&job) {
            Claim::Ready(target) => self.fetch_claimed(job.url, target).await,
            Claim::Settled(record) => record,
            Claim::InFlight => {
                debug!("Download already in progress: {}", job.url);
                DownloadRecord::failed(&job.url, None, DownloadError::Duplicate)
            }
        }
    }

    /// Downloads a batch with at most `concurrency` transfers at once
    ///
    /// Paths are claimed in sorted URL order before any transfer starts, so a
    /// given set of URLs always maps to the same files. Records come back
    /// sorted by URL.
    pub async fn download_all(&self, mut jobs: Vec<DownloadJob>) -> Vec<DownloadRecord> {
        jobs.sort();
        jobs.dedup_by(|a, b| a.url == b.url);

        let mut records = Vec::with_capacity(jobs.len());
        let mut ready = Vec::new();
        for job in jobs {
            match self.claim(&job) {
                Claim::Ready(target) => ready.push((job.url, target)),
                Claim::Settled(record) => records.push(record),
                Claim::InFlight => {
                    records.push(DownloadRecord::failed(&job.url, None, DownloadError::Duplicate))
                }
            }
        }

        let fetched: Vec<DownloadRecord> = stream::iter(ready)
            .map(|(url, target)| self.fetch_claimed(url, target))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        records.extend(fetched);
        records.sort_by(|a, b| a.url.cmp(&b.url));
        records
    }

    /// Snapshot of all finished records, sorted by URL
    pub fn records(&self) -> Vec<DownloadRecord> {
        let mut records: Vec<DownloadRecord> = self.ledger().records.values().cloned().collect();
        records.sort_by(|a, b| a.url.cmp(&b.url));
        records
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserves a unique path for `job`, or explains why no transfer is needed
    fn claim(&self, job: &DownloadJob) -> Claim {
        let mut ledger = self.ledger();

        if let Some(record) = ledger.records.get(&job.url) {
            return Claim::Settled(record.clone());
        }
        if ledger.in_flight.contains(&job.url) {
            return Claim::InFlight;
        }

        let url = match Url::parse(&job.url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => url,
            Ok(url) => {
                return self.settle_invalid(&mut ledger, &job.url, format!("unsupported scheme {}", url.scheme()));
            }
            Err(e) => return self.settle_invalid(&mut ledger, &job.url, e.to_string()),
        };

        let wanted = local_path(&url, job.folder.as_deref());
        let relative = unique_path(wanted, |candidate| ledger.claimed.contains_key(candidate));
        ledger.claimed.insert(relative.clone(), job.url.clone());
        ledger.in_flight.insert(job.url.clone());

        Claim::Ready(self.out_dir.join(relative))
    }

    fn settle_invalid(&self, ledger: &mut Ledger, url: &str, reason: String) -> Claim {
        warn!("Skipping invalid image URL {}: {}", url, reason);
        let record = DownloadRecord::failed(url, None, DownloadError::InvalidUrl(reason));
        ledger.records.insert(url.to_string(), record.clone());
        Claim::Settled(record)
    }

    async fn fetch_claimed(&self, url: String, target: PathBuf) -> DownloadRecord {
        let record = match self.transfer(&url, &target).await {
            Ok(record) => record,
            Err(error) => {
                warn!("Failed to download {}: {}", url, error);
                DownloadRecord::failed(&url, Some(target), error)
            }
        };

        let mut ledger = self.ledger();
        ledger.in_flight.remove(&url);
        ledger.records.insert(url, record.clone());
        record
    }

    async fn transfer(&self, url: &str, target: &Path) -> Result<DownloadRecord, DownloadError> {
        if let Ok(meta) = tokio::fs::metadata(target).await {
            if meta.is_file() {
                debug!("Already on disk: {}", target.display());
                return Ok(DownloadRecord {
                    url: url.to_string(),
                    path: Some(target.to_path_buf()),
                    size: meta.len(),
                    status: DownloadStatus::AlreadyPresent,
                });
            }
        }

        let size = self.stream_to_file(url, target).await?;
        info!(
            "Downloaded {} ({})",
            target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            format_bytes(size)
        );

        Ok(DownloadRecord {
            url: url.to_string(),
            path: Some(target.to_path_buf()),
            size,
            status: DownloadStatus::Downloaded,
        })
    }

    /// Streams the response body to `<target>.part`, then renames it into place
    async fn stream_to_file(&self, url: &str, target: &Path) -> Result<u64, DownloadError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_download_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status.as_u16()));
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        let partial = partial_path(target);
        let mut file = tokio::fs::File::create(&partial).await.map_err(io_error)?;
        let mut size: u64 = 0;

        let copied = async {
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| classify_download_error(&e))?
            {
                file.write_all(&chunk).await.map_err(io_error)?;
                size += chunk.len() as u64;
            }
            file.flush().await.map_err(io_error)
        }
        .await;
        drop(file);

        if let Err(e) = copied {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        if let Err(e) = tokio::fs::rename(&partial, target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(io_error(e));
        }
        Ok(size)
    }
}

/// HTTP client for image transfers
pub fn build_download_client(
    user_agent: &str,
    timeout: Duration,
    max_redirects: usize,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(max_redirects))
        .build()
}

/// One download job per discovered image
///
/// An image goes into the folder of the first rule matching any page it was
/// found on; pages are tried in sorted order and rules in table order.
pub fn plan_jobs(outcome: &CrawlOutcome, rules: &[FolderRule]) -> Vec<DownloadJob> {
    let mut found_on: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (page, images) in &outcome.page_images {
        for image in images {
            found_on.entry(image.as_str()).or_default().push(page.as_str());
        }
    }

    outcome
        .images
        .iter()
        .map(|image| {
            let folder = found_on
                .get(image.as_str())
                .and_then(|pages| pages.iter().find_map(|page| folder_for(page, rules)));
            DownloadJob {
                url: image.clone(),
                folder: folder.map(str::to_string),
            }
        })
        .collect()
}

/// Output subfolder for images found on `page_url`
pub fn folder_for<'a>(page_url: &str, rules: &'a [FolderRule]) -> Option<&'a str> {
    rules
        .iter()
        .find(|rule| page_url.contains(rule.pattern.as_str()))
        .map(|rule| rule.name.as_str())
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

fn io_error(e: std::io::Error) -> DownloadError {
    DownloadError::Io(e.to_string())
}

fn classify_download_error(e: &reqwest::Error) -> DownloadError {
    if e.is_timeout() {
        DownloadError::Timeout
    } else if e.is_redirect() {
        DownloadError::Network(format!("redirect limit exceeded: {}", e))
    } else {
        DownloadError::Network(e.to_string())
    }
}
