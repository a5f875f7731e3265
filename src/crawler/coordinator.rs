//! Crawl coordinator
//!
//! Owns the frontier, visited set and aggregated results. The loop
//! alternates between two steps until no work is left:
//! 1. Dispatch: pop tasks while slots are free, run them through the crawl
//!    policy, claim them in the visited set and spawn the fetch
//! 2. Merge: wait for one fetch to finish, record its images and enqueue its
//!    links one level deeper
//!
//! Only this loop mutates crawl state; spawned tasks just fetch and extract.

use super::fetcher::{PageFetcher, RenderedPage};
use super::images::collect_images;
use super::parser::collect_links;
use super::policy::{CrawlPolicy, PolicyDecision, PolicyRejection};
use super::scheduler::{CrawlTask, ScheduledTask, Scheduler};
use crate::config::Config;
use crate::output::CrawlStats;
use crate::state::{PageState, RunState};
use crate::url::{normalize_parsed, normalize_url};
use crate::{FetchError, GleanError};
use reqwest::Client;
use scraper::Html;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinSet;

/// Everything a finished crawl produced
#[derive(Debug, Clone, Serialize)]
pub struct CrawlOutcome {
    /// Terminal run state
    pub state: RunState,

    /// Unique absolute image URLs across all extracted pages
    pub images: BTreeSet<String>,

    /// Images found on each extracted page, keyed by page URL
    pub page_images: BTreeMap<String, BTreeSet<String>>,

    /// Final state of every URL claimed for fetching
    pub visited: BTreeMap<String, PageState>,

    /// Candidates the crawl policy turned away
    pub rejected: BTreeMap<String, PolicyRejection>,

    /// Pages whose fetch failed, with the reason
    pub failures: Vec<PageFailure>,

    pub stats: CrawlStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageFailure {
    pub url: String,
    pub reason: String,
}

/// Extraction results for one page
#[derive(Debug)]
struct PageHarvest {
    images: BTreeSet<String>,
    links: BTreeSet<String>,
}

/// What a spawned page task hands back to the loop
#[derive(Debug)]
struct PageResult {
    task: CrawlTask,
    outcome: Result<PageHarvest, FetchError>,
}

/// Bounded, polite site traversal driven by a [`PageFetcher`]
pub struct Crawler<F: PageFetcher> {
    config: Arc<Config>,
    fetcher: Arc<F>,
    policy: CrawlPolicy,
    scheduler: Scheduler,
    state: RunState,
    images: BTreeSet<String>,
    page_images: BTreeMap<String, BTreeSet<String>>,
    rejected: BTreeMap<String, PolicyRejection>,
    failures: Vec<PageFailure>,
    stats: CrawlStats,
}

impl<F: PageFetcher> Crawler<F> {
    /// Creates a crawler; robots.txt will be fetched through `client`
    pub fn new(config: Arc<Config>, fetcher: Arc<F>, client: Client) -> Self {
        let policy = CrawlPolicy::new(&config, client);
        Self::with_policy(config, fetcher, policy)
    }

    /// Creates a crawler with an explicit admission policy
    pub fn with_policy(config: Arc<Config>, fetcher: Arc<F>, policy: CrawlPolicy) -> Self {
        let scheduler = Scheduler::new(config.concurrency);
        Self {
            config,
            fetcher,
            policy,
            scheduler,
            state: RunState::Idle,
            images: BTreeSet::new(),
            page_images: BTreeMap::new(),
            rejected: BTreeMap::new(),
            failures: Vec::new(),
            stats: CrawlStats::default(),
        }
    }

    /// Runs the crawl to completion
    ///
    /// Returns an error only if the run cannot start (an unusable seed).
    /// Page failures are recorded in the outcome.
    pub async fn run(mut self) -> Result<CrawlOutcome, GleanError> {
        let seeds = match self.seed_tasks() {
            Ok(seeds) => seeds,
            Err(e) => {
                self.state.transition(RunState::Failed)?;
                return Err(e);
            }
        };
        self.state.transition(RunState::Running)?;

        for seed in seeds {
            self.scheduler.enqueue(seed);
        }

        tracing::info!(
            "Starting crawl of {} (max depth {}, concurrency {})",
            self.config.seed,
            self.config.max_depth,
            self.config.concurrency
        );

        let start_time = Instant::now();
        let mut in_flight: JoinSet<PageResult> = JoinSet::new();

        loop {
            self.dispatch(&mut in_flight).await;

            match in_flight.join_next().await {
                Some(Ok(result)) => self.merge(result),
                Some(Err(e)) => {
                    tracing::error!("Page task aborted: {}", e);
                    self.stats.pages_failed += 1;
                }
                None => {
                    tracing::info!("Frontier is empty, crawl complete");
                    break;
                }
            }

            let finished = self.stats.pages_extracted + self.stats.pages_failed;
            if finished > 0 && finished % 10 == 0 {
                tracing::info!(
                    "Progress: {} pages done, {} in flight, {} in frontier, {} images so far",
                    finished,
                    in_flight.len(),
                    self.scheduler.frontier_size(),
                    self.images.len()
                );
            }
        }

        self.state.transition(RunState::Completed)?;
        self.stats.images_found = self.images.len();

        tracing::info!(
            "Crawl completed: {} pages visited, {} images found in {:.1}s",
            self.stats.pages_visited,
            self.stats.images_found,
            start_time.elapsed().as_secs_f64()
        );

        Ok(CrawlOutcome {
            state: self.state,
            images: self.images,
            page_images: self.page_images,
            visited: self.scheduler.into_visited().into_iter().collect(),
            rejected: self.rejected,
            failures: self.failures,
            stats: self.stats,
        })
    }

    /// Normalized depth-0 tasks, the primary seed first
    fn seed_tasks(&self) -> Result<Vec<CrawlTask>, GleanError> {
        self.config
            .seeds()
            .map(|seed| {
                normalize_parsed(seed.clone())
                    .map(|url| CrawlTask::new(url, 0))
                    .map_err(GleanError::from)
            })
            .collect()
    }

    /// Spawns fetches while there is queued work and a free slot
    async fn dispatch(&mut self, in_flight: &mut JoinSet<PageResult>) {
        while let Some(ScheduledTask { task, permit }) = self.scheduler.next_task() {
            let decision = self.policy.evaluate(&task.url, task.depth).await;
            if let PolicyDecision::Reject(reason) = decision {
                self.record_rejection(&task, reason);
                continue;
            }

            if !self.scheduler.mark_fetching(&task.url) {
                tracing::debug!("Already visited: {}", task.url);
                continue;
            }
            self.stats.pages_visited += 1;

            tracing::info!(
                "Visiting [depth {}/{}]: {}",
                task.depth,
                self.config.max_depth,
                task.url
            );

            let delay = self.config.delay.sample(self.policy.crawl_delay().await);
            let fetcher = Arc::clone(&self.fetcher);
            let timeout = self.config.page_timeout;
            in_flight.spawn(visit_page(fetcher, task, timeout, delay, permit));
        }
    }

    fn record_rejection(&mut self, task: &CrawlTask, reason: PolicyRejection) {
        match reason {
            PolicyRejection::Robots => tracing::warn!("Blocked by robots.txt: {}", task.url),
            _ => tracing::debug!("Skipping {} ({})", task.url, reason),
        }
        self.stats.record_rejection(reason);
        self.rejected.insert(task.url.to_string(), reason);
    }

    /// Folds one finished page into the aggregate state
    fn merge(&mut self, result: PageResult) {
        let PageResult { task, outcome } = result;

        let harvest = match outcome {
            Ok(harvest) => harvest,
            Err(e) => {
                tracing::warn!("{}", e);
                self.scheduler.complete(&task.url, PageState::FetchFailed);
                self.stats.pages_failed += 1;
                self.failures.push(PageFailure {
                    url: task.url.to_string(),
                    reason: e.cause.to_string(),
                });
                return;
            }
        };

        self.scheduler.complete(&task.url, PageState::Extracted);
        self.stats.pages_extracted += 1;
        self.stats.links_discovered += harvest.links.len();

        if !harvest.images.is_empty() {
            tracing::info!("Found {} images on {}", harvest.images.len(), task.url);
        }
        self.images.extend(harvest.images.iter().cloned());
        self.page_images.insert(task.url.to_string(), harvest.images);

        if task.depth >= self.config.max_depth {
            return;
        }

        for link in harvest.links {
            match normalize_url(&link) {
                Ok(url) => {
                    self.scheduler.enqueue(CrawlTask::new(url, task.depth + 1));
                }
                Err(e) => tracing::debug!("Failed to normalize URL {}: {}", link, e),
            }
        }
    }
}

/// Body of one spawned page task: politeness delay, fetch, extract
async fn visit_page<F: PageFetcher>(
    fetcher: Arc<F>,
    task: CrawlTask,
    timeout: Duration,
    delay: Duration,
    permit: OwnedSemaphorePermit,
) -> PageResult {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let outcome = fetcher
        .fetch(&task.url, timeout)
        .await
        .map(|page| harvest(&page));

    drop(permit);
    PageResult { task, outcome }
}

fn harvest(page: &RenderedPage) -> PageHarvest {
    let document = Html::parse_document(&page.html);
    PageHarvest {
        images: collect_images(&document, page),
        links: collect_links(&document, &page.url),
    }
}
