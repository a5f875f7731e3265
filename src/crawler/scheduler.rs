//! Scheduler for managing the crawl frontier and concurrency
//!
//! This module handles:
//! - FIFO frontier of discovered URLs, each tagged with its depth
//! - Global concurrency limiting via a semaphore
//! - The visited set: the single point where a URL is claimed for fetching

use crate::state::PageState;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

/// A URL waiting in the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    /// Normalized URL to visit
    pub url: Url,

    /// Link distance from the seed (seeds are depth 0)
    pub depth: u32,
}

impl CrawlTask {
    pub fn new(url: Url, depth: u32) -> Self {
        Self { url, depth }
    }
}

/// A task popped from the frontier together with its concurrency slot
///
/// Dropping the permit frees the slot.
pub struct ScheduledTask {
    pub task: CrawlTask,
    pub permit: OwnedSemaphorePermit,
}

/// Frontier queue, visited set and concurrency limiter
pub struct Scheduler {
    /// Global semaphore for limiting concurrent page fetches
    permits: Arc<Semaphore>,

    /// URLs waiting to be considered, in discovery order
    frontier: VecDeque<CrawlTask>,

    /// Every URL ever enqueued; the first depth a URL is seen at wins
    seen: HashSet<String>,

    /// URLs claimed for fetching and how far they got; frontier entries are
    /// implicitly `Pending`
    visited: HashMap<String, PageState>,
}

impl Scheduler {
    /// Creates a scheduler admitting at most `concurrency` fetches at once
    pub fn new(concurrency: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            frontier: VecDeque::new(),
            seen: HashSet::new(),
            visited: HashMap::new(),
        }
    }

    /// Adds a URL to the frontier
    ///
    /// Returns false if the URL was already enqueued or visited.
    pub fn enqueue(&mut self, task: CrawlTask) -> bool {
        let key = task.url.as_str();
        if self.visited.contains_key(key) || !self.seen.insert(key.to_string()) {
            return false;
        }
        self.frontier.push_back(task);
        true
    }

    /// Pops the next task if a concurrency slot is free
    ///
    /// Returns None when the frontier is empty or every slot is taken; the
    /// caller retries after an in-flight task completes.
    pub fn next_task(&mut self) -> Option<ScheduledTask> {
        if self.frontier.is_empty() {
            return None;
        }

        let permit = Arc::clone(&self.permits).try_acquire_owned().ok()?;
        let task = self.frontier.pop_front()?;
        tracing::trace!("Scheduling {} at depth {}", task.url, task.depth);
        Some(ScheduledTask { task, permit })
    }

    /// Claims `url` for fetching
    ///
    /// Returns false if the URL was already claimed. This check-and-insert
    /// happens before any fetch work starts, so two discoveries of the same
    /// URL can never both be fetched.
    pub fn mark_fetching(&mut self, url: &Url) -> bool {
        match self.visited.entry(url.as_str().to_string()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(PageState::Fetching);
                true
            }
        }
    }

    /// Records the terminal state of a claimed URL
    pub fn complete(&mut self, url: &Url, outcome: PageState) {
        match self.visited.get_mut(url.as_str()) {
            Some(state) if state.can_transition_to(outcome) => *state = outcome,
            Some(state) => {
                tracing::warn!("Ignoring transition {} -> {} for {}", state, outcome, url);
            }
            None => {
                tracing::warn!("Completed URL was never claimed: {}", url);
            }
        }
    }

    pub fn is_visited(&self, url: &Url) -> bool {
        self.visited.contains_key(url.as_str())
    }

    /// Current state of `url`: `Pending` while it waits in the frontier,
    /// then whatever the visited set records
    pub fn state_of(&self, url: &Url) -> Option<PageState> {
        if let Some(state) = self.visited.get(url.as_str()) {
            return Some(*state);
        }
        self.frontier
            .iter()
            .any(|task| task.url == *url)
            .then_some(PageState::Pending)
    }

    /// Returns the number of URLs in the frontier
    pub fn frontier_size(&self) -> usize {
        self.frontier.len()
    }

    /// Returns whether the frontier is empty
    pub fn is_empty(&self) -> bool {
        self.frontier.is_empty()
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Consumes the scheduler, returning the visited set
    pub fn into_visited(self) -> HashMap<String, PageState> {
        self.visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(path: &str, depth: u32) -> CrawlTask {
        CrawlTask::new(
            Url::parse(&format!("https://example.test{}", path)).unwrap(),
            depth,
        )
    }

    #[test]
    fn test_new_scheduler() {
        let scheduler = Scheduler::new(4);
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.available_slots(), 4);
        assert_eq!(scheduler.visited_count(), 0);
    }

    #[test]
    fn test_zero_concurrency_still_progresses() {
        let mut scheduler = Scheduler::new(0);
        scheduler.enqueue(task("/a", 0));
        assert!(scheduler.next_task().is_some());
    }

    #[test]
    fn test_enqueue_is_fifo() {
        let mut scheduler = Scheduler::new(4);
        assert!(scheduler.enqueue(task("/a", 0)));
        assert!(scheduler.enqueue(task("/b", 1)));
        assert!(scheduler.enqueue(task("/c", 1)));

        let order: Vec<String> = std::iter::from_fn(|| scheduler.next_task())
            .map(|s| s.task.url.path().to_string())
            .collect();
        assert_eq!(order, vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn test_first_seen_depth_wins() {
        let mut scheduler = Scheduler::new(4);
        assert!(scheduler.enqueue(task("/a", 2)));
        assert!(!scheduler.enqueue(task("/a", 1)));
        assert_eq!(scheduler.frontier_size(), 1);
        assert_eq!(scheduler.next_task().unwrap().task.depth, 2);
    }

    #[test]
    fn test_permits_bound_in_flight() {
        let mut scheduler = Scheduler::new(2);
        for path in ["/a", "/b", "/c"] {
            scheduler.enqueue(task(path, 0));
        }

        let first = scheduler.next_task().unwrap();
        let _second = scheduler.next_task().unwrap();
        assert!(scheduler.next_task().is_none());
        assert_eq!(scheduler.frontier_size(), 1);

        drop(first);
        assert_eq!(scheduler.next_task().unwrap().task.url.path(), "/c");
    }

    #[test]
    fn test_mark_fetching_once() {
        let mut scheduler = Scheduler::new(2);
        let url = task("/a", 0).url;
        assert!(scheduler.mark_fetching(&url));
        assert!(!scheduler.mark_fetching(&url));
        assert_eq!(scheduler.state_of(&url), Some(PageState::Fetching));

        // A visited URL cannot re-enter the frontier
        assert!(!scheduler.enqueue(CrawlTask::new(url.clone(), 1)));
    }

    #[test]
    fn test_queued_url_is_pending() {
        let mut scheduler = Scheduler::new(2);
        let queued = task("/a", 0);
        let url = queued.url.clone();
        assert_eq!(scheduler.state_of(&url), None);

        scheduler.enqueue(queued);
        assert_eq!(scheduler.state_of(&url), Some(PageState::Pending));

        let scheduled = scheduler.next_task().unwrap();
        assert_eq!(scheduler.state_of(&url), None);
        assert!(scheduler.mark_fetching(&scheduled.task.url));
        assert_eq!(scheduler.state_of(&url), Some(PageState::Fetching));
    }

    #[test]
    fn test_complete_transitions() {
        let mut scheduler = Scheduler::new(2);
        let url = task("/a", 0).url;
        scheduler.mark_fetching(&url);
        scheduler.complete(&url, PageState::Extracted);
        assert_eq!(scheduler.state_of(&url), Some(PageState::Extracted));

        // Terminal states stay put
        scheduler.complete(&url, PageState::FetchFailed);
        assert_eq!(scheduler.state_of(&url), Some(PageState::Extracted));

        let unclaimed = task("/never", 0).url;
        scheduler.complete(&unclaimed, PageState::Extracted);
        assert!(!scheduler.is_visited(&unclaimed));
    }
}
