//! Crawl admission policy
//!
//! Every candidate URL passes two gates before it may be visited:
//! 1. Scope: depth limit, and same-origin with the seed when enabled
//! 2. Robots: the seed origin's robots.txt, checked for the `*` agent
//!
//! robots.txt is fetched lazily on the first evaluation and reused for the
//! rest of the run.

use crate::config::Config;
use crate::robots::{fetch_robots, RobotsRules, WILDCARD_AGENT};
use crate::url::same_origin;
use reqwest::Client;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::OnceCell;
use url::Url;

/// Why a candidate URL was not visited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRejection {
    DepthExceeded,
    CrossOrigin,
    Robots,
}

impl fmt::Display for PolicyRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::DepthExceeded => "beyond max depth",
            Self::CrossOrigin => "outside seed origin",
            Self::Robots => "disallowed by robots.txt",
        };
        write!(f, "{}", reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Reject(PolicyRejection),
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Source of robots.txt rules for the run
#[derive(Debug)]
struct RobotsGate {
    client: Client,
    origin: Url,
    rules: OnceCell<RobotsRules>,
}

impl RobotsGate {
    async fn rules(&self) -> &RobotsRules {
        self.rules
            .get_or_init(|| fetch_robots(&self.client, &self.origin))
            .await
    }
}

/// Decides whether a discovered URL may be visited
#[derive(Debug)]
pub struct CrawlPolicy {
    seed: Url,
    same_origin: bool,
    max_depth: u32,
    robots: Option<RobotsGate>,
}

impl CrawlPolicy {
    /// Policy for `config`; robots.txt is fetched through `client` on first use
    /// unless `ignore_robots` is set
    pub fn new(config: &Config, client: Client) -> Self {
        let robots = (!config.ignore_robots).then(|| RobotsGate {
            client,
            origin: config.seed.clone(),
            rules: OnceCell::new(),
        });
        Self {
            seed: config.seed.clone(),
            same_origin: config.same_origin,
            max_depth: config.max_depth,
            robots,
        }
    }

    /// Policy with robots.txt rules already loaded
    pub fn with_rules(config: &Config, rules: RobotsRules) -> Self {
        let robots = (!config.ignore_robots).then(|| RobotsGate {
            client: Client::new(),
            origin: config.seed.clone(),
            rules: OnceCell::new_with(Some(rules)),
        });
        Self {
            seed: config.seed.clone(),
            same_origin: config.same_origin,
            max_depth: config.max_depth,
            robots,
        }
    }

    /// Depth and origin checks only; never touches the network
    pub fn check_scope(&self, url: &Url, depth: u32) -> PolicyDecision {
        if depth > self.max_depth {
            return PolicyDecision::Reject(PolicyRejection::DepthExceeded);
        }
        if self.same_origin && !same_origin(url, &self.seed) {
            return PolicyDecision::Reject(PolicyRejection::CrossOrigin);
        }
        PolicyDecision::Allow
    }

    /// Full admission check: scope first, then robots.txt
    pub async fn evaluate(&self, url: &Url, depth: u32) -> PolicyDecision {
        let scope = self.check_scope(url, depth);
        if !scope.is_allowed() {
            return scope;
        }

        if let Some(gate) = &self.robots {
            if !gate.rules().await.is_allowed(url.as_str(), WILDCARD_AGENT) {
                return PolicyDecision::Reject(PolicyRejection::Robots);
            }
        }
        PolicyDecision::Allow
    }

    /// Minimum spacing between page fetches requested by robots.txt
    pub async fn crawl_delay(&self) -> Duration {
        let Some(gate) = &self.robots else {
            return Duration::ZERO;
        };
        gate.rules()
            .await
            .crawl_delay(WILDCARD_AGENT)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(Duration::ZERO)
    }
}
