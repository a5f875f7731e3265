//! Robots.txt rule matching
//!
//! Wraps the robotstxt crate's matcher and adds the `Crawl-delay` lookup it
//! does not expose.

use robotstxt::DefaultMatcher;

/// Agent token every robots.txt check is made for
pub const WILDCARD_AGENT: &str = "*";

/// Parsed robots.txt rules for one origin
#[derive(Debug, Clone)]
pub struct RobotsRules {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
    /// Whether to allow all (true = allow all, false = consult content)
    allow_all: bool,
}

impl RobotsRules {
    /// Creates rules from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// Creates permissive rules that allow everything
    ///
    /// This is what a missing or unreachable robots.txt turns into.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Returns true if these rules allow every URL
    pub fn is_permissive(&self) -> bool {
        self.allow_all || self.content.trim().is_empty()
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - The full URL to check (e.g., "https://example.test/page.html")
    /// * `user_agent` - The agent token to match groups against
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.is_permissive() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Checks a URL against the wildcard (`User-agent: *`) group
    pub fn allows(&self, url: &str) -> bool {
        self.is_allowed(url, WILDCARD_AGENT)
    }

    /// Gets the crawl delay for a specific user agent
    ///
    /// # Returns
    ///
    /// * `Some(f64)` - The crawl delay in seconds
    /// * `None` - If no crawl delay is specified
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        if self.is_permissive() {
            return None;
        }

        // A Crawl-delay line applies to the User-agent group directly above it
        let mut current_user_agents: Vec<String> = Vec::new();
        let mut crawl_delay_for_wildcard: Option<f64> = None;
        let mut crawl_delay_for_agent: Option<f64> = None;
        let mut group_open = false;

        let normalized_agent = user_agent.to_lowercase();

        for line in self.content.lines() {
            let trimmed = line.split('#').next().unwrap_or("").trim();
            if trimmed.is_empty() {
                continue;
            }

            let Some((key, value)) = trimmed.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    // Consecutive User-agent lines share one group
                    if !group_open {
                        current_user_agents.clear();
                        group_open = true;
                    }
                    current_user_agents.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    group_open = false;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    if !delay.is_finite() || delay < 0.0 {
                        continue;
                    }
                    if current_user_agents.iter().any(|ua| ua == "*") {
                        crawl_delay_for_wildcard = Some(delay);
                    } else if current_user_agents
                        .iter()
                        .any(|ua| normalized_agent != "*" && normalized_agent.contains(ua.as_str()))
                    {
                        crawl_delay_for_agent = Some(delay);
                    }
                }
                _ => {
                    group_open = false;
                }
            }
        }

        // Prefer specific user-agent delay over wildcard delay
        crawl_delay_for_agent.or(crawl_delay_for_wildcard)
    }
}
