/// Per-URL state definitions for tracking crawl progress
///
/// A URL is `Pending` while it waits in the frontier, becomes `Fetching` at the
/// moment it is recorded in the visited set, and ends as `Extracted` or
/// `FetchFailed`.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    // ===== Active States =====
    /// Discovered and waiting in the frontier
    Pending,

    /// Dispatched to the page fetcher
    Fetching,

    // ===== Terminal States =====
    /// Rendered and run through the image and link extractors
    Extracted,

    /// Rendering failed (timeout, DNS, non-committing navigation, HTTP error)
    FetchFailed,
}

impl PageState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Extracted | Self::FetchFailed)
    }

    /// Returns true if this represents a successful completion
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Extracted)
    }

    /// Returns true if the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: PageState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Fetching)
                | (Self::Fetching, Self::Extracted)
                | (Self::Fetching, Self::FetchFailed)
        )
    }

    /// Stable lowercase name used in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Extracted => "extracted",
            Self::FetchFailed => "fetch_failed",
        }
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
