//! State management for crawl runs and the URLs inside them
//!
//! This module defines the run lifecycle and the per-URL page lifecycle.

mod page_state;
mod run_state;

pub use page_state::PageState;
pub use run_state::RunState;
