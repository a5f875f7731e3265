//! Configuration module for Site-Gleaner
//!
//! Run settings come from command-line flags; an optional TOML file adds
//! extra seeds, the per-page folder table and fetch tuning.
//!
//! # Example
//!
//! ```no_run
//! use site_gleaner::config::{load_file_config, parse_seed, validate, Config};
//! use std::path::Path;
//!
//! let mut config = Config::new(parse_seed("https://example.test/").unwrap());
//! config.apply_file(load_file_config(Path::new("gleaner.toml")).unwrap()).unwrap();
//! validate(&config).unwrap();
//! println!("Crawler will use max depth: {}", config.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, DelayRange, FileConfig, FolderRule, Renderer, DEFAULT_USER_AGENT};

// Re-export parser and validation functions
pub use parser::{load_file_config, parse_file_config};
pub use validation::{parse_seed, validate};
