use crate::ConfigError;
use rand::Rng;
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Desktop Chrome user agent sent when `--user-agent` is not given
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Resolved configuration for one harvest run
///
/// Built from command-line flags, optionally merged with a TOML file via
/// [`Config::apply_file`], then checked with [`crate::config::validate`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Seed URL; its origin defines same-origin scope and the robots.txt location
    pub seed: Url,

    /// Additional depth-0 entry points (from the config file)
    pub extra_seeds: Vec<Url>,

    /// Restrict traversal to the seed's origin
    pub same_origin: bool,

    /// Maximum link-following depth (seed is depth 0)
    pub max_depth: u32,

    /// Maximum number of in-flight page fetches, and of in-flight downloads
    pub concurrency: usize,

    /// Output root directory for downloaded images
    pub out_dir: PathBuf,

    /// Skip the robots.txt gate entirely
    pub ignore_robots: bool,

    /// User agent for page loads, robots.txt and image downloads
    pub user_agent: String,

    /// Per-page load timeout
    pub page_timeout: Duration,

    /// Random politeness delay before each page fetch
    pub delay: DelayRange,

    /// Debug-level logging
    pub verbose: bool,

    /// Which page fetcher renders pages
    pub renderer: Renderer,

    /// Per-image download timeout
    pub download_timeout: Duration,

    /// Redirect hops followed per image download
    pub max_redirects: usize,

    /// Settle delay after auto-scrolling, before the DOM snapshot
    pub settle_delay: Duration,

    /// Explicit Chrome/Chromium executable (auto-detected when None)
    pub chrome_path: Option<PathBuf>,

    /// Page URL pattern -> output subfolder table
    pub folders: Vec<FolderRule>,
}

impl Config {
    /// Creates a configuration with the default settings for `seed`
    pub fn new(seed: Url) -> Self {
        Self {
            seed,
            extra_seeds: Vec::new(),
            same_origin: true,
            max_depth: 2,
            concurrency: 6,
            out_dir: PathBuf::from("./public"),
            ignore_robots: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            page_timeout: Duration::from_millis(30_000),
            delay: DelayRange::new(250, 600),
            verbose: false,
            renderer: Renderer::Browser,
            download_timeout: Duration::from_millis(30_000),
            max_redirects: 5,
            settle_delay: Duration::from_millis(2_000),
            chrome_path: None,
            folders: Vec::new(),
        }
    }

    /// Merges settings from a config file over this configuration
    ///
    /// Only keys present in the file are applied.
    pub fn apply_file(&mut self, file: FileConfig) -> Result<(), ConfigError> {
        for seed in &file.seeds {
            let url = Url::parse(seed)
                .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;
            self.extra_seeds.push(url);
        }

        if let Some(ms) = file.download_timeout {
            self.download_timeout = Duration::from_millis(ms);
        }
        if let Some(hops) = file.max_redirects {
            self.max_redirects = hops;
        }
        if let Some(ms) = file.settle_delay {
            self.settle_delay = Duration::from_millis(ms);
        }
        if file.chrome_path.is_some() {
            self.chrome_path = file.chrome_path;
        }
        self.folders.extend(file.folders);

        Ok(())
    }

    /// All depth-0 entry points, the primary seed first
    pub fn seeds(&self) -> impl Iterator<Item = &Url> {
        std::iter::once(&self.seed).chain(self.extra_seeds.iter())
    }
}

/// Page fetcher implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Renderer {
    /// Headless Chromium: full JS execution, lazy-load scrolling, computed styles
    #[default]
    Browser,
    /// Plain HTTP GET; stylesheet backgrounds are matched against the static DOM
    Http,
}

/// Inclusive politeness delay range in milliseconds, written `min-max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: u64,
    pub max: u64,
}

impl DelayRange {
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    /// Draws a uniformly random delay, never shorter than `floor`
    pub fn sample(&self, floor: Duration) -> Duration {
        let ms = if self.max > self.min {
            rand::rng().random_range(self.min..=self.max)
        } else {
            self.min
        };
        Duration::from_millis(ms).max(floor)
    }
}

impl FromStr for DelayRange {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::Validation(format!("delay must be 'min-max' in ms, got '{}'", s));

        let (min, max) = match s.trim().split_once('-') {
            Some((min, max)) => (min.trim(), max.trim()),
            // A single number means a fixed delay
            None => (s.trim(), s.trim()),
        };

        let min: u64 = min.parse().map_err(|_| invalid())?;
        let max: u64 = max.parse().map_err(|_| invalid())?;

        if min > max {
            return Err(ConfigError::Validation(format!(
                "delay minimum {} exceeds maximum {}",
                min, max
            )));
        }

        Ok(Self { min, max })
    }
}

/// Maps source pages to an output subfolder
///
/// An image lands in `<out>/<name>/` when one of the pages referencing it
/// contains `pattern` as a substring of its URL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FolderRule {
    pub pattern: String,
    pub name: String,
}

/// Optional TOML configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Extra seed URLs crawled at depth 0
    #[serde(default)]
    pub seeds: Vec<String>,

    /// Per-image download timeout (milliseconds)
    #[serde(rename = "download-timeout")]
    pub download_timeout: Option<u64>,

    /// Maximum redirect hops per image download
    #[serde(rename = "max-redirects")]
    pub max_redirects: Option<usize>,

    /// Post-scroll settle delay (milliseconds)
    #[serde(rename = "settle-delay")]
    pub settle_delay: Option<u64>,

    /// Chrome/Chromium executable path
    #[serde(rename = "chrome-path")]
    pub chrome_path: Option<PathBuf>,

    /// Per-page output folder table
    #[serde(default, rename = "folder")]
    pub folders: Vec<FolderRule>,
}
