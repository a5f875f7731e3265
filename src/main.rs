//! Site-Gleaner main entry point
//!
//! This is the command-line interface for the Site-Gleaner image harvester.

use anyhow::Context;
use clap::Parser;
use site_gleaner::config::{load_file_config, parse_seed, validate, Config, DelayRange, Renderer};
use site_gleaner::output::{print_summary, write_json_report};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Site-Gleaner: a polite image harvester
///
/// Site-Gleaner crawls a website from a seed URL, renders each page,
/// collects every image it references and mirrors those images into a
/// local directory. Traversal stays within the configured depth and
/// origin and respects robots.txt unless told otherwise.
#[derive(Parser, Debug)]
#[command(name = "site-gleaner")]
#[command(version)]
#[command(about = "A polite image harvester", long_about = None)]
struct Cli {
    /// Seed URL to start crawling from
    #[arg(long, value_name = "URL")]
    url: String,

    /// Only follow links on the seed's origin (default)
    #[arg(long, overrides_with = "no_same_origin")]
    same_origin: bool,

    /// Follow links to any origin
    #[arg(long, overrides_with = "same_origin")]
    no_same_origin: bool,

    /// Maximum link depth from the seed (seed is depth 0)
    #[arg(long, default_value_t = 2)]
    depth: u32,

    /// Maximum concurrent page fetches and image downloads
    #[arg(long, default_value_t = 6)]
    concurrency: usize,

    /// Output directory for downloaded images
    #[arg(long, value_name = "DIR", default_value = "./public")]
    out: PathBuf,

    /// Do not consult robots.txt
    #[arg(long)]
    ignore_robots: bool,

    /// User agent for page loads, robots.txt and downloads
    #[arg(long, value_name = "UA", default_value = site_gleaner::config::DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Per-page load timeout in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 30_000)]
    timeout: u64,

    /// Random delay before each page fetch, in milliseconds (min-max)
    #[arg(long, value_name = "MIN-MAX", default_value = "250-600")]
    delay: DelayRange,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Page renderer
    #[arg(long, value_enum, default_value_t = Renderer::Browser)]
    renderer: Renderer,

    /// Optional TOML file with extra seeds, folder rules and fetch tuning
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write a JSON report of the run to this path
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    let report_path = cli.report.clone();
    let config = match build_config(cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {:#}", e);
            return Err(e);
        }
    };

    tracing::info!(
        "Harvesting {} (depth {}, concurrency {}, same-origin {}, robots {})",
        config.seed,
        config.max_depth,
        config.concurrency,
        config.same_origin,
        if config.ignore_robots { "ignored" } else { "respected" }
    );

    let report = match site_gleaner::run(config).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            return Err(e.into());
        }
    };

    print_summary(&report);

    if let Some(path) = report_path {
        if let Err(e) = write_json_report(&report, &path) {
            tracing::error!("Failed to write report to {}: {}", path.display(), e);
        }
    }

    Ok(())
}

/// Builds the run configuration from flags and the optional config file
fn build_config(cli: Cli) -> anyhow::Result<Config> {
    let seed = parse_seed(&cli.url)?;

    let mut config = Config::new(seed);
    config.same_origin = !cli.no_same_origin;
    config.max_depth = cli.depth;
    config.concurrency = cli.concurrency;
    config.out_dir = cli.out;
    config.ignore_robots = cli.ignore_robots;
    config.user_agent = cli.user_agent;
    config.page_timeout = Duration::from_millis(cli.timeout);
    config.delay = cli.delay;
    config.verbose = cli.verbose;
    config.renderer = cli.renderer;

    if let Some(path) = &cli.config {
        tracing::info!("Loading configuration from: {}", path.display());
        let file = load_file_config(path)
            .with_context(|| format!("loading {}", path.display()))?;
        config.apply_file(file)?;
    }

    validate(&config)?;
    Ok(config)
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("site_gleaner=debug,info")
    } else {
        EnvFilter::new("site_gleaner=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}
