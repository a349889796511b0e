//! Harvest Engine main entry point
//!
//! This is the command-line interface for the incremental harvester.

use anyhow::Context;
use clap::Parser;
use harvest_engine::config::{load_config_with_hash, parse_timestamp, Config};
use harvest_engine::output::print_summary;
use harvest_engine::Harvester;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Harvest Engine: an incremental, polite document harvester
///
/// Crawls seed sites, downloads bulk artifacts and samples API endpoints,
/// respecting robots.txt and reusing unchanged content from earlier runs.
#[derive(Parser, Debug)]
#[command(name = "harvest-engine")]
#[command(version)]
#[command(about = "An incremental, polite document harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Refetch records older than this ISO-8601 timestamp (overrides the config)
    #[arg(long, value_name = "TS")]
    since: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be harvested without fetching
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(since) = &cli.since {
        config.since = Some(parse_timestamp(since)?);
    }

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    let summary = Harvester::new(config)?
        .with_config_hash(config_hash)
        .run()
        .await
        .context("harvest failed")?;

    if !cli.quiet {
        print_summary(&summary);
    }
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("harvest_engine=info,warn"),
            1 => EnvFilter::new("harvest_engine=debug,info"),
            2 => EnvFilter::new("harvest_engine=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the validated config and its seeds
fn handle_dry_run(config: &Config) {
    println!("=== Harvest Engine Dry Run ===\n");

    println!("Output root: {}", config.output.root.display());
    match config.since {
        Some(since) => println!("Refetch records older than: {}", since.to_rfc3339()),
        None => println!("Refetch records older than: (never, recorded URLs are skipped)"),
    }

    println!("\nCrawl:");
    println!("  Max pages: {}", config.crawl.max_pages);
    println!("  Max attachments: {}", config.crawl.max_attachments);
    println!("  Max depth: {}", config.crawl.max_depth);
    println!(
        "  Workers: {} ({} per host)",
        config.crawl.workers, config.crawl.per_host_workers
    );

    println!("\nFetch:");
    println!("  User agent: {}", config.fetch.user_agent);
    println!("  Timeout: {}s", config.fetch.timeout_seconds);
    println!("  Attempts: {}", config.fetch.max_attempts());
    println!("  Backoff cap: {:?}", config.fetch.backoff_cap());
    println!("  Throttle: {:?}", config.fetch.throttle());

    println!("\nSeeds ({}):", config.crawl.seeds.len());
    for seed in &config.crawl.seeds {
        println!("  - {}", seed);
    }

    println!(
        "\nBulk URLs ({}, max {} / {} bytes):",
        config.bulk.urls.len(),
        config.bulk.max_bulk,
        config.bulk.max_bulk_bytes
    );
    for url in &config.bulk.urls {
        println!("  - {}", url);
    }

    println!(
        "\nAPI samples ({}, limit {}):",
        config.api_samples.urls.len(),
        config.api_samples.limit
    );
    for url in &config.api_samples.urls {
        println!("  - {}", url);
    }

    println!("\n✓ Configuration is valid");
}
