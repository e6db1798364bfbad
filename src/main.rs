//! # trend-harvest CLI (`harvest`)
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest run` | Fetch trends, search, save, share, persist, deliver |
//! | `harvest search "<query>"` | Search the configured groups for one title |
//! | `harvest save <url>` | Save one share link into the drive |
//! | `harvest account` | Verify the cookie and print the nickname |
//! | `harvest groups` | Check that each configured group resolves |
//! | `harvest cache prune` | Drop expired cache entries |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use trend_harvest::{cache, collector, config, drive, logging, search, sources};

/// trend-harvest: turn trending titles into fresh drive share links.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. The cookie and group list can also come from `DRIVE_COOKIE` and
/// `TARGET_GROUPS`.
#[derive(Parser)]
#[command(name = "harvest", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline once.
    ///
    /// Verifies the drive account, fetches trending titles, bulk-searches each
    /// one, writes `latest.json` plus a timestamped copy, and delivers the
    /// results when delivery is enabled. Ctrl-C stops the run cleanly.
    Run {
        /// Stop after the first title that produced results.
        #[arg(long)]
        test: bool,

        /// Debug logging and search progress on stderr.
        #[arg(long)]
        debug: bool,
    },

    /// Search the configured groups for one title.
    ///
    /// Streams matching results as JSON lines. With `--bulk`, saves and
    /// re-shares the first matching link instead.
    Search {
        /// Title to search for.
        query: String,

        /// Minimum similarity (0-100) for streaming mode.
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        min_similarity: Option<u8>,

        /// Bulk mode: first link that saves and re-shares wins.
        #[arg(long)]
        bulk: bool,

        /// Messages to scan per group in bulk mode.
        #[arg(long)]
        limit: Option<usize>,

        /// Debug logging and search progress on stderr.
        #[arg(long)]
        debug: bool,
    },

    /// Save one share link into the drive.
    Save {
        /// Public share URL.
        url: String,

        /// Also publish the saved file under a new share link.
        #[arg(long)]
        share: bool,
    },

    /// Verify the drive cookie and print the account nickname.
    Account,

    /// Check that every configured group can be read.
    Groups,

    /// Search cache maintenance.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Drop expired entries and rewrite the snapshot.
    Prune,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let verbose = matches!(
        cli.command,
        Commands::Run { debug: true, .. } | Commands::Search { debug: true, .. }
    );
    let _guard = logging::init_logging(&cfg.logging, verbose);

    match cli.command {
        Commands::Run { test, debug } => {
            tokio::select! {
                outcome = collector::run_collect(&cfg, test, debug) => outcome?,
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted, stopping run");
                    println!("Interrupted.");
                }
            }
        }
        Commands::Search {
            query,
            min_similarity,
            bulk,
            limit,
            debug,
        } => {
            tokio::select! {
                outcome = search::run_search(&cfg, &query, min_similarity, bulk, limit, debug) => outcome?,
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted, stopping search");
                }
            }
        }
        Commands::Save { url, share } => {
            drive::run_save(&cfg, &url, share).await?;
        }
        Commands::Account => {
            drive::run_account(&cfg).await?;
        }
        Commands::Groups => {
            sources::list_groups(&cfg).await?;
        }
        Commands::Cache { action } => match action {
            CacheAction::Prune => cache::run_cache_prune(&cfg.cache),
        },
    }

    Ok(())
}
