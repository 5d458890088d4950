mod config;
mod errors;
mod filter;
mod loader;
mod models;
mod notify;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppConfig;
use crate::filter::{normalize, Classifier};
use crate::loader::{build_blacklist, write_listings_csv};
use crate::pipeline::schedule::{CountedTrigger, IntervalTrigger};
use crate::pipeline::Pipeline;
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "estate-watch", about = "Private-seller property listing watcher", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl, notify, sleep, repeat
    Run,

    /// Run a single crawl cycle and exit
    Once,

    /// Show how a seller name is normalized and classified
    Check {
        /// Seller name as it appears on the site
        seller: String,
    },

    /// Show database statistics
    Stats,

    /// Export stored listings to CSV
    Export {
        #[arg(short, long, default_value = "data/listings.csv")]
        out: PathBuf,
    },

    /// Apply schema migrations without crawling
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "estate_watch=info,warn",
        1 => "estate_watch=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Run => {
            config.validate_for_delivery()?;
            let pipeline = Pipeline::from_config(&config)?;
            let mut trigger = IntervalTrigger::new(config.schedule.interval());
            info!(
                "Watching {} ({} pages, every {} min)",
                config.scraper.target_url, config.scraper.max_pages, config.schedule.interval_minutes
            );
            pipeline.run_forever(&mut trigger).await;
        }

        Command::Once => {
            config.validate_for_delivery()?;
            let pipeline = Pipeline::from_config(&config)?;
            let totals = pipeline.run_forever(&mut CountedTrigger::new(1)).await;
            if totals.aborted > 0 {
                anyhow::bail!("crawl cycle aborted");
            }
        }

        Command::Check { seller } => {
            let classifier = Classifier::new(build_blacklist(&config.filter)?, &config.filter.agency_keywords);
            println!("  Raw        : {:?}", seller);
            let normalized = normalize(&seller);
            let verdict = classifier.classify(&seller);
            println!("  Normalized : {:?}", normalized);
            if let Some(entry) = classifier.blacklist().matching_entry(&normalized) {
                println!("  Blacklist  : matches {:?}", entry);
            }
            println!(
                "  Verdict    : {:?} ({})",
                verdict,
                if verdict.is_accept() { "would notify" } else { "skipped" }
            );
        }

        Command::Stats => {
            let repo = Repository::open(&config.storage.db_path)?;
            let listings = repo.listing_count()?;
            let (min, max) = repo.first_seen_range().unwrap_or((None, None));
            println!("─────────────────────────────────");
            println!("  Estate Watch — Database Stats");
            println!("─────────────────────────────────");
            println!("  Listings : {}", utils::fmt_number(listings));
            println!("  First    : {}", min.map(|d| d.to_string()).unwrap_or("—".into()));
            println!("  Last     : {}", max.map(|d| d.to_string()).unwrap_or("—".into()));
            println!("─────────────────────────────────");
            for run in repo.recent_runs(5)? {
                println!(
                    "  #{:<4} {} {:<8} found {:>4}  sent {:>3}  skipped {:>4}",
                    run.id,
                    run.started_at.format("%Y-%m-%d %H:%M"),
                    run.status,
                    utils::fmt_number(run.found),
                    utils::fmt_number(run.sent),
                    utils::fmt_number(run.skipped),
                );
            }
        }

        Command::Export { out } => {
            let repo = Repository::open(&config.storage.db_path)?;
            let n = write_listings_csv(&out, &repo.list_listings()?)?;
            println!("Exported {} listings to {:?}", utils::fmt_number(n as i64), out);
        }

        Command::Migrate => {
            let repo = Repository::open(&config.storage.db_path)?;
            repo.run_migrations()?;
            println!("Schema up to date at {:?}.", config.storage.db_path);
        }
    }

    Ok(())
}
