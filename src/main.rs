use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use tle_cache::config::Config;
use tle_cache::infra::build_repository;
use tle_cache::observability::{init_logging, metrics::describe_metrics};
use tle_cache::{scheduling_decision, RepositoryResult};

#[derive(Parser)]
#[command(name = "tle-cache")]
#[command(about = "Cache-first fetcher for orbital element sets")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (default: ./tle-cache.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print element sets for a query key, using the cache when fresh
    Get {
        /// Name filter, or `group:<name>` for a published group
        key: String,
    },
    /// Fetch from the source even if the cache is fresh
    Refresh { key: String },
    /// Show what is cached for a key without touching the network
    Inspect { key: String },
    /// Decide whether a background refresh should be armed now
    Schedule {
        key: String,
        /// When a refresh was last scheduled (RFC 3339)
        #[arg(long)]
        last_scheduled: Option<String>,
    },
}

fn print_result(key: &str, result: &RepositoryResult) {
    println!(
        "📡 {}: {} records (fetched {}, from {})",
        key,
        result.records.len(),
        result.fetched_at.to_rfc3339(),
        result.provenance
    );
    if let Some(reason) = &result.fallback {
        println!("⚠️  Showing cached data, refresh failed: {}", reason);
    }
    for record in &result.records {
        if let Some(name) = &record.name {
            println!("{}", name);
        }
        println!("{}", record.line1);
        println!("{}", record.line2);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let _log_guard = init_logging(&config.logging.dir);
    describe_metrics();
    let repo = build_repository(&config)?;

    match cli.command {
        Commands::Get { key } => match repo.get_tles(&key).await {
            Ok(result) => print_result(&key, &result),
            Err(e) => {
                error!(key = %key, error = %e, "no data available");
                println!("❌ No data for {}: {}", key, e);
                std::process::exit(1);
            }
        },
        Commands::Refresh { key } => match repo.refresh_tles(&key).await {
            Ok(result) => print_result(&key, &result),
            Err(e) => {
                error!(key = %key, error = %e, "refresh failed");
                println!("❌ Refresh failed for {}: {}", key, e);
                std::process::exit(1);
            }
        },
        Commands::Inspect { key } => match repo.cached_metadata(&key).await {
            Some(meta) => {
                println!("{}", serde_json::to_string_pretty(&meta)?);
                if let Some(until) = repo.blocked_until(&key) {
                    println!("⏳ Backing off until {}", until.to_rfc3339());
                }
            }
            None => println!("Nothing cached for {}", key),
        },
        Commands::Schedule { key, last_scheduled } => {
            let last_scheduled = last_scheduled
                .map(|raw| DateTime::parse_from_rfc3339(&raw).map(|t| t.with_timezone(&Utc)))
                .transpose()
                .context("parsing --last-scheduled")?;
            let fetched_at = repo.cached_metadata(&key).await.map(|m| m.fetched_at);
            let decision = scheduling_decision(fetched_at, last_scheduled, Utc::now(), &config.refresh_policy());
            info!(key = %key, should_schedule = decision.should_schedule, "scheduling decision");
            match decision.earliest_time {
                Some(at) if decision.should_schedule => println!("✅ schedule refresh at {}", at.to_rfc3339()),
                _ => println!("⏸️  no refresh needed"),
            }
        }
    }

    Ok(())
}
