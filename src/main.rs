use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use reposter::config::Config;
use reposter::cycle::Orchestrator;
use reposter::publish::{BlueskyClient, MastodonClient, PublishTarget};
use reposter::storage::Database;
use reposter::tracker::PostTracker;

/// Get the config directory path (~/.config/reposter/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("reposter"))
}

#[derive(Parser, Debug)]
#[command(
    name = "reposter",
    about = "Announce new RSS feed articles on Bluesky and Mastodon"
)]
struct Args {
    /// Config file (default: ~/.config/reposter/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// RSS feed to poll (overrides FEED_URL)
    #[arg(long, value_name = "URL")]
    feed_url: Option<String>,

    /// Fetch and check for new posts without publishing
    #[arg(long, alias = "dev")]
    dry_run: bool,

    /// SQLite database for posted records
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Keep running, starting a cycle every N minutes (0 = run once)
    #[arg(long, value_name = "N")]
    interval_minutes: Option<u64>,

    /// Forget every posted record and exit
    #[arg(long)]
    clear: bool,

    /// Print the N most recently posted records and exit
    #[arg(long, value_name = "N")]
    recent: Option<usize>,
}

/// Builds every target with complete credentials. Incomplete ones are
/// logged and skipped.
fn build_targets(config: &Config, client: &reqwest::Client) -> Vec<Box<dyn PublishTarget>> {
    for missing in config.validate_credentials() {
        tracing::error!(target_name = missing.target, error = %missing, "Skipping publish target");
    }

    let mut targets: Vec<Box<dyn PublishTarget>> = Vec::new();
    if let Ok(Some(bluesky)) = config.bluesky() {
        targets.push(Box::new(BlueskyClient::new(client.clone(), bluesky)));
    }
    if let Ok(Some(mastodon)) = config.mastodon() {
        targets.push(Box::new(MastodonClient::new(client.clone(), mastodon)));
    }
    targets
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before the subscriber, so RUST_LOG may come from .env. A missing .env
    // is normal in production.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Failed to load .env"),
    }

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    config.apply_env(|key| std::env::var(key).ok());

    if let Some(url) = args.feed_url {
        config.feed_url = url;
    }
    if args.dry_run {
        config.dry_run = true;
    }
    if let Some(path) = args.db {
        config.database_path = Some(path);
    }
    if let Some(minutes) = args.interval_minutes {
        config.interval_minutes = minutes;
    }
    config.validate_urls().context("Invalid configuration")?;

    let db_path = match &config.database_path {
        Some(path) => path.clone(),
        None => {
            std::fs::create_dir_all(&config_dir).with_context(|| {
                format!("Failed to create config directory {}", config_dir.display())
            })?;
            config_dir.join("posted.db")
        }
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = Database::open(db_path_str)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    let tracker = PostTracker::new(db.clone());

    if args.clear {
        let removed = tracker.clear_all().await.context("Failed to clear records")?;
        println!("Cleared {} posted records.", removed);
        db.close().await;
        return Ok(());
    }

    if let Some(limit) = args.recent {
        let records = tracker
            .list_recent(limit)
            .await
            .context("Failed to list records")?;
        if records.is_empty() {
            println!("No posts recorded yet.");
        }
        for record in records {
            println!(
                "{}  {}\n    {}",
                record.posted_at.format("%Y-%m-%d %H:%M:%S"),
                record.title,
                record.link
            );
        }
        db.close().await;
        return Ok(());
    }

    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let targets = build_targets(&config, &client);
    let orchestrator = Orchestrator::new(client, tracker, targets, config.cycle_options())
        .context("Nothing to do")?;
    tracing::info!(
        targets = ?orchestrator.target_names(),
        dry_run = config.dry_run,
        "Starting reposter"
    );

    let result = if config.interval_minutes == 0 {
        orchestrator.run_cycle().await.map(|_| ())
    } else {
        let interval = Duration::from_secs(config.interval_minutes * 60);
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };
        orchestrator.run_every(interval, shutdown).await;
        Ok(())
    };

    db.close().await;
    result.context("Cycle failed")
}
