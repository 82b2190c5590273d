use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hirefeed_adapters::adapter_for_source;
use hirefeed_storage::{connect_pool, run_migrations, HttpFetcher};
use hirefeed_sync::{build_service, maybe_build_purge_scheduler, FeedConfig, SourceRegistry};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "hirefeed-cli")]
#[command(about = "HireFeed job feed command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply database migrations.
    Migrate,
    /// Fetch from every enabled provider and update the user's feed.
    Refresh {
        #[arg(long)]
        user: Uuid,
        /// Ignore the throttle window.
        #[arg(long)]
        force: bool,
    },
    /// Recompute match scores of already-linked jobs.
    Rescore {
        #[arg(long)]
        user: Uuid,
    },
    /// Print the user's feed as JSON.
    Feed {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        limit: Option<usize>,
    },
    Dismiss {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        job: Uuid,
    },
    /// Copy a feed job into the user's tracker.
    Save {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        job: Uuid,
    },
    /// Delete feed jobs past their expiry.
    Purge,
    /// Run the purge scheduler until Ctrl-C.
    Schedule,
    /// Show the source registry and which adapters have credentials.
    Sources,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = FeedConfig::from_env();

    match cli.command {
        Commands::Migrate => {
            let pool = connect_pool(&config.database_url).await?;
            run_migrations(&pool).await?;
            println!("migrations applied");
        }
        Commands::Refresh { user, force } => {
            let service = build_service(&config).await?;
            let counts = service.refresh(user, force).await?;
            println!("refresh complete: fetched={} new={}", counts.fetched, counts.new);
        }
        Commands::Rescore { user } => {
            let service = build_service(&config).await?;
            let rescored = service.rescore(user).await?;
            println!("rescore complete: jobs={rescored}");
        }
        Commands::Feed { user, limit } => {
            let service = build_service(&config).await?;
            let feed = service.feed(user, limit).await?;
            println!("{}", serde_json::to_string_pretty(&feed)?);
        }
        Commands::Dismiss { user, job } => {
            let service = build_service(&config).await?;
            service.dismiss(user, job).await?;
            println!("dismissed {job}");
        }
        Commands::Save { user, job } => {
            let service = build_service(&config).await?;
            let tracked = service.save_to_tracker(user, job).await?;
            println!("saved {job} as tracked job {}", tracked.id);
        }
        Commands::Purge => {
            let service = build_service(&config).await?;
            let purged = service.purge_expired().await?;
            println!("purged {purged} expired jobs");
        }
        Commands::Schedule => {
            let service = build_service(&config).await?;
            let Some(mut sched) = maybe_build_purge_scheduler(&config, service).await? else {
                println!("scheduler disabled; set HIREFEED_SCHEDULER_ENABLED=true");
                return Ok(());
            };
            sched.start().await.context("starting scheduler")?;
            info!(cron = %config.purge_cron, "purge scheduler running");
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            sched.shutdown().await.context("stopping scheduler")?;
        }
        Commands::Sources => {
            let registry = SourceRegistry::load(&config.sources_path).await?;
            let credentials = config.credentials();
            let http = Arc::new(HttpFetcher::new(config.http_config())?);
            for entry in &registry.sources {
                let configured = adapter_for_source(entry.source, http.clone(), &credentials).enabled();
                println!(
                    "{:<10} enabled={:<5} configured={:<5} {}",
                    entry.source.as_str(),
                    entry.enabled,
                    configured,
                    entry.display_name.as_deref().unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}
