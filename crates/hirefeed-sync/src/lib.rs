//! Refresh orchestration, rescoring, configuration and scheduling for HireFeed.

use std::sync::Arc;

use anyhow::Result;
use hirefeed_storage::{connect_pool, run_migrations, HttpFetcher, PgFeedStore, PgProfileStore};

pub mod config;
pub mod registry;
pub mod scheduler;
pub mod service;

pub use config::{load_weights, FeedConfig, RefreshSettings};
pub use registry::{SourceConfig, SourceRegistry};
pub use scheduler::{build_purge_scheduler, maybe_build_purge_scheduler};
pub use service::{FeedService, RefreshCounts, RefreshError, DEFAULT_FEED_PAGE, MAX_FEED_PAGE, REFRESH_GRACE};

pub const CRATE_NAME: &str = "hirefeed-sync";

/// Wires the Postgres stores, the source registry and the adapters from `config`.
pub async fn build_service(config: &FeedConfig) -> Result<FeedService> {
    let pool = connect_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    let registry = SourceRegistry::load(&config.sources_path).await?;
    let http = Arc::new(HttpFetcher::new(config.http_config())?);
    let adapters = registry.build_adapters(http, &config.credentials());

    let feeds = PgFeedStore::new(pool.clone()).with_ttl(config.job_ttl());
    let profiles = PgProfileStore::new(pool);
    Ok(FeedService::new(Arc::new(feeds), Arc::new(profiles), adapters)
        .with_weights(config.load_weights().await?)
        .with_settings(config.refresh_settings()))
}
