use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

use crate::config::FeedConfig;
use crate::service::FeedService;

/// Scheduler that purges expired feed jobs on `cron`. Not started.
pub async fn build_purge_scheduler(service: FeedService, cron: &str) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job = Job::new_async(cron, move |_uuid, _l| {
        let service = service.clone();
        Box::pin(async move {
            match service.purge_expired().await {
                Ok(purged) => info!(purged, "scheduled purge finished"),
                Err(err) => warn!(error = %err, "scheduled purge failed"),
            }
        })
    })
    .with_context(|| format!("creating purge job for cron {cron}"))?;
    sched.add(job).await.context("adding purge job")?;
    Ok(sched)
}

pub async fn maybe_build_purge_scheduler(
    config: &FeedConfig,
    service: FeedService,
) -> Result<Option<JobScheduler>> {
    if !config.scheduler_enabled {
        return Ok(None);
    }
    build_purge_scheduler(service, &config.purge_cron)
        .await
        .map(Some)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hirefeed_storage::{MemoryFeedStore, MemoryProfileStore};

    use super::*;

    fn service() -> FeedService {
        FeedService::new(
            Arc::new(MemoryFeedStore::default()),
            Arc::new(MemoryProfileStore::new()),
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn invalid_cron_is_reported() {
        let Err(err) = build_purge_scheduler(service(), "not a cron").await else {
            panic!("expected invalid cron expression to be rejected");
        };
        assert!(format!("{err:#}").contains("not a cron"));
    }

    #[tokio::test]
    async fn disabled_scheduler_is_not_built() {
        let mut config = FeedConfig::from_env();
        config.scheduler_enabled = false;
        assert!(maybe_build_purge_scheduler(&config, service())
            .await
            .unwrap()
            .is_none());
    }
}
