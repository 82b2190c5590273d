use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hirefeed_adapters::{normalize, AdapterContext, ProviderQuery, SourceAdapter};
use hirefeed_core::{score_match, FeedEntry, Profile, ScoringWeights, TrackedJob, MULTI_SOURCE_LABEL};
use hirefeed_storage::{FeedStore, ProfileStore, StoreError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::RefreshSettings;

pub const DEFAULT_FEED_PAGE: usize = 100;
pub const MAX_FEED_PAGE: usize = 200;

/// Extra time a detached refresh gets beyond the provider deadline for the
/// profile load, throttle lookup and refresh log write.
pub const REFRESH_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshCounts {
    pub fetched: usize,
    pub new: usize,
}

impl RefreshCounts {
    fn add(&mut self, other: RefreshCounts) {
        self.fetched += other.fetched;
        self.new += other.new;
    }
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("profile {0} not found")]
    ProfileNotFound(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// Refresh, rescore and feed actions for one deployment.
#[derive(Clone)]
pub struct FeedService {
    feeds: Arc<dyn FeedStore>,
    profiles: Arc<dyn ProfileStore>,
    adapters: Arc<Vec<Arc<dyn SourceAdapter>>>,
    weights: Arc<ScoringWeights>,
    settings: RefreshSettings,
}

impl FeedService {
    pub fn new(
        feeds: Arc<dyn FeedStore>,
        profiles: Arc<dyn ProfileStore>,
        adapters: Vec<Arc<dyn SourceAdapter>>,
    ) -> Self {
        Self {
            feeds,
            profiles,
            adapters: Arc::new(adapters),
            weights: Arc::new(ScoringWeights::default()),
            settings: RefreshSettings::default(),
        }
    }

    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = Arc::new(weights);
        self
    }

    pub fn with_settings(mut self, settings: RefreshSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn adapters(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.adapters
    }

    async fn load_profile(&self, user_id: Uuid) -> Result<Profile, RefreshError> {
        self.profiles
            .find_by_id(user_id)
            .await?
            .ok_or(RefreshError::ProfileNotFound(user_id))
    }

    /// Fetches from every enabled provider, caches and links the results.
    ///
    /// Inside the throttle window a non-forced refresh returns zero counts
    /// without touching any provider.
    pub async fn refresh(&self, user_id: Uuid, force: bool) -> Result<RefreshCounts, RefreshError> {
        self.refresh_inner(user_id, force)
            .instrument(info_span!("refresh", %user_id, force))
            .await
    }

    async fn refresh_inner(&self, user_id: Uuid, force: bool) -> Result<RefreshCounts, RefreshError> {
        let profile = Arc::new(self.load_profile(user_id).await?);

        if !force {
            match self.feeds.get_last_refresh(user_id).await {
                Ok(Some(last)) if Utc::now() - last < self.settings.throttle => {
                    info!(last_refresh = %last, "refresh throttled");
                    return Ok(RefreshCounts::default());
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "last refresh lookup failed; refreshing anyway"),
            }
        }

        let deadline = Instant::now() + self.settings.refresh_timeout;
        let counts = Arc::new(Mutex::new(RefreshCounts::default()));
        let mut units = JoinSet::new();

        for adapter in self.adapters.iter() {
            let source = adapter.source();
            if !adapter.enabled() {
                info!(%source, "provider not configured; skipping");
                continue;
            }
            let plan = adapter.plan(&profile);
            if plan.is_empty() {
                info!(%source, "empty query plan; skipping");
                continue;
            }

            let unit = ProviderUnit {
                adapter: adapter.clone(),
                feeds: self.feeds.clone(),
                weights: self.weights.clone(),
                profile: profile.clone(),
                counts: counts.clone(),
                deadline,
            };
            units.spawn(
                unit.run(plan)
                    .instrument(info_span!("provider", source = source.as_str())),
            );
        }

        while let Some(joined) = units.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "provider task failed");
            }
        }

        let totals = *counts.lock().await;
        if let Err(err) = self
            .feeds
            .log_refresh(user_id, MULTI_SOURCE_LABEL, totals.fetched, totals.new)
            .await
        {
            warn!(error = %err, "writing refresh log failed");
        }
        info!(fetched = totals.fetched, new = totals.new, "refresh complete");
        Ok(totals)
    }

    /// Recomputes scores of the user's non-dismissed links. No provider calls.
    pub async fn rescore(&self, user_id: Uuid) -> Result<usize, RefreshError> {
        let profile = self.load_profile(user_id).await?;
        let entries = self.feeds.get_links_for_rescore(user_id).await?;
        if entries.is_empty() {
            return Ok(0);
        }

        let scores: HashMap<Uuid, u8> = entries
            .iter()
            .map(|entry| (entry.job.id, score_match(&profile, &entry.job, &self.weights)))
            .collect();
        self.feeds.batch_update_scores(user_id, &scores).await?;
        info!(%user_id, rescored = scores.len(), "rescore complete");
        Ok(scores.len())
    }

    /// Runs a refresh as a detached task bounded by the refresh timeout plus
    /// [`REFRESH_GRACE`]. Dropping the handle does not cancel it.
    pub fn spawn_refresh(
        &self,
        user_id: Uuid,
        force: bool,
    ) -> JoinHandle<Result<RefreshCounts, RefreshError>> {
        let service = self.clone();
        let limit = self.settings.refresh_timeout + REFRESH_GRACE;
        tokio::spawn(async move {
            let result = match timeout(limit, service.refresh(user_id, force)).await {
                Ok(result) => result,
                Err(_) => Err(RefreshError::TimedOut(limit)),
            };
            if let Err(err) = &result {
                warn!(%user_id, error = %err, "background refresh failed");
            }
            result
        })
    }

    /// Runs a rescore as a detached task bounded by the rescore timeout.
    pub fn spawn_rescore(&self, user_id: Uuid) -> JoinHandle<Result<usize, RefreshError>> {
        let service = self.clone();
        let limit = self.settings.rescore_timeout;
        tokio::spawn(async move {
            let result = match timeout(limit, service.rescore(user_id)).await {
                Ok(result) => result,
                Err(_) => Err(RefreshError::TimedOut(limit)),
            };
            if let Err(err) = &result {
                warn!(%user_id, error = %err, "background rescore failed");
            }
            result
        })
    }

    /// Spawns a rescore when a field that feeds scoring changed.
    pub fn on_profile_updated(
        &self,
        old: &Profile,
        new: &Profile,
    ) -> Option<JoinHandle<Result<usize, RefreshError>>> {
        if !old.scoring_fields_changed(new) {
            return None;
        }
        Some(self.spawn_rescore(new.user_id))
    }

    /// Limit defaults to 100 and is clamped to 1..=200.
    pub async fn feed(&self, user_id: Uuid, limit: Option<usize>) -> Result<Vec<FeedEntry>, StoreError> {
        let limit = limit.unwrap_or(DEFAULT_FEED_PAGE).clamp(1, MAX_FEED_PAGE);
        self.feeds.get_user_feed(user_id, limit).await
    }

    pub async fn dismiss(&self, user_id: Uuid, feed_job_id: Uuid) -> Result<(), StoreError> {
        self.feeds.dismiss_feed_job(user_id, feed_job_id).await?;
        info!(%user_id, %feed_job_id, "feed job dismissed");
        Ok(())
    }

    pub async fn save_to_tracker(
        &self,
        user_id: Uuid,
        feed_job_id: Uuid,
    ) -> Result<TrackedJob, StoreError> {
        let tracked = self.feeds.save_feed_job_to_tracker(user_id, feed_job_id).await?;
        info!(%user_id, %feed_job_id, tracked_id = %tracked.id, "feed job saved to tracker");
        Ok(tracked)
    }

    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let purged = self.feeds.purge_expired().await?;
        info!(purged, "expired feed jobs purged");
        Ok(purged)
    }
}

/// One provider's share of a refresh.
struct ProviderUnit {
    adapter: Arc<dyn SourceAdapter>,
    feeds: Arc<dyn FeedStore>,
    weights: Arc<ScoringWeights>,
    profile: Arc<Profile>,
    counts: Arc<Mutex<RefreshCounts>>,
    deadline: Instant,
}

impl ProviderUnit {
    async fn run(self, plan: Vec<ProviderQuery>) {
        let source = self.adapter.source();
        let ctx = AdapterContext::new(self.deadline);

        for query in plan {
            if ctx.is_expired() {
                warn!(%source, "refresh deadline reached; remaining queries dropped");
                break;
            }
            let label = query.label();
            let listings = match timeout_at(self.deadline, self.adapter.search(&query, &ctx)).await {
                Ok(Ok(listings)) => listings,
                Ok(Err(err)) => {
                    warn!(%source, query = %label, error = %err, "provider query failed");
                    continue;
                }
                Err(_) => {
                    warn!(%source, query = %label, "provider query abandoned at deadline");
                    break;
                }
            };

            let mut batch = RefreshCounts::default();
            for raw in listings {
                let job = normalize(raw);
                if job.external_id.is_empty() {
                    warn!(%source, title = %job.title, "listing without id skipped");
                    continue;
                }
                batch.fetched += 1;

                let outcome = match self.feeds.upsert_feed_job(&job).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        warn!(%source, external_id = %job.external_id, error = %err, "caching job failed");
                        continue;
                    }
                };
                let score = score_match(&self.profile, &outcome.job, &self.weights);
                match self
                    .feeds
                    .link_job_to_user(self.profile.user_id, outcome.job.id, score)
                    .await
                {
                    Ok(()) if outcome.inserted => batch.new += 1,
                    Ok(()) => {}
                    Err(err) => {
                        warn!(%source, external_id = %job.external_id, error = %err, "linking job failed");
                    }
                }
            }

            info!(%source, query = %label, fetched = batch.fetched, new = batch.new, "query complete");
            self.counts.lock().await.add(batch);
        }
    }
}
