use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hirefeed_core::{FeedEntry, FeedJob, NewFeedJob, Profile, TrackedJob};
use thiserror::Error;
use uuid::Uuid;

/// Feed size returned when the caller passes a zero limit.
pub const DEFAULT_FEED_LIMIT: usize = 30;

pub fn default_job_ttl() -> Duration {
    Duration::days(7)
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("invalid stored value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    pub job: FeedJob,
    /// True when the row did not exist before this upsert.
    pub inserted: bool,
}

/// Durable cache of canonical jobs plus the per-user link table.
///
/// Every write is an upsert keyed on the row's unique pair, so concurrent
/// refreshes never need read-modify-write from the caller.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Inserts by `(source, external_id)` or refreshes title and fetch time of the existing row.
    async fn upsert_feed_job(&self, job: &NewFeedJob) -> Result<UpsertOutcome, StoreError>;

    /// Creates the `(user_id, feed_job_id)` link or overwrites its score. Flags are untouched.
    async fn link_job_to_user(
        &self,
        user_id: Uuid,
        feed_job_id: Uuid,
        match_score: u8,
    ) -> Result<(), StoreError>;

    /// Non-dismissed, unexpired jobs ordered by score then recency.
    async fn get_user_feed(&self, user_id: Uuid, limit: usize)
        -> Result<Vec<FeedEntry>, StoreError>;

    /// Every non-dismissed link of the user joined with its job.
    async fn get_links_for_rescore(&self, user_id: Uuid) -> Result<Vec<FeedEntry>, StoreError>;

    async fn batch_update_scores(
        &self,
        user_id: Uuid,
        scores: &HashMap<Uuid, u8>,
    ) -> Result<(), StoreError>;

    async fn get_last_refresh(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn log_refresh(
        &self,
        user_id: Uuid,
        label: &str,
        fetched: usize,
        new: usize,
    ) -> Result<(), StoreError>;

    async fn dismiss_feed_job(&self, user_id: Uuid, feed_job_id: Uuid) -> Result<(), StoreError>;

    /// Copies the job into the user's tracker and marks the link saved.
    async fn save_feed_job_to_tracker(
        &self,
        user_id: Uuid,
        feed_job_id: Uuid,
    ) -> Result<TrackedJob, StoreError>;

    /// Deletes jobs past their expiry together with their links.
    async fn purge_expired(&self) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<Profile>, StoreError>;
}

pub(crate) fn effective_limit(limit: usize) -> usize {
    if limit == 0 {
        DEFAULT_FEED_LIMIT
    } else {
        limit
    }
}
