//! In-process stores with the same upsert contracts as the Postgres store.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hirefeed_core::{
    FeedEntry, FeedJob, NewFeedJob, Profile, RefreshLogEntry, TrackedJob, UserFeedLink,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{
    default_job_ttl, effective_limit, FeedStore, ProfileStore, StoreError, UpsertOutcome,
};

#[derive(Debug, Default)]
struct MemoryState {
    jobs: HashMap<Uuid, FeedJob>,
    job_keys: HashMap<(String, String), Uuid>,
    links: HashMap<(Uuid, Uuid), UserFeedLink>,
    refresh_log: Vec<RefreshLogEntry>,
    tracked: Vec<TrackedJob>,
}

impl MemoryState {
    fn entries_for(&self, user_id: Uuid, include: impl Fn(&FeedJob, &UserFeedLink) -> bool) -> Vec<FeedEntry> {
        self.links
            .values()
            .filter(|link| link.user_id == user_id)
            .filter_map(|link| {
                let job = self.jobs.get(&link.feed_job_id)?;
                include(job, link).then(|| FeedEntry {
                    job: job.clone(),
                    link: link.clone(),
                })
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct MemoryFeedStore {
    state: RwLock<MemoryState>,
    ttl: Duration,
}

impl Default for MemoryFeedStore {
    fn default() -> Self {
        Self::new(default_job_ttl())
    }
}

impl MemoryFeedStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            ttl,
        }
    }

    pub async fn job_count(&self) -> usize {
        self.state.read().await.jobs.len()
    }

    pub async fn find_job(&self, source: &str, external_id: &str) -> Option<FeedJob> {
        let state = self.state.read().await;
        let id = state
            .job_keys
            .get(&(source.to_string(), external_id.to_string()))?;
        state.jobs.get(id).cloned()
    }

    pub async fn link(&self, user_id: Uuid, feed_job_id: Uuid) -> Option<UserFeedLink> {
        self.state
            .read()
            .await
            .links
            .get(&(user_id, feed_job_id))
            .cloned()
    }

    pub async fn links_for(&self, user_id: Uuid) -> Vec<UserFeedLink> {
        self.state
            .read()
            .await
            .links
            .values()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn refresh_log(&self) -> Vec<RefreshLogEntry> {
        self.state.read().await.refresh_log.clone()
    }

    pub async fn tracked_jobs(&self, user_id: Uuid) -> Vec<TrackedJob> {
        self.state
            .read()
            .await
            .tracked
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Moves a job's expiry, e.g. to simulate TTL elapsing.
    pub async fn set_expiry(&self, feed_job_id: Uuid, expires_at: DateTime<Utc>) -> bool {
        match self.state.write().await.jobs.get_mut(&feed_job_id) {
            Some(job) => {
                job.expires_at = expires_at;
                true
            }
            None => false,
        }
    }

    /// Backdates the user's refresh log, e.g. to simulate the throttle window passing.
    pub async fn backdate_refreshes(&self, user_id: Uuid, by: Duration) {
        let mut state = self.state.write().await;
        for entry in state.refresh_log.iter_mut().filter(|e| e.user_id == user_id) {
            entry.refreshed_at -= by;
        }
    }
}

fn feed_order(a: &FeedEntry, b: &FeedEntry) -> Ordering {
    b.link
        .match_score
        .cmp(&a.link.match_score)
        // None sorts below Some, so descending order puts missing dates last
        .then_with(|| b.job.posted_at.cmp(&a.job.posted_at))
}

#[async_trait]
impl FeedStore for MemoryFeedStore {
    async fn upsert_feed_job(&self, job: &NewFeedJob) -> Result<UpsertOutcome, StoreError> {
        let now = Utc::now();
        let key = (job.source.clone(), job.external_id.clone());
        let mut state = self.state.write().await;

        if let Some(id) = state.job_keys.get(&key).copied() {
            let existing = state
                .jobs
                .get_mut(&id)
                .ok_or_else(|| StoreError::Invalid(format!("dangling key for feed job {id}")))?;
            existing.title = job.title.clone();
            existing.fetched_at = now;
            return Ok(UpsertOutcome {
                job: existing.clone(),
                inserted: false,
            });
        }

        let id = Uuid::new_v4();
        let stored = FeedJob::from_new(id, job.clone(), now, now + self.ttl);
        state.job_keys.insert(key, id);
        state.jobs.insert(id, stored.clone());
        Ok(UpsertOutcome {
            job: stored,
            inserted: true,
        })
    }

    async fn link_job_to_user(
        &self,
        user_id: Uuid,
        feed_job_id: Uuid,
        match_score: u8,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.jobs.contains_key(&feed_job_id) {
            return Err(StoreError::NotFound(format!("feed job {feed_job_id}")));
        }
        state
            .links
            .entry((user_id, feed_job_id))
            .and_modify(|link| link.match_score = match_score)
            .or_insert_with(|| UserFeedLink::new(user_id, feed_job_id, match_score));
        Ok(())
    }

    async fn get_user_feed(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<FeedEntry>, StoreError> {
        let now = Utc::now();
        let state = self.state.read().await;
        let mut entries =
            state.entries_for(user_id, |job, link| !link.dismissed && !job.is_expired(now));
        entries.sort_by(feed_order);
        entries.truncate(effective_limit(limit));
        Ok(entries)
    }

    async fn get_links_for_rescore(&self, user_id: Uuid) -> Result<Vec<FeedEntry>, StoreError> {
        let state = self.state.read().await;
        Ok(state.entries_for(user_id, |_, link| !link.dismissed))
    }

    async fn batch_update_scores(
        &self,
        user_id: Uuid,
        scores: &HashMap<Uuid, u8>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        for (feed_job_id, score) in scores {
            if let Some(link) = state.links.get_mut(&(user_id, *feed_job_id)) {
                link.match_score = *score;
            }
        }
        Ok(())
    }

    async fn get_last_refresh(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .refresh_log
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.refreshed_at)
            .max())
    }

    async fn log_refresh(
        &self,
        user_id: Uuid,
        label: &str,
        fetched: usize,
        new: usize,
    ) -> Result<(), StoreError> {
        self.state.write().await.refresh_log.push(RefreshLogEntry {
            user_id,
            label: label.to_string(),
            jobs_fetched: fetched,
            jobs_new: new,
            refreshed_at: Utc::now(),
        });
        Ok(())
    }

    async fn dismiss_feed_job(&self, user_id: Uuid, feed_job_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let link = state
            .links
            .get_mut(&(user_id, feed_job_id))
            .ok_or_else(|| StoreError::NotFound(format!("feed link {feed_job_id}")))?;
        link.dismissed = true;
        Ok(())
    }

    async fn save_feed_job_to_tracker(
        &self,
        user_id: Uuid,
        feed_job_id: Uuid,
    ) -> Result<TrackedJob, StoreError> {
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .get(&feed_job_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("feed job {feed_job_id}")))?;
        let score = state
            .links
            .get(&(user_id, feed_job_id))
            .map(|l| l.match_score)
            .unwrap_or(0);

        let tracked = TrackedJob::copy_of(&job, user_id, score, Utc::now());
        if let Some(link) = state.links.get_mut(&(user_id, feed_job_id)) {
            link.saved = true;
            link.saved_job_id = Some(tracked.id);
        }
        state.tracked.push(tracked.clone());
        Ok(tracked)
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let expired = state
            .jobs
            .values()
            .filter(|job| job.is_expired(now))
            .map(|job| (job.id, job.source.clone(), job.external_id.clone()))
            .collect::<Vec<_>>();

        for (id, source, external_id) in &expired {
            state.jobs.remove(id);
            state.job_keys.remove(&(source.clone(), external_id.clone()));
        }
        state
            .links
            .retain(|(_, feed_job_id), _| !expired.iter().any(|(id, _, _)| id == feed_job_id));
        Ok(expired.len() as u64)
    }
}

#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<Uuid, Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces, returning the previous profile.
    pub async fn put(&self, profile: Profile) -> Option<Profile> {
        self.profiles.write().await.insert(profile.user_id, profile)
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<Profile>, StoreError> {
        Ok(self.profiles.read().await.get(&user_id).cloned())
    }
}
