use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hirefeed_adapters::adzuna::{AdzunaJob, AdzunaQuery};
use hirefeed_adapters::jsearch::{JSearchJob, JSearchQuery};
use hirefeed_adapters::remotive::{RemotiveJob, RemotiveQuery};
use hirefeed_adapters::{
    AdapterContext, AdapterError, ProviderQuery, RawListing, Source, SourceAdapter,
};
use hirefeed_core::{score_match, Profile, ScoringWeights, WorkStyle, MULTI_SOURCE_LABEL};
use hirefeed_storage::{MemoryFeedStore, MemoryProfileStore, ProfileStore, StoreError};
use hirefeed_sync::{FeedService, RefreshCounts, RefreshError, RefreshSettings, REFRESH_GRACE};
use uuid::Uuid;

enum Behavior {
    Listings(Vec<RawListing>),
    Fail,
    Sleep(Duration),
}

struct StubAdapter {
    source: Source,
    enabled: bool,
    queries: Vec<ProviderQuery>,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl StubAdapter {
    fn new(source: Source, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            source,
            enabled: true,
            queries: vec![query_for(source)],
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for StubAdapter {
    fn source(&self) -> Source {
        self.source
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn plan(&self, _profile: &Profile) -> Vec<ProviderQuery> {
        self.queries.clone()
    }

    async fn search(
        &self,
        _query: &ProviderQuery,
        _ctx: &AdapterContext,
    ) -> Result<Vec<RawListing>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Listings(listings) => Ok(listings.clone()),
            Behavior::Fail => Err(AdapterError::Url("connection refused".into())),
            Behavior::Sleep(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Vec::new())
            }
        }
    }
}

fn query_for(source: Source) -> ProviderQuery {
    match source {
        Source::JSearch => ProviderQuery::JSearch(JSearchQuery {
            query: "Backend Engineer".into(),
            location: String::new(),
            remote_only: true,
            num_pages: 1,
        }),
        Source::Remotive => ProviderQuery::Remotive(RemotiveQuery::search("Backend Engineer", 50)),
        Source::Adzuna => ProviderQuery::Adzuna(AdzunaQuery::new("Backend Engineer", "")),
    }
}

fn remotive(id: &str, title: &str) -> RawListing {
    RawListing::Remotive(RemotiveJob {
        id: id.into(),
        title: title.into(),
        company_name: "Ferrous".into(),
        tags: vec!["rust".into(), "postgresql".into()],
        description: "Build backend services in Rust".into(),
        ..Default::default()
    })
}

fn jsearch(id: &str, title: &str) -> RawListing {
    RawListing::JSearch(JSearchJob {
        job_id: id.into(),
        job_title: title.into(),
        employer_name: "Acme".into(),
        job_is_remote: true,
        ..Default::default()
    })
}

fn adzuna(id: &str, title: &str) -> RawListing {
    RawListing::Adzuna(AdzunaJob {
        id: id.into(),
        title: title.into(),
        ..Default::default()
    })
}

fn backend_profile(user_id: Uuid) -> Profile {
    Profile {
        target_roles: vec!["Backend Engineer".into()],
        skills: vec!["Rust".into(), "PostgreSQL".into()],
        location: "Denver, CO".into(),
        work_style: Some(WorkStyle::Remote),
        salary_min: 140_000,
        ..Profile::new(user_id)
    }
}

struct Harness {
    feeds: Arc<MemoryFeedStore>,
    profiles: Arc<MemoryProfileStore>,
    service: FeedService,
    user: Uuid,
}

async fn harness(adapters: &[Arc<StubAdapter>], settings: RefreshSettings) -> Harness {
    let feeds = Arc::new(MemoryFeedStore::default());
    let profiles = Arc::new(MemoryProfileStore::new());
    let user = Uuid::new_v4();
    profiles.put(backend_profile(user)).await;

    let adapters: Vec<Arc<dyn SourceAdapter>> = adapters
        .iter()
        .map(|a| a.clone() as Arc<dyn SourceAdapter>)
        .collect();
    let service = FeedService::new(feeds.clone(), profiles.clone(), adapters).with_settings(settings);
    Harness {
        feeds,
        profiles,
        service,
        user,
    }
}

#[tokio::test]
async fn second_refresh_counts_fetched_but_nothing_new() {
    let stub = StubAdapter::new(
        Source::Remotive,
        Behavior::Listings(vec![remotive("1", "Backend Engineer"), remotive("2", "Rust Developer")]),
    );
    let h = harness(&[stub.clone()], RefreshSettings::default()).await;

    let first = h.service.refresh(h.user, false).await.unwrap();
    assert_eq!(first, RefreshCounts { fetched: 2, new: 2 });

    let second = h.service.refresh(h.user, true).await.unwrap();
    assert_eq!(second, RefreshCounts { fetched: 2, new: 0 });
    assert_eq!(h.feeds.job_count().await, 2);
    assert_eq!(h.feeds.links_for(h.user).await.len(), 2);

    let log = h.feeds.refresh_log().await;
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|e| e.label == MULTI_SOURCE_LABEL));
    assert_eq!((log[0].jobs_fetched, log[0].jobs_new), (2, 2));
}

#[tokio::test]
async fn throttled_refresh_makes_no_provider_calls() {
    let stub = StubAdapter::new(Source::Remotive, Behavior::Listings(vec![remotive("1", "Backend Engineer")]));
    let h = harness(&[stub.clone()], RefreshSettings::default()).await;

    h.service.refresh(h.user, false).await.unwrap();
    assert_eq!(stub.calls(), 1);

    let throttled = h.service.refresh(h.user, false).await.unwrap();
    assert_eq!(throttled, RefreshCounts::default());
    assert_eq!(stub.calls(), 1);
    assert_eq!(h.feeds.refresh_log().await.len(), 1);

    let forced = h.service.refresh(h.user, true).await.unwrap();
    assert_eq!(forced.fetched, 1);
    assert_eq!(stub.calls(), 2);
}

#[tokio::test]
async fn refresh_runs_again_once_the_window_has_passed() {
    let stub = StubAdapter::new(Source::Remotive, Behavior::Listings(vec![remotive("1", "Backend Engineer")]));
    let h = harness(&[stub.clone()], RefreshSettings::default()).await;

    h.service.refresh(h.user, false).await.unwrap();
    h.feeds
        .backdate_refreshes(h.user, chrono::Duration::hours(3))
        .await;
    h.service.refresh(h.user, false).await.unwrap();
    assert_eq!(stub.calls(), 2);
}

#[tokio::test]
async fn one_failing_provider_does_not_fail_the_refresh() {
    let ok_jsearch = StubAdapter::new(Source::JSearch, Behavior::Listings(vec![jsearch("abc", "Backend Engineer")]));
    let broken = StubAdapter::new(Source::Remotive, Behavior::Fail);
    let ok_adzuna = StubAdapter::new(Source::Adzuna, Behavior::Listings(vec![adzuna("42", "Platform Engineer")]));
    let h = harness(
        &[ok_jsearch.clone(), broken.clone(), ok_adzuna.clone()],
        RefreshSettings::default(),
    )
    .await;

    let counts = h.service.refresh(h.user, false).await.unwrap();
    assert_eq!(counts, RefreshCounts { fetched: 2, new: 2 });
    assert_eq!(broken.calls(), 1);
    assert!(h.feeds.find_job("jsearch", "jsearch-abc").await.is_some());
    assert!(h.feeds.find_job("adzuna", "adzuna-42").await.is_some());
    assert_eq!(h.feeds.refresh_log().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_provider_is_abandoned_at_the_shared_deadline() {
    let slow = Arc::new(StubAdapter {
        source: Source::JSearch,
        enabled: true,
        queries: vec![query_for(Source::JSearch), query_for(Source::JSearch)],
        behavior: Behavior::Sleep(Duration::from_secs(60)),
        calls: AtomicUsize::new(0),
    });
    let fast = StubAdapter::new(Source::Remotive, Behavior::Listings(vec![remotive("7", "Backend Engineer")]));
    let settings = RefreshSettings {
        refresh_timeout: Duration::from_secs(1),
        ..RefreshSettings::default()
    };
    let h = harness(&[slow.clone(), fast.clone()], settings).await;

    let counts = h.service.refresh(h.user, false).await.unwrap();
    assert_eq!(counts, RefreshCounts { fetched: 1, new: 1 });
    assert_eq!(slow.calls(), 1);
    assert_eq!(h.feeds.refresh_log().await.len(), 1);
}

#[tokio::test]
async fn unknown_user_is_an_error() {
    let stub = StubAdapter::new(Source::Remotive, Behavior::Listings(Vec::new()));
    let h = harness(&[stub.clone()], RefreshSettings::default()).await;
    let stranger = Uuid::new_v4();

    let err = h.service.refresh(stranger, false).await.unwrap_err();
    assert!(matches!(err, RefreshError::ProfileNotFound(id) if id == stranger));
    let err = h.service.rescore(stranger).await.unwrap_err();
    assert!(matches!(err, RefreshError::ProfileNotFound(_)));
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn disabled_adapters_and_empty_plans_are_skipped() {
    let disabled = Arc::new(StubAdapter {
        source: Source::JSearch,
        enabled: false,
        queries: vec![query_for(Source::JSearch)],
        behavior: Behavior::Listings(vec![jsearch("x", "Backend Engineer")]),
        calls: AtomicUsize::new(0),
    });
    let planless = Arc::new(StubAdapter {
        source: Source::Remotive,
        enabled: true,
        queries: Vec::new(),
        behavior: Behavior::Listings(vec![remotive("y", "Backend Engineer")]),
        calls: AtomicUsize::new(0),
    });
    let h = harness(&[disabled.clone(), planless.clone()], RefreshSettings::default()).await;

    let counts = h.service.refresh(h.user, false).await.unwrap();
    assert_eq!(counts, RefreshCounts::default());
    assert_eq!(disabled.calls() + planless.calls(), 0);
    assert_eq!(h.feeds.refresh_log().await.len(), 1);
}

#[tokio::test]
async fn listings_without_ids_are_not_cached() {
    let stub = StubAdapter::new(
        Source::Remotive,
        Behavior::Listings(vec![remotive("  ", "No Id"), remotive("5", "Backend Engineer")]),
    );
    let h = harness(&[stub], RefreshSettings::default()).await;

    let counts = h.service.refresh(h.user, false).await.unwrap();
    assert_eq!(counts, RefreshCounts { fetched: 1, new: 1 });
    assert_eq!(h.feeds.job_count().await, 1);
}

#[tokio::test]
async fn rescore_and_refresh_keep_user_flags() {
    let stub = StubAdapter::new(
        Source::Remotive,
        Behavior::Listings(vec![remotive("1", "Backend Engineer"), remotive("2", "Data Analyst")]),
    );
    let h = harness(&[stub], RefreshSettings::default()).await;
    h.service.refresh(h.user, false).await.unwrap();

    let kept = h.feeds.find_job("remotive", "remotive-1").await.unwrap();
    let hidden = h.feeds.find_job("remotive", "remotive-2").await.unwrap();
    let tracked = h.service.save_to_tracker(h.user, kept.id).await.unwrap();
    assert_eq!(tracked.status, "saved");
    h.service.dismiss(h.user, hidden.id).await.unwrap();

    let mut changed = backend_profile(h.user);
    changed.skills = vec!["Go".into()];
    h.profiles.put(changed.clone()).await;

    assert_eq!(h.service.rescore(h.user).await.unwrap(), 1);
    let saved_link = h.feeds.link(h.user, kept.id).await.unwrap();
    assert!(saved_link.saved);
    assert_eq!(saved_link.saved_job_id, Some(tracked.id));
    assert_eq!(
        saved_link.match_score,
        score_match(&changed, &kept, &ScoringWeights::default())
    );
    assert!(h.feeds.link(h.user, hidden.id).await.unwrap().dismissed);

    h.service.refresh(h.user, true).await.unwrap();
    assert!(h.feeds.link(h.user, kept.id).await.unwrap().saved);
    assert!(h.feeds.link(h.user, hidden.id).await.unwrap().dismissed);
}

#[tokio::test]
async fn profile_updates_only_rescore_on_scoring_changes() {
    let stub = StubAdapter::new(Source::Remotive, Behavior::Listings(vec![remotive("1", "Backend Engineer")]));
    let h = harness(&[stub.clone()], RefreshSettings::default()).await;
    h.service.refresh(h.user, false).await.unwrap();

    let old = backend_profile(h.user);
    assert!(h.service.on_profile_updated(&old, &old.clone()).is_none());

    let mut new = old.clone();
    new.target_roles.push("Platform Engineer".into());
    h.profiles.put(new.clone()).await;
    let handle = h.service.on_profile_updated(&old, &new).unwrap();
    assert_eq!(handle.await.unwrap().unwrap(), 1);
    assert_eq!(stub.calls(), 1);
}

#[tokio::test]
async fn feed_limit_is_clamped_and_hides_dismissed() {
    let stub = StubAdapter::new(
        Source::Remotive,
        Behavior::Listings(vec![
            remotive("1", "Backend Engineer"),
            remotive("2", "Senior Backend Engineer"),
            remotive("3", "Office Manager"),
        ]),
    );
    let h = harness(&[stub], RefreshSettings::default()).await;
    h.service.refresh(h.user, false).await.unwrap();

    assert_eq!(h.service.feed(h.user, Some(0)).await.unwrap().len(), 1);
    assert_eq!(h.service.feed(h.user, Some(500)).await.unwrap().len(), 3);

    let feed = h.service.feed(h.user, None).await.unwrap();
    assert_eq!(feed.len(), 3);
    assert!(feed
        .windows(2)
        .all(|w| w[0].link.match_score >= w[1].link.match_score));

    h.service.dismiss(h.user, feed[0].job.id).await.unwrap();
    let feed = h.service.feed(h.user, None).await.unwrap();
    assert_eq!(feed.len(), 2);
}

#[tokio::test]
async fn purge_drops_expired_jobs_from_the_feed() {
    let stub = StubAdapter::new(
        Source::Remotive,
        Behavior::Listings(vec![remotive("1", "Backend Engineer"), remotive("2", "Rust Developer")]),
    );
    let h = harness(&[stub], RefreshSettings::default()).await;
    h.service.refresh(h.user, false).await.unwrap();

    let stale = h.feeds.find_job("remotive", "remotive-1").await.unwrap();
    assert!(
        h.feeds
            .set_expiry(stale.id, Utc::now() - chrono::Duration::minutes(1))
            .await
    );

    assert_eq!(h.service.purge_expired().await.unwrap(), 1);
    assert_eq!(h.feeds.job_count().await, 1);
    assert!(h.feeds.link(h.user, stale.id).await.is_none());
    assert_eq!(h.service.feed(h.user, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn spawned_refresh_reports_through_its_handle() {
    let stub = StubAdapter::new(Source::Remotive, Behavior::Listings(vec![remotive("1", "Backend Engineer")]));
    let h = harness(&[stub], RefreshSettings::default()).await;

    let counts = h.service.spawn_refresh(h.user, false).await.unwrap().unwrap();
    assert_eq!(counts, RefreshCounts { fetched: 1, new: 1 });

    let rescored = h.service.spawn_rescore(h.user).await.unwrap().unwrap();
    assert_eq!(rescored, 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_handles_do_not_cancel_background_work() {
    let stub = StubAdapter::new(
        Source::Remotive,
        Behavior::Listings(vec![remotive("1", "Backend Engineer"), remotive("2", "Rust Developer")]),
    );
    let h = harness(&[stub.clone()], RefreshSettings::default()).await;

    drop(h.service.spawn_refresh(h.user, false));
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(stub.calls(), 1);
    assert_eq!(h.feeds.job_count().await, 2);
    assert_eq!(h.feeds.links_for(h.user).await.len(), 2);
    let log = h.feeds.refresh_log().await;
    assert_eq!(log.len(), 1);
    assert_eq!((log[0].jobs_fetched, log[0].jobs_new), (2, 2));

    let mut changed = backend_profile(h.user);
    changed.target_roles = vec!["Data Analyst".into()];
    changed.skills = vec!["Excel".into()];
    h.profiles.put(changed.clone()).await;
    let backend = h.feeds.find_job("remotive", "remotive-1").await.unwrap();
    let before = h.feeds.link(h.user, backend.id).await.unwrap().match_score;
    assert_ne!(before, score_match(&changed, &backend, &ScoringWeights::default()));

    drop(h.service.spawn_rescore(h.user));
    tokio::time::sleep(Duration::from_secs(1)).await;

    for external_id in ["remotive-1", "remotive-2"] {
        let job = h.feeds.find_job("remotive", external_id).await.unwrap();
        let link = h.feeds.link(h.user, job.id).await.unwrap();
        assert_eq!(link.match_score, score_match(&changed, &job, &ScoringWeights::default()));
    }
}

struct StalledProfiles;

#[async_trait]
impl ProfileStore for StalledProfiles {
    async fn find_by_id(&self, _user_id: Uuid) -> Result<Option<Profile>, StoreError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn spawned_refresh_is_bounded_even_before_providers_run() {
    let stub = StubAdapter::new(Source::Remotive, Behavior::Listings(vec![remotive("1", "Backend Engineer")]));
    let settings = RefreshSettings {
        refresh_timeout: Duration::from_secs(1),
        ..RefreshSettings::default()
    };
    let feeds = Arc::new(MemoryFeedStore::default());
    let service = FeedService::new(
        feeds.clone(),
        Arc::new(StalledProfiles),
        vec![stub.clone() as Arc<dyn SourceAdapter>],
    )
    .with_settings(settings);

    let err = service
        .spawn_refresh(Uuid::new_v4(), true)
        .await
        .unwrap()
        .unwrap_err();
    let expected = Duration::from_secs(1) + REFRESH_GRACE;
    assert!(matches!(err, RefreshError::TimedOut(limit) if limit == expected));
    assert_eq!(stub.calls(), 0);
    assert!(feeds.refresh_log().await.is_empty());
}
