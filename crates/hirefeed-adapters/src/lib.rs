//! Job-listing provider adapters: query planning, fetching and normalization.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use hirefeed_core::{NewFeedJob, Profile};
use hirefeed_storage::{FetchError, HttpFetcher};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

pub mod adzuna;
pub mod jsearch;
pub mod planner;
pub mod remotive;
pub mod text;

pub use adzuna::{AdzunaAdapter, AdzunaJob, AdzunaQuery};
pub use jsearch::{JSearchAdapter, JSearchJob, JSearchQuery};
pub use remotive::{RemotiveAdapter, RemotiveJob, RemotiveQuery};

pub const CRATE_NAME: &str = "hirefeed-adapters";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    JSearch,
    Remotive,
    Adzuna,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::JSearch, Source::Remotive, Source::Adzuna];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::JSearch => "jsearch",
            Self::Remotive => "remotive",
            Self::Adzuna => "adzuna",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call context. The deadline is shared by every provider in one refresh.
#[derive(Debug, Clone, Copy)]
pub struct AdapterContext {
    pub deadline: Instant,
}

impl AdapterContext {
    pub fn new(deadline: Instant) -> Self {
        Self { deadline }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0} is not configured")]
    NotConfigured(Source),
    #[error("{adapter} adapter cannot run a {query} query")]
    WrongQuery { adapter: Source, query: Source },
    #[error("building request url: {0}")]
    Url(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("malformed {0} payload: {1}")]
    Payload(Source, #[source] serde_json::Error),
}

/// One planned provider request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum ProviderQuery {
    JSearch(JSearchQuery),
    Remotive(RemotiveQuery),
    Adzuna(AdzunaQuery),
}

impl ProviderQuery {
    pub fn source(&self) -> Source {
        match self {
            Self::JSearch(_) => Source::JSearch,
            Self::Remotive(_) => Source::Remotive,
            Self::Adzuna(_) => Source::Adzuna,
        }
    }

    /// Short human-readable form for logs.
    pub fn label(&self) -> String {
        match self {
            Self::JSearch(q) => q.search_text(),
            Self::Remotive(q) if q.category.is_empty() => q.search.clone(),
            Self::Remotive(q) => format!("category:{}", q.category),
            Self::Adzuna(q) => q.keywords.clone(),
        }
    }
}

/// Provider payload as returned by the API, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum RawListing {
    JSearch(JSearchJob),
    Remotive(RemotiveJob),
    Adzuna(AdzunaJob),
}

/// Converts any provider listing into the sanitized canonical shape.
pub fn normalize(raw: RawListing) -> NewFeedJob {
    let job = match raw {
        RawListing::JSearch(job) => jsearch::normalize(job),
        RawListing::Remotive(job) => remotive::normalize(job),
        RawListing::Adzuna(job) => adzuna::normalize(job),
    };
    job.sanitized()
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> Source;

    /// False when the provider's credentials are missing.
    fn enabled(&self) -> bool {
        true
    }

    fn plan(&self, profile: &Profile) -> Vec<ProviderQuery>;

    /// Runs one planned query. Must give up once `ctx.deadline` passes.
    async fn search(
        &self,
        query: &ProviderQuery,
        ctx: &AdapterContext,
    ) -> Result<Vec<RawListing>, AdapterError>;
}

#[derive(Debug, Clone, Default)]
pub struct AdapterCredentials {
    pub rapidapi_key: Option<String>,
    pub adzuna_app_id: Option<String>,
    pub adzuna_app_key: Option<String>,
}

pub fn adapter_for_source(
    source: Source,
    http: Arc<HttpFetcher>,
    credentials: &AdapterCredentials,
) -> Arc<dyn SourceAdapter> {
    match source {
        Source::JSearch => Arc::new(JSearchAdapter::new(http, credentials.rapidapi_key.clone())),
        Source::Remotive => Arc::new(RemotiveAdapter::new(http)),
        Source::Adzuna => Arc::new(AdzunaAdapter::new(
            http,
            credentials.adzuna_app_id.clone(),
            credentials.adzuna_app_key.clone(),
        )),
    }
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn wrong_query(adapter: Source, query: &ProviderQuery) -> AdapterError {
    AdapterError::WrongQuery {
        adapter,
        query: query.source(),
    }
}
