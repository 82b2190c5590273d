//! Feed persistence and the shared HTTP fetcher for HireFeed.

pub mod http;
mod memory;
mod postgres;
mod store;

pub use http::{FetchError, FetchedResponse, HttpClientConfig, HttpFetcher};
pub use memory::{MemoryFeedStore, MemoryProfileStore};
pub use postgres::{connect_pool, run_migrations, PgFeedStore, PgProfileStore};
pub use store::{
    default_job_ttl, FeedStore, ProfileStore, StoreError, UpsertOutcome, DEFAULT_FEED_LIMIT,
};

pub const CRATE_NAME: &str = "hirefeed-storage";
