//! `podcast-episodes`: the episode record store and the synchronizer that
//! fills it from parsed feeds.
//!
//! Episodes are insert-only and keyed by the feed-provided guid. Syncing is
//! idempotent, so the same feed may be processed any number of times, even
//! concurrently.

pub mod db;
pub mod error;
pub mod job;
pub mod store;
pub mod sync;
pub mod types;

pub use error::{Result, StoreError};
pub use job::FeedSyncJob;
pub use store::{EpisodeStore, SqliteEpisodeStore, DEFAULT_RECENT_LIMIT};
pub use sync::EpisodeSynchronizer;
pub use types::{Episode, SyncReport};
