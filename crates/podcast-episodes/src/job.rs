use std::sync::Arc;

use async_trait::async_trait;
use podcast_feeds::FeedFetcher;
use podcast_scheduler::{Job, JobResult};
use tracing::info;

use crate::sync::EpisodeSynchronizer;
use crate::types::SyncReport;

/// Scheduled job that fetches one feed and stores its new episodes.
pub struct FeedSyncJob {
    id: String,
    url: String,
    fetcher: Arc<dyn FeedFetcher>,
    synchronizer: EpisodeSynchronizer,
}

impl FeedSyncJob {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        fetcher: Arc<dyn FeedFetcher>,
        synchronizer: EpisodeSynchronizer,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            fetcher,
            synchronizer,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One fetch-and-sync pass.
    pub async fn sync_once(&self) -> JobResult<SyncReport> {
        let doc = self.fetcher.fetch(&self.url).await?;
        let synchronizer = self.synchronizer.clone();
        // SQLite work stays off the async worker threads.
        let report = tokio::task::spawn_blocking(move || synchronizer.sync(&doc)).await??;
        info!(feed = %self.id, inserted = report.inserted, existing = report.existing,
              failed = report.failed, "feed sync finished");
        Ok(report)
    }
}

#[async_trait]
impl Job for FeedSyncJob {
    async fn run(&self) -> JobResult {
        self.sync_once().await.map(|_| ())
    }
}
