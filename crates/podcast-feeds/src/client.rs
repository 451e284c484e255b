use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::{FetchError, Result};
use crate::models::FeedDocument;
use crate::parser::parse_feed;

/// Anything that can turn a feed URL into a [`FeedDocument`].
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FeedDocument>;
}

/// `reqwest`-backed fetcher. One GET per call, no retries.
#[derive(Clone)]
pub struct HttpFeedFetcher {
    client: Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<FeedDocument> {
        debug!(%url, "fetching feed");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await?;
        let doc = parse_feed(&body)?;
        debug!(%url, entries = doc.entries.len(), "feed parsed");
        Ok(doc)
    }
}
