use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored podcast episode. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    /// Feed-provided identifier; unique across all podcasts.
    pub guid: String,
    pub title: String,
    pub description: String,
    pub pub_date: DateTime<Utc>,
    pub link: String,
    /// Channel artwork; `None` when the feed has none.
    pub image: Option<String>,
    pub podcast_name: String,
}

/// Result of syncing one feed document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// New episodes written by this sync.
    pub inserted: usize,
    /// Entries whose guid was already stored.
    pub existing: usize,
    /// Entries skipped because they could not be parsed.
    pub failed: usize,
}

impl SyncReport {
    pub fn total(&self) -> usize {
        self.inserted + self.existing + self.failed
    }
}

impl std::fmt::Display for SyncReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} inserted, {} existing, {} failed",
            self.inserted, self.existing, self.failed
        )
    }
}
