use std::sync::Arc;

use podcast_feeds::{parse_pub_date, EntryParseError, FeedDocument, FeedEntry};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::EpisodeStore;
use crate::types::{Episode, SyncReport};

/// Writes the not-yet-seen entries of a feed document to the store.
///
/// Idempotent: syncing the same document twice inserts nothing the second
/// time. A malformed entry is skipped without affecting the others; a store
/// failure aborts the whole sync.
#[derive(Clone)]
pub struct EpisodeSynchronizer {
    store: Arc<dyn EpisodeStore>,
}

impl EpisodeSynchronizer {
    pub fn new(store: Arc<dyn EpisodeStore>) -> Self {
        Self { store }
    }

    pub fn sync(&self, doc: &FeedDocument) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for entry in &doc.entries {
            let Some(guid) = entry.guid.as_deref() else {
                warn!(
                    podcast = %doc.channel.title,
                    title = entry.title.as_deref().unwrap_or(""),
                    "skipping entry: {}",
                    EntryParseError::MissingGuid
                );
                report.failed += 1;
                continue;
            };

            if self.store.exists(guid)? {
                report.existing += 1;
                continue;
            }

            let episode = match to_episode(doc, entry, guid) {
                Ok(ep) => ep,
                Err(e) => {
                    warn!(%guid, podcast = %doc.channel.title, "skipping entry: {e}");
                    report.failed += 1;
                    continue;
                }
            };

            // A concurrent sync may have won the race since `exists`.
            if self.store.insert(&episode)? {
                debug!(%guid, title = %episode.title, "episode stored");
                report.inserted += 1;
            } else {
                report.existing += 1;
            }
        }

        info!(podcast = %doc.channel.title, %report, "feed synced");
        Ok(report)
    }
}

/// Build an episode from one entry plus its channel's metadata.
fn to_episode(
    doc: &FeedDocument,
    entry: &FeedEntry,
    guid: &str,
) -> std::result::Result<Episode, EntryParseError> {
    let raw_date = entry
        .published_at
        .as_deref()
        .ok_or(EntryParseError::MissingDate)?;
    Ok(Episode {
        guid: guid.to_string(),
        title: entry.title.clone().unwrap_or_default(),
        description: entry.description.clone().unwrap_or_default(),
        pub_date: parse_pub_date(raw_date)?,
        link: entry.link.clone().unwrap_or_default(),
        image: doc.channel.image_url.clone(),
        podcast_name: doc.channel.title.clone(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{TimeZone, Utc};
    use podcast_feeds::Channel;

    use super::*;
    use crate::error::StoreError;

    /// In-memory store that can be switched to fail every call.
    #[derive(Default)]
    struct MemStore {
        rows: Mutex<Vec<Episode>>,
        broken: bool,
    }

    impl EpisodeStore for MemStore {
        fn exists(&self, guid: &str) -> Result<bool> {
            if self.broken {
                return Err(StoreError::LockPoisoned);
            }
            Ok(self.rows.lock().unwrap().iter().any(|e| e.guid == guid))
        }

        fn insert(&self, episode: &Episode) -> Result<bool> {
            let mut rows = self.rows.lock().unwrap();
            if rows.iter().any(|e| e.guid == episode.guid) {
                return Ok(false);
            }
            rows.push(episode.clone());
            Ok(true)
        }

        fn recent(&self, limit: usize) -> Result<Vec<Episode>> {
            Ok(self.rows.lock().unwrap().iter().take(limit).cloned().collect())
        }

        fn count(&self) -> Result<usize> {
            Ok(self.rows.lock().unwrap().len())
        }
    }

    fn entry(guid: Option<&str>, date: Option<&str>) -> FeedEntry {
        FeedEntry {
            guid: guid.map(str::to_string),
            title: Some("Ep".to_string()),
            description: Some("d".to_string()),
            published_at: date.map(str::to_string),
            link: Some("http://x/1".to_string()),
        }
    }

    fn doc(entries: Vec<FeedEntry>) -> FeedDocument {
        FeedDocument {
            channel: Channel {
                title: "Talk Python to Me".to_string(),
                image_url: None,
            },
            entries,
        }
    }

    const DATE: &str = "Mon, 01 Jan 2024 10:00:00 GMT";

    #[test]
    fn second_sync_inserts_nothing() {
        let store = Arc::new(MemStore::default());
        let sync = EpisodeSynchronizer::new(store.clone());
        let d = doc(vec![entry(Some("a"), Some(DATE)), entry(Some("b"), Some(DATE))]);

        let first = sync.sync(&d).unwrap();
        assert_eq!(first.inserted, 2);

        let second = sync.sync(&d).unwrap();
        assert_eq!(
            second,
            SyncReport {
                inserted: 0,
                existing: 2,
                failed: 0
            }
        );
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn bad_entries_are_skipped_and_counted() {
        let store = Arc::new(MemStore::default());
        let sync = EpisodeSynchronizer::new(store.clone());
        let d = doc(vec![
            entry(None, Some(DATE)),
            entry(Some("bad-date"), Some("next tuesday-ish")),
            entry(Some("no-date"), None),
            entry(Some("ok"), Some(DATE)),
        ]);

        let report = sync.sync(&d).unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.failed, 3);
        assert_eq!(report.total(), 4);

        let stored = store.recent(10).unwrap();
        assert_eq!(stored[0].guid, "ok");
        assert_eq!(stored[0].pub_date, Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());
        assert_eq!(stored[0].podcast_name, "Talk Python to Me");
        assert_eq!(stored[0].image, None);
    }

    #[test]
    fn duplicate_guid_within_one_document_is_stored_once() {
        let store = Arc::new(MemStore::default());
        let sync = EpisodeSynchronizer::new(store.clone());
        let d = doc(vec![entry(Some("a"), Some(DATE)), entry(Some("a"), Some(DATE))]);

        let report = sync.sync(&d).unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.existing, 1);
    }

    #[test]
    fn store_failure_aborts_sync() {
        let store = Arc::new(MemStore {
            broken: true,
            ..Default::default()
        });
        let sync = EpisodeSynchronizer::new(store);
        let err = sync.sync(&doc(vec![entry(Some("a"), Some(DATE))])).unwrap_err();
        assert!(matches!(err, StoreError::LockPoisoned));
    }
}
