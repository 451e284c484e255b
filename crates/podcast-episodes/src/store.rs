use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::warn;

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::types::Episode;

/// How many episodes the listing page shows.
pub const DEFAULT_RECENT_LIMIT: usize = 30;

/// Insert-only record store keyed by guid.
pub trait EpisodeStore: Send + Sync {
    fn exists(&self, guid: &str) -> Result<bool>;

    /// Write `episode` unless its guid is already stored. Returns `true` when
    /// a row was written.
    fn insert(&self, episode: &Episode) -> Result<bool>;

    /// Most recent episodes by publish date, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<Episode>>;

    fn count(&self) -> Result<usize>;
}

/// SQLite-backed [`EpisodeStore`].
///
/// Thread-safe: wraps the connection in a Mutex, one statement at a time.
pub struct SqliteEpisodeStore {
    db: Mutex<Connection>,
}

impl SqliteEpisodeStore {
    /// Take ownership of `conn`, creating the `episodes` table if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl EpisodeStore for SqliteEpisodeStore {
    fn exists(&self, guid: &str) -> Result<bool> {
        let db = self.lock()?;
        let found = db
            .query_row("SELECT 1 FROM episodes WHERE guid = ?1", [guid], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn insert(&self, episode: &Episode) -> Result<bool> {
        let db = self.lock()?;
        let n = db.execute(
            "INSERT INTO episodes (guid, title, description, pub_date, link, image,
             podcast_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(guid) DO NOTHING",
            rusqlite::params![
                episode.guid,
                episode.title,
                episode.description,
                fmt_ts(episode.pub_date),
                episode.link,
                episode.image,
                episode.podcast_name,
                fmt_ts(Utc::now()),
            ],
        )?;
        Ok(n == 1)
    }

    fn recent(&self, limit: usize) -> Result<Vec<Episode>> {
        let db = self.lock()?;
        let mut stmt = db.prepare(
            "SELECT guid, title, description, pub_date, link, image, podcast_name
             FROM episodes ORDER BY pub_date DESC, guid LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut episodes = Vec::new();
        for row in rows {
            let (guid, title, description, pub_date, link, image, podcast_name) = row?;
            let Some(pub_date) = parse_ts(&pub_date) else {
                warn!(%guid, %pub_date, "skipping episode with unreadable pub_date");
                continue;
            };
            episodes.push(Episode {
                guid,
                title,
                description,
                pub_date,
                link,
                image,
                podcast_name,
            });
        }
        Ok(episodes)
    }

    fn count(&self) -> Result<usize> {
        let db = self.lock()?;
        let n: i64 = db.query_row("SELECT COUNT(*) FROM episodes", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
