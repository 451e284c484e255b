use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `scheduled_jobs` and `job_executions` tables (idempotent) plus
/// the indexes used by the polling and retention queries.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS scheduled_jobs (
            id             TEXT    NOT NULL PRIMARY KEY,
            trigger_def    TEXT    NOT NULL,   -- JSON-encoded Trigger enum
            max_instances  INTEGER NOT NULL DEFAULT 1,
            next_run       TEXT,               -- RFC 3339 UTC or NULL
            last_run       TEXT,               -- RFC 3339 UTC or NULL
            created_at     TEXT    NOT NULL,
            updated_at     TEXT    NOT NULL
        ) STRICT;

        -- Efficient polling: SELECT … WHERE next_run <= ?  ORDER BY next_run
        CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_next_run
            ON scheduled_jobs (next_run);

        CREATE TABLE IF NOT EXISTS job_executions (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id       TEXT    NOT NULL,
            run_time     TEXT    NOT NULL,
            outcome      TEXT    NOT NULL,
            duration_ms  INTEGER NOT NULL DEFAULT 0,
            error        TEXT,
            finished_at  TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_job_executions_run_time
            ON job_executions (run_time);
        CREATE INDEX IF NOT EXISTS idx_job_executions_job
            ON job_executions (job_id, run_time DESC);
        ",
    )?;
    Ok(())
}

/// Fixed-width UTC timestamp, so lexical order in SQLite equals time order.
pub(crate) fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
    }

    #[test]
    fn timestamps_sort_lexically() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 9, 59, 59).unwrap();
        let b = a + chrono::Duration::milliseconds(1500);
        assert!(fmt_ts(a) < fmt_ts(b));
        assert_eq!(fmt_ts(a), "2024-01-01T09:59:59.000Z");
        assert_eq!(parse_ts(&fmt_ts(b)), Some(b));
    }
}
