//! Job history retention: the scheduler prunes its own execution log.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{
    error::{Result, SchedulerError},
    history::ExecutionLog,
    job::{Job, JobResult},
};

/// Default retention window: one week.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(604_800);

/// Delete every execution record older than `max_age` relative to now.
///
/// Records exactly `max_age` old are kept; running it twice is harmless.
pub fn purge(log: &ExecutionLog, max_age: Duration) -> Result<usize> {
    let cutoff = chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .ok_or_else(|| {
            SchedulerError::InvalidRetention(format!("{}s is too large", max_age.as_secs()))
        })?;
    purge_before(log, cutoff)
}

/// Delete every execution record whose run time is strictly before `cutoff`.
pub fn purge_before(log: &ExecutionLog, cutoff: DateTime<Utc>) -> Result<usize> {
    let deleted = log.delete_before(cutoff)?;
    if deleted > 0 {
        info!(deleted, cutoff = %cutoff, "old job executions purged");
    } else {
        debug!(cutoff = %cutoff, "no job executions to purge");
    }
    Ok(deleted)
}

/// Scheduled job wrapping [`purge`].
pub struct RetentionJob {
    log: ExecutionLog,
    max_age: Duration,
}

impl RetentionJob {
    /// Retention job with the default one-week window.
    pub fn new(log: ExecutionLog) -> Self {
        Self::with_max_age(log, DEFAULT_MAX_AGE)
    }

    pub fn with_max_age(log: ExecutionLog, max_age: Duration) -> Self {
        Self { log, max_age }
    }
}

#[async_trait]
impl Job for RetentionJob {
    async fn run(&self) -> JobResult {
        let log = self.log.clone();
        let max_age = self.max_age;
        // SQLite work stays off the async worker threads.
        tokio::task::spawn_blocking(move || purge(&log, max_age)).await??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::TimeZone;
    use rusqlite::Connection;

    use super::*;
    use crate::{db::init_db, history::NewExecution, types::Outcome};

    fn log() -> ExecutionLog {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        ExecutionLog::new(Arc::new(Mutex::new(conn)))
    }

    fn record_at(log: &ExecutionLog, job_id: &str, run_time: DateTime<Utc>) {
        log.record(NewExecution {
            job_id,
            run_time,
            outcome: Outcome::Success,
            duration_ms: 5,
            error: None,
        })
        .unwrap();
    }

    #[test]
    fn purge_before_is_strict_and_idempotent() {
        let log = log();
        let cutoff = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
        record_at(&log, "a", cutoff - chrono::Duration::days(3));
        record_at(&log, "a", cutoff - chrono::Duration::milliseconds(1));
        record_at(&log, "b", cutoff);
        record_at(&log, "b", cutoff + chrono::Duration::days(1));

        assert_eq!(purge_before(&log, cutoff).unwrap(), 2);
        let left: Vec<_> = log.all().unwrap().into_iter().map(|r| r.run_time).collect();
        assert_eq!(left, vec![cutoff, cutoff + chrono::Duration::days(1)]);

        assert_eq!(purge_before(&log, cutoff).unwrap(), 0);
        assert_eq!(log.all().unwrap().len(), 2);
    }

    #[test]
    fn purge_by_age_keeps_recent_records() {
        let log = log();
        let now = Utc::now();
        record_at(&log, "feed", now - chrono::Duration::days(8));
        record_at(&log, "feed", now - chrono::Duration::days(6));
        record_at(&log, "feed", now - chrono::Duration::minutes(2));

        assert_eq!(purge(&log, DEFAULT_MAX_AGE).unwrap(), 1);
        let left = log.all().unwrap();
        assert_eq!(left.len(), 2);
        let week = chrono::Duration::days(7);
        assert!(left.iter().all(|r| now - r.run_time <= week));
    }

    #[tokio::test]
    async fn retention_job_purges() {
        let log = log();
        record_at(&log, "feed", Utc::now() - chrono::Duration::days(30));
        record_at(&log, "feed", Utc::now());

        let job = RetentionJob::new(log.clone());
        job.run().await.unwrap();
        assert_eq!(log.all().unwrap().len(), 1);
    }

    #[test]
    fn oversized_window_is_an_error_not_a_panic() {
        let log = log();
        record_at(&log, "feed", Utc::now());

        let err = purge(&log, Duration::from_secs(u64::MAX)).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidRetention(_)));
        let err = purge(&log, Duration::from_secs(10_u64.pow(15))).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidRetention(_)));
        assert_eq!(log.all().unwrap().len(), 1);
    }
}
