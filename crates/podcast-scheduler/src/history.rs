use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::{
    db::{fmt_ts, parse_ts},
    error::{Result, SchedulerError},
    types::{ExecutionRecord, Outcome},
};

/// Cloneable handle to the `job_executions` table.
///
/// Shares the scheduler's connection, so a job holding a log handle (the
/// retention job) works against the same database the scheduler writes to.
#[derive(Clone)]
pub struct ExecutionLog {
    conn: Arc<Mutex<Connection>>,
}

/// Fields of an execution that are known before it is written.
#[derive(Debug, Clone)]
pub struct NewExecution<'a> {
    pub job_id: &'a str,
    pub run_time: DateTime<Utc>,
    pub outcome: Outcome,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl ExecutionLog {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SchedulerError::LockPoisoned)
    }

    /// Append one record; returns its row id.
    pub fn record(&self, exec: NewExecution<'_>) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO job_executions
             (job_id, run_time, outcome, duration_ms, error, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                exec.job_id,
                fmt_ts(exec.run_time),
                exec.outcome.to_string(),
                exec.duration_ms as i64,
                exec.error,
                fmt_ts(Utc::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent records for `job_id`, newest first.
    pub fn for_job(&self, job_id: &str, limit: usize) -> Result<Vec<ExecutionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, job_id, run_time, outcome, duration_ms, error, finished_at
             FROM job_executions WHERE job_id = ?1
             ORDER BY run_time DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![job_id, limit as i64], row_to_record)?
            .filter_map(|r| r.ok().flatten())
            .collect();
        Ok(rows)
    }

    /// Every record, oldest first.
    pub fn all(&self) -> Result<Vec<ExecutionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, job_id, run_time, outcome, duration_ms, error, finished_at
             FROM job_executions ORDER BY run_time, id",
        )?;
        let rows = stmt
            .query_map([], row_to_record)?
            .filter_map(|r| r.ok().flatten())
            .collect();
        Ok(rows)
    }

    /// Delete records whose `run_time` is strictly before `cutoff`.
    pub fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        let n = conn.execute(
            "DELETE FROM job_executions WHERE run_time < ?1",
            [fmt_ts(cutoff)],
        )?;
        Ok(n)
    }
}

// Rows with an unreadable timestamp or outcome are skipped rather than
// failing the whole listing.
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Option<ExecutionRecord>> {
    let run_time: String = row.get(2)?;
    let outcome: String = row.get(3)?;
    let finished_at: String = row.get(6)?;
    let (Some(run_time), Ok(outcome), Some(finished_at)) = (
        parse_ts(&run_time),
        outcome.parse::<Outcome>(),
        parse_ts(&finished_at),
    ) else {
        return Ok(None);
    };
    Ok(Some(ExecutionRecord {
        id: row.get(0)?,
        job_id: row.get(1)?,
        run_time,
        outcome,
        duration_ms: row.get::<_, i64>(4)?.max(0) as u64,
        error: row.get(5)?,
        finished_at,
    }))
}
