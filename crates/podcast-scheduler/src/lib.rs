//! `podcast-scheduler`: Tokio-based job scheduler with SQLite persistence.
//!
//! # Overview
//!
//! Job definitions live in the `scheduled_jobs` table and survive restarts.
//! The [`Scheduler`] polls the table every tick, hands due jobs to a bounded
//! worker pool and writes one [`ExecutionRecord`] per dispatch decision to
//! `job_executions`. A job that is still running when it falls due again is
//! skipped, not queued.
//!
//! # Trigger variants
//!
//! | Variant    | Behaviour                                               |
//! |------------|---------------------------------------------------------|
//! | `Interval` | Repeat every N seconds                                  |
//! | `Weekly`   | Fire at HH:MM on a weekday, in the scheduler's timezone |
//! | `Cron`     | Cron expression, in the scheduler's timezone            |

pub mod db;
pub mod engine;
pub mod error;
pub mod history;
pub mod job;
pub mod retention;
pub mod schedule;
pub mod types;

pub use engine::Scheduler;
pub use error::{Result, SchedulerError};
pub use history::{ExecutionLog, NewExecution};
pub use job::{Job, JobResult};
pub use retention::{purge, purge_before, RetentionJob, DEFAULT_MAX_AGE};
pub use types::{ExecutionRecord, JobInfo, JobSpec, Outcome, Trigger};
