use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// Longest interval whose millisecond offset fits a timestamp delta.
pub const MAX_INTERVAL_SECS: u64 = i64::MAX as u64 / 1000;

/// Defines when a job fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Repeat every N seconds.
    Interval { every_secs: u64 },

    /// Fire on a weekday (0 = Monday … 6 = Sunday) at HH:MM in the
    /// scheduler's timezone.
    Weekly { day: u8, hour: u8, minute: u8 },

    /// Six/seven-field cron expression (seconds first) in the scheduler's
    /// timezone.
    Cron { expression: String },
}

impl Trigger {
    /// Reject definitions that could never produce a fire time.
    pub fn validate(&self) -> Result<()> {
        match self {
            Trigger::Interval { every_secs } if *every_secs == 0 => Err(
                SchedulerError::InvalidTrigger("interval must be at least one second".to_string()),
            ),
            Trigger::Interval { every_secs } if *every_secs > MAX_INTERVAL_SECS => {
                Err(SchedulerError::InvalidTrigger(format!(
                    "interval of {every_secs}s exceeds the maximum of {MAX_INTERVAL_SECS}s"
                )))
            }
            Trigger::Weekly { day, hour, minute } if *day > 6 || *hour > 23 || *minute > 59 => {
                Err(SchedulerError::InvalidTrigger(format!(
                    "weekly trigger out of range: day={day} hour={hour} minute={minute}"
                )))
            }
            Trigger::Cron { expression } => expression
                .parse::<cron::Schedule>()
                .map(|_| ())
                .map_err(|e| SchedulerError::InvalidTrigger(format!("{expression}: {e}"))),
            _ => Ok(()),
        }
    }
}

/// Registration parameters for one job.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Unique id; also the primary key of the persisted definition.
    pub id: String,
    pub trigger: Trigger,
    /// Concurrent runs allowed for this id. A due run beyond the limit is
    /// skipped, never queued.
    pub max_instances: usize,
    /// Overwrite a persisted definition with the same id instead of failing.
    pub replace_existing: bool,
}

impl JobSpec {
    pub fn new(id: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            id: id.into(),
            trigger,
            max_instances: 1,
            replace_existing: true,
        }
    }

    pub fn max_instances(mut self, n: usize) -> Self {
        self.max_instances = n.max(1);
        self
    }

    pub fn replace_existing(mut self, replace: bool) -> Self {
        self.replace_existing = replace;
        self
    }
}

/// A persisted job definition as stored in `scheduled_jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub trigger: Trigger,
    pub max_instances: usize,
    /// Next planned dispatch; `None` once the trigger has no future fire time.
    pub next_run: Option<DateTime<Utc>>,
    /// Most recent dispatch, surviving restarts.
    pub last_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How a dispatch decision ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The target returned `Ok`.
    Success,
    /// The target returned an error or panicked.
    Error,
    /// A fire time passed while the process was down; it was coalesced.
    Missed,
    /// The job was due but already running at its instance limit.
    MaxInstances,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Outcome::Success => "success",
            Outcome::Error => "error",
            Outcome::Missed => "missed",
            Outcome::MaxInstances => "max_instances",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(Outcome::Success),
            "error" => Ok(Outcome::Error),
            "missed" => Ok(Outcome::Missed),
            "max_instances" => Ok(Outcome::MaxInstances),
            other => Err(format!("unknown execution outcome: {other}")),
        }
    }
}

/// One row of the execution log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: i64,
    pub job_id: String,
    pub run_time: DateTime<Utc>,
    pub outcome: Outcome,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}
