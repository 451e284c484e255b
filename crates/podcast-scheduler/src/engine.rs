use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard,
};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rusqlite::{Connection, OptionalExtension};
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    db::{fmt_ts, init_db, parse_ts},
    error::{Result, SchedulerError},
    history::{ExecutionLog, NewExecution},
    job::Job,
    schedule::{compute_next_run, next_run_after},
    types::{JobInfo, JobSpec, Outcome, Trigger},
};

pub const DEFAULT_MAX_WORKERS: usize = 10;
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// In-memory half of a registered job: the target and its live run count.
struct Registered {
    job: Arc<dyn Job>,
    trigger: Trigger,
    max_instances: usize,
    running: Arc<AtomicUsize>,
}

/// Decrements a job's running count when its execution task ends, even if
/// the task unwinds.
struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Core scheduler: persists job definitions to SQLite and dispatches due
/// jobs onto a bounded worker pool.
///
/// Owned by the process driver and shared by reference; there is no global
/// instance.
pub struct Scheduler {
    conn: Arc<Mutex<Connection>>,
    log: ExecutionLog,
    tz: Tz,
    jobs: Mutex<HashMap<String, Registered>>,
    workers: Arc<Semaphore>,
    tick: Duration,
}

impl Scheduler {
    /// Create a scheduler over `conn`, initialising the schema if needed.
    ///
    /// Calendar triggers are evaluated in `tz`.
    pub fn new(conn: Connection, tz: Tz) -> Result<Self> {
        init_db(&conn)?;
        let conn = Arc::new(Mutex::new(conn));
        Ok(Self {
            log: ExecutionLog::new(Arc::clone(&conn)),
            conn,
            tz,
            jobs: Mutex::new(HashMap::new()),
            workers: Arc::new(Semaphore::new(DEFAULT_MAX_WORKERS)),
            tick: DEFAULT_TICK,
        })
    }

    /// Size of the worker pool shared by all jobs.
    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.workers = Arc::new(Semaphore::new(n.max(1)));
        self
    }

    /// Polling period of the coordination loop.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    /// Handle to the execution log, e.g. for a retention job.
    pub fn execution_log(&self) -> ExecutionLog {
        self.log.clone()
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SchedulerError::LockPoisoned)
    }

    fn lock_jobs(&self) -> Result<MutexGuard<'_, HashMap<String, Registered>>> {
        self.jobs.lock().map_err(|_| SchedulerError::LockPoisoned)
    }

    /// Register `job` under `spec.id`, inserting or replacing the persisted
    /// definition.
    ///
    /// If the id was already stored by an earlier process, scheduling resumes
    /// from its persisted `last_run`. A fire time that passed while the
    /// process was down is logged as `missed` and coalesced into one
    /// immediate run.
    pub fn register(&self, spec: JobSpec, job: Arc<dyn Job>) -> Result<JobInfo> {
        spec.trigger.validate()?;
        let trigger_json = serde_json::to_string(&spec.trigger)
            .map_err(|e| SchedulerError::InvalidTrigger(e.to_string()))?;
        let now = Utc::now();

        let existing: Option<(String, Option<String>, Option<String>)> = self
            .lock_conn()?
            .query_row(
                "SELECT trigger_def, next_run, last_run FROM scheduled_jobs WHERE id = ?1",
                [&spec.id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        // Fire times are computed without holding the connection lock.
        let mut next = match existing {
            Some(_) if !spec.replace_existing => {
                return Err(SchedulerError::ConflictingJob { id: spec.id });
            }
            Some((old_trigger, old_next, last_run)) => {
                let same_trigger =
                    serde_json::from_str::<Trigger>(&old_trigger).is_ok_and(|t| t == spec.trigger);
                match last_run.as_deref().and_then(parse_ts) {
                    Some(last) => compute_next_run(&spec.trigger, last, self.tz),
                    None if same_trigger => old_next
                        .as_deref()
                        .and_then(parse_ts)
                        .or_else(|| compute_next_run(&spec.trigger, now, self.tz)),
                    None => compute_next_run(&spec.trigger, now, self.tz),
                }
            }
            None => compute_next_run(&spec.trigger, now, self.tz),
        };

        if let Some(overdue) = next.filter(|n| *n < now) {
            warn!(job_id = %spec.id, overdue_since = %overdue, "run missed while offline; firing once now");
            self.log.record(NewExecution {
                job_id: &spec.id,
                run_time: overdue,
                outcome: Outcome::Missed,
                duration_ms: 0,
                error: None,
            })?;
            next = Some(now);
        }

        let now_str = fmt_ts(now);
        {
            let conn = self.lock_conn()?;
            conn.execute(
                "INSERT INTO scheduled_jobs
                 (id, trigger_def, max_instances, next_run, last_run, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    trigger_def   = excluded.trigger_def,
                    max_instances = excluded.max_instances,
                    next_run      = excluded.next_run,
                    updated_at    = excluded.updated_at",
                rusqlite::params![
                    spec.id,
                    trigger_json,
                    spec.max_instances as i64,
                    next.map(fmt_ts),
                    now_str
                ],
            )?;
        }

        {
            let mut jobs = self.lock_jobs()?;
            // Runs of a replaced target still count toward the instance limit.
            let running = jobs
                .get(&spec.id)
                .map(|r| Arc::clone(&r.running))
                .unwrap_or_default();
            jobs.insert(
                spec.id.clone(),
                Registered {
                    job,
                    trigger: spec.trigger.clone(),
                    max_instances: spec.max_instances.max(1),
                    running,
                },
            );
        }

        info!(job_id = %spec.id, next_run = ?next, "job registered");
        self.job(&spec.id)
    }

    /// Remove a job definition and its in-memory target.
    pub fn remove(&self, id: &str) -> Result<()> {
        let n = self
            .lock_conn()?
            .execute("DELETE FROM scheduled_jobs WHERE id = ?1", [id])?;
        self.lock_jobs()?.remove(id);
        if n == 0 {
            return Err(SchedulerError::JobNotFound { id: id.to_string() });
        }
        info!(job_id = %id, "job removed");
        Ok(())
    }

    /// One persisted job definition.
    pub fn job(&self, id: &str) -> Result<JobInfo> {
        self.jobs()?
            .into_iter()
            .find(|j| j.id == id)
            .ok_or_else(|| SchedulerError::JobNotFound { id: id.to_string() })
    }

    /// All persisted job definitions ordered by creation time.
    pub fn jobs(&self) -> Result<Vec<JobInfo>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, trigger_def, max_instances, next_run, last_run, created_at, updated_at
             FROM scheduled_jobs ORDER BY created_at, id",
        )?;
        let jobs = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,         // id
                    row.get::<_, String>(1)?,         // trigger JSON
                    row.get::<_, i64>(2)?,            // max_instances
                    row.get::<_, Option<String>>(3)?, // next_run
                    row.get::<_, Option<String>>(4)?, // last_run
                    row.get::<_, String>(5)?,         // created_at
                    row.get::<_, String>(6)?,         // updated_at
                ))
            })?
            .filter_map(|r| {
                let (id, trigger_json, max_instances, next_run, last_run, created_at, updated_at) =
                    r.ok()?;
                Some(JobInfo {
                    id,
                    trigger: serde_json::from_str(&trigger_json).ok()?,
                    max_instances: max_instances.max(1) as usize,
                    next_run: next_run.as_deref().and_then(parse_ts),
                    last_run: last_run.as_deref().and_then(parse_ts),
                    created_at: parse_ts(&created_at)?,
                    updated_at: parse_ts(&updated_at)?,
                })
            })
            .collect();
        Ok(jobs)
    }

    /// Main loop. Dispatches due jobs every tick until `shutdown` is
    /// cancelled, then waits for every in-flight execution to finish.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(timezone = %self.tz, "scheduler started");

        let mut in_flight: JoinSet<()> = JoinSet::new();
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(res) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = res {
                        error!("execution task failed: {e}");
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.dispatch_due(&mut in_flight) {
                        error!("scheduler tick error: {e}");
                    }
                }
            }
        }

        info!(in_flight = in_flight.len(), "scheduler shutting down; waiting for running jobs");
        while let Some(res) = in_flight.join_next().await {
            if let Err(e) = res {
                error!("execution task failed: {e}");
            }
        }
        info!("scheduler stopped");
    }

    /// Dispatch every registered job whose `next_run` has arrived.
    ///
    /// `next_run`/`last_run` are advanced in the store before the target is
    /// spawned, so a crash mid-run never replays it on restart.
    fn dispatch_due(&self, in_flight: &mut JoinSet<()>) -> Result<usize> {
        let now = Utc::now();

        // Collect eagerly so the connection lock is released before spawning.
        let due: Vec<(String, String)> = {
            let conn = self.lock_conn()?;
            let mut stmt = conn.prepare_cached(
                "SELECT id, next_run FROM scheduled_jobs
                 WHERE next_run IS NOT NULL AND next_run <= ?1
                 ORDER BY next_run",
            )?;
            let rows: Vec<_> = stmt
                .query_map([fmt_ts(now)], |row| Ok((row.get(0)?, row.get(1)?)))?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        let mut dispatched = 0;
        for (id, scheduled_for) in due {
            // Definitions left behind by another process have no target here.
            let Some((job, trigger, max_instances, running)) = self.target(&id)? else {
                continue;
            };
            let scheduled_for = parse_ts(&scheduled_for).unwrap_or(now);
            let next = next_run_after(&trigger, scheduled_for, now, self.tz);

            if running.load(Ordering::SeqCst) >= max_instances {
                warn!(job_id = %id, max_instances, "job still running; skipping this run");
                self.lock_conn()?.execute(
                    "UPDATE scheduled_jobs SET next_run = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![next.map(fmt_ts), fmt_ts(now), id],
                )?;
                self.log.record(NewExecution {
                    job_id: &id,
                    run_time: now,
                    outcome: Outcome::MaxInstances,
                    duration_ms: 0,
                    error: None,
                })?;
                continue;
            }

            self.lock_conn()?.execute(
                "UPDATE scheduled_jobs SET next_run = ?1, last_run = ?2, updated_at = ?2
                 WHERE id = ?3",
                rusqlite::params![next.map(fmt_ts), fmt_ts(now), id],
            )?;

            running.fetch_add(1, Ordering::SeqCst);
            let guard = RunningGuard(running);
            let workers = Arc::clone(&self.workers);
            let log = self.log.clone();
            in_flight.spawn(async move {
                let _guard = guard;
                let Ok(_permit) = workers.acquire_owned().await else {
                    return;
                };
                execute(&id, job, &log).await;
            });
            dispatched += 1;
        }
        Ok(dispatched)
    }

    fn target(
        &self,
        id: &str,
    ) -> Result<Option<(Arc<dyn Job>, Trigger, usize, Arc<AtomicUsize>)>> {
        Ok(self.lock_jobs()?.get(id).map(|r| {
            (
                Arc::clone(&r.job),
                r.trigger.clone(),
                r.max_instances,
                Arc::clone(&r.running),
            )
        }))
    }
}

/// Run one target and write its execution record. Errors and panics are
/// contained here; nothing escapes to the coordination loop.
async fn execute(job_id: &str, job: Arc<dyn Job>, log: &ExecutionLog) {
    let run_time: DateTime<Utc> = Utc::now();
    let started = Instant::now();
    info!(%job_id, "running job");

    // A nested task turns a panicking target into a JoinError.
    let (outcome, err) = match tokio::spawn(async move { job.run().await }).await {
        Ok(Ok(())) => (Outcome::Success, None),
        Ok(Err(e)) => (Outcome::Error, Some(e.to_string())),
        Err(e) => (Outcome::Error, Some(format!("job panicked: {e}"))),
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    match &err {
        None => info!(%job_id, duration_ms, "job succeeded"),
        Some(e) => error!(%job_id, duration_ms, "job failed: {e}"),
    }

    if let Err(e) = log.record(NewExecution {
        job_id,
        run_time,
        outcome,
        duration_ms,
        error: err,
    }) {
        error!(%job_id, "could not record execution: {e}");
    }
}
