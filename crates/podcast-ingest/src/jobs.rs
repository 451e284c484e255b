use std::sync::Arc;
use std::time::Duration;

use podcast_core::config::{PodcastsConfig, RetentionConfig};
use podcast_episodes::{EpisodeSynchronizer, FeedSyncJob};
use podcast_feeds::FeedFetcher;
use podcast_scheduler::{JobSpec, RetentionJob, Scheduler, SchedulerError, Trigger};
use tokio::task::JoinSet;
use tracing::{error, info};

pub const RETENTION_JOB_ID: &str = "delete_old_job_executions";

/// Monday 00:00 unless the config names a cron expression.
pub fn retention_trigger(cfg: &RetentionConfig) -> Trigger {
    match &cfg.schedule {
        Some(expression) => Trigger::Cron {
            expression: expression.clone(),
        },
        None => Trigger::Weekly {
            day: 0,
            hour: 0,
            minute: 0,
        },
    }
}

/// Register one interval job per configured feed plus the weekly retention
/// job. Returns the feed jobs so the caller can run them once right away.
pub fn register_all(
    scheduler: &Scheduler,
    config: &PodcastsConfig,
    fetcher: Arc<dyn FeedFetcher>,
    synchronizer: &EpisodeSynchronizer,
) -> Result<Vec<Arc<FeedSyncJob>>, SchedulerError> {
    let every = Trigger::Interval {
        every_secs: config.scheduler.feed_interval_secs,
    };

    let mut feed_jobs = Vec::with_capacity(config.feeds.len());
    for feed in &config.feeds {
        let job = Arc::new(FeedSyncJob::new(
            feed.id.clone(),
            feed.url.clone(),
            Arc::clone(&fetcher),
            synchronizer.clone(),
        ));
        scheduler.register(JobSpec::new(feed.id.clone(), every.clone()), job.clone())?;
        feed_jobs.push(job);
    }

    let retention = RetentionJob::with_max_age(
        scheduler.execution_log(),
        Duration::from_secs(config.retention.max_age_secs),
    );
    scheduler.register(
        JobSpec::new(RETENTION_JOB_ID, retention_trigger(&config.retention)),
        Arc::new(retention),
    )?;

    info!(feeds = feed_jobs.len(), "jobs registered");
    Ok(feed_jobs)
}

/// Run every feed job once, outside the worker pool. Results are logged only;
/// no execution record is written. The caller awaits the returned set before
/// exiting so an in-progress fetch is not dropped silently.
pub fn spawn_startup_sync(feed_jobs: Vec<Arc<FeedSyncJob>>) -> JoinSet<()> {
    let mut startup = JoinSet::new();
    for job in feed_jobs {
        startup.spawn(async move {
            match job.sync_once().await {
                Ok(report) => info!(feed = %job.id(), %report, "startup sync done"),
                Err(e) => error!(feed = %job.id(), url = %job.url(), "startup sync failed: {e}"),
            }
        });
    }
    startup
}
