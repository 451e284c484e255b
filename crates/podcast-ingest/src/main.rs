use std::sync::Arc;
use std::time::Duration;

use podcast_core::{CoreError, PodcastsConfig};
use podcast_episodes::{EpisodeStore, EpisodeSynchronizer, SqliteEpisodeStore};
use podcast_feeds::HttpFeedFetcher;
use podcast_scheduler::Scheduler;
use tokio::task::JoinSet;
use tracing::info;

mod jobs;
mod shutdown;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "podcast_ingest=info,podcast_scheduler=info,podcast_episodes=info,podcast_feeds=info"
                    .into()
            }),
        )
        .init();

    // load config: PODCASTS_CONFIG env > ~/.podcasts/podcasts.toml
    let config_path = std::env::var("PODCASTS_CONFIG").ok();
    let config = match PodcastsConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        // A wrong timezone would silently move the retention run.
        Err(e @ CoreError::InvalidTimezone(_)) => return Err(e.into()),
        Err(e) => {
            tracing::warn!("Config load failed ({}), using defaults", e);
            PodcastsConfig::default()
        }
    };
    let tz = config.tz()?;

    // single SQLite file; each subsystem gets its own connection
    config.database.ensure_parent_dir()?;
    let db_path = &config.database.path;
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL;")?;
    podcast_episodes::db::init_db(&db)?;
    podcast_scheduler::db::init_db(&db)?;
    drop(db);
    info!("database migrations complete");

    let store = Arc::new(SqliteEpisodeStore::new(rusqlite::Connection::open(db_path)?)?);
    info!(episodes = store.count()?, "episode store ready");
    let synchronizer = EpisodeSynchronizer::new(store);

    let fetcher = Arc::new(HttpFeedFetcher::new(
        Duration::from_secs(config.http.timeout_secs),
        &config.http.user_agent,
    )?);

    let scheduler = Scheduler::new(rusqlite::Connection::open(db_path)?, tz)?
        .with_max_workers(config.scheduler.max_workers)
        .with_tick(Duration::from_millis(config.scheduler.tick_millis));

    let feed_jobs = jobs::register_all(&scheduler, &config, fetcher, &synchronizer)?;

    let token = shutdown::install_shutdown_handler()?;

    let mut startup = if config.sync_on_startup {
        jobs::spawn_startup_sync(feed_jobs)
    } else {
        JoinSet::new()
    };

    info!(timezone = %tz, "podcast ingest running; press Ctrl-C to stop");
    scheduler.run(token).await;

    if !startup.is_empty() {
        info!(pending = startup.len(), "waiting for startup sync to finish");
    }
    while let Some(res) = startup.join_next().await {
        if let Err(e) = res {
            tracing::error!("startup sync task failed: {e}");
        }
    }

    info!("podcast ingest stopped");
    Ok(())
}
