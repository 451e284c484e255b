use std::path::Path;

use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, Result};

pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const DEFAULT_FEED_INTERVAL_SECS: u64 = 120; // every 2 minutes
pub const DEFAULT_MAX_WORKERS: usize = 10;
pub const DEFAULT_TICK_MILLIS: u64 = 1_000;
pub const DEFAULT_RETENTION_SECS: u64 = 604_800; // one week
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
/// Largest interval or age representable as a millisecond timestamp offset.
pub const MAX_DURATION_SECS: u64 = i64::MAX as u64 / 1000;

/// Top-level config (podcasts.toml + PODCASTS_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodcastsConfig {
    /// IANA timezone used to evaluate calendar triggers.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default = "default_feeds")]
    pub feeds: Vec<FeedConfig>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub http: HttpConfig,
    /// Run every feed job once right after boot, outside the scheduler.
    #[serde(default = "bool_true")]
    pub sync_on_startup: bool,
}

impl Default for PodcastsConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            database: DatabaseConfig::default(),
            feeds: default_feeds(),
            scheduler: SchedulerConfig::default(),
            retention: RetentionConfig::default(),
            http: HttpConfig::default(),
            sync_on_startup: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl DatabaseConfig {
    /// Create the directory holding the database file if it does not exist yet.
    pub fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = Path::new(&self.path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!(dir = %parent.display(), "creating database directory");
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

/// One polled feed. `id` doubles as the scheduler job id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedConfig {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_feed_interval_secs")]
    pub feed_interval_secs: u64,
    /// Size of the worker pool shared by all jobs.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// How often the coordination loop looks for due jobs.
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            feed_interval_secs: DEFAULT_FEED_INTERVAL_SECS,
            max_workers: DEFAULT_MAX_WORKERS,
            tick_millis: DEFAULT_TICK_MILLIS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Execution records older than this are purged.
    #[serde(default = "default_retention_secs")]
    pub max_age_secs: u64,
    /// Cron expression overriding the default Monday 00:00 purge.
    pub schedule: Option<String>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_secs: DEFAULT_RETENTION_SECS,
            schedule: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            user_agent: default_user_agent(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}
fn default_feed_interval_secs() -> u64 {
    DEFAULT_FEED_INTERVAL_SECS
}
fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}
fn default_tick_millis() -> u64 {
    DEFAULT_TICK_MILLIS
}
fn default_retention_secs() -> u64 {
    DEFAULT_RETENTION_SECS
}
fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}
fn default_user_agent() -> String {
    format!("podcast-ingest/{}", env!("CARGO_PKG_VERSION"))
}
fn default_feeds() -> Vec<FeedConfig> {
    vec![
        FeedConfig {
            id: "The Real Python Podcast".to_string(),
            url: "https://realpython.com/podcasts/rpp/feed".to_string(),
        },
        FeedConfig {
            id: "Talk Python Feed".to_string(),
            url: "https://talkpython.fm/episodes/rss".to_string(),
        },
    ]
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.podcasts/podcasts.db", home)
}

impl PodcastsConfig {
    /// Load config from a TOML file with PODCASTS_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `PODCASTS_SCHEDULER__FEED_INTERVAL_SECS=60`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: PodcastsConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("PODCASTS_").ignore(&["config"]).split("__"))
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail later inside the scheduler.
    pub fn validate(&self) -> Result<()> {
        self.tz()?;
        if self.scheduler.feed_interval_secs == 0 {
            return Err(CoreError::Config(
                "scheduler.feed_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.scheduler.feed_interval_secs > MAX_DURATION_SECS {
            return Err(CoreError::Config(format!(
                "scheduler.feed_interval_secs must be at most {MAX_DURATION_SECS}"
            )));
        }
        if self.scheduler.tick_millis == 0 {
            return Err(CoreError::Config(
                "scheduler.tick_millis must be greater than zero".to_string(),
            ));
        }
        if self.retention.max_age_secs > MAX_DURATION_SECS {
            return Err(CoreError::Config(format!(
                "retention.max_age_secs must be at most {MAX_DURATION_SECS}"
            )));
        }
        if self.scheduler.max_workers == 0 {
            return Err(CoreError::Config(
                "scheduler.max_workers must be greater than zero".to_string(),
            ));
        }
        let mut ids: Vec<&str> = self.feeds.iter().map(|f| f.id.as_str()).collect();
        ids.sort_unstable();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            return Err(CoreError::Config("feed ids must be unique".to_string()));
        }
        Ok(())
    }

    /// Parsed form of [`PodcastsConfig::timezone`].
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| CoreError::InvalidTimezone(self.timezone.clone()))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.podcasts/podcasts.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_the_two_podcasts() {
        let config = PodcastsConfig::default();
        assert_eq!(config.feeds.len(), 2);
        assert_eq!(config.scheduler.feed_interval_secs, 120);
        assert_eq!(config.retention.max_age_secs, 604_800);
        assert!(config.sync_on_startup);
        assert_eq!(config.tz().unwrap(), chrono_tz::UTC);
    }

    #[test]
    fn toml_and_env_overrides() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "podcasts.toml",
                r#"
                timezone = "Europe/Berlin"

                [[feeds]]
                id = "Talk Python Feed"
                url = "https://talkpython.fm/episodes/rss"

                [scheduler]
                feed_interval_secs = 300
                "#,
            )?;
            jail.set_env("PODCASTS_RETENTION__MAX_AGE_SECS", "3600");

            let config = PodcastsConfig::load(Some("podcasts.toml")).expect("load");
            assert_eq!(config.tz().unwrap(), chrono_tz::Europe::Berlin);
            assert_eq!(config.feeds.len(), 1);
            assert_eq!(config.scheduler.feed_interval_secs, 300);
            assert_eq!(config.scheduler.max_workers, DEFAULT_MAX_WORKERS);
            assert_eq!(config.retention.max_age_secs, 3600);
            Ok(())
        });
    }

    #[test]
    fn invalid_timezone_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("podcasts.toml", r#"timezone = "Mars/Olympus""#)?;
            let err = PodcastsConfig::load(Some("podcasts.toml")).unwrap_err();
            assert!(matches!(err, CoreError::InvalidTimezone(tz) if tz == "Mars/Olympus"));
            Ok(())
        });
    }

    #[test]
    fn duplicate_feed_ids_are_rejected() {
        let mut config = PodcastsConfig::default();
        config.feeds.push(config.feeds[0].clone());
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn zero_tick_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("PODCASTS_SCHEDULER__TICK_MILLIS", "0");
            let err = PodcastsConfig::load(Some("missing.toml")).unwrap_err();
            assert!(matches!(err, CoreError::Config(msg) if msg.contains("tick_millis")));
            Ok(())
        });
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let mut config = PodcastsConfig::default();
        config.scheduler.feed_interval_secs = 10_u64.pow(16);
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));

        let mut config = PodcastsConfig::default();
        config.retention.max_age_secs = u64::MAX;
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));

        let mut config = PodcastsConfig::default();
        config.scheduler.feed_interval_secs = MAX_DURATION_SECS;
        assert!(config.validate().is_ok());
    }
}
