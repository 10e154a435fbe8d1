//! # Core Configuration Module
//!
//! Provides configuration management for the album sync core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the settings the core needs at start-up. It enforces
//! fail-fast validation so that a misconfigured data root or scheduler is
//! reported before any job is created.
//!
//! ## Required Settings
//!
//! - `data_root` - Directory whose folder tree is mirrored as albums
//! - `database_path` - SQLite catalog file
//!
//! ## Optional Settings (with defaults)
//!
//! - `media_extensions` - File extensions treated as media (adapter default list)
//! - `scheduler` - Tick interval, concurrency ceiling and retention ([`SchedulerConfig`])
//! - `event_buffer_size` - Capacity of the broadcast event bus (100)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, SchedulerConfig};
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .data_root("/srv/photos")
//!     .database_path("/var/lib/album-sync/catalog.db")
//!     .scheduler(SchedulerConfig::default().with_max_concurrent_jobs(4))
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ### From the environment
//!
//! ```ignore
//! let config = CoreConfig::builder_from_env()?.build()?;
//! ```
//!
//! `SYNC_DATA_ROOT`, `SYNC_DATABASE_PATH`, `SYNC_MAX_CONCURRENT_JOBS`,
//! `SYNC_TICK_INTERVAL_MS` and `SYNC_RETENTION_SECS` are read; values that do
//! not parse are reported as [`Error::InvalidValue`].

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DATA_ROOT: &str = "SYNC_DATA_ROOT";
pub const ENV_DATABASE_PATH: &str = "SYNC_DATABASE_PATH";
pub const ENV_MAX_CONCURRENT_JOBS: &str = "SYNC_MAX_CONCURRENT_JOBS";
pub const ENV_TICK_INTERVAL_MS: &str = "SYNC_TICK_INTERVAL_MS";
pub const ENV_RETENTION_SECS: &str = "SYNC_RETENTION_SECS";

const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Scheduler tuning.
///
/// Defaults: tick every 2 seconds, at most 2 jobs running at once, finished
/// jobs kept for 10 minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Period of the admission and eviction pass
    pub tick_interval: Duration,

    /// Ceiling on jobs that are Running, Paused or Stopping
    pub max_concurrent_jobs: usize,

    /// How long a finished job stays queryable after completion
    pub retention: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
            max_concurrent_jobs: 2,
            retention: Duration::from_secs(10 * 60),
        }
    }
}

impl SchedulerConfig {
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Rejects zero values, which would stall the ticker or admit nothing.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(Error::Config(
                "Scheduler tick interval must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_jobs == 0 {
            return Err(Error::Config(
                "Scheduler must allow at least 1 concurrent job".to_string(),
            ));
        }

        if self.retention.is_zero() {
            return Err(Error::Config(
                "Scheduler retention must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Core configuration for the album sync core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Directory whose folder tree is mirrored into the catalog
    pub data_root: PathBuf,

    /// Path to the SQLite catalog database
    pub database_path: PathBuf,

    /// Media file extensions; `None` keeps the discoverer's defaults
    pub media_extensions: Option<Vec<String>>,

    pub scheduler: SchedulerConfig,

    /// Capacity of the event bus ring buffer
    pub event_buffer_size: usize,
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Creates a builder seeded from `SYNC_*` environment variables.
    pub fn builder_from_env() -> Result<CoreConfigBuilder> {
        CoreConfigBuilder::from_env()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Data root and database path are not empty
    /// - Media extension list, when given, is not empty
    /// - Scheduler settings are non-zero
    /// - Event buffer can hold at least one event
    pub fn validate(&self) -> Result<()> {
        if self.data_root.as_os_str().is_empty() {
            return Err(Error::Config("Data root cannot be empty".to_string()));
        }

        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if let Some(extensions) = &self.media_extensions {
            if extensions.iter().all(|ext| ext.trim().is_empty()) {
                return Err(Error::Config(
                    "Media extension list cannot be empty".to_string(),
                ));
            }
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        self.scheduler.validate()
    }
}

/// Builder for constructing a [`CoreConfig`] with validation.
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    data_root: Option<PathBuf>,
    database_path: Option<PathBuf>,
    media_extensions: Option<Vec<String>>,
    scheduler: Option<SchedulerConfig>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Seeds a builder from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Seeds a builder from an arbitrary key lookup.
    ///
    /// Missing keys leave the corresponding setting unset; present keys that
    /// fail to parse produce [`Error::InvalidValue`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::default();

        if let Some(root) = lookup(ENV_DATA_ROOT) {
            builder = builder.data_root(root);
        }

        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            builder = builder.database_path(path);
        }

        let mut scheduler = SchedulerConfig::default();
        let mut scheduler_touched = false;

        if let Some(raw) = lookup(ENV_MAX_CONCURRENT_JOBS) {
            scheduler.max_concurrent_jobs = parse_number(ENV_MAX_CONCURRENT_JOBS, &raw)?;
            scheduler_touched = true;
        }

        if let Some(raw) = lookup(ENV_TICK_INTERVAL_MS) {
            scheduler.tick_interval =
                Duration::from_millis(parse_number(ENV_TICK_INTERVAL_MS, &raw)?);
            scheduler_touched = true;
        }

        if let Some(raw) = lookup(ENV_RETENTION_SECS) {
            scheduler.retention = Duration::from_secs(parse_number(ENV_RETENTION_SECS, &raw)?);
            scheduler_touched = true;
        }

        if scheduler_touched {
            builder = builder.scheduler(scheduler);
        }

        Ok(builder)
    }

    /// Sets the data root directory.
    pub fn data_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_root = Some(path.into());
        self
    }

    /// Sets the catalog database path.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Replaces the recognised media extensions.
    ///
    /// Extensions are matched case-insensitively; a leading dot is ignored.
    pub fn media_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.media_extensions = Some(
            extensions
                .into_iter()
                .map(|ext| ext.into().trim_start_matches('.').to_lowercase())
                .collect(),
        );
        self
    }

    pub fn scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Sets the event bus capacity.
    ///
    /// Default: 100 events
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required path is missing or a value is
    /// out of range.
    pub fn build(self) -> Result<CoreConfig> {
        let data_root = self.data_root.ok_or_else(|| {
            Error::Config("Data root is required. Use .data_root() to set it.".to_string())
        })?;

        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let config = CoreConfig {
            data_root,
            database_path,
            media_extensions: self.media_extensions,
            scheduler: self.scheduler.unwrap_or_default(),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| Error::InvalidValue {
        key: key.to_string(),
        message: format!("expected a non-negative integer, got '{}'", raw),
    })
}
