//! Typed configuration for the scheduling daemon
//!
//! Loaded from a TOML file; a missing file is replaced by a written-out
//! default so a fresh install starts with something editable. Duration
//! fields accept human-readable strings (`"5s"`, `"1h30m"`) or plain
//! second counts.
//!
//! The `[timing]` table provides the *defaults* for interval bounds, grace
//! period, and timezone; a deployment's settings provider may override them
//! per installation at resolution time.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;

use crate::utils::time::validate_timezone;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Default timing bounds and timezone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// IANA zone name used for window membership and DST resolution
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// Smallest accepted capture interval
    #[serde(default = "default_min_capture_interval", with = "duration_serde::duration")]
    pub min_capture_interval: Duration,

    /// Largest accepted capture interval
    #[serde(default = "default_max_capture_interval", with = "duration_serde::duration")]
    pub max_capture_interval: Duration,

    /// Early-fire tolerance subtracted from the interval in due checks
    #[serde(default = "default_grace_period", with = "duration_serde::duration")]
    pub default_grace_period: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            min_capture_interval: default_min_capture_interval(),
            max_capture_interval: default_max_capture_interval(),
            default_grace_period: default_grace_period(),
        }
    }
}

/// Trigger engine behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Shortest sleep between dispatch passes
    #[serde(default = "default_tick_bounds_min", with = "duration_serde::duration")]
    pub tick_bounds_min: Duration,

    /// Longest sleep between dispatch passes (safety wake-up)
    #[serde(default = "default_tick_bounds_max", with = "duration_serde::duration")]
    pub tick_bounds_max: Duration,

    /// How often the reconciliation pass runs
    #[serde(default = "default_sync_interval", with = "duration_serde::duration")]
    pub sync_interval: Duration,

    /// Whether a timelapse whose next capture is already in the past gets
    /// one immediate evaluation during reconciliation (never a backlog burst)
    #[serde(default = "default_run_missed_immediately")]
    pub run_missed_immediately: bool,

    /// First-fire stagger as a percentage of the capture interval
    #[serde(default = "default_startup_jitter_percent")]
    pub startup_jitter_percent: u8,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_bounds_min: default_tick_bounds_min(),
            tick_bounds_max: default_tick_bounds_max(),
            sync_interval: default_sync_interval(),
            run_missed_immediately: default_run_missed_immediately(),
            startup_jitter_percent: default_startup_jitter_percent(),
        }
    }
}

/// Job queue limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum pending jobs before enqueue is refused
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_pending: default_max_pending(),
        }
    }
}

impl Config {
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            Ok(default_config)
        }
    }

    /// Reject configurations that would misbehave at runtime
    pub fn validate(&self) -> Result<()> {
        validate_timezone(&self.timing.default_timezone)
            .map_err(|e| anyhow::anyhow!("timing.default_timezone: {e}"))?;

        if self.timing.min_capture_interval > self.timing.max_capture_interval {
            anyhow::bail!(
                "timing.min_capture_interval ({:?}) exceeds timing.max_capture_interval ({:?})",
                self.timing.min_capture_interval,
                self.timing.max_capture_interval
            );
        }
        if self.scheduler.tick_bounds_min > self.scheduler.tick_bounds_max {
            anyhow::bail!(
                "scheduler.tick_bounds_min ({:?}) exceeds scheduler.tick_bounds_max ({:?})",
                self.scheduler.tick_bounds_min,
                self.scheduler.tick_bounds_max
            );
        }
        if self.scheduler.startup_jitter_percent > 100 {
            anyhow::bail!(
                "scheduler.startup_jitter_percent must be 0-100, got {}",
                self.scheduler.startup_jitter_percent
            );
        }
        if self.queue.max_pending == 0 {
            anyhow::bail!("queue.max_pending must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_parse_human_readable_durations() {
        let config: Config = toml::from_str(
            r#"
            [timing]
            default_timezone = "Europe/Berlin"
            min_capture_interval = "10s"
            max_capture_interval = "12h"
            default_grace_period = 3

            [scheduler]
            sync_interval = "1m"
            run_missed_immediately = false
            "#,
        )
        .unwrap();

        assert_eq!(config.timing.default_timezone, "Europe/Berlin");
        assert_eq!(config.timing.min_capture_interval, Duration::from_secs(10));
        assert_eq!(
            config.timing.max_capture_interval,
            Duration::from_secs(12 * 3600)
        );
        assert_eq!(config.timing.default_grace_period, Duration::from_secs(3));
        assert_eq!(config.scheduler.sync_interval, Duration::from_secs(60));
        assert!(!config.scheduler.run_missed_immediately);
        // Untouched sections keep their defaults
        assert_eq!(config.queue.max_pending, 1000);
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        let mut config = Config::default();
        config.timing.default_timezone = "Not/AZone".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.timing.min_capture_interval = Duration::from_secs(100);
        config.timing.max_capture_interval = Duration::from_secs(10);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scheduler.startup_jitter_percent = 150;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_writes_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path_str = path.to_str().unwrap();

        let created = Config::load_from_file(path_str).unwrap();
        assert!(path.exists());
        created.validate().unwrap();

        // The written file parses back to the same values
        let reloaded = Config::load_from_file(path_str).unwrap();
        assert_eq!(
            reloaded.timing.min_capture_interval,
            created.timing.min_capture_interval
        );
        assert_eq!(reloaded.queue.max_pending, created.queue.max_pending);
        assert_eq!(
            reloaded.scheduler.sync_interval,
            created.scheduler.sync_interval
        );
    }
}
