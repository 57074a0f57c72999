//! Monitor configuration.
//!
//! Every knob the monitor reads lives in [`MonitorConfig`]. It is threaded
//! into constructors explicitly; nothing reads process-global settings.

use std::path::Path;
use std::time::Duration;

use chrono::{FixedOffset, TimeDelta};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::domain::StateGroup;

const DAY_SECS: u64 = 24 * 60 * 60;

/// Upper bound for every interval setting.
const MAX_INTERVAL: Duration = Duration::from_secs(365 * DAY_SECS);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Monitor settings. Durations are in seconds.
///
/// A retention may be written as a number of seconds or as `"never"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    #[serde(deserialize_with = "retention_seconds")]
    pub success_retention: Option<u64>,
    #[serde(deserialize_with = "retention_seconds")]
    pub failure_retention: Option<u64>,
    #[serde(deserialize_with = "retention_seconds")]
    pub pending_retention: Option<u64>,
    /// Minimum spacing between two stored heartbeats of one worker.
    pub worker_heartbeat_write_interval: u64,
    pub use_aware_timestamps: bool,
    /// Offset used for naive timestamps, e.g. `"+03:00"`.
    pub local_offset: String,
    /// Heartbeat period the workers are configured with.
    pub heartbeat_interval: f64,
    pub heartbeat_expire_window_pct: u32,
    pub snapshot_interval: f64,
    pub conflict_retry: ConflictRetry,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            success_retention: Some(DAY_SECS),
            failure_retention: Some(3 * DAY_SECS),
            pending_retention: Some(5 * DAY_SECS),
            worker_heartbeat_write_interval: 60,
            use_aware_timestamps: true,
            local_offset: "+00:00".to_string(),
            heartbeat_interval: 2.0,
            heartbeat_expire_window_pct: 200,
            snapshot_interval: 1.0,
            conflict_retry: ConflictRetry::default(),
        }
    }
}

impl MonitorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.local_offset()?;
        interval("heartbeat_interval", self.heartbeat_interval)?;
        interval("snapshot_interval", self.snapshot_interval)?;
        if self.heartbeat_expire_window_pct == 0 {
            return Err(invalid("heartbeat_expire_window_pct", "must be greater than zero"));
        }
        interval("heartbeat_expire_window_pct", self.expected_heartbeat_secs())?;
        for (key, retention) in [
            ("success_retention", self.success_retention),
            ("failure_retention", self.failure_retention),
            ("pending_retention", self.pending_retention),
        ] {
            if retention.is_some_and(|secs| i64::try_from(secs).is_err()) {
                return Err(invalid(key, "out of range"));
            }
        }
        if self.conflict_retry.max_attempts == 0 {
            return Err(invalid("conflict_retry.max_attempts", "must be at least 1"));
        }
        let multiplier = self.conflict_retry.multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(invalid("conflict_retry.multiplier", "must be a finite number of at least 1.0"));
        }
        if self.conflict_retry.max_delay_ms < self.conflict_retry.base_delay_ms {
            return Err(invalid("conflict_retry.max_delay_ms", "must not be below base_delay_ms"));
        }
        Ok(())
    }

    /// How long records of `group` are kept. `None` keeps them forever.
    pub fn retention(&self, group: StateGroup) -> Option<TimeDelta> {
        let secs = match group {
            StateGroup::Succeeded => self.success_retention,
            StateGroup::Failed => self.failure_retention,
            StateGroup::Pending => self.pending_retention,
        }?;
        TimeDelta::try_seconds(i64::try_from(secs).ok()?)
    }

    pub fn heartbeat_write_interval(&self) -> Duration {
        Duration::from_secs(self.worker_heartbeat_write_interval)
    }

    /// Time after the last heartbeat at which a worker counts as offline.
    ///
    /// Capped at one year; [`validate`](Self::validate) rejects larger values.
    pub fn expected_heartbeat_interval(&self) -> Duration {
        capped(self.expected_heartbeat_secs())
    }

    pub fn snapshot_period(&self) -> Duration {
        capped(self.snapshot_interval)
    }

    fn expected_heartbeat_secs(&self) -> f64 {
        self.heartbeat_interval * f64::from(self.heartbeat_expire_window_pct) / 100.0
    }

    pub fn local_offset(&self) -> Result<FixedOffset, ConfigError> {
        self.local_offset
            .parse::<FixedOffset>()
            .map_err(|e| invalid("local_offset", e.to_string()))
    }
}

/// Backoff for writes that lost a lock race.
///
/// Delays grow as `base_delay_ms * multiplier^(attempt - 1)`, up to
/// `max_delay_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConflictRetry {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for ConflictRetry {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 10,
            multiplier: 2.0,
            max_delay_ms: 1_000,
        }
    }
}

impl ConflictRetry {
    /// Delay to wait after `attempts` failed tries (1-indexed).
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = Duration::from_millis(self.base_delay_ms).as_secs_f64();
        let exponent = i32::try_from(attempts.saturating_sub(1)).unwrap_or(i32::MAX);
        let max = Duration::from_millis(self.max_delay_ms);
        Duration::try_from_secs_f64(base_secs * self.multiplier.powi(exponent))
            .map_or(max, |delay| delay.min(max))
    }
}

fn invalid(key: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        message: message.into(),
    }
}

fn interval(key: &'static str, secs: f64) -> Result<(), ConfigError> {
    if !(secs.is_finite() && secs > 0.0) {
        return Err(invalid(key, "must be a positive number of seconds"));
    }
    match Duration::try_from_secs_f64(secs) {
        Ok(period) if period.is_zero() => Err(invalid(key, "interval shorter than a nanosecond")),
        Ok(period) if period <= MAX_INTERVAL => Ok(()),
        _ => Err(invalid(key, "interval longer than one year")),
    }
}

fn capped(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).map_or(MAX_INTERVAL, |period| period.min(MAX_INTERVAL))
}

fn retention_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Setting {
        Seconds(u64),
        Word(String),
    }

    match Option::<Setting>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Setting::Seconds(secs)) => Ok(Some(secs)),
        Some(Setting::Word(word)) if word.eq_ignore_ascii_case("never") => Ok(None),
        Some(Setting::Word(word)) => Err(serde::de::Error::custom(format!(
            "expected seconds or \"never\", got {word:?}"
        ))),
    }
}
