//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;

use crate::{AppError, Result};

/// Upper bound on `[scheduling] min_lead_seconds` (one day).
pub const MAX_MIN_LEAD_SECONDS: u64 = 86_400;

/// Tunables for fire-time computation and fire handling.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SchedulingConfig {
    /// Minimum distance between "now" and an accepted fire time.
    #[serde(default = "default_min_lead_seconds")]
    pub min_lead_seconds: u64,
    /// Local hour at which yearly events (birthdays) fire.
    #[serde(default = "default_yearly_fire_hour")]
    pub yearly_fire_hour: u32,
    /// Days before a birthday that the gift reminder fires.
    #[serde(default = "default_gift_lead_days")]
    pub gift_lead_days: u64,
    /// Capacity of the fire-event channel between gateway and consumer.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            min_lead_seconds: default_min_lead_seconds(),
            yearly_fire_hour: default_yearly_fire_hour(),
            gift_lead_days: default_gift_lead_days(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_min_lead_seconds() -> u64 {
    5
}

fn default_yearly_fire_hour() -> u32 {
    9
}

fn default_gift_lead_days() -> u64 {
    21
}

fn default_event_buffer() -> usize {
    64
}

fn default_timezone() -> Tz {
    Tz::UTC
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Path of the `SQLite` database file.
    pub db_path: PathBuf,
    /// IANA timezone treated as the user's local time.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
    /// Fire-time and fire-handling tunables.
    #[serde(default)]
    pub scheduling: SchedulingConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Minimum lead time as a `Duration`.
    #[must_use]
    pub fn min_lead(&self) -> Duration {
        Duration::from_secs(self.scheduling.min_lead_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(AppError::Config("db_path must not be empty".into()));
        }

        if self.scheduling.min_lead_seconds > MAX_MIN_LEAD_SECONDS {
            return Err(AppError::Config(format!(
                "min_lead_seconds must be at most {MAX_MIN_LEAD_SECONDS}"
            )));
        }

        if self.scheduling.yearly_fire_hour > 23 {
            return Err(AppError::Config(
                "yearly_fire_hour must be between 0 and 23".into(),
            ));
        }

        if self.scheduling.event_buffer == 0 {
            return Err(AppError::Config(
                "event_buffer must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
