//! Optional TOML configuration for the `schedule` CLI.
//!
//! ```toml
//! default_calendar = "primary"
//! store = "calendar.json"
//! search_strategy = "next-boundary"
//! send_notifications = false
//!
//! [working_hours]
//! start = "09:00"
//! end = "17:00"
//! timezone = "Europe/Berlin"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono_tz::Tz;
use schedule_engine::slot::{SearchStrategy, WorkingHours};
use serde::Deserialize;

/// Looked up in the current directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "schedule.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default_calendar: Option<String>,
    /// Path of the JSON calendar store.
    pub store: Option<PathBuf>,
    pub working_hours: WorkingHoursConfig,
    pub search_strategy: SearchStrategy,
    pub send_notifications: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_calendar: None,
            store: None,
            working_hours: WorkingHoursConfig::default(),
            search_strategy: SearchStrategy::default(),
            send_notifications: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkingHoursConfig {
    pub start: Option<String>,
    pub end: Option<String>,
    /// IANA zone the bounds are read in.
    pub timezone: Option<String>,
}

impl Config {
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse configuration")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Load `explicit` if given, else [`DEFAULT_CONFIG_FILE`] if present,
    /// else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            tracing::info!("Loading config from: {}", default_path.display());
            return Self::from_file(default_path);
        }
        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Working hours from command-line bounds, falling back to the file.
    ///
    /// The zone is the configured one, else `fallback_zone`.
    pub fn working_hours(
        &self,
        start: Option<&str>,
        end: Option<&str>,
        fallback_zone: Tz,
    ) -> Result<Option<WorkingHours>> {
        let zone = match self.working_hours.timezone.as_deref() {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| anyhow::anyhow!("Unknown working_hours.timezone: '{}'", name))?,
            None => fallback_zone,
        };
        let start = start.or(self.working_hours.start.as_deref());
        let end = end.or(self.working_hours.end.as_deref());
        WorkingHours::from_bounds(start, end, zone).context("Invalid working hours")
    }
}
