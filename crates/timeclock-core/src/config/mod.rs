//! Engine configuration.
//!
//! Loaded from a JSON file (missing file means defaults), then overridden by
//! `TIMECLOCK_*` environment variables and validated before use.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::Session;
use crate::util::{has_http_scheme, non_blank};

pub const ENV_REMOTE_URL: &str = "TIMECLOCK_REMOTE_URL";
pub const ENV_API_TOKEN: &str = "TIMECLOCK_API_TOKEN";

/// Wall-clock hour and minute, written as `HH:MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u32,
    minute: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(Error::Config(format!(
                "invalid time of day {hour:02}:{minute:02}"
            )));
        }
        Ok(Self { hour, minute })
    }

    pub const fn hour(self) -> u32 {
        self.hour
    }

    pub const fn minute(self) -> u32 {
        self.minute
    }

    pub fn as_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or_default()
    }

    /// True when `time` falls anywhere within this hour and minute
    pub fn matches(self, time: NaiveTime) -> bool {
        time.hour() == self.hour && time.minute() == self.minute
    }

    const fn at(hour: u32, minute: u32) -> Self {
        Self { hour, minute }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (hour, minute) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| Error::Config(format!("expected HH:MM, got '{s}'")))?;
        let hour = hour
            .parse()
            .map_err(|_| Error::Config(format!("invalid hour in '{s}'")))?;
        let minute = minute
            .parse()
            .map_err(|_| Error::Config(format!("invalid minute in '{s}'")))?;
        Self::new(hour, minute)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// Scheduled start of each regular session; overtime has none
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSchedule {
    pub morning_start: TimeOfDay,
    pub afternoon_start: TimeOfDay,
    pub evening_start: TimeOfDay,
}

impl WorkSchedule {
    pub fn scheduled_start(&self, session: Session) -> Option<NaiveTime> {
        match session {
            Session::Morning => Some(self.morning_start.as_naive_time()),
            Session::Afternoon => Some(self.afternoon_start.as_naive_time()),
            Session::Evening => Some(self.evening_start.as_naive_time()),
            Session::Overtime => None,
        }
    }
}

impl Default for WorkSchedule {
    fn default() -> Self {
        Self {
            morning_start: TimeOfDay::at(8, 0),
            afternoon_start: TimeOfDay::at(13, 0),
            evening_start: TimeOfDay::at(18, 0),
        }
    }
}

/// Remote server connection settings
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl RemoteConfig {
    pub const fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

const fn default_timeout_secs() -> u64 {
    30
}

/// Tunables for validation, summaries, scheduling and reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub schedule: WorkSchedule,
    pub grace_period_minutes: u32,
    pub apply_eight_hour_rule: bool,
    pub regular_hours_cap: f64,
    pub checkpoints: Vec<TimeOfDay>,
    pub settle_delay_ms: u64,
    pub duplicate_tolerance_minutes: u32,
    pub edit_lookback_days: u32,
    pub remote: RemoteConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schedule: WorkSchedule::default(),
            grace_period_minutes: 5,
            apply_eight_hour_rule: true,
            regular_hours_cap: 8.0,
            checkpoints: vec![
                TimeOfDay::at(8, 30),
                TimeOfDay::at(12, 30),
                TimeOfDay::at(13, 30),
                TimeOfDay::at(17, 30),
            ],
            settle_delay_ms: 1500,
            duplicate_tolerance_minutes: 5,
            edit_lookback_days: 7,
            remote: RemoteConfig {
                timeout_secs: default_timeout_secs(),
                ..RemoteConfig::default()
            },
        }
    }
}

impl EngineConfig {
    /// Load from `path`, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_path(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse the JSON file at `path`; a missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            Error::Config(format!("failed to parse {}: {error}", path.display()))
        })?;
        config.normalize();
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut normalized = self.clone();
        normalized.normalize();
        std::fs::write(path, serde_json::to_string_pretty(&normalized)?)?;
        Ok(())
    }

    /// Apply `TIMECLOCK_*` overrides using the given variable lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = non_blank(lookup(ENV_REMOTE_URL)) {
            self.remote.base_url = Some(url);
        }
        if let Some(token) = non_blank(lookup(ENV_API_TOKEN)) {
            self.remote.api_token = Some(token);
        }
        self.normalize();
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.remote.base_url {
            if !has_http_scheme(url) {
                return Err(Error::Config(
                    "remote.base_url must include http:// or https://".to_string(),
                ));
            }
        }
        if !self.regular_hours_cap.is_finite() || self.regular_hours_cap <= 0.0 {
            return Err(Error::Config(
                "regular_hours_cap must be a positive number".to_string(),
            ));
        }
        if self.duplicate_tolerance_minutes == 0 {
            return Err(Error::Config(
                "duplicate_tolerance_minutes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn duplicate_tolerance(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.duplicate_tolerance_minutes))
    }

    fn normalize(&mut self) {
        self.checkpoints.sort_unstable();
        self.checkpoints.dedup();
        self.remote.base_url = non_blank(self.remote.base_url.clone())
            .map(|url| url.trim_end_matches('/').to_string());
        self.remote.api_token = non_blank(self.remote.api_token.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn time_of_day_parses_and_formats() {
        let time: TimeOfDay = "8:30".parse().unwrap();
        assert_eq!(time.to_string(), "08:30");
        assert!("24:00".parse::<TimeOfDay>().is_err());
        assert!("0830".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn time_of_day_matches_within_its_minute() {
        let checkpoint = TimeOfDay::new(12, 30).unwrap();
        assert!(checkpoint.matches(NaiveTime::from_hms_opt(12, 30, 0).unwrap()));
        assert!(checkpoint.matches(NaiveTime::from_hms_opt(12, 30, 59).unwrap()));
        assert!(!checkpoint.matches(NaiveTime::from_hms_opt(12, 31, 0).unwrap()));
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.grace_period_minutes, 5);
        assert_eq!(config.duplicate_tolerance_minutes, 5);
        assert_eq!(
            config
                .checkpoints
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            vec!["08:30", "12:30", "13:30", "17:30"]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempdir().unwrap();
        let config = EngineConfig::load_from_path(&tmp.path().join("absent.json")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn roundtrip_normalizes_remote_and_checkpoints() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.json");

        let mut config = EngineConfig::default();
        config.checkpoints = vec![
            TimeOfDay::new(17, 30).unwrap(),
            TimeOfDay::new(8, 30).unwrap(),
            TimeOfDay::new(8, 30).unwrap(),
        ];
        config.remote.base_url = Some(" https://hr.example.com/ ".to_string());
        config.save_to_path(&path).unwrap();

        let loaded = EngineConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.checkpoints.len(), 2);
        assert_eq!(loaded.checkpoints[0].to_string(), "08:30");
        assert_eq!(
            loaded.remote.base_url.as_deref(),
            Some("https://hr.example.com")
        );
    }

    #[test]
    fn partial_file_fills_defaults() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"grace_period_minutes": 10}"#).unwrap();

        let loaded = EngineConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.grace_period_minutes, 10);
        assert!(loaded.apply_eight_hour_rule);
    }

    #[test]
    fn env_overrides_remote_settings() {
        let mut config = EngineConfig::default();
        config.apply_overrides(|key| match key {
            ENV_REMOTE_URL => Some("https://hr.example.com/".to_string()),
            ENV_API_TOKEN => Some("secret".to_string()),
            _ => None,
        });
        assert_eq!(
            config.remote.base_url.as_deref(),
            Some("https://hr.example.com")
        );
        assert!(!format!("{:?}", config.remote).contains("secret"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.remote.base_url = Some("hr.example.com".to_string());
        assert!(config.validate().is_err());

        let config = EngineConfig {
            duplicate_tolerance_minutes: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
