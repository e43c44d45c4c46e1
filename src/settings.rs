//! Schedule configuration snapshots.
//!
//! The scheduler never reads mutable shared settings mid-run: it asks the
//! provider for a fresh immutable `ScheduleConfig` at tick boundaries and
//! passes that snapshot down. `reload()` swaps the snapshot atomically.

use chrono::{NaiveTime, Weekday};
use std::env;

use crate::core::error::SettingsError;
use crate::model::SourceId;

/// When a timed trigger fires.
///
/// All time-of-day values are interpreted in UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cadence {
    /// Every hour, on the hour.
    Hourly,
    /// Once a day at the given time.
    Daily { at: NaiveTime },
    /// Once a week on the given day at the given time.
    Weekly { day: Weekday, at: NaiveTime },
    /// On each listed day at the given time.
    CustomDays { days: Vec<Weekday>, at: NaiveTime },
}

/// One timed trigger (discovery or download sweep).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerConfig {
    pub enabled: bool,
    pub cadence: Cadence,
}

/// Immutable per-tick configuration snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub discovery: TriggerConfig,
    pub download: TriggerConfig,
    /// Minimum minutes between discovery runs for one artist (unless the
    /// artist carries an override).
    pub discovery_interval_mins: i64,
    /// Cap on new videos stored per artist per discovery run.
    pub max_videos_per_artist: usize,
    /// Cap on videos claimed per download sweep.
    pub max_downloads_per_sweep: usize,
    /// Retryable failures beyond this count transition the video to FAILED.
    pub max_retries: u32,
    /// Sources in descending metadata-confidence order; decides which
    /// candidate's title/duration wins when several collapse into one.
    pub source_priority: Vec<SourceId>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            discovery: TriggerConfig {
                enabled: true,
                cadence: Cadence::Hourly,
            },
            download: TriggerConfig {
                enabled: true,
                cadence: Cadence::Hourly,
            },
            discovery_interval_mins: 24 * 60,
            max_videos_per_artist: 25,
            max_downloads_per_sweep: 10,
            max_retries: 3,
            source_priority: vec![SourceId::new("imvdb"), SourceId::new("youtube")],
        }
    }
}

/// Supplies the schedule configuration snapshot. Implemented over env vars
/// in production and over a fixed value in tests; the settings UI excluded
/// from this core would sit behind the same trait.
pub trait SettingsProvider: Send + Sync {
    fn schedule_config(&self) -> Result<ScheduleConfig, SettingsError>;
}

/// Environment-backed provider. Variables are re-read on every call so a
/// restartless `reload` picks up operator changes.
///
/// Grammar:
/// - `DISCOVERY_CADENCE` / `DOWNLOAD_CADENCE`: `hourly`, `daily@HH:MM`,
///   `weekly@mon@HH:MM`, `days@mon,thu@HH:MM`
/// - `DISCOVERY_ENABLED` / `DOWNLOAD_ENABLED`: `true`/`false`
/// - `DISCOVERY_INTERVAL_MINS`, `MAX_VIDEOS_PER_ARTIST`,
///   `MAX_DOWNLOADS_PER_SWEEP`, `MAX_RETRIES`: integers
/// - `SOURCE_PRIORITY`: comma-separated source ids
#[derive(Debug, Default)]
pub struct EnvSettings;

impl EnvSettings {
    pub fn new() -> Self {
        Self
    }
}

impl SettingsProvider for EnvSettings {
    fn schedule_config(&self) -> Result<ScheduleConfig, SettingsError> {
        let defaults = ScheduleConfig::default();

        Ok(ScheduleConfig {
            discovery: TriggerConfig {
                enabled: parse_bool("DISCOVERY_ENABLED", defaults.discovery.enabled)?,
                cadence: parse_cadence("DISCOVERY_CADENCE", defaults.discovery.cadence)?,
            },
            download: TriggerConfig {
                enabled: parse_bool("DOWNLOAD_ENABLED", defaults.download.enabled)?,
                cadence: parse_cadence("DOWNLOAD_CADENCE", defaults.download.cadence)?,
            },
            discovery_interval_mins: parse_int("DISCOVERY_INTERVAL_MINS", defaults.discovery_interval_mins)?,
            max_videos_per_artist: parse_int("MAX_VIDEOS_PER_ARTIST", defaults.max_videos_per_artist as i64)?
                as usize,
            max_downloads_per_sweep: parse_int(
                "MAX_DOWNLOADS_PER_SWEEP",
                defaults.max_downloads_per_sweep as i64,
            )? as usize,
            max_retries: parse_int("MAX_RETRIES", i64::from(defaults.max_retries))? as u32,
            source_priority: parse_priority("SOURCE_PRIORITY", defaults.source_priority),
        })
    }
}

/// Fixed-value provider for tests and embedded use.
#[derive(Debug, Clone)]
pub struct StaticSettings(pub ScheduleConfig);

impl SettingsProvider for StaticSettings {
    fn schedule_config(&self) -> Result<ScheduleConfig, SettingsError> {
        Ok(self.0.clone())
    }
}

fn parse_bool(key: &str, default: bool) -> Result<bool, SettingsError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(SettingsError::invalid(key, format!("expected bool, got '{}'", other))),
        },
    }
}

fn parse_int(key: &str, default: i64) -> Result<i64, SettingsError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| SettingsError::invalid(key, format!("expected integer, got '{}'", raw))),
    }
}

fn parse_priority(key: &str, default: Vec<SourceId>) -> Vec<SourceId> {
    match env::var(key) {
        Err(_) => default,
        Ok(raw) => {
            let ids: Vec<SourceId> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(SourceId::new)
                .collect();
            if ids.is_empty() {
                default
            } else {
                ids
            }
        }
    }
}

fn parse_cadence(key: &str, default: Cadence) -> Result<Cadence, SettingsError> {
    let raw = match env::var(key) {
        Err(_) => return Ok(default),
        Ok(raw) => raw,
    };
    parse_cadence_str(&raw).map_err(|msg| SettingsError::invalid(key, msg))
}

fn parse_cadence_str(raw: &str) -> Result<Cadence, String> {
    let parts: Vec<&str> = raw.trim().split('@').collect();
    match *parts.as_slice() {
        ["hourly"] => Ok(Cadence::Hourly),
        ["daily", at] => Ok(Cadence::Daily { at: parse_time(at)? }),
        ["weekly", day, at] => Ok(Cadence::Weekly {
            day: parse_weekday(day)?,
            at: parse_time(at)?,
        }),
        ["days", days, at] => {
            let days = days
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(parse_weekday)
                .collect::<Result<Vec<_>, _>>()?;
            if days.is_empty() {
                return Err("days list is empty".to_string());
            }
            Ok(Cadence::CustomDays {
                days,
                at: parse_time(at)?,
            })
        }
        _ => Err(format!("unknown cadence '{}'", raw)),
    }
}

fn parse_time(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|_| format!("expected HH:MM, got '{}'", raw))
}

fn parse_weekday(raw: &str) -> Result<Weekday, String> {
    match raw.trim().to_lowercase().as_str() {
        "mon" => Ok(Weekday::Mon),
        "tue" => Ok(Weekday::Tue),
        "wed" => Ok(Weekday::Wed),
        "thu" => Ok(Weekday::Thu),
        "fri" => Ok(Weekday::Fri),
        "sat" => Ok(Weekday::Sat),
        "sun" => Ok(Weekday::Sun),
        other => Err(format!("unknown weekday '{}'", other)),
    }
}
