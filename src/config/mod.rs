use crate::{app::LogLevel, display::DisplayMode, Error, Result};
use chrono::NaiveTime;
use std::fmt;
use std::path::{Path, PathBuf};

pub mod loader;

pub const DEFAULT_LOCALE: &str = "en";
pub const DEFAULT_MIN: i32 = 70;
pub const DEFAULT_MAX: i32 = 180;
pub const DEFAULT_EMERGENCY_MIN: i32 = 55;
pub const DEFAULT_EMERGENCY_MAX: i32 = 250;
pub const DEFAULT_TIMEZONE: &str = "GMT+0:00";
pub const DEFAULT_BEEPER_START: &str = "06:00:00";
pub const DEFAULT_BEEPER_END: &str = "22:00:00";
pub const DEFAULT_STALE_AFTER_MINUTES: i64 = 20;
pub const DEFAULT_STALE_EMERGENCY_AFTER_MINUTES: i64 = 30;
pub const DEFAULT_BRIGHTNESS: u8 = 32;
pub const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 30_000;
pub const MAX_BACKEND_TIMEOUT_MS: u64 = 60_000;
pub const MIN_BACKEND_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;
pub const MIN_RETRY_DELAY_MS: u64 = 100;
pub const DEFAULT_HISTORY_CAP: usize = crate::history::DEFAULT_HISTORY_CAP;
const CONFIG_DIR_NAME: &str = ".glucoframe";
const CONFIG_FILE_NAME: &str = "config.toml";
const DATA_DIR_NAME: &str = "data";
const BEEPER_TIME_FORMAT: &str = "%H:%M:%S";

/// User-supplied settings loaded from the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_endpoint: String,
    pub api_token: String,
    pub locale: String,
    pub min: i32,
    pub max: i32,
    pub emergency_min: i32,
    pub emergency_max: i32,
    pub timezone: String,
    /// 1 = enabled, 0 = disabled; anything else is corrected to 1.
    pub beeper: i64,
    pub beeper_start_time: String,
    pub beeper_end_time: String,
    pub stale_after_minutes: i64,
    pub stale_emergency_after_minutes: i64,
    pub brightness: u8,
    pub configured: bool,
    pub display_mode: DisplayMode,
    pub data_dir: Option<String>,
    pub history_cap: usize,
    pub backend_timeout_ms: u64,
    pub retry_delay_ms: u64,
    pub has_env_sensor: bool,
    pub has_rgb_indicator: bool,
    pub supports_rotation: bool,
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_endpoint: String::new(),
            api_token: String::new(),
            locale: DEFAULT_LOCALE.to_string(),
            min: DEFAULT_MIN,
            max: DEFAULT_MAX,
            emergency_min: DEFAULT_EMERGENCY_MIN,
            emergency_max: DEFAULT_EMERGENCY_MAX,
            timezone: DEFAULT_TIMEZONE.to_string(),
            beeper: 1,
            beeper_start_time: DEFAULT_BEEPER_START.to_string(),
            beeper_end_time: DEFAULT_BEEPER_END.to_string(),
            stale_after_minutes: DEFAULT_STALE_AFTER_MINUTES,
            stale_emergency_after_minutes: DEFAULT_STALE_EMERGENCY_AFTER_MINUTES,
            brightness: DEFAULT_BRIGHTNESS,
            configured: false,
            display_mode: DisplayMode::FullElapsed,
            data_dir: None,
            history_cap: DEFAULT_HISTORY_CAP,
            backend_timeout_ms: DEFAULT_BACKEND_TIMEOUT_MS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            has_env_sensor: false,
            has_rgb_indicator: true,
            supports_rotation: true,
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    pub fn load_or_default() -> Result<Self> {
        loader::load_or_default()
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        loader::load_from_path(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        loader::save_to_path(self, path)
    }

    pub fn default_path() -> Result<PathBuf> {
        loader::config_path()
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            min: self.min,
            max: self.max,
            emergency_min: self.emergency_min,
            emergency_max: self.emergency_max,
            stale_after_minutes: self.stale_after_minutes,
            stale_emergency_after_minutes: self.stale_emergency_after_minutes,
        }
    }

    /// Data directory, defaulting to `~/.glucoframe/data`.
    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => Ok(loader::config_dir()?.join(DATA_DIR_NAME)),
        }
    }
}

/// Hard validation: values that cannot be clamped into something usable.
pub fn validate(cfg: &Config) -> Result<()> {
    if cfg.history_cap == 0 || cfg.history_cap > crate::history::MAX_HISTORY_CAP {
        return Err(Error::InvalidArgs(format!(
            "history_cap must be between 1 and {}",
            crate::history::MAX_HISTORY_CAP
        )));
    }
    if !(MIN_BACKEND_TIMEOUT_MS..=MAX_BACKEND_TIMEOUT_MS).contains(&cfg.backend_timeout_ms) {
        return Err(Error::InvalidArgs(format!(
            "backend_timeout_ms must be between {MIN_BACKEND_TIMEOUT_MS} and {MAX_BACKEND_TIMEOUT_MS}"
        )));
    }
    if cfg.retry_delay_ms < MIN_RETRY_DELAY_MS {
        return Err(Error::InvalidArgs(format!(
            "retry_delay_ms must be >= {MIN_RETRY_DELAY_MS}"
        )));
    }
    parse_beeper_time(&cfg.beeper_start_time)
        .map_err(|e| Error::InvalidArgs(format!("beeper_start_time: {e}")))?;
    parse_beeper_time(&cfg.beeper_end_time)
        .map_err(|e| Error::InvalidArgs(format!("beeper_end_time: {e}")))?;
    Ok(())
}

pub fn parse_beeper_time(raw: &str) -> std::result::Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw.trim(), BEEPER_TIME_FORMAT)
        .map_err(|_| format!("expected HH:MM:SS, got '{raw}'"))
}

/// A value that was silently out of range and got replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigCorrection {
    pub field: &'static str,
    pub original: String,
    pub corrected: String,
}

impl ConfigCorrection {
    fn new(field: &'static str, original: impl ToString, corrected: impl ToString) -> Self {
        Self {
            field,
            original: original.to_string(),
            corrected: corrected.to_string(),
        }
    }
}

impl fmt::Display for ConfigCorrection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} corrected from {} to {}",
            self.field, self.original, self.corrected
        )
    }
}

/// Glucose and staleness limits used by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub min: i32,
    pub max: i32,
    pub emergency_min: i32,
    pub emergency_max: i32,
    pub stale_after_minutes: i64,
    pub stale_emergency_after_minutes: i64,
}

impl Thresholds {
    /// Clamp into the supported envelope, reporting every field that moved.
    pub fn normalize(self) -> (Thresholds, Vec<ConfigCorrection>) {
        let mut out = self;
        let mut corrections = Vec::new();

        if out.min < 30 {
            corrections.push(ConfigCorrection::new("min", out.min, 30));
            out.min = 30;
        }
        if out.max < 100 {
            corrections.push(ConfigCorrection::new("max", out.max, 100));
            out.max = 100;
        }
        if out.emergency_min < 30 || out.emergency_min >= out.min {
            let corrected = out.min.saturating_sub(10);
            corrections.push(ConfigCorrection::new("emergency_min", out.emergency_min, corrected));
            out.emergency_min = corrected;
        }
        if out.emergency_max < 100 || out.emergency_max <= out.max {
            let corrected = out.max.saturating_add(10);
            corrections.push(ConfigCorrection::new("emergency_max", out.emergency_max, corrected));
            out.emergency_max = corrected;
        }
        if out.stale_after_minutes < 10 {
            corrections.push(ConfigCorrection::new(
                "stale_after_minutes",
                out.stale_after_minutes,
                10,
            ));
            out.stale_after_minutes = 10;
        }
        if out.stale_emergency_after_minutes < 15 {
            corrections.push(ConfigCorrection::new(
                "stale_emergency_after_minutes",
                out.stale_emergency_after_minutes,
                15,
            ));
            out.stale_emergency_after_minutes = 15;
        }
        (out, corrections)
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Config::default().thresholds()
    }
}

/// Normalise the beeper flag: only 0 disables it.
pub fn normalize_beeper(raw: i64) -> (bool, Option<ConfigCorrection>) {
    match raw {
        0 => (false, None),
        1 => (true, None),
        other => (true, Some(ConfigCorrection::new("beeper", other, 1))),
    }
}

/// Parse the zone, falling back to UTC when the format is wrong.
pub fn normalize_timezone(raw: &str) -> (crate::clock::Timezone, Option<ConfigCorrection>) {
    match crate::clock::Timezone::parse(raw) {
        Some(tz) => (tz, None),
        None => (
            crate::clock::Timezone::utc(),
            Some(ConfigCorrection::new("timezone", raw, DEFAULT_TIMEZONE)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_need_no_correction() {
        let (normalized, corrections) = Config::default().thresholds().normalize();
        assert!(corrections.is_empty(), "{corrections:?}");
        assert_eq!(normalized, Config::default().thresholds());
    }

    #[test]
    fn clamps_low_limits_and_reports_them() {
        let raw = Thresholds {
            min: 20,
            max: 90,
            emergency_min: 25,
            emergency_max: 95,
            stale_after_minutes: 3,
            stale_emergency_after_minutes: 5,
        };
        let (normalized, corrections) = raw.normalize();
        assert_eq!(
            normalized,
            Thresholds {
                min: 30,
                max: 100,
                emergency_min: 20,
                emergency_max: 110,
                stale_after_minutes: 10,
                stale_emergency_after_minutes: 15,
            }
        );
        let fields: Vec<_> = corrections.iter().map(|c| c.field).collect();
        assert_eq!(
            fields,
            vec![
                "min",
                "max",
                "emergency_min",
                "emergency_max",
                "stale_after_minutes",
                "stale_emergency_after_minutes"
            ]
        );
    }

    #[test]
    fn emergency_limits_must_sit_outside_range() {
        let raw = Thresholds {
            min: 80,
            max: 180,
            emergency_min: 80,
            emergency_max: 180,
            ..Thresholds::default()
        };
        let (normalized, corrections) = raw.normalize();
        assert_eq!(normalized.emergency_min, 70);
        assert_eq!(normalized.emergency_max, 190);
        assert_eq!(corrections.len(), 2);
        assert_eq!(
            corrections[0].to_string(),
            "emergency_min corrected from 80 to 70"
        );
    }

    #[test]
    fn huge_maximum_saturates_instead_of_overflowing() {
        let raw = Thresholds {
            max: i32::MAX,
            emergency_max: 250,
            ..Thresholds::default()
        };
        let (normalized, corrections) = raw.normalize();
        assert_eq!(normalized.emergency_max, i32::MAX);
        assert_eq!(corrections.len(), 1);
    }

    #[test]
    fn beeper_flag_defaults_to_enabled() {
        assert_eq!(normalize_beeper(0), (false, None));
        assert_eq!(normalize_beeper(1), (true, None));
        let (enabled, correction) = normalize_beeper(7);
        assert!(enabled);
        assert_eq!(correction.unwrap().field, "beeper");
    }

    #[test]
    fn bad_timezone_falls_back_to_utc() {
        let (tz, correction) = normalize_timezone("CET");
        assert_eq!(tz.offset_secs(), 0);
        assert!(correction.is_some());
        let (tz, correction) = normalize_timezone("+1:00");
        assert_eq!(tz.offset_secs(), 3600);
        assert!(correction.is_none());
    }

    #[test]
    fn validate_rejects_bad_beeper_time() {
        let cfg = Config {
            beeper_end_time: "25:00".into(),
            ..Config::default()
        };
        let err = validate(&cfg).unwrap_err();
        assert!(format!("{err}").contains("beeper_end_time"));
    }

    #[test]
    fn validate_rejects_out_of_range_timeouts() {
        let cfg = Config {
            backend_timeout_ms: 120_000,
            ..Config::default()
        };
        assert!(validate(&cfg).is_err());
        let cfg = Config {
            history_cap: 0,
            ..Config::default()
        };
        assert!(validate(&cfg).is_err());
    }
}
