use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};

use crate::{Error, Result};

/// RTC readings before this year mean the clock was never synced.
pub const MIN_VALID_YEAR: i32 = 2025;

/// Source of UTC wall-clock seconds.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> i64;

    /// Local wall-clock time, rejected when the RTC is obviously unsynced.
    fn local_now(&self, tz: &Timezone) -> Result<NaiveDateTime> {
        local_datetime(self.now_utc(), tz)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Settable clock for tests and replay.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

pub fn local_datetime(utc: i64, tz: &Timezone) -> Result<NaiveDateTime> {
    let local = DateTime::from_timestamp(utc + tz.offset_secs(), 0)
        .ok_or_else(|| Error::Parse(format!("timestamp {utc} out of range")))?
        .naive_utc();
    if local.year() < MIN_VALID_YEAR {
        return Err(Error::Parse(format!("invalid datetime: {local}")));
    }
    Ok(local)
}

/// Fixed offset zone written as `GMT±H:MM` (hours 0-11, or exactly 12:00).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timezone {
    offset_secs: i64,
    label: String,
}

impl Timezone {
    pub fn utc() -> Self {
        Self {
            offset_secs: 0,
            label: "GMT+0:00".into(),
        }
    }

    /// Parse `GMT+1:00`, `+1:00` or `-05:30`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let body = trimmed.strip_prefix("GMT").unwrap_or(trimmed);
        let (sign, rest) = match body.chars().next()? {
            '+' => (1, &body[1..]),
            '-' => (-1, &body[1..]),
            _ => return None,
        };
        let (hh, mm) = rest.split_once(':')?;
        if hh.is_empty() || hh.len() > 2 || mm.len() != 2 {
            return None;
        }
        if !hh.chars().all(|c| c.is_ascii_digit()) || !mm.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let hours: i64 = hh.parse().ok()?;
        let minutes: i64 = mm.parse().ok()?;
        let valid = (hours <= 11 && minutes <= 59) || (hours == 12 && minutes == 0);
        if !valid {
            return None;
        }
        Some(Self {
            offset_secs: sign * (hours * 3600 + minutes * 60),
            label: format!("GMT{body}"),
        })
    }

    pub fn offset_secs(&self) -> i64 {
        self.offset_secs
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self::utc()
    }
}

impl fmt::Display for Timezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_offsets_with_and_without_prefix() {
        let tz = Timezone::parse("GMT+1:00").unwrap();
        assert_eq!(tz.offset_secs(), 3600);
        assert_eq!(tz.label(), "GMT+1:00");

        let tz = Timezone::parse("-05:30").unwrap();
        assert_eq!(tz.offset_secs(), -(5 * 3600 + 30 * 60));
        assert_eq!(tz.label(), "GMT-05:30");

        assert_eq!(Timezone::parse("+12:00").unwrap().offset_secs(), 12 * 3600);
    }

    #[test]
    fn rejects_malformed_offsets() {
        for raw in ["GMT1:00", "+12:30", "+13:00", "+1:0", "+1:60", "UTC", "", "+a:00"] {
            assert!(Timezone::parse(raw).is_none(), "{raw} should be rejected");
        }
    }

    #[test]
    fn local_datetime_applies_offset() {
        // 2025-06-01T10:00:00Z
        let utc = 1_748_772_000;
        let tz = Timezone::parse("+2:00").unwrap();
        let local = local_datetime(utc, &tz).unwrap();
        assert_eq!(local.hour(), 12);
    }

    #[test]
    fn local_datetime_rejects_unsynced_rtc() {
        let err = local_datetime(0, &Timezone::utc()).unwrap_err();
        assert!(format!("{err}").contains("invalid datetime"));
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(100);
        clock.advance(20);
        assert_eq!(clock.now_utc(), 120);
        clock.set(5);
        assert_eq!(clock.now_utc(), 5);
    }
}
