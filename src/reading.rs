use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::clock::Timezone;
use crate::{Error, Result};

const BACKEND_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Rate-of-change indicator reported with each reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TrendDirection {
    Flat,
    SingleUp,
    SingleDown,
    DoubleUp,
    DoubleDown,
    FortyFiveUp,
    FortyFiveDown,
    #[default]
    Unknown,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Flat => "Flat",
            TrendDirection::SingleUp => "SingleUp",
            TrendDirection::SingleDown => "SingleDown",
            TrendDirection::DoubleUp => "DoubleUp",
            TrendDirection::DoubleDown => "DoubleDown",
            TrendDirection::FortyFiveUp => "FortyFiveUp",
            TrendDirection::FortyFiveDown => "FortyFiveDown",
            TrendDirection::Unknown => "Unknown",
        }
    }

    pub fn is_rising(&self) -> bool {
        matches!(
            self,
            TrendDirection::SingleUp | TrendDirection::DoubleUp | TrendDirection::FortyFiveUp
        )
    }

    pub fn is_falling(&self) -> bool {
        matches!(
            self,
            TrendDirection::SingleDown | TrendDirection::DoubleDown | TrendDirection::FortyFiveDown
        )
    }
}

impl FromStr for TrendDirection {
    type Err = std::convert::Infallible;

    /// Unrecognised labels (`NONE`, `NOT COMPUTABLE`, ...) become `Unknown`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "Flat" => TrendDirection::Flat,
            "SingleUp" => TrendDirection::SingleUp,
            "SingleDown" => TrendDirection::SingleDown,
            "DoubleUp" => TrendDirection::DoubleUp,
            "DoubleDown" => TrendDirection::DoubleDown,
            "FortyFiveUp" => TrendDirection::FortyFiveUp,
            "FortyFiveDown" => TrendDirection::FortyFiveDown,
            _ => TrendDirection::Unknown,
        })
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend entry id; servers send either a number or an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryId {
    Num(i64),
    Text(String),
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryId::Num(n) => write!(f, "{n}"),
            EntryId::Text(s) => f.write_str(s),
        }
    }
}

/// One row of the backend `entries.json` response, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendEntry {
    pub sgv: i32,
    pub date: String,
    #[serde(default)]
    pub direction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ago: Option<String>,
}

impl BackendEntry {
    pub fn trend(&self) -> TrendDirection {
        self.direction
            .parse::<TrendDirection>()
            .unwrap_or_default()
    }

    /// Wall-clock time of the entry in the configured zone.
    pub fn local_datetime(&self) -> Result<NaiveDateTime> {
        parse_backend_date(&self.date)
    }
}

/// Parse `YYYY-MM-DDTHH:MM:SS`, ignoring fractional seconds or zone suffixes.
pub fn parse_backend_date(raw: &str) -> Result<NaiveDateTime> {
    let head = raw
        .get(..19)
        .ok_or_else(|| Error::Parse(format!("date too short: '{raw}'")))?;
    NaiveDateTime::parse_from_str(head, BACKEND_DATE_FORMAT)
        .map_err(|e| Error::Parse(format!("date '{raw}': {e}")))
}

/// Immutable glucose reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    /// UTC epoch seconds.
    pub timestamp: i64,
    /// mg/dL.
    pub glucose_value: i32,
    pub trend: TrendDirection,
    pub source_id: u64,
}

impl Reading {
    pub fn new(timestamp: i64, glucose_value: i32, trend: TrendDirection, source_id: u64) -> Self {
        Self {
            timestamp,
            glucose_value,
            trend,
            source_id,
        }
    }

    pub fn from_entry(entry: &BackendEntry, tz: &Timezone, source_id: u64) -> Result<Self> {
        let local = entry.local_datetime()?;
        let timestamp = local.and_utc().timestamp() - tz.offset_secs();
        Ok(Self::new(timestamp, entry.sgv, entry.trend(), source_id))
    }
}

/// A backend response with unusable rows dropped; `entries[i]` produced `readings[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvertedBatch {
    pub entries: Vec<BackendEntry>,
    pub readings: Vec<Reading>,
    /// One message per dropped row.
    pub skipped: Vec<String>,
}

/// Convert a newest-first backend response into readings, assigning ids from `next_id`.
/// Rows whose date does not parse are skipped rather than failing the batch.
pub fn readings_from_entries(
    entries: Vec<BackendEntry>,
    tz: &Timezone,
    next_id: &mut u64,
) -> ConvertedBatch {
    let mut batch = ConvertedBatch::default();
    for (index, entry) in entries.into_iter().enumerate() {
        match Reading::from_entry(&entry, tz, *next_id) {
            Ok(reading) => {
                *next_id += 1;
                batch.readings.push(reading);
                batch.entries.push(entry);
            }
            Err(err) => batch.skipped.push(format!("entry {index}: {err}")),
        }
    }
    batch
}
