use crate::reading::Reading;

pub const DEFAULT_HISTORY_CAP: usize = 10;
pub const MAX_HISTORY_CAP: usize = 50;

/// Capped timestamp → glucose history, newest first after every merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingHistory {
    entries: Vec<(i64, i32)>,
    cap: usize,
}

impl ReadingHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: Vec::new(),
            cap: cap.clamp(1, MAX_HISTORY_CAP),
        }
    }

    /// Build from persisted pairs, preserving their order and dropping repeats past the cap.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (i64, i32)>, cap: usize) -> Self {
        let mut history = Self::new(cap);
        for (ts, value) in pairs {
            if history.entries.len() >= history.cap {
                break;
            }
            if !history.contains(ts) {
                history.entries.push((ts, value));
            }
        }
        history
    }

    /// Parse `timestamp:value` lines; malformed lines are skipped.
    pub fn parse(raw: &str, cap: usize) -> (Self, usize) {
        let mut skipped = 0;
        let pairs: Vec<(i64, i32)> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| match parse_line(line) {
                Some(pair) => Some(pair),
                None => {
                    skipped += 1;
                    None
                }
            })
            .collect();
        (Self::from_pairs(pairs, cap), skipped)
    }

    /// Merge a fresh newest-first batch with the stored entries.
    ///
    /// Fresh readings come first. Stored entries are then walked in their
    /// current order and kept only when older than the oldest fresh reading,
    /// until the cap is reached.
    pub fn update(&mut self, fresh_batch: &[Reading]) {
        if fresh_batch.is_empty() {
            return;
        }
        let mut fresh: Vec<(i64, i32)> = fresh_batch
            .iter()
            .map(|r| (r.timestamp, r.glucose_value))
            .collect();
        fresh.sort_by(|a, b| b.0.cmp(&a.0));
        fresh.dedup_by_key(|pair| pair.0);
        fresh.truncate(self.cap);

        let oldest_fresh = fresh.last().map(|pair| pair.0).unwrap_or(i64::MIN);
        let mut merged = fresh;
        for &(ts, value) in &self.entries {
            if merged.len() >= self.cap {
                break;
            }
            if ts < oldest_fresh {
                merged.push((ts, value));
            }
        }
        self.entries = merged;
    }

    pub fn to_persisted_string(&self) -> String {
        self.entries
            .iter()
            .map(|(ts, value)| format!("{ts}:{value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn entries(&self) -> &[(i64, i32)] {
        &self.entries
    }

    pub fn newest(&self) -> Option<(i64, i32)> {
        self.entries.iter().copied().max_by_key(|pair| pair.0)
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn contains(&self, ts: i64) -> bool {
        self.entries.iter().any(|(existing, _)| *existing == ts)
    }
}

impl Default for ReadingHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}

fn parse_line(line: &str) -> Option<(i64, i32)> {
    let (ts, value) = line.split_once(':')?;
    Some((ts.trim().parse().ok()?, value.trim().parse().ok()?))
}
