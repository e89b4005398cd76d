use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crc32fast::Hasher;

use crate::history::ReadingHistory;
use crate::reading::BackendEntry;
use crate::Result;

pub const HISTORY_FILE: &str = "sgvdict.txt";
pub const RESPONSE_FILE: &str = "response.json";

/// File-backed reading cache and last-response snapshot.
#[derive(Debug)]
pub struct Storage {
    dir: PathBuf,
    last_snapshot_crc: Mutex<Option<u32>>,
}

impl Storage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last_snapshot_crc: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the history plus the number of malformed lines that were skipped.
    pub fn load_history(&self, cap: usize) -> Result<(ReadingHistory, usize)> {
        let path = self.dir.join(HISTORY_FILE);
        if !path.exists() {
            return Ok((ReadingHistory::new(cap), 0));
        }
        let raw = fs::read_to_string(path)?;
        Ok(ReadingHistory::parse(&raw, cap))
    }

    pub fn save_history(&self, history: &ReadingHistory) -> Result<()> {
        self.write_atomic(HISTORY_FILE, history.to_persisted_string().as_bytes())
    }

    /// Write the snapshot unless it is byte-identical to the last one written.
    pub fn save_snapshot(&self, entries: &[BackendEntry]) -> Result<bool> {
        let raw = serde_json::to_string(entries)?;
        let crc = checksum(raw.as_bytes());
        let mut last = self
            .last_snapshot_crc
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *last == Some(crc) {
            return Ok(false);
        }
        self.write_atomic(RESPONSE_FILE, raw.as_bytes())?;
        *last = Some(crc);
        Ok(true)
    }

    pub fn load_snapshot(&self) -> Result<Option<Vec<BackendEntry>>> {
        let path = self.dir.join(RESPONSE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        let entries: Vec<BackendEntry> = serde_json::from_str(&raw)?;
        Ok(Some(entries))
    }

    fn write_atomic(&self, name: &str, contents: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let tmp = self.dir.join(format!("{name}.tmp"));
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, self.dir.join(name))?;
        Ok(())
    }
}

fn checksum(raw: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(raw);
    hasher.finalize()
}
