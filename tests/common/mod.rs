#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use glucoframe::app::backend::Backend;
use glucoframe::app::context::{AppContext, ConfigStore, ContextParts};
use glucoframe::app::{AppConfig, Logger};
use glucoframe::clock::ManualClock;
use glucoframe::config::Config;
use glucoframe::hardware::sim::{self, SimDeviceControl, SimHandles};
use glucoframe::hardware::{Capabilities, Hardware};
use glucoframe::reading::{BackendEntry, EntryId};
use glucoframe::{Error, Result};
use tempfile::TempDir;

/// 2025-06-01T12:00:00Z
pub const NOON: i64 = 1_748_779_200;

pub fn entry(sgv: i32, date: &str, direction: &str, id: &str) -> BackendEntry {
    BackendEntry {
        sgv,
        date: date.to_string(),
        direction: direction.to_string(),
        id: Some(EntryId::Text(id.to_string())),
        ago: Some("1 min ago".to_string()),
    }
}

/// Two rows five minutes apart, newest first.
pub fn batch(newest: i32, previous: i32, newest_id: &str) -> Vec<BackendEntry> {
    vec![
        entry(newest, "2025-06-01T12:00:00", "Flat", newest_id),
        entry(previous, "2025-06-01T11:55:00", "Flat", "older"),
    ]
}

#[derive(Debug, Clone)]
pub enum Step {
    Entries(Vec<BackendEntry>),
    Fail,
    /// Block longer than any sane watchdog, then fail.
    Hang(Duration),
}

/// Backend that plays back a fixed script and records every `last_id` it was asked for.
pub struct ScriptedBackend {
    steps: VecDeque<Step>,
    pub asked: Arc<Mutex<Vec<Option<String>>>>,
    /// Cleared once the script runs out, so `PollingLoop::run` returns.
    stop_when_done: Option<Arc<AtomicBool>>,
}

impl ScriptedBackend {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            asked: Arc::new(Mutex::new(Vec::new())),
            stop_when_done: None,
        }
    }

    pub fn stopping(mut self, running: Arc<AtomicBool>) -> Self {
        self.stop_when_done = Some(running);
        self
    }
}

impl Backend for ScriptedBackend {
    fn fetch(&mut self, last_id: Option<&str>) -> Result<Vec<BackendEntry>> {
        self.asked.lock().unwrap().push(last_id.map(str::to_string));
        let step = self.steps.pop_front();
        if self.steps.is_empty() {
            if let Some(running) = &self.stop_when_done {
                running.store(false, Ordering::SeqCst);
            }
        }
        match step {
            Some(Step::Entries(entries)) if entries.is_empty() => {
                Err(Error::Parse("backend returned no entries".into()))
            }
            Some(Step::Entries(entries)) => Ok(entries),
            Some(Step::Hang(for_how_long)) => {
                thread::sleep(for_how_long);
                Err(Error::Network("timed out".into()))
            }
            Some(Step::Fail) | None => Err(Error::Network("connection refused".into())),
        }
    }
}

pub struct Harness {
    pub ctx: Arc<AppContext>,
    pub sim: SimHandles,
    pub device: SimDeviceControl,
    pub clock: Arc<ManualClock>,
    pub running: Arc<AtomicBool>,
    pub dir: TempDir,
}

impl Harness {
    pub fn config_path(&self) -> std::path::PathBuf {
        self.dir.path().join("config.toml")
    }

    pub fn saved_config(&self) -> Config {
        Config::load_from_path(&self.config_path()).unwrap()
    }
}

pub fn settings(dir: &TempDir) -> AppConfig {
    AppConfig {
        endpoint: "http://backend.invalid/api/v1".into(),
        configured: true,
        data_dir: dir.path().join("data"),
        retry_delay: Duration::from_millis(10),
        vibration: Duration::from_millis(5),
        ..AppConfig::default()
    }
}

pub fn simulated_hardware(battery: i32) -> (Hardware, SimHandles) {
    sim::simulated(Capabilities::default(), battery, None)
}

/// A context over simulated hardware, a manual clock at `NOON + 60` and a temp data dir.
pub fn harness(tweak: impl FnOnce(&mut AppConfig)) -> Harness {
    harness_with_logger(Logger::silent(), tweak)
}

pub fn harness_with_logger(logger: Logger, tweak: impl FnOnce(&mut AppConfig)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut app_config = settings(&dir);
    tweak(&mut app_config);

    let file = Config {
        api_endpoint: app_config.endpoint.clone(),
        configured: true,
        ..Config::default()
    };
    let config_path = dir.path().join("config.toml");
    file.save_to_path(&config_path).unwrap();

    let (hardware, handles) = simulated_hardware(80);
    let (surface, peripherals, _inputs) = hardware.split();
    let clock = Arc::new(ManualClock::new(NOON + 60));
    let device = SimDeviceControl::new();
    let running = Arc::new(AtomicBool::new(true));
    let ctx = Arc::new(AppContext::new(ContextParts {
        settings: app_config,
        logger,
        clock: clock.clone(),
        surface,
        peripherals,
        device: Arc::new(device.clone()),
        running: running.clone(),
        config_store: Some(ConfigStore::new(config_path, file)),
    }));
    Harness {
        ctx,
        sim: handles,
        device,
        clock,
        running,
        dir,
    }
}
