use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::alarm::SNOOZE_SECS;
use crate::classify::{classify, Classification, ClassifyContext, EmergencyCause};
use crate::clock::Clock;
use crate::config::Config;
use crate::display::layout::Frame;
use crate::display::{Banner, DisplayMode, DisplayPresenter, LockMode, RenderOutcome, Rgb, Surface};
use crate::hardware::{DeviceControl, Peripherals, RestartReason};
use crate::history::ReadingHistory;
use crate::reading::{BackendEntry, Reading};
use crate::storage::Storage;
use crate::Result;

use super::{AppConfig, Logger};

const BRIGHTNESS_STEP: u8 = 32;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The on-disk config file, rewritten whenever a button changes a persisted setting.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: Mutex<Config>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            path: path.into(),
            config: Mutex::new(config),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Config {
        lock(&self.config).clone()
    }

    pub fn update(&self, change: impl FnOnce(&mut Config)) -> Result<()> {
        let mut config = lock(&self.config);
        change(&mut config);
        config.save_to_path(&self.path)
    }
}

/// Most recent backend response, kept for fallback renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestResponse {
    pub entries: Vec<BackendEntry>,
    /// Same order as `entries`, newest first.
    pub readings: Vec<Reading>,
    pub no_network: bool,
}

impl LatestResponse {
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Everything `AppContext::new` needs from the caller.
pub struct ContextParts {
    pub settings: AppConfig,
    pub logger: Logger,
    pub clock: Arc<dyn Clock>,
    pub surface: Box<dyn Surface>,
    pub peripherals: Peripherals,
    pub device: Arc<dyn DeviceControl>,
    pub running: Arc<AtomicBool>,
    pub config_store: Option<ConfigStore>,
}

/// State shared by the polling loop, the alarm monitor, the dispatcher and the input pollers.
pub struct AppContext {
    pub settings: AppConfig,
    pub logger: Logger,
    pub clock: Arc<dyn Clock>,
    pub presenter: DisplayPresenter,
    pub peripherals: Peripherals,
    pub device: Arc<dyn DeviceControl>,
    pub storage: Arc<Storage>,
    config_store: Option<ConfigStore>,
    running: Arc<AtomicBool>,
    shutting_down: AtomicBool,
    emergency: AtomicBool,
    cause: AtomicU8,
    mode: AtomicU8,
    pause_until: AtomicI64,
    brightness: AtomicU8,
    env_warned: AtomicBool,
    started_at: i64,
    latest: Mutex<LatestResponse>,
    history: Mutex<ReadingHistory>,
}

impl AppContext {
    pub fn new(parts: ContextParts) -> Self {
        let settings = parts.settings;
        let presenter = DisplayPresenter::new(parts.surface, settings.capabilities.supports_rotation);
        let storage = Arc::new(Storage::new(settings.data_dir.clone()));
        let history = ReadingHistory::new(settings.history_cap);
        let started_at = parts.clock.now_utc();
        Self {
            logger: parts.logger,
            clock: parts.clock,
            presenter,
            peripherals: parts.peripherals,
            device: parts.device,
            storage,
            config_store: parts.config_store,
            running: parts.running,
            shutting_down: AtomicBool::new(false),
            emergency: AtomicBool::new(false),
            cause: AtomicU8::new(EmergencyCause::None.as_u8()),
            mode: AtomicU8::new(settings.display_mode.index()),
            pause_until: AtomicI64::new(0),
            brightness: AtomicU8::new(settings.brightness),
            env_warned: AtomicBool::new(false),
            started_at,
            latest: Mutex::new(LatestResponse::default()),
            history: Mutex::new(history),
            settings,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency.load(Ordering::SeqCst)
    }

    pub fn emergency_cause(&self) -> EmergencyCause {
        EmergencyCause::from_u8(self.cause.load(Ordering::SeqCst))
    }

    pub fn pause_until(&self) -> i64 {
        self.pause_until.load(Ordering::SeqCst)
    }

    pub fn mode(&self) -> DisplayMode {
        DisplayMode::from_index(self.mode.load(Ordering::SeqCst))
            .unwrap_or(self.settings.display_mode)
    }

    pub fn set_mode(&self, mode: DisplayMode) {
        self.mode.store(mode.index(), Ordering::SeqCst);
    }

    pub fn brightness(&self) -> u8 {
        self.brightness.load(Ordering::SeqCst)
    }

    pub fn uptime_secs(&self) -> i64 {
        self.clock.now_utc() - self.started_at
    }

    /// Clear a raised emergency and pause new ones. Returns false when nothing was raised.
    pub fn acknowledge(&self, now: i64) -> bool {
        if !self.emergency.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.pause_until.store(now + SNOOZE_SECS, Ordering::SeqCst);
        self.logger
            .info(format!("alarm acknowledged, paused until {}", now + SNOOZE_SECS));
        true
    }

    /// Step brightness by 32, wrapping past 255 back to 32, and persist it.
    pub fn cycle_brightness(&self) -> Result<u8> {
        let next = self
            .brightness()
            .checked_add(BRIGHTNESS_STEP)
            .unwrap_or(BRIGHTNESS_STEP);
        self.brightness.store(next, Ordering::SeqCst);
        self.presenter.set_brightness(next)?;
        self.update_config(|cfg| cfg.brightness = next)?;
        self.logger.debug(format!("brightness set to {next}"));
        Ok(next)
    }

    /// Change and save the config file; a no-op when running without one.
    pub fn update_config(&self, change: impl FnOnce(&mut Config)) -> Result<()> {
        match &self.config_store {
            Some(store) => store.update(change),
            None => Ok(()),
        }
    }

    pub fn config_store(&self) -> Option<&ConfigStore> {
        self.config_store.as_ref()
    }

    /// Read the persisted history into memory; returns how many entries were loaded.
    pub fn load_history(&self) -> Result<usize> {
        let (history, skipped) = self.storage.load_history(self.settings.history_cap)?;
        if skipped > 0 {
            self.logger
                .warn(format!("skipped {skipped} malformed lines in the reading cache"));
        }
        let loaded = history.len();
        *lock(&self.history) = history;
        Ok(loaded)
    }

    /// Merge a fresh batch and return a copy for persistence.
    pub fn merge_readings(&self, fresh: &[Reading]) -> ReadingHistory {
        let mut history = lock(&self.history);
        history.update(fresh);
        history.clone()
    }

    pub fn history(&self) -> ReadingHistory {
        lock(&self.history).clone()
    }

    pub fn set_latest(&self, latest: LatestResponse) {
        *lock(&self.latest) = latest;
    }

    pub fn latest(&self) -> LatestResponse {
        lock(&self.latest).clone()
    }

    /// Flag the in-memory response as outdated; returns false when there is none.
    pub fn mark_no_network(&self) -> bool {
        let mut latest = lock(&self.latest);
        if latest.is_empty() {
            return false;
        }
        latest.no_network = true;
        true
    }

    /// `HH:MM:SS`, or `None` while the RTC is unsynced.
    pub fn clock_text(&self) -> Option<String> {
        self.clock
            .local_now(&self.settings.timezone)
            .ok()
            .map(|local| local.format("%H:%M:%S").to_string())
    }

    /// Classify the newest reading and gather everything the presenter needs.
    pub fn build_frame(&self) -> Option<Frame> {
        let latest = self.latest();
        let reading = *latest.readings.first()?;
        let now = self.clock.now_utc();
        let battery_level = self.peripherals.battery.level();
        let ctx = ClassifyContext {
            now,
            battery_level,
            uptime_secs: now - self.started_at,
            charging: self.peripherals.battery.is_charging(),
            emergency_pause_until: self.pause_until(),
        };
        let classification = classify(&reading, &self.settings.thresholds, &ctx);
        Some(Frame {
            reading,
            previous_value: latest.readings.get(1).map(|r| r.glucose_value),
            classification,
            ago: latest.entries.first().and_then(|entry| entry.ago.clone()),
            no_network: latest.no_network,
            battery_level,
            env: self.read_env(),
            clock_text: self.clock_text(),
            tz_offset_secs: self.settings.timezone.offset_secs(),
            now,
            history: self.history().entries().to_vec(),
        })
    }

    /// Classify, publish the emergency state and render the newest reading.
    pub fn render_latest(&self, force_full: bool, lock: LockMode) -> Result<RenderOutcome> {
        let Some(frame) = self.build_frame() else {
            return Ok(RenderOutcome::Skipped);
        };
        self.publish(&frame.classification);
        let outcome = self
            .presenter
            .render(&frame, self.mode(), force_full, lock)?;
        if outcome == RenderOutcome::Skipped {
            self.logger.debug("render skipped: display locked");
        }
        Ok(outcome)
    }

    /// Share the emergency state with the alarm monitor; outside an emergency the
    /// indicator mirrors the panel colour.
    pub fn publish(&self, classification: &Classification) {
        self.emergency
            .store(classification.is_emergency, Ordering::SeqCst);
        self.cause
            .store(classification.cause.as_u8(), Ordering::SeqCst);
        if !classification.is_emergency {
            let zones = [Rgb::BLACK, classification.background_rgb(), Rgb::BLACK];
            if let Err(err) = self.peripherals.set_zones(zones) {
                self.logger.warn(format!("indicator update failed: {err}"));
            }
        }
    }

    pub fn show_banner(&self, banner: Banner) {
        if let Err(err) = self.presenter.show_banner(banner, self.mode().is_flipped()) {
            self.logger
                .error(format!("failed to show '{}': {err}", banner.text()));
        }
    }

    /// Ask the device to restart and stop every loop.
    pub fn restart(&self, reason: RestartReason) {
        self.logger.warn(format!("restarting: {reason}"));
        self.begin_shutdown();
        if let Err(err) = self.device.restart(reason) {
            self.logger.error(format!("restart failed: {err}"));
        }
        self.stop();
    }

    /// The backend call hung past its deadline.
    pub fn expire_watchdog(&self) {
        self.logger.error("backend watchdog expired");
        if let Err(err) = self
            .peripherals
            .set_zones([Rgb::BLACK, Rgb::DARKGREY, Rgb::BLACK])
        {
            self.logger.warn(format!("indicator update failed: {err}"));
        }
        self.begin_shutdown();
        self.show_banner(Banner::Restarting);
        self.restart(RestartReason::Watchdog);
    }

    fn read_env(&self) -> Option<crate::display::layout::EnvSnapshot> {
        let sensor = self.peripherals.env.as_ref()?;
        match sensor.read() {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                if !self.env_warned.swap(true, Ordering::SeqCst) {
                    self.logger
                        .warn(format!("environment sensor unavailable: {err}"));
                }
                None
            }
        }
    }
}
