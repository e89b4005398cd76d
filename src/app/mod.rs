use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel;

use crate::alarm::{BeeperPolicy, BeeperWindow};
use crate::cli::RunOptions;
use crate::clock::{Clock, SystemClock, Timezone};
use crate::config::{
    self, loader, normalize_beeper, normalize_timezone, Config, ConfigCorrection, Thresholds,
    DEFAULT_BEEPER_END, DEFAULT_BEEPER_START,
};
use crate::display::{Banner, DisplayMode};
use crate::hardware::{sim, Capabilities, DeviceControl, Hardware, RestartReason};
use crate::{Error, Result};

pub mod alarm_monitor;
pub mod backend;
pub mod context;
pub mod events;
pub mod input;
mod lifecycle;
pub mod logger;
pub mod polling;
pub mod watchdog;

use alarm_monitor::{spawn_alarm_monitor, AlarmMonitor};
use backend::{Backend, HttpBackend, HttpBackendConfig};
use context::{AppContext, ConfigStore, ContextParts};
use events::{spawn_dispatcher, AlarmCommand, Dispatcher, Event};
use input::{spawn_inputs, InputIntervals};
pub use lifecycle::{ProcessRestart, RESTART_EXIT_CODE, SETUP_EXIT_CODE};
pub use logger::{LogLevel, Logger};
use polling::PollingLoop;

/// Extra time the watchdog allows on top of the backend long-poll timeout.
pub const WATCHDOG_SLACK: Duration = Duration::from_secs(10);
/// How long the motor runs for the once-per-episode alert.
pub const DEFAULT_VIBRATION: Duration = Duration::from_secs(1);
/// Battery level reported by the simulated gauge on a host.
const HOST_BATTERY_LEVEL: i32 = 100;

/// Runtime settings: the config file merged with CLI overrides and normalised.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub endpoint: String,
    pub token: String,
    pub locale: String,
    pub timezone: Timezone,
    pub thresholds: Thresholds,
    pub beeper: BeeperPolicy,
    pub display_mode: DisplayMode,
    pub brightness: u8,
    pub configured: bool,
    pub data_dir: PathBuf,
    pub history_cap: usize,
    pub backend_timeout: Duration,
    pub retry_delay: Duration,
    pub watchdog_slack: Duration,
    pub vibration: Duration,
    pub capabilities: Capabilities,
    pub log_level: LogLevel,
    pub log_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let cfg = Config::default();
        Self {
            endpoint: cfg.api_endpoint,
            token: cfg.api_token,
            locale: cfg.locale,
            timezone: Timezone::utc(),
            thresholds: Thresholds::default(),
            beeper: BeeperPolicy {
                enabled: true,
                window: default_beeper_window(),
            },
            display_mode: cfg.display_mode,
            brightness: cfg.brightness,
            configured: cfg.configured,
            data_dir: PathBuf::from("data"),
            history_cap: cfg.history_cap,
            backend_timeout: Duration::from_millis(cfg.backend_timeout_ms),
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
            watchdog_slack: WATCHDOG_SLACK,
            vibration: DEFAULT_VIBRATION,
            capabilities: Capabilities::default(),
            log_level: LogLevel::default(),
            log_file: None,
        }
    }
}

fn default_beeper_window() -> BeeperWindow {
    BeeperWindow::parse(DEFAULT_BEEPER_START, DEFAULT_BEEPER_END).unwrap_or(BeeperWindow {
        start: chrono::NaiveTime::MIN,
        end: chrono::NaiveTime::MIN,
    })
}

impl AppConfig {
    /// Merge the file config with CLI flags. Soft problems come back as corrections;
    /// values that cannot be repaired are errors.
    pub fn from_sources(cfg: &Config, opts: &RunOptions) -> Result<(Self, Vec<ConfigCorrection>)> {
        config::validate(cfg)?;
        let mut corrections = Vec::new();

        let (thresholds, mut threshold_fixes) = cfg.thresholds().normalize();
        corrections.append(&mut threshold_fixes);
        let (timezone, tz_fix) = normalize_timezone(&cfg.timezone);
        let (beeper_enabled, beeper_fix) = normalize_beeper(cfg.beeper);
        corrections.extend(tz_fix);
        corrections.extend(beeper_fix);

        let display_mode = match opts.mode.as_deref() {
            Some(raw) => raw.parse::<DisplayMode>().map_err(Error::InvalidArgs)?,
            None => cfg.display_mode,
        };
        let log_level = match opts.log_level.as_deref() {
            Some(raw) => raw
                .parse::<LogLevel>()
                .map_err(|_| Error::InvalidArgs(format!("unknown log level '{raw}'")))?,
            None => cfg.log_level,
        };
        let endpoint = opts
            .endpoint
            .as_deref()
            .unwrap_or(&cfg.api_endpoint)
            .trim()
            .trim_end_matches('/')
            .to_string();
        let data_dir = match &opts.data_dir {
            Some(dir) => PathBuf::from(dir),
            None => cfg.resolved_data_dir()?,
        };

        let merged = Self {
            endpoint,
            token: opts.token.clone().unwrap_or_else(|| cfg.api_token.clone()),
            locale: cfg.locale.clone(),
            timezone,
            thresholds,
            beeper: BeeperPolicy {
                enabled: beeper_enabled,
                window: BeeperWindow::parse(&cfg.beeper_start_time, &cfg.beeper_end_time)?,
            },
            display_mode,
            brightness: cfg.brightness,
            configured: cfg.configured || opts.endpoint.is_some(),
            data_dir,
            history_cap: cfg.history_cap,
            backend_timeout: Duration::from_millis(cfg.backend_timeout_ms),
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
            watchdog_slack: WATCHDOG_SLACK,
            vibration: DEFAULT_VIBRATION,
            capabilities: Capabilities {
                supports_rotation: cfg.supports_rotation,
                has_env_sensor: cfg.has_env_sensor,
                has_rgb_indicator: cfg.has_rgb_indicator,
            },
            log_level,
            log_file: opts.log_file.clone(),
        };
        Ok((merged, corrections))
    }

    /// Why the device cannot start polling, if it cannot.
    pub fn setup_problem(&self) -> Option<&'static str> {
        if !self.configured {
            Some("device is not configured")
        } else if self.endpoint.is_empty() {
            Some("api_endpoint is empty")
        } else {
            None
        }
    }

    pub fn backend_config(&self) -> HttpBackendConfig {
        HttpBackendConfig {
            endpoint: self.endpoint.clone(),
            token: self.token.clone(),
            locale: self.locale.clone(),
            timezone: self.timezone.label().to_string(),
            timeout: self.backend_timeout,
        }
    }
}

/// Devices and process plumbing the app runs against.
pub struct Runtime {
    pub hardware: Hardware,
    pub clock: Arc<dyn Clock>,
    pub device: Arc<dyn DeviceControl>,
    pub running: Arc<AtomicBool>,
    pub intervals: InputIntervals,
}

pub struct App {
    config: AppConfig,
    corrections: Vec<ConfigCorrection>,
    config_store: Option<ConfigStore>,
    logger: Logger,
}

impl App {
    pub fn new(config: AppConfig, logger: Logger) -> Self {
        Self {
            config,
            corrections: Vec::new(),
            config_store: None,
            logger,
        }
    }

    /// Persist button-driven changes (brightness, setup flag) to `path`.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>, file: Config) -> Self {
        self.config_store = Some(ConfigStore::new(path, file));
        self
    }

    pub fn from_options(opts: RunOptions) -> Result<Self> {
        let path = match &opts.config_path {
            Some(path) => PathBuf::from(path),
            None => Config::default_path()?,
        };
        let file = loader::load_or_create(&path)?;
        let (config, corrections) = AppConfig::from_sources(&file, &opts)?;
        let logger = Logger::new(config.log_level, config.log_file.clone());
        let mut app = Self::new(config, logger).with_config_file(path, file);
        app.corrections = corrections;
        Ok(app)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn corrections(&self) -> &[ConfigCorrection] {
        &self.corrections
    }

    /// Entry point for the daemon on a host: simulated peripherals, HTTP backend, ctrl-c shutdown.
    pub fn run(self) -> Result<()> {
        let running = lifecycle::create_shutdown_flag()?;
        let (hardware, _handles) = sim::simulated(self.config.capabilities, HOST_BATTERY_LEVEL, None);
        let runtime = Runtime {
            hardware,
            clock: Arc::new(SystemClock),
            device: Arc::new(ProcessRestart::new(self.logger.clone())),
            running,
            intervals: InputIntervals::default(),
        };
        self.run_with(runtime, |cfg| HttpBackend::new(cfg.backend_config()))
    }

    /// Start every thread and poll until shutdown. `connect` is only called once the
    /// device is known to be configured.
    pub fn run_with<B, F>(self, runtime: Runtime, connect: F) -> Result<()>
    where
        B: Backend,
        F: FnOnce(&AppConfig) -> Result<B>,
    {
        let Runtime {
            hardware,
            clock,
            device,
            running,
            intervals,
        } = runtime;
        let (surface, peripherals, inputs) = hardware.split();
        for name in peripherals.missing() {
            self.logger.warn(format!("{name} not found; continuing without it"));
        }

        let mut settings = self.config;
        if settings.capabilities.supports_rotation {
            if let Some(accel) = &inputs.accelerometer {
                match accel.accel_y() {
                    Ok(y) if y < 0.0 => settings.display_mode = settings.display_mode.flipped_twin(),
                    Ok(_) => {}
                    Err(err) => self.logger.warn(format!("accelerometer unavailable: {err}")),
                }
            }
        }

        let logger = self.logger;
        for correction in &self.corrections {
            logger.warn(format!("config: {correction}"));
        }
        logger.info(format!(
            "glucoframe {} start (mode={}, data_dir={})",
            env!("CARGO_PKG_VERSION"),
            settings.display_mode,
            settings.data_dir.display()
        ));

        let ctx = Arc::new(AppContext::new(ContextParts {
            settings,
            logger: logger.clone(),
            clock,
            surface,
            peripherals,
            device,
            running,
            config_store: self.config_store,
        }));
        if let Err(err) = ctx.presenter.set_brightness(ctx.brightness()) {
            logger.warn(format!("failed to set brightness: {err}"));
        }

        ctx.show_banner(Banner::Starting);
        ctx.show_banner(Banner::LoadingData);
        match ctx.load_history() {
            Ok(loaded) => logger.info(format!("loaded {loaded} cached readings")),
            Err(err) => logger.warn(format!("reading cache unavailable: {err}")),
        }

        if let Some(problem) = ctx.settings.setup_problem() {
            logger.error(format!("cannot start: {problem}"));
            ctx.show_banner(Banner::FixConfig);
            if let Err(err) = ctx.update_config(|cfg| cfg.configured = false) {
                logger.error(format!("failed to clear configured flag: {err}"));
            }
            ctx.restart(RestartReason::InvalidConfig);
            return Err(Error::NeedsSetup(problem.to_string()));
        }
        let backend = connect(&ctx.settings)?;

        let (event_tx, event_rx) = channel::unbounded::<Event>();
        let (alarm_tx, alarm_rx) = channel::unbounded::<AlarmCommand>();
        let alarm_thread = spawn_alarm_monitor(AlarmMonitor::new(ctx.clone()), alarm_rx)?;
        let dispatch_thread =
            spawn_dispatcher(Dispatcher::new(ctx.clone(), alarm_tx.clone()), event_rx)?;
        let input_threads = spawn_inputs(
            inputs,
            event_tx.clone(),
            intervals,
            ctx.settings.capabilities.supports_rotation,
            logger.clone(),
        )?;

        let mut polling = PollingLoop::new(ctx.clone(), backend)?;
        polling.run();
        drop(polling);

        logger.info("shutting down");
        ctx.begin_shutdown();
        input_threads.stop();
        let _ = event_tx.send(Event::Shutdown);
        let _ = alarm_tx.send(AlarmCommand::Stop);
        if dispatch_thread.join().is_err() {
            logger.error("event dispatcher panicked");
        }
        if alarm_thread.join().is_err() {
            logger.error("alarm monitor panicked");
        }
        lifecycle::quiesce_outputs(&ctx);
        Ok(())
    }
}
