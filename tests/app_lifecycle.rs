mod common;

use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use common::{batch, settings, simulated_hardware, ScriptedBackend, Step, NOON};
use glucoframe::app::input::InputIntervals;
use glucoframe::app::{App, AppConfig, LogLevel, Logger, Runtime};
use glucoframe::cli::RunOptions;
use glucoframe::clock::ManualClock;
use glucoframe::config::Config;
use glucoframe::display::{DisplayMode, Rgb};
use glucoframe::hardware::sim::{self, SimDeviceControl, SimHandles};
use glucoframe::hardware::{Capabilities, RestartReason};
use glucoframe::storage::HISTORY_FILE;
use glucoframe::Error;

fn fast_inputs() -> InputIntervals {
    InputIntervals {
        touch: Duration::from_millis(5),
        buttons: Duration::from_millis(5),
        accelerometer: Duration::from_millis(10),
        clock: Duration::from_millis(20),
    }
}

fn runtime(device: &SimDeviceControl, running: Arc<AtomicBool>) -> (Runtime, SimHandles) {
    let (hardware, handles) = simulated_hardware(80);
    let runtime = Runtime {
        hardware,
        clock: Arc::new(ManualClock::new(NOON + 60)),
        device: Arc::new(device.clone()),
        running,
        intervals: fast_inputs(),
    };
    (runtime, handles)
}

#[test]
fn unconfigured_device_shows_fix_config_and_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    let file = Config::default();
    file.save_to_path(&config_path).unwrap();
    let app_config = AppConfig {
        configured: false,
        ..settings(&dir)
    };
    let app = App::new(app_config, Logger::silent()).with_config_file(&config_path, file);

    let device = SimDeviceControl::new();
    let (runtime, handles) = runtime(&device, Arc::new(AtomicBool::new(true)));
    let err = app
        .run_with(runtime, |_| -> glucoframe::Result<ScriptedBackend> {
            panic!("must not connect before setup")
        })
        .unwrap_err();

    assert!(matches!(err, Error::NeedsSetup(_)), "{err}");
    assert_eq!(device.restarts(), vec![RestartReason::InvalidConfig]);
    let texts = handles.surface.texts();
    assert!(texts.contains(&"Starting...".to_string()));
    assert!(texts.contains(&"Loading data...".to_string()));
    assert_eq!(texts.last().map(String::as_str), Some("Fix config!"));
    assert!(!Config::load_from_path(&config_path).unwrap().configured);
}

#[test]
fn configured_device_polls_until_stopped_then_goes_dark() {
    let dir = tempfile::tempdir().unwrap();
    let app = App::new(settings(&dir), Logger::silent());
    let running = Arc::new(AtomicBool::new(true));
    let device = SimDeviceControl::new();
    let (runtime, handles) = runtime(&device, running.clone());
    handles.accelerometer.set_y(-0.8);

    let backend = ScriptedBackend::new(vec![
        Step::Entries(batch(110, 104, "n1")),
        Step::Entries(batch(112, 110, "n2")),
    ])
    .stopping(running);
    let asked = backend.asked.clone();
    app.run_with(runtime, move |cfg| {
        assert_eq!(cfg.display_mode, DisplayMode::FlipFullElapsed);
        Ok(backend)
    })
    .unwrap();

    assert_eq!(asked.lock().unwrap().len(), 2);
    assert!(device.restarts().is_empty());
    let cached = fs::read_to_string(dir.path().join("data").join(HISTORY_FILE)).unwrap();
    assert!(cached.starts_with(&format!("{NOON}:112")), "{cached}");
    assert_eq!(handles.indicator.zones(), [Rgb::BLACK; 3]);
    assert_eq!(handles.vibrator.history().last(), Some(&0));
}

#[test]
fn absent_units_are_reported_once_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("glucoframe.log");
    let logger = Logger::new(LogLevel::Info, Some(log_path.display().to_string()));
    let app_config = AppConfig {
        configured: false,
        ..settings(&dir)
    };
    let app = App::new(app_config, logger);

    let caps = Capabilities {
        supports_rotation: true,
        has_env_sensor: false,
        has_rgb_indicator: false,
    };
    let (hardware, _handles) = sim::simulated(caps, 80, None);
    let device = SimDeviceControl::new();
    let runtime = Runtime {
        hardware,
        clock: Arc::new(ManualClock::new(NOON + 60)),
        device: Arc::new(device.clone()),
        running: Arc::new(AtomicBool::new(true)),
        intervals: fast_inputs(),
    };
    let err = app
        .run_with(runtime, |_| -> glucoframe::Result<ScriptedBackend> {
            panic!("must not connect before setup")
        })
        .unwrap_err();
    assert!(matches!(err, Error::NeedsSetup(_)), "{err}");

    let log = fs::read_to_string(&log_path).unwrap();
    assert_eq!(log.matches("RGB indicator not found").count(), 1, "{log}");
    assert_eq!(log.matches("environment sensor not found").count(), 1, "{log}");
    assert!(!log.contains("vibration motor not found"), "{log}");
}

#[test]
fn from_options_creates_a_default_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    let opts = RunOptions {
        config_path: Some(path.display().to_string()),
        data_dir: Some(dir.path().join("data").display().to_string()),
        ..RunOptions::default()
    };
    let app = App::from_options(opts).unwrap();
    assert!(path.exists());
    assert_eq!(app.config().setup_problem(), Some("device is not configured"));
    assert!(app.corrections().is_empty());
}

#[test]
fn from_options_rejects_unknown_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "api_endpoint = \"http://x\"\nbaud = 9600\n").unwrap();
    let opts = RunOptions {
        config_path: Some(path.display().to_string()),
        ..RunOptions::default()
    };
    let err = App::from_options(opts).err().unwrap();
    assert!(format!("{err}").contains("line 2"), "{err}");
}

#[test]
fn from_options_reports_threshold_corrections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let file = Config {
        max: 90,
        data_dir: Some(dir.path().join("data").display().to_string()),
        ..Config::default()
    };
    file.save_to_path(&path).unwrap();
    let opts = RunOptions {
        config_path: Some(path.display().to_string()),
        ..RunOptions::default()
    };
    let app = App::from_options(opts).unwrap();
    let fields: Vec<&str> = app.corrections().iter().map(|c| c.field).collect();
    assert_eq!(fields, vec!["max"]);
    assert_eq!(app.config().thresholds.max, 100);
}
