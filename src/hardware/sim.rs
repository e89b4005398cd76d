//! In-process peripherals so the daemon and the tests run without a device.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    Accelerometer, BatteryMonitor, Button, Buttons, Capabilities, DeviceControl, EnvSensor,
    Hardware, Indicator, RestartReason, TouchPanel, Vibrator,
};
use crate::display::layout::EnvSnapshot;
use crate::display::surface::{RecordingSurface, SurfaceLog};
use crate::display::Rgb;
use crate::{Error, Result};

/// Draw operations kept by the host surface.
const HOST_SURFACE_LOG_LIMIT: usize = 512;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone)]
pub struct SimBattery {
    level: Arc<AtomicI32>,
    charging: Arc<AtomicBool>,
}

impl SimBattery {
    pub fn new(level: i32) -> Self {
        Self {
            level: Arc::new(AtomicI32::new(level)),
            charging: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_level(&self, level: i32) {
        self.level.store(level, Ordering::SeqCst);
    }

    pub fn set_charging(&self, charging: bool) {
        self.charging.store(charging, Ordering::SeqCst);
    }
}

impl BatteryMonitor for SimBattery {
    fn level(&self) -> i32 {
        self.level.load(Ordering::SeqCst)
    }

    fn is_charging(&self) -> bool {
        self.charging.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct SimEnv {
    snapshot: Option<EnvSnapshot>,
}

impl SimEnv {
    pub fn fixed(snapshot: EnvSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
        }
    }

    /// A sensor that is wired up but never answers.
    pub fn failing() -> Self {
        Self { snapshot: None }
    }
}

impl EnvSensor for SimEnv {
    fn read(&self) -> Result<EnvSnapshot> {
        self.snapshot
            .ok_or_else(|| Error::Io(std::io::Error::other("environment sensor not responding")))
    }
}

#[derive(Debug, Clone)]
pub struct SimIndicator {
    zones: Arc<Mutex<[Rgb; 3]>>,
}

impl Default for SimIndicator {
    fn default() -> Self {
        Self {
            zones: Arc::new(Mutex::new([Rgb::BLACK; 3])),
        }
    }
}

impl SimIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zones(&self) -> [Rgb; 3] {
        *lock(&self.zones)
    }
}

impl Indicator for SimIndicator {
    fn set_color(&mut self, zone: u8, color: Rgb) -> Result<()> {
        let mut zones = lock(&self.zones);
        let slot = zones
            .get_mut(zone as usize)
            .ok_or_else(|| Error::InvalidArgs(format!("indicator zone {zone} out of range")))?;
        *slot = color;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimVibrator {
    pulses: Arc<Mutex<Vec<u8>>>,
}

impl SimVibrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every intensity written so far, including the 0 that stops the motor.
    pub fn history(&self) -> Vec<u8> {
        lock(&self.pulses).clone()
    }
}

impl Vibrator for SimVibrator {
    fn set(&mut self, intensity: u8) -> Result<()> {
        lock(&self.pulses).push(intensity);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimAccelerometer {
    y_bits: Arc<AtomicU32>,
}

impl SimAccelerometer {
    pub fn level() -> Self {
        Self::default()
    }

    pub fn set_y(&self, y: f32) {
        self.y_bits.store(y.to_bits(), Ordering::SeqCst);
    }
}

impl Accelerometer for SimAccelerometer {
    fn accel_y(&self) -> Result<f32> {
        Ok(f32::from_bits(self.y_bits.load(Ordering::SeqCst)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimTouch {
    queue: Arc<Mutex<VecDeque<(i32, i32)>>>,
}

impl SimTouch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, x: i32, y: i32) {
        lock(&self.queue).push_back((x, y));
    }
}

impl TouchPanel for SimTouch {
    fn poll(&mut self) -> Option<(i32, i32)> {
        lock(&self.queue).pop_front()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimButtons {
    queue: Arc<Mutex<VecDeque<Button>>>,
}

impl SimButtons {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, button: Button) {
        lock(&self.queue).push_back(button);
    }
}

impl Buttons for SimButtons {
    fn poll(&mut self) -> Option<Button> {
        lock(&self.queue).pop_front()
    }
}

/// Records restart requests instead of acting on them.
#[derive(Debug, Clone, Default)]
pub struct SimDeviceControl {
    restarts: Arc<Mutex<Vec<RestartReason>>>,
}

impl SimDeviceControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restarts(&self) -> Vec<RestartReason> {
        lock(&self.restarts).clone()
    }
}

impl DeviceControl for SimDeviceControl {
    fn restart(&self, reason: RestartReason) -> Result<()> {
        lock(&self.restarts).push(reason);
        Ok(())
    }
}

/// Clones of every simulated peripheral, for poking at them from outside.
#[derive(Debug, Clone)]
pub struct SimHandles {
    pub surface: SurfaceLog,
    pub battery: SimBattery,
    pub indicator: SimIndicator,
    pub vibrator: SimVibrator,
    pub accelerometer: SimAccelerometer,
    pub touch: SimTouch,
    pub buttons: SimButtons,
}

/// A full peripheral set shaped by `caps`.
pub fn simulated(
    caps: Capabilities,
    battery_level: i32,
    env: Option<EnvSnapshot>,
) -> (Hardware, SimHandles) {
    let surface = RecordingSurface::bounded(HOST_SURFACE_LOG_LIMIT);
    let handles = SimHandles {
        surface: surface.log(),
        battery: SimBattery::new(battery_level),
        indicator: SimIndicator::new(),
        vibrator: SimVibrator::new(),
        accelerometer: SimAccelerometer::level(),
        touch: SimTouch::new(),
        buttons: SimButtons::new(),
    };
    let env = if caps.has_env_sensor {
        let sensor = env.map(SimEnv::fixed).unwrap_or_else(SimEnv::failing);
        Some(Box::new(sensor) as Box<dyn EnvSensor>)
    } else {
        None
    };
    let indicator: Option<Box<dyn Indicator>> = if caps.has_rgb_indicator {
        Some(Box::new(handles.indicator.clone()))
    } else {
        None
    };
    let hardware = Hardware {
        surface: Box::new(surface),
        battery: Box::new(handles.battery.clone()),
        env,
        indicator,
        vibrator: Some(Box::new(handles.vibrator.clone())),
        accelerometer: Some(Box::new(handles.accelerometer.clone())),
        touch: Some(Box::new(handles.touch.clone())),
        buttons: Some(Box::new(handles.buttons.clone())),
    };
    (hardware, handles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_rejects_unknown_zone() {
        let mut indicator = SimIndicator::new();
        indicator.set_color(1, Rgb::RED).unwrap();
        assert!(indicator.set_color(3, Rgb::RED).is_err());
        assert_eq!(indicator.zones(), [Rgb::BLACK, Rgb::RED, Rgb::BLACK]);
    }

    #[test]
    fn queues_drain_in_order() {
        let mut buttons = SimButtons::new();
        buttons.press(Button::A);
        buttons.press(Button::B);
        assert_eq!(buttons.poll(), Some(Button::A));
        assert_eq!(buttons.poll(), Some(Button::B));
        assert_eq!(buttons.poll(), None);
    }

    #[test]
    fn capabilities_shape_the_peripheral_set() {
        let caps = Capabilities {
            supports_rotation: true,
            has_env_sensor: false,
            has_rgb_indicator: false,
        };
        let (hardware, handles) = simulated(caps, 55, None);
        assert!(hardware.env.is_none());
        assert!(hardware.indicator.is_none());
        assert_eq!(hardware.battery.level(), 55);
        handles.battery.set_level(7);
        assert_eq!(hardware.battery.level(), 7);
    }

    #[test]
    fn split_peripherals_drive_the_shared_handles() {
        let (hardware, handles) = simulated(Capabilities::default(), 80, None);
        let (_surface, peripherals, inputs) = hardware.split();
        assert!(peripherals.has_indicator());
        peripherals
            .set_zones([Rgb::BLACK, Rgb::DARKGREEN, Rgb::BLACK])
            .unwrap();
        peripherals.vibrate(128).unwrap();
        peripherals.vibrate(0).unwrap();
        assert_eq!(handles.indicator.zones()[1], Rgb::DARKGREEN);
        assert_eq!(handles.vibrator.history(), vec![128, 0]);

        handles.touch.push(130, 250);
        let mut touch = inputs.touch.unwrap();
        assert_eq!(touch.poll(), Some((130, 250)));
    }

    #[test]
    fn split_reports_absent_units() {
        let caps = Capabilities {
            supports_rotation: true,
            has_env_sensor: false,
            has_rgb_indicator: false,
        };
        let (hardware, _handles) = simulated(caps, 80, None);
        let (_surface, peripherals, _inputs) = hardware.split();
        assert!(!peripherals.has_indicator());
        assert_eq!(peripherals.missing(), vec!["RGB indicator", "environment sensor"]);
        // outputs stay harmless without the unit
        peripherals.set_zones([Rgb::RED; 3]).unwrap();

        let full = Capabilities {
            supports_rotation: true,
            has_env_sensor: true,
            has_rgb_indicator: true,
        };
        let (hardware, _handles) = simulated(full, 80, None);
        assert!(hardware.split().1.missing().is_empty());
    }

    #[test]
    fn device_control_records_reasons() {
        let device = SimDeviceControl::new();
        device.restart(RestartReason::Reconfigure).unwrap();
        assert_eq!(device.restarts(), vec![RestartReason::Reconfigure]);
    }

    #[test]
    fn accelerometer_reports_last_value() {
        let accel = SimAccelerometer::level();
        assert_eq!(accel.accel_y().unwrap(), 0.0);
        accel.set_y(-0.4);
        assert_eq!(accel.accel_y().unwrap(), -0.4);
    }
}
