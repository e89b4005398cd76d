//! Narrow seams for the physical peripherals around the screen.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::display::layout::EnvSnapshot;
use crate::display::{Rgb, Surface};
use crate::Result;

pub mod sim;

pub trait BatteryMonitor: Send + Sync {
    /// Percent, or a negative value when the gauge cannot be read.
    fn level(&self) -> i32;
    fn is_charging(&self) -> bool;
}

pub trait EnvSensor: Send + Sync {
    fn read(&self) -> Result<EnvSnapshot>;
}

/// Three-zone RGB strip.
pub trait Indicator: Send {
    fn set_color(&mut self, zone: u8, color: Rgb) -> Result<()>;
}

pub trait Vibrator: Send {
    /// 0 stops the motor.
    fn set(&mut self, intensity: u8) -> Result<()>;
}

pub trait Accelerometer: Send + Sync {
    /// Acceleration along the y axis in g.
    fn accel_y(&self) -> Result<f32>;
}

pub trait TouchPanel: Send {
    /// Coordinates of the current touch, if any.
    fn poll(&mut self) -> Option<(i32, i32)>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    A,
    B,
    C,
}

pub trait Buttons: Send {
    /// Next pending press, if any.
    fn poll(&mut self) -> Option<Button>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    Watchdog,
    Reconfigure,
    InvalidConfig,
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RestartReason::Watchdog => "backend watchdog expired",
            RestartReason::Reconfigure => "reconfiguration requested",
            RestartReason::InvalidConfig => "invalid configuration",
        })
    }
}

pub trait DeviceControl: Send + Sync {
    fn restart(&self, reason: RestartReason) -> Result<()>;
}

/// Which optional features this device variant has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_rotation: bool,
    pub has_env_sensor: bool,
    pub has_rgb_indicator: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supports_rotation: true,
            has_env_sensor: false,
            has_rgb_indicator: true,
        }
    }
}

/// The peripherals handed to the app at startup. Missing ones are `None`.
pub struct Hardware {
    pub surface: Box<dyn Surface>,
    pub battery: Box<dyn BatteryMonitor>,
    pub env: Option<Box<dyn EnvSensor>>,
    pub indicator: Option<Box<dyn Indicator>>,
    pub vibrator: Option<Box<dyn Vibrator>>,
    pub accelerometer: Option<Box<dyn Accelerometer>>,
    pub touch: Option<Box<dyn TouchPanel>>,
    pub buttons: Option<Box<dyn Buttons>>,
}

impl Hardware {
    /// Hand the surface to the presenter, outputs to the shared context and inputs to the pollers.
    pub fn split(self) -> (Box<dyn Surface>, Peripherals, InputDevices) {
        let peripherals = Peripherals {
            battery: self.battery,
            env: self.env,
            indicator: self.indicator.map(Mutex::new),
            vibrator: self.vibrator.map(Mutex::new),
        };
        let inputs = InputDevices {
            accelerometer: self.accelerometer,
            touch: self.touch,
            buttons: self.buttons,
        };
        (self.surface, peripherals, inputs)
    }
}

/// Outputs and sensors shared between threads.
pub struct Peripherals {
    pub battery: Box<dyn BatteryMonitor>,
    pub env: Option<Box<dyn EnvSensor>>,
    indicator: Option<Mutex<Box<dyn Indicator>>>,
    vibrator: Option<Mutex<Box<dyn Vibrator>>>,
}

impl Peripherals {
    pub fn has_indicator(&self) -> bool {
        self.indicator.is_some()
    }

    /// Names of the optional outputs and sensors this device came up without.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.has_indicator() {
            missing.push("RGB indicator");
        }
        if self.env.is_none() {
            missing.push("environment sensor");
        }
        if self.vibrator.is_none() {
            missing.push("vibration motor");
        }
        missing
    }

    /// No-op without an indicator.
    pub fn set_zone(&self, zone: u8, color: Rgb) -> Result<()> {
        match &self.indicator {
            Some(indicator) => lock(indicator).set_color(zone, color),
            None => Ok(()),
        }
    }

    pub fn set_zones(&self, colors: [Rgb; 3]) -> Result<()> {
        let Some(indicator) = &self.indicator else {
            return Ok(());
        };
        let mut indicator = lock(indicator);
        for (zone, color) in (0u8..).zip(colors) {
            indicator.set_color(zone, color)?;
        }
        Ok(())
    }

    /// No-op without a motor.
    pub fn vibrate(&self, intensity: u8) -> Result<()> {
        match &self.vibrator {
            Some(vibrator) => lock(vibrator).set(intensity),
            None => Ok(()),
        }
    }
}

/// Sources polled by the input threads.
pub struct InputDevices {
    pub accelerometer: Option<Box<dyn Accelerometer>>,
    pub touch: Option<Box<dyn TouchPanel>>,
    pub buttons: Option<Box<dyn Buttons>>,
}

fn lock<T: ?Sized>(mutex: &Mutex<Box<T>>) -> MutexGuard<'_, Box<T>> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
