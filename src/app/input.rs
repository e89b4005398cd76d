use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender};

use crate::hardware::{Accelerometer, Button, Buttons, InputDevices, TouchPanel};
use crate::{Error, Result};

use super::events::Event;
use super::Logger;

/// Poll periods for the input threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputIntervals {
    pub touch: Duration,
    pub buttons: Duration,
    pub accelerometer: Duration,
    pub clock: Duration,
}

impl Default for InputIntervals {
    fn default() -> Self {
        Self {
            touch: Duration::from_millis(100),
            buttons: Duration::from_millis(50),
            accelerometer: Duration::from_millis(500),
            clock: Duration::from_secs(1),
        }
    }
}

/// Map a touch to the button printed under it.
pub fn touch_button(x: i32, y: i32) -> Button {
    let bottom_row = (240..=280).contains(&y);
    if bottom_row && (120..=160).contains(&x) {
        Button::B
    } else if bottom_row && (240..=280).contains(&x) {
        Button::C
    } else {
        Button::A
    }
}

/// Keeps the poller threads alive until dropped or stopped.
pub struct InputHandle {
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl InputHandle {
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Stop every poller and wait for it to exit.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for InputHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Spawn one poller per present device, plus the clock tick.
pub fn spawn_inputs(
    devices: InputDevices,
    events: Sender<Event>,
    intervals: InputIntervals,
    rotation: bool,
    logger: Logger,
) -> Result<InputHandle> {
    let running = Arc::new(AtomicBool::new(true));
    let mut threads = Vec::new();

    if let Some(touch) = devices.touch {
        threads.push(spawn_touch(touch, events.clone(), intervals.touch, running.clone())?);
    } else {
        logger.info("no touch panel; touch input disabled");
    }
    if let Some(buttons) = devices.buttons {
        threads.push(spawn_buttons(buttons, events.clone(), intervals.buttons, running.clone())?);
    }
    match devices.accelerometer {
        Some(accel) if rotation => threads.push(spawn_accelerometer(
            accel,
            events.clone(),
            intervals.accelerometer,
            running.clone(),
            logger.clone(),
        )?),
        Some(_) => logger.debug("rotation disabled; accelerometer ignored"),
        None => logger.info("no accelerometer; orientation fixed"),
    }
    threads.push(spawn_clock(events, intervals.clock, running.clone())?);

    Ok(InputHandle { running, threads })
}

fn spawn_named(name: &str, body: impl FnOnce() + Send + 'static) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(name.into())
        .spawn(body)
        .map_err(Error::Io)
}

/// Emits one press per touch, not one per poll while the finger stays down.
fn spawn_touch(
    mut touch: Box<dyn TouchPanel>,
    events: Sender<Event>,
    interval: Duration,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    spawn_named("glucoframe-touch", move || {
        let mut touching = false;
        while running.load(Ordering::SeqCst) {
            match touch.poll() {
                Some((x, y)) if !touching => {
                    touching = true;
                    if events.send(Event::Button(touch_button(x, y))).is_err() {
                        break;
                    }
                }
                Some(_) => {}
                None => touching = false,
            }
            thread::sleep(interval);
        }
    })
}

fn spawn_buttons(
    mut buttons: Box<dyn Buttons>,
    events: Sender<Event>,
    interval: Duration,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    spawn_named("glucoframe-buttons", move || {
        while running.load(Ordering::SeqCst) {
            while let Some(button) = buttons.poll() {
                if events.send(Event::Button(button)).is_err() {
                    return;
                }
            }
            thread::sleep(interval);
        }
    })
}

fn spawn_accelerometer(
    accel: Box<dyn Accelerometer>,
    events: Sender<Event>,
    interval: Duration,
    running: Arc<AtomicBool>,
    logger: Logger,
) -> Result<JoinHandle<()>> {
    spawn_named("glucoframe-accel", move || {
        let mut warned = false;
        while running.load(Ordering::SeqCst) {
            match accel.accel_y() {
                Ok(y) => {
                    if events.send(Event::Tilt(y)).is_err() {
                        break;
                    }
                }
                Err(err) if !warned => {
                    warned = true;
                    logger.warn(format!("accelerometer read failed: {err}"));
                }
                Err(_) => {}
            }
            thread::sleep(interval);
        }
    })
}

fn spawn_clock(events: Sender<Event>, interval: Duration, running: Arc<AtomicBool>) -> Result<JoinHandle<()>> {
    spawn_named("glucoframe-clock", move || {
        let ticker = channel::tick(interval);
        while running.load(Ordering::SeqCst) {
            if ticker.recv().is_err() || events.send(Event::ClockTick).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::sim::{SimAccelerometer, SimButtons, SimTouch};
    use std::time::Instant;

    #[test]
    fn touch_zones_map_to_buttons() {
        assert_eq!(touch_button(130, 250), Button::B);
        assert_eq!(touch_button(120, 240), Button::B);
        assert_eq!(touch_button(160, 280), Button::B);
        assert_eq!(touch_button(250, 270), Button::C);
        assert_eq!(touch_button(161, 250), Button::A);
        assert_eq!(touch_button(130, 239), Button::A);
        assert_eq!(touch_button(10, 10), Button::A);
    }

    fn fast() -> InputIntervals {
        InputIntervals {
            touch: Duration::from_millis(5),
            buttons: Duration::from_millis(5),
            accelerometer: Duration::from_millis(5),
            clock: Duration::from_millis(20),
        }
    }

    #[test]
    fn pollers_feed_the_event_queue() {
        let touch = SimTouch::new();
        let buttons = SimButtons::new();
        let accel = SimAccelerometer::level();
        accel.set_y(-0.5);
        touch.push(250, 250);
        buttons.press(Button::B);
        let devices = InputDevices {
            accelerometer: Some(Box::new(accel)),
            touch: Some(Box::new(touch)),
            buttons: Some(Box::new(buttons)),
        };
        let (tx, rx) = channel::unbounded();
        let handle = spawn_inputs(devices, tx, fast(), true, Logger::silent()).unwrap();
        assert_eq!(handle.len(), 4);

        let mut seen = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Ok(event) = rx.recv_timeout(Duration::from_millis(50)) {
                seen.push(event);
            }
            let has = |want: &Event| seen.iter().any(|e| e == want);
            if has(&Event::Button(Button::C))
                && has(&Event::Button(Button::B))
                && has(&Event::Tilt(-0.5))
                && has(&Event::ClockTick)
            {
                break;
            }
        }
        handle.stop();
        assert!(seen.contains(&Event::Button(Button::C)), "{seen:?}");
        assert!(seen.contains(&Event::Button(Button::B)), "{seen:?}");
        assert!(seen.contains(&Event::Tilt(-0.5)), "{seen:?}");
        assert!(seen.contains(&Event::ClockTick), "{seen:?}");
    }

    #[test]
    fn rotation_disabled_skips_the_accelerometer() {
        let devices = InputDevices {
            accelerometer: Some(Box::new(SimAccelerometer::level())),
            touch: None,
            buttons: None,
        };
        let (tx, _rx) = channel::unbounded();
        let handle = spawn_inputs(devices, tx, fast(), false, Logger::silent()).unwrap();
        assert_eq!(handle.len(), 1);
        handle.stop();
    }
}
