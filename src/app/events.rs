use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{Receiver, Sender};

use crate::config::Config;
use crate::display::{Banner, LockMode, RenderOutcome};
use crate::hardware::{Button, RestartReason};
use crate::{Error, Result};

use super::context::AppContext;

/// Everything the input pollers report, consumed by a single dispatcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Button(Button),
    /// Accelerometer y axis in g.
    Tilt(f32),
    ClockTick,
    Shutdown,
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Button(_) => "button",
            Event::Tilt(_) => "tilt",
            Event::ClockTick => "clock",
            Event::Shutdown => "shutdown",
        }
    }
}

/// Requests sent to the alarm monitor thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmCommand {
    Acknowledge { at: i64 },
    Stop,
}

pub struct Dispatcher {
    ctx: Arc<AppContext>,
    alarm: Sender<AlarmCommand>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<AppContext>, alarm: Sender<AlarmCommand>) -> Self {
        Self { ctx, alarm }
    }

    /// Returns false once the queue should no longer be read.
    pub fn handle(&self, event: Event) -> bool {
        self.ctx.logger.trace(format!("event: {}", event.kind()));
        match event {
            Event::Button(Button::A) | Event::Button(Button::C) => self.on_primary_button(),
            Event::Button(Button::B) => self.on_reconfigure(),
            Event::Tilt(y) => self.on_tilt(y),
            Event::ClockTick => self.on_clock_tick(),
            Event::Shutdown => return false,
        }
        true
    }

    pub fn run(&self, events: Receiver<Event>) {
        while let Ok(event) = events.recv() {
            if !self.handle(event) {
                break;
            }
        }
    }

    /// A and C acknowledge a raised alarm; otherwise they step the brightness.
    fn on_primary_button(&self) {
        let now = self.ctx.clock.now_utc();
        if self.ctx.acknowledge(now) {
            if let Err(err) = self.alarm.send(AlarmCommand::Acknowledge { at: now }) {
                self.ctx
                    .logger
                    .error(format!("alarm monitor did not take the acknowledgement: {err}"));
            }
            if let Err(err) = self.ctx.render_latest(false, LockMode::TryLock) {
                self.ctx.logger.error(format!("render failed: {err}"));
            }
            return;
        }
        if let Err(err) = self.ctx.cycle_brightness() {
            self.ctx
                .logger
                .error(format!("failed to change brightness: {err}"));
        }
    }

    /// B sends the device back through setup.
    fn on_reconfigure(&self) {
        self.ctx.logger.info("reconfiguration requested");
        if let Err(err) = self.ctx.update_config(|cfg: &mut Config| cfg.configured = false) {
            self.ctx
                .logger
                .error(format!("failed to clear configured flag: {err}"));
        }
        self.ctx.show_banner(Banner::Restarting);
        self.ctx.restart(RestartReason::Reconfigure);
    }

    fn on_tilt(&self, accel_y: f32) {
        if !self.ctx.settings.capabilities.supports_rotation {
            return;
        }
        let current = self.ctx.mode();
        let next = current.tilt(accel_y);
        if next == current {
            return;
        }
        self.ctx.logger.debug(format!("orientation: {current} -> {next}"));
        self.ctx.set_mode(next);
        if let Err(err) = self.ctx.render_latest(false, LockMode::TryLock) {
            self.ctx.logger.error(format!("render failed: {err}"));
        }
    }

    fn on_clock_tick(&self) {
        if self.ctx.is_shutting_down() {
            return;
        }
        match self
            .ctx
            .presenter
            .render_clock(self.ctx.clock_text().as_deref())
        {
            Ok(RenderOutcome::Rendered) => {}
            Ok(RenderOutcome::Skipped) => self.ctx.logger.trace("clock skipped: display locked"),
            Err(err) => self.ctx.logger.warn(format!("clock render failed: {err}")),
        }
    }
}

/// Run `dispatcher` on its own thread until `Event::Shutdown` or every sender is gone.
pub fn spawn_dispatcher(dispatcher: Dispatcher, events: Receiver<Event>) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("glucoframe-events".into())
        .spawn(move || dispatcher.run(events))
        .map_err(Error::Io)
}
