use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError};

use crate::alarm::{AlarmController, AlarmPhase, AlarmState, TickOutcome, VIBRATION_INTENSITY};
use crate::display::Rgb;
use crate::{Error, Result};

use super::context::AppContext;
use super::events::AlarmCommand;

/// Cadence of the indicator rotation while alerting.
pub const ALARM_TICK: Duration = Duration::from_secs(1);

/// Turns the shared emergency flag into indicator, vibration and log output.
pub struct AlarmMonitor {
    ctx: Arc<AppContext>,
    controller: AlarmController,
}

impl AlarmMonitor {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            ctx,
            controller: AlarmController::new(),
        }
    }

    pub fn state(&self) -> AlarmState {
        self.controller.state()
    }

    /// One monitor cycle: follow the emergency flag and, while alerting, advance the indicator.
    pub fn step(&mut self) -> Option<TickOutcome> {
        let now = self.ctx.clock.now_utc();
        let previous = self.controller.phase();
        let phase = self.controller.update(self.ctx.is_emergency(), now);
        if phase == AlarmPhase::Idle {
            if previous == AlarmPhase::Alerting {
                self.ctx.logger.info("emergency cleared");
            }
            return None;
        }
        let cause = self.ctx.emergency_cause();
        if previous == AlarmPhase::Idle {
            self.ctx
                .logger
                .warn(format!("emergency: {}", cause.describe()));
        }

        let beep_allowed = self.controller.needs_beeper_check() && self.beeper_allowed();
        let outcome = self.controller.tick(beep_allowed, cause)?;
        self.show(&outcome);
        if outcome.fire {
            self.pulse();
        }
        Some(outcome)
    }

    pub fn handle(&mut self, command: AlarmCommand) {
        match command {
            AlarmCommand::Acknowledge { at } => {
                if self.controller.acknowledge(at, true) {
                    self.ctx.logger.debug("alarm snoozed");
                }
            }
            AlarmCommand::Stop => {}
        }
    }

    /// Tick every second and apply commands as they arrive, until `Stop` or disconnect.
    pub fn run(mut self, commands: Receiver<AlarmCommand>) {
        loop {
            match commands.recv_timeout(ALARM_TICK) {
                Ok(AlarmCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => {
                    if self.ctx.is_shutting_down() {
                        continue;
                    }
                    self.step();
                }
            }
        }
    }

    fn beeper_allowed(&self) -> bool {
        let battery = self.ctx.peripherals.battery.level();
        match self.ctx.settings.beeper.evaluate(
            battery,
            self.ctx.clock.as_ref(),
            &self.ctx.settings.timezone,
        ) {
            Ok(allowed) => allowed,
            Err(err) => {
                self.ctx
                    .logger
                    .warn(format!("beeper suppressed, local time unusable: {err}"));
                false
            }
        }
    }

    fn show(&self, outcome: &TickOutcome) {
        let result = self
            .ctx
            .peripherals
            .set_zone(outcome.dark_zone, Rgb::BLACK)
            .and_then(|()| {
                self.ctx
                    .peripherals
                    .set_zone(outcome.lit_zone, outcome.color)
            });
        if let Err(err) = result {
            self.ctx.logger.warn(format!("indicator update failed: {err}"));
        }
    }

    fn pulse(&self) {
        self.ctx.logger.info("alarm: vibrating");
        let result = self
            .ctx
            .peripherals
            .vibrate(VIBRATION_INTENSITY)
            .and_then(|()| {
                thread::sleep(self.ctx.settings.vibration);
                self.ctx.peripherals.vibrate(0)
            });
        if let Err(err) = result {
            self.ctx.logger.warn(format!("vibration failed: {err}"));
        }
    }
}

pub fn spawn_alarm_monitor(
    monitor: AlarmMonitor,
    commands: Receiver<AlarmCommand>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("glucoframe-alarm".into())
        .spawn(move || monitor.run(commands))
        .map_err(Error::Io)
}
