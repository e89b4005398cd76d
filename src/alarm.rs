use chrono::{NaiveTime, Timelike};

use crate::classify::EmergencyCause;
use crate::clock::{Clock, Timezone};
use crate::config::parse_beeper_time;
use crate::display::Rgb;
use crate::{Error, Result};

/// Seconds an acknowledged alarm stays silent.
pub const SNOOZE_SECS: i64 = 1800;
pub const INDICATOR_ZONES: u8 = 3;
/// Vibration strength used for the once-per-episode alert (0-255).
pub const VIBRATION_INTENSITY: u8 = 128;
const BEEPER_BATTERY_FLOOR: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlarmPhase {
    #[default]
    Idle,
    Alerting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlarmState {
    pub phase: AlarmPhase,
    pub color_index: u8,
    pub snooze_until: i64,
    pub fired_this_episode: bool,
}

/// One step of the indicator rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub dark_zone: u8,
    pub lit_zone: u8,
    pub color: Rgb,
    pub fire: bool,
}

#[derive(Debug, Default)]
pub struct AlarmController {
    state: AlarmState,
}

impl AlarmController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    pub fn phase(&self) -> AlarmPhase {
        self.state.phase
    }

    pub fn is_snoozed(&self, now: i64) -> bool {
        now < self.state.snooze_until
    }

    pub fn update(&mut self, is_emergency: bool, now: i64) -> AlarmPhase {
        match self.state.phase {
            AlarmPhase::Idle if is_emergency && !self.is_snoozed(now) => {
                self.state.phase = AlarmPhase::Alerting;
            }
            AlarmPhase::Alerting if !is_emergency => self.reset_episode(),
            _ => {}
        }
        self.state.phase
    }

    /// Snooze the alarm. Returns false when there was nothing to acknowledge.
    pub fn acknowledge(&mut self, now: i64, emergency_flagged: bool) -> bool {
        if self.state.phase != AlarmPhase::Alerting && !emergency_flagged {
            return false;
        }
        self.state.snooze_until = now + SNOOZE_SECS;
        self.reset_episode();
        true
    }

    /// Advance the LED rotation; `None` while idle.
    pub fn tick(&mut self, beep_allowed: bool, cause: EmergencyCause) -> Option<TickOutcome> {
        if self.state.phase != AlarmPhase::Alerting {
            return None;
        }
        let lit_zone = self.state.color_index;
        let dark_zone = (lit_zone + INDICATOR_ZONES - 1) % INDICATOR_ZONES;
        self.state.color_index = (lit_zone + 1) % INDICATOR_ZONES;

        let fire = beep_allowed && !self.state.fired_this_episode;
        if fire {
            self.state.fired_this_episode = true;
        }
        Some(TickOutcome {
            dark_zone,
            lit_zone,
            color: alert_color(cause),
            fire,
        })
    }

    pub fn rearm(&mut self) {
        self.state.fired_this_episode = false;
    }

    pub fn needs_beeper_check(&self) -> bool {
        self.state.phase == AlarmPhase::Alerting && !self.state.fired_this_episode
    }

    fn reset_episode(&mut self) {
        self.state.phase = AlarmPhase::Idle;
        self.state.color_index = 0;
        self.state.fired_this_episode = false;
    }
}

pub fn alert_color(cause: EmergencyCause) -> Rgb {
    match cause {
        EmergencyCause::GlucoseHigh => Rgb::ORANGE,
        _ => Rgb::RED,
    }
}

/// Daily window in local time during which the physical alert may fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeeperWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl BeeperWindow {
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Ok(Self {
            start: parse_beeper_time(start).map_err(Error::Config)?,
            end: parse_beeper_time(end).map_err(Error::Config)?,
        })
    }

    /// Exclusive at both ends; wraps past midnight when `start >= end`.
    pub fn allows(&self, now: NaiveTime) -> bool {
        let c = now.with_nanosecond(0).unwrap_or(now);
        if self.start < self.end {
            self.start < c && c < self.end
        } else {
            c > self.start || c < self.end
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeeperPolicy {
    pub enabled: bool,
    pub window: BeeperWindow,
}

impl BeeperPolicy {
    /// Errors when the local time cannot be trusted; callers treat that as "do not beep".
    pub fn evaluate(&self, battery_level: i32, clock: &dyn Clock, tz: &Timezone) -> Result<bool> {
        if !self.enabled || battery_level < BEEPER_BATTERY_FLOOR {
            return Ok(false);
        }
        let local = clock.local_now(tz)?;
        Ok(self.window.allows(local.time()))
    }
}
