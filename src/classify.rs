use crate::config::Thresholds;
use crate::display::Rgb;
use crate::reading::{Reading, TrendDirection};

/// Battery percentage below which staleness is not trusted.
pub const STALE_BATTERY_FLOOR: i32 = 5;
const LOW_BATTERY_LEVEL: i32 = 10;
const LOW_BATTERY_MIN_UPTIME_SECS: i64 = 300;
const TREND_MARGIN: i32 = 10;
const DOUBLE_TREND_MARGIN: i32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundColor {
    Normal,
    CautionLow,
    CautionHigh,
    Emergency,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrowColor {
    Normal,
    Warn,
    Danger,
}

/// The classification rule that matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlucoseBand {
    Stale,
    UrgentLow,
    LowRising,
    Low,
    InRange,
    HighFalling,
    High,
    UrgentHigh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmergencyCause {
    #[default]
    None,
    GlucoseLow,
    GlucoseHigh,
    LowBattery,
    StaleData,
}

impl EmergencyCause {
    pub fn as_u8(self) -> u8 {
        match self {
            EmergencyCause::None => 0,
            EmergencyCause::GlucoseLow => 1,
            EmergencyCause::GlucoseHigh => 2,
            EmergencyCause::LowBattery => 3,
            EmergencyCause::StaleData => 4,
        }
    }

    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => EmergencyCause::GlucoseLow,
            2 => EmergencyCause::GlucoseHigh,
            3 => EmergencyCause::LowBattery,
            4 => EmergencyCause::StaleData,
            _ => EmergencyCause::None,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            EmergencyCause::None => "none",
            EmergencyCause::GlucoseLow => "glucose below emergency minimum",
            EmergencyCause::GlucoseHigh => "glucose above emergency maximum",
            EmergencyCause::LowBattery => "low battery",
            EmergencyCause::StaleData => "stale data",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifyContext {
    pub now: i64,
    /// Percent; negative when unknown.
    pub battery_level: i32,
    pub uptime_secs: i64,
    pub charging: bool,
    pub emergency_pause_until: i64,
}

impl ClassifyContext {
    fn pause_elapsed(&self) -> bool {
        self.now > self.emergency_pause_until
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub background: BackgroundColor,
    pub arrow: ArrowColor,
    pub is_emergency: bool,
    pub band: GlucoseBand,
    pub cause: EmergencyCause,
    pub is_stale: bool,
    pub force_redraw: bool,
    pub force_battery_mode: bool,
}

impl Classification {
    pub fn background_rgb(&self) -> Rgb {
        match self.background {
            BackgroundColor::Normal => Rgb::DARKGREEN,
            BackgroundColor::CautionLow => Rgb::RED,
            BackgroundColor::CautionHigh => Rgb::ORANGE,
            BackgroundColor::Emergency if self.band == GlucoseBand::UrgentHigh => Rgb::ORANGE,
            BackgroundColor::Emergency => Rgb::RED,
            BackgroundColor::Stale => Rgb::DARKGREY,
        }
    }

    /// `Normal` arrows take the panel colour.
    pub fn arrow_rgb(&self) -> Rgb {
        match self.arrow {
            ArrowColor::Normal => self.background_rgb(),
            ArrowColor::Warn => Rgb::ORANGE,
            ArrowColor::Danger => Rgb::RED,
        }
    }

    pub fn background_is_red(&self) -> bool {
        self.background_rgb() == Rgb::RED
    }
}

/// `now - ts > minutes * 60`, ignored when the battery is nearly flat.
pub fn is_older_than(ts: i64, minutes: i64, now: i64, battery_level: i32) -> bool {
    now - ts > minutes * 60 && battery_level >= STALE_BATTERY_FLOOR
}

pub fn classify(
    reading: &Reading,
    thresholds: &Thresholds,
    ctx: &ClassifyContext,
) -> Classification {
    let v = reading.glucose_value;
    let trend = reading.trend;
    let t = thresholds;
    let is_stale = is_older_than(
        reading.timestamp,
        t.stale_after_minutes,
        ctx.now,
        ctx.battery_level,
    );

    let (background, band, is_emergency) = if is_stale {
        (BackgroundColor::Stale, GlucoseBand::Stale, false)
    } else if v <= t.emergency_min {
        (BackgroundColor::Emergency, GlucoseBand::UrgentLow, ctx.pause_elapsed())
    } else if v >= t.min.saturating_sub(TREND_MARGIN) && v < t.min && trend.is_rising() {
        (BackgroundColor::Normal, GlucoseBand::LowRising, false)
    } else if v > t.emergency_min && v < t.min {
        (BackgroundColor::CautionLow, GlucoseBand::Low, false)
    } else if v >= t.min && v <= t.max {
        (BackgroundColor::Normal, GlucoseBand::InRange, false)
    } else if v > t.max && v <= t.max.saturating_add(TREND_MARGIN) && trend.is_falling() {
        (BackgroundColor::Normal, GlucoseBand::HighFalling, false)
    } else if v > t.max && v <= t.emergency_max {
        (BackgroundColor::CautionHigh, GlucoseBand::High, false)
    } else {
        (BackgroundColor::Emergency, GlucoseBand::UrgentHigh, ctx.pause_elapsed())
    };

    let mut out = Classification {
        background,
        arrow: if is_stale {
            ArrowColor::Normal
        } else {
            arrow_color(v, trend, t)
        },
        is_emergency,
        band,
        cause: match (is_emergency, band) {
            (true, GlucoseBand::UrgentLow) => EmergencyCause::GlucoseLow,
            (true, GlucoseBand::UrgentHigh) => EmergencyCause::GlucoseHigh,
            _ => EmergencyCause::None,
        },
        is_stale,
        force_redraw: false,
        force_battery_mode: false,
    };

    let low_battery = ctx.battery_level > 0
        && ctx.battery_level < LOW_BATTERY_LEVEL
        && ctx.uptime_secs > LOW_BATTERY_MIN_UPTIME_SECS
        && !ctx.charging
        && ctx.pause_elapsed();
    if low_battery {
        out.is_emergency = true;
        out.force_redraw = true;
        out.force_battery_mode = true;
        if out.cause == EmergencyCause::None {
            out.cause = EmergencyCause::LowBattery;
        }
    }

    let stale_emergency = ctx.pause_elapsed()
        && is_older_than(
            reading.timestamp,
            t.stale_emergency_after_minutes,
            ctx.now,
            ctx.battery_level,
        );
    if stale_emergency {
        out.is_emergency = true;
        out.force_redraw = true;
        if out.cause == EmergencyCause::None {
            out.cause = EmergencyCause::StaleData;
        }
    }

    out
}

fn arrow_color(v: i32, trend: TrendDirection, t: &Thresholds) -> ArrowColor {
    let near_max = |margin: i32| v.saturating_add(margin) >= t.max && v < t.max;
    let near_min = |margin: i32| v.saturating_sub(margin) <= t.min;
    match trend {
        TrendDirection::DoubleUp if near_max(DOUBLE_TREND_MARGIN) => ArrowColor::Warn,
        TrendDirection::DoubleUp if v >= t.max => ArrowColor::Danger,
        TrendDirection::DoubleDown if near_min(DOUBLE_TREND_MARGIN) => ArrowColor::Danger,
        _ if trend.is_rising() && near_max(TREND_MARGIN) => ArrowColor::Warn,
        _ if trend.is_falling() && near_min(TREND_MARGIN) => ArrowColor::Danger,
        _ => ArrowColor::Normal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_748_772_000;

    fn thresholds() -> Thresholds {
        Thresholds {
            min: 70,
            max: 180,
            emergency_min: 55,
            emergency_max: 250,
            stale_after_minutes: 20,
            stale_emergency_after_minutes: 30,
        }
    }

    fn ctx() -> ClassifyContext {
        ClassifyContext {
            now: NOW,
            battery_level: 80,
            uptime_secs: 1_000,
            charging: false,
            emergency_pause_until: 0,
        }
    }

    fn reading(value: i32, trend: TrendDirection) -> Reading {
        Reading::new(NOW - 60, value, trend, 0)
    }

    #[test]
    fn caution_low_is_not_an_emergency() {
        let c = classify(&reading(65, TrendDirection::Flat), &thresholds(), &ctx());
        assert_eq!(c.background, BackgroundColor::CautionLow);
        assert_eq!(c.band, GlucoseBand::Low);
        assert!(!c.is_emergency);
        assert_eq!(c.background_rgb(), Rgb::RED);
    }

    #[test]
    fn urgent_low_raises_emergency() {
        let c = classify(&reading(50, TrendDirection::Flat), &thresholds(), &ctx());
        assert_eq!(c.background, BackgroundColor::Emergency);
        assert!(c.is_emergency);
        assert_eq!(c.cause, EmergencyCause::GlucoseLow);
    }

    #[test]
    fn emergency_minimum_is_inclusive() {
        let c = classify(&reading(55, TrendDirection::Flat), &thresholds(), &ctx());
        assert_eq!(c.band, GlucoseBand::UrgentLow);
        let c = classify(&reading(250, TrendDirection::Flat), &thresholds(), &ctx());
        assert_eq!(c.band, GlucoseBand::High);
        let c = classify(&reading(251, TrendDirection::Flat), &thresholds(), &ctx());
        assert_eq!(c.band, GlucoseBand::UrgentHigh);
        assert_eq!(c.cause, EmergencyCause::GlucoseHigh);
        assert_eq!(c.background_rgb(), Rgb::ORANGE);
    }

    #[test]
    fn old_reading_is_stale_but_quiet() {
        let r = Reading::new(NOW - 25 * 60, 120, TrendDirection::Flat, 0);
        let c = classify(&r, &thresholds(), &ctx());
        assert_eq!(c.background, BackgroundColor::Stale);
        assert!(c.is_stale);
        assert!(!c.is_emergency);
        assert_eq!(c.arrow, ArrowColor::Normal);
    }

    #[test]
    fn very_old_reading_raises_stale_emergency() {
        let r = Reading::new(NOW - 40 * 60, 120, TrendDirection::Flat, 0);
        let c = classify(&r, &thresholds(), &ctx());
        assert_eq!(c.background, BackgroundColor::Stale);
        assert!(c.is_emergency);
        assert!(c.force_redraw);
        assert_eq!(c.cause, EmergencyCause::StaleData);
    }

    #[test]
    fn staleness_is_ignored_on_a_flat_battery() {
        let r = Reading::new(NOW - 40 * 60, 120, TrendDirection::Flat, 0);
        let c = classify(
            &r,
            &thresholds(),
            &ClassifyContext {
                battery_level: 3,
                ..ctx()
            },
        );
        assert_eq!(c.background, BackgroundColor::Normal);
        assert!(!c.is_stale);
    }

    #[test]
    fn trend_softens_the_near_range_bands() {
        let c = classify(&reading(62, TrendDirection::FortyFiveUp), &thresholds(), &ctx());
        assert_eq!(c.band, GlucoseBand::LowRising);
        assert_eq!(c.background, BackgroundColor::Normal);

        let c = classify(&reading(190, TrendDirection::SingleDown), &thresholds(), &ctx());
        assert_eq!(c.band, GlucoseBand::HighFalling);

        let c = classify(&reading(191, TrendDirection::SingleDown), &thresholds(), &ctx());
        assert_eq!(c.band, GlucoseBand::High);
        assert_eq!(c.background, BackgroundColor::CautionHigh);
    }

    #[test]
    fn snooze_suppresses_glucose_emergency() {
        let c = classify(
            &reading(40, TrendDirection::Flat),
            &thresholds(),
            &ClassifyContext {
                emergency_pause_until: NOW + 60,
                ..ctx()
            },
        );
        assert_eq!(c.background, BackgroundColor::Emergency);
        assert!(!c.is_emergency);
        assert_eq!(c.cause, EmergencyCause::None);
    }

    #[test]
    fn low_battery_forces_emergency_and_battery_mode() {
        let c = classify(
            &reading(120, TrendDirection::Flat),
            &thresholds(),
            &ClassifyContext {
                battery_level: 8,
                ..ctx()
            },
        );
        assert!(c.is_emergency);
        assert!(c.force_battery_mode);
        assert!(c.force_redraw);
        assert_eq!(c.cause, EmergencyCause::LowBattery);
    }

    #[test]
    fn low_battery_needs_uptime_and_no_charger() {
        let base = ClassifyContext {
            battery_level: 8,
            ..ctx()
        };
        let r = reading(120, TrendDirection::Flat);
        let booting = ClassifyContext {
            uptime_secs: 100,
            ..base
        };
        assert!(!classify(&r, &thresholds(), &booting).is_emergency);
        let charging = ClassifyContext {
            charging: true,
            ..base
        };
        assert!(!classify(&r, &thresholds(), &charging).is_emergency);
        let unknown = ClassifyContext {
            battery_level: -1,
            ..base
        };
        assert!(!classify(&r, &thresholds(), &unknown).is_emergency);
    }

    #[test]
    fn arrow_colours_follow_trend_and_distance() {
        let t = thresholds();
        assert_eq!(arrow_color(165, TrendDirection::DoubleUp, &t), ArrowColor::Warn);
        assert_eq!(arrow_color(180, TrendDirection::DoubleUp, &t), ArrowColor::Danger);
        assert_eq!(arrow_color(90, TrendDirection::DoubleDown, &t), ArrowColor::Danger);
        assert_eq!(arrow_color(172, TrendDirection::SingleUp, &t), ArrowColor::Warn);
        assert_eq!(arrow_color(185, TrendDirection::SingleUp, &t), ArrowColor::Normal);
        assert_eq!(arrow_color(78, TrendDirection::FortyFiveDown, &t), ArrowColor::Danger);
        assert_eq!(arrow_color(120, TrendDirection::Flat, &t), ArrowColor::Normal);
    }

    #[test]
    fn normal_arrow_inherits_background() {
        let c = classify(&reading(120, TrendDirection::Flat), &thresholds(), &ctx());
        assert_eq!(c.arrow_rgb(), Rgb::DARKGREEN);
    }

    #[test]
    fn older_than_is_strict() {
        assert!(!is_older_than(0, 10, 600, 50));
        assert!(is_older_than(0, 10, 601, 50));
        assert!(!is_older_than(0, 10, 601, 4));
    }

    const ALL_TRENDS: [TrendDirection; 8] = [
        TrendDirection::Flat,
        TrendDirection::SingleUp,
        TrendDirection::SingleDown,
        TrendDirection::DoubleUp,
        TrendDirection::DoubleDown,
        TrendDirection::FortyFiveUp,
        TrendDirection::FortyFiveDown,
        TrendDirection::Unknown,
    ];

    /// Rules 2-8 written out literally against the 70/180/55/250 thresholds.
    fn expected_band(v: i32, trend: TrendDirection) -> GlucoseBand {
        let up = matches!(
            trend,
            TrendDirection::SingleUp | TrendDirection::DoubleUp | TrendDirection::FortyFiveUp
        );
        let down = matches!(
            trend,
            TrendDirection::SingleDown | TrendDirection::DoubleDown | TrendDirection::FortyFiveDown
        );
        match v {
            _ if v <= 55 => GlucoseBand::UrgentLow,
            60..=69 if up => GlucoseBand::LowRising,
            56..=69 => GlucoseBand::Low,
            70..=180 => GlucoseBand::InRange,
            181..=190 if down => GlucoseBand::HighFalling,
            181..=250 => GlucoseBand::High,
            _ => GlucoseBand::UrgentHigh,
        }
    }

    #[test]
    fn every_value_and_trend_lands_in_exactly_one_band() {
        let t = thresholds();
        for trend in ALL_TRENDS {
            for v in 50..=280 {
                let c = classify(&reading(v, trend), &t, &ctx());
                let band = expected_band(v, trend);
                assert_eq!(c.band, band, "v={v} trend={trend:?}");

                let (background, emergency) = match band {
                    GlucoseBand::UrgentLow | GlucoseBand::UrgentHigh => {
                        (BackgroundColor::Emergency, true)
                    }
                    GlucoseBand::Low => (BackgroundColor::CautionLow, false),
                    GlucoseBand::High => (BackgroundColor::CautionHigh, false),
                    GlucoseBand::LowRising | GlucoseBand::InRange | GlucoseBand::HighFalling => {
                        (BackgroundColor::Normal, false)
                    }
                    GlucoseBand::Stale => unreachable!(),
                };
                assert_eq!(c.background, background, "v={v} trend={trend:?}");
                assert_eq!(c.is_emergency, emergency, "v={v} trend={trend:?}");
                assert!(!c.is_stale);
            }
        }
    }

    #[test]
    fn stale_rule_wins_over_every_value() {
        let t = thresholds();
        for trend in ALL_TRENDS {
            for v in 50..=280 {
                let r = Reading::new(NOW - 25 * 60, v, trend, 0);
                let c = classify(&r, &t, &ctx());
                assert_eq!(c.band, GlucoseBand::Stale, "v={v} trend={trend:?}");
                assert_eq!(c.background, BackgroundColor::Stale);
                assert!(!c.is_emergency);
            }
        }
    }

    #[test]
    fn extreme_values_do_not_overflow() {
        let t = Thresholds {
            max: i32::MAX,
            emergency_max: i32::MAX,
            ..thresholds()
        };
        for trend in ALL_TRENDS {
            let c = classify(&reading(i32::MAX, trend), &t, &ctx());
            assert_eq!(c.band, GlucoseBand::InRange);
            let c = classify(&reading(i32::MIN, trend), &thresholds(), &ctx());
            assert_eq!(c.band, GlucoseBand::UrgentLow);
        }
    }

    #[test]
    fn cause_round_trips_through_atomic_form() {
        for cause in [
            EmergencyCause::None,
            EmergencyCause::GlucoseLow,
            EmergencyCause::GlucoseHigh,
            EmergencyCause::LowBattery,
            EmergencyCause::StaleData,
        ] {
            assert_eq!(EmergencyCause::from_u8(cause.as_u8()), cause);
        }
    }
}
