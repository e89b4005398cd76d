//! Pure screen planning: what goes where, in which colour.

use chrono::DateTime;

use super::{DisplayMode, Font, Rect, Rgb, TextMetrics, SCREEN_HEIGHT, SCREEN_WIDTH};
use crate::classify::{is_older_than, Classification};
use crate::reading::{Reading, TrendDirection};

pub const TOP_BAR: Rect = Rect::new(0, 0, SCREEN_WIDTH, 44);
pub const COLOR_PANEL: Rect = Rect::new(0, 44, SCREEN_WIDTH, 152);
pub const BOTTOM_BAR: Rect = Rect::new(0, 196, SCREEN_WIDTH, 44);
pub const BAR_COLOR: Rgb = Rgb::DARKGREY;

const CLOCK_POS: (i32, i32) = (10, 12);
const TOP_TEXT_Y: i32 = 12;
const SGV_Y: i32 = 84;
const FOOTER_Y: i32 = 211;
const ARROW_CENTER_Y: i32 = 113;
const ARROW_RADIUS: i32 = 40;
const ARROW_GAP: i32 = 70;
const TRIANGLE_SIZE: f64 = 44.0;
const FOOTER_STALE_MINUTES: i64 = 10;
const LOW_BATTERY_TEXT: i32 = 20;
const DELTA_ALERT: i32 = 10;
const PLOT_MARGIN: i32 = 16;
const PLOT_POINT_RADIUS: i32 = 4;
const PLOT_MIN_VALUE: i32 = 40;
const PLOT_MAX_VALUE: i32 = 300;
/// Readout slots: battery, temperature, pressure, humidity.
pub const READOUT_SLOTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvSnapshot {
    /// °C.
    pub temperature: f32,
    /// hPa.
    pub pressure: f32,
    /// Percent.
    pub humidity: f32,
}

/// Everything a render needs, gathered by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub reading: Reading,
    pub previous_value: Option<i32>,
    pub classification: Classification,
    pub ago: Option<String>,
    pub no_network: bool,
    pub battery_level: i32,
    pub env: Option<EnvSnapshot>,
    /// `HH:MM:SS`, or `None` when the RTC is not trusted.
    pub clock_text: Option<String>,
    pub tz_offset_secs: i64,
    pub now: i64,
    /// Newest first, as kept by the history.
    pub history: Vec<(i64, i32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldId {
    Clock,
    Sgv,
    Delta,
    Readout,
    Footer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextField {
    pub id: FieldId,
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub font: Font,
    pub fg: Rgb,
    pub bg: Rgb,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrowPlan {
    pub center: (i32, i32),
    pub radius: i32,
    pub fill: Rgb,
    pub color: Rgb,
    pub triangles: Vec<[(i32, i32); 3]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotPlan {
    pub points: Vec<(i32, i32)>,
    pub radius: i32,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub mode: DisplayMode,
    pub background: Rgb,
    pub fields: Vec<TextField>,
    pub arrow: Option<ArrowPlan>,
    pub plot: Option<PlotPlan>,
}

pub fn plan<M: TextMetrics + ?Sized>(
    frame: &Frame,
    mode: DisplayMode,
    readout_index: usize,
    metrics: &M,
) -> Plan {
    let background = frame.classification.background_rgb();
    let mut fields = vec![clock_field(frame.clock_text.as_deref())];

    let sgv = sgv_field(frame, background, metrics);
    let sgv_right = sgv.x + metrics.text_width(&sgv.text, Font::Large);
    let mut arrow = None;
    let mut plot = None;

    if mode.is_chart() {
        fields.push(delta_field(frame, metrics));
        fields.push(readout_field(frame, metrics));
        fields.push(footer_field(frame, mode, readout_index, metrics));
        plot = Some(plot_plan(&frame.history));
    } else {
        fields.push(sgv);
        arrow = arrow_plan(frame, sgv_right);
        if mode != DisplayMode::Basic {
            fields.push(delta_field(frame, metrics));
            fields.push(readout_field(frame, metrics));
            fields.push(footer_field(frame, mode, readout_index, metrics));
        }
    }

    Plan {
        mode,
        background,
        fields,
        arrow,
        plot,
    }
}

pub fn clock_field(text: Option<&str>) -> TextField {
    TextField {
        id: FieldId::Clock,
        text: text.unwrap_or("--:--:--").to_string(),
        x: CLOCK_POS.0,
        y: CLOCK_POS.1,
        font: Font::Small,
        fg: Rgb::WHITE,
        bg: BAR_COLOR,
    }
}

/// Top-left, vertically centred position for a banner message.
pub fn banner_origin<M: TextMetrics + ?Sized>(text: &str, metrics: &M) -> (i32, i32) {
    let w = metrics.text_width(text, Font::Small);
    let h = metrics.font_height(Font::Small);
    (ceil_half(SCREEN_WIDTH - w), ceil_half(SCREEN_HEIGHT - h))
}

fn sgv_field<M: TextMetrics + ?Sized>(frame: &Frame, background: Rgb, metrics: &M) -> TextField {
    let text = frame.reading.glucose_value.to_string();
    let w = metrics.text_width(&text, Font::Large);
    TextField {
        id: FieldId::Sgv,
        x: ceil_half(SCREEN_WIDTH - w - 30 - 80),
        text,
        y: SGV_Y,
        font: Font::Large,
        fg: Rgb::WHITE,
        bg: background,
    }
}

fn delta_field<M: TextMetrics + ?Sized>(frame: &Frame, metrics: &M) -> TextField {
    let delta = frame
        .previous_value
        .map(|prev| frame.reading.glucose_value - prev)
        .unwrap_or(0);
    let text = if delta > 0 {
        format!("+{delta}")
    } else {
        delta.to_string()
    };
    let c = &frame.classification;
    let fg = if delta.abs() >= DELTA_ALERT && !c.background_is_red() && !c.is_stale {
        Rgb::RED
    } else {
        Rgb::WHITE
    };
    let w = metrics.text_width(&text, Font::Small);
    TextField {
        id: FieldId::Delta,
        x: 25 + ceil_half(SCREEN_WIDTH - w),
        text,
        y: TOP_TEXT_Y,
        font: Font::Small,
        fg,
        bg: BAR_COLOR,
    }
}

fn readout_field<M: TextMetrics + ?Sized>(frame: &Frame, metrics: &M) -> TextField {
    let (text, fg) = if frame.battery_level < 0 {
        ("--%".to_string(), Rgb::WHITE)
    } else {
        let fg = if frame.battery_level < LOW_BATTERY_TEXT {
            Rgb::RED
        } else {
            Rgb::WHITE
        };
        (format!("{}%", frame.battery_level), fg)
    };
    let w = metrics.text_width(&text, Font::Small);
    TextField {
        id: FieldId::Readout,
        x: 315 - w,
        text,
        y: TOP_TEXT_Y,
        font: Font::Small,
        fg,
        bg: BAR_COLOR,
    }
}

fn footer_field<M: TextMetrics + ?Sized>(
    frame: &Frame,
    mode: DisplayMode,
    readout_index: usize,
    metrics: &M,
) -> TextField {
    let stale = is_older_than(
        frame.reading.timestamp,
        FOOTER_STALE_MINUTES,
        frame.now,
        frame.battery_level,
    );
    let (text, out_of_range) = match (&frame.ago, mode) {
        (Some(ago), m) if m.is_elapsed() && !frame.no_network => (ago.clone(), false),
        (_, m) if m.is_battery() => battery_footer(frame, readout_index),
        _ => (reading_date(frame), false),
    };
    let fg = if stale || out_of_range {
        Rgb::RED
    } else {
        Rgb::WHITE
    };
    let w = metrics.text_width(&text, Font::Small);
    TextField {
        id: FieldId::Footer,
        x: ceil_half(SCREEN_WIDTH - w),
        text,
        y: FOOTER_Y,
        font: Font::Small,
        fg,
        bg: BAR_COLOR,
    }
}

/// Round-robin footer for battery modes; environment slots only with a sensor and charge above 20%.
fn battery_footer(frame: &Frame, readout_index: usize) -> (String, bool) {
    let env = frame.env.filter(|_| frame.battery_level > LOW_BATTERY_TEXT);
    match (readout_index % READOUT_SLOTS, env) {
        (1, Some(env)) => (
            format!("Temperature: {:.0}C", env.temperature),
            !(18.0..=25.0).contains(&env.temperature),
        ),
        (2, Some(env)) => (
            format!("Pressure: {:.0}hPa", env.pressure),
            !(950.0..=1050.0).contains(&env.pressure),
        ),
        (3, Some(env)) => (
            format!("Humidity: {:.0}%", env.humidity),
            !(40.0..=60.0).contains(&env.humidity),
        ),
        _ if frame.battery_level >= 0 => (
            format!("Battery: {}%", frame.battery_level),
            frame.battery_level < LOW_BATTERY_TEXT,
        ),
        _ => ("Battery level unknown".to_string(), false),
    }
}

fn reading_date(frame: &Frame) -> String {
    DateTime::from_timestamp(frame.reading.timestamp + frame.tz_offset_secs, 0)
        .map(|dt| dt.naive_utc().format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "----------".to_string())
}

fn arrow_plan(frame: &Frame, sgv_right: i32) -> Option<ArrowPlan> {
    let center = (sgv_right + ARROW_GAP, ARROW_CENTER_Y);
    let (cx, cy) = center;
    // (x shift, y shifts, rotation in degrees)
    let (dx, dys, angle): (i32, Vec<i32>, f64) = match frame.reading.trend {
        TrendDirection::DoubleUp => (0, vec![-12, 4], -90.0),
        TrendDirection::DoubleDown => (0, vec![-4, 12], 90.0),
        TrendDirection::SingleUp => (0, vec![-4], -90.0),
        TrendDirection::SingleDown => (0, vec![4], 90.0),
        TrendDirection::Flat => (4, vec![0], 0.0),
        TrendDirection::FortyFiveUp => (4, vec![-4], -45.0),
        TrendDirection::FortyFiveDown => (4, vec![4], 45.0),
        TrendDirection::Unknown => return None,
    };
    let triangles = dys
        .iter()
        .map(|dy| triangle(cx + dx, cy + dy, angle))
        .collect();
    Some(ArrowPlan {
        center,
        radius: ARROW_RADIUS,
        fill: Rgb::WHITE,
        color: frame.classification.arrow_rgb(),
        triangles,
    })
}

/// Arrow head pointing right, rotated about its centre.
fn triangle(cx: i32, cy: i32, angle_deg: f64) -> [(i32, i32); 3] {
    let half = TRIANGLE_SIZE / 2.0;
    let (cxf, cyf) = (cx as f64, cy as f64);
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let rotate = |x: f64, y: f64| {
        let (dx, dy) = (x - cxf, y - cyf);
        (
            (dx * cos - dy * sin + cxf) as i32,
            (dx * sin + dy * cos + cyf) as i32,
        )
    };
    [
        rotate(cxf + half, cyf),
        rotate(cxf - half, cyf + half),
        rotate(cxf - half, cyf - half),
    ]
}

/// Oldest reading on the left; values clamped into the plot range.
fn plot_plan(history: &[(i64, i32)]) -> PlotPlan {
    let mut ordered: Vec<(i64, i32)> = history.to_vec();
    ordered.sort_by_key(|pair| pair.0);
    let left = COLOR_PANEL.x + PLOT_MARGIN;
    let right = COLOR_PANEL.x + COLOR_PANEL.w - PLOT_MARGIN;
    let top = COLOR_PANEL.y + PLOT_MARGIN;
    let bottom = COLOR_PANEL.y + COLOR_PANEL.h - PLOT_MARGIN;
    let span = (ordered.len().max(2) - 1) as i32;

    let points = ordered
        .iter()
        .enumerate()
        .map(|(i, &(_, value))| {
            let x = if ordered.len() == 1 {
                (left + right) / 2
            } else {
                left + (right - left) * i as i32 / span
            };
            let clamped = value.clamp(PLOT_MIN_VALUE, PLOT_MAX_VALUE);
            let y = bottom
                - (bottom - top) * (clamped - PLOT_MIN_VALUE) / (PLOT_MAX_VALUE - PLOT_MIN_VALUE);
            (x, y)
        })
        .collect();
    PlotPlan {
        points,
        radius: PLOT_POINT_RADIUS,
        color: Rgb::WHITE,
    }
}

fn ceil_half(n: i32) -> i32 {
    (n + 1).div_euclid(2)
}
