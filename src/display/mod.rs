use std::fmt;
use std::str::FromStr;

use crate::Result;

pub mod layout;
pub mod presenter;
pub mod surface;

pub use presenter::{Banner, DisplayPresenter, LockMode, RenderOutcome};
pub use surface::{DrawOp, RecordingSurface, SurfaceLog};

pub const SCREEN_WIDTH: i32 = 320;
pub const SCREEN_HEIGHT: i32 = 240;

/// 24-bit colour as `0xRRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u32);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0x000000);
    pub const WHITE: Rgb = Rgb(0xFFFFFF);
    pub const RED: Rgb = Rgb(0xFF0000);
    pub const GREEN: Rgb = Rgb(0x00FF00);
    pub const BLUE: Rgb = Rgb(0x0000FF);
    pub const ORANGE: Rgb = Rgb(0xFFA500);
    pub const DARKGREY: Rgb = Rgb(0x404040);
    pub const DARKGREEN: Rgb = Rgb(0x006400);
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06X}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Font {
    /// Labels, clock and banners.
    Small,
    /// The glucose value.
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }
}

/// Glyph measurement, split out so layout planning needs no drawing access.
pub trait TextMetrics {
    fn text_width(&self, text: &str, font: Font) -> i32;
    fn font_height(&self, font: Font) -> i32;
}

/// Drawing primitives of the physical screen.
pub trait Surface: TextMetrics + Send {
    fn width(&self) -> i32 {
        SCREEN_WIDTH
    }
    fn height(&self) -> i32 {
        SCREEN_HEIGHT
    }
    /// `true` rotates the whole screen by 180°.
    fn set_rotation(&mut self, flipped: bool) -> Result<()>;
    fn set_brightness(&mut self, level: u8) -> Result<()>;
    fn clear(&mut self, color: Rgb) -> Result<()>;
    fn fill_rect(&mut self, rect: Rect, color: Rgb) -> Result<()>;
    fn fill_circle(&mut self, cx: i32, cy: i32, radius: i32, color: Rgb) -> Result<()>;
    fn fill_triangle(&mut self, points: [(i32, i32); 3], color: Rgb) -> Result<()>;
    fn draw_text(
        &mut self,
        text: &str,
        x: i32,
        y: i32,
        font: Font,
        fg: Rgb,
        bg: Rgb,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DisplayMode {
    #[default]
    FullElapsed,
    FullDate,
    FullBattery,
    Basic,
    FlipFullElapsed,
    FlipFullDate,
    FlipFullBattery,
    Chart,
    FlipChart,
}

const TILT_THRESHOLD: f32 = 0.1;

impl DisplayMode {
    pub const ALL: [DisplayMode; 9] = [
        DisplayMode::FullElapsed,
        DisplayMode::FullDate,
        DisplayMode::FullBattery,
        DisplayMode::Basic,
        DisplayMode::FlipFullElapsed,
        DisplayMode::FlipFullDate,
        DisplayMode::FlipFullBattery,
        DisplayMode::Chart,
        DisplayMode::FlipChart,
    ];

    pub fn index(self) -> u8 {
        match self {
            DisplayMode::FullElapsed => 0,
            DisplayMode::FullDate => 1,
            DisplayMode::FullBattery => 2,
            DisplayMode::Basic => 3,
            DisplayMode::FlipFullElapsed => 4,
            DisplayMode::FlipFullDate => 5,
            DisplayMode::FlipFullBattery => 6,
            DisplayMode::Chart => 7,
            DisplayMode::FlipChart => 8,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            DisplayMode::FullElapsed => "full_elapsed",
            DisplayMode::FullDate => "full_date",
            DisplayMode::FullBattery => "full_battery",
            DisplayMode::Basic => "basic",
            DisplayMode::FlipFullElapsed => "flip_full_elapsed",
            DisplayMode::FlipFullDate => "flip_full_date",
            DisplayMode::FlipFullBattery => "flip_full_battery",
            DisplayMode::Chart => "chart",
            DisplayMode::FlipChart => "flip_chart",
        }
    }

    pub fn is_flipped(self) -> bool {
        matches!(
            self,
            DisplayMode::FlipFullElapsed
                | DisplayMode::FlipFullDate
                | DisplayMode::FlipFullBattery
                | DisplayMode::FlipChart
        )
    }

    pub fn is_elapsed(self) -> bool {
        matches!(self, DisplayMode::FullElapsed | DisplayMode::FlipFullElapsed)
    }

    pub fn is_battery(self) -> bool {
        matches!(self, DisplayMode::FullBattery | DisplayMode::FlipFullBattery)
    }

    pub fn is_chart(self) -> bool {
        matches!(self, DisplayMode::Chart | DisplayMode::FlipChart)
    }

    /// Flipped counterpart, or `self` when the mode has none.
    pub fn flipped_twin(self) -> Self {
        match self {
            DisplayMode::FullElapsed => DisplayMode::FlipFullElapsed,
            DisplayMode::FullDate => DisplayMode::FlipFullDate,
            DisplayMode::FullBattery => DisplayMode::FlipFullBattery,
            DisplayMode::Chart => DisplayMode::FlipChart,
            other => other,
        }
    }

    pub fn upright_twin(self) -> Self {
        match self {
            DisplayMode::FlipFullElapsed => DisplayMode::FullElapsed,
            DisplayMode::FlipFullDate => DisplayMode::FullDate,
            DisplayMode::FlipFullBattery => DisplayMode::FullBattery,
            DisplayMode::FlipChart => DisplayMode::Chart,
            other => other,
        }
    }

    /// Mode after an accelerometer reading on the y axis.
    pub fn tilt(self, accel_y: f32) -> Self {
        if accel_y < -TILT_THRESHOLD {
            self.flipped_twin()
        } else if accel_y > TILT_THRESHOLD {
            self.upright_twin()
        } else {
            self
        }
    }

    /// Mode actually drawn for one render after the alarm overrides.
    pub fn effective(self, force_battery_mode: bool, is_emergency: bool) -> Self {
        if force_battery_mode {
            return match self.index() {
                0..=3 | 7 => DisplayMode::FullBattery,
                _ => DisplayMode::FlipFullBattery,
            };
        }
        if is_emergency {
            return match self {
                DisplayMode::Basic | DisplayMode::Chart => DisplayMode::FullElapsed,
                DisplayMode::FlipChart => DisplayMode::FlipFullElapsed,
                other => other,
            };
        }
        self
    }
}

impl FromStr for DisplayMode {
    type Err = String;

    /// Accepts the mode name or its numeric index.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(index) = trimmed.parse::<u8>() {
            return DisplayMode::from_index(index)
                .ok_or_else(|| format!("mode index {index} out of range 0-8"));
        }
        DisplayMode::ALL
            .iter()
            .copied()
            .find(|mode| mode.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("unknown display mode '{trimmed}'"))
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_indices_line_up() {
        for (i, mode) in DisplayMode::ALL.iter().enumerate() {
            assert_eq!(mode.index() as usize, i);
            assert_eq!(mode.name().parse::<DisplayMode>().unwrap(), *mode);
            assert_eq!(i.to_string().parse::<DisplayMode>().unwrap(), *mode);
        }
        assert!("9".parse::<DisplayMode>().is_err());
        assert!("upside_down".parse::<DisplayMode>().is_err());
    }

    #[test]
    fn only_named_flip_modes_are_rotated() {
        let flipped: Vec<u8> = DisplayMode::ALL
            .iter()
            .filter(|m| m.is_flipped())
            .map(|m| m.index())
            .collect();
        assert_eq!(flipped, vec![4, 5, 6, 8]);
    }

    #[test]
    fn tilt_maps_between_twins() {
        assert_eq!(DisplayMode::FullDate.tilt(-0.5), DisplayMode::FlipFullDate);
        assert_eq!(DisplayMode::Chart.tilt(-0.5), DisplayMode::FlipChart);
        assert_eq!(DisplayMode::FlipFullBattery.tilt(0.5), DisplayMode::FullBattery);
        assert_eq!(DisplayMode::FlipChart.tilt(0.5), DisplayMode::Chart);
        assert_eq!(DisplayMode::Basic.tilt(-0.5), DisplayMode::Basic);
        assert_eq!(DisplayMode::FullDate.tilt(-0.05), DisplayMode::FullDate);
        assert_eq!(DisplayMode::FullDate.tilt(0.5), DisplayMode::FullDate);
    }

    #[test]
    fn battery_override_picks_orientation() {
        for mode in [0u8, 1, 2, 3, 7] {
            let mode = DisplayMode::from_index(mode).unwrap();
            assert_eq!(mode.effective(true, true), DisplayMode::FullBattery);
        }
        for mode in [4u8, 5, 6, 8] {
            let mode = DisplayMode::from_index(mode).unwrap();
            assert_eq!(mode.effective(true, false), DisplayMode::FlipFullBattery);
        }
    }

    #[test]
    fn emergency_leaves_basic_and_chart() {
        assert_eq!(DisplayMode::Basic.effective(false, true), DisplayMode::FullElapsed);
        assert_eq!(DisplayMode::Chart.effective(false, true), DisplayMode::FullElapsed);
        assert_eq!(DisplayMode::FlipChart.effective(false, true), DisplayMode::FlipFullElapsed);
        assert_eq!(DisplayMode::FullDate.effective(false, true), DisplayMode::FullDate);
        assert_eq!(DisplayMode::Chart.effective(false, false), DisplayMode::Chart);
    }
}
