use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{Font, Rect, Rgb, Surface, TextMetrics};
use crate::Result;

const SMALL_GLYPH_WIDTH: i32 = 14;
const LARGE_GLYPH_WIDTH: i32 = 40;
const SMALL_FONT_HEIGHT: i32 = 24;
const LARGE_FONT_HEIGHT: i32 = 72;

/// One primitive issued to a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawOp {
    Rotation(bool),
    Brightness(u8),
    Clear(Rgb),
    FillRect(Rect, Rgb),
    FillCircle {
        cx: i32,
        cy: i32,
        radius: i32,
        color: Rgb,
    },
    FillTriangle([(i32, i32); 3], Rgb),
    Text {
        text: String,
        x: i32,
        y: i32,
        font: Font,
        fg: Rgb,
        bg: Rgb,
    },
}

/// Shared view of the operations a `RecordingSurface` has seen.
#[derive(Debug, Clone, Default)]
pub struct SurfaceLog {
    ops: Arc<Mutex<VecDeque<DrawOp>>>,
    limit: Option<usize>,
}

impl SurfaceLog {
    pub fn snapshot(&self) -> Vec<DrawOp> {
        self.lock().iter().cloned().collect()
    }

    /// Drain everything recorded so far.
    pub fn take(&self) -> Vec<DrawOp> {
        self.lock().drain(..).collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn push(&self, op: DrawOp) {
        let mut ops = self.lock();
        if let Some(limit) = self.limit {
            while ops.len() >= limit {
                ops.pop_front();
            }
        }
        ops.push_back(op);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<DrawOp>> {
        self.ops.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-memory surface with fixed-width glyph metrics.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    log: SurfaceLog,
    flipped: bool,
    brightness: u8,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only the most recent `limit` operations.
    pub fn bounded(limit: usize) -> Self {
        Self {
            log: SurfaceLog {
                ops: Arc::default(),
                limit: Some(limit.max(1)),
            },
            ..Self::default()
        }
    }

    pub fn log(&self) -> SurfaceLog {
        self.log.clone()
    }

    pub fn is_flipped(&self) -> bool {
        self.flipped
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }
}

impl TextMetrics for RecordingSurface {
    fn text_width(&self, text: &str, font: Font) -> i32 {
        let glyph = match font {
            Font::Small => SMALL_GLYPH_WIDTH,
            Font::Large => LARGE_GLYPH_WIDTH,
        };
        text.chars().count() as i32 * glyph
    }

    fn font_height(&self, font: Font) -> i32 {
        match font {
            Font::Small => SMALL_FONT_HEIGHT,
            Font::Large => LARGE_FONT_HEIGHT,
        }
    }
}

impl Surface for RecordingSurface {
    fn set_rotation(&mut self, flipped: bool) -> Result<()> {
        self.flipped = flipped;
        self.log.push(DrawOp::Rotation(flipped));
        Ok(())
    }

    fn set_brightness(&mut self, level: u8) -> Result<()> {
        self.brightness = level;
        self.log.push(DrawOp::Brightness(level));
        Ok(())
    }

    fn clear(&mut self, color: Rgb) -> Result<()> {
        self.log.push(DrawOp::Clear(color));
        Ok(())
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgb) -> Result<()> {
        self.log.push(DrawOp::FillRect(rect, color));
        Ok(())
    }

    fn fill_circle(&mut self, cx: i32, cy: i32, radius: i32, color: Rgb) -> Result<()> {
        self.log.push(DrawOp::FillCircle {
            cx,
            cy,
            radius,
            color,
        });
        Ok(())
    }

    fn fill_triangle(&mut self, points: [(i32, i32); 3], color: Rgb) -> Result<()> {
        self.log.push(DrawOp::FillTriangle(points, color));
        Ok(())
    }

    fn draw_text(
        &mut self,
        text: &str,
        x: i32,
        y: i32,
        font: Font,
        fg: Rgb,
        bg: Rgb,
    ) -> Result<()> {
        self.log.push(DrawOp::Text {
            text: text.to_string(),
            x,
            y,
            font,
            fg,
            bg,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_operations_in_order() {
        let mut surface = RecordingSurface::new();
        let log = surface.log();
        surface.set_rotation(true).unwrap();
        surface.clear(Rgb::BLACK).unwrap();
        surface
            .draw_text("hi", 1, 2, Font::Small, Rgb::WHITE, Rgb::BLACK)
            .unwrap();
        assert!(surface.is_flipped());
        assert_eq!(log.len(), 3);
        assert_eq!(log.texts(), vec!["hi".to_string()]);
        assert_eq!(log.take()[0], DrawOp::Rotation(true));
        assert!(log.is_empty());
    }

    #[test]
    fn bounded_log_drops_oldest() {
        let mut surface = RecordingSurface::bounded(2);
        let log = surface.log();
        for level in [10, 20, 30] {
            surface.set_brightness(level).unwrap();
        }
        assert_eq!(
            log.snapshot(),
            vec![DrawOp::Brightness(20), DrawOp::Brightness(30)]
        );
        assert_eq!(surface.brightness(), 30);
    }

    #[test]
    fn metrics_are_fixed_width() {
        let surface = RecordingSurface::new();
        assert_eq!(surface.text_width("123", Font::Large), 120);
        assert_eq!(surface.text_width("12:00:00", Font::Small), 112);
        assert_eq!(surface.font_height(Font::Large), 72);
    }
}
