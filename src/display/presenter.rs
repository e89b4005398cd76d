use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, TryLockError};

use super::layout::{
    self, ArrowPlan, FieldId, Frame, Plan, PlotPlan, TextField, BAR_COLOR, BOTTOM_BAR,
    COLOR_PANEL, READOUT_SLOTS, TOP_BAR,
};
use super::{DisplayMode, Font, Rect, Rgb, Surface};
use crate::Result;

/// How a caller takes the render lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Wait for the lock; used by the authoritative poll render.
    Blocking,
    /// Skip the render when another one is in progress.
    TryLock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered,
    /// The render lock was busy.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Banner {
    Starting,
    LoadingData,
    NetworkError,
    Restarting,
    FixConfig,
}

impl Banner {
    pub fn text(self) -> &'static str {
        match self {
            Banner::Starting => "Starting...",
            Banner::LoadingData => "Loading data...",
            Banner::NetworkError => "Network error! Please wait.",
            Banner::Restarting => "Restarting...",
            Banner::FixConfig => "Fix config!",
        }
    }

    pub fn background(self) -> Rgb {
        match self {
            Banner::Starting | Banner::LoadingData => Rgb::DARKGREY,
            Banner::NetworkError | Banner::Restarting | Banner::FixConfig => Rgb::RED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RenderedField {
    field: TextField,
    width: i32,
    height: i32,
}

impl RenderedField {
    fn erase_rect(&self) -> Rect {
        Rect::new(self.field.x, self.field.y, self.width, self.height)
    }
}

#[derive(Debug, Default)]
struct DisplayState {
    mode: Option<DisplayMode>,
    flipped: bool,
    background: Option<Rgb>,
    fields: BTreeMap<FieldId, RenderedField>,
    arrow: Option<ArrowPlan>,
    plot: Option<PlotPlan>,
    readout_index: usize,
}

impl DisplayState {
    fn reset_trackers(&mut self) {
        self.background = None;
        self.fields.clear();
        self.arrow = None;
        self.plot = None;
    }
}

struct Inner {
    surface: Box<dyn Surface>,
    state: DisplayState,
}

/// Owns the screen and the last-rendered state behind one render lock.
pub struct DisplayPresenter {
    inner: Mutex<Inner>,
    rotation_enabled: bool,
}

impl DisplayPresenter {
    pub fn new(surface: Box<dyn Surface>, rotation_enabled: bool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                surface,
                state: DisplayState::default(),
            }),
            rotation_enabled,
        }
    }

    /// Render `frame` in `mode`, redrawing only the fields that changed.
    pub fn render(
        &self,
        frame: &Frame,
        mode: DisplayMode,
        force_full: bool,
        lock: LockMode,
    ) -> Result<RenderOutcome> {
        let Some(mut inner) = self.acquire(lock) else {
            return Ok(RenderOutcome::Skipped);
        };
        let c = &frame.classification;
        let effective = mode.effective(c.force_battery_mode, c.is_emergency);
        let flipped = self.rotation_enabled && effective.is_flipped();
        let plan = layout::plan(frame, effective, inner.state.readout_index, &*inner.surface);
        let full = force_full
            || c.force_redraw
            || inner.state.mode != Some(effective)
            || inner.state.flipped != flipped;
        inner.apply(&plan, flipped, full)?;
        inner.state.readout_index = (inner.state.readout_index + 1) % READOUT_SLOTS;
        Ok(RenderOutcome::Rendered)
    }

    /// Redraw the clock only; never waits for the lock.
    pub fn render_clock(&self, text: Option<&str>) -> Result<RenderOutcome> {
        let Some(mut inner) = self.acquire(LockMode::TryLock) else {
            return Ok(RenderOutcome::Skipped);
        };
        if inner.state.mode.is_none() {
            return Ok(RenderOutcome::Skipped);
        }
        inner.draw_field(layout::clock_field(text))?;
        Ok(RenderOutcome::Rendered)
    }

    /// Centred message on a cleared screen; forgets everything rendered before.
    pub fn show_banner(&self, banner: Banner, flipped: bool) -> Result<()> {
        let Some(mut inner) = self.acquire(LockMode::Blocking) else {
            return Ok(());
        };
        let flipped = self.rotation_enabled && flipped;
        let text = banner.text();
        let (x, y) = layout::banner_origin(text, &*inner.surface);
        let bg = banner.background();
        inner.surface.set_rotation(flipped)?;
        inner.surface.clear(bg)?;
        inner
            .surface
            .draw_text(text, x, y, Font::Small, Rgb::WHITE, bg)?;
        inner.state.reset_trackers();
        inner.state.mode = None;
        inner.state.flipped = flipped;
        Ok(())
    }

    pub fn set_brightness(&self, level: u8) -> Result<()> {
        match self.acquire(LockMode::Blocking) {
            Some(mut inner) => inner.surface.set_brightness(level),
            None => Ok(()),
        }
    }

    /// Mode of the last full-screen render, `None` while a banner is showing.
    pub fn rendered_mode(&self) -> Option<DisplayMode> {
        self.acquire(LockMode::Blocking)
            .and_then(|inner| inner.state.mode)
    }

    pub fn readout_index(&self) -> usize {
        self.acquire(LockMode::Blocking)
            .map(|inner| inner.state.readout_index)
            .unwrap_or(0)
    }

    fn acquire(&self, lock: LockMode) -> Option<MutexGuard<'_, Inner>> {
        match lock {
            LockMode::Blocking => Some(
                self.inner
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            ),
            LockMode::TryLock => match self.inner.try_lock() {
                Ok(guard) => Some(guard),
                Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => None,
            },
        }
    }
}

impl Inner {
    fn apply(&mut self, plan: &Plan, flipped: bool, full: bool) -> Result<()> {
        if full {
            self.surface.set_rotation(flipped)?;
            self.surface.clear(Rgb::BLACK)?;
            self.surface.fill_rect(TOP_BAR, BAR_COLOR)?;
            self.surface.fill_rect(BOTTOM_BAR, BAR_COLOR)?;
            self.state.reset_trackers();
            self.state.mode = Some(plan.mode);
            self.state.flipped = flipped;
        }

        if self.state.background != Some(plan.background) {
            self.surface.fill_rect(COLOR_PANEL, plan.background)?;
            self.state.fields.remove(&FieldId::Sgv);
            self.state.arrow = None;
            self.state.plot = None;
            self.state.background = Some(plan.background);
        }

        if self.state.arrow != plan.arrow {
            if let Some(old) = self.state.arrow.take() {
                self.surface
                    .fill_circle(old.center.0, old.center.1, old.radius, plan.background)?;
            }
        }

        for field in &plan.fields {
            self.draw_field(field.clone())?;
        }

        if self.state.arrow != plan.arrow {
            if let Some(arrow) = &plan.arrow {
                self.surface
                    .fill_circle(arrow.center.0, arrow.center.1, arrow.radius, arrow.fill)?;
                for triangle in &arrow.triangles {
                    self.surface.fill_triangle(*triangle, arrow.color)?;
                }
            }
            self.state.arrow = plan.arrow.clone();
        }

        if self.state.plot != plan.plot {
            if self.state.plot.is_some() {
                self.surface.fill_rect(COLOR_PANEL, plan.background)?;
            }
            if let Some(plot) = &plan.plot {
                for &(x, y) in &plot.points {
                    self.surface.fill_circle(x, y, plot.radius, plot.color)?;
                }
            }
            self.state.plot = plan.plot.clone();
        }
        Ok(())
    }

    /// Erase the previous string at its old extent, then draw the new one.
    fn draw_field(&mut self, field: TextField) -> Result<()> {
        if let Some(previous) = self.state.fields.get(&field.id) {
            if previous.field == field {
                return Ok(());
            }
            self.surface
                .fill_rect(previous.erase_rect(), previous.field.bg)?;
        }
        self.surface
            .draw_text(&field.text, field.x, field.y, field.font, field.fg, field.bg)?;
        let rendered = RenderedField {
            width: self.surface.text_width(&field.text, field.font),
            height: self.surface.font_height(field.font),
            field,
        };
        self.state.fields.insert(rendered.field.id, rendered);
        Ok(())
    }
}
