//! Viewport state machine.
//!
//! Tracks the full time extent of the loaded data and a visible sub-range
//! that is always clamped inside it. Every change to the visible range or
//! the zoom level is broadcast to subscribers as a [`ViewportEvent`].

use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;
use std::sync::mpsc::{channel, Receiver, Sender};

use crate::error::{Error, Result};
use crate::parsers::TimeSpan;

pub const MIN_ZOOM: f64 = 1.0;
pub const MAX_ZOOM: f64 = 1000.0;

/// Change notification raised by a [`Viewport`]
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum ViewportEvent {
    RangeChanged(TimeSpan),
    ZoomChanged(f64),
}

#[derive(Clone, Debug)]
pub struct Viewport {
    full: TimeSpan,
    visible: TimeSpan,
    zoom_level: f64,
    subscribers: Vec<Sender<ViewportEvent>>,
}

impl Default for Viewport {
    fn default() -> Self {
        let epoch = NaiveDateTime::default();
        let span = TimeSpan {
            start: epoch,
            end: epoch,
        };
        Self {
            full: span,
            visible: span,
            zoom_level: MIN_ZOOM,
            subscribers: Vec::new(),
        }
    }
}

/// Scale a duration by a factor
pub(crate) fn scale(delta: TimeDelta, factor: f64) -> TimeDelta {
    match delta.num_nanoseconds() {
        Some(nanos) => TimeDelta::nanoseconds((nanos as f64 * factor).round() as i64),
        None => TimeDelta::milliseconds((delta.num_milliseconds() as f64 * factor).round() as i64),
    }
}

/// `timestamp + delta`, saturating to `fallback` on overflow
fn shift(timestamp: NaiveDateTime, delta: TimeDelta, fallback: NaiveDateTime) -> NaiveDateTime {
    timestamp.checked_add_signed(delta).unwrap_or(fallback)
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn full_range(&self) -> TimeSpan {
        self.full
    }

    pub fn visible_range(&self) -> TimeSpan {
        self.visible
    }

    pub fn zoom_level(&self) -> f64 {
        self.zoom_level
    }

    /// Receive every subsequent change notification
    pub fn subscribe(&mut self) -> Receiver<ViewportEvent> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    fn notify(&mut self, event: ViewportEvent) {
        // Forget subscribers whose receiver is gone
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }

    /// Set the full extent, resetting the visible range to it and the zoom
    /// level to 1.
    pub fn set_full_range(&mut self, start: NaiveDateTime, end: NaiveDateTime) -> Result<()> {
        let full = TimeSpan::new(start, end).ok_or(Error::InvalidRange { start, end })?;
        self.full = full;
        self.set_visible_range(start, end)?;
        self.set_zoom_level(MIN_ZOOM);
        Ok(())
    }

    /// Clamp `[start, end]` into the full range and make it visible. The
    /// single mutator of the visible bounds.
    pub fn set_visible_range(&mut self, start: NaiveDateTime, end: NaiveDateTime) -> Result<()> {
        if end < start {
            return Err(Error::InvalidRange { start, end });
        }
        let start = start.clamp(self.full.start, self.full.end);
        let end = end.clamp(self.full.start, self.full.end).max(start);

        let visible = TimeSpan { start, end };
        if visible != self.visible {
            self.visible = visible;
            self.notify(ViewportEvent::RangeChanged(visible));
        }
        Ok(())
    }

    /// Set the zoom level, clamped to [`MIN_ZOOM`, `MAX_ZOOM`]. NaN is
    /// ignored.
    pub fn set_zoom_level(&mut self, level: f64) {
        if level.is_nan() {
            return;
        }
        let clamped = level.clamp(MIN_ZOOM, MAX_ZOOM);
        if clamped != self.zoom_level {
            self.zoom_level = clamped;
            self.notify(ViewportEvent::ZoomChanged(clamped));
        }
    }

    /// Multiply the zoom level; factors below 1 count as 1
    pub fn zoom_in(&mut self, factor: f64) {
        self.set_zoom_level(self.zoom_level * factor.max(1.0));
    }

    /// Divide the zoom level; non-positive factors count as 1
    pub fn zoom_out(&mut self, factor: f64) {
        let factor = if factor > 0.0 { factor } else { 1.0 };
        self.set_zoom_level(self.zoom_level / factor);
    }

    /// Visible width implied by the zoom level: `full_span / zoom_level`
    pub fn zoom_window(&self) -> TimeDelta {
        scale(self.full.duration(), 1.0 / self.zoom_level)
    }

    pub fn visible_center(&self) -> NaiveDateTime {
        self.visible.start + scale(self.visible.duration(), 0.5)
    }

    /// Re-center a window of [`zoom_window`](Self::zoom_window) on the
    /// current visible center
    pub fn apply_zoom(&mut self) -> Result<()> {
        let center = self.visible_center();
        self.jump_to(center, Some(self.zoom_window()))
    }

    /// Shift both visible bounds by `delta`. Saturates at the edges.
    pub fn pan(&mut self, delta: TimeDelta) -> Result<()> {
        let fallback = if delta < TimeDelta::zero() {
            self.full.start
        } else {
            self.full.end
        };
        let start = shift(self.visible.start, delta, fallback);
        let end = shift(self.visible.end, delta, fallback);
        self.set_visible_range(start, end)
    }

    /// Center the visible range on `center`, `window` wide (the current
    /// visible width when `None`)
    pub fn jump_to(&mut self, center: NaiveDateTime, window: Option<TimeDelta>) -> Result<()> {
        let width = window
            .unwrap_or_else(|| self.visible.duration())
            .max(TimeDelta::zero());
        let half = scale(width, 0.5);
        let start = shift(center, -half, self.full.start);
        let end = shift(center, half, self.full.end);
        self.set_visible_range(start, end)
    }

    /// Zoom 1 and the whole range visible
    pub fn reset(&mut self) -> Result<()> {
        self.set_zoom_level(MIN_ZOOM);
        self.set_visible_range(self.full.start, self.full.end)
    }

    /// Show a window of `window` width placed at `position` (0 = start of
    /// the full range, 1 = end). A window wider than the full range, or a
    /// zero-length full range, shows everything.
    pub fn set_window(&mut self, window: TimeDelta, position: f64) -> Result<()> {
        let total = self.full.duration();
        let window = window.min(total);
        if total <= TimeDelta::zero() || window <= TimeDelta::zero() {
            return self.set_visible_range(self.full.start, self.full.end);
        }

        let position = if position.is_nan() {
            0.0
        } else {
            position.clamp(0.0, 1.0)
        };
        let offset = scale(total - window, position);
        let start = self.full.start + offset;
        self.set_visible_range(start, start + window)
    }

    /// Where the visible window sits within the full range, in [0, 1]
    pub fn window_position(&self) -> f64 {
        let max_offset = self.full.duration() - self.visible.duration();
        let offset = self.visible.start - self.full.start;
        match (offset.num_nanoseconds(), max_offset.num_nanoseconds()) {
            (Some(offset), Some(max)) if max > 0 => (offset as f64 / max as f64).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}
