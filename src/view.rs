//! # View Window Module
//!
//! Owns the visible slice of a session's samples for zooming and panning,
//! and derives padded axis ranges for display.
//!
//! ## Key Types
//! - `ViewWindow`: Inclusive `[start, end]` index range into the samples
//! - `ViewWindowManager`: Current window plus clamped mutation
//! - `AxisRange`: Display range for the elapsed-time axis
//!
//! Callers are never trusted to pass valid indices. Every mutation clamps
//! so that `0 <= start <= end < len` holds; an empty session has no window.

use crate::error::RangeError;
use crate::sample::Sample;
use crate::timeline::{parse_clock, ElapsedAxis};

/// Default padding fraction applied on both sides of an axis range
pub const DEFAULT_AXIS_PADDING: f64 = 0.05;

/// Inclusive index range into a sample sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewWindow {
    pub start: usize,
    pub end: usize,
}

impl ViewWindow {
    /// Number of samples covered
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index <= self.end
    }
}

/// Elapsed-time display range
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AxisRange {
    Padded { min: f64, max: f64 },
    /// Show the whole session; used instead of a zero-width range
    FullExtent,
}

/// Time span presets for "show the last N seconds"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPreset {
    TenSeconds,
    ThirtySeconds,
    OneMinute,
    TwoMinutes,
}

impl WindowPreset {
    pub fn as_secs(&self) -> f64 {
        match self {
            WindowPreset::TenSeconds => 10.0,
            WindowPreset::ThirtySeconds => 30.0,
            WindowPreset::OneMinute => 60.0,
            WindowPreset::TwoMinutes => 120.0,
        }
    }
}

/// Tracks the visible window over a sequence of `len` samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewWindowManager {
    len: usize,
    window: Option<ViewWindow>,
}

impl ViewWindowManager {
    pub fn new(len: usize) -> Self {
        let mut manager = Self::default();
        manager.reset(len);
        manager
    }

    /// Show the full sequence, or nothing for an empty one
    pub fn reset(&mut self, len: usize) {
        self.len = len;
        self.window = (len > 0).then(|| ViewWindow {
            start: 0,
            end: len - 1,
        });
    }

    pub fn window(&self) -> Option<ViewWindow> {
        self.window
    }

    pub fn sequence_len(&self) -> usize {
        self.len
    }

    /// Store a window after clamping `start` to `[0, len-1]` and `end` to `[start, len-1]`
    pub fn set_window(&mut self, start: i64, end: i64) -> Option<ViewWindow> {
        if self.len == 0 {
            self.window = None;
            return None;
        }

        let last = (self.len - 1) as i64;
        let start = start.clamp(0, last);
        let end = end.clamp(start, last);
        self.window = Some(ViewWindow {
            start: start as usize,
            end: end as usize,
        });
        self.window
    }

    /// Resolve a textual time range (`HH:MM:SS`, `MM:SS` or `SS`) to a window
    ///
    /// The start resolves to the first sample at or after the start time, the
    /// end to the first sample at or after the end time, falling back to the
    /// last sample when nothing reaches that far.
    pub fn by_time_string(
        &mut self,
        start: &str,
        end: &str,
        axis: &ElapsedAxis,
    ) -> Result<ViewWindow, RangeError> {
        let start_secs = parse_clock(start).ok_or_else(|| RangeError::InvalidTime(start.to_string()))?;
        let end_secs = parse_clock(end).ok_or_else(|| RangeError::InvalidTime(end.to_string()))?;
        if start_secs >= end_secs {
            return Err(RangeError::EmptyRange {
                start: start_secs,
                end: end_secs,
            });
        }
        if axis.is_empty() {
            return Err(RangeError::NoSamples);
        }

        let last = axis.len() - 1;
        let start_idx = axis.first_at_or_after(start_secs).unwrap_or(last);
        let end_idx = axis.first_at_or_after(end_secs).unwrap_or(last);

        self.len = axis.len();
        self.set_window(start_idx as i64, end_idx as i64)
            .ok_or(RangeError::NoSamples)
    }

    /// Halve the window width around its centre
    pub fn zoom_in(&mut self) -> Option<ViewWindow> {
        let window = self.window?;
        let width = (window.len() / 2).max(1);
        let centre = (window.start + window.end) / 2;
        let start = centre as i64 - (width as i64 - 1) / 2;
        self.set_window(start, start + width as i64 - 1)
    }

    /// Double the window width around its centre, shifted to stay in bounds
    pub fn zoom_out(&mut self) -> Option<ViewWindow> {
        let window = self.window?;
        let width = (window.len() * 2).min(self.len);
        let centre = (window.start + window.end) / 2;
        let max_start = (self.len - width) as i64;
        let start = (centre as i64 - (width as i64 - 1) / 2).clamp(0, max_start);
        self.set_window(start, start + width as i64 - 1)
    }

    /// Shift the window by `delta` samples, keeping its width
    pub fn pan(&mut self, delta: i64) -> Option<ViewWindow> {
        let window = self.window?;
        let width = window.len() as i64;
        let max_start = self.len as i64 - width;
        let start = (window.start as i64 + delta).clamp(0, max_start);
        self.set_window(start, start + width - 1)
    }

    /// Show the last `preset` seconds ending at the current window end
    pub fn show_preset(&mut self, preset: WindowPreset, axis: &ElapsedAxis) -> Option<ViewWindow> {
        let window = self.window?;
        let end_secs = axis.get(window.end)?;
        let start = axis
            .first_at_or_after(end_secs - preset.as_secs())
            .unwrap_or(window.end);
        self.set_window(start as i64, window.end as i64)
    }

    /// Samples inside the current window
    pub fn visible<'a>(&self, samples: &'a [Sample]) -> &'a [Sample] {
        match self.window {
            Some(w) if w.end < samples.len() => &samples[w.start..=w.end],
            _ => &[],
        }
    }
}

/// Padded elapsed-time range for a window
///
/// Pads both sides by `padding` times the window's elapsed span. A window
/// that is absent, covers one sample, or spans zero seconds yields
/// `AxisRange::FullExtent` instead of a degenerate range.
pub fn axis_range(window: Option<ViewWindow>, axis: &ElapsedAxis, padding: f64) -> AxisRange {
    let Some(window) = window else {
        return AxisRange::FullExtent;
    };
    if window.start == window.end {
        return AxisRange::FullExtent;
    }

    match (axis.get(window.start), axis.get(window.end)) {
        (Some(start), Some(end)) if end > start => {
            let pad = padding * (end - start);
            AxisRange::Padded {
                min: start - pad,
                max: end + pad,
            }
        }
        _ => AxisRange::FullExtent,
    }
}
