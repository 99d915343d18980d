//! # Elapsed Time Axis Module
//!
//! Derives the elapsed-seconds axis of a session and provides the index
//! searches the view window and segmentation code build on.
//!
//! Elapsed time is derived, never stored on the samples:
//! `elapsed(i) = max(elapsed(i-1), time(i) - time(0))`. Samples with an
//! unreadable timestamp carry the previous value forward, so the axis is
//! non-decreasing even for malformed or out-of-order input. Duplicate
//! timestamps simply produce equal consecutive values.

use crate::sample::Sample;
use chrono::{DateTime, Utc};

/// Elapsed seconds since the first sample, one entry per sample
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElapsedAxis {
    secs: Vec<f64>,
}

impl ElapsedAxis {
    pub fn from_samples(samples: &[Sample]) -> Self {
        let origin = samples.iter().find_map(|s| s.time());
        let mut secs = Vec::with_capacity(samples.len());
        let mut last = 0.0_f64;

        for sample in samples {
            let value = match (origin, sample.time()) {
                (Some(origin), Some(time)) => seconds_between(origin, time).max(last),
                _ => last,
            };
            secs.push(value);
            last = value;
        }

        Self { secs }
    }

    pub fn len(&self) -> usize {
        self.secs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.secs.get(index).copied()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.secs
    }

    /// Elapsed time of the last sample, 0 for an empty axis
    pub fn total_duration(&self) -> f64 {
        self.secs.last().copied().unwrap_or(0.0)
    }

    /// First index whose elapsed time is at least `secs`
    pub fn first_at_or_after(&self, secs: f64) -> Option<usize> {
        let idx = self.secs.partition_point(|&t| t < secs);
        (idx < self.secs.len()).then_some(idx)
    }
}

fn seconds_between(origin: DateTime<Utc>, time: DateTime<Utc>) -> f64 {
    (time - origin).num_milliseconds() as f64 / 1000.0
}

/// Parse `HH:MM:SS`, `MM:SS` or `SS` into seconds
///
/// The leading component is unbounded (`90` or `75:00` are fine); later
/// components must be below 60. The last component may carry a fraction.
pub fn parse_clock(text: &str) -> Option<f64> {
    let parts: Vec<&str> = text.trim().split(':').map(str::trim).collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }

    let last = parts.len() - 1;
    let mut total = 0.0;
    for (i, part) in parts.iter().enumerate() {
        let value = if i == last {
            part.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)?
        } else {
            if !part.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            part.parse::<u64>().ok()? as f64
        };
        if i > 0 && value >= 60.0 {
            return None;
        }
        total = total * 60.0 + value;
    }

    Some(total)
}

/// Format seconds as `HH:MM:SS`
pub fn format_clock(secs: f64) -> String {
    let whole = secs.max(0.0).floor() as u64;
    format!("{:02}:{:02}:{:02}", whole / 3600, (whole / 60) % 60, whole % 60)
}

pub trait SampleSliceExt {
    fn min_max_time(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)>;
    fn min_max_channel(&self, channel: &str) -> Option<(f64, f64)>;
    fn anomaly_count(&self) -> usize;
}

impl SampleSliceExt for [Sample] {
    fn min_max_time(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.iter()
            .filter_map(Sample::time)
            .fold(None, |acc, time| match acc {
                None => Some((time, time)),
                Some((min, max)) => Some((min.min(time), max.max(time))),
            })
    }

    fn min_max_channel(&self, channel: &str) -> Option<(f64, f64)> {
        self.iter()
            .filter_map(|s| s.channel(channel))
            .fold(None, |acc, value| match acc {
                None => Some((value, value)),
                Some((min, max)) => Some((min.min(value), max.max(value))),
            })
    }

    fn anomaly_count(&self) -> usize {
        self.iter().filter(|s| s.anomaly == 1).count()
    }
}
