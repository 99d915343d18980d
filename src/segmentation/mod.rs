//! # Segmentation Module
//!
//! Deterministically partitions a session into ordered, non-overlapping
//! segments for systematic review, then walks through them one at a time.
//!
//! ## Policies
//! - By count: `k` segments, the last absorbing the remainder
//! - By duration: consecutive windows of `d` elapsed seconds
//! - By points: groups of `p` samples that have a value on a channel
//!
//! Traversal is clamped: `next()` on the last segment and `previous()` on
//! the first are no-ops.

pub mod algorithm;
pub mod policy;

pub use algorithm::partition;
pub use policy::SplitPolicy;

use crate::error::SegmentError;
use crate::sample::Sample;
use crate::timeline::ElapsedAxis;
use crate::view::{ViewWindow, ViewWindowManager};

/// An ordered partition of a session plus the segment under review
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    policy: SplitPolicy,
    segments: Vec<ViewWindow>,
    current: usize,
}

impl Segmentation {
    pub fn build(
        samples: &[Sample],
        axis: &ElapsedAxis,
        policy: SplitPolicy,
    ) -> Result<Self, SegmentError> {
        let segments = partition(samples, axis, &policy)?;
        log::debug!("Split {} samples into {} segments ({:?})", samples.len(), segments.len(), policy);

        Ok(Self {
            policy,
            segments,
            current: 0,
        })
    }

    pub fn policy(&self) -> &SplitPolicy {
        &self.policy
    }

    pub fn segments(&self) -> &[ViewWindow] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> Option<ViewWindow> {
        self.segments.get(self.current).copied()
    }

    pub fn is_first(&self) -> bool {
        self.current == 0
    }

    pub fn is_last(&self) -> bool {
        self.current + 1 >= self.segments.len()
    }

    pub fn next(&mut self) -> Option<ViewWindow> {
        if !self.is_last() {
            self.current += 1;
        }
        self.current()
    }

    pub fn previous(&mut self) -> Option<ViewWindow> {
        self.current = self.current.saturating_sub(1);
        self.current()
    }

    /// Jump to a segment, clamped to the valid range
    pub fn go_to(&mut self, index: usize) -> Option<ViewWindow> {
        self.current = index.min(self.segments.len().saturating_sub(1));
        self.current()
    }

    /// Point the view window at the current segment
    pub fn apply(&self, view: &mut ViewWindowManager) -> Option<ViewWindow> {
        let segment = self.current()?;
        view.set_window(segment.start as i64, segment.end as i64)
    }

    /// Drop the segmentation and show the whole session again
    pub fn clear(self, view: &mut ViewWindowManager) {
        let len = view.sequence_len();
        view.reset(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::tests::samples_at;

    fn build(count: usize, len: i64) -> (Segmentation, ViewWindowManager) {
        let samples = samples_at(&(0..len).collect::<Vec<_>>());
        let axis = ElapsedAxis::from_samples(&samples);
        let segmentation = Segmentation::build(&samples, &axis, SplitPolicy::Count(count)).unwrap();
        (segmentation, ViewWindowManager::new(samples.len()))
    }

    #[test]
    fn test_traversal_is_clamped() {
        let (mut segmentation, _) = build(3, 30);

        assert!(segmentation.is_first());
        assert_eq!(segmentation.previous(), Some(ViewWindow { start: 0, end: 9 }));
        assert_eq!(segmentation.current_index(), 0);

        segmentation.next();
        assert_eq!(segmentation.next(), Some(ViewWindow { start: 20, end: 29 }));
        assert!(segmentation.is_last());
        assert_eq!(segmentation.next(), Some(ViewWindow { start: 20, end: 29 }));
        assert_eq!(segmentation.current_index(), 2);
    }

    #[test]
    fn test_go_to_clamps() {
        let (mut segmentation, _) = build(4, 40);
        assert_eq!(segmentation.go_to(99), Some(ViewWindow { start: 30, end: 39 }));
        assert_eq!(segmentation.current_index(), 3);
    }

    #[test]
    fn test_apply_and_clear() {
        let (mut segmentation, mut view) = build(4, 40);
        segmentation.next();
        segmentation.apply(&mut view);
        assert_eq!(view.window(), Some(ViewWindow { start: 10, end: 19 }));

        segmentation.clear(&mut view);
        assert_eq!(view.window(), Some(ViewWindow { start: 0, end: 39 }));
    }
}
