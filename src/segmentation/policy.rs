use crate::error::SegmentError;

/// How to partition a session into segments.
#[derive(Debug, Clone, PartialEq)]
pub enum SplitPolicy {
    /// Exactly `k` segments; the last one absorbs the remainder
    Count(usize),

    /// Consecutive windows of this many elapsed seconds
    Duration(f64),

    /// Groups of `per_segment` samples that have a value on `channel`
    Points { per_segment: usize, channel: String },
}

impl SplitPolicy {
    pub fn validate(&self) -> Result<(), SegmentError> {
        match self {
            SplitPolicy::Count(0) => Err(SegmentError::InvalidParameter(
                "segment count must be at least 1".into(),
            )),
            SplitPolicy::Duration(secs) if !secs.is_finite() || *secs <= 0.0 => {
                Err(SegmentError::InvalidParameter(format!(
                    "segment duration must be a positive number of seconds, got {}",
                    secs
                )))
            }
            SplitPolicy::Points { per_segment: 0, .. } => Err(SegmentError::InvalidParameter(
                "points per segment must be at least 1".into(),
            )),
            _ => Ok(()),
        }
    }
}
