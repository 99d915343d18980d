use crate::error::SegmentError;
use crate::sample::Sample;
use crate::segmentation::policy::SplitPolicy;
use crate::timeline::ElapsedAxis;
use crate::view::ViewWindow;

/// Main partitioning function: turns a session into ordered segments.
pub fn partition(
    samples: &[Sample],
    axis: &ElapsedAxis,
    policy: &SplitPolicy,
) -> Result<Vec<ViewWindow>, SegmentError> {
    policy.validate()?;

    if samples.is_empty() {
        return Err(SegmentError::EmptySession);
    }

    match policy {
        SplitPolicy::Count(k) => Ok(split_by_count(samples.len(), *k)),
        SplitPolicy::Duration(secs) => Ok(split_by_duration(axis, *secs)),
        SplitPolicy::Points {
            per_segment,
            channel,
        } => split_by_points(samples, *per_segment, channel),
    }
}

/// Split `len` samples into `k` segments of `floor(len / k)`; the last takes the remainder.
pub fn split_by_count(len: usize, k: usize) -> Vec<ViewWindow> {
    if len == 0 || k == 0 {
        return Vec::new();
    }

    // More segments than samples would leave empty segments
    let k = k.min(len);
    let size = len / k;

    (0..k)
        .map(|i| {
            let start = i * size;
            let end = if i == k - 1 { len - 1 } else { start + size - 1 };
            ViewWindow { start, end }
        })
        .collect()
}

/// Carve the elapsed axis into consecutive `[t, t + secs)` windows.
///
/// A run of intervals without samples yields one single-sample segment at the
/// next sample, then carving resumes from the interval holding that sample.
pub fn split_by_duration(axis: &ElapsedAxis, secs: f64) -> Vec<ViewWindow> {
    if axis.is_empty() {
        return Vec::new();
    }

    let last = axis.len() - 1;
    let total = axis.total_duration();

    // Zero-length recording: nothing to carve, show it whole
    if total <= 0.0 {
        return vec![ViewWindow {
            start: 0,
            end: last,
        }];
    }

    let mut segments: Vec<ViewWindow> = Vec::new();
    let mut t = 0.0;
    let mut step = 0u64;

    while t < total {
        let Some(start) = axis.first_at_or_after(t) else {
            break;
        };
        // Multiply instead of accumulating to keep boundaries exact
        let next_t = (step + 1) as f64 * secs;
        let start_secs = axis.get(start).unwrap_or(total);

        let segment = if start_secs >= next_t {
            step = interval_holding(start_secs, secs).max(step + 1);
            ViewWindow { start, end: start }
        } else {
            let end = match axis.first_at_or_after(next_t) {
                Some(next) => next.saturating_sub(1),
                None => last,
            };
            step += 1;
            ViewWindow {
                start,
                end: end.max(start),
            }
        };

        if segments.last() != Some(&segment) {
            segments.push(segment);
        }
        t = step as f64 * secs;
    }

    segments
}

/// Index `n` of the interval with `n * secs <= at < (n + 1) * secs`
fn interval_holding(at: f64, secs: f64) -> u64 {
    let mut n = (at / secs).floor() as u64;
    while n > 0 && n as f64 * secs > at {
        n -= 1;
    }
    while (n + 1) as f64 * secs <= at {
        n += 1;
    }
    n
}

/// Chunk the samples that have a value on `channel` into groups of `per_segment`.
pub fn split_by_points(
    samples: &[Sample],
    per_segment: usize,
    channel: &str,
) -> Result<Vec<ViewWindow>, SegmentError> {
    if per_segment == 0 {
        return Err(SegmentError::InvalidParameter(
            "points per segment must be at least 1".into(),
        ));
    }

    let eligible: Vec<usize> = samples
        .iter()
        .filter(|s| s.channel(channel).is_some())
        .map(|s| s.sequence_index)
        .collect();

    if eligible.is_empty() {
        return Err(SegmentError::NoEligibleSamples {
            channel: channel.to_string(),
        });
    }

    Ok(eligible
        .chunks(per_segment)
        .map(|chunk| ViewWindow {
            start: chunk[0],
            end: chunk[chunk.len() - 1],
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::normalize_samples;
    use crate::timeline::tests::samples_at;
    use serde_json::{json, Value};

    fn assert_covers(segments: &[ViewWindow], len: usize) {
        assert_eq!(segments.first().map(|s| s.start), Some(0));
        assert_eq!(segments.last().map(|s| s.end), Some(len - 1));
        for pair in segments.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
        }
        for segment in segments {
            assert!(segment.start <= segment.end);
        }
    }

    #[test]
    fn test_split_by_count_even() {
        let segments = split_by_count(100, 4);
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[1], ViewWindow { start: 25, end: 49 });
        assert_covers(&segments, 100);
    }

    #[test]
    fn test_split_by_count_remainder() {
        let segments = split_by_count(10, 3);
        assert_eq!(
            segments,
            vec![
                ViewWindow { start: 0, end: 2 },
                ViewWindow { start: 3, end: 5 },
                ViewWindow { start: 6, end: 9 },
            ]
        );
    }

    #[test]
    fn test_split_by_count_covers_for_all_k() {
        for len in 1..40 {
            for k in 1..45 {
                let segments = split_by_count(len, k);
                assert_eq!(segments.len(), k.min(len));
                assert_covers(&segments, len);
            }
        }
    }

    #[test]
    fn test_split_by_duration() {
        let axis = ElapsedAxis::from_samples(&samples_at(&(0..10).collect::<Vec<_>>()));
        let segments = split_by_duration(&axis, 4.0);
        assert_eq!(
            segments,
            vec![
                ViewWindow { start: 0, end: 3 },
                ViewWindow { start: 4, end: 7 },
                ViewWindow { start: 8, end: 9 },
            ]
        );
    }

    #[test]
    fn test_split_by_duration_gap_yields_single_sample_segment() {
        let axis = ElapsedAxis::from_samples(&samples_at(&[0, 1, 25, 26]));
        let segments = split_by_duration(&axis, 10.0);
        assert_eq!(
            segments,
            vec![
                ViewWindow { start: 0, end: 1 },
                ViewWindow { start: 2, end: 2 },
                ViewWindow { start: 2, end: 3 },
            ]
        );
    }

    #[test]
    fn test_split_by_duration_long_gap_is_one_segment() {
        let axis = ElapsedAxis::from_samples(&samples_at(&[0, 1, 3600]));
        let segments = split_by_duration(&axis, 0.01);
        assert_eq!(
            segments,
            vec![
                ViewWindow { start: 0, end: 0 },
                ViewWindow { start: 1, end: 1 },
                ViewWindow { start: 2, end: 2 },
            ]
        );
    }

    #[test]
    fn test_split_by_duration_zero_length() {
        let axis = ElapsedAxis::from_samples(&samples_at(&[5, 5, 5]));
        assert_eq!(
            split_by_duration(&axis, 10.0),
            vec![ViewWindow { start: 0, end: 2 }]
        );
    }

    #[test]
    fn test_split_by_points_skips_missing_channel() {
        let records: Vec<Value> = (0..100)
            .map(|i| {
                if (40..60).contains(&i) {
                    json!({"timestamp": i, "heart_rate": null})
                } else {
                    json!({"timestamp": i, "heart_rate": 60 + i % 10})
                }
            })
            .collect();
        let samples = normalize_samples(&records);

        let segments = split_by_points(&samples, 20, "heart_rate").unwrap();
        assert_eq!(
            segments,
            vec![
                ViewWindow { start: 0, end: 19 },
                ViewWindow { start: 20, end: 39 },
                ViewWindow { start: 60, end: 79 },
                ViewWindow { start: 80, end: 99 },
            ]
        );
        for segment in &segments {
            let eligible = (segment.start..=segment.end)
                .filter(|&i| samples[i].channel("heart_rate").is_some())
                .count();
            assert_eq!(eligible, 20);
            assert!(!(40..60).any(|i| segment.contains(i)));
        }
    }

    #[test]
    fn test_split_by_points_no_eligible_samples() {
        let samples = normalize_samples(&[json!({"heart_rate": null}), json!({})]);
        assert_eq!(
            split_by_points(&samples, 5, "heart_rate"),
            Err(SegmentError::NoEligibleSamples {
                channel: "heart_rate".into()
            })
        );
    }

    #[test]
    fn test_split_by_points_rejects_zero_per_segment() {
        assert!(matches!(
            split_by_points(&samples_at(&[0, 1]), 0, "heart_rate"),
            Err(SegmentError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_partition_rejects_empty_and_invalid() {
        let axis = ElapsedAxis::default();
        assert_eq!(
            partition(&[], &axis, &SplitPolicy::Count(2)),
            Err(SegmentError::EmptySession)
        );
        assert!(matches!(
            partition(&[], &axis, &SplitPolicy::Count(0)),
            Err(SegmentError::InvalidParameter(_))
        ));
    }
}
