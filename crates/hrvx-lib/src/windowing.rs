//! Partitioning of one subject's series into analysis windows.
//!
//! `time_related` buckets samples into left-closed spans of `window_size` seconds measured
//! from the first timestamp. The label policies anchor one window on every label
//! transition (an index whose label differs from its predecessor):
//!
//! * `label_related_before`: `[anchor - window_size, anchor)`
//! * `label_related_after`: `[anchor, anchor + window_size)`
//! * `label_related_middle`: `[anchor - window_size / 2, anchor + window_size / 2)`
//!
//! Label windows never cross into a neighbouring anchor's territory: `before` stops at the
//! previous transition, `after` at the next one, and `middle` at the midpoint between
//! adjacent anchors. Windows that end up with no samples are dropped and ids are assigned
//! afterwards, so ids are always `0..N`.

use crate::error::HRVError;
use crate::sample::validate_timestamps;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

pub const DEFAULT_WINDOW_SIZE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowingMethod {
    TimeRelated,
    LabelRelatedBefore,
    LabelRelatedAfter,
    #[serde(alias = "label_related_centered")]
    LabelRelatedMiddle,
}

impl WindowingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowingMethod::TimeRelated => "time_related",
            WindowingMethod::LabelRelatedBefore => "label_related_before",
            WindowingMethod::LabelRelatedAfter => "label_related_after",
            WindowingMethod::LabelRelatedMiddle => "label_related_middle",
        }
    }

    pub fn is_label_related(&self) -> bool {
        !matches!(self, WindowingMethod::TimeRelated)
    }
}

impl fmt::Display for WindowingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WindowingMethod {
    type Err = HRVError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "time_related" => Ok(WindowingMethod::TimeRelated),
            "label_related_before" => Ok(WindowingMethod::LabelRelatedBefore),
            "label_related_after" => Ok(WindowingMethod::LabelRelatedAfter),
            "label_related_middle" | "label_related_centered" => {
                Ok(WindowingMethod::LabelRelatedMiddle)
            }
            other => Err(HRVError::configuration(format!(
                "window_slicing_method '{other}' not supported"
            ))),
        }
    }
}

/// Slicing method plus window length in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowingPolicy {
    method: WindowingMethod,
    window_size: f64,
}

impl WindowingPolicy {
    pub fn new(method: WindowingMethod, window_size: f64) -> Result<Self, HRVError> {
        if !window_size.is_finite() || window_size <= 0.0 {
            return Err(HRVError::configuration(format!(
                "window_size must be a positive number of seconds, got {window_size}"
            )));
        }
        Ok(Self {
            method,
            window_size,
        })
    }

    /// Build a policy from the textual method name used in batch configs.
    pub fn parse(method: &str, window_size: f64) -> Result<Self, HRVError> {
        Self::new(method.parse()?, window_size)
    }

    pub fn method(&self) -> WindowingMethod {
        self.method
    }

    pub fn window_size(&self) -> f64 {
        self.window_size
    }
}

impl Default for WindowingPolicy {
    fn default() -> Self {
        Self {
            method: WindowingMethod::TimeRelated,
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}

/// A contiguous run of samples of one recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    /// Ordinal within the subject.
    pub id: usize,
    /// Timestamp of the first sample.
    pub start: f64,
    /// Timestamp of the last sample.
    pub end: f64,
    /// Sample indices covered, relative to the recording.
    pub range: Range<usize>,
}

impl Window {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// The part of a parallel per-sample sequence that falls into this window.
    pub fn select<'a, T>(&self, data: &'a [T]) -> &'a [T] {
        &data[self.range.clone()]
    }
}

/// Split a series into ordered, non-overlapping windows under `policy`.
///
/// `labels` is only consulted by the label policies, but must then match `timestamps`
/// in length.
pub fn slice_windows(
    timestamps: &[f64],
    labels: &[String],
    policy: &WindowingPolicy,
) -> Result<Vec<Window>, HRVError> {
    validate_timestamps(timestamps)?;
    let size = policy.window_size();
    let anchoring = match policy.method() {
        WindowingMethod::TimeRelated => None,
        WindowingMethod::LabelRelatedBefore => Some(Anchoring::Before),
        WindowingMethod::LabelRelatedAfter => Some(Anchoring::After),
        WindowingMethod::LabelRelatedMiddle => Some(Anchoring::Middle),
    };
    let spans = match anchoring {
        None => time_spans(timestamps, size),
        Some(anchoring) => {
            if labels.len() != timestamps.len() {
                return Err(HRVError::invalid_signal(format!(
                    "label length {} differs from timestamp length {}",
                    labels.len(),
                    timestamps.len()
                )));
            }
            label_spans(timestamps, labels, anchoring, size)
        }
    };
    Ok(spans
        .into_iter()
        .filter(|range| !range.is_empty())
        .enumerate()
        .map(|(id, range)| Window {
            id,
            start: timestamps[range.start],
            end: timestamps[range.end - 1],
            range,
        })
        .collect())
}

fn time_spans(timestamps: &[f64], size: f64) -> Vec<Range<usize>> {
    let origin = timestamps[0];
    let bucket = |t: f64| bucket_index((t - origin) / size);
    let mut spans = Vec::new();
    let mut start = 0;
    let mut current = bucket(origin);
    for (i, &t) in timestamps.iter().enumerate().skip(1) {
        let b = bucket(t);
        if b != current {
            spans.push(start..i);
            start = i;
            current = b;
        }
    }
    spans.push(start..timestamps.len());
    spans
}

/// `floor(q)`, except that a quotient within rounding distance of an integer snaps to it,
/// so a sample lying on a bucket edge opens the later bucket.
fn bucket_index(q: f64) -> u64 {
    let nearest = q.round();
    if (q - nearest).abs() <= BOUNDARY_TOLERANCE * nearest.abs().max(1.0) {
        nearest as u64
    } else {
        q.floor() as u64
    }
}

const BOUNDARY_TOLERANCE: f64 = 1e-9;

/// Indices whose label differs from the previous sample's label.
pub fn label_anchors(labels: &[String]) -> Vec<usize> {
    labels
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[0] != pair[1])
        .map(|(i, _)| i + 1)
        .collect()
}

#[derive(Clone, Copy)]
enum Anchoring {
    Before,
    After,
    Middle,
}

fn label_spans(
    timestamps: &[f64],
    labels: &[String],
    anchoring: Anchoring,
    size: f64,
) -> Vec<Range<usize>> {
    let n = timestamps.len();
    let first_at_or_after = |t: f64| timestamps.partition_point(|&x| x < t);
    let anchors = label_anchors(labels);
    let mut spans = Vec::with_capacity(anchors.len());
    for (k, &idx) in anchors.iter().enumerate() {
        let at = timestamps[idx];
        let prev = k.checked_sub(1).map(|p| anchors[p]);
        let next = anchors.get(k + 1).copied();
        let (lo, hi) = match anchoring {
            Anchoring::Before => {
                let lo = first_at_or_after(at - size).max(prev.unwrap_or(0));
                (lo, idx)
            }
            Anchoring::After => {
                let hi = first_at_or_after(at + size).min(next.unwrap_or(n));
                (idx, hi)
            }
            Anchoring::Middle => {
                let half = size / 2.0;
                let lower_bound = prev
                    .map(|p| first_at_or_after((timestamps[p] + at) / 2.0))
                    .unwrap_or(0);
                let upper_bound = next
                    .map(|q| first_at_or_after((at + timestamps[q]) / 2.0))
                    .unwrap_or(n);
                (
                    first_at_or_after(at - half).max(lower_bound),
                    first_at_or_after(at + half).min(upper_bound),
                )
            }
        };
        if lo < hi {
            spans.push(lo..hi);
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(n: usize, fs: f64) -> Vec<f64> {
        (0..n).map(|i| i as f64 / fs).collect()
    }

    fn labels(segments: &[(&str, usize)]) -> Vec<String> {
        segments
            .iter()
            .flat_map(|(label, count)| std::iter::repeat(label.to_string()).take(*count))
            .collect()
    }

    fn policy(method: WindowingMethod, size: f64) -> WindowingPolicy {
        WindowingPolicy::new(method, size).unwrap()
    }

    #[test]
    fn samples_on_bucket_edges_open_the_later_bucket() {
        // 0.3 / 0.1 evaluates to 2.9999999999999996
        let ts = vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5];
        let windows =
            slice_windows(&ts, &[], &policy(WindowingMethod::TimeRelated, 0.1)).unwrap();
        assert_eq!(windows.len(), 6);
        for (i, w) in windows.iter().enumerate() {
            assert_eq!(w.range, i..i + 1);
            assert_eq!(w.start, ts[i]);
        }
    }

    #[test]
    fn ten_seconds_at_two_hz_gives_two_windows() {
        let ts = uniform(20, 2.0);
        let windows = slice_windows(&ts, &[], &WindowingPolicy::default()).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].id, 0);
        assert_eq!(windows[1].id, 1);
        assert_eq!(windows[0].len(), 10);
        assert_eq!(windows[1].len(), 10);
        assert_eq!(windows[0].start, 0.0);
        assert_eq!(windows[0].end, 4.5);
        assert_eq!(windows[1].start, 5.0);
    }

    #[test]
    fn time_windows_cover_every_sample_once() {
        let ts = uniform(97, 3.0);
        for size in [0.1, 0.7, 1.0, 2.5, 5.0, 31.0, 1000.0] {
            let windows = slice_windows(&ts, &[], &policy(WindowingMethod::TimeRelated, size))
                .unwrap();
            let covered: Vec<usize> = windows.iter().flat_map(|w| w.range.clone()).collect();
            assert_eq!(covered, (0..ts.len()).collect::<Vec<_>>(), "size {size}");
            assert!(windows.windows(2).all(|w| w[0].start < w[1].start));
            assert!(windows.iter().enumerate().all(|(i, w)| w.id == i));
        }
    }

    #[test]
    fn empty_time_buckets_are_skipped() {
        let ts = vec![0.0, 1.0, 2.0, 12.0, 13.0, 21.0];
        let windows =
            slice_windows(&ts, &[], &policy(WindowingMethod::TimeRelated, 5.0)).unwrap();
        let ranges: Vec<_> = windows.iter().map(|w| w.range.clone()).collect();
        assert_eq!(ranges, vec![0..3, 3..5, 5..6]);
        assert_eq!(windows[2].id, 2);
    }

    #[test]
    fn degenerate_series_fail() {
        let p = WindowingPolicy::default();
        assert!(matches!(
            slice_windows(&[1.0], &[], &p),
            Err(HRVError::InvalidSignal(_))
        ));
        assert!(matches!(
            slice_windows(&[0.0, 2.0, 1.0], &[], &p),
            Err(HRVError::InvalidSignal(_))
        ));
    }

    #[test]
    fn unknown_method_is_configuration_error() {
        assert!(matches!(
            "foo".parse::<WindowingMethod>(),
            Err(HRVError::Configuration(_))
        ));
        assert!(matches!(
            WindowingPolicy::parse("foo", 5.0),
            Err(HRVError::Configuration(_))
        ));
    }

    #[test]
    fn non_positive_window_size_is_configuration_error() {
        for size in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                WindowingPolicy::new(WindowingMethod::TimeRelated, size),
                Err(HRVError::Configuration(_))
            ));
        }
    }

    #[test]
    fn centered_is_accepted_as_middle() {
        assert_eq!(
            "label_related_centered".parse::<WindowingMethod>().unwrap(),
            WindowingMethod::LabelRelatedMiddle
        );
        let parsed: WindowingMethod = serde_json::from_str("\"label_related_centered\"").unwrap();
        assert_eq!(parsed, WindowingMethod::LabelRelatedMiddle);
    }

    #[test]
    fn label_windows_around_single_transition() {
        let ts = uniform(20, 1.0);
        let lb = labels(&[("rest", 10), ("stress", 10)]);
        let before =
            slice_windows(&ts, &lb, &policy(WindowingMethod::LabelRelatedBefore, 4.0)).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].range, 6..10);
        assert_eq!((before[0].start, before[0].end), (6.0, 9.0));

        let after =
            slice_windows(&ts, &lb, &policy(WindowingMethod::LabelRelatedAfter, 4.0)).unwrap();
        assert_eq!(after[0].range, 10..14);

        let middle =
            slice_windows(&ts, &lb, &policy(WindowingMethod::LabelRelatedMiddle, 4.0)).unwrap();
        assert_eq!(middle[0].range, 8..12);
    }

    #[test]
    fn label_windows_do_not_overlap_close_anchors() {
        let ts = uniform(20, 1.0);
        let lb = labels(&[("a", 10), ("b", 2), ("c", 8)]);
        let ranges = |method| {
            slice_windows(&ts, &lb, &policy(method, 4.0))
                .unwrap()
                .into_iter()
                .map(|w| w.range)
                .collect::<Vec<_>>()
        };
        assert_eq!(ranges(WindowingMethod::LabelRelatedBefore), vec![6..10, 10..12]);
        assert_eq!(ranges(WindowingMethod::LabelRelatedAfter), vec![10..12, 12..16]);
        assert_eq!(ranges(WindowingMethod::LabelRelatedMiddle), vec![8..11, 11..14]);
    }

    #[test]
    fn middle_window_is_clipped_to_series_bounds() {
        let ts = uniform(6, 1.0);
        let lb = labels(&[("a", 1), ("b", 5)]);
        let windows =
            slice_windows(&ts, &lb, &policy(WindowingMethod::LabelRelatedMiddle, 10.0)).unwrap();
        assert_eq!(windows[0].range, 0..6);
    }

    #[test]
    fn no_transitions_means_no_label_windows() {
        let ts = uniform(10, 1.0);
        let lb = labels(&[("undefined", 10)]);
        let windows =
            slice_windows(&ts, &lb, &policy(WindowingMethod::LabelRelatedAfter, 2.0)).unwrap();
        assert!(windows.is_empty());
    }

    #[test]
    fn label_policies_require_matching_labels() {
        let ts = uniform(10, 1.0);
        let err = slice_windows(&ts, &[], &policy(WindowingMethod::LabelRelatedBefore, 2.0))
            .unwrap_err();
        assert!(matches!(err, HRVError::InvalidSignal(_)));
    }

    #[test]
    fn anchors_mark_label_changes() {
        let lb = labels(&[("a", 2), ("b", 3), ("a", 1)]);
        assert_eq!(label_anchors(&lb), vec![2, 5]);
    }
}
