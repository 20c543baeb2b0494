//! Master time grid shared by every synchronized modality.

use crate::error::{SyncError, SyncResult};

/// Evenly spaced timestamps covering `[0, duration]`, both ends included.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetTimeline {
    rate: u32,
    duration: f64,
    points: Vec<f64>,
}

/// Build the master timeline for `duration` seconds at `target_rate` Hz.
///
/// Yields `floor(duration * target_rate)` points from `0` to `duration`
/// inclusive, so the effective spacing is `duration / (n - 1)` rather than
/// exactly `1 / target_rate`. Point `i` is `i * step` and the last point is
/// `duration` exactly.
pub fn build(duration: f64, target_rate: u32) -> SyncResult<TargetTimeline> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(SyncError::InvalidDuration { duration });
    }
    if target_rate == 0 {
        return Err(SyncError::InvalidRate { rate: target_rate });
    }

    let n = (duration * f64::from(target_rate)).floor() as usize;
    let points = match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => {
            let step = duration / (n - 1) as f64;
            let mut points: Vec<f64> = (0..n).map(|i| i as f64 * step).collect();
            points[n - 1] = duration;
            points
        }
    };

    Ok(TargetTimeline {
        rate: target_rate,
        duration,
        points,
    })
}

impl TargetTimeline {
    pub fn as_slice(&self) -> &[f64] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Nominal rate the timeline was built for.
    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Actual spacing between consecutive points.
    pub fn spacing(&self) -> Option<f64> {
        match self.points.len() {
            0 | 1 => None,
            n => Some(self.duration / (n - 1) as f64),
        }
    }

    /// Index of the point closest to `t`; `None` on an empty timeline or a
    /// non-finite `t`.
    pub fn nearest_index(&self, t: f64) -> Option<usize> {
        if self.points.is_empty() || !t.is_finite() {
            return None;
        }
        let upper = self.points.partition_point(|&p| p < t);
        if upper == 0 {
            return Some(0);
        }
        if upper == self.points.len() {
            return Some(upper - 1);
        }
        let lower = upper - 1;
        if t - self.points[lower] <= self.points[upper] - t {
            Some(lower)
        } else {
            Some(upper)
        }
    }
}
