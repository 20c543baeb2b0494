//! Linear resampling of a modality onto arbitrary target times.

use std::fmt;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::data::model::{Channel, ModalityTable};
use crate::error::{SyncError, SyncResult};

/// What to do with target times outside the valid source range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryMode {
    /// Continue the line through the two nearest valid samples.
    #[default]
    Extrapolate,
    /// Hold the first / last valid value.
    Clamp,
}

impl FromStr for BoundaryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "extrapolate" => Ok(BoundaryMode::Extrapolate),
            "clamp" => Ok(BoundaryMode::Clamp),
            other => Err(format!("unknown boundary mode '{other}' (expected extrapolate or clamp)")),
        }
    }
}

impl fmt::Display for BoundaryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryMode::Extrapolate => write!(f, "extrapolate"),
            BoundaryMode::Clamp => write!(f, "clamp"),
        }
    }
}

/// Resample every channel of `table` onto `target_time`.
///
/// The returned table's time vector is a copy of `target_time`. Channels with
/// fewer than two valid samples come back all-NaN.
pub fn resample(
    table: &ModalityTable,
    target_time: &[f64],
    mode: BoundaryMode,
) -> SyncResult<ModalityTable> {
    check_source_time(table.time())?;

    let channels = table
        .channels()
        .iter()
        .map(|ch| {
            if ch.values.len() != table.len() {
                return Err(length_mismatch(&ch.name, ch.values.len(), table.len()));
            }
            let values = interpolate(table.time(), &ch.values, target_time, mode);
            if ch.valid_count() < 2 {
                warn!(
                    "{}: channel '{}' has {} valid samples, output is all NaN",
                    table.name(),
                    ch.name,
                    ch.valid_count()
                );
            }
            Ok(ch.with_values(values))
        })
        .collect::<SyncResult<Vec<Channel>>>()?;

    Ok(ModalityTable::from_parts(
        table.name().to_string(),
        table.native_rate(),
        target_time.to_vec(),
        channels,
    ))
}

/// Resample a single `(source_time, values)` series onto `target_time`.
pub fn resample_channel(
    source_time: &[f64],
    values: &[f64],
    target_time: &[f64],
    mode: BoundaryMode,
) -> SyncResult<Vec<f64>> {
    if values.len() != source_time.len() {
        return Err(length_mismatch("series", values.len(), source_time.len()));
    }
    check_source_time(source_time)?;
    Ok(interpolate(source_time, values, target_time, mode))
}

fn length_mismatch(channel: &str, values: usize, time: usize) -> SyncError {
    SyncError::interpolation(format!(
        "channel '{channel}' has {values} values but source time has {time}"
    ))
}

fn check_source_time(time: &[f64]) -> SyncResult<()> {
    if let Some(i) = time.iter().position(|t| !t.is_finite()) {
        return Err(SyncError::interpolation(format!(
            "source time[{i}] is not finite"
        )));
    }
    if let Some(i) = time.windows(2).position(|w| w[1] <= w[0]) {
        return Err(SyncError::interpolation(format!(
            "source time is not strictly increasing at index {}",
            i + 1
        )));
    }
    Ok(())
}

/// Piecewise-linear interpolation over the non-NaN samples.
///
/// For each target `t` the segment is chosen as `[x[i-1], x[i]]` where `i` is
/// the first index with `x[i] >= t`, clipped to `1..=n-1`. Targets outside
/// the valid range therefore reuse the first or last segment, which is the
/// extrapolation rule.
fn interpolate(time: &[f64], values: &[f64], target: &[f64], mode: BoundaryMode) -> Vec<f64> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = time
        .iter()
        .zip(values)
        .filter(|(_, v)| !v.is_nan())
        .map(|(&t, &v)| (t, v))
        .unzip();

    let n = xs.len();
    if n < 2 {
        return vec![f64::NAN; target.len()];
    }

    target
        .iter()
        .map(|&t| {
            if mode == BoundaryMode::Clamp {
                if t < xs[0] {
                    return ys[0];
                }
                if t > xs[n - 1] {
                    return ys[n - 1];
                }
            }
            let hi = xs.partition_point(|&x| x < t).clamp(1, n - 1);
            let lo = hi - 1;
            let slope = (ys[hi] - ys[lo]) / (xs[hi] - xs[lo]);
            slope * (t - xs[lo]) + ys[lo]
        })
        .collect()
}
