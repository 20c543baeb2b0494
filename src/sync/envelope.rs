//! Rectified, Savitzky-Golay smoothed amplitude envelopes for display.

use crate::data::model::{Channel, ModalityTable};
use crate::error::{SyncError, SyncResult};

/// Polynomial order of the smoothing fit.
pub const ENVELOPE_POLY_ORDER: usize = 3;

/// Default smoothing window.
pub const DEFAULT_WINDOW_MS: f64 = 50.0;

/// Window length in samples for `window_ms` at `sampling_rate`.
///
/// `floor(window_ms * rate / 1000)`, bumped to odd, and at least the
/// smallest odd length greater than `polyorder`.
pub fn window_samples(window_ms: f64, sampling_rate: u32, polyorder: usize) -> usize {
    // `as usize` saturates: negative and NaN windows become 0.
    let raw = (window_ms * f64::from(sampling_rate) / 1000.0).floor() as usize;
    let odd = if raw % 2 == 0 { raw + 1 } else { raw };
    let min = if polyorder % 2 == 0 {
        polyorder + 1
    } else {
        polyorder + 2
    };
    odd.max(min)
}

/// Savitzky-Golay smoother: least-squares polynomial fit over a sliding
/// window. Edge samples are taken from the fit over the first / last full
/// window instead of padding the signal.
#[derive(Debug, Clone)]
pub struct SavitzkyGolay {
    window: usize,
    polyorder: usize,
    center: Vec<f64>,
}

impl SavitzkyGolay {
    /// `window` must be odd and greater than `polyorder`.
    pub fn new(window: usize, polyorder: usize) -> SyncResult<Self> {
        if window % 2 == 0 || window <= polyorder {
            return Err(SyncError::FilterDesign {
                reason: format!(
                    "Savitzky-Golay window {window} must be odd and greater than order {polyorder}"
                ),
            });
        }
        let center = fit_weights(window, polyorder, 0.0);
        Ok(Self {
            window,
            polyorder,
            center,
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn smooth(&self, x: &[f64]) -> Vec<f64> {
        let n = x.len();
        let w = self.window;
        if n < w {
            return x.to_vec();
        }
        let half = w / 2;
        let mut out = vec![0.0; n];

        for i in half..n - half {
            out[i] = dot(&self.center, &x[i - half..=i + half]);
        }

        let head = &x[..w];
        let tail = &x[n - w..];
        for i in 0..half {
            let t = i as f64 - half as f64;
            out[i] = dot(&fit_weights(w, self.polyorder, t), head);
            out[n - 1 - i] = dot(&fit_weights(w, self.polyorder, -t), tail);
        }
        out
    }
}

/// Envelope of every channel of `table`: `|x|`, smoothed, clipped at zero.
///
/// Channel `c` becomes `c_envelope`. A NaN sample makes every output whose
/// fit window covers it NaN. Tables shorter than the window are returned
/// rectified without building the smoother.
pub fn envelopes(
    table: &ModalityTable,
    window_ms: f64,
    sampling_rate: u32,
) -> SyncResult<ModalityTable> {
    if sampling_rate == 0 {
        return Err(SyncError::InvalidRate { rate: sampling_rate });
    }
    let window = window_samples(window_ms, sampling_rate, ENVELOPE_POLY_ORDER);
    // Fit weights cost O(window); skip them when no full window fits.
    let smoother = if table.len() >= window {
        Some(SavitzkyGolay::new(window, ENVELOPE_POLY_ORDER)?)
    } else {
        None
    };

    let channels = table
        .channels()
        .iter()
        .map(|ch| {
            let rectified: Vec<f64> = ch.values.iter().map(|v| v.abs()).collect();
            let values = match &smoother {
                Some(sg) => sg
                    .smooth(&rectified)
                    .into_iter()
                    .map(|v| if v < 0.0 { 0.0 } else { v })
                    .collect(),
                None => rectified,
            };
            Channel::new(format!("{}_envelope", ch.name), values)
        })
        .collect();

    Ok(ModalityTable::from_parts(
        format!("{}_envelopes", table.name()),
        table.native_rate(),
        table.time().to_vec(),
        channels,
    ))
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Weights `h` such that `h . y` is the least-squares polynomial of degree
/// `polyorder`, fitted to `y` sampled at offsets `-half..=half`, evaluated
/// at offset `t`.
///
/// `h = A (A^T A)^-1 v(t)` with `A` the Vandermonde matrix of the offsets and
/// `v(t) = [1, t, t^2, ...]`.
fn fit_weights(window: usize, polyorder: usize, t: f64) -> Vec<f64> {
    let half = (window / 2) as f64;
    let m = polyorder + 1;

    let a: Vec<Vec<f64>> = (0..window)
        .map(|i| {
            let u = i as f64 - half;
            (0..m).map(|j| u.powi(j as i32)).collect()
        })
        .collect();

    // Augmented [A^T A | v(t)], solved by Gauss-Jordan with partial pivoting.
    let mut aug = vec![vec![0.0; m + 1]; m];
    for r in 0..m {
        for c in 0..m {
            aug[r][c] = a.iter().map(|row| row[r] * row[c]).sum();
        }
        aug[r][m] = t.powi(r as i32);
    }
    for col in 0..m {
        let pivot_row = (col..m)
            .max_by(|&p, &q| aug[p][col].abs().total_cmp(&aug[q][col].abs()))
            .unwrap_or(col);
        aug.swap(col, pivot_row);
        let pivot = aug[col][col];
        if pivot.abs() < 1e-300 {
            continue;
        }
        for c in col..=m {
            aug[col][c] /= pivot;
        }
        for r in 0..m {
            if r != col {
                let factor = aug[r][col];
                if factor != 0.0 {
                    for c in col..=m {
                        aug[r][c] -= factor * aug[col][c];
                    }
                }
            }
        }
    }
    let coef: Vec<f64> = aug.iter().map(|row| row[m]).collect();

    a.iter().map(|row| dot(row, &coef)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(values: Vec<f64>, rate: u32) -> ModalityTable {
        let time = (0..values.len()).map(|i| i as f64 / f64::from(rate)).collect();
        ModalityTable::new("emg", rate, time, vec![Channel::new("TA", values)]).unwrap()
    }

    #[test]
    fn window_rounding() {
        assert_eq!(window_samples(50.0, 1000, 3), 51);
        assert_eq!(window_samples(25.0, 1000, 3), 25);
        assert_eq!(window_samples(2.0, 1000, 3), 5);
        assert_eq!(window_samples(0.0, 1000, 3), 5);
        assert_eq!(window_samples(-10.0, 1000, 3), 5);
        assert_eq!(window_samples(1.0, 1000, 2), 3);
    }

    #[test]
    fn classic_five_point_cubic_weights() {
        // Standard table: (-3, 12, 17, 12, -3) / 35
        let h = fit_weights(5, 3, 0.0);
        let expected = [-3.0, 12.0, 17.0, 12.0, -3.0].map(|v| v / 35.0);
        for (a, e) in h.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12);
        }
    }

    #[test]
    fn rejects_invalid_window() {
        assert!(SavitzkyGolay::new(4, 3).is_err());
        assert!(SavitzkyGolay::new(3, 3).is_err());
        assert!(SavitzkyGolay::new(7, 3).is_ok());
    }

    #[test]
    fn cubic_signals_are_reproduced_including_edges() {
        let x: Vec<f64> = (0..40)
            .map(|i| {
                let t = i as f64 * 0.1;
                1.0 + 0.5 * t - 0.2 * t * t + 0.03 * t * t * t
            })
            .collect();
        let y = SavitzkyGolay::new(11, 3).unwrap().smooth(&x);
        for (a, b) in y.iter().zip(&x) {
            assert!((a - b).abs() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn all_zero_channel_gives_all_zero_envelope() {
        let out = envelopes(&single(vec![0.0; 300], 1000), 50.0, 1000).unwrap();
        let v = &out.channels()[0].values;
        assert_eq!(v.len(), 300);
        assert!(v.iter().all(|&e| e == 0.0));
        assert_eq!(out.channels()[0].name, "TA_envelope");
    }

    #[test]
    fn envelope_is_non_negative_and_tracks_amplitude() {
        // Alternating-sign burst: rectified level 2.0 in the middle.
        let values: Vec<f64> = (0..600)
            .map(|i| {
                let level = if (200..400).contains(&i) { 2.0 } else { 0.0 };
                if i % 2 == 0 { level } else { -level }
            })
            .collect();
        let out = envelopes(&single(values, 1000), 20.0, 1000).unwrap();
        let v = &out.channels()[0].values;
        assert!(v.iter().all(|&e| e >= 0.0));
        assert!((v[300] - 2.0).abs() < 1e-9);
        assert!(v[50].abs() < 1e-9);
    }

    #[test]
    fn short_channels_pass_through_rectified() {
        let out = envelopes(&single(vec![-1.0, 2.0, -3.0], 1000), 50.0, 1000).unwrap();
        assert_eq!(out.channels()[0].values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn window_longer_than_table_skips_smoothing() {
        let values: Vec<f64> = (0..300).map(|i| if i % 2 == 0 { 1.5 } else { -0.5 }).collect();
        let out = envelopes(&single(values, 1000), 1e12, 1000).unwrap();
        let v = &out.channels()[0].values;
        assert_eq!(v.len(), 300);
        assert_eq!(v[0], 1.5);
        assert_eq!(v[1], 0.5);
    }

    #[test]
    fn nan_covers_the_windows_around_it() {
        let mut values = vec![1.0; 300];
        values[150] = f64::NAN;
        // 5 ms at 1000 Hz -> 5-sample window, half width 2.
        let out = envelopes(&single(values, 1000), 5.0, 1000).unwrap();
        let v = &out.channels()[0].values;
        for (i, e) in v.iter().enumerate() {
            if (148..=152).contains(&i) {
                assert!(e.is_nan(), "sample {i} should be NaN");
            } else {
                assert!((e - 1.0).abs() < 1e-9, "sample {i} = {e}");
            }
        }
    }

    #[test]
    fn zero_rate_is_rejected() {
        let table = single(vec![0.0; 10], 1000);
        assert!(matches!(
            envelopes(&table, 50.0, 0),
            Err(SyncError::InvalidRate { .. })
        ));
    }
}
