//! Butterworth low-pass design and zero-phase filtering in second-order
//! sections.
//!
//! Frequencies are normalized to the Nyquist rate: `wn = cutoff / (fs / 2)`.
//! Each section is run in Direct Form II transposed:
//!
//! ```text
//! y[n]  = b0*x[n] + z0
//! z0'   = b1*x[n] - a1*y[n] + z1
//! z1'   = b2*x[n] - a2*y[n]
//! ```

use std::f64::consts::PI;

use crate::error::{SyncError, SyncResult};

/// One second-order section, `a[0] == 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

impl Biquad {
    /// Gain at DC (z = 1).
    pub fn dc_gain(&self) -> f64 {
        self.b.iter().sum::<f64>() / self.a.iter().sum::<f64>()
    }

    /// Steady-state delay-line contents for a unit step input.
    fn step_state(&self) -> [f64; 2] {
        let g = self.dc_gain();
        [g - self.b[0], self.b[2] - self.a[2] * g]
    }

    fn is_first_order(&self) -> bool {
        self.b[2] == 0.0 && self.a[2] == 0.0
    }
}

/// Cascade of second-order sections.
#[derive(Debug, Clone, PartialEq)]
pub struct SosFilter {
    sections: Vec<Biquad>,
}

impl SosFilter {
    /// Digital Butterworth low-pass of the given `order` with normalized
    /// cutoff `wn` in `(0, 1)`.
    ///
    /// Analog prototype poles are pre-warped, mapped through the bilinear
    /// transform, and grouped in conjugate pairs. Both zeros of every section
    /// sit at z = -1 and each section is scaled to unit DC gain.
    pub fn butter_lowpass(order: usize, wn: f64) -> SyncResult<Self> {
        if order == 0 {
            return Err(SyncError::filter_design("filter order must be at least 1"));
        }
        if !(wn > 0.0 && wn < 1.0) {
            return Err(SyncError::filter_design(format!(
                "normalized cutoff {wn} is outside (0, 1)"
            )));
        }

        // Bilinear transform with fs = 2, matching the Nyquist normalization.
        let k = 4.0;
        let warped = k * (PI * wn / 2.0).tan();

        let mut sections = Vec::with_capacity(order.div_ceil(2));
        // Prototype poles are -exp(i*pi*m / (2N)) for m = -N+1, -N+3, ..., N-1.
        // Positive m gives one pole of each conjugate pair.
        let mut m = order as i64 - 1;
        while m > 0 {
            let theta = PI * m as f64 / (2.0 * order as f64);
            let (sr, si) = (-warped * theta.cos(), -warped * theta.sin());
            let (zr, zi) = bilinear(sr, si, k);
            let a1 = -2.0 * zr;
            let a2 = zr * zr + zi * zi;
            let g = (1.0 + a1 + a2) / 4.0;
            sections.push(Biquad {
                b: [g, 2.0 * g, g],
                a: [1.0, a1, a2],
            });
            m -= 2;
        }
        if order % 2 == 1 {
            let (z, _) = bilinear(-warped, 0.0, k);
            let g = (1.0 - z) / 2.0;
            sections.push(Biquad {
                b: [g, g, 0.0],
                a: [1.0, -z, 0.0],
            });
        }

        Ok(Self { sections })
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    /// Edge extension used by [`SosFilter::filtfilt`]: three times the
    /// number of coefficients of the equivalent single transfer function.
    pub fn default_padlen(&self) -> usize {
        let trailing_zero = self
            .sections
            .iter()
            .filter(|s| s.is_first_order())
            .count()
            .min(1);
        3 * (2 * self.sections.len() + 1 - trailing_zero)
    }

    /// Magnitude response at normalized frequency `w` (1.0 = Nyquist).
    pub fn magnitude_at(&self, w: f64) -> f64 {
        let omega = PI * w;
        // z^-1 and z^-2 on the unit circle.
        let (c1, s1) = (omega.cos(), -omega.sin());
        let (c2, s2) = ((2.0 * omega).cos(), -(2.0 * omega).sin());
        self.sections
            .iter()
            .map(|s| {
                let num = (s.b[0] + s.b[1] * c1 + s.b[2] * c2, s.b[1] * s1 + s.b[2] * s2);
                let den = (s.a[0] + s.a[1] * c1 + s.a[2] * c2, s.a[1] * s1 + s.a[2] * s2);
                num.0.hypot(num.1) / den.0.hypot(den.1)
            })
            .product()
    }

    /// Run the cascade once over `x`, starting each section from
    /// `state[i] * level_i` where `level_i` is the DC level reaching it for a
    /// constant input `x0`.
    fn run(&self, x: &[f64], x0: f64) -> Vec<f64> {
        let mut y = x.to_vec();
        let mut level = x0;
        for s in &self.sections {
            let st = s.step_state();
            let mut z = [st[0] * level, st[1] * level];
            for v in y.iter_mut() {
                let xn = *v;
                let yn = s.b[0] * xn + z[0];
                z[0] = s.b[1] * xn - s.a[1] * yn + z[1];
                z[1] = s.b[2] * xn - s.a[2] * yn;
                *v = yn;
            }
            level *= s.dc_gain();
        }
        y
    }

    /// Zero-phase forward-backward filtering.
    ///
    /// The input is extended at both ends by odd reflection
    /// (`2*x[0] - x[i]`), each pass starts from the steady state of its first
    /// sample, and the extension is cut off again. Inputs shorter than the
    /// default extension use `len - 1` samples of extension; a single sample
    /// is returned unchanged.
    pub fn filtfilt(&self, x: &[f64]) -> Vec<f64> {
        let n = x.len();
        if n < 2 {
            return x.to_vec();
        }
        let padlen = self.default_padlen().min(n - 1);

        let mut ext = Vec::with_capacity(n + 2 * padlen);
        ext.extend((1..=padlen).rev().map(|i| 2.0 * x[0] - x[i]));
        ext.extend_from_slice(x);
        ext.extend((1..=padlen).map(|i| 2.0 * x[n - 1] - x[n - 1 - i]));

        let forward = self.run(&ext, ext[0]);
        let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
        let start = reversed[0];
        reversed = self.run(&reversed, start);
        reversed.reverse();

        reversed[padlen..padlen + n].to_vec()
    }
}

/// `(k + s) / (k - s)` for complex `s = sr + i*si`.
fn bilinear(sr: f64, si: f64, k: f64) -> (f64, f64) {
    let den = (k - sr) * (k - sr) + si * si;
    ((k * k - sr * sr - si * si) / den, 2.0 * k * si / den)
}
