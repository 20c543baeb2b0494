//! Anti-aliased integer-factor downsampling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, warn};

use crate::data::model::{Channel, ModalityTable};
use crate::error::{SyncError, SyncResult};

use super::iir::SosFilter;

/// Order of the anti-alias Butterworth filter.
pub const ANTI_ALIAS_ORDER: usize = 4;

/// Downsamples tables by `native_rate / target_rate` after zero-phase
/// low-pass filtering.
///
/// Filter coefficients depend only on the rate pair and are memoized per
/// `(native_rate, target_rate)`. No sample history is kept between calls.
#[derive(Debug)]
pub struct Decimator {
    order: usize,
    designs: Mutex<HashMap<(u32, u32), Arc<SosFilter>>>,
}

impl Default for Decimator {
    fn default() -> Self {
        Self::with_order(ANTI_ALIAS_ORDER)
    }
}

impl Decimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_order(order: usize) -> Self {
        Self {
            order,
            designs: Mutex::new(HashMap::new()),
        }
    }

    /// Integer decimation factor, `native_rate / target_rate` rounded down.
    pub fn factor(native_rate: u32, target_rate: u32) -> SyncResult<u32> {
        if native_rate == 0 {
            return Err(SyncError::InvalidRate { rate: native_rate });
        }
        if target_rate == 0 {
            return Err(SyncError::InvalidRate { rate: target_rate });
        }
        Ok(native_rate / target_rate)
    }

    /// Anti-alias low-pass for the rate pair: cutoff at the target Nyquist,
    /// normalized to the source Nyquist.
    pub fn design(&self, native_rate: u32, target_rate: u32) -> SyncResult<Arc<SosFilter>> {
        let key = (native_rate, target_rate);
        let mut designs = self.designs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(filter) = designs.get(&key) {
            return Ok(Arc::clone(filter));
        }
        let wn = (f64::from(target_rate) / 2.0) / (f64::from(native_rate) / 2.0);
        let filter = Arc::new(SosFilter::butter_lowpass(self.order, wn)?);
        debug!(
            "designed order-{} low-pass for {native_rate} Hz -> {target_rate} Hz (wn = {wn:.4})",
            self.order
        );
        designs.insert(key, Arc::clone(&filter));
        Ok(filter)
    }

    /// Decimate `table` toward `target_rate`.
    ///
    /// With a factor of 0 or 1 the table is returned unchanged: only clean
    /// integer ratios of at least 2 are filtered and downsampled. Otherwise
    /// each channel is filtered forward and backward and every
    /// `factor`-th sample is kept, starting at index 0; the time vector is
    /// picked with the same stride.
    pub fn decimate(&self, table: &ModalityTable, target_rate: u32) -> SyncResult<ModalityTable> {
        let native_rate = table.native_rate();
        let factor = Self::factor(native_rate, target_rate)?;

        if factor <= 1 {
            if native_rate > target_rate {
                warn!(
                    "{}: {native_rate} Hz -> {target_rate} Hz is not an integer ratio >= 2, \
                     passing through without anti-alias filtering",
                    table.name()
                );
            }
            return Ok(table.clone());
        }
        if native_rate % target_rate != 0 {
            warn!(
                "{}: {native_rate} Hz is not a multiple of {target_rate} Hz, decimating by {factor} \
                 to {} Hz",
                table.name(),
                native_rate / factor
            );
        }

        let filter = self.design(native_rate, target_rate)?;
        let stride = factor as usize;

        let time = take_every(table.time(), stride);
        let channels: Vec<Channel> = table
            .channels()
            .iter()
            .map(|ch| {
                let filtered = filter_finite_runs(&filter, &ch.values);
                ch.with_values(take_every(&filtered, stride))
            })
            .collect();

        debug!(
            "{}: decimated {} -> {} samples (factor {factor})",
            table.name(),
            table.len(),
            time.len()
        );

        Ok(ModalityTable::from_parts(
            table.name().to_string(),
            native_rate / factor,
            time,
            channels,
        ))
    }
}

/// Decimate with a one-off filter design.
pub fn decimate(table: &ModalityTable, target_rate: u32) -> SyncResult<ModalityTable> {
    Decimator::new().decimate(table, target_rate)
}

fn take_every(values: &[f64], stride: usize) -> Vec<f64> {
    values.iter().step_by(stride).copied().collect()
}

/// Zero-phase filter each maximal run of non-NaN samples on its own.
/// NaN samples stay in place.
fn filter_finite_runs(filter: &SosFilter, values: &[f64]) -> Vec<f64> {
    if !values.iter().any(|v| v.is_nan()) {
        return filter.filtfilt(values);
    }
    let mut out = values.to_vec();
    let mut i = 0;
    while i < values.len() {
        if values[i].is_nan() {
            i += 1;
            continue;
        }
        let start = i;
        while i < values.len() && !values[i].is_nan() {
            i += 1;
        }
        out[start..i].copy_from_slice(&filter.filtfilt(&values[start..i]));
    }
    out
}
