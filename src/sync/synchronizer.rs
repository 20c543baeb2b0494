//! Orchestrates trimming, decimation and resampling of every modality onto
//! one shared timeline.

use std::collections::BTreeMap;

use log::{debug, info};

use crate::config::SyncConfig;
use crate::data::model::{ModalityTable, SynchronizedDataset};
use crate::error::{SyncError, SyncResult};

use super::decimate::Decimator;
use super::resample::{resample, BoundaryMode};
use super::timeline::{self, TargetTimeline};

/// Default target rate, matching the force plates.
pub const DEFAULT_TARGET_RATE: u32 = 1000;

/// Aligns multi-rate modality tables onto one timeline at `target_rate`.
///
/// Each call is independent: the only state carried between calls is the
/// anti-alias filter memo inside the [`Decimator`].
#[derive(Debug)]
pub struct Synchronizer {
    target_rate: u32,
    boundary: BoundaryMode,
    decimator: Decimator,
}

impl Synchronizer {
    pub fn new(target_rate: u32) -> SyncResult<Self> {
        if target_rate == 0 {
            return Err(SyncError::InvalidRate { rate: target_rate });
        }
        Ok(Self {
            target_rate,
            boundary: BoundaryMode::default(),
            decimator: Decimator::new(),
        })
    }

    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        Ok(Self::new(config.target_rate)?.with_boundary(config.boundary))
    }

    pub fn with_boundary(mut self, boundary: BoundaryMode) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    pub fn boundary(&self) -> BoundaryMode {
        self.boundary
    }

    /// Shortest duration across `tables`.
    pub fn common_duration(tables: &BTreeMap<String, ModalityTable>) -> SyncResult<f64> {
        tables
            .values()
            .map(ModalityTable::duration)
            .min_by(f64::total_cmp)
            .ok_or(SyncError::NoModalities)
    }

    /// Synchronize every table onto one timeline.
    ///
    /// 1. `common_duration` = shortest table duration; longer tables lose
    ///    their tail.
    /// 2. One timeline of `floor(common_duration * target_rate)` points.
    /// 3. Per table: trim to `time <= common_duration`, decimate if the
    ///    native rate is above the target, then resample onto the timeline.
    ///
    /// Any failure aborts the whole call; the error names the modality.
    pub fn synchronize(
        &self,
        tables: &BTreeMap<String, ModalityTable>,
    ) -> SyncResult<SynchronizedDataset> {
        let common_duration = Self::common_duration(tables)?;
        let timeline = timeline::build(common_duration, self.target_rate)?;
        info!(
            "synchronizing {} modalities over {common_duration:.3} s at {} Hz ({} points)",
            tables.len(),
            self.target_rate,
            timeline.len()
        );

        let synced = tables
            .iter()
            .map(|(name, table)| {
                self.synchronize_one(name, table, common_duration, &timeline)
                    .map(|t| (name.clone(), t))
                    .map_err(|e| e.in_modality(name))
            })
            .collect::<SyncResult<BTreeMap<_, _>>>()?;

        Ok(SynchronizedDataset::new(
            self.target_rate,
            common_duration,
            timeline,
            synced,
        ))
    }

    fn synchronize_one(
        &self,
        name: &str,
        table: &ModalityTable,
        common_duration: f64,
        timeline: &TargetTimeline,
    ) -> SyncResult<ModalityTable> {
        let trimmed = table.trimmed(common_duration);
        if trimmed.len() < table.len() {
            debug!(
                "{name}: trimmed {} trailing samples past {common_duration:.3} s",
                table.len() - trimmed.len()
            );
        }

        let source = if trimmed.native_rate() > self.target_rate {
            debug!(
                "{name}: {} Hz -> {} Hz, decimating before resampling",
                trimmed.native_rate(),
                self.target_rate
            );
            self.decimator.decimate(&trimmed, self.target_rate)?
        } else {
            debug!(
                "{name}: {} Hz -> {} Hz, resampling directly",
                trimmed.native_rate(),
                self.target_rate
            );
            trimmed
        };

        let resampled = resample(&source, timeline.as_slice(), self.boundary)?;
        Ok(resampled.relabel(name, self.target_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Channel;

    fn ramp(name: &str, rate: u32, n: usize) -> ModalityTable {
        let time: Vec<f64> = (0..n).map(|i| i as f64 / f64::from(rate)).collect();
        let values = time.iter().map(|t| 3.0 * t).collect();
        ModalityTable::new(name, rate, time, vec![Channel::new("x", values)]).unwrap()
    }

    #[test]
    fn common_duration_is_minimum() {
        let mut tables = BTreeMap::new();
        tables.insert("a".to_string(), ramp("a", 100, 1001));
        tables.insert("b".to_string(), ramp("b", 100, 501));
        assert_eq!(Synchronizer::common_duration(&tables).unwrap(), 5.0);
    }

    #[test]
    fn empty_input_is_rejected() {
        let sync = Synchronizer::new(1000).unwrap();
        assert!(matches!(
            sync.synchronize(&BTreeMap::new()),
            Err(SyncError::NoModalities)
        ));
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(matches!(
            Synchronizer::new(0),
            Err(SyncError::InvalidRate { rate: 0 })
        ));
    }

    #[test]
    fn outputs_share_timeline_and_target_rate() {
        let mut tables = BTreeMap::new();
        tables.insert("kinematics".to_string(), ramp("kinematics", 100, 201));
        tables.insert("emg".to_string(), ramp("emg", 2000, 4001));
        let sync = Synchronizer::new(1000).unwrap();
        let out = sync.synchronize(&tables).unwrap();
        assert_eq!(out.len(), 2000);
        for table in out.tables().values() {
            assert_eq!(table.time(), out.timeline().as_slice());
            assert_eq!(table.native_rate(), 1000);
        }
        let k = out.table("kinematics").unwrap();
        for (t, v) in k.time().iter().zip(&k.channels()[0].values) {
            assert!((v - 3.0 * t).abs() < 1e-9);
        }
    }

    #[test]
    fn single_sample_table_fails_with_invalid_duration() {
        let mut tables = BTreeMap::new();
        tables.insert("a".to_string(), ramp("a", 100, 1));
        let err = Synchronizer::new(1000).unwrap().synchronize(&tables).unwrap_err();
        assert!(matches!(err, SyncError::InvalidDuration { .. }));
    }
}
