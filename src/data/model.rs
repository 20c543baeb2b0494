use std::collections::{BTreeMap, BTreeSet};

use crate::error::{SyncError, SyncResult};
use crate::sync::timeline::TargetTimeline;

use super::schema::{ChannelRole, ChannelSchema};

// ---------------------------------------------------------------------------
// Channel – one named value vector of a modality
// ---------------------------------------------------------------------------

/// A single channel. `NaN` marks a missing or invalid reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub name: String,
    /// Semantic role, if the loading schema knows this channel.
    pub role: Option<ChannelRole>,
    /// Values aligned with the owning table's time vector.
    pub values: Vec<f64>,
}

impl Channel {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            role: None,
            values,
        }
    }

    pub fn with_role(mut self, role: ChannelRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Number of non-NaN samples.
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nan()).count()
    }

    /// Same name and role, new values.
    pub(crate) fn with_values(&self, values: Vec<f64>) -> Self {
        Self {
            name: self.name.clone(),
            role: self.role,
            values,
        }
    }
}

// ---------------------------------------------------------------------------
// ModalityTable – one sensor stream
// ---------------------------------------------------------------------------

/// One modality's recording: a shared time vector and its channels.
///
/// Invariants, checked by [`ModalityTable::new`]:
/// * `native_rate > 0`
/// * `time` is finite and strictly increasing
/// * every channel has exactly `time.len()` values
/// * channel names are unique
#[derive(Debug, Clone, PartialEq)]
pub struct ModalityTable {
    name: String,
    native_rate: u32,
    time: Vec<f64>,
    channels: Vec<Channel>,
}

impl ModalityTable {
    pub fn new(
        name: impl Into<String>,
        native_rate: u32,
        time: Vec<f64>,
        channels: Vec<Channel>,
    ) -> SyncResult<Self> {
        let name = name.into();
        if native_rate == 0 {
            return Err(SyncError::InvalidRate { rate: native_rate });
        }
        if let Some(i) = time.iter().position(|t| !t.is_finite()) {
            return Err(SyncError::invalid_table(
                &name,
                format!("time[{i}] is not finite"),
            ));
        }
        if let Some(i) = time.windows(2).position(|w| w[1] <= w[0]) {
            return Err(SyncError::invalid_table(
                &name,
                format!(
                    "time is not strictly increasing at index {} ({} -> {})",
                    i + 1,
                    time[i],
                    time[i + 1]
                ),
            ));
        }
        let mut seen = BTreeSet::new();
        for ch in &channels {
            if ch.values.len() != time.len() {
                return Err(SyncError::invalid_table(
                    &name,
                    format!(
                        "channel '{}' has {} values but time has {}",
                        ch.name,
                        ch.values.len(),
                        time.len()
                    ),
                ));
            }
            if !seen.insert(ch.name.as_str()) {
                return Err(SyncError::invalid_table(
                    &name,
                    format!("duplicate channel '{}'", ch.name),
                ));
            }
        }
        Ok(Self {
            name,
            native_rate,
            time,
            channels,
        })
    }

    /// Build a table whose invariants hold by construction (derived from a
    /// validated table).
    pub(crate) fn from_parts(
        name: String,
        native_rate: u32,
        time: Vec<f64>,
        channels: Vec<Channel>,
    ) -> Self {
        debug_assert!(channels.iter().all(|c| c.values.len() == time.len()));
        Self {
            name,
            native_rate,
            time,
            channels,
        }
    }

    /// Rename and re-rate a derived table.
    pub(crate) fn relabel(mut self, name: &str, native_rate: u32) -> Self {
        self.name = name.to_string();
        self.native_rate = native_rate;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn native_rate(&self) -> u32 {
        self.native_rate
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn channel_by_role(&self, role: ChannelRole) -> Option<&Channel> {
        self.channels.iter().find(|c| c.role == Some(role))
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Recording duration: the last timestamp (recordings start at 0).
    pub fn duration(&self) -> f64 {
        self.time.last().copied().unwrap_or(0.0)
    }

    /// Samples with `time <= max_time`.
    pub fn trimmed(&self, max_time: f64) -> Self {
        let keep = self.time.partition_point(|&t| t <= max_time);
        if keep == self.time.len() {
            return self.clone();
        }
        let channels = self
            .channels
            .iter()
            .map(|c| c.with_values(c.values[..keep].to_vec()))
            .collect();
        Self::from_parts(
            self.name.clone(),
            self.native_rate,
            self.time[..keep].to_vec(),
            channels,
        )
    }

    /// Keep only the named channels, in table order.
    pub fn retain_channels(&self, keep: &BTreeSet<String>) -> Self {
        let channels = self
            .channels
            .iter()
            .filter(|c| keep.contains(&c.name))
            .cloned()
            .collect();
        Self::from_parts(
            self.name.clone(),
            self.native_rate,
            self.time.clone(),
            channels,
        )
    }

    /// Rows `range` of every channel and of the time vector.
    pub fn slice(&self, range: std::ops::Range<usize>) -> Self {
        let end = range.end.min(self.len());
        let range = range.start.min(end)..end;
        let channels = self
            .channels
            .iter()
            .map(|c| c.with_values(c.values[range.clone()].to_vec()))
            .collect();
        Self::from_parts(
            self.name.clone(),
            self.native_rate,
            self.time[range].to_vec(),
            channels,
        )
    }

    /// Assign roles from `schema` to matching channels.
    pub fn with_schema(mut self, schema: &ChannelSchema) -> Self {
        schema.apply(&mut self.channels);
        self
    }
}

// ---------------------------------------------------------------------------
// SynchronizedDataset – the synchronizer's output artifact
// ---------------------------------------------------------------------------

/// All modalities resampled onto one shared timeline.
///
/// Every table's `time()` equals `timeline().as_slice()` value for value, so
/// an integer position indexes the same instant in every modality.
#[derive(Debug, Clone)]
pub struct SynchronizedDataset {
    target_rate: u32,
    common_duration: f64,
    timeline: TargetTimeline,
    tables: BTreeMap<String, ModalityTable>,
}

impl SynchronizedDataset {
    pub(crate) fn new(
        target_rate: u32,
        common_duration: f64,
        timeline: TargetTimeline,
        tables: BTreeMap<String, ModalityTable>,
    ) -> Self {
        Self {
            target_rate,
            common_duration,
            timeline,
            tables,
        }
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    pub fn common_duration(&self) -> f64 {
        self.common_duration
    }

    pub fn timeline(&self) -> &TargetTimeline {
        &self.timeline
    }

    pub fn tables(&self) -> &BTreeMap<String, ModalityTable> {
        &self.tables
    }

    pub fn table(&self, modality: &str) -> Option<&ModalityTable> {
        self.tables.get(modality)
    }

    pub fn modalities(&self) -> Vec<&str> {
        self.tables.keys().map(|k| k.as_str()).collect()
    }

    /// Number of timeline points.
    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    /// Take ownership of the tables.
    pub fn into_tables(self) -> BTreeMap<String, ModalityTable> {
        self.tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(time: Vec<f64>, values: Vec<f64>) -> SyncResult<ModalityTable> {
        ModalityTable::new("kinetics", 100, time, vec![Channel::new("Fz_L", values)])
    }

    #[test]
    fn rejects_zero_rate() {
        let err = ModalityTable::new("emg", 0, vec![0.0], vec![]).unwrap_err();
        assert!(matches!(err, SyncError::InvalidRate { rate: 0 }));
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = table(vec![0.0, 0.01, 0.02], vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, SyncError::InvalidTable { .. }));
        assert!(err.to_string().contains("has 2 values but time has 3"));
    }

    #[test]
    fn rejects_non_increasing_time() {
        assert!(table(vec![0.0, 0.01, 0.01], vec![1.0, 2.0, 3.0]).is_err());
        assert!(table(vec![0.0, f64::NAN, 0.02], vec![1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn rejects_duplicate_channels() {
        let err = ModalityTable::new(
            "emg",
            2000,
            vec![0.0, 0.0005],
            vec![Channel::new("TA", vec![0.0; 2]), Channel::new("TA", vec![0.0; 2])],
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate channel 'TA'"));
    }

    #[test]
    fn nan_values_are_kept() {
        let t = table(vec![0.0, 0.01, 0.02], vec![1.0, f64::NAN, 3.0]).unwrap();
        assert_eq!(t.channels()[0].valid_count(), 2);
        assert!(t.channel("Fz_L").unwrap().values[1].is_nan());
    }

    #[test]
    fn trimmed_keeps_samples_up_to_and_including_limit() {
        let t = table(vec![0.0, 0.5, 1.0, 1.5], vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        let trimmed = t.trimmed(1.0);
        assert_eq!(trimmed.time(), &[0.0, 0.5, 1.0]);
        assert_eq!(trimmed.channels()[0].values, vec![0.0, 1.0, 2.0]);
        assert_eq!(trimmed.duration(), 1.0);
        assert_eq!(t.trimmed(5.0), t);
    }

    #[test]
    fn role_lookup() {
        let t = table(vec![0.0, 1.0], vec![0.0, 1.0])
            .unwrap()
            .with_schema(&ChannelSchema::force_plates());
        assert_eq!(t.channel_by_role(ChannelRole::LeftFz).unwrap().name, "Fz_L");
        assert!(t.channel_by_role(ChannelRole::RightFz).is_none());
    }
}
