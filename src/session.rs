use std::collections::BTreeMap;
use std::fmt;

use anyhow::{bail, Context, Result};
use log::info;

use crate::annotation::{EventLog, GaitEvent, GaitEventKind};
use crate::data::model::{ModalityTable, SynchronizedDataset};
use crate::data::select::ChannelSelection;
use crate::sync::{envelopes, Synchronizer};

// ---------------------------------------------------------------------------
// Trial session
// ---------------------------------------------------------------------------

/// Everything known about one trial, independent of any front end.
#[derive(Debug, Default)]
pub struct TrialSession {
    pub trial_id: String,

    /// Raw tables at their native rates, by modality.
    raw: BTreeMap<String, ModalityTable>,

    /// Output of the last `synchronize` (None until run, reset on new input).
    synchronized: Option<SynchronizedDataset>,

    /// Envelope tables on the synchronized timeline, by source modality.
    envelopes: BTreeMap<String, ModalityTable>,

    /// Channels to export, per modality.
    pub selection: ChannelSelection,

    pub events: EventLog,
}

impl TrialSession {
    pub fn new(trial_id: impl Into<String>) -> Self {
        Self {
            trial_id: trial_id.into(),
            ..Self::default()
        }
    }

    /// Add or replace a modality. Invalidates synchronized data and
    /// envelopes; the event log is kept.
    pub fn add_table(&mut self, modality: impl Into<String>, table: ModalityTable) {
        let modality = modality.into();
        self.selection.select_all(&modality, &table);
        self.raw.insert(modality, table);
        self.synchronized = None;
        self.envelopes.clear();
    }

    pub fn raw_tables(&self) -> &BTreeMap<String, ModalityTable> {
        &self.raw
    }

    pub fn synchronized(&self) -> Option<&SynchronizedDataset> {
        self.synchronized.as_ref()
    }

    pub fn envelopes(&self) -> &BTreeMap<String, ModalityTable> {
        &self.envelopes
    }

    pub fn synchronize(&mut self, synchronizer: &Synchronizer) -> Result<&SynchronizedDataset> {
        let dataset = synchronizer
            .synchronize(&self.raw)
            .with_context(|| format!("synchronizing trial '{}'", self.trial_id))?;
        self.envelopes.clear();
        Ok(self.synchronized.insert(dataset))
    }

    fn require_synchronized(&self) -> Result<&SynchronizedDataset> {
        self.synchronized
            .as_ref()
            .with_context(|| format!("trial '{}' has not been synchronized", self.trial_id))
    }

    /// Envelopes of one synchronized modality, kept in the session.
    pub fn compute_envelopes(&mut self, modality: &str, window_ms: f64) -> Result<&ModalityTable> {
        let dataset = self.require_synchronized()?;
        let Some(table) = dataset.table(modality) else {
            bail!("no synchronized modality '{modality}'");
        };
        let env = envelopes(table, window_ms, dataset.target_rate())
            .with_context(|| format!("computing envelopes of '{modality}'"))?;
        info!(
            "{modality}: {} envelopes ({window_ms} ms window)",
            env.channels().len()
        );
        self.envelopes.insert(modality.to_string(), env);
        self.envelopes
            .get(modality)
            .context("envelope table missing after insert")
    }

    /// Record an event on the synchronized timeline.
    pub fn record_event(&mut self, kind: GaitEventKind, time: f64) -> Result<GaitEvent> {
        let timeline = match &self.synchronized {
            Some(dataset) => dataset.timeline(),
            None => bail!("trial '{}' has not been synchronized", self.trial_id),
        };
        self.events.record(kind, time, timeline)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            trial_id: self.trial_id.clone(),
            modalities: self
                .raw
                .iter()
                .map(|(name, t)| ModalitySummary {
                    name: name.clone(),
                    native_rate: t.native_rate(),
                    samples: t.len(),
                    channels: t.channels().len(),
                    duration: t.duration(),
                })
                .collect(),
            synchronized: self
                .synchronized
                .as_ref()
                .map(|d| (d.target_rate(), d.common_duration(), d.len())),
            envelopes: self.envelopes.keys().cloned().collect(),
            active_events: self.events.active().len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ModalitySummary {
    pub name: String,
    pub native_rate: u32,
    pub samples: usize,
    pub channels: usize,
    pub duration: f64,
}

impl fmt::Display for ModalitySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<12} {:>6} Hz {:>9} samples {:>4} channels {:>9.3} s",
            self.name, self.native_rate, self.samples, self.channels, self.duration
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub trial_id: String,
    pub modalities: Vec<ModalitySummary>,
    /// `(target_rate, common_duration, timeline points)`.
    pub synchronized: Option<(u32, f64, usize)>,
    pub envelopes: Vec<String>,
    pub active_events: usize,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Trial {}", self.trial_id)?;
        for m in &self.modalities {
            writeln!(f, "  {m}")?;
        }
        match self.synchronized {
            Some((rate, duration, points)) => writeln!(
                f,
                "  synchronized: {points} points at {rate} Hz over {duration:.3} s"
            )?,
            None => writeln!(f, "  not synchronized")?,
        }
        if !self.envelopes.is_empty() {
            writeln!(f, "  envelopes: {}", self.envelopes.join(", "))?;
        }
        writeln!(f, "  events: {}", self.active_events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Channel;

    fn table(rate: u32, n: usize) -> ModalityTable {
        let time: Vec<f64> = (0..n).map(|i| i as f64 / f64::from(rate)).collect();
        let values = time.iter().map(|t| (t * 40.0).sin()).collect();
        ModalityTable::new("t", rate, time, vec![Channel::new("TA", values)]).unwrap()
    }

    #[test]
    fn flow_through_session() {
        let mut session = TrialSession::new("T5");
        session.add_table("emg", table(2000, 4001));
        session.add_table("kinematics", table(100, 151));
        assert!(session.record_event(GaitEventKind::LeftHeelStrike, 0.5).is_err());
        assert!(session.compute_envelopes("emg", 50.0).is_err());

        let sync = Synchronizer::new(1000).unwrap();
        let n = session.synchronize(&sync).unwrap().len();
        assert_eq!(n, 1500);

        let env = session.compute_envelopes("emg", 50.0).unwrap();
        assert_eq!(env.channel_names(), vec!["TA_envelope"]);
        assert!(session.compute_envelopes("force", 50.0).is_err());

        let e = session.record_event(GaitEventKind::LeftHeelStrike, 0.5).unwrap();
        assert!((e.time - 0.5).abs() < 1e-3);

        let summary = session.summary();
        assert_eq!(summary.modalities.len(), 2);
        assert_eq!(summary.synchronized.map(|s| s.2), Some(1500));
        assert_eq!(summary.envelopes, vec!["emg".to_string()]);
        assert_eq!(summary.active_events, 1);
        assert!(summary.to_string().contains("1500 points at 1000 Hz"));
    }

    #[test]
    fn new_input_invalidates_derived_data() {
        let mut session = TrialSession::new("T1");
        session.add_table("emg", table(2000, 2001));
        session.synchronize(&Synchronizer::new(1000).unwrap()).unwrap();
        session.compute_envelopes("emg", 50.0).unwrap();

        session.add_table("kinematics", table(100, 101));
        assert!(session.synchronized().is_none());
        assert!(session.envelopes().is_empty());
        assert!(session.selection.is_selected("kinematics", "TA"));
    }
}
