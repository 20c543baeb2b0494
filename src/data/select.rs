use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use super::model::{ModalityTable, SynchronizedDataset};

// ---------------------------------------------------------------------------
// Channel selection: which channels are kept per modality
// ---------------------------------------------------------------------------

/// Per-modality channel selection: modality → set of selected channel names.
///
/// A modality absent from the selection is unconstrained (every channel
/// kept); an empty set keeps none.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelSelection {
    selected: BTreeMap<String, BTreeSet<String>>,
}

impl ChannelSelection {
    /// Everything selected.
    pub fn all(tables: &BTreeMap<String, ModalityTable>) -> Self {
        let selected = tables
            .iter()
            .map(|(modality, table)| (modality.clone(), channel_set(table)))
            .collect();
        Self { selected }
    }

    /// Keep only `channels` of `modality`; other modalities are untouched.
    pub fn only<I, S>(mut self, modality: &str, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected.insert(
            modality.to_string(),
            channels.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn is_selected(&self, modality: &str, channel: &str) -> bool {
        self.selected
            .get(modality)
            .map_or(true, |set| set.contains(channel))
    }

    /// Flip one channel.
    pub fn toggle(&mut self, modality: &str, channel: &str) {
        let set = self.selected.entry(modality.to_string()).or_default();
        if !set.remove(channel) {
            set.insert(channel.to_string());
        }
    }

    pub fn select_all(&mut self, modality: &str, table: &ModalityTable) {
        self.selected.insert(modality.to_string(), channel_set(table));
    }

    pub fn select_none(&mut self, modality: &str) {
        self.selected.insert(modality.to_string(), BTreeSet::new());
    }

    /// Selected channel names of `modality`, or `None` when unconstrained.
    pub fn channels(&self, modality: &str) -> Option<&BTreeSet<String>> {
        self.selected.get(modality)
    }

    /// `table` reduced to the selected channels of `modality`.
    pub fn apply(&self, modality: &str, table: &ModalityTable) -> ModalityTable {
        match self.selected.get(modality) {
            Some(keep) => table.retain_channels(keep),
            None => table.clone(),
        }
    }
}

fn channel_set(table: &ModalityTable) -> BTreeSet<String> {
    table.channels().iter().map(|c| c.name.clone()).collect()
}

// ---------------------------------------------------------------------------
// Time windows on the shared timeline
// ---------------------------------------------------------------------------

/// Index range of the timeline points inside `[start, end]`.
///
/// Empty when the interval misses the timeline or `start > end`.
pub fn window_range(timeline: &[f64], start: f64, end: f64) -> Range<usize> {
    let lo = timeline.partition_point(|&t| t < start);
    let hi = timeline.partition_point(|&t| t <= end);
    lo..hi.max(lo)
}

/// Selected channels of every modality, cut to timeline rows `range`.
pub fn extract(
    dataset: &SynchronizedDataset,
    selection: &ChannelSelection,
    range: Range<usize>,
) -> BTreeMap<String, ModalityTable> {
    dataset
        .tables()
        .iter()
        .map(|(modality, table)| {
            let selected = selection.apply(modality, table);
            (modality.clone(), selected.slice(range.clone()))
        })
        .collect()
}
