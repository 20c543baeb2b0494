//! Gait event annotations on the synchronized timeline.
//!
//! Events are kept in an append-only log: recording and retracting both add
//! entries, and the current event set is obtained by replaying the log.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::model::SynchronizedDataset;
use crate::sync::timeline::TargetTimeline;

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GaitEventKind {
    LeftHeelStrike,
    LeftToeOff,
    RightHeelStrike,
    RightToeOff,
}

impl GaitEventKind {
    pub const ALL: [GaitEventKind; 4] = [
        GaitEventKind::LeftHeelStrike,
        GaitEventKind::LeftToeOff,
        GaitEventKind::RightHeelStrike,
        GaitEventKind::RightToeOff,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GaitEventKind::LeftHeelStrike => "left_heel_strike",
            GaitEventKind::LeftToeOff => "left_toe_off",
            GaitEventKind::RightHeelStrike => "right_heel_strike",
            GaitEventKind::RightToeOff => "right_toe_off",
        }
    }
}

impl fmt::Display for GaitEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GaitEventKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        GaitEventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown gait event '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Event log
// ---------------------------------------------------------------------------

/// One annotated event, snapped to a timeline point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaitEvent {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: GaitEventKind,
    /// Index into the synchronized timeline.
    pub frame: usize,
    /// Timeline value at `frame`, in seconds.
    pub time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LogEntry {
    Recorded(GaitEvent),
    Retracted { id: u64 },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    entries: Vec<LogEntry>,
    next_id: u64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Record `kind` at the timeline point nearest to `time`.
    pub fn record(
        &mut self,
        kind: GaitEventKind,
        time: f64,
        timeline: &TargetTimeline,
    ) -> Result<GaitEvent> {
        let frame = match timeline.nearest_index(time) {
            Some(frame) => frame,
            None if timeline.is_empty() => bail!("cannot annotate an empty timeline"),
            None => bail!("event time {time} is not finite"),
        };
        let event = GaitEvent {
            id: self.next_id,
            kind,
            frame,
            time: timeline.as_slice()[frame],
        };
        self.next_id += 1;
        self.entries.push(LogEntry::Recorded(event.clone()));
        Ok(event)
    }

    /// Withdraw an active event. The recorded entry stays in the log.
    pub fn retract(&mut self, id: u64) -> Result<()> {
        if !self.active_ids().contains(&id) {
            bail!("no active event with id {id}");
        }
        self.entries.push(LogEntry::Retracted { id });
        Ok(())
    }

    fn active_ids(&self) -> BTreeSet<u64> {
        let mut ids = BTreeSet::new();
        for entry in &self.entries {
            match entry {
                LogEntry::Recorded(e) => {
                    ids.insert(e.id);
                }
                LogEntry::Retracted { id } => {
                    ids.remove(id);
                }
            }
        }
        ids
    }

    /// Events not retracted, ordered by time then id.
    pub fn active(&self) -> Vec<GaitEvent> {
        let ids = self.active_ids();
        let mut events: Vec<GaitEvent> = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                LogEntry::Recorded(e) if ids.contains(&e.id) => Some(e.clone()),
                _ => None,
            })
            .collect();
        events.sort_by(|a, b| a.time.total_cmp(&b.time).then(a.id.cmp(&b.id)));
        events
    }

    pub fn validate(&self) -> Validation {
        Validation::of(&self.active())
    }

    /// Export document for the active events of `trial_id`.
    pub fn export(&self, trial_id: &str, dataset: &SynchronizedDataset) -> AnnotationExport {
        let events = self.active();
        AnnotationExport {
            trial_info: TrialInfo {
                trial_id: trial_id.to_string(),
                annotation_date: Utc::now(),
                total_events: events.len(),
                duration_seconds: dataset.common_duration(),
                sampling_rate_hz: dataset.target_rate(),
            },
            methodology: Methodology {
                annotation_method: "manual_expert_annotation".to_string(),
                data_modalities: dataset.modalities().into_iter().map(String::from).collect(),
            },
            events,
        }
    }

    /// Write [`EventLog::export`] as pretty JSON.
    pub fn export_json(
        &self,
        trial_id: &str,
        dataset: &SynchronizedDataset,
        path: &Path,
    ) -> Result<AnnotationExport> {
        let doc = self.export(trial_id, dataset);
        let text = serde_json::to_string_pretty(&doc).context("serializing annotations")?;
        std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
        Ok(doc)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Every event kind is present at least once.
    Valid,
    Incomplete,
    NoEvents,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
    pub span: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub total_events: usize,
    pub event_distribution: BTreeMap<GaitEventKind, usize>,
    pub time_range: Option<TimeRange>,
    pub missing_event_types: Vec<GaitEventKind>,
    pub status: ValidationStatus,
}

impl Validation {
    fn of(events: &[GaitEvent]) -> Self {
        let mut event_distribution = BTreeMap::new();
        for e in events {
            *event_distribution.entry(e.kind).or_insert(0) += 1;
        }
        let time_range = events
            .iter()
            .map(|e| e.time)
            .fold(None, |acc: Option<(f64, f64)>, t| match acc {
                None => Some((t, t)),
                Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
            })
            .map(|(start, end)| TimeRange {
                start,
                end,
                span: end - start,
            });
        let missing_event_types: Vec<GaitEventKind> = GaitEventKind::ALL
            .into_iter()
            .filter(|k| !event_distribution.contains_key(k))
            .collect();
        let status = if events.is_empty() {
            ValidationStatus::NoEvents
        } else if missing_event_types.is_empty() {
            ValidationStatus::Valid
        } else {
            ValidationStatus::Incomplete
        };
        Self {
            total_events: events.len(),
            event_distribution,
            time_range,
            missing_event_types,
            status,
        }
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.status == ValidationStatus::NoEvents {
            return writeln!(f, "No events annotated");
        }
        writeln!(f, "Total events: {}", self.total_events)?;
        if let Some(r) = &self.time_range {
            writeln!(f, "Time range: {:.2} - {:.2} s (span {:.2} s)", r.start, r.end, r.span)?;
        }
        for (kind, count) in &self.event_distribution {
            writeln!(f, "  {kind}: {count}")?;
        }
        match self.status {
            ValidationStatus::Valid => writeln!(f, "Status: VALID"),
            _ => {
                let missing: Vec<&str> =
                    self.missing_event_types.iter().map(|k| k.as_str()).collect();
                writeln!(f, "Status: INCOMPLETE (missing: {})", missing.join(", "))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Export document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialInfo {
    pub trial_id: String,
    pub annotation_date: DateTime<Utc>,
    pub total_events: usize,
    pub duration_seconds: f64,
    pub sampling_rate_hz: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Methodology {
    pub annotation_method: String,
    pub data_modalities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationExport {
    pub trial_info: TrialInfo,
    pub methodology: Methodology,
    pub events: Vec<GaitEvent>,
}
