use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::model::Channel;

// ---------------------------------------------------------------------------
// ChannelRole – the closed set of channels consumers can ask for by meaning
// ---------------------------------------------------------------------------

/// Semantic role of a channel, assigned once by the loading adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChannelRole {
    // Left force plate
    LeftFx,
    LeftFy,
    LeftFz,
    LeftMx,
    LeftMy,
    LeftMz,
    LeftCopX,
    LeftCopY,
    LeftCopZ,
    // Right force plate
    RightFx,
    RightFy,
    RightFz,
    RightMx,
    RightMy,
    RightMz,
    RightCopX,
    RightCopY,
    RightCopZ,
    // Foot markers
    LeftToeX,
    LeftToeY,
    LeftToeZ,
    LeftHeelX,
    LeftHeelY,
    LeftHeelZ,
    RightToeX,
    RightToeY,
    RightToeZ,
    RightHeelX,
    RightHeelY,
    RightHeelZ,
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

// ---------------------------------------------------------------------------
// ModalityKind – which default schema / vendor layout applies
// ---------------------------------------------------------------------------

/// The sensor subsystem a recording comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModalityKind {
    Kinetics,
    Emg,
    Kinematics,
    Other,
}

impl FromStr for ModalityKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "kinetics" | "force" | "forceplate" => ModalityKind::Kinetics,
            "emg" => ModalityKind::Emg,
            "kinematics" | "mocap" | "markers" => ModalityKind::Kinematics,
            _ => ModalityKind::Other,
        })
    }
}

/// Force-plate components in vendor column order (one plate).
pub const FORCE_PLATE_COMPONENTS: [&str; 9] = ["Fx", "Fy", "Fz", "Mx", "My", "Mz", "Cx", "Cy", "Cz"];

/// Column names for a dual force-plate export: left plate first, then right.
pub fn force_plate_column_names() -> Vec<String> {
    ["L", "R"]
        .iter()
        .flat_map(|side| {
            FORCE_PLATE_COMPONENTS
                .iter()
                .map(move |comp| format!("{comp}_{side}"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// ChannelSchema – exact channel name → role
// ---------------------------------------------------------------------------

/// Explicit mapping from loaded channel names to roles.
///
/// Names are matched exactly; a channel absent from the schema keeps
/// `role == None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelSchema {
    roles: BTreeMap<String, ChannelRole>,
}

impl ChannelSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one mapping (builder style).
    pub fn with(mut self, channel: impl Into<String>, role: ChannelRole) -> Self {
        self.roles.insert(channel.into(), role);
        self
    }

    pub fn role_of(&self, channel: &str) -> Option<ChannelRole> {
        self.roles.get(channel).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Roles for a dual force-plate table named by [`force_plate_column_names`].
    pub fn force_plates() -> Self {
        use ChannelRole::*;
        let roles = [
            LeftFx, LeftFy, LeftFz, LeftMx, LeftMy, LeftMz, LeftCopX, LeftCopY, LeftCopZ,
            RightFx, RightFy, RightFz, RightMx, RightMy, RightMz, RightCopX, RightCopY,
            RightCopZ,
        ];
        force_plate_column_names()
            .into_iter()
            .zip(roles)
            .fold(Self::new(), |schema, (name, role)| schema.with(name, role))
    }

    /// Roles for the toe (`TOE`) and heel (`CAL`) markers of one subject,
    /// named `"{subject}:{marker}:{axis}"` by the vendor CSV loader.
    pub fn foot_markers(subject: &str) -> Self {
        use ChannelRole::*;
        let markers = [
            ("RTOE", [RightToeX, RightToeY, RightToeZ]),
            ("RCAL", [RightHeelX, RightHeelY, RightHeelZ]),
            ("LTOE", [LeftToeX, LeftToeY, LeftToeZ]),
            ("LCAL", [LeftHeelX, LeftHeelY, LeftHeelZ]),
        ];
        let mut schema = Self::new();
        for (marker, roles) in markers {
            for (axis, role) in ["X", "Y", "Z"].iter().zip(roles) {
                schema = schema.with(format!("{subject}:{marker}:{axis}"), role);
            }
        }
        schema
    }

    /// Default schema for a modality kind.
    pub fn default_for(kind: ModalityKind, subject: &str) -> Self {
        match kind {
            ModalityKind::Kinetics => Self::force_plates(),
            ModalityKind::Kinematics => Self::foot_markers(subject),
            ModalityKind::Emg | ModalityKind::Other => Self::new(),
        }
    }

    /// Read a schema from a JSON object `{ "channel name": "RoleName", ... }`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading schema {}", path.display()))?;
        serde_json::from_str(&text).context("parsing channel schema JSON")
    }

    /// Assign roles to channels. Existing roles are overwritten only by a
    /// matching entry.
    pub fn apply(&self, channels: &mut [Channel]) {
        for ch in channels.iter_mut() {
            if let Some(role) = self.role_of(&ch.name) {
                ch.role = Some(role);
            }
        }
    }
}
