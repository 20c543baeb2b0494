use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::sync::envelope::DEFAULT_WINDOW_MS;
use crate::sync::resample::BoundaryMode;
use crate::sync::synchronizer::DEFAULT_TARGET_RATE;

/// Run configuration. Every field has a default, so a config file only
/// needs the values it changes:
///
/// ```json
/// { "target_rate": 500, "boundary": "clamp" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Common timeline rate in Hz.
    pub target_rate: u32,
    /// Envelope smoothing window in milliseconds.
    pub envelope_window_ms: f64,
    /// Resampler behaviour outside the valid source range.
    pub boundary: BoundaryMode,
    /// Length of the annotation window cut from the start of the trial.
    pub annotation_window_s: Option<f64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            target_rate: DEFAULT_TARGET_RATE,
            envelope_window_ms: DEFAULT_WINDOW_MS,
            boundary: BoundaryMode::Extrapolate,
            annotation_window_s: None,
        }
    }
}

impl SyncConfig {
    /// Read a JSON config file and validate it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_rate == 0 {
            bail!("target_rate must be > 0");
        }
        if !(self.envelope_window_ms.is_finite() && self.envelope_window_ms > 0.0) {
            bail!(
                "envelope_window_ms must be a positive number, got {}",
                self.envelope_window_ms
            );
        }
        if let Some(w) = self.annotation_window_s {
            if !(w.is_finite() && w > 0.0) {
                bail!("annotation_window_s must be a positive number, got {w}");
            }
        }
        Ok(())
    }
}
