use thiserror::Error;

/// Result alias for the synchronization core.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by the synchronization core.
///
/// Channels with too few valid samples are *not* errors: they come back as
/// all-NaN output. Everything here is fatal for the call that raised it.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Timeline duration is zero, negative or not finite.
    #[error("invalid duration: {duration} s (must be finite and > 0)")]
    InvalidDuration { duration: f64 },

    /// Sampling rate is zero.
    #[error("invalid sampling rate: {rate} Hz (must be > 0)")]
    InvalidRate { rate: u32 },

    /// Malformed source series handed to the resampler.
    #[error("interpolation failed: {reason}")]
    Interpolation { reason: String },

    /// Decimation parameters do not yield a usable anti-alias filter.
    #[error("filter design failed: {reason}")]
    FilterDesign { reason: String },

    /// A modality table violates its shape invariants.
    #[error("invalid table '{name}': {reason}")]
    InvalidTable { name: String, reason: String },

    /// `synchronize` was called with no tables.
    #[error("no modalities to synchronize")]
    NoModalities,

    /// Processing of one modality failed; the whole call is aborted.
    #[error("modality '{modality}': {source}")]
    Modality {
        modality: String,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    pub(crate) fn interpolation(reason: impl Into<String>) -> Self {
        Self::Interpolation {
            reason: reason.into(),
        }
    }

    pub(crate) fn filter_design(reason: impl Into<String>) -> Self {
        Self::FilterDesign {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_table(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTable {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Attach the modality name to an error raised while processing it.
    pub(crate) fn in_modality(self, modality: &str) -> Self {
        Self::Modality {
            modality: modality.to_string(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping `Modality` wrappers.
    pub fn root(&self) -> &SyncError {
        match self {
            SyncError::Modality { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modality_wrapper_keeps_cause() {
        let err = SyncError::interpolation("time not increasing").in_modality("emg");
        assert_eq!(
            err.to_string(),
            "modality 'emg': interpolation failed: time not increasing"
        );
        assert!(matches!(err.root(), SyncError::Interpolation { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }
}
