//! Synchronization of multi-rate biomechanical recordings (force plates,
//! EMG, motion capture) onto one shared timeline, plus the loading, export
//! and annotation tooling around it.

pub mod annotation;
pub mod config;
pub mod data;
pub mod error;
pub mod session;
pub mod sync;

pub use config::SyncConfig;
pub use data::model::{Channel, ModalityTable, SynchronizedDataset};
pub use error::{SyncError, SyncResult};
pub use session::TrialSession;
pub use sync::{BoundaryMode, Synchronizer, TargetTimeline};
