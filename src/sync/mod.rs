//! Synchronization core: pure numeric transforms over in-memory tables.
//!
//! ```text
//!  name → ModalityTable (native rates)
//!        │
//!        ▼
//!   ┌──────────────┐
//!   │ synchronizer  │  common duration = min(durations)
//!   └──────────────┘
//!        │
//!        ├──► timeline   build(common_duration, target_rate)
//!        │
//!        ▼   per modality: trim → decimate (if faster) → resample
//!   ┌──────────┐     ┌──────────┐
//!   │ decimate  │ ──► │ resample  │   onto the shared timeline
//!   └──────────┘     └──────────┘
//!        │
//!        ▼
//!   SynchronizedDataset ──► envelope (display only)
//! ```

pub mod decimate;
pub mod envelope;
pub mod iir;
pub mod resample;
pub mod synchronizer;
pub mod timeline;

pub use decimate::Decimator;
pub use envelope::envelopes;
pub use resample::{resample, BoundaryMode};
pub use synchronizer::Synchronizer;
pub use timeline::TargetTimeline;
