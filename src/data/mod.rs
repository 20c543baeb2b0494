//! Data layer: core types, loading, selection and export.
//!
//! Architecture:
//! ```text
//!  .csv (vendor / tidy) / .json / .parquet
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  parse file → ModalityTable, roles from schema
//!   └──────────┘
//!        │
//!        ▼
//!   ┌───────────────┐
//!   │ ModalityTable  │  time + channels, validated once
//!   └───────────────┘
//!        │   (sync::Synchronizer)
//!        ▼
//!   ┌──────────┐
//!   │  select   │  channel subsets, time windows
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  export   │  csv / json / parquet
//!   └──────────┘
//! ```

pub mod export;
pub mod loader;
pub mod model;
pub mod schema;
pub mod select;
