//! Shared type definitions for the Fleetcast broadcast service.
//!
//! This crate is the single source of truth for identifiers, status
//! enumerations, and the records that travel over the subscriber stream.
//! Wire types derive `ts-rs` so the dashboard's `TypeScript` definitions
//! are generated from the same source.
//!
//! # Modules
//!
//! - [`ids`] -- Subscriber and task identifiers
//! - [`enums`] -- Task status lifecycle, histogram buckets, view kinds
//! - [`records`] -- Per-view record types
//! - [`view`] -- The tagged [`View`] union and its [`ViewEnvelope`]

pub mod enums;
pub mod ids;
pub mod records;
pub mod view;

pub use enums::{StatusBucket, TaskStatus, ViewKind};
pub use ids::{SubscriberId, TaskId};
pub use records::{
    PerformanceMetrics, Position, ProgressRecord, StatusHistogram, TaskRecord, UnitRecord,
};
pub use view::{View, ViewEnvelope};
