//! Type-safe identifier wrappers.
//!
//! Subscribers are identified by a UUID assigned when their connection
//! is registered. Tasks keep the small integer identifiers used by the
//! dashboard, so [`TaskId`] wraps a `u64` instead.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Unique identifier for a connected subscriber.
///
/// Uses UUID v7 so identifiers roughly sort by connection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SubscriberId(pub Uuid);

impl SubscriberId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SubscriberId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Identifier of a task on the task board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TaskId(#[ts(type = "number")] pub u64);

impl TaskId {
    /// Return the raw numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for TaskId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}
