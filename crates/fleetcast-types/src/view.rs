//! Materialized views and the envelope they travel in.
//!
//! A [`View`] is a fully rendered snapshot of one category of state. It is
//! wrapped in a [`ViewEnvelope`] carrying the wire name and a timestamp,
//! and serialized once per round into the text frame every subscriber
//! receives:
//!
//! ```json
//! {"type": "resources", "data": [...], "timestamp": "2026-01-01T00:00:00Z"}
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use ts_rs::TS;

use crate::enums::ViewKind;
use crate::records::{PerformanceMetrics, ProgressRecord, StatusHistogram, TaskRecord, UnitRecord};

/// A rendered view. Serializes as its bare payload; the envelope supplies
/// the `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(untagged)]
#[ts(export, export_to = "bindings/")]
pub enum View {
    /// One record per unit.
    Resources(Vec<UnitRecord>),
    /// One record per (task, assigned unit) pair.
    Progress(Vec<ProgressRecord>),
    /// Task status histogram.
    Statistics(StatusHistogram),
    /// Fleet size and responsiveness.
    Metrics(PerformanceMetrics),
    /// One record per task.
    Tasks(Vec<TaskRecord>),
}

impl View {
    /// The kind of this view.
    pub const fn kind(&self) -> ViewKind {
        match self {
            Self::Resources(_) => ViewKind::Resources,
            Self::Progress(_) => ViewKind::Progress,
            Self::Statistics(_) => ViewKind::Statistics,
            Self::Metrics(_) => ViewKind::Metrics,
            Self::Tasks(_) => ViewKind::Tasks,
        }
    }
}

/// The outbound message: `{type, data, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ViewEnvelope {
    /// Wire name of the view.
    #[serde(rename = "type")]
    pub kind: ViewKind,
    /// The view payload.
    pub data: View,
    /// When the envelope was created (RFC 3339, UTC).
    pub timestamp: DateTime<Utc>,
}

impl ViewEnvelope {
    /// Wrap a view, stamping it with the given time.
    pub const fn new(data: View, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: data.kind(),
            data,
            timestamp,
        }
    }

    /// Wrap a view, stamping it with the current time.
    pub fn now(data: View) -> Self {
        Self::new(data, Utc::now())
    }

    /// Serialize into the text frame sent to subscribers.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
