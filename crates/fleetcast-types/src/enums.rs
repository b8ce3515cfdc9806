//! Enumeration types shared by the simulator, the snapshot generator, and
//! the wire protocol.

use serde::{Deserialize, Serialize, Serializer};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Task lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle status of a task, decoded from its raw status code.
///
/// Codes follow the dashboard convention:
///
/// | code | status        | label      |
/// |------|---------------|------------|
/// | 0    | `NotStarted`  | `noStart`  |
/// | 1    | `Assigned`    | `assigned` |
/// | 2    | `Running`     | `running`  |
/// | 3    | `Breaking`    | `breaking` |
/// | 4    | `Ended`       | `end`      |
///
/// Any other code decodes to [`TaskStatus::Unknown`] and is rendered with
/// the `unknown` label instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Created but not yet handed to any unit.
    NotStarted,
    /// Units have been assigned but have not started.
    Assigned,
    /// At least one assigned unit is executing the task.
    Running,
    /// The task was interrupted or a unit rejected its workload.
    Breaking,
    /// The task finished.
    Ended,
    /// A status code outside the known range.
    Unknown(u8),
}

impl TaskStatus {
    /// Decode a raw status code.
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::NotStarted,
            1 => Self::Assigned,
            2 => Self::Running,
            3 => Self::Breaking,
            4 => Self::Ended,
            other => Self::Unknown(other),
        }
    }

    /// Encode back to the raw status code.
    pub const fn code(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Assigned => 1,
            Self::Running => 2,
            Self::Breaking => 3,
            Self::Ended => 4,
            Self::Unknown(code) => code,
        }
    }

    /// Dashboard label used by the `tasksData` view.
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "noStart",
            Self::Assigned => "assigned",
            Self::Running => "running",
            Self::Breaking => "breaking",
            Self::Ended => "end",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Histogram bucket used by the `statistics` view.
    ///
    /// Every status lands in exactly one bucket so bucket counts always
    /// sum to the number of tasks.
    pub const fn bucket(self) -> StatusBucket {
        match self {
            Self::NotStarted => StatusBucket::NotStarted,
            Self::Assigned | Self::Running => StatusBucket::InProgress,
            Self::Ended => StatusBucket::Completed,
            Self::Breaking | Self::Unknown(_) => StatusBucket::Failed,
        }
    }
}

impl From<u8> for TaskStatus {
    fn from(code: u8) -> Self {
        Self::from_code(code)
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// The four fixed buckets of the task status histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub enum StatusBucket {
    /// Not yet started.
    NotStarted,
    /// Assigned or running.
    InProgress,
    /// Finished normally.
    Completed,
    /// Broken off, or carrying an unrecognized status code.
    Failed,
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// The named views broadcast every round, in broadcast order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum ViewKind {
    /// Per-unit memory and CPU occupancy.
    #[serde(rename = "resources")]
    Resources,
    /// Per (task, unit) completion percentage.
    #[serde(rename = "progress")]
    Progress,
    /// Task status histogram.
    #[serde(rename = "statistics")]
    Statistics,
    /// Fleet size and broadcast responsiveness.
    #[serde(rename = "metrics")]
    Metrics,
    /// Per-task position and status label.
    #[serde(rename = "tasksData")]
    Tasks,
}

impl ViewKind {
    /// All views in the fixed order they are generated and sent.
    pub const ALL: [Self; 5] = [
        Self::Resources,
        Self::Progress,
        Self::Statistics,
        Self::Metrics,
        Self::Tasks,
    ];

    /// Wire name carried in the envelope's `type` field.
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Resources => "resources",
            Self::Progress => "progress",
            Self::Statistics => "statistics",
            Self::Metrics => "metrics",
            Self::Tasks => "tasksData",
        }
    }

    /// Resolve a wire name back to a view, if it names one.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.wire_name() == name)
    }
}

impl core::fmt::Display for ViewKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.wire_name())
    }
}
