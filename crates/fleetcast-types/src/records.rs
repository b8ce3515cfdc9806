//! Record types carried in the `data` field of each broadcast view.
//!
//! Field names on the wire follow the dashboard's camelCase contract
//! (`droneId`, `memoryUsage`, `Tstatus`, ...), while the Rust names use
//! the fleet vocabulary of this workspace.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{StatusBucket, TaskStatus};
use crate::ids::TaskId;

/// A point in the simulated airspace.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Position {
    /// East offset.
    pub x: f64,
    /// North offset.
    pub y: f64,
    /// Altitude (negative is up, matching the simulator's NED frame).
    pub z: f64,
}

impl Position {
    /// Cruise altitude assigned to every unit.
    pub const CRUISE_ALTITUDE: f64 = -10.0;

    /// Create a position at cruise altitude.
    pub const fn at_cruise(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: Self::CRUISE_ALTITUDE,
        }
    }
}

/// One unit's occupancy, as rendered in the `resources` view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct UnitRecord {
    /// Unit name.
    #[serde(rename = "droneId")]
    pub unit: String,
    /// Memory occupancy in percent.
    #[serde(rename = "memoryUsage")]
    pub memory_occupancy_pct: f64,
    /// CPU occupancy in percent.
    #[serde(rename = "cpuUsage")]
    pub cpu_occupancy_pct: f64,
    /// East offset.
    pub x: f64,
    /// North offset.
    pub y: f64,
    /// Altitude.
    pub z: f64,
}

/// Completion of one task on one assigned unit (`progress` view).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ProgressRecord {
    /// Task identifier, rendered as a string.
    pub task_id: String,
    /// Assigned unit name.
    #[serde(rename = "droneId")]
    pub unit: String,
    /// Task display name.
    pub task_name: String,
    /// Completion percentage in `[0, 100]`, one decimal.
    pub progress: f64,
}

/// Task counts per status bucket (`statistics` view).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct StatusHistogram {
    /// Tasks not yet started.
    pub not_started: u32,
    /// Tasks assigned or running.
    pub in_progress: u32,
    /// Tasks that ended.
    pub completed: u32,
    /// Tasks broken off or in an unknown state.
    pub failed: u32,
}

impl StatusHistogram {
    /// Count one task in the given bucket.
    pub const fn record(&mut self, bucket: StatusBucket) {
        let slot = match bucket {
            StatusBucket::NotStarted => &mut self.not_started,
            StatusBucket::InProgress => &mut self.in_progress,
            StatusBucket::Completed => &mut self.completed,
            StatusBucket::Failed => &mut self.failed,
        };
        *slot = slot.saturating_add(1);
    }

    /// Sum of all buckets.
    pub const fn total(&self) -> u32 {
        self.not_started
            .saturating_add(self.in_progress)
            .saturating_add(self.completed)
            .saturating_add(self.failed)
    }
}

/// Fleet-wide performance figures (`metrics` view).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PerformanceMetrics {
    /// Number of simulated units.
    #[serde(rename = "totalDrones")]
    pub total_units: u32,
    /// Milliseconds since the previous broadcast round completed.
    #[serde(rename = "responseTime")]
    pub response_time_ms: f64,
}

/// One task's map marker (`tasksData` view).
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TaskRecord {
    /// Task identifier.
    pub id: TaskId,
    /// Task east offset.
    pub tx: f64,
    /// Task north offset.
    pub ty: f64,
    /// Status label, `unknown` for unrecognized codes.
    #[serde(rename = "Tstatus")]
    #[ts(as = "String")]
    pub status: TaskStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_counts_each_bucket() {
        let mut histogram = StatusHistogram::default();
        histogram.record(StatusBucket::NotStarted);
        histogram.record(StatusBucket::Failed);
        histogram.record(StatusBucket::Failed);
        assert_eq!(histogram.not_started, 1);
        assert_eq!(histogram.failed, 2);
        assert_eq!(histogram.total(), 3);
    }

    #[test]
    fn unit_record_uses_dashboard_field_names() {
        let record = UnitRecord {
            unit: "Drone1".to_owned(),
            memory_occupancy_pct: 25.0,
            cpu_occupancy_pct: 0.0,
            x: 1.0,
            y: 2.0,
            z: Position::CRUISE_ALTITUDE,
        };
        let json = serde_json::to_value(&record).unwrap_or_default();
        assert_eq!(json["droneId"], "Drone1");
        assert_eq!(json["memoryUsage"], 25.0);
        assert_eq!(json["cpuUsage"], 0.0);
    }

    #[test]
    fn task_record_renders_status_label() {
        let record = TaskRecord {
            id: TaskId(3),
            tx: 10.0,
            ty: 20.0,
            status: TaskStatus::from_code(17),
        };
        let json = serde_json::to_value(&record).unwrap_or_default();
        assert_eq!(json["id"], 3);
        assert_eq!(json["Tstatus"], "unknown");
    }
}
