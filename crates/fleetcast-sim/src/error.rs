//! Error types for the `fleetcast-sim` crate.

use fleetcast_types::TaskId;

/// Errors raised while constructing units.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    /// Total memory capacity must be positive.
    #[error("unit {unit}: total capacity must be greater than zero")]
    ZeroCapacity {
        /// The offending unit.
        unit: String,
    },

    /// The initial allocation does not fit in the unit.
    #[error("unit {unit}: initial allocation {allocation} exceeds capacity {capacity}")]
    AllocationExceedsCapacity {
        /// The offending unit.
        unit: String,
        /// Requested initial allocation.
        allocation: u64,
        /// Total capacity.
        capacity: u64,
    },

    /// Clock rate must be a finite positive number.
    #[error("unit {unit}: clock rate must be finite and positive, got {clock_rate}")]
    InvalidClockRate {
        /// The offending unit.
        unit: String,
        /// The rejected clock rate.
        clock_rate: f64,
    },

    /// Another unit already uses this name.
    #[error("unit {unit} is already registered")]
    DuplicateName {
        /// The duplicated name.
        unit: String,
    },
}

/// Errors raised when a workload is submitted to a unit.
///
/// Every variant is returned before any unit state changes, except
/// [`WorkloadError::Aborted`], which is reported after the allocation has
/// already been released.
#[derive(Debug, thiserror::Error)]
pub enum WorkloadError {
    /// The unit does not have enough free memory to admit the workload.
    #[error("unit {unit}: insufficient capacity (requested {requested}, available {available})")]
    InsufficientCapacity {
        /// The unit that rejected the workload.
        unit: String,
        /// Memory requested by the workload.
        requested: u64,
        /// Free memory at admission time.
        available: u64,
    },

    /// The unit is already executing a workload.
    #[error("unit {unit} is busy with another workload")]
    UnitBusy {
        /// The busy unit.
        unit: String,
    },

    /// The request itself is malformed.
    #[error("invalid workload request: {reason}")]
    InvalidRequest {
        /// What is wrong with the request.
        reason: String,
    },

    /// The workload task was cancelled or panicked before reporting.
    #[error("unit {unit}: workload task aborted")]
    Aborted {
        /// The unit whose workload was aborted.
        unit: String,
    },
}

/// Errors raised by the task board.
#[derive(Debug, thiserror::Error)]
pub enum TaskBoardError {
    /// A writer currently holds the board; non-blocking reads fail fast.
    #[error("task board is busy")]
    Busy,

    /// The referenced task does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// A task with this identifier already exists.
    #[error("task {0} already exists")]
    DuplicateTask(TaskId),
}

impl From<tokio::sync::TryLockError> for TaskBoardError {
    fn from(_: tokio::sync::TryLockError) -> Self {
        Self::Busy
    }
}
