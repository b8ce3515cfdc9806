//! Collaborator interfaces read by the snapshot generator.
//!
//! The generator never talks to the simulator directly. It reads units
//! through [`UnitSource`] and tasks through [`TaskSource`], which keeps
//! the views testable with stub sources and lets a deployment without a
//! task board plug in [`NoTasks`].
//!
//! Implementations must not block: a read that would have to wait for a
//! writer returns [`SourceError::WouldBlock`] instead.

use fleetcast_sim::{Fleet, Task, TaskBoard, TaskBoardError, UnitState};
use fleetcast_types::TaskId;

/// Errors returned by collaborator reads.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The source is being written and a read would have to wait.
    #[error("{source_name} is busy; read would block")]
    WouldBlock {
        /// Which collaborator was busy.
        source_name: &'static str,
    },

    /// The source failed for another reason.
    #[error("{source_name} unavailable: {message}")]
    Unavailable {
        /// Which collaborator failed.
        source_name: &'static str,
        /// Description of the failure.
        message: String,
    },
}

/// Read access to the simulated units.
pub trait UnitSource: Send + Sync {
    /// Current state of every unit, in a stable order.
    fn list_units(&self) -> Result<Vec<UnitState>, SourceError>;
}

/// Read access to tasks and their assignments.
pub trait TaskSource: Send + Sync {
    /// Every task, in a stable order.
    fn list_tasks(&self) -> Result<Vec<Task>, SourceError>;

    /// Names of the units assigned to a task.
    fn list_assignments(&self, task: TaskId) -> Result<Vec<String>, SourceError>;
}

impl UnitSource for Fleet {
    fn list_units(&self) -> Result<Vec<UnitState>, SourceError> {
        Ok(self.read_states())
    }
}

impl TaskSource for TaskBoard {
    fn list_tasks(&self) -> Result<Vec<Task>, SourceError> {
        self.try_tasks().map_err(board_error)
    }

    fn list_assignments(&self, task: TaskId) -> Result<Vec<String>, SourceError> {
        self.try_assignments(task).map_err(board_error)
    }
}

fn board_error(error: TaskBoardError) -> SourceError {
    match error {
        TaskBoardError::Busy => SourceError::WouldBlock {
            source_name: "task board",
        },
        other => SourceError::Unavailable {
            source_name: "task board",
            message: other.to_string(),
        },
    }
}

/// A task source with no tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTasks;

impl TaskSource for NoTasks {
    fn list_tasks(&self) -> Result<Vec<Task>, SourceError> {
        Ok(Vec::new())
    }

    fn list_assignments(&self, _task: TaskId) -> Result<Vec<String>, SourceError> {
        Ok(Vec::new())
    }
}
