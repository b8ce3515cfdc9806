//! Minimal task and assignment store.
//!
//! The board records which tasks exist, where they are, their status
//! code, and their remaining time, plus the units assigned to each task.
//! It contains no scheduling logic: whoever drives missions updates the
//! board through the async writers.
//!
//! Readers use the `try_*` methods, which never wait. If a writer holds
//! the lock they fail with [`TaskBoardError::Busy`] so the broadcast
//! path can skip a view rather than stall.

use std::collections::BTreeMap;

use fleetcast_types::{Position, TaskId, TaskStatus};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::TaskBoardError;

/// A task as seen by the snapshot views.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    /// Task identifier.
    pub id: TaskId,
    /// Display name.
    pub name: String,
    /// Task east offset.
    pub x: f64,
    /// Task north offset.
    pub y: f64,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Planned duration in seconds.
    pub duration_secs: u64,
    /// Seconds left until the task ends.
    pub remaining_secs: u64,
}

impl Task {
    /// Create a task that has not started, with its full duration remaining.
    pub fn new(id: TaskId, name: impl Into<String>, position: Position, duration_secs: u64) -> Self {
        Self {
            id,
            name: name.into(),
            x: position.x,
            y: position.y,
            status: TaskStatus::NotStarted,
            duration_secs,
            remaining_secs: duration_secs,
        }
    }
}

/// Task definition as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskSpec {
    /// Task identifier.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Task east offset.
    #[serde(default)]
    pub x: f64,
    /// Task north offset.
    #[serde(default)]
    pub y: f64,
    /// Planned duration in seconds.
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    /// Units assigned to the task.
    #[serde(default)]
    pub units: Vec<String>,
    /// Memory each assigned unit allocates while working the task.
    #[serde(default = "default_required_memory")]
    pub required_memory: u64,
    /// Clock cycles each assigned unit spends on the task.
    #[serde(default = "default_cycles")]
    pub cycles: f64,
}

const fn default_duration_secs() -> u64 {
    10
}

const fn default_required_memory() -> u64 {
    2
}

const fn default_cycles() -> f64 {
    2500.0
}

#[derive(Debug, Default)]
struct BoardState {
    tasks: BTreeMap<TaskId, Task>,
    assignments: BTreeMap<TaskId, Vec<String>>,
}

/// Shared store of tasks and their unit assignments.
#[derive(Debug, Default)]
pub struct TaskBoard {
    state: RwLock<BoardState>,
}

impl TaskBoard {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a board from configuration. Tasks with assigned units start
    /// in the `Assigned` status.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBoardError::DuplicateTask`] if two specs share an id.
    pub fn from_specs(specs: &[TaskSpec]) -> Result<Self, TaskBoardError> {
        let mut state = BoardState::default();
        for spec in specs {
            let id = TaskId(spec.id);
            if state.tasks.contains_key(&id) {
                return Err(TaskBoardError::DuplicateTask(id));
            }
            let mut task = Task::new(
                id,
                spec.name.clone(),
                Position::at_cruise(spec.x, spec.y),
                spec.duration_secs,
            );
            if !spec.units.is_empty() {
                task.status = TaskStatus::Assigned;
                let _ = state.assignments.insert(id, spec.units.clone());
            }
            let _ = state.tasks.insert(id, task);
        }
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Add a task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBoardError::DuplicateTask`] if the id is taken.
    pub async fn insert(&self, task: Task) -> Result<(), TaskBoardError> {
        let mut state = self.state.write().await;
        if state.tasks.contains_key(&task.id) {
            return Err(TaskBoardError::DuplicateTask(task.id));
        }
        let _ = state.tasks.insert(task.id, task);
        Ok(())
    }

    /// Replace the units assigned to a task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBoardError::TaskNotFound`] for an unknown task.
    pub async fn assign(&self, id: TaskId, units: Vec<String>) -> Result<(), TaskBoardError> {
        let mut state = self.state.write().await;
        if !state.tasks.contains_key(&id) {
            return Err(TaskBoardError::TaskNotFound(id));
        }
        let _ = state.assignments.insert(id, units);
        Ok(())
    }

    /// Set a task's status.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBoardError::TaskNotFound`] for an unknown task.
    pub async fn set_status(&self, id: TaskId, status: TaskStatus) -> Result<(), TaskBoardError> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or(TaskBoardError::TaskNotFound(id))?;
        task.status = status;
        Ok(())
    }

    /// Set a task's remaining time, capped at its duration.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBoardError::TaskNotFound`] for an unknown task.
    pub async fn set_remaining(&self, id: TaskId, remaining_secs: u64) -> Result<(), TaskBoardError> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or(TaskBoardError::TaskNotFound(id))?;
        task.remaining_secs = remaining_secs.min(task.duration_secs);
        Ok(())
    }

    /// All tasks ordered by id, without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBoardError::Busy`] if a writer holds the board.
    pub fn try_tasks(&self) -> Result<Vec<Task>, TaskBoardError> {
        let state = self.state.try_read()?;
        Ok(state.tasks.values().cloned().collect())
    }

    /// One task by id, without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBoardError::Busy`] if a writer holds the board.
    pub fn try_task(&self, id: TaskId) -> Result<Option<Task>, TaskBoardError> {
        let state = self.state.try_read()?;
        Ok(state.tasks.get(&id).cloned())
    }

    /// Units assigned to a task, without waiting. Unassigned and unknown
    /// tasks both yield an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBoardError::Busy`] if a writer holds the board.
    pub fn try_assignments(&self, id: TaskId) -> Result<Vec<String>, TaskBoardError> {
        let state = self.state.try_read()?;
        Ok(state.assignments.get(&id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn spec(id: u64, units: &[&str]) -> TaskSpec {
        TaskSpec {
            id,
            name: format!("survey-{id}"),
            x: 1.0,
            y: 2.0,
            duration_secs: 20,
            units: units.iter().map(|u| (*u).to_owned()).collect(),
            required_memory: 2,
            cycles: 100.0,
        }
    }

    #[tokio::test]
    async fn seeded_tasks_reflect_assignments() {
        let board = TaskBoard::from_specs(&[spec(1, &["Drone1", "Drone2"]), spec(2, &[])]).unwrap();

        let tasks = board.try_tasks().unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks.first().map(|t| t.status), Some(TaskStatus::Assigned));
        assert_eq!(tasks.get(1).map(|t| t.status), Some(TaskStatus::NotStarted));
        assert_eq!(board.try_assignments(TaskId(1)).unwrap(), vec!["Drone1", "Drone2"]);
        assert!(board.try_assignments(TaskId(2)).unwrap().is_empty());
    }

    #[test]
    fn duplicate_spec_ids_are_rejected() {
        let result = TaskBoard::from_specs(&[spec(1, &[]), spec(1, &[])]);
        assert!(matches!(result, Err(TaskBoardError::DuplicateTask(TaskId(1)))));
    }

    #[tokio::test]
    async fn writers_update_status_and_remaining() {
        let board = TaskBoard::from_specs(&[spec(1, &["Drone1"])]).unwrap();
        board.set_status(TaskId(1), TaskStatus::Running).await.unwrap();
        board.set_remaining(TaskId(1), 500).await.unwrap();

        let task = board.try_task(TaskId(1)).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.remaining_secs, 20);

        assert!(matches!(
            board.set_status(TaskId(9), TaskStatus::Ended).await,
            Err(TaskBoardError::TaskNotFound(TaskId(9)))
        ));
    }

    #[tokio::test]
    async fn reads_fail_fast_while_writer_holds_the_board() {
        let board = TaskBoard::from_specs(&[spec(1, &["Drone1"])]).unwrap();
        let guard = board.state.write().await;
        assert!(matches!(board.try_tasks(), Err(TaskBoardError::Busy)));
        assert!(matches!(board.try_assignments(TaskId(1)), Err(TaskBoardError::Busy)));
        drop(guard);
        assert!(board.try_tasks().is_ok());
    }

    #[tokio::test]
    async fn insert_and_assign() {
        let board = TaskBoard::new();
        board
            .insert(Task::new(TaskId(5), "relay", Position::default(), 30))
            .await
            .unwrap();
        board.assign(TaskId(5), vec!["Drone3".to_owned()]).await.unwrap();
        assert_eq!(board.try_assignments(TaskId(5)).unwrap(), vec!["Drone3"]);
        assert!(board.assign(TaskId(6), Vec::new()).await.is_err());
    }
}
