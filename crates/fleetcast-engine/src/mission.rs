//! Mission driver: moves configured tasks through their lifecycle.
//!
//! A mission marks its task running, waits out the transit delay, starts
//! the task's workload on every assigned unit, counts the remaining time
//! down once per second, and finally marks the task ended. If any unit
//! rejects its workload (or does not exist) the task ends as breaking
//! instead.

use std::sync::Arc;
use std::time::Duration;

use fleetcast_sim::{Fleet, TaskBoard, TaskSpec, WorkloadRequest, WorkloadReport};
use fleetcast_types::{TaskId, TaskStatus};
use futures::future::join_all;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn};

use crate::error::MissionError;

/// Drive one task to completion and return its final status.
///
/// # Errors
///
/// Returns [`MissionError::Board`] if the task board rejects an update,
/// for example because the task does not exist.
pub async fn run_mission(
    fleet: Arc<Fleet>,
    board: Arc<TaskBoard>,
    spec: TaskSpec,
    transit_delay: Duration,
) -> Result<TaskStatus, MissionError> {
    let id = TaskId(spec.id);
    board.set_status(id, TaskStatus::Running).await?;
    info!(task = %id, name = %spec.name, units = spec.units.len(), "Mission started");

    tokio::time::sleep(transit_delay).await;

    let request = WorkloadRequest::new(
        spec.required_memory,
        spec.cycles,
        Duration::from_secs(spec.duration_secs),
    );
    let (workloads, rejected) = start_workloads(&fleet, id, &spec.units, request);

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;
    for remaining in (0..spec.duration_secs).rev() {
        ticker.tick().await;
        board.set_remaining(id, remaining).await?;
    }

    let aborted = join_all(workloads)
        .await
        .into_iter()
        .filter_map(Result::err)
        .inspect(|e| warn!(task = %id, error = %e, "Workload task aborted"))
        .count();

    let status = if rejected == 0 && aborted == 0 {
        TaskStatus::Ended
    } else {
        TaskStatus::Breaking
    };
    board.set_status(id, status).await?;
    info!(task = %id, status = status.label(), rejected, aborted, "Mission finished");
    Ok(status)
}

fn start_workloads(
    fleet: &Fleet,
    task: TaskId,
    units: &[String],
    request: WorkloadRequest,
) -> (Vec<JoinHandle<WorkloadReport>>, usize) {
    let mut handles = Vec::with_capacity(units.len());
    let mut rejected = 0_usize;
    for name in units {
        let Some(unit) = fleet.get(name) else {
            warn!(task = %task, unit = %name, "Assigned unit does not exist");
            rejected = rejected.saturating_add(1);
            continue;
        };
        match unit.start_workload(request) {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                warn!(task = %task, unit = %name, error = %e, "Workload rejected");
                rejected = rejected.saturating_add(1);
            }
        }
    }
    (handles, rejected)
}

/// Run every assigned mission concurrently until all have finished.
///
/// Tasks without assigned units are left untouched.
pub async fn run_all(
    fleet: Arc<Fleet>,
    board: Arc<TaskBoard>,
    specs: Vec<TaskSpec>,
    transit_delay: Duration,
) {
    let mut missions = JoinSet::new();
    for spec in specs.into_iter().filter(|spec| !spec.units.is_empty()) {
        let _ = missions.spawn(run_mission(
            Arc::clone(&fleet),
            Arc::clone(&board),
            spec,
            transit_delay,
        ));
    }

    while let Some(result) = missions.join_next().await {
        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "Mission failed"),
            Err(e) => warn!(error = %e, "Mission task aborted"),
        }
    }
    info!("All missions finished");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use fleetcast_sim::UnitSpec;

    use super::*;

    fn fleet() -> Arc<Fleet> {
        let specs = [("Drone1", 0.0), ("Drone2", 10.0)]
            .into_iter()
            .map(|(name, x)| {
                (
                    name.to_owned(),
                    UnitSpec {
                        x,
                        y: 0.0,
                        cpu_frequency: 2.5,
                        memory_usage: 2,
                        total_memory: 8,
                    },
                )
            })
            .collect();
        Arc::new(Fleet::from_specs(&specs, Duration::from_millis(50)).unwrap())
    }

    fn spec(units: &[&str], required_memory: u64) -> TaskSpec {
        TaskSpec {
            id: 1,
            name: String::from("survey"),
            x: 5.0,
            y: 5.0,
            duration_secs: 3,
            units: units.iter().map(|unit| (*unit).to_owned()).collect(),
            required_memory,
            cycles: 2500.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn mission_runs_to_end() {
        let fleet = fleet();
        let spec = spec(&["Drone1", "Drone2"], 4);
        let board = Arc::new(TaskBoard::from_specs(std::slice::from_ref(&spec)).unwrap());

        let mission = tokio::spawn(run_mission(
            Arc::clone(&fleet),
            Arc::clone(&board),
            spec,
            Duration::from_secs(1),
        ));

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let task = board.try_task(TaskId(1)).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.remaining_secs < 3);
        assert_eq!(fleet.get("Drone1").unwrap().allocated(), 6);
        assert_eq!(fleet.get("Drone2").unwrap().allocated(), 6);

        assert_eq!(mission.await.unwrap().unwrap(), TaskStatus::Ended);
        let task = board.try_task(TaskId(1)).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Ended);
        assert_eq!(task.remaining_secs, 0);
        assert_eq!(fleet.get("Drone1").unwrap().allocated(), 2);
        assert!(!fleet.get("Drone2").unwrap().is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_unit_breaks_the_mission() {
        let fleet = fleet();
        let spec = spec(&["Drone1", "Ghost"], 4);
        let board = Arc::new(TaskBoard::from_specs(std::slice::from_ref(&spec)).unwrap());

        let status = run_mission(Arc::clone(&fleet), Arc::clone(&board), spec, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(status, TaskStatus::Breaking);
        assert_eq!(fleet.get("Drone1").unwrap().allocated(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_workload_breaks_the_mission() {
        let fleet = fleet();
        let spec = spec(&["Drone1"], 7);
        let board = Arc::new(TaskBoard::from_specs(std::slice::from_ref(&spec)).unwrap());

        let status = run_mission(fleet, Arc::clone(&board), spec, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(status, TaskStatus::Breaking);
        assert_eq!(
            board.try_task(TaskId(1)).unwrap().unwrap().status,
            TaskStatus::Breaking
        );
    }

    #[tokio::test]
    async fn unknown_task_is_an_error() {
        let result = run_mission(
            fleet(),
            Arc::new(TaskBoard::new()),
            spec(&["Drone1"], 1),
            Duration::ZERO,
        )
        .await;
        assert!(matches!(result, Err(MissionError::Board { .. })));
    }
}
