//! Snapshot generation: renders collaborator state into named views.
//!
//! Every call to [`SnapshotGenerator::generate`] reads its collaborators
//! fresh and returns a fully materialized [`View`]. Nothing is cached and
//! nothing is diffed against the previous round. A failing collaborator
//! fails only the view that needed it.

use std::sync::Arc;
use std::time::Duration;

use fleetcast_types::{
    PerformanceMetrics, ProgressRecord, StatusHistogram, TaskRecord, UnitRecord, View, ViewKind,
};

use crate::source::{SourceError, TaskSource, UnitSource};

/// Per-round inputs that do not come from the collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoundContext {
    /// Time since the previous round completed.
    pub since_last_round: Duration,
}

/// A view could not be generated this round.
#[derive(Debug, thiserror::Error)]
#[error("failed to generate {view} view: {source}")]
pub struct ViewGenerationError {
    /// The view that was skipped.
    pub view: ViewKind,
    /// Why the collaborator read failed.
    #[source]
    pub source: SourceError,
}

/// Renders the five broadcast views from unit and task collaborators.
#[derive(Clone)]
pub struct SnapshotGenerator {
    units: Arc<dyn UnitSource>,
    tasks: Arc<dyn TaskSource>,
}

impl std::fmt::Debug for SnapshotGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotGenerator").finish_non_exhaustive()
    }
}

impl SnapshotGenerator {
    /// Create a generator over the given collaborators.
    pub const fn new(units: Arc<dyn UnitSource>, tasks: Arc<dyn TaskSource>) -> Self {
        Self { units, tasks }
    }

    /// Generate one view from the current collaborator state.
    ///
    /// # Errors
    ///
    /// Returns [`ViewGenerationError`] if a collaborator read fails.
    pub fn generate(&self, view: ViewKind, ctx: &RoundContext) -> Result<View, ViewGenerationError> {
        let result = match view {
            ViewKind::Resources => self.resources(),
            ViewKind::Progress => self.progress(),
            ViewKind::Statistics => self.statistics(),
            ViewKind::Metrics => self.metrics(ctx),
            ViewKind::Tasks => self.tasks(),
        };
        result.map_err(|source| ViewGenerationError { view, source })
    }

    /// Number of units reported by the unit source.
    ///
    /// # Errors
    ///
    /// Returns the unit source's error.
    pub fn unit_count(&self) -> Result<usize, SourceError> {
        self.units.list_units().map(|units| units.len())
    }

    fn resources(&self) -> Result<View, SourceError> {
        let records = self
            .units
            .list_units()?
            .into_iter()
            .map(|unit| UnitRecord {
                memory_occupancy_pct: round_to(unit.memory_occupancy_pct, 2),
                cpu_occupancy_pct: round_to(unit.cpu_occupancy_pct, 2),
                x: unit.position.x,
                y: unit.position.y,
                z: unit.position.z,
                unit: unit.name,
            })
            .collect();
        Ok(View::Resources(records))
    }

    fn progress(&self) -> Result<View, SourceError> {
        let mut records = Vec::new();
        for task in self.tasks.list_tasks()? {
            let progress = progress_pct(task.duration_secs, task.remaining_secs);
            for unit in self.tasks.list_assignments(task.id)? {
                records.push(ProgressRecord {
                    task_id: task.id.to_string(),
                    unit,
                    task_name: task.name.clone(),
                    progress,
                });
            }
        }
        Ok(View::Progress(records))
    }

    fn statistics(&self) -> Result<View, SourceError> {
        let mut histogram = StatusHistogram::default();
        for task in self.tasks.list_tasks()? {
            histogram.record(task.status.bucket());
        }
        Ok(View::Statistics(histogram))
    }

    fn metrics(&self, ctx: &RoundContext) -> Result<View, SourceError> {
        let total = self.unit_count()?;
        Ok(View::Metrics(PerformanceMetrics {
            total_units: u32::try_from(total).unwrap_or(u32::MAX),
            response_time_ms: round_to(ctx.since_last_round.as_secs_f64() * 1000.0, 1),
        }))
    }

    fn tasks(&self) -> Result<View, SourceError> {
        let records = self
            .tasks
            .list_tasks()?
            .into_iter()
            .map(|task| TaskRecord {
                id: task.id,
                tx: task.x,
                ty: task.y,
                status: task.status,
            })
            .collect();
        Ok(View::Tasks(records))
    }
}

/// Completion percentage `(duration - remaining) / duration * 100`,
/// clamped to `[0, 100]` and rounded to one decimal.
///
/// A zero-duration task is complete once nothing remains.
#[allow(clippy::cast_precision_loss)]
pub fn progress_pct(duration_secs: u64, remaining_secs: u64) -> f64 {
    if duration_secs == 0 {
        return if remaining_secs == 0 { 100.0 } else { 0.0 };
    }
    let done = duration_secs.saturating_sub(remaining_secs) as f64;
    round_to(done / duration_secs as f64 * 100.0, 1).clamp(0.0, 100.0)
}

/// Round to the given number of decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use fleetcast_sim::{Task, UnitState};
    use fleetcast_types::{Position, TaskId, TaskStatus};

    use super::*;

    struct StubUnits(Vec<UnitState>);

    impl UnitSource for StubUnits {
        fn list_units(&self) -> Result<Vec<UnitState>, SourceError> {
            Ok(self.0.clone())
        }
    }

    struct StubTasks {
        tasks: Vec<Task>,
        assignments: Vec<(TaskId, Vec<String>)>,
        fail_assignments: bool,
    }

    impl TaskSource for StubTasks {
        fn list_tasks(&self) -> Result<Vec<Task>, SourceError> {
            Ok(self.tasks.clone())
        }

        fn list_assignments(&self, task: TaskId) -> Result<Vec<String>, SourceError> {
            if self.fail_assignments {
                return Err(SourceError::WouldBlock {
                    source_name: "assignments",
                });
            }
            Ok(self
                .assignments
                .iter()
                .find(|(id, _)| *id == task)
                .map(|(_, units)| units.clone())
                .unwrap_or_default())
        }
    }

    fn unit(name: &str, memory: f64, cpu: f64) -> UnitState {
        UnitState {
            name: name.to_owned(),
            memory_occupancy_pct: memory,
            cpu_occupancy_pct: cpu,
            position: Position::at_cruise(1.0, 2.0),
            allocated: 2,
            total_capacity: 8,
            busy: cpu > 0.0,
        }
    }

    fn task(id: u64, code: u8, duration: u64, remaining: u64) -> Task {
        let mut task = Task::new(TaskId(id), format!("task-{id}"), Position::at_cruise(3.0, 4.0), duration);
        task.status = TaskStatus::from_code(code);
        task.remaining_secs = remaining;
        task
    }

    fn generator(tasks: Vec<Task>, fail_assignments: bool) -> SnapshotGenerator {
        let assignments = vec![
            (TaskId(1), vec!["Drone1".to_owned(), "Drone2".to_owned()]),
            (TaskId(2), vec!["Drone3".to_owned()]),
        ];
        SnapshotGenerator::new(
            Arc::new(StubUnits(vec![
                unit("Drone1", 25.0, 0.0),
                unit("Drone2", 75.123_456, 12.345_678),
                unit("Drone3", 25.0, 0.0),
            ])),
            Arc::new(StubTasks {
                tasks,
                assignments,
                fail_assignments,
            }),
        )
    }

    #[test]
    fn resources_has_one_record_per_unit() {
        let view = generator(Vec::new(), false)
            .generate(ViewKind::Resources, &RoundContext::default())
            .unwrap();
        let View::Resources(records) = view else {
            panic!("wrong view variant");
        };
        assert_eq!(records.len(), 3);
        let second = records.get(1).unwrap();
        assert_eq!(second.unit, "Drone2");
        assert_eq!(second.memory_occupancy_pct, 75.12);
        assert_eq!(second.cpu_occupancy_pct, 12.35);
        assert_eq!(second.z, Position::CRUISE_ALTITUDE);
    }

    #[test]
    fn progress_has_one_record_per_assigned_pair() {
        let tasks = vec![task(1, 2, 20, 5), task(2, 1, 10, 10), task(3, 0, 10, 10)];
        let view = generator(tasks, false)
            .generate(ViewKind::Progress, &RoundContext::default())
            .unwrap();
        let View::Progress(records) = view else {
            panic!("wrong view variant");
        };
        assert_eq!(records.len(), 3);
        let first = records.first().unwrap();
        assert_eq!(first.task_id, "1");
        assert_eq!(first.unit, "Drone1");
        assert_eq!(first.progress, 75.0);
        assert_eq!(records.get(2).map(|r| r.progress), Some(0.0));
    }

    #[test]
    fn progress_percentage_is_bounded_and_rounded() {
        assert_eq!(progress_pct(3, 2), 33.3);
        assert_eq!(progress_pct(10, 0), 100.0);
        assert_eq!(progress_pct(10, 50), 0.0);
        assert_eq!(progress_pct(0, 0), 100.0);
        assert_eq!(progress_pct(0, 1), 0.0);

        let mut previous = 0.0;
        for remaining in (0..=7).rev() {
            let current = progress_pct(7, remaining);
            assert!((0.0..=100.0).contains(&current));
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn statistics_counts_sum_to_task_count() {
        let tasks: Vec<Task> = (0..12_u8)
            .map(|code| task(u64::from(code), code % 7, 10, 5))
            .collect();
        let view = generator(tasks, false)
            .generate(ViewKind::Statistics, &RoundContext::default())
            .unwrap();
        let View::Statistics(histogram) = view else {
            panic!("wrong view variant");
        };
        assert_eq!(histogram.total(), 12);
    }

    #[test]
    fn metrics_report_unit_count_and_response_time() {
        let ctx = RoundContext {
            since_last_round: Duration::from_micros(512_340),
        };
        let view = generator(Vec::new(), false)
            .generate(ViewKind::Metrics, &ctx)
            .unwrap();
        let View::Metrics(metrics) = view else {
            panic!("wrong view variant");
        };
        assert_eq!(metrics.total_units, 3);
        assert_eq!(metrics.response_time_ms, 512.3);
    }

    #[test]
    fn tasks_view_labels_unknown_status() {
        let view = generator(vec![task(1, 4, 10, 0), task(2, 99, 10, 0)], false)
            .generate(ViewKind::Tasks, &RoundContext::default())
            .unwrap();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json[0]["Tstatus"], "end");
        assert_eq!(json[1]["Tstatus"], "unknown");
        assert_eq!(json[1]["tx"], 3.0);
    }

    #[test]
    fn failing_collaborator_fails_only_its_view() {
        let generator = generator(vec![task(1, 2, 20, 5)], true);
        let ctx = RoundContext::default();

        let failed = generator.generate(ViewKind::Progress, &ctx);
        assert!(matches!(
            failed,
            Err(ViewGenerationError {
                view: ViewKind::Progress,
                ..
            })
        ));
        for view in [ViewKind::Resources, ViewKind::Statistics, ViewKind::Metrics, ViewKind::Tasks] {
            assert!(generator.generate(view, &ctx).is_ok(), "{view} should succeed");
        }
    }
}
