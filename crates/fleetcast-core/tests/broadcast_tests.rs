//! Integration tests for the broadcast pipeline.
//!
//! These drive [`BroadcastCoordinator::run_round`] against a real fleet and
//! task board with in-process channel subscribers, so every frame that a
//! `WebSocket` client would see can be inspected directly.

#![allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::arithmetic_side_effects
)]

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use fleetcast_core::{
    BroadcastCoordinator, BroadcastSettings, ChannelSink, MessageSink, SendError, SnapshotGenerator,
    SourceError, SubscriberRegistry, TaskSource,
};
use fleetcast_sim::{Fleet, Task, TaskBoard, UnitParams, WorkloadRequest};
use fleetcast_types::{Position, SubscriberId, TaskId, TaskStatus, ViewKind};
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;

fn demo_fleet() -> Arc<Fleet> {
    let mut fleet = Fleet::new().with_sample_period(Duration::from_millis(50));
    for (name, x) in [("Drone1", 0.0), ("Drone2", 10.0), ("Drone3", 20.0)] {
        fleet
            .create_unit(
                name,
                UnitParams {
                    total_capacity: 8,
                    initial_allocation: 2,
                    clock_rate: 2.5,
                    position: Position::at_cruise(x, 0.0),
                },
            )
            .unwrap();
    }
    Arc::new(fleet)
}

async fn demo_board() -> Arc<TaskBoard> {
    let board = TaskBoard::new();
    for (id, code) in [(1, 0_u8), (2, 1), (3, 2), (4, 3), (5, 4), (6, 42)] {
        let mut task = Task::new(
            TaskId(id),
            format!("survey-{id}"),
            Position::at_cruise(5.0, 5.0),
            10,
        );
        task.status = TaskStatus::from_code(code);
        board.insert(task).await.unwrap();
    }
    board
        .assign(TaskId(3), vec!["Drone1".to_owned(), "Drone2".to_owned()])
        .await
        .unwrap();
    Arc::new(board)
}

fn coordinator_over(fleet: Arc<Fleet>, tasks: Arc<dyn TaskSource>) -> BroadcastCoordinator {
    BroadcastCoordinator::new(
        SnapshotGenerator::new(fleet, tasks),
        Arc::new(SubscriberRegistry::new()),
        BroadcastSettings::default(),
    )
}

async fn subscribe(coordinator: &BroadcastCoordinator) -> (SubscriberId, mpsc::Receiver<Bytes>) {
    let (sink, rx) = ChannelSink::new(256);
    let id = coordinator.registry().add(Arc::new(sink)).await;
    (id, rx)
}

fn drain(rx: &mut mpsc::Receiver<Bytes>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(serde_json::from_slice(&frame).unwrap());
    }
    frames
}

fn frame_types(frames: &[Value]) -> Vec<String> {
    frames
        .iter()
        .map(|frame| frame["type"].as_str().unwrap().to_owned())
        .collect()
}

fn find<'a>(frames: &'a [Value], kind: ViewKind) -> &'a Value {
    frames
        .iter()
        .find(|frame| frame["type"] == kind.wire_name())
        .unwrap()
}

fn timestamps(frames: &[Value]) -> Vec<DateTime<Utc>> {
    frames
        .iter()
        .map(|frame| frame["timestamp"].as_str().unwrap().parse().unwrap())
        .collect()
}

fn resources_for<'a>(frame: &'a Value, unit: &str) -> &'a Value {
    frame["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|record| record["droneId"] == unit)
        .unwrap()
}

/// Task source whose assignment lookups always fail.
struct BrokenAssignments(Arc<TaskBoard>);

impl TaskSource for BrokenAssignments {
    fn list_tasks(&self) -> Result<Vec<Task>, SourceError> {
        self.0.list_tasks()
    }

    fn list_assignments(&self, _task: TaskId) -> Result<Vec<String>, SourceError> {
        Err(SourceError::Unavailable {
            source_name: "assignments",
            message: String::from("backend offline"),
        })
    }
}

/// A sink that never completes a send.
struct StalledSink;

impl MessageSink for StalledSink {
    fn send_text(&self, _frame: Bytes) -> BoxFuture<'_, Result<(), SendError>> {
        Box::pin(std::future::pending())
    }
}

/// A sink that deregisters another subscriber the first time it is used.
struct EvictingSink {
    registry: Arc<SubscriberRegistry>,
    victim: OnceLock<SubscriberId>,
}

impl MessageSink for EvictingSink {
    fn send_text(&self, _frame: Bytes) -> BoxFuture<'_, Result<(), SendError>> {
        Box::pin(async move {
            if let Some(victim) = self.victim.get() {
                let _ = self.registry.remove(*victim).await;
            }
            Ok(())
        })
    }
}

#[tokio::test]
async fn every_subscriber_receives_every_view_in_order() {
    let coordinator = coordinator_over(demo_fleet(), demo_board().await);
    let mut receivers = Vec::new();
    for _ in 0..3 {
        receivers.push(subscribe(&coordinator).await.1);
    }

    let report = coordinator.run_round().await.unwrap();
    assert_eq!(report.views_sent, 5);
    assert_eq!(report.views_failed, 0);
    assert_eq!(report.delivered, 15);

    let expected: Vec<String> = ViewKind::ALL
        .iter()
        .map(|kind| kind.wire_name().to_owned())
        .collect();
    for rx in &mut receivers {
        let frames = drain(rx);
        assert_eq!(frame_types(&frames), expected);

        let stamps = timestamps(&frames);
        assert!(stamps.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}

#[tokio::test]
async fn failed_view_does_not_block_the_others() {
    let board = demo_board().await;
    let coordinator = coordinator_over(demo_fleet(), Arc::new(BrokenAssignments(board)));
    let (_, mut rx) = subscribe(&coordinator).await;

    let report = coordinator.run_round().await.unwrap();
    assert_eq!(report.views_failed, 1);
    assert_eq!(report.views_sent, 4);

    let frames = drain(&mut rx);
    assert_eq!(
        frame_types(&frames),
        vec!["resources", "statistics", "metrics", "tasksData"]
    );
}

#[tokio::test]
async fn closed_subscriber_is_dropped_alone() {
    let coordinator = coordinator_over(demo_fleet(), demo_board().await);
    let (_, mut healthy) = subscribe(&coordinator).await;
    let (closed_id, closed_rx) = subscribe(&coordinator).await;
    drop(closed_rx);

    let report = coordinator.run_round().await.unwrap();
    assert_eq!(report.dropped, 1);
    assert_eq!(report.delivered, 5);
    assert!(!coordinator.registry().contains(closed_id).await);
    assert_eq!(coordinator.registry().len().await, 1);
    assert_eq!(drain(&mut healthy).len(), 5);
}

#[tokio::test(start_paused = true)]
async fn stalled_subscriber_times_out_and_is_dropped() {
    let coordinator = coordinator_over(demo_fleet(), demo_board().await);
    let (_, mut healthy) = subscribe(&coordinator).await;
    let stalled = coordinator.registry().add(Arc::new(StalledSink)).await;

    let report = coordinator.run_round().await.unwrap();
    assert_eq!(report.dropped, 1);
    assert!(!coordinator.registry().contains(stalled).await);
    assert_eq!(drain(&mut healthy).len(), 5);
}

#[tokio::test]
async fn removal_during_a_round_is_harmless() {
    let coordinator = coordinator_over(demo_fleet(), demo_board().await);
    let evicting = Arc::new(EvictingSink {
        registry: Arc::clone(coordinator.registry()),
        victim: OnceLock::new(),
    });
    let _ = coordinator.registry().add(evicting.clone()).await;
    let (victim, mut victim_rx) = subscribe(&coordinator).await;
    assert!(evicting.victim.set(victim).is_ok());

    let report = coordinator.run_round().await.unwrap();
    assert_eq!(report.dropped, 0);
    assert_eq!(report.views_sent, 5);

    // The victim may or may not see the first view, but never more.
    assert!(drain(&mut victim_rx).len() <= 1);
    assert_eq!(coordinator.registry().len().await, 1);
}

#[tokio::test]
async fn next_round_skips_removed_subscriber_and_keeps_time_order() {
    let coordinator = coordinator_over(demo_fleet(), demo_board().await);
    let evicting = Arc::new(EvictingSink {
        registry: Arc::clone(coordinator.registry()),
        victim: OnceLock::new(),
    });
    let _ = coordinator.registry().add(evicting.clone()).await;
    let (_, mut healthy) = subscribe(&coordinator).await;
    let (victim, mut victim_rx) = subscribe(&coordinator).await;
    assert!(evicting.victim.set(victim).is_ok());

    let first = coordinator.run_round().await.unwrap();
    assert!(first.delivered >= 10);

    let second = coordinator.run_round().await.unwrap();
    assert_eq!(second.round, first.round + 1);
    assert_eq!(second.delivered, 10);
    assert_eq!(second.dropped, 0);
    assert!(drain(&mut victim_rx).len() <= 1);

    let frames = drain(&mut healthy);
    assert_eq!(frames.len(), 10);
    let stamps = timestamps(&frames);
    assert!(stamps.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[tokio::test]
async fn statistics_account_for_every_task() {
    let coordinator = coordinator_over(demo_fleet(), demo_board().await);
    let (_, mut rx) = subscribe(&coordinator).await;
    coordinator.run_round().await.unwrap();

    let frames = drain(&mut rx);
    let stats = &find(&frames, ViewKind::Statistics)["data"];
    let total: u64 = ["notStarted", "inProgress", "completed", "failed"]
        .iter()
        .map(|key| stats[*key].as_u64().unwrap())
        .sum();
    assert_eq!(total, 6);
    assert_eq!(stats["inProgress"], 2);
    assert_eq!(stats["failed"], 2);

    let tasks = find(&frames, ViewKind::Tasks)["data"].as_array().unwrap();
    assert_eq!(tasks.len(), 6);
    assert_eq!(tasks[5]["Tstatus"], "unknown");
}

#[tokio::test]
async fn progress_rises_monotonically_per_assignment() {
    let board = demo_board().await;
    let coordinator = coordinator_over(demo_fleet(), board.clone());
    let (_, mut rx) = subscribe(&coordinator).await;

    let mut last = -1.0;
    for remaining in [10, 7, 3, 0] {
        board.set_remaining(TaskId(3), remaining).await.unwrap();
        coordinator.run_round().await.unwrap();

        let frames = drain(&mut rx);
        let records = find(&frames, ViewKind::Progress)["data"].as_array().unwrap();
        assert_eq!(records.len(), 2);
        for record in records {
            assert_eq!(record["taskId"], "3");
            let progress = record["progress"].as_f64().unwrap();
            assert!((0.0..=100.0).contains(&progress));
            assert!(progress >= last);
        }
        last = records[0]["progress"].as_f64().unwrap();
    }
    assert_eq!(last, 100.0);
}

#[tokio::test(start_paused = true)]
async fn workload_occupancy_reaches_subscribers() {
    let fleet = demo_fleet();
    let coordinator = coordinator_over(Arc::clone(&fleet), demo_board().await);
    let (_, mut alpha) = subscribe(&coordinator).await;
    let (_, mut bravo) = subscribe(&coordinator).await;

    coordinator.run_round().await.unwrap();
    for rx in [&mut alpha, &mut bravo] {
        let frames = drain(rx);
        let drone = resources_for(find(&frames, ViewKind::Resources), "Drone1");
        assert_eq!(drone["memoryUsage"], 25.0);
        assert_eq!(drone["cpuUsage"], 0.0);
        assert_eq!(drone["z"], -10.0);
    }

    let unit = Arc::clone(fleet.get("Drone1").unwrap());
    let workload = unit
        .start_workload(WorkloadRequest::new(4, 2500.0, Duration::from_secs(2)))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    coordinator.run_round().await.unwrap();
    let (_, mut late) = subscribe(&coordinator).await;
    for rx in [&mut alpha, &mut bravo] {
        let frames = drain(rx);
        let drone = resources_for(find(&frames, ViewKind::Resources), "Drone1");
        assert_eq!(drone["memoryUsage"], 75.0);
        assert!(drone["cpuUsage"].as_f64().unwrap() > 0.0);
        let other = resources_for(find(&frames, ViewKind::Resources), "Drone2");
        assert_eq!(other["memoryUsage"], 25.0);
    }

    let report = workload.await.unwrap();
    assert_eq!(report.memory, 4);

    coordinator.run_round().await.unwrap();
    for rx in [&mut alpha, &mut bravo, &mut late] {
        let frames = drain(rx);
        assert_eq!(frames.len(), 5);
        let drone = resources_for(find(&frames, ViewKind::Resources), "Drone1");
        assert_eq!(drone["memoryUsage"], 25.0);
        assert_eq!(drone["cpuUsage"], 0.0);

        let metrics = &find(&frames, ViewKind::Metrics)["data"];
        assert_eq!(metrics["totalDrones"], 3);
        assert!(metrics["responseTime"].as_f64().unwrap() >= 0.0);
    }
}
