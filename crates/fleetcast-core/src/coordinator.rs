//! The broadcast loop.
//!
//! On every tick the coordinator renders each view once, serializes it
//! once, and fans the frame out to a point-in-time copy of the registry.
//! Sends run concurrently and each is bounded by its own timeout; a
//! subscriber whose send fails is removed and skipped for the rest of the
//! round. A view that cannot be generated is skipped without affecting the
//! others.
//!
//! Each round runs on its own Tokio task so that a panic inside a round
//! becomes a [`LoopError`] instead of taking the loop down with it.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use fleetcast_types::{SubscriberId, View, ViewEnvelope, ViewKind};
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::BroadcastConfig;
use crate::registry::{Member, SendError, SubscriberRegistry};
use crate::snapshot::{RoundContext, SnapshotGenerator};

/// Timing parameters for the broadcast loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastSettings {
    /// Interval between rounds.
    pub period: Duration,
    /// Upper bound on a single send.
    pub send_timeout: Duration,
    /// Pause after a failed round.
    pub error_cooldown: Duration,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self::from(&BroadcastConfig::default())
    }
}

impl From<&BroadcastConfig> for BroadcastSettings {
    fn from(config: &BroadcastConfig) -> Self {
        Self {
            period: Duration::from_millis(config.period_ms),
            send_timeout: Duration::from_millis(config.send_timeout_ms),
            error_cooldown: Duration::from_millis(config.error_cooldown_ms),
        }
    }
}

/// What the coordinator is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoordinatorPhase {
    /// Waiting for the next tick.
    Idle = 0,
    /// A round is in progress.
    Broadcasting = 1,
}

impl CoordinatorPhase {
    const fn from_u8(value: u8) -> Self {
        if value == Self::Broadcasting as u8 {
            Self::Broadcasting
        } else {
            Self::Idle
        }
    }
}

/// Outcome of one broadcast round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoundReport {
    /// Round number, starting at 1.
    pub round: u64,
    /// Views generated and fanned out.
    pub views_sent: usize,
    /// Views skipped because generation or encoding failed.
    pub views_failed: usize,
    /// Successful per-subscriber sends.
    pub delivered: usize,
    /// Subscribers removed after a failed send.
    pub dropped: usize,
}

/// Errors surfaced by the broadcast loop.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    /// The round task panicked.
    #[error("broadcast round {round} panicked")]
    RoundPanicked {
        /// The round that failed.
        round: u64,
    },

    /// The round task was cancelled before finishing.
    #[error("broadcast round {round} was cancelled")]
    RoundCancelled {
        /// The round that failed.
        round: u64,
    },

    /// A generated view could not be encoded as a frame.
    #[error("failed to encode {view} frame: {source}")]
    Serialization {
        /// The view being encoded.
        view: ViewKind,
        /// The encoder error.
        #[source]
        source: serde_json::Error,
    },
}

/// Drives periodic broadcasts of every view to every subscriber.
#[derive(Debug, Clone)]
pub struct BroadcastCoordinator {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    generator: SnapshotGenerator,
    registry: Arc<SubscriberRegistry>,
    settings: BroadcastSettings,
    phase: AtomicU8,
    rounds: AtomicU64,
    last_round: Mutex<Option<Instant>>,
}

impl BroadcastCoordinator {
    /// Create a coordinator. Nothing runs until [`Self::run`] or
    /// [`Self::run_round`] is called.
    pub fn new(
        generator: SnapshotGenerator,
        registry: Arc<SubscriberRegistry>,
        settings: BroadcastSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                generator,
                registry,
                settings,
                phase: AtomicU8::new(CoordinatorPhase::Idle as u8),
                rounds: AtomicU64::new(0),
                last_round: Mutex::new(None),
            }),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> CoordinatorPhase {
        CoordinatorPhase::from_u8(self.inner.phase.load(Ordering::Acquire))
    }

    /// Rounds started so far, including rounds that failed.
    pub fn rounds_started(&self) -> u64 {
        self.inner.rounds.load(Ordering::Acquire)
    }

    /// The registry this coordinator broadcasts to.
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.inner.registry
    }

    /// The timing parameters in use.
    pub fn settings(&self) -> BroadcastSettings {
        self.inner.settings
    }

    /// Run a single round on its own task and wait for it.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::RoundPanicked`] if the round panicked and
    /// [`LoopError::RoundCancelled`] if its task was cancelled.
    pub async fn run_round(&self) -> Result<RoundReport, LoopError> {
        let round = self
            .inner
            .rounds
            .fetch_add(1, Ordering::AcqRel)
            .saturating_add(1);
        let inner = Arc::clone(&self.inner);
        match tokio::spawn(async move { inner.broadcast_round(round).await }).await {
            Ok(report) => Ok(report),
            Err(join_error) if join_error.is_panic() => Err(LoopError::RoundPanicked { round }),
            Err(_cancelled) => Err(LoopError::RoundCancelled { round }),
        }
    }

    /// Broadcast on the configured period until `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let settings = self.inner.settings;
        let mut ticker = tokio::time::interval(settings.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            period_ms = duration_ms(settings.period),
            send_timeout_ms = duration_ms(settings.send_timeout),
            "broadcast loop started"
        );

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            match self.run_round().await {
                Ok(report) => debug!(
                    round = report.round,
                    views_sent = report.views_sent,
                    views_failed = report.views_failed,
                    delivered = report.delivered,
                    dropped = report.dropped,
                    "round complete"
                ),
                Err(e) => {
                    error!(
                        error = %e,
                        cooldown_ms = duration_ms(settings.error_cooldown),
                        "broadcast round failed"
                    );
                    tokio::select! {
                        () = &mut shutdown => break,
                        () = tokio::time::sleep(settings.error_cooldown) => {}
                    }
                }
            }
        }

        info!(rounds = self.rounds_started(), "broadcast loop stopped");
    }

    /// Broadcast forever.
    pub async fn run(&self) {
        self.run_until(std::future::pending()).await;
    }
}

impl Inner {
    async fn broadcast_round(&self, round: u64) -> RoundReport {
        let _phase = PhaseGuard::enter(&self.phase);
        let mut report = RoundReport {
            round,
            ..RoundReport::default()
        };

        let ctx = RoundContext {
            since_last_round: self
                .last_round
                .lock()
                .await
                .map_or(Duration::ZERO, |last| last.elapsed()),
        };

        let mut members = self.registry.snapshot_members().await;

        for kind in ViewKind::ALL {
            let view = match self.generator.generate(kind, &ctx) {
                Ok(view) => view,
                Err(e) => {
                    warn!(round, view = %kind, error = %e, "view generation failed; skipping");
                    report.views_failed = report.views_failed.saturating_add(1);
                    continue;
                }
            };
            let frame = match encode(kind, view) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(round, view = %kind, error = %e, "view encoding failed; skipping");
                    report.views_failed = report.views_failed.saturating_add(1);
                    continue;
                }
            };

            self.registry.retain_registered(&mut members).await;
            let failed = self.fan_out(&members, &frame, &mut report).await;
            if !failed.is_empty() {
                members.retain(|member| !failed.contains(&member.id));
            }
            report.views_sent = report.views_sent.saturating_add(1);
        }

        *self.last_round.lock().await = Some(Instant::now());
        report
    }

    async fn fan_out(
        &self,
        members: &[Member],
        frame: &Bytes,
        report: &mut RoundReport,
    ) -> Vec<SubscriberId> {
        let timeout = self.settings.send_timeout;
        let sends = members.iter().map(|member| {
            let frame = frame.clone();
            async move {
                let result = match tokio::time::timeout(timeout, member.sink.send_text(frame)).await
                {
                    Ok(sent) => sent,
                    Err(_elapsed) => Err(SendError::Timeout {
                        timeout_ms: duration_ms(timeout),
                    }),
                };
                (member.id, result)
            }
        });

        let mut failed = Vec::new();
        for (id, result) in join_all(sends).await {
            match result {
                Ok(()) => report.delivered = report.delivered.saturating_add(1),
                Err(e) => {
                    warn!(subscriber = %id, error = %e, "dropping subscriber after failed send");
                    let _ = self.registry.remove(id).await;
                    report.dropped = report.dropped.saturating_add(1);
                    failed.push(id);
                }
            }
        }
        failed
    }
}

/// Wrap a view in its envelope and encode it once for every subscriber.
///
/// The returned buffer is UTF-8 JSON; cloning it does not copy.
///
/// # Errors
///
/// Returns [`LoopError::Serialization`] if the envelope cannot be encoded.
pub fn encode(kind: ViewKind, view: View) -> Result<Bytes, LoopError> {
    ViewEnvelope::now(view)
        .to_frame()
        .map(Bytes::from)
        .map_err(|source| LoopError::Serialization { view: kind, source })
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Marks the coordinator as broadcasting until dropped.
struct PhaseGuard<'a> {
    phase: &'a AtomicU8,
}

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a AtomicU8) -> Self {
        phase.store(CoordinatorPhase::Broadcasting as u8, Ordering::Release);
        Self { phase }
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.phase.store(CoordinatorPhase::Idle as u8, Ordering::Release);
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use fleetcast_sim::{Task, UnitState};
    use fleetcast_types::TaskId;
    use futures::future::BoxFuture;

    use super::*;
    use crate::registry::{ChannelSink, MessageSink};
    use crate::source::{NoTasks, SourceError, TaskSource, UnitSource};

    struct EmptyUnits;

    impl UnitSource for EmptyUnits {
        fn list_units(&self) -> Result<Vec<UnitState>, SourceError> {
            Ok(Vec::new())
        }
    }

    struct PanickingTasks;

    impl TaskSource for PanickingTasks {
        #[allow(clippy::panic)]
        fn list_tasks(&self) -> Result<Vec<Task>, SourceError> {
            panic!("task source exploded");
        }

        fn list_assignments(&self, _task: TaskId) -> Result<Vec<String>, SourceError> {
            Ok(Vec::new())
        }
    }

    /// Records whether the coordinator was mid-round when a send happened.
    struct PhaseProbe {
        coordinator: std::sync::OnceLock<BroadcastCoordinator>,
        saw_broadcasting: AtomicBool,
    }

    impl MessageSink for PhaseProbe {
        fn send_text(&self, _frame: Bytes) -> BoxFuture<'_, Result<(), SendError>> {
            Box::pin(async move {
                if let Some(coordinator) = self.coordinator.get() {
                    if coordinator.phase() == CoordinatorPhase::Broadcasting {
                        self.saw_broadcasting.store(true, Ordering::Release);
                    }
                }
                Ok(())
            })
        }
    }

    fn coordinator(tasks: Arc<dyn TaskSource>) -> BroadcastCoordinator {
        BroadcastCoordinator::new(
            SnapshotGenerator::new(Arc::new(EmptyUnits), tasks),
            Arc::new(SubscriberRegistry::new()),
            BroadcastSettings::default(),
        )
    }

    #[test]
    fn settings_follow_config() {
        let settings = BroadcastSettings::default();
        assert_eq!(settings.period, Duration::from_millis(500));
        assert_eq!(settings.send_timeout, Duration::from_secs(2));
        assert_eq!(settings.error_cooldown, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn round_without_subscribers_sends_every_view() {
        let coordinator = coordinator(Arc::new(NoTasks));
        let report = coordinator.run_round().await.unwrap();
        assert_eq!(report.round, 1);
        assert_eq!(report.views_sent, ViewKind::ALL.len());
        assert_eq!(report.delivered, 0);
        assert_eq!(coordinator.phase(), CoordinatorPhase::Idle);
        assert_eq!(coordinator.rounds_started(), 1);
    }

    #[tokio::test]
    async fn phase_is_broadcasting_during_a_round() {
        let coordinator = coordinator(Arc::new(NoTasks));
        let probe = Arc::new(PhaseProbe {
            coordinator: std::sync::OnceLock::new(),
            saw_broadcasting: AtomicBool::new(false),
        });
        assert!(probe.coordinator.set(coordinator.clone()).is_ok());
        coordinator.registry().add(probe.clone()).await;

        coordinator.run_round().await.unwrap();
        assert!(probe.saw_broadcasting.load(Ordering::Acquire));
        assert_eq!(coordinator.phase(), CoordinatorPhase::Idle);
    }

    #[tokio::test]
    async fn panicking_round_is_contained() {
        let coordinator = coordinator(Arc::new(PanickingTasks));
        let result = coordinator.run_round().await;
        assert!(matches!(result, Err(LoopError::RoundPanicked { round: 1 })));
        assert_eq!(coordinator.phase(), CoordinatorPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn run_until_stops_on_shutdown() {
        let coordinator = coordinator(Arc::new(NoTasks));
        let (sink, mut rx) = ChannelSink::new(64);
        coordinator.registry().add(Arc::new(sink)).await;

        coordinator
            .run_until(tokio::time::sleep(Duration::from_millis(1_200)))
            .await;

        // Ticks at 0, 500 and 1000 ms.
        assert_eq!(coordinator.rounds_started(), 3);
        let mut frames = 0;
        while rx.try_recv().is_ok() {
            frames += 1;
        }
        assert_eq!(frames, 3 * ViewKind::ALL.len());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_round_cools_down_before_resuming() {
        let coordinator = coordinator(Arc::new(PanickingTasks));
        coordinator
            .run_until(tokio::time::sleep(Duration::from_millis(2_100)))
            .await;
        // Round at 0 fails, cooldown to 1000, round fails, cooldown to 2000,
        // round fails, shutdown during cooldown.
        assert_eq!(coordinator.rounds_started(), 3);
    }

    #[test]
    fn encode_wraps_view_in_envelope() {
        let frame = encode(ViewKind::Tasks, View::Tasks(Vec::new())).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(json["type"], "tasksData");
        assert!(json["data"].as_array().unwrap().is_empty());
    }
}
