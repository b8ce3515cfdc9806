//! Simulated fleet units and workload execution.
//!
//! A [`Unit`] owns a fixed memory capacity and a clock rate. Its mutable
//! fields (current allocation, CPU occupancy, busy flag) are atomics so
//! the snapshot generator can read them at any time without taking a
//! lock. Readers may observe a unit mid-update; there is no snapshot
//! isolation across fields.
//!
//! # Workload lifecycle
//!
//! 1. **Admission** -- the request is validated, the unit is marked busy,
//!    and the requested memory is checked against free capacity once.
//! 2. **Run** -- a dedicated Tokio task samples an elapsed-time occupancy
//!    function on a fixed period until the requested duration has passed.
//!    The final sample may land slightly after the deadline; that overrun
//!    is not compensated.
//! 3. **Release** -- the allocation is returned and CPU occupancy is reset
//!    to zero. Release runs from a drop guard, so it also happens when the
//!    task is aborted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use fleetcast_types::Position;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::{UnitError, WorkloadError};

/// How often a running workload refreshes its CPU occupancy.
pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_millis(100);

/// Shared handle to a unit.
pub type UnitHandle = Arc<Unit>;

/// Construction parameters for a unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitParams {
    /// Total memory capacity.
    pub total_capacity: u64,
    /// Memory already allocated when the unit is created.
    pub initial_allocation: u64,
    /// CPU clock rate.
    pub clock_rate: f64,
    /// Fixed position of the unit.
    pub position: Position,
}

/// A point-in-time read of a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitState {
    /// Unit name.
    pub name: String,
    /// `allocated / total_capacity * 100`.
    pub memory_occupancy_pct: f64,
    /// CPU occupancy, zero when idle.
    pub cpu_occupancy_pct: f64,
    /// Unit position.
    pub position: Position,
    /// Currently allocated memory.
    pub allocated: u64,
    /// Total memory capacity.
    pub total_capacity: u64,
    /// Whether a workload is running.
    pub busy: bool,
}

/// A request to run simulated work on a unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkloadRequest {
    /// Memory held for the duration of the workload.
    pub memory: u64,
    /// Clock cycles the workload consumes.
    pub cycles: f64,
    /// Wall-clock duration of the workload.
    pub duration: Duration,
}

impl WorkloadRequest {
    /// Create a workload request.
    pub const fn new(memory: u64, cycles: f64, duration: Duration) -> Self {
        Self {
            memory,
            cycles,
            duration,
        }
    }

    fn validate(&self) -> Result<(), WorkloadError> {
        if self.duration.is_zero() {
            return Err(WorkloadError::InvalidRequest {
                reason: "duration must be greater than zero".to_owned(),
            });
        }
        if !self.cycles.is_finite() || self.cycles < 0.0 {
            return Err(WorkloadError::InvalidRequest {
                reason: format!("cycle count must be finite and non-negative, got {}", self.cycles),
            });
        }
        Ok(())
    }
}

/// Outcome of a completed workload.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadReport {
    /// Unit that ran the workload.
    pub unit: String,
    /// Memory that was held and released.
    pub memory: u64,
    /// Measured run time, possibly slightly above the requested duration.
    pub elapsed: Duration,
    /// Highest CPU occupancy sampled during the run.
    pub peak_cpu_occupancy_pct: f64,
}

/// CPU occupancy growth rate in percent per second:
/// `(cycles / clock_rate) * 100 / duration`.
pub fn cpu_load_per_second(cycles: f64, clock_rate: f64, duration: Duration) -> f64 {
    let seconds = duration.as_secs_f64();
    if seconds <= 0.0 || clock_rate <= 0.0 {
        return 0.0;
    }
    cycles / clock_rate * 100.0 / seconds
}

/// CPU occupancy after `elapsed` of a workload growing at `load_per_second`.
pub fn cpu_occupancy_at(load_per_second: f64, elapsed: Duration) -> f64 {
    load_per_second * elapsed.as_secs_f64()
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

/// A simulated fleet member.
#[derive(Debug)]
pub struct Unit {
    name: String,
    position: Position,
    total_capacity: u64,
    clock_rate: f64,
    sample_period: Duration,
    allocated: AtomicU64,
    cpu_occupancy_bits: AtomicU64,
    busy: AtomicBool,
}

impl Unit {
    /// Create a unit, validating its parameters.
    ///
    /// # Errors
    ///
    /// Returns a [`UnitError`] if the capacity is zero, the initial
    /// allocation exceeds it, or the clock rate is not finite and positive.
    pub fn new(name: impl Into<String>, params: UnitParams) -> Result<Self, UnitError> {
        let name = name.into();
        if params.total_capacity == 0 {
            return Err(UnitError::ZeroCapacity { unit: name });
        }
        if params.initial_allocation > params.total_capacity {
            return Err(UnitError::AllocationExceedsCapacity {
                unit: name,
                allocation: params.initial_allocation,
                capacity: params.total_capacity,
            });
        }
        if !params.clock_rate.is_finite() || params.clock_rate <= 0.0 {
            return Err(UnitError::InvalidClockRate {
                unit: name,
                clock_rate: params.clock_rate,
            });
        }

        Ok(Self {
            name,
            position: params.position,
            total_capacity: params.total_capacity,
            clock_rate: params.clock_rate,
            sample_period: DEFAULT_SAMPLE_PERIOD,
            allocated: AtomicU64::new(params.initial_allocation),
            cpu_occupancy_bits: AtomicU64::new(0.0_f64.to_bits()),
            busy: AtomicBool::new(false),
        })
    }

    /// Override the occupancy sampling period (minimum 1 ms).
    #[must_use]
    pub fn with_sample_period(mut self, period: Duration) -> Self {
        self.sample_period = period.max(Duration::from_millis(1));
        self
    }

    /// Unit name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unit position.
    pub const fn position(&self) -> Position {
        self.position
    }

    /// Total memory capacity.
    pub const fn total_capacity(&self) -> u64 {
        self.total_capacity
    }

    /// CPU clock rate.
    pub const fn clock_rate(&self) -> f64 {
        self.clock_rate
    }

    /// Currently allocated memory.
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Acquire)
    }

    /// Whether a workload is currently running.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Memory occupancy in percent.
    pub fn memory_occupancy_pct(&self) -> f64 {
        percent(self.allocated(), self.total_capacity)
    }

    /// CPU occupancy in percent; zero when idle.
    pub fn cpu_occupancy_pct(&self) -> f64 {
        f64::from_bits(self.cpu_occupancy_bits.load(Ordering::Acquire))
    }

    /// Read the unit's current fields.
    pub fn read_state(&self) -> UnitState {
        let allocated = self.allocated();
        UnitState {
            name: self.name.clone(),
            memory_occupancy_pct: percent(allocated, self.total_capacity),
            cpu_occupancy_pct: self.cpu_occupancy_pct(),
            position: self.position,
            allocated,
            total_capacity: self.total_capacity,
            busy: self.is_busy(),
        }
    }

    /// Admit a workload and run it on its own Tokio task.
    ///
    /// Admission happens synchronously: on success the memory is already
    /// allocated when this returns and the caller is not blocked for the
    /// workload's duration.
    ///
    /// # Errors
    ///
    /// Returns [`WorkloadError::InvalidRequest`] for malformed requests,
    /// [`WorkloadError::UnitBusy`] if a workload is already running, and
    /// [`WorkloadError::InsufficientCapacity`] if the memory does not fit.
    /// In every case the unit is left unchanged.
    pub fn start_workload(
        self: &Arc<Self>,
        request: WorkloadRequest,
    ) -> Result<JoinHandle<WorkloadReport>, WorkloadError> {
        let reservation = self.admit(&request)?;
        let unit = Arc::clone(self);
        Ok(tokio::spawn(async move {
            unit.execute(reservation, request).await
        }))
    }

    /// Admit a workload and wait for it to finish.
    ///
    /// # Errors
    ///
    /// Same admission errors as [`Unit::start_workload`], plus
    /// [`WorkloadError::Aborted`] if the workload task does not complete.
    pub async fn run_workload(
        self: &Arc<Self>,
        request: WorkloadRequest,
    ) -> Result<WorkloadReport, WorkloadError> {
        let handle = self.start_workload(request)?;
        handle.await.map_err(|e| {
            debug!(unit = %self.name, error = %e, "Workload task did not complete");
            WorkloadError::Aborted {
                unit: self.name.clone(),
            }
        })
    }

    fn admit(self: &Arc<Self>, request: &WorkloadRequest) -> Result<Reservation, WorkloadError> {
        request.validate()?;

        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(WorkloadError::UnitBusy {
                unit: self.name.clone(),
            });
        }

        let available = self.total_capacity.saturating_sub(self.allocated());
        if request.memory > available {
            self.busy.store(false, Ordering::Release);
            return Err(WorkloadError::InsufficientCapacity {
                unit: self.name.clone(),
                requested: request.memory,
                available,
            });
        }

        // The busy flag makes this the only writer of `allocated`.
        let _ = self
            .allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(request.memory))
            });

        Ok(Reservation {
            unit: Arc::clone(self),
            memory: request.memory,
        })
    }

    async fn execute(&self, reservation: Reservation, request: WorkloadRequest) -> WorkloadReport {
        let load = cpu_load_per_second(request.cycles, self.clock_rate, request.duration);
        info!(
            unit = %self.name,
            memory = request.memory,
            memory_pct = self.memory_occupancy_pct(),
            duration_ms = request.duration.as_millis(),
            "Workload started"
        );

        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.sample_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut peak = 0.0_f64;

        loop {
            ticker.tick().await;
            let elapsed = started.elapsed();
            if elapsed >= request.duration {
                break;
            }
            let occupancy = cpu_occupancy_at(load, elapsed);
            self.store_cpu_occupancy(occupancy);
            peak = peak.max(occupancy);
        }

        let elapsed = started.elapsed();
        drop(reservation);

        info!(
            unit = %self.name,
            memory_pct = self.memory_occupancy_pct(),
            elapsed_ms = elapsed.as_millis(),
            "Workload completed"
        );

        WorkloadReport {
            unit: self.name.clone(),
            memory: request.memory,
            elapsed,
            peak_cpu_occupancy_pct: peak,
        }
    }

    fn store_cpu_occupancy(&self, value: f64) {
        self.cpu_occupancy_bits
            .store(value.to_bits(), Ordering::Release);
    }
}

/// Memory held by an admitted workload. Dropping it releases the memory,
/// zeroes CPU occupancy, and clears the busy flag, in that order.
#[derive(Debug)]
struct Reservation {
    unit: Arc<Unit>,
    memory: u64,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let memory = self.memory;
        let _ = self
            .unit
            .allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(memory))
            });
        self.unit.store_cpu_occupancy(0.0);
        self.unit.busy.store(false, Ordering::Release);
    }
}
