//! The fleet: every simulated unit, created once at start-up.
//!
//! Units are built either one at a time through [`Fleet::create_unit`] or
//! in bulk from the placement settings ([`UnitSpec`]) keyed by unit name.
//! After construction the fleet is shared read-only; units mutate
//! themselves through their own workloads.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use fleetcast_types::Position;
use serde::Deserialize;
use tracing::info;

use crate::error::UnitError;
use crate::unit::{DEFAULT_SAMPLE_PERIOD, Unit, UnitHandle, UnitParams, UnitState};

/// Placement settings for one unit, in the simulator's settings format.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct UnitSpec {
    /// East offset.
    #[serde(rename = "X", default)]
    pub x: f64,
    /// North offset.
    #[serde(rename = "Y", default)]
    pub y: f64,
    /// CPU clock rate.
    #[serde(rename = "CPU_FREQUENCY")]
    pub cpu_frequency: f64,
    /// Memory already in use at start-up.
    #[serde(rename = "MEMORY_USAGE", default)]
    pub memory_usage: u64,
    /// Total memory capacity.
    #[serde(rename = "TOTAL_MEMORY", default = "default_total_memory")]
    pub total_memory: u64,
}

const fn default_total_memory() -> u64 {
    8
}

impl From<UnitSpec> for UnitParams {
    fn from(spec: UnitSpec) -> Self {
        Self {
            total_capacity: spec.total_memory,
            initial_allocation: spec.memory_usage,
            clock_rate: spec.cpu_frequency,
            position: Position::at_cruise(spec.x, spec.y),
        }
    }
}

/// Ordered collection of units.
#[derive(Debug)]
pub struct Fleet {
    units: Vec<UnitHandle>,
    sample_period: Duration,
}

impl Default for Fleet {
    fn default() -> Self {
        Self::new()
    }
}

impl Fleet {
    /// Create an empty fleet.
    pub const fn new() -> Self {
        Self {
            units: Vec::new(),
            sample_period: DEFAULT_SAMPLE_PERIOD,
        }
    }

    /// Set the occupancy sampling period for units created afterwards.
    #[must_use]
    pub const fn with_sample_period(mut self, period: Duration) -> Self {
        self.sample_period = period;
        self
    }

    /// Build a fleet from placement settings keyed by unit name.
    ///
    /// # Errors
    ///
    /// Returns the first [`UnitError`] raised by an invalid entry.
    pub fn from_specs(
        specs: &BTreeMap<String, UnitSpec>,
        sample_period: Duration,
    ) -> Result<Self, UnitError> {
        let mut fleet = Self::new().with_sample_period(sample_period);
        for (name, spec) in specs {
            let _ = fleet.create_unit(name.clone(), UnitParams::from(*spec))?;
        }
        info!(units = fleet.len(), "Fleet created");
        Ok(fleet)
    }

    /// Create a unit and add it to the fleet.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError::DuplicateName`] if the name is taken, or the
    /// validation error from [`Unit::new`].
    pub fn create_unit(
        &mut self,
        name: impl Into<String>,
        params: UnitParams,
    ) -> Result<UnitHandle, UnitError> {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(UnitError::DuplicateName { unit: name });
        }
        let unit = Arc::new(Unit::new(name, params)?.with_sample_period(self.sample_period));
        self.units.push(Arc::clone(&unit));
        Ok(unit)
    }

    /// Look up a unit by name.
    pub fn get(&self, name: &str) -> Option<&UnitHandle> {
        self.units.iter().find(|unit| unit.name() == name)
    }

    /// All units in creation order.
    pub fn units(&self) -> &[UnitHandle] {
        &self.units
    }

    /// Read every unit's current state.
    pub fn read_states(&self) -> Vec<UnitState> {
        self.units.iter().map(|unit| unit.read_state()).collect()
    }

    /// Number of units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the fleet has no units.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
