//! Broadcast core for Fleetcast.
//!
//! This crate turns simulator state into frames and pushes them to every
//! connected subscriber on a fixed period:
//!
//! - [`config`] -- YAML configuration with defaults and env overrides.
//! - [`source`] -- [`UnitSource`] and [`TaskSource`], the read-only
//!   collaborator interfaces.
//! - [`snapshot`] -- [`SnapshotGenerator`], which renders the five views.
//! - [`registry`] -- [`SubscriberRegistry`] and the [`MessageSink`] seam
//!   that transports implement.
//! - [`coordinator`] -- [`BroadcastCoordinator`], the periodic fan-out loop.
//!
//! The registry is injected into both the coordinator and the transport
//! layer; there is no global state.

pub mod config;
pub mod coordinator;
pub mod registry;
pub mod snapshot;
pub mod source;

pub use config::{
    BroadcastConfig, ConfigError, FleetcastConfig, ListenerConfig, LoggingConfig,
    SimulationConfig,
};
pub use coordinator::{
    BroadcastCoordinator, BroadcastSettings, CoordinatorPhase, LoopError, RoundReport, encode,
};
pub use registry::{ChannelSink, Member, MessageSink, SendError, SinkHandle, SubscriberRegistry};
pub use snapshot::{RoundContext, SnapshotGenerator, ViewGenerationError, progress_pct};
pub use source::{NoTasks, SourceError, TaskSource, UnitSource};
