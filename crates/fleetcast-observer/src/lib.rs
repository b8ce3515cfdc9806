//! Subscriber-facing server for Fleetcast.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws`, also `/ws/fleet`) where each
//!   connection is registered as a broadcast subscriber and answers the
//!   text `ping` control message
//! - **REST endpoints** for health and on-demand view snapshots
//! - **Minimal HTML status page** (`GET /`)
//!
//! # Architecture
//!
//! The server never produces broadcast frames itself. Each `WebSocket`
//! connection registers a sink in the shared
//! [`SubscriberRegistry`](fleetcast_core::SubscriberRegistry) and the
//! broadcast coordinator pushes frames through it. REST reads go through
//! the same [`SnapshotGenerator`](fleetcast_core::SnapshotGenerator), so
//! they never block the simulator.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

pub use error::ObserverError;
pub use router::build_router;
pub use server::{ServerError, bind, serve};
pub use startup::spawn_observer;
pub use state::{AppState, ConnectionSettings};
