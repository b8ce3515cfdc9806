//! Fleetcast engine binary.
//!
//! Wires the simulated fleet, the task board, the subscriber server, and
//! the broadcast loop together, then runs until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `fleetcast-config.yaml` (or defaults)
//! 2. Initialize structured logging (tracing)
//! 3. Build the fleet and the task board
//! 4. Start the subscriber server
//! 5. Start the mission driver (if enabled)
//! 6. Run the broadcast loop until shutdown

mod error;
mod mission;

use std::path::Path;
use std::sync::Arc;

use fleetcast_core::{
    BroadcastCoordinator, BroadcastSettings, FleetcastConfig, LoggingConfig, SnapshotGenerator,
    SubscriberRegistry, TaskSource, UnitSource,
};
use fleetcast_observer::{AppState, ConnectionSettings, spawn_observer};
use fleetcast_sim::{Fleet, TaskBoard};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Configuration file looked up in the working directory.
const CONFIG_PATH: &str = "fleetcast-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, fleet construction, or server
/// start-up fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("fleetcast-engine starting");
    if !from_file {
        info!(path = CONFIG_PATH, "Config file not found, using defaults");
    }
    info!(
        host = %config.server.host,
        port = config.server.port,
        period_ms = config.broadcast.period_ms,
        units = config.fleet.len(),
        tasks = config.tasks.len(),
        "Configuration loaded"
    );

    // 3. Build the fleet and the task board.
    let fleet = Arc::new(
        Fleet::from_specs(&config.fleet, config.simulation.sample_period())
            .map_err(EngineError::from)?,
    );
    let board = Arc::new(TaskBoard::from_specs(&config.tasks).map_err(EngineError::from)?);
    let registry = Arc::new(SubscriberRegistry::new());
    let generator = SnapshotGenerator::new(
        Arc::clone(&fleet) as Arc<dyn UnitSource>,
        Arc::clone(&board) as Arc<dyn TaskSource>,
    );

    // 4. Start the subscriber server.
    let broadcast = BroadcastSettings::from(&config.broadcast);
    let app_state = Arc::new(AppState::new(
        Arc::clone(&registry),
        generator.clone(),
        ConnectionSettings::from(&config.server).with_send_timeout(broadcast.send_timeout),
    ));
    let (addr, observer) = spawn_observer(&config.server, app_state)
        .await
        .map_err(EngineError::from)?;
    info!(%addr, "Subscriber server started");

    // 5. Start the mission driver.
    let missions = if config.simulation.missions_enabled {
        info!(
            transit_delay_ms = config.simulation.transit_delay_ms,
            "Mission driver started"
        );
        Some(tokio::spawn(mission::run_all(
            Arc::clone(&fleet),
            Arc::clone(&board),
            config.tasks.clone(),
            config.simulation.transit_delay(),
        )))
    } else {
        None
    };

    // 6. Run the broadcast loop.
    let coordinator = BroadcastCoordinator::new(generator, registry, broadcast);
    coordinator.run_until(shutdown_signal()).await;

    observer.abort();
    if let Some(missions) = missions {
        missions.abort();
    }
    info!(
        rounds = coordinator.rounds_started(),
        "fleetcast-engine shutdown complete"
    );
    Ok(())
}

/// Load configuration from [`CONFIG_PATH`], falling back to defaults.
///
/// Returns whether the file was found. Host and port environment
/// overrides apply in both cases.
fn load_config() -> Result<(FleetcastConfig, bool), EngineError> {
    let path = Path::new(CONFIG_PATH);
    if path.exists() {
        Ok((FleetcastConfig::from_file(path)?, true))
    } else {
        let mut config = FleetcastConfig::default();
        config
            .server
            .apply_overrides(|key| std::env::var(key).ok());
        Ok((config, false))
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolve on `Ctrl-C`.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
