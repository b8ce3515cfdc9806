//! Error types for the engine binary.

use fleetcast_sim::{TaskBoardError, UnitError};

/// Top-level error for the engine binary.
///
/// Each variant wraps a start-up failure so `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: fleetcast_core::ConfigError,
    },

    /// A unit in the fleet settings is invalid.
    #[error("fleet error: {source}")]
    Fleet {
        /// The underlying unit error.
        #[from]
        source: UnitError,
    },

    /// The configured task list is invalid.
    #[error("task board error: {source}")]
    Tasks {
        /// The underlying board error.
        #[from]
        source: TaskBoardError,
    },

    /// The subscriber server failed to start.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: fleetcast_observer::ServerError,
    },
}

/// Errors that abort a mission before it reaches a final status.
#[derive(Debug, thiserror::Error)]
pub enum MissionError {
    /// The task board rejected an update.
    #[error("task board update failed: {source}")]
    Board {
        /// The underlying board error.
        #[from]
        source: TaskBoardError,
    },
}
