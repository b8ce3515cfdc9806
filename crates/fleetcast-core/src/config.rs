//! Configuration loading and typed config structures for Fleetcast.
//!
//! The canonical configuration lives in `fleetcast-config.yaml` at the
//! project root. Every section and field has a default, so an empty file
//! (or no file at all) yields a runnable three-unit demo fleet.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use fleetcast_sim::{TaskSpec, UnitSpec};
use serde::Deserialize;

/// Environment variable overriding [`ListenerConfig::host`].
pub const HOST_ENV: &str = "FLEETCAST_HOST";

/// Environment variable overriding [`ListenerConfig::port`].
pub const PORT_ENV: &str = "FLEETCAST_PORT";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but a value is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FleetcastConfig {
    /// Subscriber listener settings.
    #[serde(default)]
    pub server: ListenerConfig,

    /// Broadcast loop timing.
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Resource simulation settings.
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Unit placement settings keyed by unit name.
    #[serde(default = "default_fleet")]
    pub fleet: BTreeMap<String, UnitSpec>,

    /// Tasks seeded onto the task board.
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

impl Default for FleetcastConfig {
    fn default() -> Self {
        Self {
            server: ListenerConfig::default(),
            broadcast: BroadcastConfig::default(),
            simulation: SimulationConfig::default(),
            logging: LoggingConfig::default(),
            fleet: default_fleet(),
            tasks: Vec::new(),
        }
    }
}

impl FleetcastConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `FLEETCAST_HOST` and `FLEETCAST_PORT` override the listener address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.server.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes as unit, not as an empty map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast.period_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "broadcast.period_ms must be at least 1".to_owned(),
            });
        }
        if self.broadcast.send_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "broadcast.send_timeout_ms must be at least 1".to_owned(),
            });
        }
        if self.server.keepalive_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                reason: "server.keepalive_interval_secs must be at least 1".to_owned(),
            });
        }
        if self.server.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                reason: "server.idle_timeout_secs must be at least 1".to_owned(),
            });
        }
        if self.simulation.sample_period_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "simulation.sample_period_ms must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

/// Subscriber listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListenerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds between server-initiated keepalive pings.
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,

    /// Seconds without any inbound frame before a subscriber is closed.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Backlog of accepted-but-not-yet-served connections.
    #[serde(default = "default_max_pending_connections")]
    pub max_pending_connections: u32,
}

impl ListenerConfig {
    /// Override host and port from a key lookup (normally the process
    /// environment). Unparseable ports are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup(HOST_ENV) {
            self.host = host;
        }
        if let Some(port) = lookup(PORT_ENV).and_then(|raw| raw.parse().ok()) {
            self.port = port;
        }
    }

    /// Keepalive interval as a [`Duration`].
    pub const fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    /// Idle timeout as a [`Duration`].
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_pending_connections: default_max_pending_connections(),
        }
    }
}

/// Broadcast loop timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BroadcastConfig {
    /// Milliseconds between rounds.
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    /// Upper bound on a single subscriber send.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Pause after a failed round before the loop resumes.
    #[serde(default = "default_error_cooldown_ms")]
    pub error_cooldown_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            error_cooldown_ms: default_error_cooldown_ms(),
        }
    }
}

/// Resource simulation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    /// How often running workloads refresh their CPU occupancy.
    #[serde(default = "default_sample_period_ms")]
    pub sample_period_ms: u64,

    /// Whether the engine drives the configured tasks as missions.
    #[serde(default = "default_true")]
    pub missions_enabled: bool,

    /// Simulated flight time before an assigned unit starts computing.
    #[serde(default = "default_transit_delay_ms")]
    pub transit_delay_ms: u64,
}

impl SimulationConfig {
    /// Sample period as a [`Duration`].
    pub const fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    /// Transit delay as a [`Duration`].
    pub const fn transit_delay(&self) -> Duration {
        Duration::from_millis(self.transit_delay_ms)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sample_period_ms: default_sample_period_ms(),
            missions_enabled: true,
            transit_delay_ms: default_transit_delay_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "localhost".to_owned()
}

const fn default_port() -> u16 {
    8080
}

const fn default_keepalive_interval_secs() -> u64 {
    20
}

const fn default_idle_timeout_secs() -> u64 {
    40
}

const fn default_max_pending_connections() -> u32 {
    1024
}

const fn default_period_ms() -> u64 {
    500
}

const fn default_send_timeout_ms() -> u64 {
    2000
}

const fn default_error_cooldown_ms() -> u64 {
    1000
}

const fn default_sample_period_ms() -> u64 {
    100
}

const fn default_transit_delay_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}

fn default_fleet() -> BTreeMap<String, UnitSpec> {
    [("Drone1", 0.0), ("Drone2", 10.0), ("Drone3", 20.0)]
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
        .collect()
}
