//! Simulation and server configuration.
//!
//! [`SimulationConfig`] describes one simulation run and is validated before
//! a [`Simulation`](crate::simulation::Simulation) is built from it.
//! [`ServerConfig`] is loaded by the host binary from environment variables.
//!
//! # Environment Variables
//!
//! - `RAFTSIM_LISTEN_PORT`: Port for the control plane (default: `3000`)
//! - `RAFTSIM_NODE_COUNT`: Number of nodes (default: `5`)
//! - `RAFTSIM_SEED`: Random seed (default: `42`)
//! - `RAFTSIM_DROP_RATE`: Message drop probability (default: `0.05`)
//! - `RAFTSIM_TIME_SCALE`: Simulated seconds per wall-clock second (default: `1.0`)

use serde::{Deserialize, Serialize};

use crate::raft::RaftTiming;
use crate::transport::TransportConfig;

/// Error returned when loading or validating configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable is missing.
    MissingEnvVar(String),
    /// A setting has an invalid value.
    InvalidValue { name: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(name: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingEnvVar(name) => {
                write!(f, "missing required environment variable: {name}")
            }
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parameters of one simulation run.
///
/// Fields are public so the control plane can deserialize a partial JSON
/// body over the defaults; [`SimulationConfig::validate`] must pass before
/// the config is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub node_count: usize,
    pub message_drop_rate: f64,
    pub message_duplicate_rate: f64,
    pub min_latency: f64,
    pub max_latency: f64,
    pub election_timeout_min: f64,
    pub election_timeout_max: f64,
    pub heartbeat_interval: f64,
    pub random_seed: u64,
    /// Minimum simulated time between node ticks.
    pub tick_interval: f64,
    /// Capacity of the recent-message and recent-event records.
    pub record_capacity: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SEED)
    }
}

impl SimulationConfig {
    pub const DEFAULT_SEED: u64 = 42;
    pub const DEFAULT_NODE_COUNT: usize = 5;
    pub const DEFAULT_DROP_RATE: f64 = 0.05;

    /// Defaults with the given seed.
    #[must_use]
    pub fn new(random_seed: u64) -> Self {
        let transport = TransportConfig::default();
        let timing = RaftTiming::default();
        Self {
            node_count: Self::DEFAULT_NODE_COUNT,
            message_drop_rate: Self::DEFAULT_DROP_RATE,
            message_duplicate_rate: transport.duplicate_rate,
            min_latency: transport.min_latency,
            max_latency: transport.max_latency,
            election_timeout_min: timing.election_timeout_min,
            election_timeout_max: timing.election_timeout_max,
            heartbeat_interval: timing.heartbeat_interval,
            random_seed,
            tick_interval: crate::engine::DEFAULT_TICK_INTERVAL,
            record_capacity: crate::engine::DEFAULT_RECORD_CAPACITY,
        }
    }

    #[must_use]
    pub const fn with_node_count(mut self, node_count: usize) -> Self {
        self.node_count = node_count;
        self
    }

    #[must_use]
    pub const fn with_drop_rate(mut self, rate: f64) -> Self {
        self.message_drop_rate = rate;
        self
    }

    #[must_use]
    pub const fn with_duplicate_rate(mut self, rate: f64) -> Self {
        self.message_duplicate_rate = rate;
        self
    }

    #[must_use]
    pub const fn with_latency(mut self, min: f64, max: f64) -> Self {
        self.min_latency = min;
        self.max_latency = max;
        self
    }

    #[must_use]
    pub const fn with_election_timeout(mut self, min: f64, max: f64) -> Self {
        self.election_timeout_min = min;
        self.election_timeout_max = max;
        self
    }

    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: f64) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_tick_interval(mut self, interval: f64) -> Self {
        self.tick_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_record_capacity(mut self, capacity: usize) -> Self {
        self.record_capacity = capacity;
        self
    }

    /// Check every setting.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first setting that is
    /// out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_count == 0 {
            return Err(ConfigError::invalid("node_count", "must be at least 1"));
        }
        for (name, rate) in [
            ("message_drop_rate", self.message_drop_rate),
            ("message_duplicate_rate", self.message_duplicate_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::invalid(name, format!("{rate} is not in [0, 1]")));
            }
        }
        if !(self.min_latency >= 0.0 && self.min_latency <= self.max_latency)
            || !self.max_latency.is_finite()
        {
            return Err(ConfigError::invalid(
                "latency",
                format!(
                    "need 0 <= min_latency <= max_latency, got {}..{}",
                    self.min_latency, self.max_latency
                ),
            ));
        }
        if !(self.election_timeout_min > 0.0
            && self.election_timeout_min <= self.election_timeout_max)
            || !self.election_timeout_max.is_finite()
        {
            return Err(ConfigError::invalid(
                "election_timeout",
                format!(
                    "need 0 < min <= max, got {}..{}",
                    self.election_timeout_min, self.election_timeout_max
                ),
            ));
        }
        if !(self.heartbeat_interval > 0.0 && self.heartbeat_interval < 10.0) {
            return Err(ConfigError::invalid(
                "heartbeat_interval",
                format!("{} is not in (0, 10)", self.heartbeat_interval),
            ));
        }
        if self.heartbeat_interval >= self.election_timeout_min {
            return Err(ConfigError::invalid(
                "heartbeat_interval",
                "must be shorter than the minimum election timeout",
            ));
        }
        if !(self.tick_interval >= 0.0 && self.tick_interval.is_finite()) {
            return Err(ConfigError::invalid(
                "tick_interval",
                format!("{} is not a non-negative duration", self.tick_interval),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn transport(&self) -> TransportConfig {
        TransportConfig {
            drop_rate: self.message_drop_rate,
            duplicate_rate: self.message_duplicate_rate,
            min_latency: self.min_latency,
            max_latency: self.max_latency,
        }
    }

    #[must_use]
    pub const fn timing(&self) -> RaftTiming {
        RaftTiming {
            election_timeout_min: self.election_timeout_min,
            election_timeout_max: self.election_timeout_max,
            heartbeat_interval: self.heartbeat_interval,
        }
    }
}

/// Host process configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on for control-plane requests.
    pub listen_port: u16,
    /// Configuration used when a run is started without a body.
    pub simulation: SimulationConfig,
    /// Simulated seconds advanced per wall-clock second.
    pub time_scale: f64,
}

impl ServerConfig {
    /// Default port for the server.
    pub const DEFAULT_PORT: u16 = 3000;
    pub const DEFAULT_TIME_SCALE: f64 = 1.0;

    /// Load configuration from environment variables.
    ///
    /// Every variable is optional.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed, or if the
    /// resulting simulation config does not validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut simulation = SimulationConfig::default();
        if let Some(count) = parse_var(&lookup, "RAFTSIM_NODE_COUNT")? {
            simulation.node_count = count;
        }
        if let Some(seed) = parse_var(&lookup, "RAFTSIM_SEED")? {
            simulation.random_seed = seed;
        }
        if let Some(rate) = parse_var(&lookup, "RAFTSIM_DROP_RATE")? {
            simulation.message_drop_rate = rate;
        }
        simulation.validate()?;

        let listen_port = parse_var(&lookup, "RAFTSIM_LISTEN_PORT")?.unwrap_or(Self::DEFAULT_PORT);
        let time_scale: f64 =
            parse_var(&lookup, "RAFTSIM_TIME_SCALE")?.unwrap_or(Self::DEFAULT_TIME_SCALE);
        if !(time_scale > 0.0 && time_scale.is_finite()) {
            return Err(ConfigError::invalid(
                "RAFTSIM_TIME_SCALE",
                format!("{time_scale} is not a positive number"),
            ));
        }

        Ok(Self {
            listen_port,
            simulation,
            time_scale,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|_| ConfigError::invalid(name, format!("'{value}' cannot be parsed")))
        })
        .transpose()
}
