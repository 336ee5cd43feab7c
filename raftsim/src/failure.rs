//! Failure injection.
//!
//! Targeted injection (`inject_*`) schedules crash, recovery, and partition
//! events on the engine at the current virtual time. The probabilistic
//! primitives (`should_crash_node`, `should_partition_network`,
//! `message_delay`) are advisory draws for callers that want ambient chaos;
//! the engine never consults them on its own.
//!
//! All randomness comes from the engine's seeded source, so injected chaos
//! is reproducible like everything else.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::engine::{Engine, EventKind, SimulationError};
use crate::node::Node;
use crate::types::NodeId;

/// Probabilities for the advisory primitives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureConfig {
    pub node_crash_probability: f64,
    pub network_partition_probability: f64,
    pub message_duplicate_probability: f64,
    /// Upper bound of [`FailureInjector::message_delay`], in seconds.
    pub max_delay: f64,
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            node_crash_probability: 0.001,
            network_partition_probability: 0.002,
            message_duplicate_probability: 0.005,
            max_delay: 1.0,
        }
    }
}

impl FailureConfig {
    /// Check every setting.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first setting that is
    /// out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, probability) in [
            ("node_crash_probability", self.node_crash_probability),
            ("network_partition_probability", self.network_partition_probability),
            ("message_duplicate_probability", self.message_duplicate_probability),
        ] {
            if !(0.0..=1.0).contains(&probability) {
                return Err(ConfigError::invalid(
                    name,
                    format!("{probability} is not in [0, 1]"),
                ));
            }
        }
        if !(self.max_delay >= 0.0 && self.max_delay.is_finite()) {
            return Err(ConfigError::invalid(
                "max_delay",
                format!("{} is not a finite non-negative duration", self.max_delay),
            ));
        }
        Ok(())
    }
}

/// Failure kinds accepted by the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Crash,
    Recover,
    Partition,
    Heal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Crash => "crash",
            Self::Recover => "recover",
            Self::Partition => "partition",
            Self::Heal => "heal",
        };
        f.write_str(name)
    }
}

/// Error returned when parsing an unsupported failure kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFailureKind(pub String);

impl fmt::Display for UnknownFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported failure kind: {}", self.0)
    }
}

impl std::error::Error for UnknownFailureKind {}

impl FromStr for FailureKind {
    type Err = UnknownFailureKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crash" | "node_crash" => Ok(Self::Crash),
            "recover" | "node_recover" => Ok(Self::Recover),
            "partition" | "network_partition" => Ok(Self::Partition),
            "heal" | "partition_heal" => Ok(Self::Heal),
            _ => Err(UnknownFailureKind(s.to_string())),
        }
    }
}

/// An injected failure that has not ended yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActiveFailure {
    NodeCrash {
        node: NodeId,
        since: f64,
        recover_at: Option<f64>,
    },
    Partition {
        groups: Vec<Vec<NodeId>>,
        since: f64,
        heal_at: Option<f64>,
    },
}

impl ActiveFailure {
    fn ends_at(&self) -> Option<f64> {
        match self {
            Self::NodeCrash { recover_at, .. } => *recover_at,
            Self::Partition { heal_at, .. } => *heal_at,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FailureInjector {
    config: FailureConfig,
    active: Vec<ActiveFailure>,
}

impl FailureInjector {
    /// # Errors
    ///
    /// Returns `ConfigError` if `config` does not validate.
    pub fn new(config: FailureConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        tracing::info!("failure injector initialised with {config:?}");
        Ok(Self {
            config,
            active: Vec::new(),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &FailureConfig {
        &self.config
    }

    /// Crash `node` now and, if `recovery_time` is given, bring it back
    /// that many seconds later.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError::UnknownNode` if `node` is not registered and
    /// `SimulationError::InvalidEvent` if `recovery_time` is negative or not
    /// finite. Nothing is scheduled in either case.
    pub fn inject_node_crash<N: Node>(
        &mut self,
        engine: &mut Engine<N>,
        node: &NodeId,
        recovery_time: Option<f64>,
    ) -> Result<(), SimulationError> {
        Self::require_node(engine, node)?;
        let now = engine.now();
        let recover_at = recovery_time.map(|delay| now + delay);
        if let Some(at) = recover_at.filter(|at| !at.is_finite() || *at < now) {
            engine.note_validation_error();
            return Err(SimulationError::InvalidEvent { timestamp: at });
        }

        engine.schedule_event(now, EventKind::NodeCrash { node: node.clone() })?;
        if let Some(at) = recover_at {
            engine.schedule_event(at, EventKind::NodeRecover { node: node.clone() })?;
        }
        match recover_at {
            Some(at) => tracing::info!("scheduled crash of {node} with recovery at {at:.3}"),
            None => tracing::info!("scheduled crash of {node}"),
        }

        self.active
            .retain(|f| !matches!(f, ActiveFailure::NodeCrash { node: n, .. } if n == node));
        self.active.push(ActiveFailure::NodeCrash {
            node: node.clone(),
            since: now,
            recover_at,
        });
        Ok(())
    }

    /// Bring a crashed node back now.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError::UnknownNode` if `node` is not registered.
    pub fn inject_node_recovery<N: Node>(
        &mut self,
        engine: &mut Engine<N>,
        node: &NodeId,
    ) -> Result<(), SimulationError> {
        Self::require_node(engine, node)?;
        engine.schedule_event(engine.now(), EventKind::NodeRecover { node: node.clone() })?;
        tracing::info!("scheduled recovery of {node}");
        self.active
            .retain(|f| !matches!(f, ActiveFailure::NodeCrash { node: n, .. } if n == node));
        Ok(())
    }

    /// Split the network into `groups` now and, if `duration` is given,
    /// heal it that many seconds later.
    ///
    /// Nodes not named in any group form one implicit extra group.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError::UnknownNode` if a group names an
    /// unregistered node and `SimulationError::InvalidEvent` for a negative
    /// or non-finite duration.
    pub fn inject_network_partition<N: Node>(
        &mut self,
        engine: &mut Engine<N>,
        groups: Vec<Vec<NodeId>>,
        duration: Option<f64>,
    ) -> Result<(), SimulationError> {
        for node in groups.iter().flatten() {
            Self::require_node(engine, node)?;
        }
        let now = engine.now();
        let heal_at = duration.map(|d| now + d);
        if let Some(at) = heal_at.filter(|at| !at.is_finite() || *at < now) {
            engine.note_validation_error();
            return Err(SimulationError::InvalidEvent { timestamp: at });
        }

        tracing::info!("injecting network partition {groups:?} (heal at {heal_at:?})");
        engine.schedule_event(
            now,
            EventKind::PartitionStart {
                groups: groups.clone(),
            },
        )?;
        if let Some(at) = heal_at {
            engine.schedule_event(at, EventKind::PartitionHeal)?;
        }

        self.active
            .retain(|f| !matches!(f, ActiveFailure::Partition { .. }));
        self.active.push(ActiveFailure::Partition {
            groups,
            since: now,
            heal_at,
        });
        Ok(())
    }

    /// Remove any partition now.
    ///
    /// # Errors
    ///
    /// Propagates a scheduling failure from the engine.
    pub fn heal_partition<N: Node>(&mut self, engine: &mut Engine<N>) -> Result<(), SimulationError> {
        engine.schedule_event(engine.now(), EventKind::PartitionHeal)?;
        self.active
            .retain(|f| !matches!(f, ActiveFailure::Partition { .. }));
        Ok(())
    }

    /// Change the transport's drop rate (clamped to `[0, 1]`).
    pub fn set_drop_rate<N: Node>(engine: &mut Engine<N>, rate: f64) {
        engine.transport_mut().set_drop_rate(rate);
        tracing::info!(
            "message drop rate set to {}",
            engine.transport().config().drop_rate
        );
    }

    /// Change the transport's duplicate rate (clamped to `[0, 1]`).
    pub fn set_duplicate_rate<N: Node>(engine: &mut Engine<N>, rate: f64) {
        engine.transport_mut().set_duplicate_rate(rate);
        tracing::info!(
            "message duplicate rate set to {}",
            engine.transport().config().duplicate_rate
        );
    }

    /// Apply the configured duplicate probability to the transport.
    pub fn apply_duplicate_probability<N: Node>(&self, engine: &mut Engine<N>) {
        Self::set_duplicate_rate(engine, self.config.message_duplicate_probability);
    }

    /// Bernoulli draw with the configured crash probability.
    pub fn should_crash_node<N: Node>(&self, engine: &mut Engine<N>, node: &NodeId) -> bool {
        let crash = engine.rng_mut().random::<f64>() < self.config.node_crash_probability;
        if crash {
            tracing::info!("chaos draw selected {node} for a crash");
        }
        crash
    }

    /// Bernoulli draw with the configured partition probability.
    pub fn should_partition_network<N: Node>(&self, engine: &mut Engine<N>) -> bool {
        let partition = engine.rng_mut().random::<f64>() < self.config.network_partition_probability;
        if partition {
            tracing::info!("chaos draw selected a network partition");
        }
        partition
    }

    /// Uniform extra delay in `[0, max_delay]` seconds.
    pub fn message_delay<N: Node>(&self, engine: &mut Engine<N>) -> f64 {
        if !self.config.max_delay.is_finite() || self.config.max_delay <= 0.0 {
            return 0.0;
        }
        engine.rng_mut().random_range(0.0..=self.config.max_delay)
    }

    /// Failures injected through this injector that have not ended by `now`.
    #[must_use]
    pub fn active_failures(&self, now: f64) -> Vec<ActiveFailure> {
        self.active
            .iter()
            .filter(|f| f.ends_at().is_none_or(|end| end > now))
            .cloned()
            .collect()
    }

    fn require_node<N: Node>(engine: &mut Engine<N>, node: &NodeId) -> Result<(), SimulationError> {
        if engine.node_exists(node) {
            return Ok(());
        }
        tracing::warn!("failure injection targets unknown node {node}");
        engine.note_validation_error();
        Err(SimulationError::UnknownNode(node.clone()))
    }
}
