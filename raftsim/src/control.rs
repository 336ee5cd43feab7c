//! Background worker that drives a [`Simulation`] in wall-clock paced slices.
//!
//! The simulation itself is single-threaded and synchronous. The host process
//! owns it on one blocking worker; everything else talks to that worker
//! through a [`SimulationHandle`]:
//!
//! - control requests travel over an `mpsc` channel and are applied between
//!   slices, each answered through a `oneshot`;
//! - observers read the latest [`SimulationStatus`] from a `watch` channel,
//!   which always holds a complete, immutable copy.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::{ConfigError, ServerConfig, SimulationConfig};
use crate::engine::SimulationError;
use crate::failure::ActiveFailure;
use crate::simulation::{ClusterSnapshot, ClusterSummary, Simulation};
use crate::types::NodeId;

/// Wall-clock length of one simulation slice.
const SLICE: Duration = Duration::from_millis(50);

const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Errors returned to control-plane callers.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlError {
    /// The worker has exited.
    WorkerGone,
    /// No simulation has been started yet.
    NotStarted,
    /// There is no alive leader to accept a command.
    NoLeader,
    Config(ConfigError),
    Simulation(SimulationError),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkerGone => write!(f, "simulation worker has stopped"),
            Self::NotStarted => write!(f, "no simulation has been started"),
            Self::NoLeader => write!(f, "no leader available"),
            Self::Config(e) => write!(f, "invalid configuration: {e}"),
            Self::Simulation(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ControlError {}

impl From<ConfigError> for ControlError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<SimulationError> for ControlError {
    fn from(e: SimulationError) -> Self {
        Self::Simulation(e)
    }
}

/// What observers see of the worker.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationStatus {
    /// Whether virtual time is currently advancing.
    pub running: bool,
    /// Simulated seconds per wall-clock second.
    pub time_scale: f64,
    pub summary: Option<ClusterSummary>,
    pub active_failures: Vec<ActiveFailure>,
    pub snapshot: Option<ClusterSnapshot>,
}

/// A failure injection request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChaosRequest {
    pub kind: String,
    pub node: Option<NodeId>,
    pub recovery_time: Option<f64>,
}

type Reply<T> = oneshot::Sender<Result<T, ControlError>>;

enum ControlCommand {
    Start {
        config: Option<SimulationConfig>,
        reply: Reply<()>,
    },
    Stop {
        reply: Reply<()>,
    },
    Chaos {
        request: ChaosRequest,
        reply: Reply<bool>,
    },
    Submit {
        command: String,
        reply: Reply<NodeId>,
    },
}

/// Cloneable handle to the simulation worker.
#[derive(Debug, Clone)]
pub struct SimulationHandle {
    commands: mpsc::Sender<ControlCommand>,
    status: watch::Receiver<Arc<SimulationStatus>>,
}

impl fmt::Debug for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start { .. } => write!(f, "Start"),
            Self::Stop { .. } => write!(f, "Stop"),
            Self::Chaos { request, .. } => write!(f, "Chaos({})", request.kind),
            Self::Submit { .. } => write!(f, "Submit"),
        }
    }
}

impl SimulationHandle {
    /// Spawn the worker on the blocking pool of the current tokio runtime.
    ///
    /// The worker exits once every handle has been dropped.
    #[must_use]
    pub fn spawn(config: &ServerConfig) -> (Self, JoinHandle<()>) {
        let (commands, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (status_tx, status) = watch::channel(Arc::new(SimulationStatus {
            time_scale: config.time_scale,
            ..SimulationStatus::default()
        }));
        let worker = Worker {
            defaults: config.simulation.clone(),
            time_scale: config.time_scale,
            commands: rx,
            status: status_tx,
            simulation: None,
            running: false,
            horizon: 0.0,
        };
        let join = tokio::task::spawn_blocking(move || worker.run());
        (Self { commands, status }, join)
    }

    /// Latest published status.
    #[must_use]
    pub fn status(&self) -> Arc<SimulationStatus> {
        Arc::clone(&*self.status.borrow())
    }

    /// Start a fresh simulation, replacing any previous one.
    pub async fn start(&self, config: Option<SimulationConfig>) -> Result<(), ControlError> {
        self.request(|reply| ControlCommand::Start { config, reply })
            .await
    }

    /// Stop advancing virtual time. The last state stays observable.
    pub async fn stop(&self) -> Result<(), ControlError> {
        self.request(|reply| ControlCommand::Stop { reply }).await
    }

    /// Inject a failure. `Ok(false)` means the request was ignored.
    pub async fn chaos(&self, request: ChaosRequest) -> Result<bool, ControlError> {
        self.request(|reply| ControlCommand::Chaos { request, reply })
            .await
    }

    /// Submit a command to the current leader and return its ID.
    pub async fn submit(&self, command: String) -> Result<NodeId, ControlError> {
        self.request(|reply| ControlCommand::Submit { command, reply })
            .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> ControlCommand,
    ) -> Result<T, ControlError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| ControlError::WorkerGone)?;
        response.await.map_err(|_| ControlError::WorkerGone)?
    }
}

struct Worker {
    defaults: SimulationConfig,
    time_scale: f64,
    commands: mpsc::Receiver<ControlCommand>,
    status: watch::Sender<Arc<SimulationStatus>>,
    simulation: Option<Simulation>,
    running: bool,
    /// Virtual time the simulation has been run up to.
    horizon: f64,
}

impl Worker {
    fn run(mut self) {
        tracing::info!("simulation worker started (time scale {})", self.time_scale);
        loop {
            if !self.running {
                // Idle: block until there is something to do.
                match self.commands.blocking_recv() {
                    Some(command) => self.apply(command),
                    None => break,
                }
                continue;
            }

            let started = Instant::now();
            loop {
                match self.commands.try_recv() {
                    Ok(command) => self.apply(command),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        tracing::info!("simulation worker stopping, all handles dropped");
                        return;
                    }
                }
            }
            if self.running {
                self.advance();
            }
            if let Some(rest) = SLICE.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
        tracing::info!("simulation worker stopping, all handles dropped");
    }

    fn advance(&mut self) {
        let Some(sim) = self.simulation.as_mut() else {
            self.running = false;
            return;
        };
        self.horizon += SLICE.as_secs_f64() * self.time_scale;
        if let Err(e) = sim.run(self.horizon) {
            tracing::error!("simulation halted: {e}");
            self.running = false;
        }
        self.publish();
    }

    /// Apply one request. Status is published before the caller is
    /// answered, so a reply is never observed ahead of its effect.
    fn apply(&mut self, command: ControlCommand) {
        tracing::debug!("control command {command:?}");
        match command {
            ControlCommand::Start { config, reply } => {
                let result = self.start(config);
                self.reply(reply, result);
            }
            ControlCommand::Stop { reply } => {
                if let Some(sim) = &self.simulation {
                    sim.pause();
                }
                self.running = false;
                tracing::info!("simulation stopped");
                self.reply(reply, Ok(()));
            }
            ControlCommand::Chaos { request, reply } => {
                let result = match self.simulation.as_mut() {
                    Some(sim) => sim
                        .inject_failure(
                            &request.kind,
                            request.node.as_ref(),
                            request.recovery_time,
                        )
                        .map_err(ControlError::from),
                    None => Err(ControlError::NotStarted),
                };
                self.reply(reply, result);
            }
            ControlCommand::Submit { command, reply } => {
                let result = match self.simulation.as_mut() {
                    Some(sim) => sim.submit_to_leader(command).ok_or(ControlError::NoLeader),
                    None => Err(ControlError::NotStarted),
                };
                self.reply(reply, result);
            }
        }
    }

    fn reply<T>(&self, reply: Reply<T>, result: Result<T, ControlError>) {
        self.publish();
        if reply.send(result).is_err() {
            tracing::debug!("control caller went away before the reply");
        }
    }

    fn start(&mut self, config: Option<SimulationConfig>) -> Result<(), ControlError> {
        let config = config.unwrap_or_else(|| self.defaults.clone());
        let sim = Simulation::new(config)?;
        tracing::info!(
            "simulation started with {} nodes",
            sim.config().node_count
        );
        self.simulation = Some(sim);
        self.running = true;
        self.horizon = 0.0;
        Ok(())
    }

    fn publish(&self) {
        let status = match &self.simulation {
            Some(sim) => {
                let snapshot = sim.snapshot();
                SimulationStatus {
                    running: self.running,
                    time_scale: self.time_scale,
                    summary: Some(ClusterSummary::from_snapshot(&snapshot)),
                    active_failures: sim.active_failures(),
                    snapshot: Some(snapshot),
                }
            }
            None => SimulationStatus {
                running: false,
                time_scale: self.time_scale,
                ..SimulationStatus::default()
            },
        };
        self.status.send_replace(Arc::new(status));
    }
}
