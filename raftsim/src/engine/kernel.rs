//! The discrete-event engine.
//!
//! The [`Engine`] owns the virtual clock, the event queue, the transport, the
//! random source, and every registered node. It is the only component that
//! advances time. Each iteration pops the earliest event, moves the clock to
//! its timestamp, dispatches it, and (at most once per tick interval of
//! simulated time) ticks every live node.
//!
//! # Failure isolation
//!
//! Node handlers return [`NodeError`]; the engine logs and counts them.
//! Handler panics are caught per dispatch. Only a corrupted queue (an event
//! with a non-finite timestamp) escapes [`Engine::run`] as an error.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tokio::sync::watch;

use super::clock::VirtualClock;
use super::context::{NodeContext, World};
use super::error::{NodeError, SimulationError};
use super::event::{Event, EventKind, Timer};
use super::queue::EventQueue;
use super::record::{
    DEFAULT_RECORD_CAPACITY, DomainEvent, DomainEventKind, MessageOutcome, MessageRecord,
    Recorder, RunStats,
};
use crate::node::Node;
use crate::transport::{Partition, Transport, TransportConfig};
use crate::types::NodeId;

/// Default simulated interval between node ticks.
pub const DEFAULT_TICK_INTERVAL: f64 = 0.1;

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Seed of the single random source.
    pub seed: u64,
    pub transport: TransportConfig,
    /// Minimum simulated time between two tick rounds.
    pub tick_interval: f64,
    /// Capacity of the recent-message and recent-event records.
    pub record_capacity: usize,
}

impl EngineConfig {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            transport: TransportConfig::default(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            record_capacity: DEFAULT_RECORD_CAPACITY,
        }
    }

    #[must_use]
    pub const fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }
}

/// Why a call to [`Engine::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    QueueEmpty,
    /// The next event lies beyond the requested time.
    ReachedMaxTime,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunReport {
    pub stop_reason: StopReason,
    /// Events processed by this call.
    pub events_processed: u64,
    /// Clock value when the call returned.
    pub time: f64,
}

/// Cloneable handle that pauses a running engine from another thread.
///
/// The flag is checked between events; the event in progress always
/// completes.
#[derive(Debug, Clone, Default)]
pub struct PauseHandle(Arc<AtomicBool>);

impl PauseHandle {
    pub fn pause(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Immutable view of the whole engine, published for concurrent readers.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot<S> {
    pub time: f64,
    pub paused: bool,
    pub pending_events: usize,
    pub next_event_time: Option<f64>,
    pub nodes: Vec<S>,
    pub partition: Option<Vec<Vec<NodeId>>>,
    pub recent_messages: Vec<MessageRecord>,
    pub recent_events: Vec<DomainEvent>,
    pub stats: RunStats,
}

pub struct Engine<N: Node> {
    world: World,
    nodes: BTreeMap<NodeId, N>,
    tick_interval: f64,
    last_tick: f64,
    paused: PauseHandle,
    snapshots: watch::Sender<Arc<EngineSnapshot<N::Snapshot>>>,
}

impl<N: Node> Engine<N> {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let world = World {
            clock: VirtualClock::new(),
            queue: EventQueue::new(),
            transport: Transport::new(config.transport),
            rng: StdRng::seed_from_u64(config.seed),
            recorder: Recorder::new(config.record_capacity),
            node_ids: Vec::new(),
        };
        let (snapshots, _) = watch::channel(Arc::new(EngineSnapshot {
            time: 0.0,
            paused: false,
            pending_events: 0,
            next_event_time: None,
            nodes: Vec::new(),
            partition: None,
            recent_messages: Vec::new(),
            recent_events: Vec::new(),
            stats: RunStats::default(),
        }));
        tracing::info!("simulation engine initialized (seed {})", config.seed);
        Self {
            world,
            nodes: BTreeMap::new(),
            tick_interval: config.tick_interval,
            last_tick: 0.0,
            paused: PauseHandle::default(),
            snapshots,
        }
    }

    /// Register a node and let it arm its first timers.
    ///
    /// Idempotent per ID: returns `false` and keeps the existing node if the
    /// ID is already registered.
    pub fn register_node(&mut self, node: N) -> bool {
        let id = node.id().clone();
        if self.nodes.contains_key(&id) {
            tracing::warn!("node {id} is already registered");
            return false;
        }
        if let Err(index) = self.world.node_ids.binary_search(&id) {
            self.world.node_ids.insert(index, id.clone());
        }
        self.nodes.insert(id.clone(), node);
        tracing::info!("registered node {id}");
        self.dispatch(&id, "start", |node, ctx| node.start(ctx));
        true
    }

    #[must_use]
    pub fn node_exists(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&N> {
        self.nodes.get(id)
    }

    /// Registered nodes in ID order.
    pub fn nodes(&self) -> impl Iterator<Item = &N> {
        self.nodes.values()
    }

    #[must_use]
    pub fn node_ids(&self) -> &[NodeId] {
        &self.world.node_ids
    }

    /// Run `f` against one node with a live context, e.g. to submit a command.
    ///
    /// Returns `None` if the node is not registered.
    pub fn with_node<R>(
        &mut self,
        id: &NodeId,
        f: impl FnOnce(&mut N, &mut NodeContext<'_>) -> R,
    ) -> Option<R> {
        let node = self.nodes.get_mut(id)?;
        let mut ctx = NodeContext::new(id, &mut self.world);
        Some(f(node, &mut ctx))
    }

    /// Schedule an event from outside any node.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError::InvalidEvent` for a negative or non-finite
    /// timestamp.
    pub fn schedule_event(&mut self, timestamp: f64, kind: EventKind) -> Result<u64, SimulationError> {
        self.world.queue.schedule(timestamp, kind).inspect_err(|e| {
            tracing::warn!("rejected event: {e}");
            self.world.recorder.stats_mut().validation_errors += 1;
        })
    }

    #[must_use]
    pub fn now(&self) -> f64 {
        self.world.clock.now()
    }

    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.world.queue.len()
    }

    #[must_use]
    pub fn next_event_time(&self) -> Option<f64> {
        self.world.queue.peek_time()
    }

    #[must_use]
    pub const fn stats(&self) -> &RunStats {
        self.world.recorder.stats()
    }

    #[must_use]
    pub const fn recorder(&self) -> &Recorder {
        &self.world.recorder
    }

    pub const fn transport_mut(&mut self) -> &mut Transport {
        &mut self.world.transport
    }

    #[must_use]
    pub const fn transport(&self) -> &Transport {
        &self.world.transport
    }

    /// The simulation's single random source, for callers outside any node.
    pub const fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.world.rng
    }

    /// Count a rejected call made against the engine.
    pub const fn note_validation_error(&mut self) {
        self.world.recorder.stats_mut().validation_errors += 1;
    }

    #[must_use]
    pub fn pause_handle(&self) -> PauseHandle {
        self.paused.clone()
    }

    /// Ask a run to stop after the current event.
    pub fn pause(&self) {
        self.paused.pause();
        tracing::info!("simulation paused");
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.is_paused()
    }

    /// Clear a pause and continue until `max_time`.
    ///
    /// Queue and clock are kept across pauses, so this picks up exactly where
    /// the previous run stopped.
    pub fn resume(&mut self, max_time: f64) -> Result<RunReport, SimulationError> {
        self.paused.clear();
        tracing::info!("resuming simulation at {:.3}", self.now());
        self.run(max_time)
    }

    /// Process events until the queue is empty, the next event lies beyond
    /// `max_time`, or a pause is requested.
    ///
    /// A pending pause is honoured immediately; use [`Engine::resume`] to
    /// clear it.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError::InvalidTimestamp` for a NaN `max_time` and
    /// `SimulationError::QueueCorrupted` if the queue yields an event with a
    /// non-finite timestamp.
    pub fn run(&mut self, max_time: f64) -> Result<RunReport, SimulationError> {
        if max_time.is_nan() {
            self.note_validation_error();
            return Err(SimulationError::InvalidTimestamp {
                timestamp: max_time,
            });
        }
        tracing::info!("running simulation until {max_time:.3}");

        let start = self.stats().events_processed;
        let stop_reason = loop {
            if self.paused.is_paused() {
                break StopReason::Paused;
            }
            match self.world.queue.peek_time() {
                None => break StopReason::QueueEmpty,
                Some(next) if next > max_time => break StopReason::ReachedMaxTime,
                Some(_) => {}
            }
            self.process_next()?;

            let processed = self.stats().events_processed - start;
            if processed % 10_000 == 0 {
                tracing::debug!("processed {processed} events, sim time {:.2}", self.now());
            }
        };

        self.publish();
        let report = RunReport {
            stop_reason,
            events_processed: self.stats().events_processed - start,
            time: self.now(),
        };
        tracing::info!(
            "simulation stopped ({stop_reason:?}): {} events, sim time {:.2}",
            report.events_processed,
            report.time
        );
        Ok(report)
    }

    /// Process exactly one event. Returns `Ok(false)` if the queue is empty.
    pub fn step(&mut self) -> Result<bool, SimulationError> {
        let processed = self.process_next()?;
        if processed {
            self.publish();
        }
        Ok(processed)
    }

    /// Build a snapshot of the current state.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot<N::Snapshot> {
        EngineSnapshot {
            time: self.now(),
            paused: self.is_paused(),
            pending_events: self.pending_events(),
            next_event_time: self.next_event_time(),
            nodes: self.nodes.values().map(Node::snapshot).collect(),
            partition: self.world.transport.partition().map(Partition::groups),
            recent_messages: self.world.recorder.messages().to_vec(),
            recent_events: self.world.recorder.events().to_vec(),
            stats: *self.stats(),
        }
    }

    /// Receiver for snapshots published on every tick round and at the end
    /// of every `run`/`step`. Starts with the current state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<EngineSnapshot<N::Snapshot>>> {
        let receiver = self.snapshots.subscribe();
        self.publish();
        receiver
    }

    /// Publish the current state to all subscribers.
    ///
    /// Without subscribers no snapshot is built.
    pub fn publish(&self) {
        if self.snapshots.receiver_count() == 0 {
            return;
        }
        self.snapshots.send_replace(Arc::new(self.snapshot()));
    }

    fn process_next(&mut self) -> Result<bool, SimulationError> {
        let Some(event) = self.world.queue.pop() else {
            return Ok(false);
        };
        if !event.timestamp().is_finite() {
            tracing::error!("queue yielded {event} with a non-finite timestamp");
            return Err(SimulationError::QueueCorrupted(format!(
                "event {} has timestamp {}",
                event.sequence(),
                event.timestamp()
            )));
        }
        if !self.world.clock.advance_to(event.timestamp()) {
            tracing::warn!(
                "event timestamp {:.3} is in the past (current: {:.3})",
                event.timestamp(),
                self.now()
            );
            self.world.recorder.stats_mut().protocol_anomalies += 1;
        }

        self.world.recorder.stats_mut().events_processed += 1;
        self.process_event(event);
        self.maybe_tick();
        Ok(true)
    }

    fn process_event(&mut self, event: Event) {
        let now = self.now();
        match event.into_kind() {
            EventKind::MessageSent(message) => {
                tracing::debug!("message sent: {message}");
                self.world
                    .recorder
                    .record_message(now, &message, MessageOutcome::Sent);
            }
            EventKind::MessageDropped { message, reason } => {
                tracing::debug!("message dropped ({reason:?}): {message}");
                self.world
                    .recorder
                    .record_message(now, &message, MessageOutcome::Dropped(reason));
            }
            EventKind::MessageDelivered(message) => {
                let dst = message.dst.clone();
                match self.nodes.get(&dst).map(Node::is_alive) {
                    None => self.anomaly(&format!("message to unknown node {dst}")),
                    Some(false) => {
                        tracing::debug!("message dropped, node {dst} is down: {message}");
                        self.world.recorder.record_message(
                            now,
                            &message,
                            MessageOutcome::Undeliverable,
                        );
                    }
                    Some(true) => {
                        self.world
                            .recorder
                            .record_message(now, &message, MessageOutcome::Delivered);
                        self.dispatch(&dst, "message", |node, ctx| {
                            node.receive_message(message, ctx)
                        });
                    }
                }
            }
            EventKind::Timeout { node, timer } => self.dispatch_timeout(&node, timer),
            EventKind::NodeCrash { node } => {
                if !self.node_exists(&node) {
                    self.anomaly(&format!("crash event for unknown node {node}"));
                    return;
                }
                self.dispatch(&node, "crash", |node, ctx| {
                    node.crash(ctx);
                    Ok(())
                });
            }
            EventKind::NodeRecover { node } => {
                if !self.node_exists(&node) {
                    self.anomaly(&format!("recovery event for unknown node {node}"));
                    return;
                }
                self.dispatch(&node, "recover", |node, ctx| node.recover(ctx).map(|_| ()));
            }
            EventKind::PartitionStart { groups } => {
                tracing::info!("network partitioned into {groups:?}");
                let detail = format!("{groups:?}");
                self.world
                    .transport
                    .set_partition(Some(Partition::new(groups)));
                self.world
                    .recorder
                    .record_event(now, DomainEventKind::PartitionStarted, None, detail);
            }
            EventKind::PartitionHeal => {
                if self.world.transport.partition().is_none() {
                    tracing::debug!("partition heal with no active partition");
                    return;
                }
                tracing::info!("network partition healed");
                self.world.transport.set_partition(None);
                self.world.recorder.record_event(
                    now,
                    DomainEventKind::PartitionHealed,
                    None,
                    "partition healed",
                );
            }
        }
    }

    fn dispatch_timeout(&mut self, id: &NodeId, timer: Timer) {
        match self.nodes.get(id).map(Node::is_alive) {
            None => self.anomaly(&format!("timeout for unknown node {id}")),
            Some(false) => tracing::trace!("timeout for crashed node {id} ignored"),
            Some(true) => match timer {
                Timer::Election => {
                    self.dispatch(id, "election timeout", |node, ctx| {
                        node.handle_election_timeout(ctx)
                    });
                }
                Timer::Heartbeat { term } => {
                    self.dispatch(id, "heartbeat timeout", |node, ctx| {
                        node.handle_heartbeat_timeout(term, ctx)
                    });
                }
                custom @ Timer::Custom { .. } => {
                    self.dispatch(id, "timeout", |node, ctx| node.handle_timeout(custom, ctx));
                }
            },
        }
    }

    fn maybe_tick(&mut self) {
        let now = self.now();
        if now - self.last_tick < self.tick_interval {
            return;
        }
        self.last_tick = now;
        let ids = self.world.node_ids.clone();
        for id in &ids {
            if self.nodes.get(id).is_some_and(Node::is_alive) {
                self.dispatch(id, "tick", |node, ctx| node.tick(ctx));
            }
        }
        self.publish();
    }

    /// Run one node handler with failure isolation.
    fn dispatch<F>(&mut self, id: &NodeId, what: &str, f: F)
    where
        F: FnOnce(&mut N, &mut NodeContext<'_>) -> Result<(), NodeError>,
    {
        let Some(node) = self.nodes.get_mut(id) else {
            self.anomaly(&format!("{what} for unknown node {id}"));
            return;
        };
        let mut ctx = NodeContext::new(id, &mut self.world);
        let outcome = panic::catch_unwind(AssertUnwindSafe(move || f(node, &mut ctx)));

        let stats = self.world.recorder.stats_mut();
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_logic_fault() => {
                tracing::error!("node {id} failed handling {what}: {e}");
                stats.node_faults += 1;
            }
            Ok(Err(e)) => {
                tracing::warn!("node {id} rejected {what}: {e}");
                stats.protocol_anomalies += 1;
            }
            Err(payload) => {
                tracing::error!(
                    "node {id} panicked handling {what}: {}",
                    panic_message(payload.as_ref())
                );
                stats.node_faults += 1;
            }
        }
    }

    fn anomaly(&mut self, message: &str) {
        tracing::warn!("{message}");
        self.world.recorder.stats_mut().protocol_anomalies += 1;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
