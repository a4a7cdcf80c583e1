//! The simulation: node set, radio layout, and the dispatch loop.

use crate::scheduler::{EventKey, EventKind, EventScheduler};
use motesim_common::{IrqLine, NodeId, SimTime};
use motesim_firmware::{FirmwareError, FirmwareSpec};
use motesim_model::{DesyncFault, InvalidDeviation, Mote, DCO_FREQ_HZ};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Execution slice handed to a mote per Exec dispatch, in microseconds.
pub const EXEC_DURATION_US: u64 = 1;

/// Bounds of the per-node radio propagation delay, drawn once at node
/// creation.
pub const MIN_RADIO_DELAY_US: u64 = 10;
pub const MAX_RADIO_DELAY_US: u64 = 1000;

/// Failure of a simulation run or its setup.
///
/// None of these are recoverable: configuration faults abort setup, and
/// the runtime faults abort the run with no partial result.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("simulation already started")]
    AlreadyStarted,

    #[error(transparent)]
    InvalidDeviation(#[from] InvalidDeviation),

    #[error(transparent)]
    Firmware(#[from] FirmwareError),

    /// The drift compensation produced a jump the cycle model cannot
    /// honor.
    #[error("cycle model desync on node {node} at {time}")]
    Desync {
        node: NodeId,
        time: SimTime,
        #[source]
        fault: DesyncFault,
    },

    #[error("radio broadcast from unknown node {0}")]
    UnknownNode(NodeId),

    /// Every live node keeps one Exec event pending, so an empty queue
    /// before the time limit is a logic error.
    #[error("event queue empty with the simulation still running")]
    EmptyQueue,
}

/// Counters collected across a run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationStats {
    /// Exec events dispatched.
    pub exec_events: u64,
    /// Radio events dispatched.
    pub radio_events: u64,
    /// Pushes dropped because an identical event was already pending.
    pub duplicates_dropped: u64,
    /// Radio broadcasts fanned out.
    pub broadcasts: u64,
    /// Time of the last dispatched event, in microseconds.
    pub final_time_us: u64,
}

impl SimulationStats {
    pub fn total_events(&self) -> u64 {
        self.exec_events + self.radio_events
    }
}

/// Post-run view of one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
    pub node: NodeId,
    /// Configured deviation ratio.
    pub deviation: f64,
    /// Scheduler time of the node's last dispatch.
    pub scheduler_time_us: u64,
    /// Device-local elapsed time.
    pub local_time_us: u64,
    /// Final hardware cycle count.
    pub cycles: u64,
    /// Cycles per scheduler microsecond over the nominal cycles per
    /// microsecond; converges to the configured deviation.
    pub observed_ratio: f64,
}

/// Everything a run produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub stats: SimulationStats,
    pub nodes: Vec<NodeReport>,
}

/// A deterministic mote simulation.
///
/// Nodes are created up front; [`Simulation::run`] then drives the event
/// loop to the configured time limit. All randomness flows from the root
/// generator, so one seed reproduces the radio layout and the entire
/// dispatch sequence.
pub struct Simulation {
    motes: Vec<Mote>,
    /// Propagation delay per sending node, in microseconds.
    delays: Vec<u64>,
    scheduler: EventScheduler,
    rng: ChaCha8Rng,
    started: bool,
    now: SimTime,
    stats: SimulationStats,
}

impl Simulation {
    pub fn new(seed: u64) -> Self {
        Simulation {
            motes: Vec::new(),
            delays: Vec::new(),
            scheduler: EventScheduler::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            started: false,
            now: SimTime::ZERO,
            stats: SimulationStats::default(),
        }
    }

    /// Register a node before the run starts.
    ///
    /// Draws the node's propagation delay and derives its firmware and
    /// instruction-cost streams from the root generator.
    pub fn create_node(
        &mut self,
        deviation: f64,
        firmware: &FirmwareSpec,
    ) -> Result<NodeId, SimError> {
        if self.started {
            return Err(SimError::AlreadyStarted);
        }

        let id = NodeId::new(self.motes.len() as u32);
        let delay = self.rng.gen_range(MIN_RADIO_DELAY_US..=MAX_RADIO_DELAY_US);
        let firmware_seed = self.rng.gen::<u64>();
        let op_seed = self.rng.gen::<u64>();

        let firmware = firmware.build(firmware_seed)?;
        self.motes.push(Mote::new(id, deviation, firmware, op_seed)?);
        self.delays.push(delay);

        debug!(node = %id, deviation, radio_delay_us = delay, "node created");
        Ok(id)
    }

    pub fn node_count(&self) -> usize {
        self.motes.len()
    }

    /// Run to completion. Returns when the earliest pending event passes
    /// `limit`, the only non-exceptional exit.
    pub fn run(&mut self, limit: SimTime) -> Result<SimulationReport, SimError> {
        if self.started {
            return Err(SimError::AlreadyStarted);
        }
        self.started = true;

        info!(
            nodes = self.motes.len(),
            limit_us = limit.as_micros(),
            "simulation starting"
        );

        for index in 0..self.motes.len() {
            self.scheduler
                .push(SimTime::ZERO, EventKind::Exec, NodeId::new(index as u32));
        }

        loop {
            let Some(event) = self.scheduler.pop_earliest() else {
                return Err(SimError::EmptyQueue);
            };
            if event.time > limit {
                break;
            }
            self.now = event.time;

            match event.kind {
                EventKind::Exec => self.dispatch_exec(event)?,
                EventKind::Radio => self.dispatch_radio(event)?,
            }
        }

        self.stats.final_time_us = self.now.as_micros();
        info!(
            events = self.stats.total_events(),
            broadcasts = self.stats.broadcasts,
            final_time_us = self.stats.final_time_us,
            "simulation complete"
        );
        Ok(self.report())
    }

    fn dispatch_exec(&mut self, event: EventKey) -> Result<(), SimError> {
        self.stats.exec_events += 1;

        let mote = &mut self.motes[event.node.index()];
        let outcome = mote
            .execute(event.time, EXEC_DURATION_US)
            .map_err(|fault| SimError::Desync {
                node: event.node,
                time: event.time,
                fault,
            })?;

        if !self
            .scheduler
            .push(outcome.next_exec, EventKind::Exec, event.node)
        {
            self.stats.duplicates_dropped += 1;
        }
        if outcome.radio_sent {
            self.broadcast(event.time, event.node)?;
        }
        Ok(())
    }

    fn dispatch_radio(&mut self, event: EventKey) -> Result<(), SimError> {
        self.stats.radio_events += 1;

        let mote = &mut self.motes[event.node.index()];
        let outcome = mote.interrupt(event.time, IrqLine::Radio);
        trace!(node = %event.node, time_us = event.time.as_micros(), "radio delivered");

        if outcome.radio_sent {
            self.broadcast(event.time, event.node)?;
        }
        Ok(())
    }

    /// Fan a send out to every other node, one Radio event per receiver,
    /// all delayed by the sender's propagation delay.
    pub fn broadcast(&mut self, time: SimTime, source: NodeId) -> Result<(), SimError> {
        let delay = *self
            .delays
            .get(source.index())
            .ok_or(SimError::UnknownNode(source))?;
        let arrival = time + delay;
        self.stats.broadcasts += 1;
        trace!(source = %source, time_us = time.as_micros(), delay_us = delay, "broadcast");

        for index in 0..self.motes.len() {
            let peer = NodeId::new(index as u32);
            if peer == source {
                continue;
            }
            if !self.scheduler.push(arrival, EventKind::Radio, peer) {
                self.stats.duplicates_dropped += 1;
            }
        }
        Ok(())
    }

    fn report(&self) -> SimulationReport {
        let nominal_cycles_per_us = (DCO_FREQ_HZ / 1_000_000) as f64;
        let nodes = self
            .motes
            .iter()
            .map(|mote| {
                let scheduler_time_us = mote.last_dispatch().as_micros();
                let observed_ratio = if scheduler_time_us == 0 {
                    0.0
                } else {
                    mote.cycles() as f64 / scheduler_time_us as f64 / nominal_cycles_per_us
                };
                NodeReport {
                    node: mote.id(),
                    deviation: mote.deviation(),
                    scheduler_time_us,
                    local_time_us: mote.local_micros(),
                    cycles: mote.cycles(),
                    observed_ratio,
                }
            })
            .collect();
        SimulationReport {
            stats: self.stats.clone(),
            nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim_with_nodes(n: usize) -> Simulation {
        let mut sim = Simulation::new(99);
        for _ in 0..n {
            sim.create_node(1.0, &FirmwareSpec::Null).unwrap();
        }
        sim
    }

    #[test]
    fn node_ids_follow_creation_order() {
        let mut sim = Simulation::new(1);
        assert_eq!(
            sim.create_node(1.0, &FirmwareSpec::Null).unwrap(),
            NodeId::new(0)
        );
        assert_eq!(
            sim.create_node(0.5, &FirmwareSpec::Null).unwrap(),
            NodeId::new(1)
        );
        assert_eq!(sim.node_count(), 2);
    }

    #[test]
    fn create_node_rejects_bad_deviation() {
        let mut sim = Simulation::new(1);
        assert!(matches!(
            sim.create_node(0.0, &FirmwareSpec::Null),
            Err(SimError::InvalidDeviation(_))
        ));
    }

    #[test]
    fn create_node_after_start_fails() {
        let mut sim = sim_with_nodes(1);
        sim.run(SimTime::from_micros(100)).unwrap();
        assert!(matches!(
            sim.create_node(1.0, &FirmwareSpec::Null),
            Err(SimError::AlreadyStarted)
        ));
    }

    #[test]
    fn run_twice_fails() {
        let mut sim = sim_with_nodes(1);
        sim.run(SimTime::from_micros(100)).unwrap();
        assert!(matches!(
            sim.run(SimTime::from_micros(100)),
            Err(SimError::AlreadyStarted)
        ));
    }

    #[test]
    fn run_without_nodes_is_an_empty_queue_fault() {
        let mut sim = Simulation::new(1);
        assert!(matches!(
            sim.run(SimTime::from_micros(100)),
            Err(SimError::EmptyQueue)
        ));
    }

    #[test]
    fn broadcast_fans_out_to_all_peers() {
        let mut sim = sim_with_nodes(4);
        let source = NodeId::new(1);
        let send_time = SimTime::from_micros(500);
        sim.broadcast(send_time, source).unwrap();

        let arrival = send_time + sim.delays[source.index()];
        let mut delivered = Vec::new();
        while let Some(event) = sim.scheduler.pop_earliest() {
            assert_eq!(event.kind, EventKind::Radio);
            assert_eq!(event.time, arrival);
            delivered.push(event.node);
        }
        assert_eq!(
            delivered,
            vec![NodeId::new(0), NodeId::new(2), NodeId::new(3)]
        );
    }

    #[test]
    fn broadcast_from_unknown_node_fails() {
        let mut sim = sim_with_nodes(2);
        assert!(matches!(
            sim.broadcast(SimTime::ZERO, NodeId::new(7)),
            Err(SimError::UnknownNode(_))
        ));
    }

    #[test]
    fn propagation_delays_stay_in_bounds() {
        let sim = sim_with_nodes(50);
        for delay in &sim.delays {
            assert!((MIN_RADIO_DELAY_US..=MAX_RADIO_DELAY_US).contains(delay));
        }
    }

    #[test]
    fn run_reports_every_node() {
        let mut sim = sim_with_nodes(3);
        let report = sim.run(SimTime::from_micros(10_000)).unwrap();
        assert_eq!(report.nodes.len(), 3);
        assert!(report.stats.exec_events > 0);
        assert_eq!(report.stats.final_time_us, 10_000);
        for node in &report.nodes {
            // Inert firmware, unity deviation: the local clock tracks the
            // scheduler exactly.
            assert_eq!(node.scheduler_time_us, 10_000);
            assert!((node.observed_ratio - 1.0).abs() < 0.01);
        }
    }
}
