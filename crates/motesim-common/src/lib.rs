//! # motesim-common
//!
//! Shared vocabulary types for the motesim simulator: simulation time,
//! node identifiers, IRQ lines, and the capability traits that connect a
//! mote's hardware model to its firmware policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

// ============================================================================
// Simulation Time
// ============================================================================

/// Simulation time in microseconds since the start of the run.
///
/// The scheduler's time cursor is monotonically non-decreasing; arithmetic
/// on `SimTime` is plain integer arithmetic on microseconds.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SimTime(u64);

impl SimTime {
    /// Time zero, the start of every simulation.
    pub const ZERO: SimTime = SimTime(0);

    /// Create a time from a microsecond count.
    pub const fn from_micros(micros: u64) -> Self {
        SimTime(micros)
    }

    /// Create a time from (possibly fractional) seconds.
    pub fn from_secs(secs: f64) -> Self {
        SimTime((secs * 1_000_000.0) as u64)
    }

    /// This time as whole microseconds.
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// This time as fractional seconds.
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Microseconds elapsed since `earlier`.
    ///
    /// `earlier` must not be later than `self`; dispatch times per node are
    /// non-decreasing, so a violation is a scheduler bug.
    pub fn micros_since(&self, earlier: SimTime) -> u64 {
        self.0 - earlier.0
    }
}

impl Add<u64> for SimTime {
    type Output = SimTime;

    fn add(self, micros: u64) -> SimTime {
        SimTime(self.0 + micros)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

// ============================================================================
// Node Identity
// ============================================================================

/// Stable identifier of a simulated mote, assigned in creation order.
///
/// Also used to index the per-node radio propagation delay table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn new(id: u32) -> Self {
        NodeId(id)
    }

    /// The id as a table index.
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Interrupt Lines
// ============================================================================

/// External interrupt lines a mote can receive.
///
/// Interrupts model only events arriving from the simulation; timers are
/// internal to the cycle model and never appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrqLine {
    /// Radio packet arrival.
    Radio,
}

// ============================================================================
// Firmware Capability Traits
// ============================================================================

/// The operations a firmware policy may perform on its mote.
///
/// This is the complete surface firmware gets: it can inspect and control
/// the CPU and radio, but it cannot schedule simulation events.
pub trait MoteControl {
    /// Current hardware cycle counter.
    fn cycles(&self) -> u64;

    /// Whether the CPU is in its low-power sleep state.
    fn is_sleeping(&self) -> bool;

    /// Enter sleep until `duration_cycles` cycles from now.
    fn sleep(&mut self, duration_cycles: u64);

    /// Whether the radio IRQ line is enabled.
    fn radio_enabled(&self) -> bool;

    /// Enable or disable the radio IRQ line. Disabling the line is the
    /// standard way to power the radio down.
    fn set_radio_enabled(&mut self, enabled: bool);

    /// Request a radio broadcast. Honored only while the radio line is
    /// enabled; silently dropped otherwise.
    fn radio_send(&mut self);
}

/// A firmware policy driving a mote's behavior.
///
/// The simulation invokes `on_execute` once per Exec dispatch while the CPU
/// is awake, and `on_interrupt` once per delivered interrupt.
pub trait Firmware {
    fn on_execute(&mut self, cpu: &mut dyn MoteControl);

    fn on_interrupt(&mut self, cpu: &mut dyn MoteControl, line: IrqLine);
}
