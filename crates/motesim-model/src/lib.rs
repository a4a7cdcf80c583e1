//! # motesim-model
//!
//! The hardware side of a simulated mote: a fixed-frequency cycle/sleep
//! model ([`CycleModel`]), the drift-compensation algorithm bridging
//! scheduler time and the mote's locally-skewed clock
//! ([`DriftCompensator`]), and the [`Mote`] that combines both with a
//! pluggable firmware policy.

pub mod cycle;
pub mod drift;
pub mod mote;

pub use cycle::{CycleModel, DesyncFault, DCO_FREQ_HZ};
pub use drift::{DriftCompensator, InvalidDeviation};
pub use mote::{ExecOutcome, InterruptOutcome, Mote};
