//! Drift compensation between scheduler time and device-local time.
//!
//! A mote with deviation ratio `d` (observed over reference frequency)
//! must see `d` device-local microseconds for every scheduler microsecond.
//! Both clocks only move in whole microseconds, so each conversion floors
//! and accumulates its fractional remainder; once an accumulator reaches a
//! whole tick, the tick is released into the next conversion and the
//! accumulator debited. The two directions keep independent accumulators
//! so forward and backward rounding cannot cancel incorrectly.
//!
//! For deviation above 1.0 the forward conversion can outrun what the
//! cycle model is able to account for between two dispatches. The forward
//! jump is therefore clamped to the local-time budget the model reported
//! at the previous dispatch, and the excess is carried as a deficit that
//! is repaid out of later jumps. The jump is never negative.

use motesim_common::SimTime;
use thiserror::Error;

/// Accumulated rounding error at which one whole tick is released.
const TICK: f64 = 1.0;

/// Rejected deviation ratio, raised at configuration time.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
#[error("invalid deviation ratio {0}: must be finite and greater than zero")]
pub struct InvalidDeviation(pub f64);

/// Per-mote mapping between scheduler-time jumps and device-local jumps.
#[derive(Debug)]
pub struct DriftCompensator {
    deviation: f64,
    inv_deviation: f64,
    /// Scheduler time of the previous execute dispatch.
    last_dispatch: SimTime,
    /// Fractional local microseconds not yet released (forward direction).
    forward_error: f64,
    /// Fractional scheduler microseconds not yet released (backward
    /// direction).
    backward_error: f64,
    /// Whole local microseconds owed but withheld because the cycle model
    /// could not absorb them yet.
    deficit: u64,
}

impl DriftCompensator {
    pub fn new(deviation: f64) -> Result<Self, InvalidDeviation> {
        if !deviation.is_finite() || deviation <= 0.0 {
            return Err(InvalidDeviation(deviation));
        }
        Ok(DriftCompensator {
            deviation,
            inv_deviation: 1.0 / deviation,
            last_dispatch: SimTime::ZERO,
            forward_error: 0.0,
            backward_error: 0.0,
            deficit: 0,
        })
    }

    pub fn deviation(&self) -> f64 {
        self.deviation
    }

    /// Convert the scheduler-time advance since the previous dispatch into
    /// a device-local jump, bounded by `budget`: the local delay the cycle
    /// model reported at the previous dispatch, which is the most local
    /// time it can account for now.
    ///
    /// Updates the last-dispatch time unconditionally.
    pub fn to_local(&mut self, now: SimTime, budget: u64) -> u64 {
        let raw = now.micros_since(self.last_dispatch);
        self.last_dispatch = now;

        let exact = raw as f64 * self.deviation;
        let mut jump = exact.floor() as u64;
        self.forward_error += exact - exact.floor();
        if self.forward_error >= TICK {
            jump += 1;
            self.forward_error -= TICK;
        }

        jump += self.deficit;
        self.deficit = 0;
        if jump > budget {
            self.deficit = jump - budget;
            jump = budget;
        }
        jump
    }

    /// Convert a device-local delay back into scheduler microseconds.
    pub fn to_scheduler(&mut self, local_delay_micros: u64) -> u64 {
        let exact = local_delay_micros as f64 * self.inv_deviation;
        let mut delay = exact.floor() as u64;
        self.backward_error += exact - exact.floor();
        if self.backward_error >= TICK {
            delay += 1;
            self.backward_error -= TICK;
        }
        delay
    }
}
