//! Fixed-frequency hardware cycle and sleep model.
//!
//! Models a mote's CPU as an integer cycle counter driven at a nominal DCO
//! frequency, with a low-power sleep state and a wake-cycle deadline.
//! Elapsed device-local microseconds arrive as "jumps" from the mote's
//! drift compensator; the model converts them to a cycle deadline and
//! advances the counter in emulated-instruction steps.

use motesim_common::IrqLine;
use rand::Rng;
use thiserror::Error;

/// Nominal DCO frequency of the modeled CPU.
pub const DCO_FREQ_HZ: u64 = 4_000_000;

const MICROS_PER_SEC: u64 = 1_000_000;

/// Cycle cost range of one emulated instruction.
const MIN_OP_CYCLES: u64 = 1;
const MAX_OP_CYCLES: u64 = 6;

/// The cycle model was asked to account for more local time than it can.
///
/// Always fatal: it means the caller's drift compensation produced a jump
/// the hardware model cannot honor, which is a correctness bug rather than
/// a runtime condition.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DesyncFault {
    #[error("jump beyond wake deadline (deadline={deadline} cycles, wake={wake})")]
    JumpBeyondWake { deadline: u64, wake: u64 },

    #[error("jump beyond current cycles (deadline={deadline} cycles, cycles={cycles})")]
    JumpBeyondCycles { deadline: u64, cycles: u64 },
}

/// Cycle counter, sleep state, and IRQ line enables of one mote.
#[derive(Debug)]
pub struct CycleModel {
    /// Elapsed device-local microseconds.
    micros: u64,
    /// Hardware cycle counter; monotonically non-decreasing.
    cycles: u64,
    /// Cycle count at which a sleeping CPU wakes.
    wake_deadline: u64,
    sleeping: bool,
    radio_irq_enabled: bool,
}

impl Default for CycleModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleModel {
    /// A freshly powered-on CPU: awake, all counters at zero, radio IRQ
    /// line enabled.
    pub fn new() -> Self {
        CycleModel {
            micros: 0,
            cycles: 0,
            wake_deadline: 0,
            sleeping: false,
            radio_irq_enabled: true,
        }
    }

    /// Account for `jump_micros` of device-local time, then run the CPU for
    /// `exec_duration_micros`.
    ///
    /// The jump must land within what the model can account for: while
    /// sleeping the implied cycle deadline may not pass the wake deadline,
    /// and while awake it may not pass the current cycle counter. A
    /// violation is a fatal [`DesyncFault`].
    ///
    /// Returns the microseconds remaining until wake if the CPU is still
    /// sleeping afterwards, 0 otherwise.
    pub fn advance(
        &mut self,
        jump_micros: u64,
        exec_duration_micros: u64,
        rng: &mut impl Rng,
    ) -> Result<u64, DesyncFault> {
        self.micros += jump_micros;

        let deadline = self.micros * DCO_FREQ_HZ / MICROS_PER_SEC;
        if self.sleeping {
            if deadline > self.wake_deadline {
                return Err(DesyncFault::JumpBeyondWake {
                    deadline,
                    wake: self.wake_deadline,
                });
            }
        } else if deadline > self.cycles {
            return Err(DesyncFault::JumpBeyondCycles {
                deadline,
                cycles: self.cycles,
            });
        }

        let deadline = (self.micros + exec_duration_micros) * DCO_FREQ_HZ / MICROS_PER_SEC;
        while self.cycles < deadline {
            if self.sleeping {
                // A sleeping CPU burns no instructions; the counter jumps
                // straight to the deadline or the wake point.
                self.cycles = deadline.min(self.wake_deadline);
                if self.cycles >= self.wake_deadline {
                    self.sleeping = false;
                }
            } else {
                self.cycles += rng.gen_range(MIN_OP_CYCLES..=MAX_OP_CYCLES);
            }
        }

        Ok(self.micros_until_wake())
    }

    /// Enter sleep for `duration_cycles` cycles from now.
    pub fn sleep(&mut self, duration_cycles: u64) {
        self.sleeping = true;
        self.wake_deadline = self.cycles + duration_cycles;
    }

    /// Deliver an interrupt. An enabled line wakes the CPU and returns
    /// true so the caller can forward control to firmware; a disabled line
    /// is silently ignored.
    pub fn interrupt(&mut self, line: IrqLine) -> bool {
        if !self.irq_enabled(line) {
            return false;
        }
        self.sleeping = false;
        true
    }

    pub fn irq_enabled(&self, line: IrqLine) -> bool {
        match line {
            IrqLine::Radio => self.radio_irq_enabled,
        }
    }

    pub fn set_irq_enabled(&mut self, line: IrqLine, enabled: bool) {
        match line {
            IrqLine::Radio => self.radio_irq_enabled = enabled,
        }
    }

    /// Microseconds until the wake deadline, 0 when awake.
    pub fn micros_until_wake(&self) -> u64 {
        if self.sleeping {
            (self.wake_deadline - self.cycles) * MICROS_PER_SEC / DCO_FREQ_HZ
        } else {
            0
        }
    }

    pub fn micros(&self) -> u64 {
        self.micros
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }
}
