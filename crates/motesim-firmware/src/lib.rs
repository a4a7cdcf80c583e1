//! # motesim-firmware
//!
//! Firmware behavior policies for simulated motes. A policy decides when
//! its mote transmits, powers the radio up or down, and sleeps; it acts
//! only through the [`MoteControl`] capability surface and cannot touch
//! the event queue.
//!
//! Policies are selected per node at creation time through
//! [`FirmwareSpec`], which builds a boxed [`Firmware`] from a validated
//! config and a seed derived from the simulation's root generator.

use motesim_common::{Firmware, IrqLine, MoteControl};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// Firmware configuration rejected at build time.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FirmwareError {
    #[error("send probability {0} out of range [0, 1]")]
    InvalidSendProbability(f64),

    #[error("empty cycle range: min {min} exceeds max {max}")]
    EmptyCycleRange { min: u64, max: u64 },
}

fn check_probability(p: f64) -> Result<(), FirmwareError> {
    if !(0.0..=1.0).contains(&p) {
        return Err(FirmwareError::InvalidSendProbability(p));
    }
    Ok(())
}

fn check_range(min: u64, max: u64) -> Result<(), FirmwareError> {
    if min > max {
        return Err(FirmwareError::EmptyCycleRange { min, max });
    }
    Ok(())
}

// ============================================================================
// Null Firmware
// ============================================================================

/// Does nothing: ignores interrupts, never transmits, never sleeps.
#[derive(Debug, Default)]
pub struct NullFirmware;

impl Firmware for NullFirmware {
    fn on_execute(&mut self, _cpu: &mut dyn MoteControl) {}

    fn on_interrupt(&mut self, _cpu: &mut dyn MoteControl, _line: IrqLine) {}
}

// ============================================================================
// Random Firmware
// ============================================================================

/// Configuration for [`RandomFirmware`].
///
/// Cycle ranges are closed intervals; a fresh period is drawn from them at
/// every phase change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomFirmwareConfig {
    pub min_exec_cycles: u64,
    pub max_exec_cycles: u64,
    pub min_sleep_cycles: u64,
    pub max_sleep_cycles: u64,
    /// Probability of transmitting at the end of an execute phase.
    pub send_probability: f64,
}

impl Default for RandomFirmwareConfig {
    fn default() -> Self {
        RandomFirmwareConfig {
            min_exec_cycles: 60,
            max_exec_cycles: 120,
            min_sleep_cycles: 7000,
            max_sleep_cycles: 8000,
            send_probability: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Execute,
    Send,
    Sleep,
}

/// Duty-cycled node behavior:
///
/// ```text
/// [ radio on, execute ] -> [ maybe send ] -> [ radio off, sleep ] -> repeat
/// ```
///
/// Execute runs until a randomly drawn cycle budget elapses, Send
/// transmits with the configured probability and powers the radio down for
/// a randomly drawn sleep, and waking re-arms the radio and a fresh
/// execute budget.
pub struct RandomFirmware {
    config: RandomFirmwareConfig,
    rng: ChaCha8Rng,
    phase: Phase,
    /// Cycle counter reading when the current execute phase began.
    exec_started_at: u64,
    exec_period: u64,
}

impl RandomFirmware {
    pub fn new(config: RandomFirmwareConfig, seed: u64) -> Result<Self, FirmwareError> {
        check_probability(config.send_probability)?;
        check_range(config.min_exec_cycles, config.max_exec_cycles)?;
        check_range(config.min_sleep_cycles, config.max_sleep_cycles)?;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let exec_period = rng.gen_range(config.min_exec_cycles..=config.max_exec_cycles);
        Ok(RandomFirmware {
            config,
            rng,
            phase: Phase::Execute,
            exec_started_at: 0,
            exec_period,
        })
    }
}

impl Firmware for RandomFirmware {
    fn on_execute(&mut self, cpu: &mut dyn MoteControl) {
        match self.phase {
            Phase::Execute => {
                if cpu.cycles() - self.exec_started_at > self.exec_period {
                    self.phase = Phase::Send;
                }
            }
            Phase::Send => {
                if self.rng.gen::<f64>() < self.config.send_probability {
                    cpu.radio_send();
                }
                let sleep_cycles = self
                    .rng
                    .gen_range(self.config.min_sleep_cycles..=self.config.max_sleep_cycles);
                trace!(sleep_cycles, "phase complete, powering down");
                cpu.set_radio_enabled(false);
                cpu.sleep(sleep_cycles);
                self.phase = Phase::Sleep;
            }
            Phase::Sleep => {
                // Only reached once the CPU is awake again.
                if !cpu.is_sleeping() {
                    cpu.set_radio_enabled(true);
                    self.exec_started_at = cpu.cycles();
                    self.exec_period = self
                        .rng
                        .gen_range(self.config.min_exec_cycles..=self.config.max_exec_cycles);
                    self.phase = Phase::Execute;
                }
            }
        }
    }

    fn on_interrupt(&mut self, _cpu: &mut dyn MoteControl, _line: IrqLine) {
        // Receptions are counted by the simulation, not acted upon here.
    }
}

// ============================================================================
// No-Sleep Firmware
// ============================================================================

/// Configuration for [`NoSleepFirmware`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoSleepFirmwareConfig {
    pub min_exec_cycles: u64,
    pub max_exec_cycles: u64,
    pub send_probability: f64,
}

impl Default for NoSleepFirmwareConfig {
    fn default() -> Self {
        NoSleepFirmwareConfig {
            min_exec_cycles: 1000,
            max_exec_cycles: 20000,
            send_probability: 0.3,
        }
    }
}

/// Like [`RandomFirmware`] but never sleeps: execute, maybe send, and
/// immediately start the next execute budget.
pub struct NoSleepFirmware {
    config: NoSleepFirmwareConfig,
    rng: ChaCha8Rng,
    exec_started_at: u64,
    exec_period: u64,
}

impl NoSleepFirmware {
    pub fn new(config: NoSleepFirmwareConfig, seed: u64) -> Result<Self, FirmwareError> {
        check_probability(config.send_probability)?;
        check_range(config.min_exec_cycles, config.max_exec_cycles)?;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let exec_period = rng.gen_range(config.min_exec_cycles..=config.max_exec_cycles);
        Ok(NoSleepFirmware {
            config,
            rng,
            exec_started_at: 0,
            exec_period,
        })
    }
}

impl Firmware for NoSleepFirmware {
    fn on_execute(&mut self, cpu: &mut dyn MoteControl) {
        if cpu.cycles() - self.exec_started_at > self.exec_period {
            if self.rng.gen::<f64>() < self.config.send_probability {
                cpu.radio_send();
            }
            self.exec_started_at = cpu.cycles();
            self.exec_period = self
                .rng
                .gen_range(self.config.min_exec_cycles..=self.config.max_exec_cycles);
        }
    }

    fn on_interrupt(&mut self, _cpu: &mut dyn MoteControl, _line: IrqLine) {}
}

// ============================================================================
// Policy Selection
// ============================================================================

/// Firmware selection for a node, as it appears in scenario files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FirmwareSpec {
    Null,
    Random(RandomFirmwareConfig),
    NoSleep(NoSleepFirmwareConfig),
}

impl Default for FirmwareSpec {
    fn default() -> Self {
        FirmwareSpec::Random(RandomFirmwareConfig::default())
    }
}

impl FirmwareSpec {
    /// Validate the config and build the policy with its own seeded
    /// random stream.
    pub fn build(&self, seed: u64) -> Result<Box<dyn Firmware>, FirmwareError> {
        match self {
            FirmwareSpec::Null => Ok(Box::new(NullFirmware)),
            FirmwareSpec::Random(config) => {
                Ok(Box::new(RandomFirmware::new(config.clone(), seed)?))
            }
            FirmwareSpec::NoSleep(config) => {
                Ok(Box::new(NoSleepFirmware::new(config.clone(), seed)?))
            }
        }
    }
}
