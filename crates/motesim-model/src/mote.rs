//! A simulated mote: cycle model + drift compensator + firmware policy.
//!
//! The mote never calls back into the simulation. Each dispatch returns an
//! outcome describing what the simulation loop must do next (reschedule the
//! mote, fan out a radio broadcast), which keeps ownership single-writer
//! and the run fully deterministic.

use crate::cycle::{CycleModel, DesyncFault};
use crate::drift::{DriftCompensator, InvalidDeviation};
use motesim_common::{Firmware, IrqLine, MoteControl, NodeId, SimTime};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::trace;

/// Result of an Exec dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Scheduler time of this mote's next Exec event.
    pub next_exec: SimTime,
    /// Firmware requested a radio broadcast during this dispatch.
    pub radio_sent: bool,
}

/// Result of an interrupt delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptOutcome {
    pub radio_sent: bool,
}

/// Firmware's window onto the CPU during one dispatch.
///
/// Collects the send request instead of acting on it; the mote reports it
/// upward through the dispatch outcome.
struct CpuView<'a> {
    cpu: &'a mut CycleModel,
    radio_sent: bool,
}

impl MoteControl for CpuView<'_> {
    fn cycles(&self) -> u64 {
        self.cpu.cycles()
    }

    fn is_sleeping(&self) -> bool {
        self.cpu.is_sleeping()
    }

    fn sleep(&mut self, duration_cycles: u64) {
        self.cpu.sleep(duration_cycles);
    }

    fn radio_enabled(&self) -> bool {
        self.cpu.irq_enabled(IrqLine::Radio)
    }

    fn set_radio_enabled(&mut self, enabled: bool) {
        self.cpu.set_irq_enabled(IrqLine::Radio, enabled);
    }

    fn radio_send(&mut self) {
        // A powered-down radio cannot transmit.
        if self.cpu.irq_enabled(IrqLine::Radio) {
            self.radio_sent = true;
        }
    }
}

/// One simulated node.
pub struct Mote {
    id: NodeId,
    /// Scheduler time of the most recent dispatch of any kind.
    t: SimTime,
    cpu: CycleModel,
    clock: DriftCompensator,
    firmware: Box<dyn Firmware>,
    /// Instruction-cost stream, derived from the simulation seed.
    rng: ChaCha8Rng,
    /// Local delay reported at the previous execute; bounds the next jump.
    local_budget: u64,
}

impl Mote {
    pub fn new(
        id: NodeId,
        deviation: f64,
        firmware: Box<dyn Firmware>,
        op_seed: u64,
    ) -> Result<Self, InvalidDeviation> {
        Ok(Mote {
            id,
            t: SimTime::ZERO,
            cpu: CycleModel::new(),
            clock: DriftCompensator::new(deviation)?,
            firmware,
            rng: ChaCha8Rng::seed_from_u64(op_seed),
            local_budget: 0,
        })
    }

    /// Execute dispatch: advance the local clock across the scheduler-time
    /// gap since the previous execute, run firmware if awake, and compute
    /// when the next execute is due.
    pub fn execute(&mut self, now: SimTime, duration: u64) -> Result<ExecOutcome, DesyncFault> {
        let jump = self.clock.to_local(now, self.local_budget);
        let wake_wait = self.cpu.advance(jump, duration, &mut self.rng)?;

        let mut radio_sent = false;
        let local_delay = if self.cpu.is_sleeping() {
            wake_wait
        } else {
            let mut view = CpuView {
                cpu: &mut self.cpu,
                radio_sent: false,
            };
            self.firmware.on_execute(&mut view);
            radio_sent = view.radio_sent;
            // The firmware may have just put the CPU to sleep.
            self.cpu.micros_until_wake()
        } + duration;

        let next_delay = self.clock.to_scheduler(local_delay);
        self.local_budget = local_delay;
        self.t = now;

        trace!(
            node = %self.id,
            now_us = now.as_micros(),
            jump,
            local_delay,
            next_delay,
            "execute dispatched"
        );

        Ok(ExecOutcome {
            next_exec: now + next_delay,
            radio_sent,
        })
    }

    /// Interrupt delivery. Does not advance local time; an enabled line
    /// wakes the CPU and hands control to firmware.
    pub fn interrupt(&mut self, now: SimTime, line: IrqLine) -> InterruptOutcome {
        self.t = now;

        let mut radio_sent = false;
        if self.cpu.interrupt(line) {
            let mut view = CpuView {
                cpu: &mut self.cpu,
                radio_sent: false,
            };
            self.firmware.on_interrupt(&mut view, line);
            radio_sent = view.radio_sent;
        }
        InterruptOutcome { radio_sent }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Scheduler time of the most recent dispatch.
    pub fn last_dispatch(&self) -> SimTime {
        self.t
    }

    /// Elapsed device-local microseconds.
    pub fn local_micros(&self) -> u64 {
        self.cpu.micros()
    }

    pub fn cycles(&self) -> u64 {
        self.cpu.cycles()
    }

    pub fn is_sleeping(&self) -> bool {
        self.cpu.is_sleeping()
    }

    pub fn deviation(&self) -> f64 {
        self.clock.deviation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Firmware that does nothing, for exercising the dispatch plumbing.
    struct Inert;

    impl Firmware for Inert {
        fn on_execute(&mut self, _cpu: &mut dyn MoteControl) {}
        fn on_interrupt(&mut self, _cpu: &mut dyn MoteControl, _line: IrqLine) {}
    }

    /// Firmware that sleeps a fixed cycle count on its first execute and
    /// sends a packet on every interrupt.
    struct SleepOnce {
        slept: bool,
        sleep_cycles: u64,
    }

    impl Firmware for SleepOnce {
        fn on_execute(&mut self, cpu: &mut dyn MoteControl) {
            if !self.slept {
                self.slept = true;
                cpu.sleep(self.sleep_cycles);
            }
        }

        fn on_interrupt(&mut self, cpu: &mut dyn MoteControl, _line: IrqLine) {
            cpu.radio_send();
        }
    }

    fn mote(deviation: f64, firmware: Box<dyn Firmware>) -> Mote {
        Mote::new(NodeId::new(0), deviation, firmware, 42).unwrap()
    }

    #[test]
    fn awake_mote_reschedules_after_one_tick() {
        let mut m = mote(1.0, Box::new(Inert));
        let out = m.execute(SimTime::ZERO, 1).unwrap();
        // No sleep, unity deviation: the next execute is one tick away.
        assert_eq!(out.next_exec, SimTime::from_micros(1));
        assert!(!out.radio_sent);
        assert_eq!(m.local_micros(), 0);
        assert!(m.cycles() >= 4);
    }

    #[test]
    fn dispatch_times_are_recorded() {
        let mut m = mote(1.0, Box::new(Inert));
        let mut now = SimTime::ZERO;
        for _ in 0..10 {
            let out = m.execute(now, 1).unwrap();
            assert!(out.next_exec > now);
            now = out.next_exec;
            assert_eq!(m.last_dispatch() + 1, now);
        }
    }

    #[test]
    fn firmware_sleep_stretches_the_schedule() {
        let mut m = mote(
            1.0,
            Box::new(SleepOnce {
                slept: false,
                sleep_cycles: 4000,
            }),
        );
        let out = m.execute(SimTime::ZERO, 1).unwrap();
        // 4000 cycles at 4 MHz is 1000 us of sleep, plus the exec tick.
        assert_eq!(out.next_exec, SimTime::from_micros(1001));
        assert!(m.is_sleeping());

        // The next execute lands on the wake deadline and resumes the
        // one-tick cadence.
        let out = m.execute(out.next_exec, 1).unwrap();
        assert_eq!(out.next_exec, SimTime::from_micros(1002));
    }

    #[test]
    fn slow_clock_advances_locally_slower() {
        let mut m = mote(0.5, Box::new(Inert));
        let mut now = SimTime::ZERO;
        for _ in 0..100 {
            now = m.execute(now, 1).unwrap().next_exec;
        }
        let sched = now.as_micros() as f64;
        let local = m.local_micros() as f64;
        assert!((local / sched - 0.5).abs() < 0.05);
    }

    #[test]
    fn interrupt_wakes_and_runs_firmware() {
        let mut m = mote(
            1.0,
            Box::new(SleepOnce {
                slept: false,
                sleep_cycles: 4000,
            }),
        );
        m.execute(SimTime::ZERO, 1).unwrap();
        assert!(m.is_sleeping());

        let out = m.interrupt(SimTime::from_micros(10), IrqLine::Radio);
        assert!(out.radio_sent);
        assert!(!m.is_sleeping());
        assert_eq!(m.last_dispatch(), SimTime::from_micros(10));
    }

    #[test]
    fn interrupt_on_disabled_line_is_dropped() {
        let mut m = mote(1.0, Box::new(Inert));

        struct RadioOff;
        impl Firmware for RadioOff {
            fn on_execute(&mut self, cpu: &mut dyn MoteControl) {
                cpu.set_radio_enabled(false);
            }
            fn on_interrupt(&mut self, cpu: &mut dyn MoteControl, _line: IrqLine) {
                cpu.radio_send();
            }
        }
        let mut m2 = mote(1.0, Box::new(RadioOff));
        m2.execute(SimTime::ZERO, 1).unwrap();
        let out = m2.interrupt(SimTime::from_micros(5), IrqLine::Radio);
        assert!(!out.radio_sent);

        // Sanity: with the line enabled the same delivery reaches firmware.
        let out = m.interrupt(SimTime::from_micros(5), IrqLine::Radio);
        assert!(!out.radio_sent); // Inert firmware never sends
    }
}
