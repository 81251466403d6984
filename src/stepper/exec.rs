//! Step execution engine.
//!
//! The engine is the body of the stepper timer interrupt. It pops
//! precomputed segments from the ring and traces them with a multi-axis
//! Bresenham algorithm, emitting step bits and advancing the machine
//! position counters. All heavy lifting was done by the preparer; the
//! interrupt path is integer-only, allocation-free, and bounded by the
//! fixed axis count.
//!
//! A companion pulse-reset interrupt fires at 75% of each timer period and
//! returns every step line to its idle level, which fixes the step pulse
//! width at a quarter of the current period.

use crate::config::consts::{N_AXIS, STEP_TIMER_MIN};
use crate::hal::{ProbeMonitor, SpindleControl, StepperPort};
use crate::system::{AxisMask, MachineState};

use super::segment::Segment;
use super::StepperCore;

/// Running state of the execution engine.
#[derive(Debug, Default)]
pub(crate) struct ExecState {
    /// Bresenham accumulators, seeded to half the event count per block.
    pub counter: [u32; N_AXIS],
    /// Per-tick Bresenham increments for the current segment.
    pub steps: [u32; N_AXIS],
    /// Step bits computed this tick, driven at the start of the next.
    pub step_outbits: AxisMask,
    /// Direction bits with polarity inversion applied.
    pub dir_outbits: AxisMask,
    /// Step events remaining in the current segment.
    pub step_count: u16,
    /// Block pool index bound to the engine, if any.
    pub exec_block: Option<usize>,
    /// Segment being executed; `None` means load the next one.
    pub exec_segment: Option<Segment>,
}

/// Pulse reset fires at 75% of the period, making the pulse width 25%.
fn pulse_reset_compare(cycles_per_tick: u16) -> u16 {
    (u32::from(cycles_per_tick) * 3 / 4) as u16
}

impl StepperCore {
    /// Main stepper interrupt body.
    ///
    /// Must complete before the next timer tick; at the highest supported
    /// step rate that is roughly 33 microseconds.
    pub fn main_isr<P, S, PR>(&mut self, port: &mut P, spindle: &mut S, probe: &mut PR)
    where
        P: StepperPort,
        S: SpindleControl,
        PR: ProbeMonitor,
    {
        // Drive the step edges decided on the previous tick.
        for axis in 0..N_AXIS {
            if self.st.step_outbits.contains(axis) {
                port.set_step(axis, !self.step_invert_mask.contains(axis));
            }
        }

        // Load the next segment if the previous one completed.
        if self.st.exec_segment.is_none() {
            match self.ring.peek() {
                Some(mut segment) => {
                    if segment.cycles_per_tick < STEP_TIMER_MIN {
                        segment.cycles_per_tick = STEP_TIMER_MIN;
                    }
                    port.set_timer_reload(segment.cycles_per_tick);
                    port.set_pulse_compare(pulse_reset_compare(segment.cycles_per_tick));
                    self.st.step_count = segment.n_step;

                    // A changed block index marks a new block: reseed the
                    // Bresenham accumulators.
                    if self.st.exec_block != Some(segment.st_block_index) {
                        self.st.exec_block = Some(segment.st_block_index);
                        let half =
                            self.blocks.entries[segment.st_block_index].step_event_count >> 1;
                        self.st.counter = [half; N_AXIS];
                    }

                    let block = &self.blocks.entries[segment.st_block_index];
                    self.st.dir_outbits = block.direction_bits ^ self.dir_invert_mask;
                    for axis in 0..N_AXIS {
                        self.st.steps[axis] = block.steps[axis] >> segment.amass_level;
                    }

                    // Direction lines go out before the first step pulse so
                    // driver setup time is honored.
                    for axis in 0..N_AXIS {
                        port.set_dir(axis, self.st.dir_outbits.contains(axis));
                    }

                    spindle.set_speed(segment.spindle_pwm);
                    self.st.exec_segment = Some(segment);
                }
                None => {
                    // Ring drained: shut down and flag the cycle end.
                    self.disable(port, false);
                    if let Some(index) = self.st.exec_block {
                        if self.blocks.entries[index].is_pwm_rate_adjusted {
                            spindle.set_speed(S::PWM_OFF);
                        }
                    }
                    self.cycle_stop = true;
                    return;
                }
            }
        }

        if probe.is_active() {
            probe.state_monitor(&self.position);
        }

        self.st.step_outbits = AxisMask::NONE;

        let Some(segment) = self.st.exec_segment else {
            return;
        };
        let Some(block_index) = self.st.exec_block else {
            return;
        };
        let block = self.blocks.entries[block_index];

        // Bresenham tick: accumulate, pulse on rollover, commit position.
        for axis in 0..N_AXIS {
            self.st.counter[axis] += self.st.steps[axis];
            if self.st.counter[axis] > block.step_event_count {
                self.st.step_outbits.set(axis);
                self.st.counter[axis] -= block.step_event_count;

                if !segment.backlash_motion {
                    if block.direction_bits.contains(axis) {
                        self.position[axis] -= 1;
                    } else {
                        self.position[axis] += 1;
                    }
                }
            }
        }

        // During homing, suppress pulses on axes that are not being homed.
        if self.state == MachineState::Homing {
            self.st.step_outbits &= self.homing_axis_lock;
        }

        self.st.step_count -= 1;
        if self.st.step_count == 0 {
            self.st.exec_segment = None;
            self.ring.advance_tail();
        }
    }

    /// Pulse reset interrupt body: return every step line to its idle
    /// level. Direction lines are untouched.
    pub fn pulse_reset_isr<P: StepperPort>(&self, port: &mut P) {
        for axis in 0..N_AXIS {
            port.set_step(axis, self.step_invert_mask.contains(axis));
        }
    }
}
