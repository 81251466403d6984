//! Segment preparer.
//!
//! Runs in the foreground and keeps the segment ring full. Each pass checks
//! a planner block out of the queue, computes its velocity profile from the
//! entry/exit/nominal speeds, and integrates the profile over fixed time
//! slices to produce segments: an integer step count plus a timer reload
//! value. All floating point in the crate lives here.
//!
//! Step counts per segment come from the round-up difference of the
//! remaining step distance, not from tallying per-segment steps, so float
//! round-off never accumulates. The time cost of each segment's fractional
//! step is carried into the next segment (`dt_remainder`), which keeps the
//! integrated step rate exactly on the planned profile.

use libm::{ceilf, sqrtf};

use crate::config::consts::{
    AMASS_LEVEL1, AMASS_LEVEL2, AMASS_LEVEL3, DT_SEGMENT, REQ_MM_INCREMENT_SCALAR,
    TICKS_PER_MICROSECOND,
};
use crate::hal::SpindleControl;
use crate::planner::{Planner, PlannerBlock, SpindleMode};
use crate::system::MachineState;

use super::block::BlockPool;
use super::segment::Segment;
use super::StepperCore;

const RECALCULATE: u8 = 1 << 0;
const HOLD_PARTIAL_BLOCK: u8 = 1 << 1;
const PARKING: u8 = 1 << 2;
const DECEL_OVERRIDE: u8 = 1 << 3;

/// Preparer-private flag word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct PrepFlags(u8);

impl PrepFlags {
    pub(crate) fn recalculate(self) -> bool {
        self.0 & RECALCULATE != 0
    }

    pub(crate) fn set_recalculate(&mut self) {
        self.0 |= RECALCULATE;
    }

    pub(crate) fn clear_recalculate(&mut self) {
        self.0 &= !RECALCULATE;
    }

    pub(crate) fn hold_partial_block(self) -> bool {
        self.0 & HOLD_PARTIAL_BLOCK != 0
    }

    pub(crate) fn set_hold_partial_block(&mut self) {
        self.0 |= HOLD_PARTIAL_BLOCK;
    }

    pub(crate) fn parking(self) -> bool {
        self.0 & PARKING != 0
    }

    pub(crate) fn set_parking(&mut self) {
        self.0 |= PARKING;
    }

    pub(crate) fn hold_partial_and_recalculate() -> Self {
        PrepFlags(HOLD_PARTIAL_BLOCK | RECALCULATE)
    }

    pub(crate) fn decel_override(self) -> bool {
        self.0 & DECEL_OVERRIDE != 0
    }

    pub(crate) fn set_decel_override(&mut self) {
        self.0 |= DECEL_OVERRIDE;
    }

    pub(crate) fn clear_decel_override(&mut self) {
        self.0 &= !DECEL_OVERRIDE;
    }
}

/// Ramp sub-phase of the velocity profile being traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum RampType {
    /// Accelerating toward the profile maximum.
    #[default]
    Accel,
    /// Holding the profile maximum.
    Cruise,
    /// Decelerating toward the exit speed.
    Decel,
    /// Decelerating from an above-nominal entry speed after an override
    /// reduction; collapses into cruise.
    DecelOverride,
}

/// Which planner slot the active block came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockSource {
    /// Head of the planner queue.
    Queued,
    /// One-off system motion (homing/parking).
    SystemMotion,
}

/// Prep state snapshot for resuming a partially consumed block after a
/// parking interlude.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ParkingSnapshot {
    st_block_index: usize,
    steps_remaining: f32,
    step_per_mm: f32,
    dt_remainder: f32,
}

/// Segment preparation state.
#[derive(Debug, Default)]
pub(crate) struct PrepState {
    /// Pool index of the block being prepped.
    pub st_block_index: usize,
    pub flags: PrepFlags,

    /// Time cost of the previous segment's fractional step, in minutes.
    pub dt_remainder: f32,
    /// Steps left in the active block, tracked in floating point.
    pub steps_remaining: f32,
    pub step_per_mm: f32,
    /// Travel that guarantees at least one step per segment.
    pub req_mm_increment: f32,

    pub ramp_type: RampType,
    /// Where the velocity profile ends, measured in mm from block end.
    /// Nonzero only for a feed hold that bottoms out mid-block.
    pub mm_complete: f32,
    /// Speed at the end of the last prepared segment (mm/min).
    pub current_speed: f32,
    /// Profile maximum; not always the nominal speed.
    pub maximum_speed: f32,
    pub exit_speed: f32,
    /// Acceleration ramp end, in mm remaining from block end.
    pub accelerate_until: f32,
    /// Deceleration ramp start, in mm remaining from block end.
    pub decelerate_after: f32,

    /// Inverse programmed rate, precomputed for laser PWM scaling.
    pub inv_rate: f32,
    pub current_spindle_pwm: u8,

    /// Active block source; `None` forces a (re)load on the next pass.
    pub active: Option<BlockSource>,
    /// Working copy of the active planner block.
    pub block: PlannerBlock,
    /// Parking resume snapshot.
    pub last: ParkingSnapshot,
}

fn fetch_block<PL: Planner>(planner: &mut PL, source: BlockSource) -> Option<&mut PlannerBlock> {
    match source {
        BlockSource::Queued => planner.current_block(),
        BlockSource::SystemMotion => planner.system_motion_block(),
    }
}

impl StepperCore {
    /// Fill the segment ring from the planner queue.
    ///
    /// Called continuously from the main program. Returns immediately when
    /// the ring is full, when the planner has no block to offer, or while
    /// motion is ending. Computation units are steps, millimeters, and
    /// minutes.
    #[allow(clippy::float_cmp)]
    pub fn prepare_buffer<PL, S>(&mut self, planner: &mut PL, spindle: &S)
    where
        PL: Planner,
        S: SpindleControl,
    {
        if self.step_control.end_motion() {
            return;
        }

        while !self.ring.is_full() {
            // Load a new planner block, or recompute the profile of the
            // active one after a plan update.
            if self.prep.active.is_none() {
                let source = if self.step_control.execute_sys_motion() {
                    BlockSource::SystemMotion
                } else {
                    BlockSource::Queued
                };
                let hold = self.step_control.execute_hold();

                {
                    let Some(block) = fetch_block(planner, source) else {
                        return;
                    };

                    if self.prep.flags.recalculate() {
                        // Plan update: only the velocity profile changes;
                        // Bresenham data and progress are preserved.
                        if self.prep.flags.parking() {
                            self.prep.flags.clear_recalculate();
                        } else {
                            self.prep.flags = PrepFlags::default();
                        }
                    } else {
                        // Check the block out into the next pool entry.
                        self.prep.st_block_index =
                            BlockPool::next_index(self.prep.st_block_index);
                        self.blocks.entries[self.prep.st_block_index].load(block);

                        self.prep.steps_remaining = block.step_event_count as f32;
                        self.prep.step_per_mm = self.prep.steps_remaining / block.millimeters;
                        self.prep.req_mm_increment =
                            REQ_MM_INCREMENT_SCALAR / self.prep.step_per_mm;
                        self.prep.dt_remainder = 0.0;

                        if hold || self.prep.flags.decel_override() {
                            // Block loaded mid-hold: override the entry
                            // speed to keep decelerating.
                            self.prep.current_speed = self.prep.exit_speed;
                            block.entry_speed_sqr = self.prep.exit_speed * self.prep.exit_speed;
                            self.prep.flags.clear_decel_override();
                        } else {
                            self.prep.current_speed = sqrtf(block.entry_speed_sqr);
                        }

                        // Laser mode: PWM-rate-adjusted motions always
                        // complete with the spindle off.
                        let prep_block = &mut self.blocks.entries[self.prep.st_block_index];
                        prep_block.is_pwm_rate_adjusted = false;
                        if self.settings.laser_mode && block.spindle == SpindleMode::Ccw {
                            self.prep.inv_rate = 1.0 / block.programmed_rate;
                            prep_block.is_pwm_rate_adjusted = true;
                        }
                    }

                    self.prep.block = *block;
                }

                self.prep.active = Some(source);
                self.compute_velocity_profile(planner, source, hold);
                self.step_control.set_update_spindle_pwm();
            }

            let Some(source) = self.prep.active else {
                return;
            };

            let (mut dt, mm_remaining) = self.integrate_segment();

            // Spindle PWM for this segment.
            let rate_adjusted = self.blocks.entries[self.prep.st_block_index].is_pwm_rate_adjusted;
            if rate_adjusted || self.step_control.update_spindle_pwm() {
                if self.prep.block.spindle.is_on() {
                    let mut rpm = self.prep.block.spindle_speed;
                    // Feed overrides do not alter laser power per distance.
                    if rate_adjusted {
                        rpm *= self.prep.current_speed * self.prep.inv_rate;
                    }
                    self.prep.current_spindle_pwm = spindle.compute_pwm_value(rpm);
                } else {
                    self.prep.current_spindle_pwm = S::PWM_OFF;
                }
                self.step_control.clear_update_spindle_pwm();
            }

            // Segment step count from the round-up difference of the
            // remaining steps.
            let step_dist_remaining = self.prep.step_per_mm * mm_remaining;
            let n_steps_remaining = ceilf(step_dist_remaining);
            let last_n_steps_remaining = ceilf(self.prep.steps_remaining);
            let mut n_step = (last_n_steps_remaining - n_steps_remaining) as u16;

            if n_step == 0 && self.step_control.execute_hold() {
                // Less than one step to decelerate to zero, and smoothing
                // requires whole steps. Bail; prep state is kept for the
                // resume.
                self.step_control.set_end_motion();
                if !self.prep.flags.parking() {
                    self.prep.flags.set_hold_partial_block();
                }
                return;
            }

            // Apply the previous segment's partial-step time, then compute
            // the adjusted step rate inverse for this segment.
            dt += self.prep.dt_remainder;
            let inv_rate = dt / (last_n_steps_remaining - step_dist_remaining);

            let mut cycles =
                ceilf((TICKS_PER_MICROSECOND as f32 * 1_000_000.0 * 60.0) * inv_rate) as u32;

            // Select the smoothing level; every level halves the tick
            // period and doubles the tick count.
            let amass_level: u8 = if cycles < AMASS_LEVEL1 {
                0
            } else {
                let level = if cycles < AMASS_LEVEL2 {
                    1
                } else if cycles < AMASS_LEVEL3 {
                    2
                } else {
                    3
                };
                cycles >>= level;
                n_step <<= level;
                level
            };

            let cycles_per_tick = if cycles < (1u32 << 16) {
                cycles as u16
            } else {
                // Slowest representable rate.
                0xFFFF
            };

            *self.ring.write_slot() = Segment {
                n_step,
                cycles_per_tick,
                st_block_index: self.prep.st_block_index,
                amass_level,
                spindle_pwm: self.prep.current_spindle_pwm,
                backlash_motion: self.prep.block.backlash_motion,
            };
            self.ring.publish();

            // Commit progress to the planner so mid-block re-planning sees
            // the remaining distance.
            self.prep.block.millimeters = mm_remaining;
            if let Some(block) = fetch_block(planner, source) {
                block.millimeters = mm_remaining;
            }
            self.prep.steps_remaining = n_steps_remaining;
            self.prep.dt_remainder = (n_steps_remaining - step_dist_remaining) * inv_rate;

            if mm_remaining == self.prep.mm_complete {
                if mm_remaining > 0.0 {
                    // Forced termination: the hold bottomed out mid-block.
                    // Let the engine drain the queue; the host restarts
                    // prep once the cycle stop lands.
                    self.step_control.set_end_motion();
                    if !self.prep.flags.parking() {
                        self.prep.flags.set_hold_partial_block();
                    }
                    return;
                }

                // Block fully consumed.
                if source == BlockSource::SystemMotion {
                    self.step_control.set_end_motion();
                    return;
                }
                self.prep.active = None;
                planner.discard_current_block();
            }
        }
    }

    /// Compute or recompute the velocity profile of the active block.
    ///
    /// The profile is parameterized from the end of the block backward:
    /// `accelerate_until` and `decelerate_after` are millimeters remaining
    /// from block end. A feed hold overrides the plan with a forced
    /// deceleration to zero speed.
    #[allow(clippy::float_cmp)]
    fn compute_velocity_profile<PL: Planner>(
        &mut self,
        planner: &PL,
        source: BlockSource,
        hold: bool,
    ) {
        self.prep.mm_complete = 0.0;
        let acceleration = self.prep.block.acceleration;
        let millimeters = self.prep.block.millimeters;
        let entry_speed_sqr = self.prep.block.entry_speed_sqr;
        let inv_2_accel = 0.5 / acceleration;

        if hold {
            self.prep.ramp_type = RampType::Decel;
            let decel_dist = millimeters - inv_2_accel * entry_speed_sqr;

            if decel_dist < 0.0 {
                // The hold cannot finish within this block.
                self.prep.exit_speed =
                    sqrtf(entry_speed_sqr - 2.0 * acceleration * millimeters);
            } else {
                self.prep.mm_complete = decel_dist;
                self.prep.exit_speed = 0.0;
            }
            return;
        }

        self.prep.ramp_type = RampType::Accel;
        self.prep.accelerate_until = millimeters;

        let exit_speed_sqr = if source == BlockSource::SystemMotion {
            // System motions always stop at block end.
            self.prep.exit_speed = 0.0;
            0.0
        } else {
            let sqr = planner.exec_block_exit_speed_sqr();
            self.prep.exit_speed = sqrtf(sqr);
            sqr
        };

        let nominal_speed = planner.compute_profile_nominal_speed(&self.prep.block);
        let nominal_speed_sqr = nominal_speed * nominal_speed;
        let intersect_distance =
            0.5 * (millimeters + inv_2_accel * (entry_speed_sqr - exit_speed_sqr));

        if entry_speed_sqr > nominal_speed_sqr {
            // Only occurs on feed override reductions.
            self.prep.accelerate_until =
                millimeters - inv_2_accel * (entry_speed_sqr - nominal_speed_sqr);

            if self.prep.accelerate_until <= 0.0 {
                // Deceleration through the whole block. The exit speed no
                // longer matches the plan; flag the next block to keep
                // decelerating from it.
                self.prep.ramp_type = RampType::Decel;
                self.prep.exit_speed =
                    sqrtf(entry_speed_sqr - 2.0 * acceleration * millimeters);
                self.prep.flags.set_decel_override();
            } else {
                self.prep.decelerate_after = inv_2_accel * (nominal_speed_sqr - exit_speed_sqr);
                self.prep.maximum_speed = nominal_speed;
                self.prep.ramp_type = RampType::DecelOverride;
            }
        } else if intersect_distance > 0.0 {
            if intersect_distance < millimeters {
                // Trapezoid or triangle. For acceleration-cruise and
                // cruise-only types the deceleration length comes out 0.
                self.prep.decelerate_after = inv_2_accel * (nominal_speed_sqr - exit_speed_sqr);

                if self.prep.decelerate_after < intersect_distance {
                    self.prep.maximum_speed = nominal_speed;

                    if entry_speed_sqr == nominal_speed_sqr {
                        // Cruise-deceleration or cruise-only.
                        self.prep.ramp_type = RampType::Cruise;
                    } else {
                        // Full trapezoid or acceleration-cruise.
                        self.prep.accelerate_until -=
                            inv_2_accel * (nominal_speed_sqr - entry_speed_sqr);
                    }
                } else {
                    // Triangle: no cruise phase.
                    self.prep.accelerate_until = intersect_distance;
                    self.prep.decelerate_after = intersect_distance;
                    self.prep.maximum_speed =
                        sqrtf(2.0 * acceleration * intersect_distance + exit_speed_sqr);
                }
            } else {
                // Deceleration only.
                self.prep.ramp_type = RampType::Decel;
            }
        } else {
            // Acceleration only.
            self.prep.accelerate_until = 0.0;
            self.prep.maximum_speed = self.prep.exit_speed;
        }
    }

    /// Integrate the velocity profile over one segment time slice.
    ///
    /// Accumulates time across ramp junctions within the slice; when the
    /// remaining distance would hold less than one step, the slice is
    /// extended so every emitted segment carries at least one step. Returns
    /// the integrated time and the distance remaining from block end.
    #[allow(clippy::float_cmp)]
    fn integrate_segment(&mut self) -> (f32, f32) {
        let acceleration = self.prep.block.acceleration;
        let block_mm = self.prep.block.millimeters;

        let mut dt_max = DT_SEGMENT;
        let mut dt = 0.0f32;
        let mut time_var = dt_max;
        let mut mm_var: f32;
        let mut speed_var: f32;
        let mut mm_remaining = block_mm;
        let minimum_mm = (mm_remaining - self.prep.req_mm_increment).max(0.0);

        loop {
            match self.prep.ramp_type {
                RampType::DecelOverride => {
                    speed_var = acceleration * time_var;
                    mm_var = time_var * (self.prep.current_speed - 0.5 * speed_var);
                    mm_remaining -= mm_var;

                    if mm_remaining < self.prep.accelerate_until || mm_var <= 0.0 {
                        // Override ramp met the plan; collapse into cruise.
                        mm_remaining = self.prep.accelerate_until;
                        time_var = 2.0 * (block_mm - mm_remaining)
                            / (self.prep.current_speed + self.prep.maximum_speed);
                        self.prep.ramp_type = RampType::Cruise;
                        self.prep.current_speed = self.prep.maximum_speed;
                    } else {
                        self.prep.current_speed -= speed_var;
                    }
                }
                RampType::Accel => {
                    speed_var = acceleration * time_var;
                    mm_remaining -= time_var * (self.prep.current_speed + 0.5 * speed_var);

                    if mm_remaining < self.prep.accelerate_until {
                        // End of the acceleration ramp: junction into
                        // cruise, deceleration, or block end.
                        mm_remaining = self.prep.accelerate_until;
                        time_var = 2.0 * (block_mm - mm_remaining)
                            / (self.prep.current_speed + self.prep.maximum_speed);
                        self.prep.ramp_type = if mm_remaining == self.prep.decelerate_after {
                            RampType::Decel
                        } else {
                            RampType::Cruise
                        };
                        self.prep.current_speed = self.prep.maximum_speed;
                    } else {
                        self.prep.current_speed += speed_var;
                    }
                }
                RampType::Cruise => {
                    // mm_var keeps the last mm_remaining for the partial
                    // slice computation at the cruise end.
                    mm_var = mm_remaining - self.prep.maximum_speed * time_var;

                    if mm_var < self.prep.decelerate_after {
                        time_var = (mm_remaining - self.prep.decelerate_after)
                            / self.prep.maximum_speed;
                        mm_remaining = self.prep.decelerate_after;
                        self.prep.ramp_type = RampType::Decel;
                    } else {
                        mm_remaining = mm_var;
                    }
                }
                RampType::Decel => {
                    speed_var = acceleration * time_var;
                    let mut ramp_exhausted = true;

                    if self.prep.current_speed > speed_var {
                        mm_var =
                            mm_remaining - time_var * (self.prep.current_speed - 0.5 * speed_var);
                        if mm_var > self.prep.mm_complete {
                            mm_remaining = mm_var;
                            self.prep.current_speed -= speed_var;
                            ramp_exhausted = false;
                        }
                    }

                    if ramp_exhausted {
                        // End of block, or end of a forced deceleration.
                        time_var = 2.0 * (mm_remaining - self.prep.mm_complete)
                            / (self.prep.current_speed + self.prep.exit_speed);
                        mm_remaining = self.prep.mm_complete;
                        self.prep.current_speed = self.prep.exit_speed;
                    }
                }
            }

            dt += time_var;

            if dt < dt_max {
                time_var = dt_max - dt;
            } else if mm_remaining > minimum_mm {
                // Very slow segment: extend the slice until it holds at
                // least one step.
                dt_max += DT_SEGMENT;
                time_var = dt_max - dt;
            } else {
                break;
            }

            if mm_remaining <= self.prep.mm_complete {
                break;
            }
        }

        (dt, mm_remaining)
    }

    /// Signal that the look-ahead plan for the executing block changed.
    ///
    /// Stores the preparer's current speed as the block's new entry speed
    /// and schedules a profile-only recomputation; Bresenham data and block
    /// progress are preserved. Ignored at the start of a new block.
    pub fn update_planner_block_params<PL: Planner>(&mut self, planner: &mut PL) {
        if let Some(source) = self.prep.active {
            self.prep.flags.set_recalculate();
            if let Some(block) = fetch_block(planner, source) {
                block.entry_speed_sqr = self.prep.current_speed * self.prep.current_speed;
            }
            self.prep.active = None;
        }
    }

    /// Switch the preparer to the special parking motion.
    ///
    /// Snapshots the progress of a partially completed block so it can be
    /// resumed in place afterwards.
    pub fn parking_setup_buffer(&mut self) {
        if self.prep.flags.hold_partial_block() {
            self.prep.last = ParkingSnapshot {
                st_block_index: self.prep.st_block_index,
                steps_remaining: self.prep.steps_remaining,
                step_per_mm: self.prep.step_per_mm,
                dt_remainder: self.prep.dt_remainder,
            };
        }
        self.prep.flags.set_parking();
        self.prep.flags.clear_recalculate();
        self.prep.active = None;
    }

    /// Restore the preparer to the normal run state after a parking motion.
    pub fn parking_restore_buffer(&mut self) {
        if self.prep.flags.hold_partial_block() {
            self.prep.st_block_index = self.prep.last.st_block_index;
            self.prep.steps_remaining = self.prep.last.steps_remaining;
            self.prep.step_per_mm = self.prep.last.step_per_mm;
            self.prep.dt_remainder = self.prep.last.dt_remainder;
            self.prep.flags = PrepFlags::hold_partial_and_recalculate();
            self.prep.req_mm_increment = REQ_MM_INCREMENT_SCALAR / self.prep.step_per_mm;
        } else {
            self.prep.flags = PrepFlags::default();
        }

        self.prep.active = None;
    }

    /// Speed computed for the most recently prepared segment, in mm/min.
    ///
    /// Reported while a motion state is active; lags true speed by up to
    /// the queued segment time.
    pub fn realtime_rate(&self) -> f32 {
        match self.state {
            MachineState::Cycle
            | MachineState::Homing
            | MachineState::Hold
            | MachineState::Jog
            | MachineState::SafetyDoor => self.prep.current_speed,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{drain_segment_steps, MockPlanner, MockSpindle};
    use super::super::StepperCore;
    use super::{BlockSource, RampType};
    use crate::config::consts::STEP_TIMER_MIN;
    use crate::config::Settings;
    use crate::planner::{PlannerBlock, SpindleMode};
    use crate::system::AxisMask;

    fn block(steps_x: u32, mm: f32, entry_sqr: f32, rate: f32, accel: f32) -> PlannerBlock {
        PlannerBlock {
            steps: [steps_x, 0, 0],
            step_event_count: steps_x,
            direction_bits: AxisMask::NONE,
            spindle: SpindleMode::Off,
            backlash_motion: false,
            entry_speed_sqr: entry_sqr,
            acceleration: accel,
            millimeters: mm,
            programmed_rate: rate,
            spindle_speed: 0.0,
        }
    }

    #[test]
    fn test_cruise_only_profile() {
        // Entry, exit and nominal all equal: the block cruises throughout.
        let nominal = libm::sqrtf(30_000.0);
        let mut planner = MockPlanner::with_queue(vec![
            block(1000, 10.0, 30_000.0, nominal, 500_000.0),
            block(1, 0.01, 30_000.0, nominal, 500_000.0),
        ]);
        let mut core = StepperCore::new(Settings::default());
        let spindle = MockSpindle::default();

        core.prepare_buffer(&mut planner, &spindle);
        assert_eq!(core.prep.ramp_type, RampType::Cruise);
        assert!(core.prep.current_speed > 0.99 * nominal);
    }

    #[test]
    fn test_segment_steps_conserve_block_total() {
        let mut planner =
            MockPlanner::with_queue(vec![block(2000, 20.0, 0.0, 6000.0, 2_000_000.0)]);
        let mut core = StepperCore::new(Settings::default());
        let spindle = MockSpindle::default();

        let mut total = 0u32;
        loop {
            core.prepare_buffer(&mut planner, &spindle);
            let drained = drain_segment_steps(&mut core);
            if drained.is_empty() {
                break;
            }
            total += drained.iter().map(|s| s.baseline_steps).sum::<u32>();
        }

        assert_eq!(total, 2000);
        assert!(planner.queue.is_empty());
    }

    #[test]
    fn test_triangle_profile_skips_cruise() {
        // Short block with a nominal speed it can never reach.
        let mut planner =
            MockPlanner::with_queue(vec![block(100, 1.0, 0.0, 20_000.0, 800_000.0)]);
        let mut core = StepperCore::new(Settings::default());
        let spindle = MockSpindle::default();

        let mut saw_cruise = false;
        let mut total = 0u32;
        loop {
            core.prepare_buffer(&mut planner, &spindle);
            if core.prep.ramp_type == RampType::Cruise && core.prep.active.is_some() {
                saw_cruise = true;
            }
            let drained = drain_segment_steps(&mut core);
            if drained.is_empty() {
                break;
            }
            total += drained.iter().map(|s| s.baseline_steps).sum::<u32>();
        }

        assert!(!saw_cruise);
        assert_eq!(total, 100);
    }

    #[test]
    fn test_amass_levels_rise_as_speed_drops() {
        // Pure deceleration tail from cruise down to zero.
        let nominal = 6000.0;
        let mut planner = MockPlanner::with_queue(vec![block(
            2000,
            20.0,
            nominal * nominal,
            nominal,
            1_000_000.0,
        )]);
        let mut core = StepperCore::new(Settings::default());
        let spindle = MockSpindle::default();

        let mut levels = vec![];
        let mut total = 0u32;
        loop {
            core.prepare_buffer(&mut planner, &spindle);
            let drained = drain_segment_steps(&mut core);
            if drained.is_empty() {
                break;
            }
            for seg in drained {
                levels.push(seg.amass_level);
                total += seg.baseline_steps;
            }
        }

        assert_eq!(total, 2000);
        // The tail decelerates, so smoothing levels never decrease.
        let tail: Vec<u8> = levels.clone();
        assert!(tail.windows(2).all(|w| w[0] <= w[1]), "levels: {levels:?}");
        assert!(*levels.last().unwrap() > 0);
    }

    #[test]
    fn test_cycles_per_tick_clamped_to_u16() {
        // Crawl speed: the raw cycle count exceeds 16 bits.
        let mut planner = MockPlanner::with_queue(vec![block(10, 0.1, 1.0, 1.0, 100.0)]);
        let mut core = StepperCore::new(Settings::default());
        let spindle = MockSpindle::default();

        core.prepare_buffer(&mut planner, &spindle);
        let drained = drain_segment_steps(&mut core);
        assert!(!drained.is_empty());
        for seg in drained {
            assert!(seg.cycles_per_tick >= STEP_TIMER_MIN || seg.cycles_per_tick == 0xFFFF);
        }
    }

    #[test]
    fn test_hold_decelerates_to_end_motion() {
        let mut planner =
            MockPlanner::with_queue(vec![block(2000, 20.0, 0.0, 6000.0, 2_000_000.0)]);
        let mut core = StepperCore::new(Settings::default());
        let spindle = MockSpindle::default();

        // Get the block moving, then assert a feed hold mid-block.
        core.prepare_buffer(&mut planner, &spindle);
        drain_segment_steps(&mut core);

        core.step_control_mut().set_execute_hold();
        core.update_planner_block_params(&mut planner);

        let mut guard = 0;
        while !core.step_control().end_motion() {
            core.prepare_buffer(&mut planner, &spindle);
            drain_segment_steps(&mut core);
            guard += 1;
            assert!(guard < 10_000, "hold never terminated");
        }

        assert_eq!(core.prep.current_speed, 0.0);
        // The partially executed block is retained for the resume.
        assert!(core.prep.flags.hold_partial_block());
        assert!(!planner.queue.is_empty());
    }

    #[test]
    fn test_plan_update_preserves_remaining_steps() {
        let mut planner =
            MockPlanner::with_queue(vec![block(2000, 20.0, 0.0, 6000.0, 2_000_000.0)]);
        let mut core = StepperCore::new(Settings::default());
        let spindle = MockSpindle::default();

        let mut total = 0u32;
        core.prepare_buffer(&mut planner, &spindle);
        total += drain_segment_steps(&mut core)
            .iter()
            .map(|s| s.baseline_steps)
            .sum::<u32>();

        // Mid-block plan update: recompute the profile only.
        core.update_planner_block_params(&mut planner);

        loop {
            core.prepare_buffer(&mut planner, &spindle);
            let drained = drain_segment_steps(&mut core);
            if drained.is_empty() {
                break;
            }
            total += drained.iter().map(|s| s.baseline_steps).sum::<u32>();
        }

        assert_eq!(total, 2000);
    }

    #[test]
    fn test_decel_override_profile_selected() {
        // Entry speed above nominal with room to decelerate onto the plan.
        let mut planner = MockPlanner::with_queue(vec![
            block(2000, 20.0, 36_000_000.0, 3000.0, 1_000_000.0),
            block(1, 0.01, 0.0, 3000.0, 1_000_000.0),
        ]);
        let mut core = StepperCore::new(Settings::default());
        let spindle = MockSpindle::default();

        core.prepare_buffer(&mut planner, &spindle);
        // The first pass through the override ramp either is still in it or
        // has collapsed into cruise; it must never accelerate.
        assert_ne!(core.prep.ramp_type, RampType::Accel);
    }

    #[test]
    fn test_decel_only_override_flags_next_block() {
        // Entry speed far above nominal and a block too short to shed it.
        let mut planner =
            MockPlanner::with_queue(vec![block(100, 1.0, 36_000_000.0, 600.0, 1_000_000.0)]);
        let mut core = StepperCore::new(Settings::default());
        let spindle = MockSpindle::default();

        loop {
            core.prepare_buffer(&mut planner, &spindle);
            if drain_segment_steps(&mut core).is_empty() {
                break;
            }
        }

        // The flag stays latched until the next block loads.
        assert!(core.prep.flags.decel_override());
        assert!(planner.queue.is_empty());
    }

    #[test]
    fn test_system_motion_ends_motion_without_discard() {
        let mut planner = MockPlanner::default();
        planner.sys_block = Some(block(200, 2.0, 0.0, 3000.0, 1_000_000.0));
        let mut core = StepperCore::new(Settings::default());
        let spindle = MockSpindle::default();
        core.step_control_mut().set_execute_sys_motion();

        let mut total = 0u32;
        let mut guard = 0;
        while !core.step_control().end_motion() {
            core.prepare_buffer(&mut planner, &spindle);
            total += drain_segment_steps(&mut core)
                .iter()
                .map(|s| s.baseline_steps)
                .sum::<u32>();
            guard += 1;
            assert!(guard < 10_000);
        }
        total += drain_segment_steps(&mut core)
            .iter()
            .map(|s| s.baseline_steps)
            .sum::<u32>();

        assert_eq!(total, 200);
        assert!(planner.sys_block.is_some());
        assert_eq!(core.prep.active, Some(BlockSource::SystemMotion));

        // Host-side completion: route block loading back to the planner
        // queue and release the end-motion latch.
        core.step_control_mut().clear_execute_sys_motion();
        core.step_control_mut().clear_end_motion();
        assert!(!core.step_control().execute_sys_motion());
        assert!(!core.step_control().end_motion());
    }

    #[test]
    fn test_parking_restore_without_partial_block_clears_flags() {
        let mut core = StepperCore::new(Settings::default());
        core.parking_setup_buffer();
        assert!(core.prep.flags.parking());

        core.parking_restore_buffer();
        assert!(!core.prep.flags.parking());
        assert!(!core.prep.flags.recalculate());
    }

    #[test]
    fn test_realtime_rate_gated_by_state() {
        let mut core = StepperCore::new(Settings::default());
        core.prep.current_speed = 1234.0;

        assert_eq!(core.realtime_rate(), 0.0);
        core.set_state(crate::system::MachineState::Cycle);
        assert_eq!(core.realtime_rate(), 1234.0);
    }
}
