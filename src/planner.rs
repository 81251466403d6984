//! Planner interface contract.
//!
//! The look-ahead planner is an external collaborator; the execution core
//! only consumes it through the [`Planner`] trait. Blocks describe one
//! straight-line motion with a velocity plan expressed as squared entry
//! speed, acceleration, and travel distance. The preparer writes remaining
//! travel back into the executing block so mid-block re-planning sees
//! current progress.

use crate::config::consts::N_AXIS;
use crate::system::AxisMask;

/// Commanded spindle state for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpindleMode {
    /// Spindle off.
    #[default]
    Off,
    /// Clockwise rotation.
    Cw,
    /// Counter-clockwise rotation. In laser mode this marks the block for
    /// PWM rate adjustment.
    Ccw,
}

impl SpindleMode {
    /// Whether the spindle is commanded on.
    #[inline]
    pub fn is_on(self) -> bool {
        self != SpindleMode::Off
    }
}

/// One planned straight-line motion.
#[derive(Debug, Clone, Copy)]
pub struct PlannerBlock {
    /// Step count per axis, in machine units.
    pub steps: [u32; N_AXIS],
    /// Maximum of `steps` over all axes.
    pub step_event_count: u32,
    /// Per-axis direction bits; a set bit means negative travel.
    pub direction_bits: AxisMask,
    /// Commanded spindle state.
    pub spindle: SpindleMode,
    /// Backlash compensation move: pulses are emitted but machine position
    /// must not advance.
    pub backlash_motion: bool,
    /// Squared speed at block entry, in (mm/min)^2.
    pub entry_speed_sqr: f32,
    /// Acceleration in mm/min^2.
    pub acceleration: f32,
    /// Remaining travel distance in millimeters. The preparer decrements
    /// this as segments are checked out.
    pub millimeters: f32,
    /// Programmed feed rate in mm/min.
    pub programmed_rate: f32,
    /// Programmed spindle speed in RPM.
    pub spindle_speed: f32,
}

impl Default for PlannerBlock {
    fn default() -> Self {
        Self {
            steps: [0; N_AXIS],
            step_event_count: 0,
            direction_bits: AxisMask::NONE,
            spindle: SpindleMode::Off,
            backlash_motion: false,
            entry_speed_sqr: 0.0,
            acceleration: 0.0,
            millimeters: 0.0,
            programmed_rate: 0.0,
            spindle_speed: 0.0,
        }
    }
}

/// Look-ahead planner contract consumed by the segment preparer.
pub trait Planner {
    /// Block at the head of the planner queue, if any.
    fn current_block(&mut self) -> Option<&mut PlannerBlock>;

    /// One-off system motion block (homing or parking), if staged.
    fn system_motion_block(&mut self) -> Option<&mut PlannerBlock>;

    /// Drop the head block; all of its steps are queued for execution.
    fn discard_current_block(&mut self);

    /// Squared exit speed of the executing block, i.e. the entry speed of
    /// the next queued block, or zero at the end of the program.
    fn exec_block_exit_speed_sqr(&self) -> f32;

    /// Nominal speed of the block with rate overrides applied, in mm/min.
    fn compute_profile_nominal_speed(&self, block: &PlannerBlock) -> f32;
}
