//! System-level state shared between the execution core and the host.
//!
//! Covers the machine state the core consults at runtime, the step-control
//! flag word used to signal real-time events into the preparer, and the
//! per-axis bit mask type used for direction bits, step out-bits, invert
//! masks, and the homing axis lock.

use core::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor};

use crate::config::consts::N_AXIS;

/// Per-axis bit set.
///
/// Bit `i` corresponds to axis index `i`. Used for direction bits, step
/// out-bits, invert masks, and the homing axis lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisMask(pub u8);

impl AxisMask {
    /// Empty mask (no axes).
    pub const NONE: AxisMask = AxisMask(0);

    /// All configured axes.
    pub const ALL: AxisMask = AxisMask((1 << N_AXIS) - 1);

    /// Mask with only the given axis set.
    #[inline]
    pub const fn bit(axis: usize) -> Self {
        AxisMask(1 << axis)
    }

    /// Check whether the given axis is set.
    #[inline]
    pub const fn contains(self, axis: usize) -> bool {
        self.0 & (1 << axis) != 0
    }

    /// Check whether no axis is set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set the given axis.
    #[inline]
    pub fn set(&mut self, axis: usize) {
        self.0 |= 1 << axis;
    }
}

impl BitOr for AxisMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        AxisMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for AxisMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for AxisMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        AxisMask(self.0 & rhs.0)
    }
}

impl BitAndAssign for AxisMask {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl BitXor for AxisMask {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self::Output {
        AxisMask(self.0 ^ rhs.0)
    }
}

/// Machine operating state, as maintained by the host control loop.
///
/// The core reads it to gate the homing axis lock, the idle lock dwell and
/// the realtime rate report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MachineState {
    /// No cycle running.
    #[default]
    Idle,
    /// Executing a motion program.
    Cycle,
    /// Homing cycle in progress.
    Homing,
    /// Feed hold in progress or complete.
    Hold,
    /// Jogging motion.
    Jog,
    /// Safety door interlock (possibly with parking motion).
    SafetyDoor,
    /// Sleep; drivers are always released on disable.
    Sleep,
}

const END_MOTION: u8 = 1 << 0;
const EXECUTE_HOLD: u8 = 1 << 1;
const EXECUTE_SYS_MOTION: u8 = 1 << 2;
const UPDATE_SPINDLE_PWM: u8 = 1 << 3;

/// Step-control flag word.
///
/// Single-bit idempotent signals shared between the host, the segment
/// preparer and the execution engine. The default value is normal operation
/// with no flags set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepControl(u8);

impl StepControl {
    /// Clear all flags, restoring normal operation.
    #[inline]
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Motion is ending; the preparer refuses to produce further segments.
    #[inline]
    pub fn end_motion(self) -> bool {
        self.0 & END_MOTION != 0
    }

    /// Latch the end-of-motion flag.
    #[inline]
    pub fn set_end_motion(&mut self) {
        self.0 |= END_MOTION;
    }

    /// Release the end-of-motion latch when restarting the preparer.
    #[inline]
    pub fn clear_end_motion(&mut self) {
        self.0 &= !END_MOTION;
    }

    /// A feed hold is in progress; segments decelerate to zero speed.
    #[inline]
    pub fn execute_hold(self) -> bool {
        self.0 & EXECUTE_HOLD != 0
    }

    /// Request a forced deceleration to zero speed.
    #[inline]
    pub fn set_execute_hold(&mut self) {
        self.0 |= EXECUTE_HOLD;
    }

    /// Release the feed hold, e.g. on cycle resume. Unrelated flags are
    /// left untouched.
    #[inline]
    pub fn clear_execute_hold(&mut self) {
        self.0 &= !EXECUTE_HOLD;
    }

    /// The preparer sources blocks from the system-motion slot
    /// (homing/parking) instead of the planner queue.
    #[inline]
    pub fn execute_sys_motion(self) -> bool {
        self.0 & EXECUTE_SYS_MOTION != 0
    }

    /// Route block loading to the system-motion slot.
    #[inline]
    pub fn set_execute_sys_motion(&mut self) {
        self.0 |= EXECUTE_SYS_MOTION;
    }

    /// Clear the system-motion routing flag.
    #[inline]
    pub fn clear_execute_sys_motion(&mut self) {
        self.0 &= !EXECUTE_SYS_MOTION;
    }

    /// The next prepared segment must recompute the spindle PWM value.
    #[inline]
    pub fn update_spindle_pwm(self) -> bool {
        self.0 & UPDATE_SPINDLE_PWM != 0
    }

    /// Force a spindle PWM recomputation on the next prepared segment.
    #[inline]
    pub fn set_update_spindle_pwm(&mut self) {
        self.0 |= UPDATE_SPINDLE_PWM;
    }

    /// Acknowledge the spindle PWM recomputation.
    #[inline]
    pub fn clear_update_spindle_pwm(&mut self) {
        self.0 &= !UPDATE_SPINDLE_PWM;
    }
}
