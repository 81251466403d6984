//! Runtime stepper settings.

use serde::Deserialize;

use crate::system::AxisMask;

/// Sentinel for [`Settings::stepper_idle_lock_time`]: never release the
/// stepper drivers between motions.
pub const IDLE_LOCK_KEEP_ENABLED: u8 = 0xFF;

fn default_idle_lock_time() -> u8 {
    25
}

/// User-tunable stepper settings.
///
/// Loaded from TOML on hosted builds and handed to the core at
/// construction; the invert masks take effect on the next
/// [`reset`](crate::StepperCore::reset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Settings {
    /// Per-axis step pulse polarity inversion (bit `i` = axis `i`).
    #[serde(default)]
    pub step_invert_mask: u8,

    /// Per-axis direction signal inversion.
    #[serde(default)]
    pub dir_invert_mask: u8,

    /// Invert the stepper driver enable line.
    #[serde(default)]
    pub invert_st_enable: bool,

    /// Laser mode: spindle PWM tracks the current feed rate on
    /// counter-clockwise spindle motions.
    #[serde(default)]
    pub laser_mode: bool,

    /// Dwell time in milliseconds before releasing the drivers after motion
    /// stops. [`IDLE_LOCK_KEEP_ENABLED`] keeps them energized.
    #[serde(default = "default_idle_lock_time")]
    pub stepper_idle_lock_time: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            step_invert_mask: 0,
            dir_invert_mask: 0,
            invert_st_enable: false,
            laser_mode: false,
            stepper_idle_lock_time: default_idle_lock_time(),
        }
    }
}

impl Settings {
    /// Step polarity invert mask as an axis bit set.
    #[inline]
    pub fn step_invert(&self) -> AxisMask {
        AxisMask(self.step_invert_mask)
    }

    /// Direction invert mask as an axis bit set.
    #[inline]
    pub fn dir_invert(&self) -> AxisMask {
        AxisMask(self.dir_invert_mask)
    }
}
