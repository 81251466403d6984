//! Hardware abstraction traits for the step pulse boundary.
//!
//! These traits define the interface between the execution core and the
//! hardware-specific layer: step/direction/enable GPIO, the stepper timer,
//! the spindle PWM peripheral, and the probe input. Implementations for a
//! concrete MCU live outside this crate.
//!
//! Dual-gantry machines that mirror an axis onto a second motor do so
//! inside their [`StepperPort`] implementation; the core emits one logical
//! step bit per axis.

use embedded_hal::delay::DelayNs;

use crate::config::consts::N_AXIS;

/// Step/direction output port plus the stepper timer.
///
/// All methods must be callable from interrupt context. The pin methods
/// receive the final electrical level; polarity inversion has already been
/// applied by the core.
pub trait StepperPort: DelayNs {
    /// One-shot hardware setup: pin directions and timer configuration.
    fn configure(&mut self);

    /// Drive the STEP line of the given axis.
    fn set_step(&mut self, axis: usize, high: bool);

    /// Drive the DIR line of the given axis.
    ///
    /// Direction lines are driven before the first step pulse of a block so
    /// driver setup time requirements are met.
    fn set_dir(&mut self, axis: usize, high: bool);

    /// Drive the shared stepper driver enable line.
    fn set_enable(&mut self, high: bool);

    /// Start the stepper timer.
    fn timer_start(&mut self);

    /// Stop the stepper timer.
    fn timer_stop(&mut self);

    /// Program the timer period, in timer cycles per interrupt tick.
    fn set_timer_reload(&mut self, cycles: u16);

    /// Program the compare value that fires the pulse-reset interrupt
    /// mid-period.
    fn set_pulse_compare(&mut self, cycles: u16);
}

/// Spindle speed output.
pub trait SpindleControl {
    /// PWM value that turns the spindle off.
    const PWM_OFF: u8;

    /// Apply a PWM duty value. Called from interrupt context as each
    /// segment is loaded.
    fn set_speed(&mut self, pwm: u8);

    /// Convert a spindle speed in RPM into a PWM duty value.
    fn compute_pwm_value(&self, rpm: f32) -> u8;
}

/// Probe input monitor.
///
/// Polled once per interrupt tick while a probing cycle is active. The
/// monitor owns trigger detection and signaling; on a trip it records the
/// position it was handed and requests a feed hold through its own channel
/// to the host.
pub trait ProbeMonitor {
    /// Whether a probing cycle is currently armed.
    fn is_active(&self) -> bool;

    /// Sample the probe input against the current machine position.
    fn state_monitor(&mut self, position: &[i32; N_AXIS]);
}
