//! The motion execution core.
//!
//! [`StepperCore`] owns every piece of shared state: the segment ring, the
//! block data pool, the execution and preparation state, the invert masks,
//! and the machine position counters. The embedder roots one instance
//! statically and calls [`prepare_buffer`](StepperCore::prepare_buffer)
//! from the main loop and [`main_isr`](StepperCore::main_isr) /
//! [`pulse_reset_isr`](StepperCore::pulse_reset_isr) from the stepper timer
//! interrupt. The ring indices use acquire/release atomics so the
//! foreground/interrupt handoff stays sound on that split.

mod block;
mod exec;
mod prep;
mod segment;

use crate::config::consts::N_AXIS;
use crate::config::{Settings, IDLE_LOCK_KEEP_ENABLED};
use crate::hal::StepperPort;
use crate::system::{AxisMask, MachineState, StepControl};

use block::BlockPool;
use exec::ExecState;
use prep::PrepState;
use segment::SegmentRing;

/// The step-pulse execution core.
///
/// See the [module documentation](self) for the threading model.
#[derive(Debug)]
pub struct StepperCore {
    settings: Settings,
    state: MachineState,
    position: [i32; N_AXIS],
    homing_axis_lock: AxisMask,
    step_control: StepControl,
    cycle_stop: bool,

    step_invert_mask: AxisMask,
    dir_invert_mask: AxisMask,

    ring: SegmentRing,
    blocks: BlockPool,
    st: ExecState,
    prep: PrepState,
}

impl StepperCore {
    /// Create a core with the given settings.
    pub fn new(settings: Settings) -> Self {
        let mut core = Self {
            settings,
            state: MachineState::default(),
            position: [0; N_AXIS],
            homing_axis_lock: AxisMask::ALL,
            step_control: StepControl::default(),
            cycle_stop: false,
            step_invert_mask: AxisMask::NONE,
            dir_invert_mask: AxisMask::NONE,
            ring: SegmentRing::new(),
            blocks: BlockPool::new(),
            st: ExecState::default(),
            prep: PrepState::default(),
        };
        core.generate_step_dir_invert_masks();
        core
    }

    /// One-shot hardware setup: pin directions and timer configuration.
    pub fn init<P: StepperPort>(&self, port: &mut P) {
        port.configure();
    }

    /// Enable the stepper drivers and start the timer.
    ///
    /// Holds for 10 ms after energizing so the drivers wake before the
    /// first pulse. Runs only at cycle start, never during motion.
    pub fn wake_up<P: StepperPort>(&mut self, port: &mut P) {
        port.set_enable(self.settings.invert_st_enable);
        port.delay_ms(10);

        // Ensure the first interrupt tick does not step.
        self.st.step_outbits = AxisMask::NONE;
        port.timer_start();
    }

    /// Stop the timer and set the driver idle state.
    ///
    /// Unless the idle lock time is [`IDLE_LOCK_KEEP_ENABLED`], dwells for
    /// the configured time so the axes settle, then releases the drivers.
    /// Drivers are never released during homing, and always released in
    /// sleep. `ovr_disable` forces a release regardless.
    pub fn disable<P: StepperPort>(&mut self, port: &mut P, ovr_disable: bool) {
        port.timer_stop();
        port.delay_us(1);

        self.pulse_reset_isr(port);

        let mut pin_state = false; // keep drivers energized
        if (self.settings.stepper_idle_lock_time != IDLE_LOCK_KEEP_ENABLED
            || self.state == MachineState::Sleep)
            && self.state != MachineState::Homing
        {
            port.delay_ms(u32::from(self.settings.stepper_idle_lock_time));
            pin_state = true;
        }

        if ovr_disable {
            pin_state = true;
        }

        if self.settings.invert_st_enable {
            pin_state = !pin_state;
        }
        port.set_enable(pin_state);
    }

    /// Zero all execution and preparation state and drive every step and
    /// direction line to its idle level.
    pub fn reset<P: StepperPort>(&mut self, port: &mut P) {
        self.disable(port, false);

        self.prep = PrepState::default();
        self.st = ExecState::default();
        self.ring.reset();
        self.cycle_stop = false;

        self.generate_step_dir_invert_masks();
        self.st.dir_outbits = self.dir_invert_mask;

        for axis in 0..N_AXIS {
            port.set_step(axis, false);
            port.set_dir(axis, false);
        }
    }

    /// Rebuild the step and direction invert masks from the settings.
    pub fn generate_step_dir_invert_masks(&mut self) {
        let mut step_mask = AxisMask::NONE;
        let mut dir_mask = AxisMask::NONE;

        for axis in 0..N_AXIS {
            if self.settings.step_invert().contains(axis) {
                step_mask.set(axis);
            }
            if self.settings.dir_invert().contains(axis) {
                dir_mask.set(axis);
            }
        }

        self.step_invert_mask = step_mask;
        self.dir_invert_mask = dir_mask;
    }

    /// Replace the settings. Invert masks take effect on the next
    /// [`reset`](Self::reset).
    pub fn update_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Current settings.
    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Current machine state.
    #[inline]
    pub fn state(&self) -> MachineState {
        self.state
    }

    /// Set the machine state. Owned by the host control loop.
    #[inline]
    pub fn set_state(&mut self, state: MachineState) {
        self.state = state;
    }

    /// Commanded machine position in steps per axis.
    #[inline]
    pub fn position(&self) -> [i32; N_AXIS] {
        self.position
    }

    /// Overwrite the machine position, e.g. after homing.
    #[inline]
    pub fn set_position(&mut self, position: [i32; N_AXIS]) {
        self.position = position;
    }

    /// Restrict stepping to the given axes while homing.
    #[inline]
    pub fn set_homing_axis_lock(&mut self, lock: AxisMask) {
        self.homing_axis_lock = lock;
    }

    /// Step-control flag word.
    #[inline]
    pub fn step_control(&self) -> StepControl {
        self.step_control
    }

    /// Mutable access to the step-control flag word, for asserting and
    /// clearing real-time signals.
    #[inline]
    pub fn step_control_mut(&mut self) -> &mut StepControl {
        &mut self.step_control
    }

    /// Whether the engine has flagged the end of a cycle.
    #[inline]
    pub fn cycle_stop(&self) -> bool {
        self.cycle_stop
    }

    /// Consume the cycle-stop flag.
    #[inline]
    pub fn take_cycle_stop(&mut self) -> bool {
        core::mem::take(&mut self.cycle_stop)
    }
}
