//! Compile-time configuration of the execution core.
//!
//! These constants size the shared buffers and fix the timing of the step
//! interrupt. They are deliberately not runtime settings: the interrupt
//! budget and the exactness argument of the step smoothing both depend on
//! them being known at compile time.

/// Number of controlled axes.
pub const N_AXIS: usize = 3;

/// X axis index.
pub const X_AXIS: usize = 0;
/// Y axis index.
pub const Y_AXIS: usize = 1;
/// Z axis index.
pub const Z_AXIS: usize = 2;

/// Number of entries in the segment ring buffer.
///
/// The block data pool holds one entry fewer; a block pool entry stays live
/// as long as any queued segment references it, and the one-smaller pool is
/// what makes a new entry unable to overrun a still-referenced one.
pub const SEGMENT_BUFFER_SIZE: usize = 10;

/// Highest adaptive step smoothing level.
///
/// All Bresenham data is pre-multiplied by `2^MAX_AMASS_LEVEL` when a block
/// is loaded, so per-segment level selection only ever divides back down and
/// integer truncation can never lose a step.
pub const MAX_AMASS_LEVEL: u8 = 3;

/// Segment preparer integration rate, in segments per second.
pub const ACCELERATION_TICKS_PER_SECOND: u32 = 100;

/// Stepper timer input frequency in Hz.
pub const F_TIMER_STEPPER: u32 = 24_000_000;

/// Timer ticks per microsecond.
pub const TICKS_PER_MICROSECOND: u32 = F_TIMER_STEPPER / 1_000_000;

/// Highest step rate the interrupt is allowed to run at, in Hz.
pub const MAX_STEP_RATE_HZ: u32 = 60_000;

/// Smallest permitted timer reload value.
pub const STEP_TIMER_MIN: u16 = (F_TIMER_STEPPER / MAX_STEP_RATE_HZ) as u16;

/// Smoothing level 1 cutoff: step periods at or above this many timer
/// cycles over-drive the interrupt by 2x.
pub const AMASS_LEVEL1: u32 = F_TIMER_STEPPER / 8_000;
/// Smoothing level 2 cutoff (4x over-drive).
pub const AMASS_LEVEL2: u32 = F_TIMER_STEPPER / 4_000;
/// Smoothing level 3 cutoff (8x over-drive).
pub const AMASS_LEVEL3: u32 = F_TIMER_STEPPER / 2_000;

/// Nominal segment integration time, in minutes.
pub const DT_SEGMENT: f32 = 1.0 / (ACCELERATION_TICKS_PER_SECOND as f32 * 60.0);

/// Scale applied to the one-step distance when sizing the minimum segment
/// travel. A value above 1.0 guarantees at least one step per segment.
pub const REQ_MM_INCREMENT_SCALAR: f32 = 1.25;

const _: () = assert!(
    MAX_AMASS_LEVEL >= 1,
    "step smoothing needs at least one level to operate"
);
const _: () = assert!(SEGMENT_BUFFER_SIZE >= 3, "segment ring too small");
const _: () = assert!(N_AXIS <= 8, "axis masks are 8 bits wide");
