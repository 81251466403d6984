//! # stepper-core
//!
//! Real-time step pulse generation core for multi-axis CNC stepper control.
//!
//! The crate executes pre-planned motion blocks by splitting them into short
//! constant-rate *segments* and emitting exactly timed step/direction pulses.
//! Two cooperating components share a lock-free ring buffer:
//!
//! - The **segment preparer** runs in the foreground. It pulls blocks from
//!   the planner, integrates a trapezoidal/triangular velocity profile in
//!   floating point, and converts the result into integer step counts and
//!   timer reload values.
//! - The **step execution engine** runs from a high-frequency timer
//!   interrupt. It pops segments, traces them with a fixed-point Bresenham
//!   algorithm, and drives the step and direction lines through a hardware
//!   port trait. No floating point is used on the interrupt path.
//!
//! ## Features
//!
//! - **Exact step conservation**: every axis emits exactly the step count
//!   the planner requested, across any segmentation and smoothing level
//! - **Adaptive multi-axis step smoothing (AMASS)**: low step rates are
//!   over-sampled so non-dominant axes pulse evenly instead of aliasing
//! - **Bounded interrupt cost**: integer-only execution, fixed axis count,
//!   no allocation
//! - **Real-time events**: feed hold, cycle stop, homing axis lock, probe
//!   polling, and spindle rate coupling for laser mode
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stepper_core::{Settings, StepperCore};
//!
//! let mut core = StepperCore::new(Settings::default());
//! core.init(&mut port);
//!
//! // Foreground loop: keep the segment buffer fed.
//! core.prepare_buffer(&mut planner, &spindle);
//! core.wake_up(&mut port);
//!
//! // Timer interrupt handlers:
//! core.main_isr(&mut port, &mut spindle, &mut probe);
//! core.pulse_reset_isr(&mut port);
//! ```
//!
//! ## Feature Flags
//!
//! - `std` (default): enables TOML settings loading from files
//! - `defmt`: derives `defmt::Format` on public data types for embedded
//!   logging

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

// Core modules
pub mod config;
pub mod error;
pub mod hal;
pub mod planner;
pub mod stepper;
pub mod system;

// Re-exports for ergonomic API
pub use config::{consts, Settings};
pub use error::{Error, Result};
pub use hal::{ProbeMonitor, SpindleControl, StepperPort};
pub use planner::{Planner, PlannerBlock, SpindleMode};
pub use stepper::StepperCore;
pub use system::{AxisMask, MachineState, StepControl};

// Settings loading (std only)
#[cfg(feature = "std")]
pub use config::load_settings;
