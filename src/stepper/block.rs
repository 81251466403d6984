//! Block data pool.
//!
//! Bresenham execution data is copied out of planner blocks when they are
//! checked out by the preparer, so a planner block can be discarded while
//! queued segments still execute its tail. Segments reference pool entries
//! by index; the pool is one entry smaller than the segment ring, which is
//! what keeps a fresh entry from overrunning a still-referenced one.

use crate::config::consts::{MAX_AMASS_LEVEL, N_AXIS, SEGMENT_BUFFER_SIZE};
use crate::planner::PlannerBlock;
use crate::system::AxisMask;

/// Number of entries in the block data pool.
pub(crate) const BLOCK_POOL_SIZE: usize = SEGMENT_BUFFER_SIZE - 1;

/// Bresenham execution data for one checked-out planner block.
///
/// Step counts are pre-multiplied by `2^MAX_AMASS_LEVEL` so segment-level
/// smoothing only ever shifts back down and never truncates a step.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StepperBlock {
    /// Per-axis step counts, left-shifted by the maximum smoothing level.
    pub steps: [u32; N_AXIS],
    /// Maximum of `steps`, same shift applied.
    pub step_event_count: u32,
    /// Per-axis direction bits; set means negative travel.
    pub direction_bits: AxisMask,
    /// Spindle PWM must track the current feed rate while this block runs.
    pub is_pwm_rate_adjusted: bool,
}

impl StepperBlock {
    /// Copy Bresenham data from a planner block, applying the smoothing
    /// pre-shift.
    pub(crate) fn load(&mut self, block: &PlannerBlock) {
        self.direction_bits = block.direction_bits;
        for (scaled, steps) in self.steps.iter_mut().zip(block.steps.iter()) {
            *scaled = steps << MAX_AMASS_LEVEL;
        }
        self.step_event_count = block.step_event_count << MAX_AMASS_LEVEL;
        self.is_pwm_rate_adjusted = false;
    }
}

/// Fixed pool of stepper blocks, indexed by segments.
#[derive(Debug)]
pub(crate) struct BlockPool {
    pub entries: [StepperBlock; BLOCK_POOL_SIZE],
}

impl BlockPool {
    pub(crate) fn new() -> Self {
        Self {
            entries: [StepperBlock::default(); BLOCK_POOL_SIZE],
        }
    }

    /// Next pool index, wrapping at the pool size.
    pub(crate) fn next_index(index: usize) -> usize {
        let index = index + 1;
        if index == BLOCK_POOL_SIZE {
            0
        } else {
            index
        }
    }
}
