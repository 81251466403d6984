//! Segment ring buffer.
//!
//! Single-producer single-consumer ring shared between the segment preparer
//! (foreground) and the step execution engine (timer interrupt). The
//! preparer writes the payload slot first and publishes it by storing the
//! head index with release ordering; the engine loads the head with acquire
//! ordering before reading the payload, and advances the tail only after a
//! segment has fully executed. The full condition `tail == next_head`
//! leaves one slot unused, so a published entry is never overwritten while
//! unread.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::config::consts::SEGMENT_BUFFER_SIZE;

/// One executable slice of a block: a constant step rate over `n_step`
/// pulses.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Segment {
    /// Step events to execute, in smoothed interrupt ticks.
    pub n_step: u16,
    /// Timer reload value per interrupt tick.
    pub cycles_per_tick: u16,
    /// Index of the block pool entry this segment executes.
    pub st_block_index: usize,
    /// Smoothing level the engine must apply to the Bresenham increments.
    pub amass_level: u8,
    /// Spindle PWM to apply when the segment begins.
    pub spindle_pwm: u8,
    /// Pulses are emitted but machine position must not advance.
    pub backlash_motion: bool,
}

/// SPSC ring of precomputed segments.
#[derive(Debug)]
pub(crate) struct SegmentRing {
    buffer: [Segment; SEGMENT_BUFFER_SIZE],
    /// Next segment to execute. Written by the engine.
    tail: AtomicUsize,
    /// One past the last published segment. Written by the preparer.
    head: AtomicUsize,
    /// Head successor, maintained by the preparer for the full check.
    next_head: AtomicUsize,
}

fn next_index(index: usize) -> usize {
    let index = index + 1;
    if index == SEGMENT_BUFFER_SIZE {
        0
    } else {
        index
    }
}

impl SegmentRing {
    pub(crate) fn new() -> Self {
        Self {
            buffer: [Segment::default(); SEGMENT_BUFFER_SIZE],
            tail: AtomicUsize::new(0),
            head: AtomicUsize::new(0),
            next_head: AtomicUsize::new(1),
        }
    }

    /// Drop all queued segments and restore the empty state.
    pub(crate) fn reset(&mut self) {
        self.tail.store(0, Ordering::Relaxed);
        self.head.store(0, Ordering::Relaxed);
        self.next_head.store(1, Ordering::Relaxed);
    }

    /// Producer-side full check.
    pub(crate) fn is_full(&self) -> bool {
        self.tail.load(Ordering::Acquire) == self.next_head.load(Ordering::Relaxed)
    }

    /// Write slot for the segment being prepared. Not visible to the
    /// consumer until [`publish`](Self::publish) runs.
    pub(crate) fn write_slot(&mut self) -> &mut Segment {
        &mut self.buffer[self.head.load(Ordering::Relaxed)]
    }

    /// Make the written slot visible to the consumer.
    pub(crate) fn publish(&self) {
        let next_head = self.next_head.load(Ordering::Relaxed);
        self.head.store(next_head, Ordering::Release);
        self.next_head.store(next_index(next_head), Ordering::Relaxed);
    }

    /// Consumer-side read of the tail segment, if one is published.
    ///
    /// The slot stays owned by the consumer until
    /// [`advance_tail`](Self::advance_tail).
    pub(crate) fn peek(&self) -> Option<Segment> {
        let tail = self.tail.load(Ordering::Relaxed);
        if self.head.load(Ordering::Acquire) == tail {
            None
        } else {
            Some(self.buffer[tail])
        }
    }

    /// Retire the tail segment after it has fully executed.
    pub(crate) fn advance_tail(&self) {
        let tail = next_index(self.tail.load(Ordering::Relaxed));
        self.tail.store(tail, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(n_step: u16) -> Segment {
        Segment {
            n_step,
            ..Segment::default()
        }
    }

    #[test]
    fn test_new_ring_is_empty() {
        let ring = SegmentRing::new();
        assert!(ring.peek().is_none());
        assert!(!ring.is_full());
    }

    #[test]
    fn test_fifo_order() {
        let mut ring = SegmentRing::new();
        for n in 1..=4 {
            *ring.write_slot() = segment(n);
            ring.publish();
        }

        for n in 1..=4 {
            let seg = ring.peek().expect("segment should be queued");
            assert_eq!(seg.n_step, n);
            ring.advance_tail();
        }
        assert!(ring.peek().is_none());
    }

    #[test]
    fn test_capacity_is_one_less_than_size() {
        let mut ring = SegmentRing::new();
        let mut pushed = 0;
        while !ring.is_full() {
            *ring.write_slot() = segment(pushed as u16);
            ring.publish();
            pushed += 1;
        }
        assert_eq!(pushed, SEGMENT_BUFFER_SIZE - 1);
    }

    #[test]
    fn test_unread_slot_survives_full_cycle() {
        let mut ring = SegmentRing::new();
        // Fill, then drain one and refill, many times around the ring.
        let mut expected = 0u16;
        let mut next = 0u16;
        for _ in 0..3 * SEGMENT_BUFFER_SIZE {
            while !ring.is_full() {
                *ring.write_slot() = segment(next);
                ring.publish();
                next += 1;
            }
            let seg = ring.peek().expect("ring is full");
            assert_eq!(seg.n_step, expected);
            ring.advance_tail();
            expected += 1;
        }
    }

    #[test]
    fn test_reset_restores_empty() {
        let mut ring = SegmentRing::new();
        *ring.write_slot() = segment(9);
        ring.publish();
        ring.reset();
        assert!(ring.peek().is_none());
        assert!(!ring.is_full());
    }
}
