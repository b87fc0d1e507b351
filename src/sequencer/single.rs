//! Single-producer sequencer.

use std::cell::Cell;
use std::sync::Arc;

use crate::error::{Result, SluiceError};
use crate::sequence::Sequence;
use crate::sequencer::{check_buffer_size, GatingSequences, Sequencer};
use crate::wait::WaitStrategy;

/// Sequencer for exactly one producer thread.
///
/// Claim bookkeeping (`next_value`, `cached_gating`) is kept in plain cells:
/// the sole producer is the only writer, so no synchronization is paid on the
/// claim path. The cursor alone carries publication - no per-slot
/// availability word is needed because publications are cursor-monotonic.
pub struct SingleProducerSequencer {
    buffer_size: usize,
    cursor: Arc<Sequence>,
    wait_strategy: Arc<dyn WaitStrategy>,
    gating: GatingSequences,
    next_value: Cell<i64>,
    cached_gating: Cell<i64>,
}

// SAFETY: the claim-side cells are written only from the single producer
// thread. Every other thread touches this type through the atomic cursor and
// the gating set only.
unsafe impl Send for SingleProducerSequencer {}
unsafe impl Sync for SingleProducerSequencer {}

impl SingleProducerSequencer {
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        check_buffer_size(buffer_size)?;
        Ok(Self {
            buffer_size,
            cursor: Arc::new(Sequence::default()),
            wait_strategy,
            gating: GatingSequences::new(),
            next_value: Cell::new(Sequence::INITIAL_VALUE),
            cached_gating: Cell::new(Sequence::INITIAL_VALUE),
        })
    }

    fn has_capacity(&self, required: usize, do_store: bool) -> bool {
        let next_value = self.next_value.get();
        let wrap_point = (next_value + required as i64) - self.buffer_size as i64;
        let cached_gating = self.cached_gating.get();

        if wrap_point > cached_gating || cached_gating > next_value {
            if do_store {
                self.cursor.set_volatile(next_value);
            }

            let min_sequence = self.gating.minimum(next_value);
            self.cached_gating.set(min_sequence);
            if wrap_point > min_sequence {
                return false;
            }
        }

        true
    }
}

impl Sequencer for SingleProducerSequencer {
    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn cursor(&self) -> Arc<Sequence> {
        Arc::clone(&self.cursor)
    }

    fn wait_strategy(&self) -> Arc<dyn WaitStrategy> {
        Arc::clone(&self.wait_strategy)
    }

    fn has_available_capacity(&self, required: usize) -> bool {
        self.has_capacity(required, false)
    }

    fn remaining_capacity(&self) -> i64 {
        let produced = self.next_value.get();
        let consumed = self.gating.minimum(produced);
        self.buffer_size as i64 - (produced - consumed)
    }

    fn next_n(&self, n: usize) -> Result<i64> {
        if n < 1 || n > self.buffer_size {
            return Err(SluiceError::InvalidArgument(
                "n must be > 0 and <= buffer size",
            ));
        }

        let next_value = self.next_value.get();
        let next_sequence = next_value + n as i64;
        let wrap_point = next_sequence - self.buffer_size as i64;
        let cached_gating = self.cached_gating.get();

        // Cache miss, or cache invalidated by a sequence reset: publish the
        // claim position so gating consumers can observe it, then wait for
        // the slowest consumer to clear the wrap point.
        if wrap_point > cached_gating || cached_gating > next_value {
            self.cursor.set_volatile(next_value);

            let mut min_sequence = self.gating.minimum(next_value);
            while wrap_point > min_sequence {
                std::thread::yield_now();
                min_sequence = self.gating.minimum(next_value);
            }
            self.cached_gating.set(min_sequence);
        }

        self.next_value.set(next_sequence);
        Ok(next_sequence)
    }

    fn try_next_n(&self, n: usize) -> Result<i64> {
        if n < 1 {
            return Err(SluiceError::InvalidArgument("n must be > 0"));
        }

        if !self.has_capacity(n, true) {
            return Err(SluiceError::InsufficientCapacity);
        }

        let next_sequence = self.next_value.get() + n as i64;
        self.next_value.set(next_sequence);
        Ok(next_sequence)
    }

    fn publish(&self, sequence: i64) {
        self.cursor.set(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, _lo: i64, hi: i64) {
        self.publish(hi);
    }

    fn is_available(&self, sequence: i64) -> bool {
        let current = self.cursor.get();
        sequence <= current && sequence > current - self.buffer_size as i64
    }

    fn highest_published_sequence(&self, _lower_bound: i64, available: i64) -> i64 {
        available
    }

    fn add_gating_sequences(&self, sequences: &[Arc<Sequence>]) {
        self.gating.add(sequences);
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.gating.remove(sequence)
    }
}
