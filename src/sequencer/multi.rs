//! Multi-producer sequencer.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::error::{Result, SluiceError};
use crate::sequence::Sequence;
use crate::sequencer::{check_buffer_size, GatingSequences, Sequencer};
use crate::wait::WaitStrategy;

/// Sequencer for concurrent producers.
///
/// The cursor counts claims, not publications: producers advance it
/// atomically and publish out of claim order. Publication is recorded per
/// slot in `available`, where slot `i` holds the availability flag
/// `sequence >> index_shift` - the wrap generation - of its most recent
/// occupant. A sequence is published iff its slot holds its own generation,
/// so a consumer scanning forward stops at the first claimed-but-unpublished
/// gap even when the cursor has advanced past it.
pub struct MultiProducerSequencer {
    buffer_size: usize,
    cursor: Arc<Sequence>,
    wait_strategy: Arc<dyn WaitStrategy>,
    gating: GatingSequences,
    gating_cache: Sequence,
    available: Box<[AtomicI64]>,
    index_mask: usize,
    index_shift: u32,
}

impl MultiProducerSequencer {
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        check_buffer_size(buffer_size)?;

        let available = (0..buffer_size)
            .map(|_| AtomicI64::new(-1))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            buffer_size,
            cursor: Arc::new(Sequence::default()),
            wait_strategy,
            gating: GatingSequences::new(),
            gating_cache: Sequence::default(),
            available,
            index_mask: buffer_size - 1,
            index_shift: buffer_size.trailing_zeros(),
        })
    }

    #[inline]
    fn index_of(&self, sequence: i64) -> usize {
        (sequence as usize) & self.index_mask
    }

    #[inline]
    fn availability_flag(&self, sequence: i64) -> i64 {
        sequence >> self.index_shift
    }

    #[inline]
    fn set_available(&self, sequence: i64) {
        self.available[self.index_of(sequence)]
            .store(self.availability_flag(sequence), Ordering::Release);
    }

    fn has_capacity(&self, required: usize, cursor_value: i64) -> bool {
        let wrap_point = (cursor_value + required as i64) - self.buffer_size as i64;
        let cached_gating = self.gating_cache.get();

        if wrap_point > cached_gating || cached_gating > cursor_value {
            let min_sequence = self.gating.minimum(cursor_value);
            self.gating_cache.set(min_sequence);
            if wrap_point > min_sequence {
                return false;
            }
        }

        true
    }
}

impl Sequencer for MultiProducerSequencer {
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
        self.has_capacity(required, self.cursor.get())
    }

    fn remaining_capacity(&self) -> i64 {
        let produced = self.cursor.get();
        let consumed = self.gating.minimum(produced);
        self.buffer_size as i64 - (produced - consumed)
    }

    fn next_n(&self, n: usize) -> Result<i64> {
        if n < 1 || n > self.buffer_size {
            return Err(SluiceError::InvalidArgument(
                "n must be > 0 and <= buffer size",
            ));
        }

        // Unconditional reservation; the gating spin below provides the
        // backpressure. The non-blocking path must not reserve first - see
        // try_next_n.
        let current = self.cursor.get_and_add(n as i64);
        let next_sequence = current + n as i64;
        let wrap_point = next_sequence - self.buffer_size as i64;
        let cached_gating = self.gating_cache.get();

        if wrap_point > cached_gating || cached_gating > current {
            let mut gating_sequence = self.gating.minimum(current);
            while wrap_point > gating_sequence {
                std::thread::yield_now();
                gating_sequence = self.gating.minimum(current);
            }
            self.gating_cache.set(gating_sequence);
        }

        Ok(next_sequence)
    }

    fn try_next_n(&self, n: usize) -> Result<i64> {
        if n < 1 {
            return Err(SluiceError::InvalidArgument("n must be > 0"));
        }

        loop {
            let current = self.cursor.get();
            let next_sequence = current + n as i64;

            if !self.has_capacity(n, current) {
                return Err(SluiceError::InsufficientCapacity);
            }

            if self.cursor.compare_and_set(current, next_sequence) {
                return Ok(next_sequence);
            }
            std::hint::spin_loop();
        }
    }

    fn publish(&self, sequence: i64) {
        self.set_available(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, lo: i64, hi: i64) {
        for sequence in lo..=hi {
            self.set_available(sequence);
        }
        self.wait_strategy.signal_all_when_blocking();
    }

    fn is_available(&self, sequence: i64) -> bool {
        self.available[self.index_of(sequence)].load(Ordering::Acquire)
            == self.availability_flag(sequence)
    }

    fn highest_published_sequence(&self, lower_bound: i64, available: i64) -> i64 {
        for sequence in lower_bound..=available {
            if !self.is_available(sequence) {
                return sequence - 1;
            }
        }
        available
    }

    fn add_gating_sequences(&self, sequences: &[Arc<Sequence>]) {
        self.gating.add(sequences);
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.gating.remove(sequence)
    }
}
