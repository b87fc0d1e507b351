//! Batch publisher - ergonomic wrapper over `next_n`/`publish_range`.

use crate::error::{Result, SluiceError};
use crate::ring::RingBuffer;

/// Claims a contiguous run of slots, exposes each by index, and publishes
/// the whole run with a single range publish.
///
/// Equivalent to driving the ring directly; this only encapsulates the
/// lo/hi bookkeeping. A claimed range must always be published to keep
/// consumers progressing, so dropping a publisher with an open batch
/// publishes whatever state the slots hold, and re-opening a batch before
/// `end()` is rejected rather than losing the open claim.
pub struct BatchPublisher<'a, E> {
    ring: &'a RingBuffer<E>,
    lo: i64,
    hi: i64,
    open: bool,
}

impl<'a, E> BatchPublisher<'a, E> {
    pub(crate) fn new(ring: &'a RingBuffer<E>) -> Self {
        Self {
            ring,
            lo: 0,
            hi: -1,
            open: false,
        }
    }

    /// Claim `n` slots, blocking while the ring is full.
    ///
    /// Fails with `InvalidArgument` while the previous batch is still open.
    pub fn begin(&mut self, n: usize) -> Result<()> {
        if self.open {
            return Err(SluiceError::InvalidArgument("previous batch not ended"));
        }
        self.hi = self.ring.next_n(n)?;
        self.lo = self.hi - n as i64 + 1;
        self.open = true;
        Ok(())
    }

    /// Claim `n` slots without blocking.
    ///
    /// Fails with `InvalidArgument` while the previous batch is still open.
    pub fn try_begin(&mut self, n: usize) -> Result<()> {
        if self.open {
            return Err(SluiceError::InvalidArgument("previous batch not ended"));
        }
        self.hi = self.ring.try_next_n(n)?;
        self.lo = self.hi - n as i64 + 1;
        self.open = true;
        Ok(())
    }

    /// Number of slots in the current batch.
    pub fn len(&self) -> usize {
        if self.open {
            (self.hi - self.lo + 1) as usize
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sequence of the slot at `index` within the batch.
    pub fn sequence(&self, index: usize) -> i64 {
        assert!(index < self.len(), "index outside the claimed batch");
        self.lo + index as i64
    }

    /// Writable slot at `index` within the batch.
    pub fn event_mut(&mut self, index: usize) -> &mut E {
        assert!(index < self.len(), "index outside the claimed batch");
        // SAFETY: the batch holds the exclusive claim on [lo, hi] and the
        // &mut receiver prevents aliasing borrows.
        unsafe { self.ring.slot_mut(self.lo + index as i64) }
    }

    /// Publish the whole claimed range.
    pub fn end(&mut self) {
        if self.open {
            self.ring.publish_range(self.lo, self.hi);
            self.open = false;
        }
    }

    /// Publish only the first `count` slots of the claimed range.
    ///
    /// The remainder of the claim stays claimed and unpublished: those
    /// sequences are never reissued, and consumers on a multi-producer ring
    /// cannot advance past the gap.
    pub fn end_partial(&mut self, count: usize) {
        assert!(
            count > 0 && count <= self.len(),
            "count outside the claimed batch"
        );
        self.ring.publish_range(self.lo, self.lo + count as i64 - 1);
        self.open = false;
    }
}

impl<E> Drop for BatchPublisher<'_, E> {
    fn drop(&mut self) {
        self.end();
    }
}
