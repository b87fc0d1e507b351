//! Producer coordinators.
//!
//! A sequencer governs slot claim, wrap-point gating, and publication:
//! - `SingleProducerSequencer` - non-synchronizing claim path, cached gating
//! - `MultiProducerSequencer` - atomic claim cursor plus a per-slot
//!   availability word that re-establishes publication order for consumers

mod multi;
mod single;

pub use multi::MultiProducerSequencer;
pub use single::SingleProducerSequencer;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::sequence::{minimum_sequence, Sequence};
use crate::wait::WaitStrategy;

/// Coordinates claim and publication of sequences over one ring.
pub trait Sequencer: Send + Sync {
    fn buffer_size(&self) -> usize;

    /// The published-claim counter. Barriers wait on this handle.
    fn cursor(&self) -> Arc<Sequence>;

    fn wait_strategy(&self) -> Arc<dyn WaitStrategy>;

    /// Non-claiming probe: could `required` consecutive sequences be claimed now?
    fn has_available_capacity(&self, required: usize) -> bool;

    /// Free slots between the producers and the slowest gating sequence.
    fn remaining_capacity(&self) -> i64;

    /// Claim the next sequence, blocking while the ring is full.
    fn next(&self) -> Result<i64> {
        self.next_n(1)
    }

    /// Claim `n` consecutive sequences, blocking while the ring is full.
    /// Returns the highest claimed sequence.
    fn next_n(&self, n: usize) -> Result<i64>;

    /// Claim the next sequence without blocking.
    fn try_next(&self) -> Result<i64> {
        self.try_next_n(1)
    }

    /// Claim `n` consecutive sequences without blocking.
    ///
    /// Fails with [`SluiceError::InsufficientCapacity`] when the claim would
    /// overwrite an unconsumed slot.
    ///
    /// [`SluiceError::InsufficientCapacity`]: crate::SluiceError::InsufficientCapacity
    fn try_next_n(&self, n: usize) -> Result<i64>;

    /// Mark `sequence` published and wake blocked waiters.
    fn publish(&self, sequence: i64);

    /// Mark the inclusive range `[lo, hi]` published and wake blocked waiters.
    fn publish_range(&self, lo: i64, hi: i64);

    /// True when `sequence` has been published and not yet lapped.
    fn is_available(&self, sequence: i64) -> bool;

    /// Highest sequence in `[lower_bound, available]` with no publication gap
    /// below it. Identity for a single producer.
    fn highest_published_sequence(&self, lower_bound: i64, available: i64) -> i64;

    /// Register consumer sequences that producers must not overtake.
    fn add_gating_sequences(&self, sequences: &[Arc<Sequence>]);

    /// Deregister a gating sequence. Returns whether it was present.
    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool;
}

/// Set of consumer sequences gating the producers.
///
/// Mutation is restricted to quiescent periods by convention; the read path
/// is taken on every wrap check.
#[derive(Default)]
pub(crate) struct GatingSequences {
    inner: RwLock<Vec<Arc<Sequence>>>,
}

impl GatingSequences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, sequences: &[Arc<Sequence>]) {
        self.inner.write().extend(sequences.iter().cloned());
    }

    pub fn remove(&self, sequence: &Arc<Sequence>) -> bool {
        let mut inner = self.inner.write();
        match inner.iter().position(|s| Arc::ptr_eq(s, sequence)) {
            Some(idx) => {
                inner.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Minimum over the set, or `default_value` when empty.
    pub fn minimum(&self, default_value: i64) -> i64 {
        minimum_sequence(&self.inner.read(), default_value)
    }
}

pub(crate) fn check_buffer_size(buffer_size: usize) -> Result<()> {
    if buffer_size == 0 || !buffer_size.is_power_of_two() {
        return Err(crate::error::SluiceError::InvalidArgument(
            "buffer size must be a positive power of two",
        ));
    }
    Ok(())
}
