//! Cache-line-isolated sequence counter.
//!
//! A `Sequence` is a signed 64-bit counter identifying a slot generation and
//! serving as a synchronization point between producers and consumers. The
//! producer's release store pairs with the consumer's acquire load so slot
//! writes made before `set` are visible after `get`.

use std::sync::atomic::{fence, AtomicI64, Ordering};
use std::sync::Arc;

/// Padded atomic counter (prevents false sharing).
///
/// Alignment forces each instance into its own pair of cache lines, so
/// adjacent sequences in a topology never ping-pong a line between cores.
#[repr(align(128))]
pub struct Sequence {
    value: AtomicI64,
}

impl Sequence {
    /// Value meaning "no sequence ever claimed or published".
    pub const INITIAL_VALUE: i64 = -1;

    pub fn new(initial: i64) -> Self {
        Self {
            value: AtomicI64::new(initial),
        }
    }

    /// Acquire read - use at synchronization points.
    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Relaxed read - hot paths where ordering is not needed.
    #[inline]
    pub fn get_relaxed(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Release write - use at synchronization points.
    #[inline]
    pub fn set(&self, v: i64) {
        self.value.store(v, Ordering::Release);
    }

    /// Relaxed write - owner-local bookkeeping.
    #[inline]
    pub fn set_relaxed(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    /// Release write followed by a full fence.
    ///
    /// Used where a later relaxed load by the same thread must not be
    /// reordered before the store (single-producer wrap gating).
    #[inline]
    pub fn set_volatile(&self, v: i64) {
        self.value.store(v, Ordering::Release);
        fence(Ordering::SeqCst);
    }

    /// Strong compare-and-set. Acquire-release on success, acquire on failure.
    #[inline]
    pub fn compare_and_set(&self, expected: i64, desired: i64) -> bool {
        self.value
            .compare_exchange(expected, desired, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub fn increment_and_get(&self) -> i64 {
        self.add_and_get(1)
    }

    /// Atomically add `delta` and return the new value.
    #[inline]
    pub fn add_and_get(&self, delta: i64) -> i64 {
        self.value.fetch_add(delta, Ordering::AcqRel) + delta
    }

    /// Atomically add `delta` and return the previous value.
    #[inline]
    pub fn get_and_add(&self, delta: i64) -> i64 {
        self.value.fetch_add(delta, Ordering::AcqRel)
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(Self::INITIAL_VALUE)
    }
}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Sequence").field(&self.get_relaxed()).finish()
    }
}

/// Minimum over a set of sequences, or `default_value` when the set is empty.
#[inline]
pub fn minimum_sequence(sequences: &[Arc<Sequence>], default_value: i64) -> i64 {
    if sequences.is_empty() {
        return default_value;
    }

    let mut minimum = i64::MAX;
    for seq in sequences {
        minimum = minimum.min(seq.get());
    }
    minimum
}
