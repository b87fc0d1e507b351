//! Preallocated ring storage and the producer/consumer surface.

use std::cell::UnsafeCell;
use std::sync::Arc;

use crate::barrier::SequenceBarrier;
use crate::batch::BatchPublisher;
use crate::error::Result;
use crate::sequence::Sequence;
use crate::sequencer::{MultiProducerSequencer, Sequencer, SingleProducerSequencer};
use crate::wait::WaitStrategy;

/// Fixed-size ring of preallocated slots addressed by `sequence & mask`.
///
/// Slot memory is shared and mutable without locks: a slot belongs
/// exclusively to the claimer between `next` and `publish`, then becomes
/// read-only for consumers until every gating sequence has passed it. That
/// contract is enforced by sequence discipline, not the type system, which
/// is why raw slot access is `unsafe` - prefer the closure-based publish
/// helpers where they fit.
pub struct RingBuffer<E> {
    entries: Box<[UnsafeCell<E>]>,
    index_mask: usize,
    sequencer: Arc<dyn Sequencer>,
}

// SAFETY: slots are plain data moved across threads under the claim/publish
// protocol; the sequencer and barrier primitives carry the synchronization.
unsafe impl<E: Send> Send for RingBuffer<E> {}
unsafe impl<E: Send + Sync> Sync for RingBuffer<E> {}

impl<E> RingBuffer<E> {
    /// Ring for exactly one producer thread.
    ///
    /// `factory` is invoked eagerly, exactly `buffer_size` times.
    /// `buffer_size` must be a positive power of two.
    pub fn with_single_producer<F>(
        factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: FnMut() -> E,
    {
        let sequencer = SingleProducerSequencer::new(buffer_size, wait_strategy)?;
        Ok(Self::new(factory, Arc::new(sequencer)))
    }

    /// Ring for concurrent producers.
    pub fn with_multi_producer<F>(
        factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: FnMut() -> E,
    {
        let sequencer = MultiProducerSequencer::new(buffer_size, wait_strategy)?;
        Ok(Self::new(factory, Arc::new(sequencer)))
    }

    fn new<F>(mut factory: F, sequencer: Arc<dyn Sequencer>) -> Self
    where
        F: FnMut() -> E,
    {
        let buffer_size = sequencer.buffer_size();
        let entries = (0..buffer_size)
            .map(|_| UnsafeCell::new(factory()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            entries,
            index_mask: buffer_size - 1,
            sequencer,
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.entries.len()
    }

    /// Current cursor value.
    pub fn cursor(&self) -> i64 {
        self.sequencer.cursor().get()
    }

    /// Handle to the cursor sequence, for topology builders.
    pub fn cursor_sequence(&self) -> Arc<Sequence> {
        self.sequencer.cursor()
    }

    /// Claim the next sequence, blocking while the ring is full.
    pub fn next(&self) -> Result<i64> {
        self.sequencer.next()
    }

    /// Claim `n` consecutive sequences; returns the highest claimed.
    pub fn next_n(&self, n: usize) -> Result<i64> {
        self.sequencer.next_n(n)
    }

    /// Claim the next sequence without blocking.
    pub fn try_next(&self) -> Result<i64> {
        self.sequencer.try_next()
    }

    /// Claim `n` consecutive sequences without blocking.
    pub fn try_next_n(&self, n: usize) -> Result<i64> {
        self.sequencer.try_next_n(n)
    }

    /// Mark `sequence` published.
    ///
    /// Publishing an unclaimed or already-published sequence violates the
    /// slot contract; the result is unspecified delivery, not memory
    /// unsafety by itself.
    pub fn publish(&self, sequence: i64) {
        self.sequencer.publish(sequence);
    }

    /// Mark the inclusive range `[lo, hi]` published.
    pub fn publish_range(&self, lo: i64, hi: i64) {
        self.sequencer.publish_range(lo, hi);
    }

    pub fn is_available(&self, sequence: i64) -> bool {
        self.sequencer.is_available(sequence)
    }

    pub fn has_available_capacity(&self, required: usize) -> bool {
        self.sequencer.has_available_capacity(required)
    }

    pub fn remaining_capacity(&self) -> i64 {
        self.sequencer.remaining_capacity()
    }

    /// Read a slot.
    ///
    /// # Safety
    ///
    /// - `sequence` must be published, and no gating sequence registered on
    ///   this ring may have been removed while still in use.
    /// - The caller's barrier must have returned a value `>= sequence`, or
    ///   the caller must otherwise know the slot is not being rewritten.
    #[inline]
    pub unsafe fn slot(&self, sequence: i64) -> &E {
        &*self.entries[(sequence as usize) & self.index_mask].get()
    }

    /// Write a slot.
    ///
    /// # Safety
    ///
    /// - The caller must own the claim on `sequence` (between `next` and
    ///   `publish`) and must not hold two aliasing references to the slot.
    #[inline]
    #[allow(clippy::mut_from_ref)] // exclusive access via the claim protocol
    pub unsafe fn slot_mut(&self, sequence: i64) -> &mut E {
        &mut *self.entries[(sequence as usize) & self.index_mask].get()
    }

    /// Claim, write, and publish one event, blocking while the ring is full.
    /// Returns the published sequence.
    pub fn publish_with<F>(&self, write: F) -> Result<i64>
    where
        F: FnOnce(&mut E, i64),
    {
        let sequence = self.next()?;
        // SAFETY: exclusive claim on `sequence` until the publish below.
        write(unsafe { self.slot_mut(sequence) }, sequence);
        self.publish(sequence);
        Ok(sequence)
    }

    /// Non-blocking `publish_with`.
    pub fn try_publish_with<F>(&self, write: F) -> Result<i64>
    where
        F: FnOnce(&mut E, i64),
    {
        let sequence = self.try_next()?;
        // SAFETY: exclusive claim on `sequence` until the publish below.
        write(unsafe { self.slot_mut(sequence) }, sequence);
        self.publish(sequence);
        Ok(sequence)
    }

    /// Claim `n` slots, write each, and publish the run with one call.
    /// Returns the published `(lo, hi)` range.
    pub fn publish_batch_with<F>(&self, n: usize, mut write: F) -> Result<(i64, i64)>
    where
        F: FnMut(&mut E, i64),
    {
        let hi = self.next_n(n)?;
        let lo = hi - n as i64 + 1;
        for sequence in lo..=hi {
            // SAFETY: exclusive claim on the whole range until the publish.
            write(unsafe { self.slot_mut(sequence) }, sequence);
        }
        self.publish_range(lo, hi);
        Ok((lo, hi))
    }

    /// Non-blocking `publish_batch_with`.
    pub fn try_publish_batch_with<F>(&self, n: usize, mut write: F) -> Result<(i64, i64)>
    where
        F: FnMut(&mut E, i64),
    {
        let hi = self.try_next_n(n)?;
        let lo = hi - n as i64 + 1;
        for sequence in lo..=hi {
            // SAFETY: exclusive claim on the whole range until the publish.
            write(unsafe { self.slot_mut(sequence) }, sequence);
        }
        self.publish_range(lo, hi);
        Ok((lo, hi))
    }

    /// Barrier over this ring's cursor and the given upstream sequences.
    /// An empty dependency list tracks the cursor alone.
    pub fn new_barrier(&self, dependents: &[Arc<Sequence>]) -> Arc<SequenceBarrier> {
        Arc::new(SequenceBarrier::new(
            Arc::clone(&self.sequencer),
            dependents.to_vec(),
        ))
    }

    /// Register consumer sequences the producers must not overtake.
    pub fn add_gating_sequences(&self, sequences: &[Arc<Sequence>]) {
        self.sequencer.add_gating_sequences(sequences);
    }

    /// Deregister a gating sequence. Returns whether it was present.
    pub fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.sequencer.remove_gating_sequence(sequence)
    }

    /// Helper that claims a run up front and publishes it as one range.
    pub fn batch_publisher(&self) -> BatchPublisher<'_, E> {
        BatchPublisher::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SluiceError;
    use crate::wait::{BusySpinWaitStrategy, YieldingWaitStrategy};

    #[derive(Default)]
    struct Event {
        value: i64,
    }

    fn ring(size: usize) -> RingBuffer<Event> {
        RingBuffer::with_single_producer(Event::default, size, Arc::new(YieldingWaitStrategy))
            .unwrap()
    }

    #[test]
    fn test_rejects_bad_buffer_size() {
        let result =
            RingBuffer::with_single_producer(Event::default, 31, Arc::new(BusySpinWaitStrategy));
        assert!(matches!(result, Err(SluiceError::InvalidArgument(_))));
        assert!(RingBuffer::with_multi_producer(
            Event::default,
            0,
            Arc::new(BusySpinWaitStrategy)
        )
        .is_err());
    }

    #[test]
    fn test_factory_runs_once_per_slot() {
        let mut calls = 0;
        let ring = RingBuffer::with_single_producer(
            || {
                calls += 1;
                Event { value: calls }
            },
            8,
            Arc::new(BusySpinWaitStrategy),
        )
        .unwrap();
        assert_eq!(ring.buffer_size(), 8);

        // Eager construction: every slot is initialized before first claim.
        for seq in 0..8 {
            assert_eq!(unsafe { ring.slot(seq) }.value, seq + 1);
        }
    }

    #[test]
    fn test_buffer_size_one() {
        let ring = ring(1);
        let consumer = Arc::new(Sequence::default());
        ring.add_gating_sequences(&[Arc::clone(&consumer)]);

        assert_eq!(ring.try_publish_with(|e, _| e.value = 1).unwrap(), 0);
        assert_eq!(
            ring.try_publish_with(|e, _| e.value = 2).unwrap_err(),
            SluiceError::InsufficientCapacity
        );
        consumer.set(0);
        assert_eq!(ring.try_publish_with(|e, _| e.value = 2).unwrap(), 1);
        assert_eq!(unsafe { ring.slot(1) }.value, 2);
    }

    #[test]
    fn test_publish_with_round_trip() {
        let ring = ring(8);
        let seq = ring.publish_with(|e, s| e.value = s * 10).unwrap();
        assert_eq!(seq, 0);
        assert!(ring.is_available(0));
        assert_eq!(unsafe { ring.slot(0) }.value, 0);

        let (lo, hi) = ring.publish_batch_with(3, |e, s| e.value = s).unwrap();
        assert_eq!((lo, hi), (1, 3));
        assert_eq!(ring.cursor(), 3);
        for seq in lo..=hi {
            assert_eq!(unsafe { ring.slot(seq) }.value, seq);
        }
    }

    #[test]
    fn test_masked_indexing_wraps() {
        let ring = ring(4);
        let consumer = Arc::new(Sequence::default());
        ring.add_gating_sequences(&[Arc::clone(&consumer)]);

        for i in 0..10 {
            let seq = ring.publish_with(|e, s| e.value = s).unwrap();
            assert_eq!(seq, i);
            consumer.set(seq);
        }
        // Sequence 9 landed in slot 9 & 3 == 1.
        assert_eq!(unsafe { ring.slot(9) }.value, 9);
        assert_eq!(unsafe { ring.slot(5) }.value, 9);
    }

    #[test]
    fn test_gating_registration() {
        let ring = ring(8);
        let seq = Arc::new(Sequence::default());
        ring.add_gating_sequences(&[Arc::clone(&seq)]);
        assert!(ring.remove_gating_sequence(&seq));
        assert!(!ring.remove_gating_sequence(&seq));
    }
}
