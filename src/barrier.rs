//! Consumer-side dependency barrier.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::sequence::Sequence;
use crate::sequencer::Sequencer;
use crate::wait::WaitStrategy;

/// Bridges the producer cursor, upstream consumer sequences, and a wait
/// strategy into one blocking point.
///
/// A barrier never owns its collaborators: cursor and dependents belong to
/// the sequencer and the upstream processors, and many barriers may share
/// one cursor. Dropping a barrier halts nothing - processors are halted
/// explicitly.
pub struct SequenceBarrier {
    wait_strategy: Arc<dyn WaitStrategy>,
    cursor: Arc<Sequence>,
    dependents: Box<[Arc<Sequence>]>,
    sequencer: Arc<dyn Sequencer>,
    alerted: AtomicBool,
}

impl SequenceBarrier {
    pub(crate) fn new(
        sequencer: Arc<dyn Sequencer>,
        dependents: Vec<Arc<Sequence>>,
    ) -> Self {
        Self {
            wait_strategy: sequencer.wait_strategy(),
            cursor: sequencer.cursor(),
            dependents: dependents.into_boxed_slice(),
            sequencer,
            alerted: AtomicBool::new(false),
        }
    }

    /// Wait until `sequence` is reachable, returning the highest sequence
    /// that may be read contiguously.
    ///
    /// The wait strategy observes `min(cursor, dependents)`; the result is
    /// then clamped to the highest fully published sequence, so a
    /// multi-producer claim gap is never crossed. The return value can be
    /// below `sequence` when the gap sits exactly there.
    ///
    /// Fails with [`SluiceError::Alerted`] after [`alert`] has been called.
    ///
    /// [`SluiceError::Alerted`]: crate::SluiceError::Alerted
    /// [`alert`]: SequenceBarrier::alert
    pub fn wait_for(&self, sequence: i64) -> Result<i64> {
        let available =
            self.wait_strategy
                .wait_for(sequence, &self.cursor, &self.dependents, &self.alerted)?;
        Ok(self
            .sequencer
            .highest_published_sequence(sequence, available))
    }

    /// Raise the alert flag and wake blocked waiters.
    pub fn alert(&self) {
        self.alerted.store(true, Ordering::Release);
        self.wait_strategy.signal_all_when_blocking();
    }

    /// Reset the alert flag so `wait_for` can progress again.
    pub fn clear_alert(&self) {
        self.alerted.store(false, Ordering::Release);
    }

    pub fn is_alerted(&self) -> bool {
        self.alerted.load(Ordering::Acquire)
    }

    /// Current value of the cursor this barrier tracks.
    pub fn cursor(&self) -> i64 {
        self.cursor.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SluiceError;
    use crate::sequencer::{MultiProducerSequencer, SingleProducerSequencer};
    use crate::wait::BusySpinWaitStrategy;
    use std::thread;

    fn single_barrier(dependents: Vec<Arc<Sequence>>) -> (Arc<dyn Sequencer>, SequenceBarrier) {
        let sequencer: Arc<dyn Sequencer> =
            Arc::new(SingleProducerSequencer::new(64, Arc::new(BusySpinWaitStrategy)).unwrap());
        let barrier = SequenceBarrier::new(Arc::clone(&sequencer), dependents);
        (sequencer, barrier)
    }

    #[test]
    fn test_tracks_cursor_alone_with_no_dependents() {
        let (sequencer, barrier) = single_barrier(Vec::new());
        let hi = sequencer.next_n(3).unwrap();
        sequencer.publish(hi);
        assert_eq!(barrier.wait_for(0).unwrap(), 2);
        assert_eq!(barrier.cursor(), 2);
    }

    #[test]
    fn test_dependents_gate_the_return() {
        let upstream = Arc::new(Sequence::default());
        let (sequencer, barrier) = single_barrier(vec![Arc::clone(&upstream)]);

        let hi = sequencer.next_n(8).unwrap();
        sequencer.publish(hi);
        upstream.set(4);
        assert_eq!(barrier.wait_for(0).unwrap(), 4);
    }

    #[test]
    fn test_alert_interrupts_wait() {
        let (_sequencer, barrier) = single_barrier(Vec::new());
        let barrier = Arc::new(barrier);

        let waiter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.wait_for(0))
        };
        thread::sleep(std::time::Duration::from_millis(1));
        barrier.alert();

        assert_eq!(waiter.join().unwrap().unwrap_err(), SluiceError::Alerted);
        assert!(barrier.is_alerted());
    }

    #[test]
    fn test_clear_alert_restores_progress() {
        let (sequencer, barrier) = single_barrier(Vec::new());
        barrier.alert();
        assert_eq!(barrier.wait_for(0).unwrap_err(), SluiceError::Alerted);

        barrier.clear_alert();
        let hi = sequencer.next().unwrap();
        sequencer.publish(hi);
        assert_eq!(barrier.wait_for(0).unwrap(), 0);
    }

    #[test]
    fn test_multi_producer_gap_is_not_crossed() {
        let sequencer: Arc<dyn Sequencer> =
            Arc::new(MultiProducerSequencer::new(64, Arc::new(BusySpinWaitStrategy)).unwrap());
        let barrier = SequenceBarrier::new(Arc::clone(&sequencer), Vec::new());

        let hi = sequencer.next_n(3).unwrap();
        sequencer.publish(hi - 2);
        // Cursor says 2, but 1 is a gap: nothing past 0 may be returned.
        assert_eq!(barrier.wait_for(0).unwrap(), 0);

        sequencer.publish(hi - 1);
        sequencer.publish(hi);
        assert_eq!(barrier.wait_for(1).unwrap(), 2);
    }
}
