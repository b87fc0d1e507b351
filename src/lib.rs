//! Sluice - lock-free in-process event passing.
//!
//! A bounded, preallocated ring of slots coordinated by monotonic 64-bit
//! sequences (LMAX Disruptor pattern):
//!
//! - `RingBuffer<E>` - slot storage plus the producer/consumer surface
//! - `Sequence` - cache-line-isolated counter, the only cross-thread state
//! - `SequenceBarrier` - consumer-side dependency gate with alert support
//! - wait strategies - busy-spin / yielding / sleeping / blocking backoff
//! - `BatchEventProcessor` - broadcast delivery of every event to a handler
//! - `WorkProcessor` / `WorkerPool` - each event to exactly one worker
//!
//! Topologies (SPSC, broadcast, fan-in, pipeline, diamond, work queue) are
//! composed by wiring barriers to upstream processor sequences and
//! registering the final consumers as gating sequences. The crate never
//! spawns threads - drive each processor's `run` from an embedder thread.

pub mod barrier;
pub mod batch;
pub mod error;
pub mod handler;
pub mod processor;
pub mod ring;
pub mod sequence;
pub mod sequencer;
pub mod wait;
pub mod work;

// Re-export main components
pub use barrier::SequenceBarrier;
pub use batch::BatchPublisher;
pub use error::{Result, SluiceError};
pub use handler::{
    AbsorbErrorSink, ErrorSink, EventHandler, FatalErrorSink, HandlerError, WorkHandler,
};
pub use processor::{BatchEventProcessor, ProcessorHandle};
pub use ring::RingBuffer;
pub use sequence::{minimum_sequence, Sequence};
pub use sequencer::{MultiProducerSequencer, Sequencer, SingleProducerSequencer};
pub use wait::{
    BlockingWaitStrategy, BusySpinWaitStrategy, SleepingWaitStrategy, WaitStrategy,
    YieldingWaitStrategy,
};
pub use work::{WorkProcessor, WorkerPool};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct Event {
        value: i64,
    }

    #[test]
    fn test_single_producer_round_trip() {
        let ring = RingBuffer::with_single_producer(
            Event::default,
            1024,
            Arc::new(YieldingWaitStrategy),
        )
        .unwrap();

        let hi = ring.next_n(3).unwrap();
        for seq in hi - 2..=hi {
            // SAFETY: range claimed above, published below.
            unsafe { ring.slot_mut(seq) }.value = seq;
        }
        ring.publish_range(hi - 2, hi);

        let barrier = ring.new_barrier(&[]);
        assert_eq!(barrier.wait_for(0).unwrap(), 2);
        assert_eq!(unsafe { ring.slot(2) }.value, 2);
    }

    #[test]
    fn test_multi_producer_round_trip() {
        let ring = RingBuffer::with_multi_producer(
            Event::default,
            1024,
            Arc::new(BusySpinWaitStrategy),
        )
        .unwrap();

        ring.publish_with(|e, s| e.value = s + 10).unwrap();
        ring.publish_with(|e, s| e.value = s + 10).unwrap();

        let barrier = ring.new_barrier(&[]);
        assert_eq!(barrier.wait_for(1).unwrap(), 1);
        assert_eq!(unsafe { ring.slot(0) }.value, 10);
        assert_eq!(unsafe { ring.slot(1) }.value, 11);
    }
}
