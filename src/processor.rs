//! Broadcast event processor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::barrier::SequenceBarrier;
use crate::handler::{ErrorSink, EventHandler, FatalErrorSink};
use crate::ring::RingBuffer;
use crate::sequence::Sequence;

/// Remote control for a running processor.
///
/// The run loop borrows its processor exclusively, so halting from another
/// thread goes through this handle. `halt` is idempotent.
#[derive(Clone)]
pub struct ProcessorHandle {
    running: Arc<AtomicBool>,
    barrier: Arc<SequenceBarrier>,
}

impl ProcessorHandle {
    pub(crate) fn new(running: Arc<AtomicBool>, barrier: Arc<SequenceBarrier>) -> Self {
        Self { running, barrier }
    }

    /// Stop the processor: clear its running flag and alert its barrier.
    pub fn halt(&self) {
        self.running.store(false, Ordering::Release);
        self.barrier.alert();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Drives one handler over a barrier, delivering every published event in
/// sequence order.
///
/// The processor owns its sequence; register it as a gating sequence on the
/// ring so producers cannot lap it. One thread per processor - the embedder
/// supplies the thread and calls [`run`].
///
/// [`run`]: BatchEventProcessor::run
pub struct BatchEventProcessor<E, H: EventHandler<E>> {
    ring: Arc<RingBuffer<E>>,
    barrier: Arc<SequenceBarrier>,
    handler: H,
    sink: Box<dyn ErrorSink<E>>,
    sequence: Arc<Sequence>,
    running: Arc<AtomicBool>,
}

impl<E, H: EventHandler<E>> BatchEventProcessor<E, H> {
    pub fn new(ring: Arc<RingBuffer<E>>, barrier: Arc<SequenceBarrier>, handler: H) -> Self {
        Self {
            ring,
            barrier,
            handler,
            sink: Box::new(FatalErrorSink),
            sequence: Arc::new(Sequence::default()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the default fatal sink.
    pub fn with_error_sink<S>(mut self, sink: S) -> Self
    where
        S: ErrorSink<E> + 'static,
    {
        self.sink = Box::new(sink);
        self
    }

    /// This processor's gating sequence: the highest sequence delivered.
    pub fn sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.sequence)
    }

    pub fn handle(&self) -> ProcessorHandle {
        ProcessorHandle::new(Arc::clone(&self.running), Arc::clone(&self.barrier))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run loop. Returns after [`ProcessorHandle::halt`] or a terminal
    /// handler failure; either way `on_shutdown` has been notified and the
    /// running flag is clear.
    pub fn run(&mut self) {
        self.running.store(true, Ordering::Release);
        self.barrier.clear_alert();

        if let Err(error) = self.handler.on_start() {
            self.sink.handle_on_start_error(error);
        }

        let ring = Arc::clone(&self.ring);
        let mut next_sequence = self.sequence.get() + 1;

        while self.running.load(Ordering::Acquire) {
            match self.barrier.wait_for(next_sequence) {
                Ok(available) => {
                    let mut run_completed = true;
                    for sequence in next_sequence..=available {
                        // SAFETY: the barrier returned `available`, so every
                        // slot up to it is published, and this processor's
                        // gating sequence keeps producers off the range.
                        let event = unsafe { ring.slot(sequence) };
                        if let Err(error) =
                            self.handler.on_event(event, sequence, sequence == available)
                        {
                            // Advance past the failed item so it is never
                            // redelivered, then let the sink pick the fate of
                            // the rest of the run.
                            self.sequence.set(sequence);
                            next_sequence = sequence + 1;
                            run_completed = false;
                            if self
                                .sink
                                .handle_event_error(error, sequence, Some(event))
                                .is_err()
                            {
                                self.running.store(false, Ordering::Release);
                            }
                            break;
                        }
                    }
                    if run_completed {
                        self.sequence.set(available);
                        next_sequence = available + 1;
                    }
                }
                Err(_) => {
                    // Alerted: leave if halted, otherwise re-arm and re-wait.
                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                }
            }
        }

        if let Err(error) = self.handler.on_shutdown() {
            self.sink.handle_on_shutdown_error(error);
        }
        self.running.store(false, Ordering::Release);
    }
}
