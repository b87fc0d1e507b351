//! Work-queue processor and pool: each sequence to exactly one worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::barrier::SequenceBarrier;
use crate::error::{Result, SluiceError};
use crate::handler::WorkHandler;
use crate::processor::ProcessorHandle;
use crate::ring::RingBuffer;
use crate::sequence::Sequence;

/// Consumer driver that competes with its siblings for sequences.
///
/// All workers of a pool share one claim sequence and draw work from it with
/// an atomic add, so every sequence is granted to exactly one worker. The
/// worker's own sequence - what the ring gates on - tracks the highest
/// sequence it has completed.
pub struct WorkProcessor<E, W: WorkHandler<E>> {
    ring: Arc<RingBuffer<E>>,
    barrier: Arc<SequenceBarrier>,
    handler: W,
    work_sequence: Arc<Sequence>,
    sequence: Arc<Sequence>,
    running: Arc<AtomicBool>,
    end_inclusive: i64,
    claim_batch: i64,
}

impl<E, W: WorkHandler<E>> WorkProcessor<E, W> {
    pub fn new(
        ring: Arc<RingBuffer<E>>,
        barrier: Arc<SequenceBarrier>,
        handler: W,
        work_sequence: Arc<Sequence>,
    ) -> Self {
        Self {
            ring,
            barrier,
            handler,
            work_sequence,
            sequence: Arc::new(Sequence::default()),
            running: Arc::new(AtomicBool::new(false)),
            end_inclusive: i64::MAX,
            claim_batch: 1,
        }
    }

    /// Stop once the claim passes `end_inclusive` (the worker still
    /// publishes its sequence up to the bound).
    pub fn with_end_sequence(mut self, end_inclusive: i64) -> Self {
        self.end_inclusive = end_inclusive;
        self
    }

    /// Claim `n` sequences per draw to cut contention on the shared claim.
    pub fn with_claim_batch(mut self, n: usize) -> Result<Self> {
        if n < 1 {
            return Err(SluiceError::InvalidArgument("claim batch must be >= 1"));
        }
        self.claim_batch = n as i64;
        Ok(self)
    }

    /// This worker's gating sequence: the highest sequence it completed.
    pub fn sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.sequence)
    }

    pub fn handle(&self) -> ProcessorHandle {
        ProcessorHandle::new(Arc::clone(&self.running), Arc::clone(&self.barrier))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run loop. Handler failures are logged and swallowed - a stalled
    /// worker would gate the producers and deadlock the topology - and the
    /// failed sequence still completes.
    pub fn run(&mut self) {
        self.running.store(true, Ordering::Release);
        self.barrier.clear_alert();

        if let Err(error) = self.handler.on_start() {
            warn!(%error, "work handler failed in on_start");
        }

        let ring = Arc::clone(&self.ring);
        let mut next_sequence: i64 = 0;
        let mut claimed_hi: i64 = -1;

        while self.running.load(Ordering::Acquire) {
            if next_sequence > claimed_hi {
                let base = self.work_sequence.get_and_add(self.claim_batch);
                next_sequence = base + 1;
                claimed_hi = base + self.claim_batch;

                if next_sequence > self.end_inclusive {
                    self.sequence.set(self.end_inclusive);
                    break;
                }
                claimed_hi = claimed_hi.min(self.end_inclusive);
            }

            match self.barrier.wait_for(next_sequence) {
                Ok(available) => {
                    if available < next_sequence {
                        continue;
                    }

                    // Deliver the intersection of the claim and the
                    // contiguously-published region.
                    let hi = available.min(claimed_hi);
                    while next_sequence <= hi {
                        // SAFETY: published per the barrier, and granted to
                        // this worker alone by the shared claim.
                        let event = unsafe { ring.slot(next_sequence) };
                        if let Err(error) = self.handler.on_event(event, next_sequence) {
                            warn!(sequence = next_sequence, %error, "work handler failed; continuing");
                        }
                        next_sequence += 1;
                    }
                    self.sequence.set(hi);
                }
                Err(_) => {
                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                }
            }
        }

        if let Err(error) = self.handler.on_shutdown() {
            warn!(%error, "work handler failed in on_shutdown");
        }
        self.running.store(false, Ordering::Release);
    }
}

/// Wires a set of work handlers to one shared claim sequence.
///
/// The pool creates no threads; the embedder takes the processors and drives
/// `run` on threads of its own. Register `worker_sequences` as gating
/// sequences on the ring before producing.
pub struct WorkerPool<E, W: WorkHandler<E>> {
    work_sequence: Arc<Sequence>,
    processors: Vec<WorkProcessor<E, W>>,
}

impl<E, W: WorkHandler<E>> WorkerPool<E, W> {
    pub fn new<I>(ring: &Arc<RingBuffer<E>>, handlers: I) -> Self
    where
        I: IntoIterator<Item = W>,
    {
        let work_sequence = Arc::new(Sequence::default());
        let processors = handlers
            .into_iter()
            .map(|handler| {
                WorkProcessor::new(
                    Arc::clone(ring),
                    ring.new_barrier(&[]),
                    handler,
                    Arc::clone(&work_sequence),
                )
            })
            .collect();

        Self {
            work_sequence,
            processors,
        }
    }

    /// The shared claim sequence.
    pub fn work_sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.work_sequence)
    }

    /// One gating sequence per worker, for `add_gating_sequences`.
    pub fn worker_sequences(&self) -> Vec<Arc<Sequence>> {
        self.processors.iter().map(|p| p.sequence()).collect()
    }

    pub fn handles(&self) -> Vec<ProcessorHandle> {
        self.processors.iter().map(|p| p.handle()).collect()
    }

    /// Halt every worker.
    pub fn halt(&self) {
        for processor in &self.processors {
            processor.handle().halt();
        }
    }

    /// Hand the processors to the embedder's threads.
    pub fn into_workers(self) -> Vec<WorkProcessor<E, W>> {
        self.processors
    }
}
