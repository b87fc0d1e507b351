//! Wait strategies - how a consumer blocks until a sequence becomes visible.
//!
//! - `BusySpinWaitStrategy` - tight spin, lowest latency, burns a core
//! - `YieldingWaitStrategy` - spin then cooperative yield
//! - `SleepingWaitStrategy` - spin, yield, then short sleeps
//! - `BlockingWaitStrategy` - condition variable, lowest CPU
//!
//! A strategy observes `min(cursor, dependents)` and returns once it reaches
//! the requested sequence, or fails with `Alerted` when the barrier's alert
//! flag is raised. Strategies are shared across many barriers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, SluiceError};
use crate::sequence::{minimum_sequence, Sequence};

/// Backoff and wake-up policy used by a consumer barrier.
pub trait WaitStrategy: Send + Sync {
    /// Wait until `min(cursor, dependents)` reaches `sequence`.
    ///
    /// Returns the observed sequence, which is `>= sequence` on success.
    /// Fails with [`SluiceError::Alerted`] once `alerted` is observed true.
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64>;

    /// Wake any waiter parked in `wait_for`. No-op for non-parking strategies.
    fn signal_all_when_blocking(&self) {}
}

#[inline]
fn observable(cursor: &Sequence, dependents: &[Arc<Sequence>]) -> i64 {
    if dependents.is_empty() {
        cursor.get()
    } else {
        minimum_sequence(dependents, cursor.get())
    }
}

/// Tight spin with a CPU pause hint per iteration.
///
/// Checks alert every 256 iterations to keep the flag off the hot path.
#[derive(Debug, Default)]
pub struct BusySpinWaitStrategy;

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64> {
        let mut counter = 0u32;
        loop {
            counter = counter.wrapping_add(1);
            if counter & 0xFF == 0 && alerted.load(Ordering::Relaxed) {
                return Err(SluiceError::Alerted);
            }

            let available = observable(cursor, dependents);
            if available >= sequence {
                return Ok(available);
            }

            std::hint::spin_loop();
        }
    }
}

/// Spin for a fixed budget, then yield to the scheduler.
///
/// Alert is only checked when the spin budget is exhausted.
#[derive(Debug, Default)]
pub struct YieldingWaitStrategy;

impl YieldingWaitStrategy {
    const SPIN_TRIES: u32 = 100;
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64> {
        let mut counter = Self::SPIN_TRIES;
        loop {
            let available = observable(cursor, dependents);
            if available >= sequence {
                return Ok(available);
            }

            if counter == 0 {
                if alerted.load(Ordering::Relaxed) {
                    return Err(SluiceError::Alerted);
                }
                std::thread::yield_now();
                counter = Self::SPIN_TRIES;
            } else {
                counter -= 1;
                std::hint::spin_loop();
            }
        }
    }
}

/// Progressive backoff: spin, then yield, then short sleeps.
#[derive(Debug, Default)]
pub struct SleepingWaitStrategy;

impl SleepingWaitStrategy {
    const SPIN_TRIES: u32 = 200;
    const YIELD_TRIES: u32 = 100;
    const SLEEP: Duration = Duration::from_nanos(100);
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64> {
        let mut counter = Self::SPIN_TRIES + Self::YIELD_TRIES;
        loop {
            if alerted.load(Ordering::Relaxed) {
                return Err(SluiceError::Alerted);
            }

            let available = observable(cursor, dependents);
            if available >= sequence {
                return Ok(available);
            }

            if counter > Self::YIELD_TRIES {
                counter -= 1;
                std::hint::spin_loop();
            } else if counter > 0 {
                counter -= 1;
                std::thread::yield_now();
            } else {
                std::thread::sleep(Self::SLEEP);
            }
        }
    }
}

/// Condition-variable wait with a bounded timeout as a liveness guard.
///
/// Producers call `signal_all_when_blocking` on publish; the short timeout
/// covers a signal racing ahead of the wait.
#[derive(Default)]
pub struct BlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl BlockingWaitStrategy {
    const GUARD: Duration = Duration::from_micros(50);

    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64> {
        let mut guard = self.mutex.lock();
        loop {
            if alerted.load(Ordering::Acquire) {
                return Err(SluiceError::Alerted);
            }

            let available = observable(cursor, dependents);
            if available >= sequence {
                return Ok(available);
            }

            self.condvar.wait_for(&mut guard, Self::GUARD);
        }
    }

    fn signal_all_when_blocking(&self) {
        self.condvar.notify_all();
    }
}
