//! Consumer Barrier Implementation
//!
//! A consumer barrier answers one question for a consumer: which is the
//! highest sequence it may read right now? The answer is the minimum of the
//! ring's cursor and the sequences of every upstream consumer it depends on,
//! which is what makes staged pipelines possible.

use crate::disruptor::{DisruptorError, Result, Sequence, WaitStrategy};
use std::sync::atomic::{fence, AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Coordination point between a consumer, the cursor and its dependencies
///
/// Each barrier carries its own alert flag, so halting one consumer never
/// disturbs another consumer waiting on the same ring.
#[derive(Debug)]
pub struct ConsumerBarrier<W: WaitStrategy> {
    cursor: Arc<Sequence>,
    wait_strategy: Arc<W>,
    dependent_sequences: Vec<Arc<Sequence>>,
    alerted: Arc<AtomicBool>,
}

impl<W: WaitStrategy> ConsumerBarrier<W> {
    /// Create a barrier over `cursor` and the given upstream sequences
    ///
    /// Usually obtained through `RingBuffer::create_consumer_barrier`.
    pub fn new(
        cursor: Arc<Sequence>,
        wait_strategy: Arc<W>,
        dependent_sequences: Vec<Arc<Sequence>>,
    ) -> Self {
        Self {
            cursor,
            wait_strategy,
            dependent_sequences,
            alerted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wait until `sequence` is safe to read
    ///
    /// # Returns
    /// The highest sequence safe to read, which may be beyond `sequence`
    ///
    /// # Errors
    /// Returns `DisruptorError::Alert` if the barrier is alerted
    pub fn wait_for(&self, sequence: i64) -> Result<i64> {
        self.check_alert()?;

        let available_sequence = self.wait_strategy.wait_for(
            sequence,
            &self.cursor,
            &self.dependent_sequences,
            &self.alerted,
        )?;

        fence(Ordering::Acquire);
        Ok(available_sequence)
    }

    /// Wait until `sequence` is safe to read or `timeout` has elapsed
    ///
    /// # Returns
    /// The highest sequence safe to read. On timeout this is lower than
    /// `sequence`: `-1` on a ring nothing has been committed to yet.
    ///
    /// # Errors
    /// Returns `DisruptorError::Alert` if the barrier is alerted
    pub fn wait_for_timeout(&self, sequence: i64, timeout: Duration) -> Result<i64> {
        self.check_alert()?;

        let available_sequence = self.wait_strategy.wait_for_timeout(
            sequence,
            &self.cursor,
            &self.dependent_sequences,
            &self.alerted,
            timeout,
        )?;

        fence(Ordering::Acquire);
        Ok(available_sequence)
    }

    /// The ring's published cursor value
    pub fn cursor(&self) -> i64 {
        self.cursor.get()
    }

    /// The upstream sequences this barrier waits on
    pub fn dependent_sequences(&self) -> &[Arc<Sequence>] {
        &self.dependent_sequences
    }

    /// Check whether the barrier has been alerted
    pub fn is_alerted(&self) -> bool {
        self.alerted.load(Ordering::SeqCst)
    }

    /// Alert the barrier and wake any thread waiting on it
    pub fn alert(&self) {
        self.alerted.store(true, Ordering::SeqCst);
        self.wait_strategy.signal_all_when_blocking();
    }

    /// Clear the alert so the barrier can be waited on again
    pub fn clear_alert(&self) {
        self.alerted.store(false, Ordering::SeqCst);
    }

    /// Fail with `DisruptorError::Alert` if the barrier is alerted
    pub fn check_alert(&self) -> Result<()> {
        if self.is_alerted() {
            Err(DisruptorError::Alert)
        } else {
            Ok(())
        }
    }

    /// A handle that can alert this barrier from another thread
    pub(crate) fn alerter(&self) -> BarrierAlerter<W> {
        BarrierAlerter {
            alerted: Arc::clone(&self.alerted),
            wait_strategy: Arc::clone(&self.wait_strategy),
        }
    }
}

/// Detached alert side of a barrier
#[derive(Debug)]
pub(crate) struct BarrierAlerter<W: WaitStrategy> {
    alerted: Arc<AtomicBool>,
    wait_strategy: Arc<W>,
}

impl<W: WaitStrategy> BarrierAlerter<W> {
    pub(crate) fn alert(&self) {
        self.alerted.store(true, Ordering::SeqCst);
        self.wait_strategy.signal_all_when_blocking();
    }
}

impl<W: WaitStrategy> Clone for BarrierAlerter<W> {
    fn clone(&self) -> Self {
        Self {
            alerted: Arc::clone(&self.alerted),
            wait_strategy: Arc::clone(&self.wait_strategy),
        }
    }
}
