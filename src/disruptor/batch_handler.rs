//! Batch handler contract
//!
//! A [`BatchHandler`] is the user logic a [`BatchConsumer`](crate::disruptor::BatchConsumer)
//! drives. It sees every available entry once, in sequence order, and is told
//! when a batch of available entries has been exhausted so it can flush.

use crate::disruptor::Sequence;
use std::sync::Arc;

/// Callback for processing entries as they become available
///
/// All hooks run on the consumer's thread. Errors returned from them are
/// routed to the consumer's exception handler and never stop the loop on
/// their own.
///
/// # Type Parameters
/// * `T` - The entry type stored in the ring
pub trait BatchHandler<T>: Send {
    /// Called once per available entry, in sequence order
    ///
    /// # Arguments
    /// * `entry` - The committed entry
    /// * `sequence` - Its sequence
    fn on_available(&mut self, entry: &T, sequence: i64) -> anyhow::Result<()>;

    /// Called after the last entry of each batch
    fn on_end_of_batch(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once before the first entry is processed
    fn on_start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once after the consumer loop has exited
    fn on_shutdown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Receive a callback that can report progress before the batch ends
    ///
    /// Handlers that release entries early, after an asynchronous flush for
    /// example, keep the callback and call
    /// [`SequenceTrackerCallback::on_completed`]. The default ignores it.
    fn set_sequence_tracker_callback(&mut self, _callback: SequenceTrackerCallback) {}
}

/// Lets a handler publish its consumer's progress ahead of the batch end
///
/// The consumer still moves its sequence to the end of every batch; the
/// callback only allows producers to reuse slots sooner.
#[derive(Debug, Clone)]
pub struct SequenceTrackerCallback {
    sequence: Arc<Sequence>,
}

impl SequenceTrackerCallback {
    pub(crate) fn new(sequence: Arc<Sequence>) -> Self {
        Self { sequence }
    }

    /// Mark every entry up to and including `sequence` as processed
    pub fn on_completed(&self, sequence: i64) {
        self.sequence.set(sequence);
    }
}

/// A handler built from a closure
///
/// # Examples
///
/// ```
/// use batchring::disruptor::{BatchHandler, ClosureBatchHandler};
///
/// let mut handler = ClosureBatchHandler::new(|value: &i64, sequence: i64| {
///     anyhow::ensure!(*value >= 0, "negative value at {sequence}");
///     Ok(())
/// });
/// assert!(handler.on_available(&3, 0).is_ok());
/// assert!(handler.on_available(&-3, 1).is_err());
/// ```
pub struct ClosureBatchHandler<F> {
    handler_fn: F,
}

impl<F> ClosureBatchHandler<F> {
    /// Wrap `handler_fn` as the `on_available` hook
    pub fn new(handler_fn: F) -> Self {
        Self { handler_fn }
    }
}

impl<T, F> BatchHandler<T> for ClosureBatchHandler<F>
where
    F: FnMut(&T, i64) -> anyhow::Result<()> + Send,
{
    fn on_available(&mut self, entry: &T, sequence: i64) -> anyhow::Result<()> {
        (self.handler_fn)(entry, sequence)
    }
}
