//! Consumer contract
//!
//! Anything that reports progress through a `Sequence` can gate producers or
//! act as an upstream dependency for another consumer.

use crate::disruptor::Sequence;
use std::sync::Arc;

/// A participant that processes entries and publishes its progress
pub trait Consumer {
    /// The sequence of the last entry this consumer has fully processed
    fn sequence(&self) -> Arc<Sequence>;

    /// Ask the consumer to stop
    ///
    /// Must be idempotent and callable from any thread.
    fn halt(&self);
}

/// A consumer that never processes anything and mirrors a given sequence
///
/// Handy when producers must be gated on the cursor itself, or as a
/// placeholder in tests where no real consumer runs.
#[derive(Debug)]
pub struct NoOpConsumer {
    sequence: Arc<Sequence>,
}

impl NoOpConsumer {
    /// Report `sequence` as this consumer's progress
    pub fn new(sequence: Arc<Sequence>) -> Self {
        Self { sequence }
    }
}

impl Consumer for NoOpConsumer {
    fn sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.sequence)
    }

    fn halt(&self) {}
}

/// Collect the sequences of a set of consumers
pub(crate) fn consumer_sequences(consumers: &[&dyn Consumer]) -> Vec<Arc<Sequence>> {
    consumers.iter().map(|consumer| consumer.sequence()).collect()
}
