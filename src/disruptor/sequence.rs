//! Sequence implementation for the ring buffer
//!
//! A `Sequence` tracks progress through the ring and is the only thing
//! producers and consumers share besides the slots themselves. Each one sits
//! on its own cache line so that a busy consumer does not slow down the
//! producer reading its neighbour.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::disruptor::INITIAL_CURSOR_VALUE;

/// A cache-padded sequence counter with acquire/release semantics
///
/// Stores use `Release` and loads use `Acquire`, so a slot written before a
/// `set` is visible to any thread that observes the new value through `get`.
pub struct Sequence {
    value: CachePadded<AtomicI64>,
}

impl Sequence {
    /// Create a new sequence with the given initial value
    pub fn new(initial_value: i64) -> Self {
        Self {
            value: CachePadded::new(AtomicI64::new(initial_value)),
        }
    }

    /// Get the current sequence value
    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Set the sequence value
    #[inline]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Set the sequence value with a full fence
    #[inline]
    pub fn set_volatile(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Atomically replace `expected` with `new`
    ///
    /// # Returns
    /// True if the value was `expected` and has been replaced
    #[inline]
    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Increment and get the new value
    #[inline]
    pub fn increment_and_get(&self) -> i64 {
        self.add_and_get(1)
    }

    /// Add a value and get the new result
    #[inline]
    pub fn add_and_get(&self, increment: i64) -> i64 {
        self.value.fetch_add(increment, Ordering::AcqRel) + increment
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(INITIAL_CURSOR_VALUE)
    }
}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence")
            .field("value", &self.get())
            .finish()
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Get the minimum value across a set of sequences
///
/// Returns `i64::MAX` for an empty slice so that an empty gating set never
/// holds anyone back.
pub fn get_minimum_sequence(sequences: &[Arc<Sequence>]) -> i64 {
    sequences
        .iter()
        .map(|seq| seq.get())
        .min()
        .unwrap_or(i64::MAX)
}

/// A contiguous range of sequences claimed in one step
///
/// The batch is created with the number of slots wanted. The ring buffer
/// fills in the end sequence when the claim succeeds; the start follows from
/// the size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceBatch {
    size: usize,
    end: i64,
}

impl SequenceBatch {
    /// Create an unclaimed batch of `size` sequences
    pub fn new(size: usize) -> Self {
        Self {
            size,
            end: INITIAL_CURSOR_VALUE,
        }
    }

    /// Number of sequences in the batch
    pub fn size(&self) -> usize {
        self.size
    }

    /// First sequence of the batch (inclusive)
    pub fn start(&self) -> i64 {
        self.end - (self.size as i64 - 1)
    }

    /// Last sequence of the batch (inclusive)
    pub fn end(&self) -> i64 {
        self.end
    }

    pub(crate) fn set_end(&mut self, end: i64) {
        self.end = end;
    }
}
