//! Claim strategies
//!
//! A claim strategy hands out sequences to producers. It owns the claim
//! counter (the highest sequence handed out so far), which runs ahead of the
//! ring's cursor (the highest sequence committed). Before a sequence is
//! handed out the strategy waits until the slowest tracked consumer has moved
//! far enough that the slot is free again.

use crate::disruptor::sequence::get_minimum_sequence;
use crate::disruptor::{Sequence, INITIAL_CURSOR_VALUE};
use crossbeam_utils::Backoff;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// Strategy used by producers to claim sequences in the ring buffer
pub trait ClaimStrategy: Send + Sync + Debug {
    /// The ring capacity this strategy gates against
    fn buffer_size(&self) -> usize;

    /// The highest sequence claimed so far
    fn sequence(&self) -> i64;

    /// Claim the next sequence, waiting while its slot is still in use
    ///
    /// # Arguments
    /// * `dependents` - Consumer sequences the claim must not overtake
    fn increment_and_get(&self, dependents: &[Arc<Sequence>]) -> i64 {
        self.increment_and_get_n(1, dependents)
    }

    /// Claim `delta` contiguous sequences and return the highest of them
    fn increment_and_get_n(&self, delta: i64, dependents: &[Arc<Sequence>]) -> i64;

    /// Move the claim counter to an explicit sequence
    ///
    /// Waits for the slot like a normal claim but skips every ordering check.
    fn set_sequence(&self, sequence: i64, dependents: &[Arc<Sequence>]);

    /// Wait until the slot for `sequence` no longer holds an unconsumed entry
    fn ensure_available(&self, sequence: i64, dependents: &[Arc<Sequence>]);

    /// Wait until every sequence before this commit has been committed
    ///
    /// # Arguments
    /// * `cursor` - The ring's published cursor
    /// * `sequence` - The highest sequence about to be committed
    /// * `batch_size` - How many sequences end at `sequence`
    fn serialise_publishing(&self, cursor: &Sequence, sequence: i64, batch_size: i64);
}

/// Spin until `wrap_point` no longer passes the slowest dependent
///
/// Returns the minimum dependent sequence that satisfied the check.
fn wait_for_free_slot(wrap_point: i64, dependents: &[Arc<Sequence>]) -> i64 {
    let backoff = Backoff::new();
    loop {
        let minimum = get_minimum_sequence(dependents);
        if wrap_point <= minimum {
            return minimum;
        }
        backoff.snooze();
    }
}

/// Spin until the cursor has reached the sequence just before this commit
fn wait_for_predecessors(cursor: &Sequence, sequence: i64, batch_size: i64) {
    let expected_sequence = sequence - batch_size;
    let backoff = Backoff::new();
    while cursor.get() < expected_sequence {
        backoff.snooze();
    }
}

/// Claim strategy for exactly one producer thread
///
/// Claims never retry. A claim that loses a race against another thread
/// panics instead of handing out a sequence twice, so two producers on this
/// strategy are a bug that shows up rather than corrupted entries. Commits
/// still wait for their predecessors, which with one producer never spins.
#[derive(Debug)]
pub struct SingleThreadedStrategy {
    buffer_size: i64,
    claim_sequence: Sequence,
    min_gating_sequence: Sequence,
}

impl SingleThreadedStrategy {
    /// Create a strategy for a ring of `buffer_size` slots
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size as i64,
            claim_sequence: Sequence::new(INITIAL_CURSOR_VALUE),
            min_gating_sequence: Sequence::new(INITIAL_CURSOR_VALUE),
        }
    }
}

impl ClaimStrategy for SingleThreadedStrategy {
    fn buffer_size(&self) -> usize {
        self.buffer_size as usize
    }

    fn sequence(&self) -> i64 {
        self.claim_sequence.get()
    }

    fn increment_and_get_n(&self, delta: i64, dependents: &[Arc<Sequence>]) -> i64 {
        let current = self.claim_sequence.get();
        let next_sequence = current + delta;
        assert!(
            self.claim_sequence.compare_and_set(current, next_sequence),
            "single-threaded claim strategy used by more than one producer"
        );
        self.ensure_available(next_sequence, dependents);
        next_sequence
    }

    fn set_sequence(&self, sequence: i64, dependents: &[Arc<Sequence>]) {
        self.claim_sequence.set(sequence);
        self.ensure_available(sequence, dependents);
    }

    fn ensure_available(&self, sequence: i64, dependents: &[Arc<Sequence>]) {
        let wrap_point = sequence - self.buffer_size;
        if wrap_point > self.min_gating_sequence.get() {
            let minimum = wait_for_free_slot(wrap_point, dependents);
            self.min_gating_sequence.set(minimum);
        }
    }

    fn serialise_publishing(&self, cursor: &Sequence, sequence: i64, batch_size: i64) {
        wait_for_predecessors(cursor, sequence, batch_size);
    }
}

/// Claim strategy for any number of producer threads
///
/// Sequences are reserved with a compare-and-set loop on the claim counter,
/// so concurrent producers always receive disjoint ranges. Commits are
/// serialised: a producer waits for its predecessor's commit before it moves
/// the cursor, which keeps the published range contiguous.
#[derive(Debug)]
pub struct MultiThreadedStrategy {
    buffer_size: i64,
    claim_sequence: Sequence,
    min_gating_sequence: Sequence,
}

impl MultiThreadedStrategy {
    /// Create a strategy for a ring of `buffer_size` slots
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size as i64,
            claim_sequence: Sequence::new(INITIAL_CURSOR_VALUE),
            min_gating_sequence: Sequence::new(INITIAL_CURSOR_VALUE),
        }
    }
}

impl ClaimStrategy for MultiThreadedStrategy {
    fn buffer_size(&self) -> usize {
        self.buffer_size as usize
    }

    fn sequence(&self) -> i64 {
        self.claim_sequence.get()
    }

    fn increment_and_get_n(&self, delta: i64, dependents: &[Arc<Sequence>]) -> i64 {
        let backoff = Backoff::new();
        loop {
            let current = self.claim_sequence.get();
            let next_sequence = current + delta;
            let wrap_point = next_sequence - self.buffer_size;

            if wrap_point > self.min_gating_sequence.get() {
                let minimum = get_minimum_sequence(dependents);
                if wrap_point > minimum {
                    backoff.snooze();
                    continue;
                }
                // A racing producer may store an older minimum; that only
                // makes the next check refresh sooner.
                self.min_gating_sequence.set(minimum);
            }

            if self.claim_sequence.compare_and_set(current, next_sequence) {
                return next_sequence;
            }
            backoff.spin();
        }
    }

    fn set_sequence(&self, sequence: i64, dependents: &[Arc<Sequence>]) {
        self.claim_sequence.set(sequence);
        self.ensure_available(sequence, dependents);
    }

    fn ensure_available(&self, sequence: i64, dependents: &[Arc<Sequence>]) {
        let wrap_point = sequence - self.buffer_size;
        if wrap_point > self.min_gating_sequence.get() {
            let minimum = wait_for_free_slot(wrap_point, dependents);
            self.min_gating_sequence.set(minimum);
        }
    }

    fn serialise_publishing(&self, cursor: &Sequence, sequence: i64, batch_size: i64) {
        wait_for_predecessors(cursor, sequence, batch_size);
    }
}

/// Selects a claim strategy by name, e.g. from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStrategyOption {
    /// One producer thread, claims from a second thread panic
    #[default]
    SingleThreaded,
    /// Any number of producer threads, CAS claims and serialised commits
    MultiThreaded,
}

impl ClaimStrategyOption {
    /// Build the selected strategy for a ring of `buffer_size` slots
    pub fn new_instance(self, buffer_size: usize) -> ClaimStrategyKind {
        match self {
            ClaimStrategyOption::SingleThreaded => {
                ClaimStrategyKind::SingleThreaded(SingleThreadedStrategy::new(buffer_size))
            }
            ClaimStrategyOption::MultiThreaded => {
                ClaimStrategyKind::MultiThreaded(MultiThreadedStrategy::new(buffer_size))
            }
        }
    }
}

/// A claim strategy chosen at runtime, dispatched with a `match`
#[derive(Debug)]
pub enum ClaimStrategyKind {
    /// See [`SingleThreadedStrategy`]
    SingleThreaded(SingleThreadedStrategy),
    /// See [`MultiThreadedStrategy`]
    MultiThreaded(MultiThreadedStrategy),
}

impl ClaimStrategyKind {
    /// The option this strategy was built from
    pub fn option(&self) -> ClaimStrategyOption {
        match self {
            ClaimStrategyKind::SingleThreaded(_) => ClaimStrategyOption::SingleThreaded,
            ClaimStrategyKind::MultiThreaded(_) => ClaimStrategyOption::MultiThreaded,
        }
    }
}

impl ClaimStrategy for ClaimStrategyKind {
    fn buffer_size(&self) -> usize {
        match self {
            ClaimStrategyKind::SingleThreaded(s) => s.buffer_size(),
            ClaimStrategyKind::MultiThreaded(s) => s.buffer_size(),
        }
    }

    fn sequence(&self) -> i64 {
        match self {
            ClaimStrategyKind::SingleThreaded(s) => s.sequence(),
            ClaimStrategyKind::MultiThreaded(s) => s.sequence(),
        }
    }

    #[inline]
    fn increment_and_get_n(&self, delta: i64, dependents: &[Arc<Sequence>]) -> i64 {
        match self {
            ClaimStrategyKind::SingleThreaded(s) => s.increment_and_get_n(delta, dependents),
            ClaimStrategyKind::MultiThreaded(s) => s.increment_and_get_n(delta, dependents),
        }
    }

    fn set_sequence(&self, sequence: i64, dependents: &[Arc<Sequence>]) {
        match self {
            ClaimStrategyKind::SingleThreaded(s) => s.set_sequence(sequence, dependents),
            ClaimStrategyKind::MultiThreaded(s) => s.set_sequence(sequence, dependents),
        }
    }

    fn ensure_available(&self, sequence: i64, dependents: &[Arc<Sequence>]) {
        match self {
            ClaimStrategyKind::SingleThreaded(s) => s.ensure_available(sequence, dependents),
            ClaimStrategyKind::MultiThreaded(s) => s.ensure_available(sequence, dependents),
        }
    }

    #[inline]
    fn serialise_publishing(&self, cursor: &Sequence, sequence: i64, batch_size: i64) {
        match self {
            ClaimStrategyKind::SingleThreaded(s) => {
                s.serialise_publishing(cursor, sequence, batch_size)
            }
            ClaimStrategyKind::MultiThreaded(s) => {
                s.serialise_publishing(cursor, sequence, batch_size)
            }
        }
    }
}
