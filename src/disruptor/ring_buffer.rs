//! Ring Buffer Implementation
//!
//! The ring buffer owns a fixed array of preallocated entries, the published
//! cursor, a claim strategy for producers and a wait strategy shared with the
//! barriers it hands out. Entries are addressed by `sequence & (capacity - 1)`
//! and are reused forever; nothing is allocated after construction.
//!
//! A producer claims a sequence, writes the entry through the returned
//! [`ClaimedEntry`] and commits it. Committing is the only way the cursor
//! moves, and the cursor store is a release so the write is visible to any
//! consumer that observes the new cursor.

use crate::disruptor::consumer::consumer_sequences;
use crate::disruptor::sequence::get_minimum_sequence;
use crate::disruptor::{
    is_power_of_two, ClaimStrategy, ClaimStrategyKind, ClaimStrategyOption, Consumer,
    ConsumerBarrier, DisruptorError, EntryFactory, Result, RingBufferConfig, Sequence,
    SequenceBatch, WaitStrategy, WaitStrategyKind, WaitStrategyOption,
};
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Preallocated ring of reusable entries
///
/// # Type Parameters
/// * `T` - The entry type stored in the ring
/// * `C` - The claim strategy producers use
/// * `W` - The wait strategy consumers use
pub struct RingBuffer<T, C: ClaimStrategy, W: WaitStrategy> {
    entries: Box<[UnsafeCell<T>]>,
    index_mask: i64,
    cursor: Arc<Sequence>,
    claim_strategy: C,
    wait_strategy: Arc<W>,
    tracked_sequences: OnceLock<Box<[Arc<Sequence>]>>,
}

impl<T, C: ClaimStrategy, W: WaitStrategy> RingBuffer<T, C, W> {
    /// Create a ring buffer and fill every slot from `entry_factory`
    ///
    /// # Arguments
    /// * `entry_factory` - Called once per slot
    /// * `capacity` - Number of slots, must be a power of 2
    /// * `claim_strategy` - Built for the same `capacity`
    /// * `wait_strategy` - Shared with every barrier of this ring
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidBufferSize` if `capacity` is not a power
    /// of 2 and `DisruptorError::InvalidConfig` if the claim strategy was
    /// built for a different capacity
    pub fn new<F>(
        entry_factory: F,
        capacity: usize,
        claim_strategy: C,
        wait_strategy: W,
    ) -> Result<Self>
    where
        F: EntryFactory<T>,
    {
        if !is_power_of_two(capacity) {
            return Err(DisruptorError::InvalidBufferSize(capacity));
        }
        if claim_strategy.buffer_size() != capacity {
            return Err(DisruptorError::InvalidConfig(format!(
                "claim strategy gates a ring of {} slots, ring has {capacity}",
                claim_strategy.buffer_size()
            )));
        }

        let entries: Box<[UnsafeCell<T>]> = (0..capacity)
            .map(|_| UnsafeCell::new(entry_factory.create()))
            .collect();

        debug!(capacity, ?claim_strategy, ?wait_strategy, "ring buffer created");

        Ok(Self {
            entries,
            index_mask: (capacity - 1) as i64,
            cursor: Arc::new(Sequence::default()),
            claim_strategy,
            wait_strategy: Arc::new(wait_strategy),
            tracked_sequences: OnceLock::new(),
        })
    }

    /// Number of slots in the ring
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// The highest committed sequence, `-1` while the ring is empty
    pub fn cursor(&self) -> i64 {
        self.cursor.get()
    }

    /// The cursor itself, for consumers that should mirror it
    pub fn cursor_sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.cursor)
    }

    /// The claim strategy producers go through
    pub fn claim_strategy(&self) -> &C {
        &self.claim_strategy
    }

    /// The wait strategy shared with this ring's barriers
    pub fn wait_strategy(&self) -> &W {
        &self.wait_strategy
    }

    /// Get the entry for `sequence`
    ///
    /// The sequence is masked into the ring and never bounds-checked
    /// otherwise. The caller must only read sequences that are committed and
    /// not yet reclaimed by a producer, which is what a barrier guarantees.
    #[inline]
    pub fn entry(&self, sequence: i64) -> &T {
        // SAFETY: the slot pointer is valid for the lifetime of the ring and
        // readers only touch sequences a barrier has exposed.
        unsafe { &*self.slot(sequence) }
    }

    #[inline]
    fn slot(&self, sequence: i64) -> *mut T {
        let index = (sequence & self.index_mask) as usize;
        // SAFETY: the index mask keeps the index below the capacity.
        unsafe { self.entries.get_unchecked(index).get() }
    }

    #[inline]
    fn tracked(&self) -> &[Arc<Sequence>] {
        self.tracked_sequences.get().map_or(&[], |sequences| sequences)
    }

    /// Claim the next entry for writing
    ///
    /// Spins while the claim would overwrite an entry the slowest tracked
    /// consumer has not processed yet; the ring never reports itself full.
    ///
    /// # Panics
    /// Under [`crate::SingleThreadedStrategy`], panics if another thread
    /// claims at the same time.
    pub fn claim_next(&self) -> ClaimedEntry<'_, T, C, W> {
        let sequence = self.claim_strategy.increment_and_get(self.tracked());
        ClaimedEntry {
            ring_buffer: self,
            sequence,
        }
    }

    /// Claim the entry at an explicit sequence
    ///
    /// Only waits for gating. Pair it with [`RingBuffer::commit_with_force`].
    ///
    /// # Safety
    /// The claim counter is bypassed, so nothing stops another claim from
    /// reaching the same slot. The caller must ensure that no other
    /// [`ClaimedEntry`] or [`ClaimedBatch`] covers the slot of `sequence`
    /// while this entry is alive, and that no producer is claiming
    /// concurrently.
    pub unsafe fn claim_entry_at_sequence(&self, sequence: i64) -> ClaimedEntry<'_, T, C, W> {
        self.claim_strategy.ensure_available(sequence, self.tracked());
        ClaimedEntry {
            ring_buffer: self,
            sequence,
        }
    }

    /// Claim `batch_size` contiguous entries in one step
    ///
    /// # Panics
    /// Under [`crate::SingleThreadedStrategy`], panics if another thread
    /// claims at the same time.
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidBatchSize` if `batch_size` is zero or
    /// larger than the ring
    pub fn next_entries(&self, batch_size: usize) -> Result<ClaimedBatch<'_, T, C, W>> {
        if batch_size == 0 || batch_size > self.capacity() {
            return Err(DisruptorError::InvalidBatchSize {
                requested: batch_size,
                capacity: self.capacity(),
            });
        }

        let mut batch = SequenceBatch::new(batch_size);
        let end = self
            .claim_strategy
            .increment_and_get_n(batch_size as i64, self.tracked());
        batch.set_end(end);

        Ok(ClaimedBatch {
            ring_buffer: self,
            batch,
        })
    }

    /// Publish a claimed entry to consumers
    pub fn commit(&self, entry: ClaimedEntry<'_, T, C, W>) {
        debug_assert!(std::ptr::eq(entry.ring_buffer, self));
        self.publish(entry.sequence, 1);
    }

    /// Publish every entry of a claimed batch at once
    pub fn commit_batch(&self, batch: ClaimedBatch<'_, T, C, W>) {
        debug_assert!(std::ptr::eq(batch.ring_buffer, self));
        self.publish(batch.end(), batch.size() as i64);
    }

    /// Publish an entry without waiting for its predecessors
    ///
    /// The claim counter and the cursor both jump to the entry's sequence.
    ///
    /// # Safety
    /// Every sequence up to the entry's becomes visible to consumers, claimed
    /// or not. The caller must ensure no other claim below the entry's
    /// sequence is still being written.
    pub unsafe fn commit_with_force(&self, entry: ClaimedEntry<'_, T, C, W>) {
        debug_assert!(std::ptr::eq(entry.ring_buffer, self));
        self.claim_strategy
            .set_sequence(entry.sequence, self.tracked());
        self.cursor.set(entry.sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish(&self, sequence: i64, batch_size: i64) {
        self.claim_strategy
            .serialise_publishing(&self.cursor, sequence, batch_size);
        self.cursor.set(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    /// Create a barrier gated on the cursor and the given upstream consumers
    ///
    /// An empty slice gives a barrier that only tracks the cursor.
    pub fn create_consumer_barrier(&self, dependents: &[&dyn Consumer]) -> ConsumerBarrier<W> {
        ConsumerBarrier::new(
            Arc::clone(&self.cursor),
            Arc::clone(&self.wait_strategy),
            consumer_sequences(dependents),
        )
    }

    /// Wire the consumers that producers must never overtake
    ///
    /// Must happen before the first claim and only once.
    ///
    /// # Errors
    /// Returns `DisruptorError::TrackedConsumersAlreadySet` on a second call
    pub fn set_tracked_consumers(&self, consumers: &[&dyn Consumer]) -> Result<()> {
        let sequences = consumer_sequences(consumers).into_boxed_slice();
        let count = sequences.len();
        self.tracked_sequences
            .set(sequences)
            .map_err(|_| DisruptorError::TrackedConsumersAlreadySet)?;
        debug!(count, "tracked consumers wired");
        Ok(())
    }

    /// Slots a producer could claim right now without waiting
    pub fn remaining_capacity(&self) -> i64 {
        let tracked = self.tracked();
        if tracked.is_empty() {
            return self.capacity() as i64;
        }
        let consumed = get_minimum_sequence(tracked);
        self.capacity() as i64 - (self.claim_strategy.sequence() - consumed)
    }
}

impl<T> RingBuffer<T, ClaimStrategyKind, WaitStrategyKind> {
    /// Create a ring buffer with strategies picked by option
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidBufferSize` if `capacity` is not a power of 2
    pub fn create<F>(
        entry_factory: F,
        capacity: usize,
        claim_strategy: ClaimStrategyOption,
        wait_strategy: WaitStrategyOption,
    ) -> Result<Self>
    where
        F: EntryFactory<T>,
    {
        Self::new(
            entry_factory,
            capacity,
            claim_strategy.new_instance(capacity),
            wait_strategy.new_instance(),
        )
    }

    /// Create a ring buffer from a validated configuration
    ///
    /// # Errors
    /// Returns the validation error of `config`
    pub fn from_config<F>(entry_factory: F, config: &RingBufferConfig) -> Result<Self>
    where
        F: EntryFactory<T>,
    {
        config.validate()?;
        Self::new(
            entry_factory,
            config.capacity,
            config.claim_strategy(),
            config.wait_strategy(),
        )
    }
}

impl<T, C: ClaimStrategy, W: WaitStrategy> std::fmt::Debug for RingBuffer<T, C, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("cursor", &self.cursor())
            .field("claim_strategy", &self.claim_strategy)
            .field("wait_strategy", &self.wait_strategy)
            .finish()
    }
}

// SAFETY: entries are only written through a claim. Both claim strategies
// hand each sequence to exactly one producer, and commits only move the
// cursor over a gap-free range, so a slot is read only after its writer's
// release store has been observed through a barrier's acquire. The forced
// claim and commit that bypass this are `unsafe`.
unsafe impl<T: Send + Sync, C: ClaimStrategy, W: WaitStrategy> Sync for RingBuffer<T, C, W> {}

/// An entry claimed for writing
///
/// Dereferences to the slot. Hand it back through
/// [`RingBuffer::commit`] once written, otherwise consumers never see it and,
/// with several producers, every later commit waits forever.
#[must_use = "a claimed entry is invisible to consumers until committed"]
pub struct ClaimedEntry<'a, T, C: ClaimStrategy, W: WaitStrategy> {
    ring_buffer: &'a RingBuffer<T, C, W>,
    sequence: i64,
}

impl<T, C: ClaimStrategy, W: WaitStrategy> ClaimedEntry<'_, T, C, W> {
    /// The sequence this entry was claimed at
    pub fn sequence(&self) -> i64 {
        self.sequence
    }
}

impl<T, C: ClaimStrategy, W: WaitStrategy> Deref for ClaimedEntry<'_, T, C, W> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the claim gives this producer exclusive use of the slot
        // until it is committed.
        unsafe { &*self.ring_buffer.slot(self.sequence) }
    }
}

impl<T, C: ClaimStrategy, W: WaitStrategy> DerefMut for ClaimedEntry<'_, T, C, W> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above, and `&mut self` rules out a second borrow.
        unsafe { &mut *self.ring_buffer.slot(self.sequence) }
    }
}

/// A contiguous run of entries claimed in one step
#[must_use = "a claimed batch is invisible to consumers until committed"]
pub struct ClaimedBatch<'a, T, C: ClaimStrategy, W: WaitStrategy> {
    ring_buffer: &'a RingBuffer<T, C, W>,
    batch: SequenceBatch,
}

impl<T, C: ClaimStrategy, W: WaitStrategy> ClaimedBatch<'_, T, C, W> {
    /// First claimed sequence (inclusive)
    pub fn start(&self) -> i64 {
        self.batch.start()
    }

    /// Last claimed sequence (inclusive)
    pub fn end(&self) -> i64 {
        self.batch.end()
    }

    /// Number of claimed sequences
    pub fn size(&self) -> usize {
        self.batch.size()
    }

    /// The claimed range
    pub fn sequence_batch(&self) -> SequenceBatch {
        self.batch
    }

    /// Mutable access to one entry of the batch
    ///
    /// # Panics
    /// Panics if `sequence` lies outside the claimed range
    pub fn entry_mut(&mut self, sequence: i64) -> &mut T {
        assert!(
            (self.start()..=self.end()).contains(&sequence),
            "sequence {sequence} outside claimed batch {}..={}",
            self.start(),
            self.end()
        );
        // SAFETY: the sequence belongs to this claim and `&mut self`
        // prevents a second borrow.
        unsafe { &mut *self.ring_buffer.slot(sequence) }
    }

    /// Iterate over `(sequence, entry)` pairs of the batch in order
    pub fn iter_mut(&mut self) -> BatchIterMut<'_, T, C, W> {
        BatchIterMut {
            ring_buffer: self.ring_buffer,
            current: self.start(),
            last: self.end(),
            _borrow: std::marker::PhantomData,
        }
    }
}

/// Iterator over the entries of a [`ClaimedBatch`]
pub struct BatchIterMut<'b, T, C: ClaimStrategy, W: WaitStrategy> {
    ring_buffer: &'b RingBuffer<T, C, W>,
    current: i64,
    last: i64,
    _borrow: std::marker::PhantomData<&'b mut T>,
}

impl<'b, T, C: ClaimStrategy, W: WaitStrategy> Iterator for BatchIterMut<'b, T, C, W> {
    type Item = (i64, &'b mut T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current > self.last {
            return None;
        }
        let sequence = self.current;
        self.current += 1;
        // SAFETY: a batch never exceeds the capacity, so every sequence in it
        // maps to a distinct slot that this claim owns.
        let entry = unsafe { &mut *self.ring_buffer.slot(sequence) };
        Some((sequence, entry))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.last - self.current + 1).max(0) as usize;
        (remaining, Some(remaining))
    }
}

impl<T, C: ClaimStrategy, W: WaitStrategy> ExactSizeIterator for BatchIterMut<'_, T, C, W> {}
