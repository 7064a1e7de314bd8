//! Wait Strategy Implementation
//!
//! Wait strategies decide how a consumer passes the time until the sequence it
//! asked for has been committed and every upstream consumer it depends on has
//! processed it. They trade CPU for latency: busy-spin burns a core for the
//! fastest reaction, yielding gives the core away between polls, and blocking
//! parks the thread on a condition variable until a producer commits.
//!
//! Every strategy re-checks the alert flag on each iteration so that a halted
//! consumer returns without needing another commit.

use crate::disruptor::sequence::get_minimum_sequence;
use crate::disruptor::{DisruptorError, Result, Sequence};
use crossbeam_utils::Backoff;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Strategy for waiting until a sequence becomes available to a consumer
pub trait WaitStrategy: Send + Sync + Debug {
    /// Wait until `cursor` and all `dependents` have reached `sequence`
    ///
    /// # Arguments
    /// * `sequence` - The sequence the consumer wants to read next
    /// * `cursor` - The ring's published cursor
    /// * `dependents` - Upstream consumer sequences that gate this consumer
    /// * `alert` - Raised when the waiting consumer should stop
    ///
    /// # Returns
    /// The highest available sequence, always `>= sequence`
    ///
    /// # Errors
    /// Returns `DisruptorError::Alert` if the alert flag is raised while waiting
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alert: &AtomicBool,
    ) -> Result<i64>;

    /// Like [`WaitStrategy::wait_for`], giving up after `timeout`
    ///
    /// # Returns
    /// The highest available sequence, which is below `sequence` if the
    /// timeout expired first
    ///
    /// # Errors
    /// Returns `DisruptorError::Alert` if the alert flag is raised while waiting
    fn wait_for_timeout(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alert: &AtomicBool,
        timeout: Duration,
    ) -> Result<i64>;

    /// Wake every thread parked in this strategy
    ///
    /// Called on every commit and whenever a barrier is alerted.
    fn signal_all_when_blocking(&self);
}

/// The highest sequence visible through the cursor and all dependents
#[inline]
fn available_sequence(cursor: &Sequence, dependents: &[Arc<Sequence>]) -> i64 {
    let cursor_sequence = cursor.get();
    if dependents.is_empty() {
        cursor_sequence
    } else {
        cursor_sequence.min(get_minimum_sequence(dependents))
    }
}

#[inline]
fn check_alert(alert: &AtomicBool) -> Result<()> {
    if alert.load(Ordering::Acquire) {
        Err(DisruptorError::Alert)
    } else {
        Ok(())
    }
}

/// Blocking wait strategy using a lock and condition variable
///
/// Lowest CPU use of the three, at the cost of a lock round trip on every
/// commit and a wake-up latency on the consumer side.
#[derive(Debug, Default)]
pub struct BlockingStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl BlockingStrategy {
    /// Create a new blocking wait strategy
    pub fn new() -> Self {
        Self::default()
    }

    /// Spin on upstream consumers once the cursor has moved far enough
    fn wait_for_dependents(
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alert: &AtomicBool,
        deadline: Option<Instant>,
    ) -> Result<i64> {
        let backoff = Backoff::new();
        loop {
            let available = available_sequence(cursor, dependents);
            if available >= sequence {
                return Ok(available);
            }
            check_alert(alert)?;
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Ok(available);
            }
            backoff.snooze();
        }
    }
}

impl WaitStrategy for BlockingStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alert: &AtomicBool,
    ) -> Result<i64> {
        if cursor.get() < sequence {
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                check_alert(alert)?;
                self.condvar.wait(&mut guard);
            }
        }

        Self::wait_for_dependents(sequence, cursor, dependents, alert, None)
    }

    fn wait_for_timeout(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alert: &AtomicBool,
        timeout: Duration,
    ) -> Result<i64> {
        let deadline = Instant::now() + timeout;

        if cursor.get() < sequence {
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                check_alert(alert)?;
                if self.condvar.wait_until(&mut guard, deadline).timed_out() {
                    break;
                }
            }
        }

        Self::wait_for_dependents(sequence, cursor, dependents, alert, Some(deadline))
    }

    fn signal_all_when_blocking(&self) {
        // Notifying under the lock closes the gap between a waiter's last
        // cursor check and its call to wait.
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}

/// Yielding wait strategy
///
/// Busy-spins for `spin_tries` iterations and then yields the thread on every
/// further poll.
#[derive(Debug, Clone, Copy)]
pub struct YieldingStrategy {
    spin_tries: u32,
}

impl YieldingStrategy {
    /// Default number of busy spins before the first yield
    pub const DEFAULT_SPIN_TRIES: u32 = 100;

    /// Create a new yielding wait strategy
    pub fn new() -> Self {
        Self::with_spin_tries(Self::DEFAULT_SPIN_TRIES)
    }

    /// Create a yielding strategy with a custom spin budget
    pub fn with_spin_tries(spin_tries: u32) -> Self {
        Self { spin_tries }
    }

    /// Number of busy spins before the first yield
    pub fn spin_tries(&self) -> u32 {
        self.spin_tries
    }

    #[inline]
    fn apply_wait(counter: u32) -> u32 {
        if counter == 0 {
            thread::yield_now();
            0
        } else {
            hint::spin_loop();
            counter - 1
        }
    }
}

impl Default for YieldingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for YieldingStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alert: &AtomicBool,
    ) -> Result<i64> {
        let mut counter = self.spin_tries;
        loop {
            let available = available_sequence(cursor, dependents);
            if available >= sequence {
                return Ok(available);
            }
            check_alert(alert)?;
            counter = Self::apply_wait(counter);
        }
    }

    fn wait_for_timeout(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alert: &AtomicBool,
        timeout: Duration,
    ) -> Result<i64> {
        let deadline = Instant::now() + timeout;
        let mut counter = self.spin_tries;
        loop {
            let available = available_sequence(cursor, dependents);
            if available >= sequence || Instant::now() >= deadline {
                return Ok(available);
            }
            check_alert(alert)?;
            counter = Self::apply_wait(counter);
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Busy-spin wait strategy
///
/// Polls the cursor in a tight loop. Lowest latency, one full core per
/// waiting consumer.
#[derive(Debug, Default, Clone, Copy)]
pub struct BusySpinStrategy;

impl BusySpinStrategy {
    /// Create a new busy-spin wait strategy
    pub fn new() -> Self {
        Self
    }
}

impl WaitStrategy for BusySpinStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alert: &AtomicBool,
    ) -> Result<i64> {
        loop {
            let available = available_sequence(cursor, dependents);
            if available >= sequence {
                return Ok(available);
            }
            check_alert(alert)?;
            hint::spin_loop();
        }
    }

    fn wait_for_timeout(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alert: &AtomicBool,
        timeout: Duration,
    ) -> Result<i64> {
        let deadline = Instant::now() + timeout;
        loop {
            let available = available_sequence(cursor, dependents);
            if available >= sequence || Instant::now() >= deadline {
                return Ok(available);
            }
            check_alert(alert)?;
            hint::spin_loop();
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Selects a wait strategy by name, e.g. from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaitStrategyOption {
    /// Lock and condition variable
    #[default]
    Blocking,
    /// Spin, then yield
    Yielding,
    /// Tight spin
    BusySpin,
}

impl WaitStrategyOption {
    /// Build the selected strategy with default settings
    pub fn new_instance(self) -> WaitStrategyKind {
        match self {
            WaitStrategyOption::Blocking => WaitStrategyKind::Blocking(BlockingStrategy::new()),
            WaitStrategyOption::Yielding => WaitStrategyKind::Yielding(YieldingStrategy::new()),
            WaitStrategyOption::BusySpin => WaitStrategyKind::BusySpin(BusySpinStrategy::new()),
        }
    }
}

/// A wait strategy chosen at runtime, dispatched with a `match`
#[derive(Debug)]
pub enum WaitStrategyKind {
    /// See [`BlockingStrategy`]
    Blocking(BlockingStrategy),
    /// See [`YieldingStrategy`]
    Yielding(YieldingStrategy),
    /// See [`BusySpinStrategy`]
    BusySpin(BusySpinStrategy),
}

impl WaitStrategyKind {
    /// The option this strategy corresponds to
    pub fn option(&self) -> WaitStrategyOption {
        match self {
            WaitStrategyKind::Blocking(_) => WaitStrategyOption::Blocking,
            WaitStrategyKind::Yielding(_) => WaitStrategyOption::Yielding,
            WaitStrategyKind::BusySpin(_) => WaitStrategyOption::BusySpin,
        }
    }
}

impl WaitStrategy for WaitStrategyKind {
    #[inline]
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alert: &AtomicBool,
    ) -> Result<i64> {
        match self {
            WaitStrategyKind::Blocking(s) => s.wait_for(sequence, cursor, dependents, alert),
            WaitStrategyKind::Yielding(s) => s.wait_for(sequence, cursor, dependents, alert),
            WaitStrategyKind::BusySpin(s) => s.wait_for(sequence, cursor, dependents, alert),
        }
    }

    fn wait_for_timeout(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alert: &AtomicBool,
        timeout: Duration,
    ) -> Result<i64> {
        match self {
            WaitStrategyKind::Blocking(s) => {
                s.wait_for_timeout(sequence, cursor, dependents, alert, timeout)
            }
            WaitStrategyKind::Yielding(s) => {
                s.wait_for_timeout(sequence, cursor, dependents, alert, timeout)
            }
            WaitStrategyKind::BusySpin(s) => {
                s.wait_for_timeout(sequence, cursor, dependents, alert, timeout)
            }
        }
    }

    #[inline]
    fn signal_all_when_blocking(&self) {
        match self {
            WaitStrategyKind::Blocking(s) => s.signal_all_when_blocking(),
            WaitStrategyKind::Yielding(s) => s.signal_all_when_blocking(),
            WaitStrategyKind::BusySpin(s) => s.signal_all_when_blocking(),
        }
    }
}
