//! Batch Consumer Implementation
//!
//! The batch consumer is the processing loop: it waits on its barrier for
//! the next sequence, hands every available entry to its handler in order,
//! signals the end of the batch and then publishes its own sequence so
//! producers and downstream consumers can move on.

use crate::disruptor::batch_handler::SequenceTrackerCallback;
use crate::disruptor::consumer_barrier::BarrierAlerter;
use crate::disruptor::{
    BatchHandler, ClaimStrategy, Consumer, ConsumerBarrier, DisruptorError, ExceptionHandler,
    IgnoreExceptionHandler, ManagedThread, Result, RingBuffer, Sequence, ThreadBuilder,
    WaitStrategy,
};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const HALTED: u8 = 2;

/// Lifecycle of a batch consumer
///
/// `Idle -> Running -> Halted`, or `Idle -> Halted` when halted before it
/// ever ran. `Halted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Created, `run` not called yet
    Idle,
    /// Inside `run`, processing entries
    Running,
    /// Stopped for good
    Halted,
}

impl ConsumerState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            IDLE => Self::Idle,
            RUNNING => Self::Running,
            _ => Self::Halted,
        }
    }
}

/// Drives a [`BatchHandler`] over the entries of a ring buffer
///
/// # Type Parameters
/// * `T` - The entry type
/// * `C` - The ring's claim strategy
/// * `W` - The ring's wait strategy
/// * `H` - The handler
pub struct BatchConsumer<T, C, W, H>
where
    C: ClaimStrategy,
    W: WaitStrategy,
    H: BatchHandler<T>,
{
    ring_buffer: Arc<RingBuffer<T, C, W>>,
    barrier: ConsumerBarrier<W>,
    handler: H,
    exception_handler: Box<dyn ExceptionHandler<T>>,
    sequence: Arc<Sequence>,
    state: Arc<AtomicU8>,
}

impl<T, C, W, H> BatchConsumer<T, C, W, H>
where
    C: ClaimStrategy,
    W: WaitStrategy,
    H: BatchHandler<T>,
{
    /// Create a consumer reading `ring_buffer` through `barrier`
    ///
    /// The handler receives its [`SequenceTrackerCallback`] here. Failures
    /// are logged and ignored until another exception handler is set.
    pub fn new(
        ring_buffer: Arc<RingBuffer<T, C, W>>,
        barrier: ConsumerBarrier<W>,
        mut handler: H,
    ) -> Self {
        let sequence = Arc::new(Sequence::default());
        handler.set_sequence_tracker_callback(SequenceTrackerCallback::new(Arc::clone(&sequence)));

        Self {
            ring_buffer,
            barrier,
            handler,
            exception_handler: Box::new(IgnoreExceptionHandler),
            sequence,
            state: Arc::new(AtomicU8::new(IDLE)),
        }
    }

    /// Replace the exception handler, builder style
    pub fn with_exception_handler<E>(mut self, exception_handler: E) -> Self
    where
        E: ExceptionHandler<T> + 'static,
    {
        self.set_exception_handler(exception_handler);
        self
    }

    /// Replace the exception handler
    pub fn set_exception_handler<E>(&mut self, exception_handler: E)
    where
        E: ExceptionHandler<T> + 'static,
    {
        self.exception_handler = Box::new(exception_handler);
    }

    /// The sequence of the last entry this consumer has processed
    pub fn sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.sequence)
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConsumerState {
        ConsumerState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Whether the loop is currently running
    pub fn is_running(&self) -> bool {
        self.state() == ConsumerState::Running
    }

    /// The barrier this consumer waits on
    pub fn barrier(&self) -> &ConsumerBarrier<W> {
        &self.barrier
    }

    /// The batch handler entries are passed to
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Stop the loop at its next wake-up
    ///
    /// Idempotent. Halting before `run` makes `run` return immediately.
    pub fn halt(&self) {
        self.state.store(HALTED, Ordering::SeqCst);
        self.barrier.alert();
    }

    /// A handle that halts this consumer from another thread
    pub fn halt_handle(&self) -> HaltHandle<W> {
        HaltHandle {
            state: Arc::clone(&self.state),
            alerter: self.barrier.alerter(),
            sequence: Arc::clone(&self.sequence),
        }
    }

    /// Run the processing loop on the calling thread until halted
    ///
    /// # Errors
    /// Returns `DisruptorError::AlreadyRunning` if the loop is already
    /// running, or any barrier error other than the alert used to halt
    pub fn run(&mut self) -> Result<()> {
        match self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(HALTED) => {
                debug!("consumer halted before it started");
                return Ok(());
            }
            Err(_) => return Err(DisruptorError::AlreadyRunning),
        }

        if let Err(error) = self.handler.on_start() {
            self.exception_handler.handle_on_start_exception(&error);
        }
        debug!(sequence = self.sequence.get(), "consumer started");

        let outcome = self.process_entries();

        if let Err(error) = self.handler.on_shutdown() {
            self.exception_handler.handle_on_shutdown_exception(&error);
        }
        debug!(sequence = self.sequence.get(), "consumer stopped");
        outcome
    }

    fn process_entries(&mut self) -> Result<()> {
        let mut next_sequence = self.sequence.get() + 1;

        loop {
            let available_sequence = match self.barrier.wait_for(next_sequence) {
                Ok(available_sequence) => available_sequence,
                Err(DisruptorError::Alert) => {
                    // Clear before re-reading the state so a concurrent halt
                    // either is seen here or leaves the alert raised.
                    self.barrier.clear_alert();
                    if self.state.load(Ordering::SeqCst) == HALTED {
                        return Ok(());
                    }
                    continue;
                }
                Err(error) => return Err(error),
            };

            if available_sequence < next_sequence {
                continue;
            }

            while next_sequence <= available_sequence {
                let entry = self.ring_buffer.entry(next_sequence);
                if let Err(error) = self.handler.on_available(entry, next_sequence) {
                    self.exception_handler.handle(&error, next_sequence, entry);
                }
                next_sequence += 1;
            }

            if let Err(error) = self.handler.on_end_of_batch() {
                let entry = self.ring_buffer.entry(available_sequence);
                self.exception_handler
                    .handle(&error, available_sequence, entry);
            }

            self.sequence.set(available_sequence);
        }
    }
}

impl<T, C, W, H> BatchConsumer<T, C, W, H>
where
    T: Send + Sync + 'static,
    C: ClaimStrategy + 'static,
    W: WaitStrategy + 'static,
    H: BatchHandler<T> + 'static,
{
    /// Move the consumer onto its own thread and start it
    ///
    /// # Errors
    /// Returns the OS error if the thread cannot be created
    pub fn spawn(self, builder: ThreadBuilder) -> std::io::Result<(HaltHandle<W>, ManagedThread)> {
        let halt_handle = self.halt_handle();
        let mut consumer = self;
        let thread = builder.spawn(move || {
            if let Err(error) = consumer.run() {
                error!(error = %error, "consumer loop failed");
            }
        })?;
        Ok((halt_handle, thread))
    }
}

impl<T, C, W, H> Consumer for BatchConsumer<T, C, W, H>
where
    C: ClaimStrategy,
    W: WaitStrategy,
    H: BatchHandler<T>,
{
    fn sequence(&self) -> Arc<Sequence> {
        BatchConsumer::sequence(self)
    }

    fn halt(&self) {
        BatchConsumer::halt(self)
    }
}

/// Halts a [`BatchConsumer`] from any thread
///
/// Also stands in for the consumer when wiring barriers or gating after the
/// consumer has been moved onto its thread.
#[derive(Debug)]
pub struct HaltHandle<W: WaitStrategy> {
    state: Arc<AtomicU8>,
    alerter: BarrierAlerter<W>,
    sequence: Arc<Sequence>,
}

impl<W: WaitStrategy> HaltHandle<W> {
    /// Stop the consumer at its next wake-up, same as [`BatchConsumer::halt`]
    pub fn halt(&self) {
        self.state.store(HALTED, Ordering::SeqCst);
        self.alerter.alert();
    }

    /// Current lifecycle state of the consumer
    pub fn state(&self) -> ConsumerState {
        ConsumerState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// The consumer's processed sequence
    pub fn sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.sequence)
    }
}

impl<W: WaitStrategy> Clone for HaltHandle<W> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            alerter: self.alerter.clone(),
            sequence: Arc::clone(&self.sequence),
        }
    }
}

impl<W: WaitStrategy> Consumer for HaltHandle<W> {
    fn sequence(&self) -> Arc<Sequence> {
        HaltHandle::sequence(self)
    }

    fn halt(&self) {
        HaltHandle::halt(self)
    }
}
