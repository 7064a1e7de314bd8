//! Exception Handler Implementation
//!
//! When a batch handler fails on an entry the consumer hands the error to
//! its exception handler and carries on with the next entry. The handler
//! decides whether the failure is only logged or fatal for the consumer
//! thread.

use tracing::{error, info};

/// Handler for errors raised by a [`BatchHandler`](crate::disruptor::BatchHandler)
///
/// # Type Parameters
/// * `T` - The entry type being processed
pub trait ExceptionHandler<T>: Send + Sync {
    /// Handle a failure while processing `entry` at `sequence`
    ///
    /// The consumer advances past the entry once this returns.
    fn handle(&self, error: &anyhow::Error, sequence: i64, entry: &T);

    /// Handle a failure of the handler's `on_start` hook
    fn handle_on_start_exception(&self, error: &anyhow::Error) {
        error!(error = %error, "batch handler failed to start");
    }

    /// Handle a failure of the handler's `on_shutdown` hook
    fn handle_on_shutdown_exception(&self, error: &anyhow::Error) {
        error!(error = %error, "batch handler failed to shut down");
    }
}

/// Logs the failure and lets the consumer continue
///
/// This is the handler a consumer starts with.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreExceptionHandler;

impl IgnoreExceptionHandler {
    /// Create the handler
    pub fn new() -> Self {
        Self
    }
}

impl<T> ExceptionHandler<T> for IgnoreExceptionHandler {
    fn handle(&self, error: &anyhow::Error, sequence: i64, _entry: &T) {
        info!(sequence, error = %error, "exception processing entry, continuing");
    }
}

/// Logs the failure and panics, taking the consumer thread down
///
/// The panic surfaces when the consumer's thread is joined.
#[derive(Debug, Default, Clone, Copy)]
pub struct FatalExceptionHandler;

impl FatalExceptionHandler {
    /// Create the handler
    pub fn new() -> Self {
        Self
    }
}

impl<T> ExceptionHandler<T> for FatalExceptionHandler {
    fn handle(&self, error: &anyhow::Error, sequence: i64, _entry: &T) {
        error!(sequence, error = %error, "fatal exception processing entry");
        panic!("fatal exception processing entry at sequence {sequence}: {error}");
    }

    fn handle_on_start_exception(&self, error: &anyhow::Error) {
        error!(error = %error, "batch handler failed to start");
        panic!("batch handler failed to start: {error}");
    }
}

/// An exception handler built from a closure
pub struct ClosureExceptionHandler<F> {
    handler_fn: F,
}

impl<F> ClosureExceptionHandler<F> {
    /// Wrap `handler_fn` as the `handle` hook
    pub fn new(handler_fn: F) -> Self {
        Self { handler_fn }
    }
}

impl<T, F> ExceptionHandler<T> for ClosureExceptionHandler<F>
where
    F: Fn(&anyhow::Error, i64, &T) + Send + Sync,
{
    fn handle(&self, error: &anyhow::Error, sequence: i64, entry: &T) {
        (self.handler_fn)(error, sequence, entry)
    }
}
