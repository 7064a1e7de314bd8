//! Batchring ring buffer implementation
//!
//! Producers claim sequences on a preallocated ring, write the entries in
//! place and commit them; batch consumers wait on barriers for committed
//! sequences and process them in order, publishing their own progress so
//! that producers and downstream consumers can follow.

pub mod batch_consumer;
pub mod batch_handler;
pub mod claim_strategy;
pub mod config;
pub mod consumer;
pub mod consumer_barrier;
pub mod entry_factory;
pub mod error;
pub mod exception_handler;
pub mod ring_buffer;
pub mod sequence;
pub mod thread_management;
pub mod wait_strategy;


pub use batch_consumer::{BatchConsumer, ConsumerState, HaltHandle};
pub use batch_handler::{BatchHandler, ClosureBatchHandler, SequenceTrackerCallback};
pub use claim_strategy::{
    ClaimStrategy, ClaimStrategyKind, ClaimStrategyOption, MultiThreadedStrategy,
    SingleThreadedStrategy,
};
pub use config::RingBufferConfig;
pub use consumer::{Consumer, NoOpConsumer};
pub use consumer_barrier::ConsumerBarrier;
pub use entry_factory::{entry_factory, ClosureEntryFactory, DefaultEntryFactory, EntryFactory};
pub use error::{DisruptorError, Result};
pub use exception_handler::{
    ClosureExceptionHandler, ExceptionHandler, FatalExceptionHandler, IgnoreExceptionHandler,
};
pub use ring_buffer::{BatchIterMut, ClaimedBatch, ClaimedEntry, RingBuffer};
pub use sequence::{get_minimum_sequence, Sequence, SequenceBatch};
pub use thread_management::{get_available_cores, ManagedThread, ThreadBuilder};
pub use wait_strategy::{
    BlockingStrategy, BusySpinStrategy, WaitStrategy, WaitStrategyKind, WaitStrategyOption,
    YieldingStrategy,
};

/// The value every sequence starts at, one before the first slot
pub const INITIAL_CURSOR_VALUE: i64 = -1;

/// Check if a number is a power of 2
pub fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}
