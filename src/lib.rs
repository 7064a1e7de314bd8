//! `Batchring` - Preallocated Ring Buffer for Inter-Thread Messaging
//!
//! A fixed-capacity ring of reusable entries shared by producer and consumer
//! threads. Producers claim a sequence, write the entry in place and commit
//! it; consumers wait for committed sequences and process them in batches.
//! Coordination is done with padded atomic sequences, so the hot path takes
//! no locks unless the blocking wait strategy is chosen.
//!
//! ## Quick Start
//!
//! ```rust
//! use batchring::disruptor::{
//!     BatchConsumer, ClaimStrategyOption, ClosureBatchHandler, DefaultEntryFactory,
//!     RingBuffer, ThreadBuilder, WaitStrategyOption,
//! };
//! use std::sync::atomic::{AtomicI64, Ordering};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Default)]
//! struct PriceEntry {
//!     price: i64,
//! }
//!
//! let ring_buffer = Arc::new(
//!     RingBuffer::create(
//!         DefaultEntryFactory::<PriceEntry>::new(),
//!         1024,
//!         ClaimStrategyOption::SingleThreaded,
//!         WaitStrategyOption::Yielding,
//!     )
//!     .unwrap(),
//! );
//!
//! let total = Arc::new(AtomicI64::new(0));
//! let handler = {
//!     let total = Arc::clone(&total);
//!     ClosureBatchHandler::new(move |entry: &PriceEntry, _sequence: i64| {
//!         total.fetch_add(entry.price, Ordering::Relaxed);
//!         Ok(())
//!     })
//! };
//! let barrier = ring_buffer.create_consumer_barrier(&[]);
//! let consumer = BatchConsumer::new(Arc::clone(&ring_buffer), barrier, handler);
//! ring_buffer.set_tracked_consumers(&[&consumer]).unwrap();
//!
//! let (halt_handle, thread) = consumer.spawn(ThreadBuilder::new()).unwrap();
//!
//! for price in 1..=10 {
//!     let mut entry = ring_buffer.claim_next();
//!     entry.price = price;
//!     ring_buffer.commit(entry);
//! }
//!
//! while halt_handle.sequence().get() < 9 {
//!     std::thread::yield_now();
//! }
//! halt_handle.halt();
//! thread.join().unwrap();
//! assert_eq!(total.load(Ordering::Relaxed), 55);
//! ```
//!
//! ## Architecture
//!
//! - **`RingBuffer`**: preallocated entries, the cursor and the strategies
//! - **`Sequence`**: padded atomic counter for coordination
//! - **`ClaimStrategy`**: hands out sequences to one or many producers
//! - **`WaitStrategy`**: how a consumer waits for a sequence
//! - **`ConsumerBarrier`**: gates a consumer on the cursor and upstream consumers
//! - **`BatchConsumer`**: runs a `BatchHandler` over available entries

pub mod disruptor;

// Re-export the main types for convenience
pub use disruptor::{
    is_power_of_two,
    BatchConsumer,
    BatchHandler,
    BlockingStrategy,
    BusySpinStrategy,
    ClaimStrategy,
    ClaimStrategyOption,
    Consumer,
    ConsumerBarrier,
    DefaultEntryFactory,
    DisruptorError,
    EntryFactory,
    ExceptionHandler,
    MultiThreadedStrategy,
    Result,
    RingBuffer,
    RingBufferConfig,
    Sequence,
    SingleThreadedStrategy,
    WaitStrategy,
    WaitStrategyOption,
    YieldingStrategy,
    INITIAL_CURSOR_VALUE,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the version of the `Batchring` library
#[must_use]
pub fn version() -> &'static str {
    VERSION
}
