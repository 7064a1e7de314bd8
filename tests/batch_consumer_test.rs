//! Batch consumer lifecycle tests
//!
//! Verifies the order in which a consumer calls its handler, how handler
//! failures reach the exception handler, progress reporting through the
//! sequence tracker callback and halting under every wait strategy.

use batchring::disruptor::{
    BatchConsumer, BatchHandler, ClaimStrategyKind, ClaimStrategyOption, ClosureExceptionHandler,
    ConsumerState, DefaultEntryFactory, NoOpConsumer, RingBuffer, SequenceTrackerCallback,
    ThreadBuilder, WaitStrategyKind, WaitStrategyOption,
};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default, Clone, PartialEq)]
struct StubEntry {
    value: i64,
}

type StubRing = RingBuffer<StubEntry, ClaimStrategyKind, WaitStrategyKind>;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Start,
    Available(i64, i64),
    EndOfBatch,
    Shutdown,
}

/// Records every hook call and signals after each end of batch
struct RecordingHandler {
    calls: Arc<Mutex<Vec<Call>>>,
    end_of_batch: Sender<()>,
}

impl BatchHandler<StubEntry> for RecordingHandler {
    fn on_available(&mut self, entry: &StubEntry, sequence: i64) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Available(sequence, entry.value));
        Ok(())
    }

    fn on_end_of_batch(&mut self) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(Call::EndOfBatch);
        let _ = self.end_of_batch.send(());
        Ok(())
    }

    fn on_start(&mut self) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(Call::Start);
        Ok(())
    }

    fn on_shutdown(&mut self) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(Call::Shutdown);
        Ok(())
    }
}

fn ring_buffer(wait_strategy: WaitStrategyOption) -> Arc<StubRing> {
    Arc::new(
        RingBuffer::create(
            DefaultEntryFactory::<StubEntry>::new(),
            16,
            ClaimStrategyOption::SingleThreaded,
            wait_strategy,
        )
        .unwrap(),
    )
}

fn recording_consumer(
    ring_buffer: &Arc<StubRing>,
) -> (
    BatchConsumer<StubEntry, ClaimStrategyKind, WaitStrategyKind, RecordingHandler>,
    Arc<Mutex<Vec<Call>>>,
    Receiver<()>,
) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let (end_of_batch, latch) = mpsc::channel();
    let handler = RecordingHandler {
        calls: Arc::clone(&calls),
        end_of_batch,
    };
    let consumer = BatchConsumer::new(
        Arc::clone(ring_buffer),
        ring_buffer.create_consumer_barrier(&[]),
        handler,
    );
    ring_buffer.set_tracked_consumers(&[&consumer]).unwrap();
    (consumer, calls, latch)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn publish(ring_buffer: &StubRing, value: i64) {
    let mut entry = ring_buffer.claim_next();
    entry.value = value;
    ring_buffer.commit(entry);
}

#[test]
fn test_call_methods_in_lifecycle_order() {
    init_tracing();
    let ring_buffer = ring_buffer(WaitStrategyOption::Blocking);
    let (consumer, calls, latch) = recording_consumer(&ring_buffer);
    assert_eq!(consumer.sequence().get(), -1);

    let (halt_handle, thread) = consumer.spawn(ThreadBuilder::new()).unwrap();
    publish(&ring_buffer, 11);

    latch.recv_timeout(Duration::from_secs(5)).unwrap();
    halt_handle.halt();
    thread.join().unwrap();

    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            Call::Start,
            Call::Available(0, 11),
            Call::EndOfBatch,
            Call::Shutdown
        ]
    );
    assert_eq!(halt_handle.sequence().get(), 0);
}

#[test]
fn test_call_methods_in_lifecycle_order_for_batch() {
    let ring_buffer = ring_buffer(WaitStrategyOption::Yielding);
    let (consumer, calls, latch) = recording_consumer(&ring_buffer);

    for value in [10, 20, 30] {
        publish(&ring_buffer, value);
    }

    let (halt_handle, thread) = consumer.spawn(ThreadBuilder::new()).unwrap();
    latch.recv_timeout(Duration::from_secs(5)).unwrap();
    halt_handle.halt();
    thread.join().unwrap();

    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            Call::Start,
            Call::Available(0, 10),
            Call::Available(1, 20),
            Call::Available(2, 30),
            Call::EndOfBatch,
            Call::Shutdown
        ]
    );
    assert_eq!(halt_handle.sequence().get(), 2);
}

struct FailingHandler;

impl BatchHandler<StubEntry> for FailingHandler {
    fn on_available(&mut self, entry: &StubEntry, _sequence: i64) -> anyhow::Result<()> {
        anyhow::bail!("cannot process {}", entry.value)
    }
}

#[test]
fn test_exception_handler_called_on_handler_error() {
    init_tracing();
    let ring_buffer = ring_buffer(WaitStrategyOption::Blocking);
    let handled = Arc::new(Mutex::new(Vec::new()));
    let (signal, latch) = mpsc::channel();

    let exception_handler = {
        let handled = Arc::clone(&handled);
        let signal = Mutex::new(signal);
        ClosureExceptionHandler::new(
            move |error: &anyhow::Error, sequence: i64, entry: &StubEntry| {
                handled
                    .lock()
                    .unwrap()
                    .push((error.to_string(), sequence, entry.value));
                let _ = signal.lock().unwrap().send(());
            },
        )
    };
    let consumer = BatchConsumer::new(
        Arc::clone(&ring_buffer),
        ring_buffer.create_consumer_barrier(&[]),
        FailingHandler,
    )
    .with_exception_handler(exception_handler);
    ring_buffer.set_tracked_consumers(&[&consumer]).unwrap();

    let (halt_handle, thread) = consumer.spawn(ThreadBuilder::new()).unwrap();
    publish(&ring_buffer, 99);

    latch.recv_timeout(Duration::from_secs(5)).unwrap();
    while halt_handle.sequence().get() < 0 {
        std::thread::yield_now();
    }
    halt_handle.halt();
    thread.join().unwrap();

    assert_eq!(
        *handled.lock().unwrap(),
        vec![("cannot process 99".to_string(), 0, 99)]
    );
    assert_eq!(halt_handle.sequence().get(), 0);
}

/// Processes every entry but fails at the end of each batch
struct EndOfBatchFailingHandler;

impl BatchHandler<StubEntry> for EndOfBatchFailingHandler {
    fn on_available(&mut self, _entry: &StubEntry, _sequence: i64) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_end_of_batch(&mut self) -> anyhow::Result<()> {
        anyhow::bail!("end of batch failed")
    }
}

#[test]
fn test_end_of_batch_error_reported_with_last_entry() {
    let ring_buffer = ring_buffer(WaitStrategyOption::Blocking);
    let handled = Arc::new(Mutex::new(Vec::new()));
    let (signal, latch) = mpsc::channel();

    let exception_handler = {
        let handled = Arc::clone(&handled);
        let signal = Mutex::new(signal);
        ClosureExceptionHandler::new(
            move |error: &anyhow::Error, sequence: i64, entry: &StubEntry| {
                handled
                    .lock()
                    .unwrap()
                    .push((error.to_string(), sequence, entry.value));
                let _ = signal.lock().unwrap().send(());
            },
        )
    };
    let consumer = BatchConsumer::new(
        Arc::clone(&ring_buffer),
        ring_buffer.create_consumer_barrier(&[]),
        EndOfBatchFailingHandler,
    )
    .with_exception_handler(exception_handler);
    ring_buffer.set_tracked_consumers(&[&consumer]).unwrap();

    for value in [10, 20, 30] {
        publish(&ring_buffer, value);
    }
    let (halt_handle, thread) = consumer.spawn(ThreadBuilder::new()).unwrap();

    latch.recv_timeout(Duration::from_secs(5)).unwrap();
    while halt_handle.sequence().get() < 2 {
        std::thread::yield_now();
    }
    halt_handle.halt();
    thread.join().unwrap();

    assert_eq!(
        *handled.lock().unwrap(),
        vec![("end of batch failed".to_string(), 2, 30)]
    );
    assert_eq!(halt_handle.sequence().get(), 2);
}

#[test]
fn test_consumer_on_unknown_core_still_processes() {
    let ring_buffer = ring_buffer(WaitStrategyOption::Yielding);
    let (consumer, calls, latch) = recording_consumer(&ring_buffer);

    let (halt_handle, thread) = consumer
        .spawn(ThreadBuilder::new().pin_at_core(usize::MAX))
        .unwrap();
    publish(&ring_buffer, 7);

    latch.recv_timeout(Duration::from_secs(5)).unwrap();
    halt_handle.halt();
    thread.join().unwrap();

    assert!(calls.lock().unwrap().contains(&Call::Available(0, 7)));
}

#[test]
fn test_ignore_exception_handler_keeps_consuming() {
    let ring_buffer = ring_buffer(WaitStrategyOption::BusySpin);
    let consumer = BatchConsumer::new(
        Arc::clone(&ring_buffer),
        ring_buffer.create_consumer_barrier(&[]),
        FailingHandler,
    );
    ring_buffer.set_tracked_consumers(&[&consumer]).unwrap();

    let (halt_handle, thread) = consumer.spawn(ThreadBuilder::new()).unwrap();
    for value in 0..40 {
        publish(&ring_buffer, value);
    }
    while halt_handle.sequence().get() < 39 {
        std::thread::yield_now();
    }
    halt_handle.halt();
    thread.join().unwrap();
}

/// Reports progress through the callback, then blocks the end of batch
struct SequenceTrackingHandler {
    callback: Option<SequenceTrackerCallback>,
    callback_done: Sender<()>,
    release_end_of_batch: Receiver<()>,
}

impl BatchHandler<StubEntry> for SequenceTrackingHandler {
    fn on_available(&mut self, _entry: &StubEntry, sequence: i64) -> anyhow::Result<()> {
        if let Some(callback) = &self.callback {
            callback.on_completed(sequence);
        }
        let _ = self.callback_done.send(());
        Ok(())
    }

    fn on_end_of_batch(&mut self) -> anyhow::Result<()> {
        self.release_end_of_batch.recv()?;
        Ok(())
    }

    fn set_sequence_tracker_callback(&mut self, callback: SequenceTrackerCallback) {
        self.callback = Some(callback);
    }
}

#[test]
fn test_report_progress_by_updating_sequence_via_callback() {
    let ring_buffer = ring_buffer(WaitStrategyOption::Blocking);
    let (callback_done, callback_latch) = mpsc::channel();
    let (release, release_end_of_batch) = mpsc::channel();

    let consumer = BatchConsumer::new(
        Arc::clone(&ring_buffer),
        ring_buffer.create_consumer_barrier(&[]),
        SequenceTrackingHandler {
            callback: None,
            callback_done,
            release_end_of_batch,
        },
    );
    ring_buffer.set_tracked_consumers(&[&consumer]).unwrap();

    let (halt_handle, thread) = consumer.spawn(ThreadBuilder::new()).unwrap();
    assert_eq!(halt_handle.sequence().get(), -1);
    publish(&ring_buffer, 1);

    callback_latch.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(halt_handle.sequence().get(), 0);

    release.send(()).unwrap();
    assert_eq!(halt_handle.sequence().get(), 0);

    halt_handle.halt();
    thread.join().unwrap();
}

fn halt_idle_consumer(wait_strategy: WaitStrategyOption) {
    let ring_buffer = ring_buffer(wait_strategy);
    let (consumer, calls, _latch) = recording_consumer(&ring_buffer);

    let (halt_handle, thread) = consumer.spawn(ThreadBuilder::new()).unwrap();
    while halt_handle.state() != ConsumerState::Running {
        std::thread::yield_now();
    }
    std::thread::sleep(Duration::from_millis(20));

    halt_handle.halt();
    halt_handle.halt();
    thread.join().unwrap();

    assert_eq!(halt_handle.state(), ConsumerState::Halted);
    assert_eq!(*calls.lock().unwrap(), vec![Call::Start, Call::Shutdown]);
}

#[test]
fn test_halt_with_blocking_strategy() {
    halt_idle_consumer(WaitStrategyOption::Blocking);
}

#[test]
fn test_halt_with_yielding_strategy() {
    halt_idle_consumer(WaitStrategyOption::Yielding);
}

#[test]
fn test_halt_with_busy_spin_strategy() {
    halt_idle_consumer(WaitStrategyOption::BusySpin);
}

#[test]
fn test_claim_batch_and_commit_back() {
    let ring_buffer = ring_buffer(WaitStrategyOption::Blocking);
    let barrier = ring_buffer.create_consumer_barrier(&[]);
    let cursor_consumer = NoOpConsumer::new(ring_buffer.cursor_sequence());
    ring_buffer
        .set_tracked_consumers(&[&cursor_consumer])
        .unwrap();

    let batch_size = 5;
    let mut batch = ring_buffer.next_entries(batch_size).unwrap();
    assert_eq!(batch.start(), 0);
    assert_eq!(batch.end(), 4);
    assert_eq!(ring_buffer.cursor(), -1);

    for (sequence, entry) in batch.iter_mut() {
        entry.value = sequence + 100;
    }
    ring_buffer.commit_batch(batch);

    assert_eq!(ring_buffer.cursor(), batch_size as i64 - 1);
    assert_eq!(barrier.wait_for(0).unwrap(), batch_size as i64 - 1);
    assert_eq!(ring_buffer.entry(3).value, 103);
}

#[test]
fn test_batch_consumer_sees_batch_commit_at_once() {
    let ring_buffer = ring_buffer(WaitStrategyOption::Yielding);
    let (consumer, calls, latch) = recording_consumer(&ring_buffer);
    let (halt_handle, thread) = consumer.spawn(ThreadBuilder::new()).unwrap();

    let mut batch = ring_buffer.next_entries(4).unwrap();
    for (sequence, entry) in batch.iter_mut() {
        entry.value = sequence * 2;
    }
    ring_buffer.commit_batch(batch);

    latch.recv_timeout(Duration::from_secs(5)).unwrap();
    halt_handle.halt();
    thread.join().unwrap();

    let calls = calls.lock().unwrap();
    let available: Vec<Call> = calls
        .iter()
        .filter(|call| matches!(call, Call::Available(..)))
        .cloned()
        .collect();
    assert_eq!(
        available,
        (0..4).map(|s| Call::Available(s, s * 2)).collect::<Vec<_>>()
    );
    let batches = calls
        .iter()
        .filter(|call| **call == Call::EndOfBatch)
        .count();
    assert_eq!(batches, 1);
}
