//! Multi-producer and pipeline tests
//!
//! Several producers on a multi-threaded claim strategy must leave a gap-free
//! published range behind them, and consumers wired behind other consumers
//! must never read past their upstream.

use batchring::disruptor::{
    BatchConsumer, BatchHandler, ClaimStrategyKind, ClaimStrategyOption, ClosureBatchHandler,
    DefaultEntryFactory, RingBuffer, Sequence, ThreadBuilder, WaitStrategyKind,
    WaitStrategyOption,
};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Default, Clone)]
struct TestEntry {
    producer_id: usize,
    value: i64,
}

type TestRing = RingBuffer<TestEntry, ClaimStrategyKind, WaitStrategyKind>;

fn multi_producer_ring(capacity: usize, wait_strategy: WaitStrategyOption) -> Arc<TestRing> {
    Arc::new(
        RingBuffer::create(
            DefaultEntryFactory::<TestEntry>::new(),
            capacity,
            ClaimStrategyOption::MultiThreaded,
            wait_strategy,
        )
        .unwrap(),
    )
}

#[test]
fn test_later_claim_waits_for_earlier_commit() {
    let ring_buffer = multi_producer_ring(16, WaitStrategyOption::Blocking);
    let barrier = ring_buffer.create_consumer_barrier(&[]);

    let first = ring_buffer.claim_next();
    let mut second = ring_buffer.claim_next();
    assert_eq!(first.sequence(), 0);
    assert_eq!(second.sequence(), 1);
    second.value = 2;

    thread::scope(|scope| {
        let ring = &ring_buffer;
        let committer = scope.spawn(move || ring.commit(second));

        thread::sleep(Duration::from_millis(50));
        assert_eq!(ring_buffer.cursor(), -1);
        assert_eq!(
            barrier.wait_for_timeout(0, Duration::from_millis(5)).unwrap(),
            -1
        );
        assert!(!committer.is_finished());

        ring_buffer.commit(first);
        committer.join().unwrap();
    });

    assert_eq!(ring_buffer.cursor(), 1);
    assert_eq!(barrier.wait_for(0).unwrap(), 1);
    assert_eq!(ring_buffer.entry(1).value, 2);
}

#[test]
fn test_concurrent_producers_publish_every_entry_in_order() {
    const PRODUCERS: usize = 4;
    const ENTRIES_PER_PRODUCER: i64 = 2_000;

    let ring_buffer = multi_producer_ring(64, WaitStrategyOption::Yielding);
    let next_expected = Arc::new(Mutex::new(vec![0i64; PRODUCERS]));
    let out_of_order = Arc::new(AtomicUsize::new(0));

    let consumer = {
        let next_expected = Arc::clone(&next_expected);
        let out_of_order = Arc::clone(&out_of_order);
        BatchConsumer::new(
            Arc::clone(&ring_buffer),
            ring_buffer.create_consumer_barrier(&[]),
            ClosureBatchHandler::new(move |entry: &TestEntry, _sequence: i64| {
                let mut next_expected = next_expected.lock().unwrap();
                if next_expected[entry.producer_id] != entry.value {
                    out_of_order.fetch_add(1, Ordering::SeqCst);
                }
                next_expected[entry.producer_id] = entry.value + 1;
                Ok(())
            }),
        )
    };
    ring_buffer.set_tracked_consumers(&[&consumer]).unwrap();
    let (halt_handle, consumer_thread) = consumer.spawn(ThreadBuilder::new()).unwrap();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer_id| {
            let ring_buffer = Arc::clone(&ring_buffer);
            thread::spawn(move || {
                for value in 0..ENTRIES_PER_PRODUCER {
                    let mut entry = ring_buffer.claim_next();
                    entry.producer_id = producer_id;
                    entry.value = value;
                    ring_buffer.commit(entry);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let last_sequence = PRODUCERS as i64 * ENTRIES_PER_PRODUCER - 1;
    assert_eq!(ring_buffer.cursor(), last_sequence);
    while halt_handle.sequence().get() < last_sequence {
        thread::yield_now();
    }
    halt_handle.halt();
    consumer_thread.join().unwrap();

    assert_eq!(out_of_order.load(Ordering::SeqCst), 0);
    assert_eq!(
        *next_expected.lock().unwrap(),
        vec![ENTRIES_PER_PRODUCER; PRODUCERS]
    );
}

#[test]
fn test_concurrent_batch_claims_stay_contiguous() {
    let ring_buffer = multi_producer_ring(32, WaitStrategyOption::BusySpin);
    let seen = Arc::new(AtomicI64::new(-1));
    let gaps = Arc::new(AtomicUsize::new(0));

    let consumer = {
        let seen = Arc::clone(&seen);
        let gaps = Arc::clone(&gaps);
        BatchConsumer::new(
            Arc::clone(&ring_buffer),
            ring_buffer.create_consumer_barrier(&[]),
            ClosureBatchHandler::new(move |_: &TestEntry, sequence: i64| {
                if seen.swap(sequence, Ordering::SeqCst) != sequence - 1 {
                    gaps.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }),
        )
    };
    ring_buffer.set_tracked_consumers(&[&consumer]).unwrap();
    let (halt_handle, consumer_thread) = consumer.spawn(ThreadBuilder::new()).unwrap();

    let producers: Vec<_> = (0..3)
        .map(|producer_id| {
            let ring_buffer = Arc::clone(&ring_buffer);
            thread::spawn(move || {
                for round in 0..200 {
                    let mut batch = ring_buffer.next_entries(4).unwrap();
                    for (_, entry) in batch.iter_mut() {
                        entry.producer_id = producer_id;
                        entry.value = round;
                    }
                    ring_buffer.commit_batch(batch);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let last_sequence = 3 * 200 * 4 - 1;
    while halt_handle.sequence().get() < last_sequence {
        thread::yield_now();
    }
    halt_handle.halt();
    consumer_thread.join().unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), last_sequence);
    assert_eq!(gaps.load(Ordering::SeqCst), 0);
}

/// Adds every value it sees to a shared total
fn summing_handler(total: &Arc<AtomicI64>) -> impl BatchHandler<TestEntry> {
    let total = Arc::clone(total);
    ClosureBatchHandler::new(move |entry: &TestEntry, _sequence: i64| {
        total.fetch_add(entry.value, Ordering::SeqCst);
        Ok(())
    })
}

#[test]
fn test_multicast_with_dependent_consumer() {
    const ENTRIES: i64 = 1_000;

    let ring_buffer = Arc::new(
        RingBuffer::create(
            DefaultEntryFactory::<TestEntry>::new(),
            64,
            ClaimStrategyOption::SingleThreaded,
            WaitStrategyOption::Yielding,
        )
        .unwrap(),
    );

    let totals: Vec<Arc<AtomicI64>> = (0..3).map(|_| Arc::new(AtomicI64::new(0))).collect();
    let upstream: Vec<_> = totals
        .iter()
        .map(|total| {
            BatchConsumer::new(
                Arc::clone(&ring_buffer),
                ring_buffer.create_consumer_barrier(&[]),
                summing_handler(total),
            )
        })
        .collect();

    let upstream_sequences: Vec<Arc<Sequence>> =
        upstream.iter().map(|consumer| consumer.sequence()).collect();
    let overtaken = Arc::new(AtomicUsize::new(0));
    let downstream_total = Arc::new(AtomicI64::new(0));
    let downstream = {
        let overtaken = Arc::clone(&overtaken);
        let downstream_total = Arc::clone(&downstream_total);
        BatchConsumer::new(
            Arc::clone(&ring_buffer),
            ring_buffer.create_consumer_barrier(&[&upstream[0], &upstream[1], &upstream[2]]),
            ClosureBatchHandler::new(move |entry: &TestEntry, sequence: i64| {
                if upstream_sequences.iter().any(|s| s.get() < sequence) {
                    overtaken.fetch_add(1, Ordering::SeqCst);
                }
                downstream_total.fetch_add(entry.value, Ordering::SeqCst);
                Ok(())
            }),
        )
    };
    assert_eq!(downstream.barrier().dependent_sequences().len(), 3);
    ring_buffer.set_tracked_consumers(&[&downstream]).unwrap();

    let mut handles = Vec::new();
    for (index, consumer) in upstream.into_iter().enumerate() {
        handles.push(
            consumer
                .spawn(ThreadBuilder::new().thread_name(format!("multicast-{index}")))
                .unwrap(),
        );
    }
    let (downstream_halt, downstream_thread) = downstream
        .spawn(ThreadBuilder::new().thread_name("dependent"))
        .unwrap();

    for value in 0..ENTRIES {
        let mut entry = ring_buffer.claim_next();
        entry.value = value;
        ring_buffer.commit(entry);
    }

    while downstream_halt.sequence().get() < ENTRIES - 1 {
        thread::yield_now();
    }
    downstream_halt.halt();
    downstream_thread.join().unwrap();
    for (halt_handle, thread) in handles {
        halt_handle.halt();
        thread.join().unwrap();
    }

    let expected: i64 = (0..ENTRIES).sum();
    for total in &totals {
        assert_eq!(total.load(Ordering::SeqCst), expected);
    }
    assert_eq!(downstream_total.load(Ordering::SeqCst), expected);
    assert_eq!(overtaken.load(Ordering::SeqCst), 0);
}
