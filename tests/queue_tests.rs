//! # Key Queue Integration Tests
//!
//! Exercises the queue under concurrent workers:
//! - repeated adds collapse to one take
//! - a key is never held by two workers at once
//! - shutdown unblocks every waiting worker

mod common;

use autoreplica_controller::prelude::*;
use common::{coffee, FakeChildStore, MemoryCache, RecordingReporter};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn queue() -> KeyQueue {
    KeyQueue::new(common::test_backoff(), 3, RecordingReporter::new())
}

#[tokio::test]
async fn test_repeated_adds_yield_single_take() {
    let queue = queue();
    let key = WorkKey::new("default", "coffee");
    for _ in 0..10 {
        queue.add(key.clone());
    }

    assert_eq!(queue.take().await, Some(key.clone()));
    queue.done(&key);
    queue.shutdown();
    assert_eq!(queue.take().await, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_two_workers_hold_the_same_key() {
    let queue = queue();
    let key = WorkKey::new("default", "coffee");
    queue.add(key.clone());
    let first = queue.take().await.unwrap();

    // Re-add while in flight, then race two takers against it
    queue.add(key.clone());
    let racers: Vec<_> = (0..2)
        .map(|_| {
            let queue = queue.clone();
            tokio::spawn(async move {
                tokio::time::timeout(Duration::from_millis(100), queue.take()).await
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(queue.is_in_flight(&first));
    assert_eq!(queue.len(), 0, "parked key must wait for done");

    queue.done(&first);

    let mut taken = 0;
    for racer in racers {
        if let Ok(Some(got)) = racer.await.unwrap() {
            assert_eq!(got, key);
            taken += 1;
        }
    }
    assert_eq!(taken, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_workers_never_overlap_on_a_child() {
    let cache = MemoryCache::synced_with(&[coffee()]);
    let store = FakeChildStore::slow(Duration::from_millis(20));
    let reconciler = Arc::new(common::reconciler(
        cache,
        Arc::clone(&store),
        RecordingReporter::new(),
        3,
    ));
    let queue = reconciler.queue().clone();
    let cancel = CancellationToken::new();

    let workers: Vec<_> = (0..4)
        .map(|id| tokio::spawn(Arc::clone(&reconciler).run_worker(id, cancel.clone())))
        .collect();

    for _ in 0..20 {
        queue.add(WorkKey::new("default", "coffee"));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    queue.shutdown();
    for worker in workers {
        worker.await.unwrap();
    }

    assert_eq!(store.max_active_per_child(), 1);
    assert!(store.calls() >= 1);
    assert_eq!(store.children().len(), 1);
}

#[tokio::test]
async fn test_shutdown_releases_all_waiting_workers() {
    let queue = queue();
    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let queue = queue.clone();
            tokio::spawn(async move { queue.take().await })
        })
        .collect();
    tokio::task::yield_now().await;

    queue.shutdown();
    for waiter in waiters {
        assert_eq!(waiter.await.unwrap(), None);
    }
}
