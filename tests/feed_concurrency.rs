//! Concurrency properties of the shared feed under real threads.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use tickfeed::{Observation, SharedFeed, WakePolicy};

/// Each writer pushes a strictly increasing sequence per key; any window a
/// reader sees must be a contiguous, increasing run of that sequence.
#[test]
fn windows_are_consistent_snapshots_under_concurrent_pushes() {
    const CAPACITY: usize = 16;
    const PUSHES: u64 = 5_000;
    let feed = Arc::new(SharedFeed::new(CAPACITY));
    let done = Arc::new(AtomicBool::new(false));
    let keys = ["A", "B", "C"];

    let writers: Vec<_> = keys
        .iter()
        .map(|key| {
            let feed = Arc::clone(&feed);
            let key = key.to_string();
            thread::spawn(move || {
                for i in 0..PUSHES {
                    feed.push(Observation::new(key.clone(), i as f64, 1.0));
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let feed = Arc::clone(&feed);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut checked = 0u64;
                while !done.load(Ordering::SeqCst) {
                    for key in feed.list_keys() {
                        let window = feed.window(&key, CAPACITY);
                        assert!(window.len() <= CAPACITY);
                        for pair in window.windows(2) {
                            assert_eq!(pair[1].value, pair[0].value + 1.0, "gap in {}", key);
                            assert_eq!(pair[0].key, key);
                        }
                        checked += 1;
                    }
                }
                checked
            })
        })
        .collect();

    for w in writers {
        w.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);
    let checked: u64 = readers.into_iter().map(|r| r.join().unwrap()).sum();
    assert!(checked > 0);

    assert_eq!(feed.stats().writes, PUSHES * keys.len() as u64);
    for key in keys {
        let window = feed.window(key, CAPACITY);
        let values: Vec<f64> = window.iter().map(|o| o.value).collect();
        let expected: Vec<f64> = (PUSHES - CAPACITY as u64..PUSHES).map(|v| v as f64).collect();
        assert_eq!(values, expected);
    }
}

#[test]
fn shutdown_releases_every_blocked_waiter() {
    let feed = Arc::new(SharedFeed::new(10));
    let waiters = 6;
    let barrier = Arc::new(Barrier::new(waiters + 1));
    let handles: Vec<_> = (0..waiters)
        .map(|_| {
            let feed = Arc::clone(&feed);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let started = Instant::now();
                let woke = feed.wait_for_update(Duration::from_secs(60));
                (woke, started.elapsed())
            })
        })
        .collect();
    barrier.wait();
    thread::sleep(Duration::from_millis(50));
    feed.shutdown_now();
    for h in handles {
        let (woke, elapsed) = h.join().unwrap();
        assert!(woke);
        assert!(elapsed < Duration::from_secs(10));
    }
    let started = Instant::now();
    assert!(feed.wait_for_update(Duration::from_secs(60)));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn push_broadcasts_to_all_waiters() {
    let feed = Arc::new(SharedFeed::with_policy(10, WakePolicy::NewWrite));
    let waiters = 4;
    let barrier = Arc::new(Barrier::new(waiters + 1));
    let woken = Arc::new(AtomicU64::new(0));
    let handles: Vec<_> = (0..waiters)
        .map(|_| {
            let feed = Arc::clone(&feed);
            let barrier = Arc::clone(&barrier);
            let woken = Arc::clone(&woken);
            thread::spawn(move || {
                barrier.wait();
                if feed.wait_for_update(Duration::from_secs(10)) {
                    woken.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    barrier.wait();
    thread::sleep(Duration::from_millis(50));
    feed.push(Observation::new("X", 1.0, 0.0));
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(woken.load(Ordering::SeqCst), waiters as u64);
}

#[test]
fn shutdown_is_safe_concurrently_with_pushes() {
    let feed = Arc::new(SharedFeed::new(8));
    let writer = {
        let feed = Arc::clone(&feed);
        thread::spawn(move || {
            for i in 0..2_000 {
                feed.push(Observation::new("K", i as f64, 0.0));
            }
        })
    };
    let closers: Vec<_> = (0..3)
        .map(|_| {
            let feed = Arc::clone(&feed);
            thread::spawn(move || feed.shutdown_now())
        })
        .collect();
    writer.join().unwrap();
    for c in closers {
        c.join().unwrap();
    }
    assert!(feed.is_shutdown());
    assert_eq!(feed.stats().writes, 2_000);
    assert_eq!(feed.window("K", 100).len(), 8);
}

#[test]
fn panicking_reader_does_not_corrupt_feed() {
    let feed = Arc::new(SharedFeed::new(4));
    feed.push(Observation::new("X", 1.0, 0.0));
    let reader = {
        let feed = Arc::clone(&feed);
        thread::spawn(move || {
            let window = feed.window("X", 4);
            // statistic blows up outside the lock
            let _ = window[10].value;
        })
    };
    assert!(reader.join().is_err());
    feed.push(Observation::new("X", 2.0, 1.0));
    assert_eq!(feed.latest("X").map(|o| o.value), Some(2.0));
    assert_eq!(feed.stats().writes, 2);
}
