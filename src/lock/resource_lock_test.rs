use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

use super::*;

fn wait_until(
    timeout: Duration,
    mut check: impl FnMut() -> bool,
) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    check()
}

#[test]
fn test_exclusive_resource_is_mutually_exclusive() {
    let lock = ResourceLock::new();

    assert!(lock.acquire(LockMask::BATCH, true));
    assert_eq!(lock.held(), LockMask::BATCH);
    assert!(!lock.acquire(LockMask::BATCH, false));

    lock.release(LockMask::BATCH);
    assert!(lock.held().is_empty());
    assert!(lock.acquire(LockMask::BATCH, false));
    lock.release(LockMask::BATCH);
}

// Case: N readers hold the registry together, a writer queues behind them,
// a reader arriving after the writer waits for the writer.
#[test]
fn test_readers_share_and_writer_waits_for_all_of_them() {
    const READERS: usize = 3;
    let lock = Arc::new(ResourceLock::new());
    let all_reading = Arc::new(Barrier::new(READERS + 1));
    let release_readers = Arc::new(Barrier::new(READERS + 1));
    let active_readers = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..READERS {
        let lock = lock.clone();
        let all_reading = all_reading.clone();
        let release_readers = release_readers.clone();
        let active_readers = active_readers.clone();
        handles.push(thread::spawn(move || {
            assert!(lock.acquire(LockMask::REGISTRY_READ, true));
            active_readers.fetch_add(1, Ordering::SeqCst);
            all_reading.wait();
            release_readers.wait();
            active_readers.fetch_sub(1, Ordering::SeqCst);
            lock.release(LockMask::REGISTRY_READ);
        }));
    }

    // every reader holds the lock at the same time
    all_reading.wait();
    assert_eq!(active_readers.load(Ordering::SeqCst), READERS as u32);
    assert_eq!(
        lock.counters(LockMask::REGISTRY_READ),
        Some(RwCounters {
            readers: READERS as u32,
            writers_waiting: 0
        })
    );

    let writer_in = Arc::new(AtomicBool::new(false));
    let late_reader_in = Arc::new(AtomicBool::new(false));
    let writer = {
        let lock = lock.clone();
        let writer_in = writer_in.clone();
        let late_reader_in = late_reader_in.clone();
        let active_readers = active_readers.clone();
        thread::spawn(move || {
            assert!(lock.acquire(LockMask::REGISTRY_WRITE, true));
            assert_eq!(active_readers.load(Ordering::SeqCst), 0);
            writer_in.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            assert!(!late_reader_in.load(Ordering::SeqCst));
            writer_in.store(false, Ordering::SeqCst);
            lock.release(LockMask::REGISTRY_WRITE);
        })
    };

    assert!(wait_until(Duration::from_secs(2), || {
        lock.counters(LockMask::REGISTRY_READ).map(|c| c.writers_waiting) == Some(1)
    }));
    assert!(!writer_in.load(Ordering::SeqCst));

    let late_reader = {
        let lock = lock.clone();
        let late_reader_in = late_reader_in.clone();
        let writer_in = writer_in.clone();
        thread::spawn(move || {
            assert!(lock.acquire(LockMask::REGISTRY_READ, true));
            assert!(!writer_in.load(Ordering::SeqCst));
            late_reader_in.store(true, Ordering::SeqCst);
            lock.release(LockMask::REGISTRY_READ);
        })
    };

    thread::sleep(Duration::from_millis(20));
    // writer priority: the late reader queues behind the waiting writer
    assert!(!late_reader_in.load(Ordering::SeqCst));

    release_readers.wait();
    for handle in handles {
        handle.join().unwrap();
    }
    writer.join().unwrap();
    late_reader.join().unwrap();

    assert!(late_reader_in.load(Ordering::SeqCst));
    assert!(lock.held().is_empty());
}

#[test]
fn test_non_blocking_acquire_on_held_resource_leaves_counters_unchanged() {
    let lock = ResourceLock::new();
    assert!(lock.acquire(LockMask::REGISTRY_READ, true));
    let before = lock.counters(LockMask::REGISTRY_READ);

    assert!(!lock.acquire(LockMask::REGISTRY_WRITE, false));
    assert!(lock.try_lock(LockMask::REGISTRY_WRITE).is_none());
    assert_eq!(lock.counters(LockMask::REGISTRY_READ), before);
    assert_eq!(lock.held(), LockMask::REGISTRY_READ);

    lock.release(LockMask::REGISTRY_READ);
    assert!(lock.acquire(LockMask::REGISTRY_WRITE, false));
    assert_eq!(lock.held(), LockMask::REGISTRY_WRITE);
    assert!(!lock.acquire(LockMask::REGISTRY_READ, false));
    assert_eq!(
        lock.counters(LockMask::REGISTRY_WRITE),
        Some(RwCounters {
            readers: 0,
            writers_waiting: 0
        })
    );
    lock.release(LockMask::REGISTRY_WRITE);
    assert!(lock.held().is_empty());
}

#[test]
fn test_non_blocking_acquire_is_all_or_nothing() {
    let lock = ResourceLock::new();
    let _batch = lock.lock(LockMask::BATCH);

    assert!(lock
        .try_lock(LockMask::REGISTRY_READ | LockMask::BATCH)
        .is_none());
    assert_eq!(lock.held(), LockMask::BATCH);
    assert_eq!(lock.counters(LockMask::REGISTRY_READ).unwrap().readers, 0);
}

#[test]
fn test_mask_acquires_several_resources_in_one_call() {
    let lock = ResourceLock::new();
    {
        let guard = lock.lock(LockMask::REGISTRY_READ | LockMask::BATCH);
        assert_eq!(guard.mask(), LockMask::REGISTRY_READ | LockMask::BATCH);
        assert_eq!(lock.held(), LockMask::REGISTRY_READ | LockMask::BATCH);
    }
    assert!(lock.held().is_empty());
}

#[test]
fn test_read_and_write_of_same_resource_is_skipped() {
    let lock = ResourceLock::new();

    assert!(lock.acquire(
        LockMask::REGISTRY_READ | LockMask::REGISTRY_WRITE | LockMask::BATCH,
        true
    ));
    // the conflicting resource is skipped, the rest of the mask applies
    assert_eq!(lock.held(), LockMask::BATCH);
    assert_eq!(lock.counters(LockMask::REGISTRY_READ).unwrap().readers, 0);
    lock.release(LockMask::BATCH);
}

#[test]
fn test_blocked_exclusive_waiter_wakes_on_release() {
    let lock = Arc::new(ResourceLock::new());
    assert!(lock.acquire(LockMask::BATCH, true));

    let acquired = Arc::new(AtomicBool::new(false));
    let waiter = {
        let lock = lock.clone();
        let acquired = acquired.clone();
        thread::spawn(move || {
            let _guard = lock.lock(LockMask::BATCH);
            acquired.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(20));
    assert!(!acquired.load(Ordering::SeqCst));
    lock.release(LockMask::BATCH);
    waiter.join().unwrap();
    assert!(acquired.load(Ordering::SeqCst));
}
