// Copyright 2024 tison <wander4096@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use super::*;

#[test]
fn readers_run_concurrently() {
    let lock = Arc::new(RwLock::new(0_i32, Inherit::NoInherit));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let lock = lock.clone();
            let active = active.clone();
            let peak = peak.clone();
            thread::spawn(move || {
                let _r = lock.rget(Timeout::Forever).unwrap();
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(30));
                active.fetch_sub(1, Ordering::SeqCst);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) > 1, "readers never overlapped");
}

/// Invariant 1: at most one writer critical section at a time, and none
/// while any reader holds the lock.
#[test]
fn writer_excludes_readers_and_other_writers() {
    let lock = Arc::new(RwLock::new(0_i32, Inherit::NoInherit));
    let readers_active = Arc::new(AtomicUsize::new(0));
    let writers_active = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..6 {
        let lock = lock.clone();
        let readers_active = readers_active.clone();
        let writers_active = writers_active.clone();
        let violations = violations.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..50 {
                if i % 2 == 0 {
                    let mut w = lock.wget(Timeout::Forever).unwrap();
                    if readers_active.load(Ordering::SeqCst) > 0
                        || writers_active.fetch_add(1, Ordering::SeqCst) > 0
                    {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                    *w += 1;
                    writers_active.fetch_sub(1, Ordering::SeqCst);
                } else {
                    let _r = lock.rget(Timeout::Forever).unwrap();
                    if writers_active.load(Ordering::SeqCst) > 0 {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                    readers_active.fetch_add(1, Ordering::SeqCst);
                    readers_active.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(violations.load(Ordering::SeqCst), 0);
}

/// S3 -- ten readers hold the lock; a writer must not be admitted until the
/// tenth reader releases.
#[test]
fn writer_waits_for_all_readers() {
    let lock = Arc::new(RwLock::new(0_i32, Inherit::NoInherit));
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let readers: Vec<_> = (0..10)
        .map(|i| {
            let lock = lock.clone();
            let order = order.clone();
            thread::spawn(move || {
                let _r = lock.rget(Timeout::Forever).unwrap();
                thread::sleep(Duration::from_millis(40));
                order.lock().unwrap().push(format!("reader-{i}"));
            })
        })
        .collect();
    thread::sleep(Duration::from_millis(10));

    let writer_lock = lock.clone();
    let writer_order = order.clone();
    let writer = thread::spawn(move || {
        let mut w = writer_lock.wget(Timeout::Forever).unwrap();
        *w = 1;
        writer_order.lock().unwrap().push("writer".to_string());
    });

    for r in readers {
        r.join().unwrap();
    }
    writer.join().unwrap();

    let order = order.lock().unwrap();
    assert_eq!(order.last().unwrap(), "writer");
    assert_eq!(order.len(), 11);
}

/// S4 -- a reader calling `rget` against a writer-held lock times out close
/// to its requested deadline, not earlier and not much later.
#[test]
fn rget_deadline_is_honored_against_held_writer() {
    let lock = Arc::new(RwLock::new(0_i32, Inherit::NoInherit));
    let _w = lock.wget(Timeout::Forever).unwrap();

    let start = Instant::now();
    let err = lock.rget(Timeout::Ticks(100)).unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(err, Status::NoInstance);
    assert!(elapsed >= Duration::from_millis(90), "returned too early: {elapsed:?}");
    assert!(elapsed <= Duration::from_millis(300), "returned too late: {elapsed:?}");
}

/// Invariant 8: `rget`'s deadline is carried across the reader-count mutex
/// wait and the write-semaphore wait, not reset between them.
#[test]
fn rget_deadline_spans_both_sub_acquisitions() {
    let lock = Arc::new(RwLock::new(0_i32, Inherit::NoInherit));
    let _w = lock.wget(Timeout::Forever).unwrap();

    // Contend for the reader-count mutex briefly from another thread so the
    // mutex wait itself consumes part of the budget.
    let lock2 = lock.clone();
    let contender = {
        let held = lock2.reader_count.lock(Timeout::Forever).unwrap();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            drop(held);
        })
    };

    let start = Instant::now();
    let err = lock.rget(Timeout::Ticks(100)).unwrap_err();
    let elapsed = start.elapsed();
    contender.join().unwrap();

    assert_eq!(err, Status::NoInstance);
    // Total elapsed must stay close to the original 100-tick budget, not
    // 100 ticks measured from after the mutex was finally acquired.
    assert!(elapsed <= Duration::from_millis(300), "budget was not shared: {elapsed:?}");
}

#[test]
fn prioritize_writers_promotes_queued_writer_over_readers() {
    let lock = Arc::new(RwLock::new(0_i32, Inherit::NoInherit));
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let _w = lock.wget(Timeout::Forever).unwrap();

    let reader = {
        let lock = lock.clone();
        let order = order.clone();
        thread::spawn(move || {
            let _r = lock.rget(Timeout::Forever).unwrap();
            order.lock().unwrap().push("reader");
        })
    };
    thread::sleep(Duration::from_millis(20));

    let writer = {
        let lock = lock.clone();
        let order = order.clone();
        thread::spawn(move || {
            let _w2 = lock.wget(Timeout::Forever).unwrap();
            order.lock().unwrap().push("writer");
        })
    };
    thread::sleep(Duration::from_millis(20));

    lock.prioritize_writers();
    drop(_w);

    writer.join().unwrap();
    reader.join().unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["writer", "reader"]);
}

#[test]
fn delete_releases_waiters_with_deleted() {
    let lock = Arc::new(RwLock::new(0_i32, Inherit::NoInherit));
    let _w = lock.wget(Timeout::Forever).unwrap();

    let lock2 = lock.clone();
    let handle = thread::spawn(move || lock2.rget(Timeout::Forever));
    thread::sleep(Duration::from_millis(30));

    lock.delete();

    assert_eq!(handle.join().unwrap().unwrap_err(), Status::Deleted);
}
