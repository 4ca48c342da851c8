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

//! A counting semaphore: one of the three building blocks the host kernel
//! is assumed to provide. [`barrier`](crate::barrier), [`rwlock`](crate::rwlock)
//! and [`mutex`](super::mutex::RawMutex) are all expressed in terms of it.
//!
//! Unlike an async semaphore, [`RawSemaphore`] is a blocking, timeout-aware
//! primitive: callers suspend the calling thread, not a future.

use std::collections::VecDeque;
use std::sync::Condvar;
use std::sync::Mutex;
use std::time::Instant;

use crate::error::Status;
use crate::kernel::timeout::Timeout;

type Ticket = u64;

struct SemState {
    count: u32,
    closed: bool,
    /// Bumped by [`RawSemaphore::abort_waiters`]; a waiter that entered
    /// under an earlier epoch returns `WaitAborted` as soon as it observes
    /// the change.
    abort_epoch: u64,
    next_seq: Ticket,
    /// Suspension order. A ticket at the front may take permits as soon as
    /// they're available; later tickets wait behind it even if the count
    /// would otherwise satisfy them, which is what makes `acquire` fair.
    queue: VecDeque<(Ticket, u8)>,
}

impl SemState {
    fn remove_ticket(&mut self, ticket: Ticket) {
        self.queue.retain(|&(t, _)| t != ticket);
    }
}

/// A blocking counting semaphore with a fair suspension queue, abortable
/// waits, and a closeable lifecycle.
///
/// See the [module level documentation](self) for more.
pub struct RawSemaphore {
    state: Mutex<SemState>,
    condvar: Condvar,
}

/// Priority used by callers that don't care about suspension-list
/// ordering; the least urgent value, so it never jumps ahead of a ticket
/// acquired with an explicit priority.
pub const NEUTRAL_PRIORITY: u8 = u8::MAX;

impl RawSemaphore {
    /// Creates a semaphore with `initial` permits available.
    pub fn new(initial: u32) -> Self {
        Self {
            state: Mutex::new(SemState {
                count: initial,
                closed: false,
                abort_epoch: 0,
                next_seq: 0,
                queue: VecDeque::new(),
            }),
            condvar: Condvar::new(),
        }
    }

    /// Current number of permits, ignoring anyone queued to take them.
    pub fn available_permits(&self) -> u32 {
        self.state.lock().unwrap().count
    }

    /// Acquires `n` permits, suspending the caller for up to `timeout` if
    /// they are not immediately available.
    ///
    /// # Cancel safety
    ///
    /// Suspension uses a FIFO queue to fairly distribute permits in the
    /// order they were requested. A caller whose wait times out keeps its
    /// place neither: the ticket is removed and a retry re-enters at the
    /// back of the queue.
    pub fn acquire(&self, n: u32, timeout: Timeout) -> Result<(), Status> {
        self.acquire_with_priority(n, timeout, NEUTRAL_PRIORITY)
    }

    /// Like [`acquire`](Self::acquire), but registers the waiter at the
    /// given priority so a later [`prioritize`](Self::prioritize) call can
    /// promote it ahead of less urgent waiters.
    pub fn acquire_with_priority(
        &self,
        n: u32,
        timeout: Timeout,
        priority: u8,
    ) -> Result<(), Status> {
        let start = Instant::now();
        let deadline = timeout.deadline_from(start);
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(Status::Deleted);
        }
        let my_epoch = state.abort_epoch;
        let ticket = state.next_seq;
        state.next_seq += 1;
        state.queue.push_back((ticket, priority));

        loop {
            if state.closed {
                state.remove_ticket(ticket);
                return Err(Status::Deleted);
            }
            if state.abort_epoch != my_epoch {
                state.remove_ticket(ticket);
                return Err(Status::WaitAborted);
            }
            let at_front = state.queue.front().map(|&(t, _)| t) == Some(ticket);
            if at_front && state.count >= n {
                state.count -= n;
                state.queue.pop_front();
                return Ok(());
            }

            match timeout {
                Timeout::NoWait => {
                    state.remove_ticket(ticket);
                    return Err(Status::NoInstance);
                }
                Timeout::Forever => {
                    state = self.condvar.wait(state).unwrap();
                }
                Timeout::Ticks(_) => {
                    let remaining = deadline.unwrap().checked_duration_since(Instant::now());
                    let remaining = match remaining {
                        Some(d) if !d.is_zero() => d,
                        _ => {
                            state.remove_ticket(ticket);
                            return Err(Status::NoInstance);
                        }
                    };
                    let (guard, _) = self.condvar.wait_timeout(state, remaining).unwrap();
                    state = guard;
                }
            }
        }
    }

    /// Attempts to acquire `n` permits without blocking. Unlike
    /// [`acquire`](Self::acquire), this may cut ahead of queued waiters.
    pub fn try_acquire(&self, n: u32) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.closed && state.count >= n {
            state.count -= n;
            true
        } else {
            false
        }
    }

    /// Releases `n` permits back to the semaphore, waking any waiter that
    /// can now proceed.
    pub fn release(&self, n: u32) {
        let mut state = self.state.lock().unwrap();
        state.count = state
            .count
            .checked_add(n)
            .expect("semaphore permit count overflow");
        drop(state);
        self.condvar.notify_all();
    }

    /// Sets the permit count to zero without waking anyone. Used by
    /// [`Barrier::reset`](crate::barrier::Barrier::reset) to discard any
    /// residual propagation unit before aborting waiters.
    pub fn drain(&self) {
        self.state.lock().unwrap().count = 0;
    }

    /// Aborts every thread currently suspended in [`acquire`](Self::acquire):
    /// they return `WaitAborted`. Threads that call `acquire` afterward are
    /// unaffected.
    pub fn abort_waiters(&self) {
        let mut state = self.state.lock().unwrap();
        state.abort_epoch += 1;
        drop(state);
        self.condvar.notify_all();
    }

    /// Moves the most urgent (lowest priority value) currently-queued
    /// waiter to the front of the suspension list, mirroring the host
    /// kernel's semaphore-prioritize primitive. A one-shot reorder, not a
    /// standing policy.
    pub fn prioritize(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(best_idx) = state
            .queue
            .iter()
            .enumerate()
            .min_by_key(|(_, &(_, prio))| prio)
            .map(|(idx, _)| idx)
        {
            if let Some(ticket) = state.queue.remove(best_idx) {
                state.queue.push_front(ticket);
            }
        }
    }

    /// Closes the semaphore: every current and future waiter returns
    /// `Deleted`.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        drop(state);
        self.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn acquire_release_round_trip() {
        let sem = RawSemaphore::new(2);
        sem.acquire(1, Timeout::NoWait).unwrap();
        sem.acquire(1, Timeout::NoWait).unwrap();
        assert_eq!(sem.available_permits(), 0);
        assert_eq!(
            sem.acquire(1, Timeout::NoWait).unwrap_err(),
            Status::NoInstance
        );
        sem.release(2);
        assert_eq!(sem.available_permits(), 2);
    }

    #[test]
    fn timeout_returns_no_instance() {
        let sem = RawSemaphore::new(0);
        let err = sem.acquire(1, Timeout::Ticks(20)).unwrap_err();
        assert_eq!(err, Status::NoInstance);
    }

    #[test]
    fn closed_semaphore_wakes_waiters_with_deleted() {
        let sem = Arc::new(RawSemaphore::new(0));
        let sem2 = sem.clone();
        let handle = thread::spawn(move || sem2.acquire(1, Timeout::Forever));
        thread::sleep(Duration::from_millis(30));
        sem.close();
        assert_eq!(handle.join().unwrap().unwrap_err(), Status::Deleted);
    }

    #[test]
    fn abort_waiters_returns_wait_aborted() {
        let sem = Arc::new(RawSemaphore::new(0));
        let sem2 = sem.clone();
        let handle = thread::spawn(move || sem2.acquire(1, Timeout::Forever));
        thread::sleep(Duration::from_millis(30));
        sem.abort_waiters();
        assert_eq!(handle.join().unwrap().unwrap_err(), Status::WaitAborted);

        // A fresh acquire after the abort is unaffected by the old epoch.
        sem.release(1);
        sem.acquire(1, Timeout::NoWait).unwrap();
    }

    #[test]
    fn fifo_order_is_respected() {
        let sem = Arc::new(RawSemaphore::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..4 {
            let sem = sem.clone();
            let order = order.clone();
            handles.push(thread::spawn(move || {
                sem.acquire(1, Timeout::Forever).unwrap();
                order.lock().unwrap().push(i);
            }));
            // Give each thread time to register its ticket before the next
            // one spawns, so the expected order is deterministic.
            thread::sleep(Duration::from_millis(20));
        }
        for _ in 0..4 {
            sem.release(1);
            thread::sleep(Duration::from_millis(20));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn prioritize_promotes_most_urgent_waiter() {
        let sem = Arc::new(RawSemaphore::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let low = {
            let sem = sem.clone();
            let order = order.clone();
            thread::spawn(move || {
                sem.acquire_with_priority(1, Timeout::Forever, 200).unwrap();
                order.lock().unwrap().push("low");
            })
        };
        thread::sleep(Duration::from_millis(20));

        let high = {
            let sem = sem.clone();
            let order = order.clone();
            thread::spawn(move || {
                sem.acquire_with_priority(1, Timeout::Forever, 1).unwrap();
                order.lock().unwrap().push("high");
            })
        };
        thread::sleep(Duration::from_millis(20));

        sem.prioritize();
        sem.release(1);
        high.join().unwrap();
        sem.release(1);
        low.join().unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["high", "low"]);
    }
}
