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

//! A bounded task queue and the worker pool that drains it.
//!
//! Submitted [`WorkItem`]s each carry their own priority and preemption
//! threshold; a worker applies those values to itself (via
//! [`PriorityCell`]) for the duration of the item's `entry`, then drops
//! back to [`IDLE_PRIORITY`] before dequeuing again. See the [module level
//! documentation](self) of [`crate::kernel::priority`] for the rationale.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::thread;
use std::thread::JoinHandle;
use std::time::Instant;

use crate::error::Status;
use crate::kernel::priority::PreemptionThreshold;
use crate::kernel::priority::Priority;
use crate::kernel::priority::PriorityCell;
use crate::kernel::priority::IDLE_PRIORITY;
use crate::kernel::timeout::Timeout;


/// A unit of work submitted to a [`TaskQueue`].
///
/// `entry` runs on whichever worker dequeues the item, with the worker's
/// priority and preemption threshold temporarily set to `priority` /
/// `preemption_threshold` for the duration of the call.
pub struct WorkItem {
    entry: Box<dyn FnOnce() + Send + 'static>,
    priority: Priority,
    preemption_threshold: PreemptionThreshold,
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("priority", &self.priority)
            .field("preemption_threshold", &self.preemption_threshold)
            .finish_non_exhaustive()
    }
}

impl WorkItem {
    /// Builds a work item from an `entry` closure and its scheduling
    /// parameters.
    pub fn new<F>(entry: F, priority: Priority, preemption_threshold: PreemptionThreshold) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            entry: Box::new(entry),
            priority,
            preemption_threshold,
        }
    }
}

struct QueueState {
    items: VecDeque<WorkItem>,
    capacity: usize,
    closed: bool,
}

/// A bounded FIFO of [`WorkItem`]s shared between submitters and a
/// [`WorkerPool`].
///
/// Storage is sized at construction by `capacity`, mirroring the host
/// kernel's `byte_size / sizeof(work_item)` contract; here that arithmetic
/// collapses to a plain item count since Rust's allocator manages the
/// backing storage.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl TaskQueue {
    /// Creates an empty queue that holds at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                capacity,
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Enqueues `item` at the tail, suspending the caller for up to
    /// `timeout` if the queue is at capacity.
    pub fn send(&self, item: WorkItem, timeout: Timeout) -> Result<(), Status> {
        self.insert(item, timeout, false)
    }

    /// Enqueues `item` at the head, bypassing FIFO order for this one item.
    /// Used for urgent work that must run before already-queued items.
    pub fn front_send(&self, item: WorkItem, timeout: Timeout) -> Result<(), Status> {
        self.insert(item, timeout, true)
    }

    fn insert(&self, item: WorkItem, timeout: Timeout, front: bool) -> Result<(), Status> {
        let start = Instant::now();
        let deadline = timeout.deadline_from(start);
        let mut state = self.state.lock().unwrap();
        loop {
            if state.closed {
                return Err(Status::Deleted);
            }
            if state.items.len() < state.capacity {
                if front {
                    state.items.push_front(item);
                } else {
                    state.items.push_back(item);
                }
                drop(state);
                self.not_empty.notify_one();
                return Ok(());
            }
            match timeout {
                Timeout::NoWait => return Err(Status::QueueFull),
                Timeout::Forever => {
                    state = self.not_full.wait(state).unwrap();
                }
                Timeout::Ticks(_) => {
                    let remaining = deadline.unwrap().checked_duration_since(Instant::now());
                    let remaining = match remaining {
                        Some(d) if !d.is_zero() => d,
                        _ => return Err(Status::QueueFull),
                    };
                    let (guard, _) = self.not_full.wait_timeout(state, remaining).unwrap();
                    state = guard;
                }
            }
        }
    }

    /// Dequeues the head item, suspending indefinitely until one is
    /// available. Returns `Err(Status::Deleted)` once the queue has been
    /// deleted and drained.
    fn receive(&self) -> Result<WorkItem, Status> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Ok(item);
            }
            if state.closed {
                return Err(Status::Deleted);
            }
            state = self.not_empty.wait(state).unwrap();
        }
    }

    /// Discards all pending items. Items already dequeued by a worker
    /// continue to completion.
    pub fn flush(&self) {
        let mut state = self.state.lock().unwrap();
        state.items.clear();
        drop(state);
        self.not_full.notify_all();
    }

    /// Tears down the queue. Workers currently blocked in [`receive`](Self::receive)
    /// observe `Deleted` and exit their loop.
    pub fn delete(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.items.clear();
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.delete();
    }
}

/// Invoked by a worker immediately before (`started = true`) and
/// immediately after (`started = false`) running a work item's `entry`.
pub trait EnterExitNotify: Send + Sync {
    fn notify(&self, started: bool);
}

impl<F: Fn(bool) + Send + Sync> EnterExitNotify for F {
    fn notify(&self, started: bool) {
        self(started)
    }
}

/// A fixed set of worker threads draining a single [`TaskQueue`].
///
/// Each worker is created at [`IDLE_PRIORITY`] and drops back to it between
/// items; see the worker loop documented on [`WorkerPool::create_runner`].
pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    notify: Mutex<Option<Arc<dyn EnterExitNotify>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    priority_cells: Mutex<Vec<Arc<PriorityCell>>>,
}

impl WorkerPool {
    /// Creates a worker pool with no running workers yet, bound to `queue`.
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        Self {
            queue,
            notify: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
            priority_cells: Mutex::new(Vec::new()),
        }
    }

    /// Returns the live priority/preemption-threshold cell for the worker
    /// spawned at index `idx` (in [`create_runner`](Self::create_runner)
    /// call order). Intended for tests and introspection: a work item's
    /// executing worker can be observed mid-flight to verify property 7,
    /// that its priority equals the item's declared priority.
    pub fn worker_priority_cell(&self, idx: usize) -> Option<Arc<PriorityCell>> {
        self.priority_cells.lock().unwrap().get(idx).cloned()
    }

    /// Installs a process-wide enter/exit notification callback.
    ///
    /// Must be installed before any worker begins dequeuing; this crate
    /// does not itself enforce that ordering, matching the host kernel's
    /// contract that mutation after workers start requires external
    /// synchronization.
    ///
    /// Returns `Err(Status::FeatureNotEnabled)` when the `notify-callbacks`
    /// feature is disabled.
    #[cfg(feature = "notify-callbacks")]
    pub fn set_enter_exit_notify(
        &self,
        callback: Option<Arc<dyn EnterExitNotify>>,
    ) -> Result<(), Status> {
        *self.notify.lock().unwrap() = callback;
        Ok(())
    }

    /// Installs a process-wide enter/exit notification callback.
    ///
    /// Returns `Err(Status::FeatureNotEnabled)` when the `notify-callbacks`
    /// feature is disabled.
    #[cfg(not(feature = "notify-callbacks"))]
    pub fn set_enter_exit_notify(
        &self,
        _callback: Option<Arc<dyn EnterExitNotify>>,
    ) -> Result<(), Status> {
        Err(Status::FeatureNotEnabled)
    }

    /// Spawns one worker thread bound to this pool's queue, auto-starting
    /// immediately.
    ///
    /// Worker algorithm, run in a loop until the queue is deleted:
    ///
    /// 1. Dequeue one item, waiting indefinitely. Exit on `Deleted`.
    /// 2. Apply the item's declared priority and preemption threshold.
    /// 3. Invoke the notify callback with `started = true`, if installed.
    /// 4. Run `entry`.
    /// 5. Invoke the notify callback with `started = false`, if installed.
    /// 6. Restore the idle priority and preemption threshold.
    pub fn create_runner(&self, name: impl Into<String>) -> Result<(), Status> {
        let queue = self.queue.clone();
        let notify = self.notify.lock().unwrap().clone();
        let priority_cell = Arc::new(PriorityCell::new());

        let handle = thread::Builder::new()
            .name(name.into())
            .spawn({
                let priority_cell = priority_cell.clone();
                move || worker_loop(queue, notify, priority_cell)
            })
            .map_err(|_| Status::ThreadError)?;
        self.handles.lock().unwrap().push(handle);
        self.priority_cells.lock().unwrap().push(priority_cell);
        Ok(())
    }

    /// Blocks until every spawned worker has exited. Intended for use after
    /// [`TaskQueue::delete`] has been called.
    pub fn join(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    queue: Arc<TaskQueue>,
    notify: Option<Arc<dyn EnterExitNotify>>,
    priority_cell: Arc<PriorityCell>,
) {
    loop {
        let item = match queue.receive() {
            Ok(item) => item,
            Err(_) => {
                log::debug!("worker exiting: task queue deleted");
                return;
            }
        };

        priority_cell.set(item.priority, item.preemption_threshold);
        if let Some(notify) = &notify {
            notify.notify(true);
        }

        (item.entry)();

        if let Some(notify) = &notify {
            notify.notify(false);
        }
        priority_cell.set(IDLE_PRIORITY, IDLE_PRIORITY);
    }
}
