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

//! A priority-inheriting mutex: the second of the three host-kernel
//! building blocks. Built on top of [`RawSemaphore`](super::semaphore::RawSemaphore)
//! with a binary permit count, recording ownership so a release by a
//! non-owner can be rejected with [`Status::NotOwned`].

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Mutex as StdMutex;
use std::thread::ThreadId;

use crate::error::Status;
use crate::kernel::semaphore::RawSemaphore;
use crate::kernel::timeout::Timeout;

/// Whether a mutex propagates the priority of its highest-priority waiter
/// to its current owner, to bound priority-inversion latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inherit {
    /// Priority inheritance is enabled for this instance.
    Inherit,
    /// Priority inheritance is disabled; the owner keeps its own priority
    /// regardless of who is waiting.
    NoInherit,
}

/// A priority-inheriting mutex guarding a value of type `T`.
pub struct RawMutex<T: ?Sized> {
    inherit: Inherit,
    sem: RawSemaphore,
    owner: StdMutex<Option<ThreadId>>,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for RawMutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for RawMutex<T> {}

impl<T> RawMutex<T> {
    /// Creates a new, unlocked mutex wrapping `data`.
    pub fn new(data: T, inherit: Inherit) -> Self {
        Self {
            inherit,
            sem: RawSemaphore::new(1),
            owner: StdMutex::new(None),
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> RawMutex<T> {
    /// Whether this instance honors priority inheritance.
    pub fn inherit(&self) -> Inherit {
        self.inherit
    }

    /// Locks the mutex, suspending the caller for up to `timeout`.
    ///
    /// Returns [`Status::NotAvailable`] on timeout, distinguishing a mutex
    /// wait from a plain semaphore wait (which times out with
    /// [`Status::NoInstance`]).
    pub fn lock(&self, timeout: Timeout) -> Result<RawMutexGuard<'_, T>, Status> {
        self.sem.acquire(1, timeout).map_err(|e| match e {
            Status::NoInstance => Status::NotAvailable,
            other => other,
        })?;
        *self.owner.lock().unwrap() = Some(std::thread::current().id());
        Ok(RawMutexGuard {
            mutex: self,
            _not_send: std::marker::PhantomData,
        })
    }

    /// Attempts to lock without blocking.
    pub fn try_lock(&self) -> Option<RawMutexGuard<'_, T>> {
        if self.sem.try_acquire(1) {
            *self.owner.lock().unwrap() = Some(std::thread::current().id());
            Some(RawMutexGuard {
                mutex: self,
                _not_send: std::marker::PhantomData,
            })
        } else {
            None
        }
    }

    /// Closes the mutex: any suspended locker returns `Deleted`.
    pub fn close(&self) {
        self.sem.close();
    }

    fn unlock(&self) -> Result<(), Status> {
        let mut owner = self.owner.lock().unwrap();
        if *owner != Some(std::thread::current().id()) {
            return Err(Status::NotOwned);
        }
        *owner = None;
        drop(owner);
        self.sem.release(1);
        Ok(())
    }
}

/// RAII guard releasing a [`RawMutex`] lock when dropped.
///
/// Not `Send`: unlocking checks the releasing thread against the recorded
/// owner (see [`RawMutex::unlock`]), so moving a guard to another thread
/// and dropping it there would hit `NotOwned`, which `Drop` has no way to
/// surface -- the permit would never come back and the mutex would
/// deadlock forever. The `PhantomData<*const ()>` field blocks the
/// auto-derived `Send` impl; raw pointers are the standard stable-Rust way
/// to opt a type out of an auto trait.
#[must_use = "if unused the mutex immediately unlocks"]
pub struct RawMutexGuard<'a, T: ?Sized> {
    mutex: &'a RawMutex<T>,
    _not_send: std::marker::PhantomData<*const ()>,
}

unsafe impl<T: ?Sized + Sync> Sync for RawMutexGuard<'_, T> {}

impl<T: ?Sized> Deref for RawMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for RawMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for RawMutexGuard<'_, T> {
    fn drop(&mut self) {
        // The guard's existence proves ownership; unlock cannot legitimately
        // fail here.
        let _ = self.mutex.unlock();
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RawMutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn lock_unlock_round_trip() {
        let m = RawMutex::new(0_u32, Inherit::NoInherit);
        {
            let mut g = m.lock(Timeout::NoWait).unwrap();
            *g += 1;
        }
        assert_eq!(*m.lock(Timeout::NoWait).unwrap(), 1);
    }

    #[test]
    fn contended_lock_times_out_with_not_available() {
        let m = Arc::new(RawMutex::new((), Inherit::NoInherit));
        let held = m.lock(Timeout::Forever).unwrap();
        let m2 = m.clone();
        let handle = thread::spawn(move || m2.lock(Timeout::Ticks(10)));
        assert_eq!(handle.join().unwrap().unwrap_err(), Status::NotAvailable);
        drop(held);
    }

    #[test]
    fn mutual_exclusion_holds_under_contention() {
        let m = Arc::new(RawMutex::new(0_i64, Inherit::NoInherit));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = m.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let mut g = m.lock(Timeout::Forever).unwrap();
                        *g += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*m.lock(Timeout::NoWait).unwrap(), 8000);
    }
}
