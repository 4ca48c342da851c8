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

//! A readers/writer lock: any number of readers may hold it concurrently,
//! or exactly one writer may hold it exclusively, never both.
//!
//! Built from the same two building blocks as [`Barrier`](crate::barrier::Barrier):
//! a reader-count [`RawMutex`] and a binary [`RawSemaphore`] representing
//! write ownership. Readers only ever touch the semaphore at the 0-to-1 and
//! 1-to-0 edges of the reader count; a writer holds the semaphore for the
//! whole duration of its critical section.
//!
//! # Examples
//!
//! ```
//! use rt_primitives::kernel::Inherit;
//! use rt_primitives::kernel::Timeout;
//! use rt_primitives::rwlock::RwLock;
//!
//! let lock = RwLock::new(0_i32, Inherit::NoInherit);
//! {
//!     let mut w = lock.wget(Timeout::Forever).unwrap();
//!     *w = 7;
//! }
//! let r = lock.rget(Timeout::Forever).unwrap();
//! assert_eq!(*r, 7);
//! ```

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::Deref;
use std::ops::DerefMut;
use std::time::Instant;

use crate::error::Status;
use crate::kernel::mutex::Inherit;
use crate::kernel::mutex::RawMutex;
use crate::kernel::semaphore::RawSemaphore;
use crate::kernel::timeout::Timeout;

#[cfg(test)]
mod tests;

/// Ticket priority tagged onto a writer's wait on the write semaphore.
///
/// Readers queue at [`NEUTRAL_PRIORITY`](crate::kernel::semaphore::NEUTRAL_PRIORITY),
/// the least urgent value, so [`RwLock::prioritize_writers`] -- which
/// promotes the single most urgent queued ticket -- always finds a waiting
/// writer over any number of waiting readers.
const WRITER_TICKET_PRIORITY: u8 = 0;

/// A readers/writer lock guarding a value of type `T`.
///
/// See the [module level documentation](self) for more.
pub struct RwLock<T: ?Sized> {
    reader_count: RawMutex<u32>,
    write_sem: RawSemaphore,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for RwLock<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    /// Creates an unlocked rwlock wrapping `data`.
    ///
    /// Unlike the host kernel's `create`, this cannot fail with
    /// `INHERIT_ERROR`: [`Inherit`] is an exhaustive enum, so there is no
    /// "unrecognized flag" to reject.
    pub fn new(data: T, inherit: Inherit) -> Self {
        Self {
            reader_count: RawMutex::new(0, inherit),
            write_sem: RawSemaphore::new(1),
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> RwLock<T> {
    /// Acquires a shared read lock, suspending the caller for up to
    /// `timeout`.
    ///
    /// Only the first reader to arrive (`reader_count` transitioning
    /// 0 -> 1) contends for the write semaphore; later readers just
    /// increment the count. The deadline is carried across both
    /// sub-acquisitions: the time spent waiting for the reader-count mutex
    /// is subtracted from the budget remaining for the write semaphore, so
    /// the overall call never outlives the caller's original `timeout`.
    pub fn rget(&self, timeout: Timeout) -> Result<RwLockReadGuard<'_, T>, Status> {
        let start = Instant::now();
        let mut count = self.reader_count.lock(timeout)?;
        if *count == 0 {
            let remaining = timeout.remaining_after(start.elapsed());
            self.write_sem.acquire(1, remaining)?;
        }
        *count += 1;
        Ok(RwLockReadGuard { lock: self })
    }

    /// Acquires the write lock exclusively, suspending the caller for up to
    /// `timeout`.
    #[cfg_attr(feature = "inline-write", inline(always))]
    pub fn wget(&self, timeout: Timeout) -> Result<RwLockWriteGuard<'_, T>, Status> {
        self.write_sem
            .acquire_with_priority(1, timeout, WRITER_TICKET_PRIORITY)?;
        Ok(RwLockWriteGuard { lock: self })
    }

    /// Attempts to acquire the write lock without blocking.
    #[cfg_attr(feature = "inline-write", inline(always))]
    pub fn try_wget(&self) -> Option<RwLockWriteGuard<'_, T>> {
        if self.write_sem.try_acquire(1) {
            Some(RwLockWriteGuard { lock: self })
        } else {
            None
        }
    }

    /// Promotes the most urgent writer currently queued on the write
    /// semaphore ahead of any queued readers.
    ///
    /// A one-shot reorder of the current suspension list, not a standing
    /// "prefer writers" mode: readers and writers that arrive afterward are
    /// unaffected and queue in plain FIFO order again.
    #[cfg_attr(feature = "inline-write", inline(always))]
    pub fn prioritize_writers(&self) {
        self.write_sem.prioritize();
    }

    /// Tears down the internal mutex and semaphore. Any suspended reader or
    /// writer is released with [`Status::Deleted`].
    pub fn delete(&self) {
        self.reader_count.close();
        self.write_sem.close();
    }

    fn read_unlock(&self) {
        // rput: wait-forever for the reader-count mutex is the documented
        // contract. If the lock has already been deleted the mutex returns
        // `Deleted` and there is nothing left to release.
        if let Ok(mut count) = self.reader_count.lock(Timeout::Forever) {
            *count -= 1;
            if *count == 0 {
                self.write_sem.release(1);
            }
        }
    }
}

impl<T: ?Sized> Drop for RwLock<T> {
    fn drop(&mut self) {
        self.delete();
    }
}

/// RAII guard releasing a shared read lock when dropped.
#[must_use = "if unused the rwlock immediately unlocks"]
pub struct RwLockReadGuard<'a, T: ?Sized> {
    lock: &'a RwLock<T>,
}

impl<T: ?Sized> Deref for RwLockReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.read_unlock();
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RwLockReadGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

/// RAII guard releasing the write lock when dropped.
#[must_use = "if unused the rwlock immediately unlocks"]
pub struct RwLockWriteGuard<'a, T: ?Sized> {
    lock: &'a RwLock<T>,
}

impl<T: ?Sized> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for RwLockWriteGuard<'_, T> {
    #[cfg_attr(feature = "inline-write", inline(always))]
    fn drop(&mut self) {
        self.lock.write_sem.release(1);
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RwLockWriteGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
