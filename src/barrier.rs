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

//! A reusable N-party rendezvous barrier.
//!
//! `raise_count` parties call [`Barrier::wait`]; none of them return until
//! all `raise_count` have arrived. Unlike `std::sync::Barrier`, this one
//! can be explicitly [`reset`](Barrier::reset), which aborts every party
//! still suspended and starts a fresh cohort.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//!
//! use rt_primitives::barrier::Barrier;
//! use rt_primitives::kernel::Inherit;
//! use rt_primitives::kernel::Timeout;
//!
//! let barrier = Arc::new(Barrier::new(3, Inherit::NoInherit).unwrap());
//! let handles: Vec<_> = (0..3)
//!     .map(|_| {
//!         let barrier = barrier.clone();
//!         thread::spawn(move || barrier.wait(Timeout::Forever))
//!     })
//!     .collect();
//! for h in handles {
//!     h.join().unwrap().unwrap();
//! }
//! ```

use crate::error::Status;
use crate::kernel::mutex::Inherit;
use crate::kernel::mutex::RawMutex;
use crate::kernel::semaphore::RawSemaphore;
use crate::kernel::timeout::Timeout;


/// A barrier that rendezvous `raise_count` parties at a time.
///
/// See the [module level documentation](self) for more.
pub struct Barrier {
    raise_count: u32,
    arrived: RawMutex<u32>,
    /// The propagation gate: released one unit at a time in a daisy chain
    /// that starts with the last arriver and runs through every previously
    /// suspended party. See [`Barrier::wait`] for the protocol.
    gate: RawSemaphore,
}

impl Barrier {
    /// Creates a barrier requiring `raise_count` arrivals to release a
    /// cohort.
    ///
    /// # Errors
    ///
    /// Returns [`Status::SizeError`] if `raise_count` is zero.
    pub fn new(raise_count: u32, inherit: Inherit) -> Result<Self, Status> {
        if raise_count == 0 {
            return Err(Status::SizeError);
        }
        Ok(Self {
            raise_count,
            arrived: RawMutex::new(0, inherit),
            gate: RawSemaphore::new(0),
        })
    }

    /// The number of parties required to raise this barrier.
    pub fn raise_count(&self) -> u32 {
        self.raise_count
    }

    /// Waits for `raise_count` parties to call `wait`.
    ///
    /// The calling party is *always* counted as arrived, even on a timeout:
    /// a caller that times out must not retry the same barrier instance
    /// without first calling [`reset`](Self::reset).
    ///
    /// On every successful return -- including the last arriver's, which
    /// never actually suspends -- the waiter posts one unit to the internal
    /// gate before returning. This is the propagation step that chains
    /// releases through every previously suspended party; it must not be
    /// skipped for the last arriver.
    pub fn wait(&self, timeout: Timeout) -> Result<(), Status> {
        let mut arrived = self.arrived.lock(Timeout::Forever)?;
        *arrived += 1;
        let is_last = *arrived == self.raise_count;
        drop(arrived);

        if !is_last {
            self.gate.acquire(1, timeout)?;
        }
        self.gate.release(1);
        Ok(())
    }

    /// Resets the barrier: `arrived` returns to zero and every party
    /// currently suspended in [`wait`](Self::wait) returns
    /// [`Status::WaitAborted`].
    pub fn reset(&self) -> Result<(), Status> {
        let mut arrived = self.arrived.lock(Timeout::Forever)?;
        *arrived = 0;
        drop(arrived);
        // Discard any residual propagation unit before aborting waiters, so
        // a party that hasn't yet observed the abort can't slip through on
        // a stale release.
        self.gate.drain();
        self.gate.abort_waiters();
        Ok(())
    }

    /// Tears down the barrier's internal mutex and semaphore. Any party
    /// currently suspended in [`wait`](Self::wait) is released with
    /// [`Status::Deleted`].
    ///
    /// Mirrors the host kernel's pointer-based `delete` operation: it takes
    /// `&self` rather than consuming the barrier, since control blocks are
    /// externally owned and may still be shared when deletion happens.
    pub fn delete(&self) {
        self.gate.close();
        self.arrived.close();
    }
}

impl Drop for Barrier {
    fn drop(&mut self) {
        self.delete();
    }
}
