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

//! The host kernel façade.
//!
//! Everything in this module stands in for the three building blocks the
//! specification assumes a minimal real-time kernel already provides: a
//! counting semaphore, a priority-inheriting mutex, and a tick source.
//! [`barrier`](crate::barrier), [`rwlock`](crate::rwlock) and
//! [`taskq`](crate::taskq) are expressed purely in terms of this module and
//! never reach for `std::sync` directly.
//!
//! Actual preemptive scheduling is out of scope -- a scheduler is assumed
//! to be supplied externally by the host; what this module provides is
//! the *observable contract* of that kernel --
//! blocking with timeouts, fair suspension, abortable waits, and
//! priority/preemption-threshold bookkeeping -- backed by `std::sync`.

pub mod mutex;
pub mod priority;
pub mod semaphore;
pub mod timeout;

pub use mutex::Inherit;
pub use mutex::RawMutex;
pub use mutex::RawMutexGuard;
pub use priority::PreemptionThreshold;
pub use priority::Priority;
pub use priority::PriorityCell;
pub use priority::IDLE_PRIORITY;
pub use semaphore::RawSemaphore;
pub use semaphore::NEUTRAL_PRIORITY;
pub use timeout::tick_duration;
pub use timeout::Tick;
pub use timeout::Timeout;
