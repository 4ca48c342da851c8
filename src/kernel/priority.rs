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

//! Per-thread priority and preemption-threshold bookkeeping.
//!
//! The host kernel is assumed to provide the actual preemptive scheduler
//! (out of scope, per the crate's non-goals); what we provide here is the
//! observable state a thread's priority adjustment leaves behind, so that
//! [`taskq`](crate::taskq) workers can apply and later inspect the
//! priority/preemption-threshold pair associated with the item they are
//! currently running.

use std::sync::Mutex;

/// A numerical thread priority. Lower values are more urgent; `0` is the
/// highest priority a thread can hold.
pub type Priority = u8;

/// A preemption-threshold ceiling. Equal to the thread's own priority
/// disables preemption-threshold altogether.
pub type PreemptionThreshold = u8;

/// The priority a [`taskq`](crate::taskq) worker holds while blocked on its
/// queue, waiting for the next item.
pub const IDLE_PRIORITY: Priority = 0;

/// The live `(priority, preemption_threshold)` of one worker thread.
///
/// Shared between the worker loop (which mutates it around each work item)
/// and test/introspection code (which reads it to assert property 7:
/// *while a work item executes, the executing worker's priority equals the
/// item's declared priority*). The pair is held behind a single mutex
/// rather than two independent atomics, so a reader never observes a torn
/// state where one field has been updated to the new item's value and the
/// other hasn't.
#[derive(Debug)]
pub struct PriorityCell {
    state: Mutex<(Priority, PreemptionThreshold)>,
}

impl Default for PriorityCell {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityCell {
    /// Creates a cell initialized to the idle priority.
    pub fn new() -> Self {
        Self {
            state: Mutex::new((IDLE_PRIORITY, IDLE_PRIORITY)),
        }
    }

    /// Current priority.
    pub fn priority(&self) -> Priority {
        self.state.lock().unwrap().0
    }

    /// Current preemption threshold.
    pub fn preemption_threshold(&self) -> PreemptionThreshold {
        self.state.lock().unwrap().1
    }

    /// Atomically sets both values, returning the previous pair so the
    /// caller can restore them later.
    pub fn set(&self, priority: Priority, preemption_threshold: PreemptionThreshold) -> (Priority, PreemptionThreshold) {
        let mut state = self.state.lock().unwrap();
        std::mem::replace(&mut *state, (priority, preemption_threshold))
    }
}
