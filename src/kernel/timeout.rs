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

//! Tick-based wait options, mirroring the three suspension modes every
//! kernel primitive accepts: don't wait, wait forever, or wait up to a
//! tick count.

use std::time::Duration;
use std::time::Instant;

/// Ticks elapsed since an arbitrary epoch. One tick is [`tick_duration`].
pub type Tick = u64;

/// The wall-clock duration of a single tick.
///
/// A real RTOS derives this from a hardware timer; here it is a fixed
/// constant suitable for tests and demonstration code.
pub const fn tick_duration() -> Duration {
    Duration::from_millis(1)
}

/// How long a caller is willing to suspend on a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Return immediately if the resource is not available.
    NoWait,
    /// Suspend for up to the given number of ticks.
    Ticks(u32),
    /// Suspend indefinitely until the resource is available or the
    /// primitive is deleted/aborted.
    Forever,
}

impl Timeout {
    /// Builds a deadline `Instant` for this timeout, if it is bounded.
    pub(crate) fn deadline_from(self, start: Instant) -> Option<Instant> {
        match self {
            Timeout::NoWait | Timeout::Forever => None,
            Timeout::Ticks(n) => Some(start + tick_duration() * n),
        }
    }

    /// Recomputes the remaining budget after `elapsed` has already passed,
    /// per the rwlock `rget` deadline contract: the elapsed wait for the
    /// reader-count mutex is subtracted from the original timeout before
    /// the write semaphore is attempted.
    pub(crate) fn remaining_after(self, elapsed: Duration) -> Timeout {
        match self {
            Timeout::NoWait => Timeout::NoWait,
            Timeout::Forever => Timeout::Forever,
            Timeout::Ticks(n) => {
                let budget = tick_duration() * n;
                if elapsed >= budget {
                    Timeout::NoWait
                } else {
                    let remaining = budget - elapsed;
                    // Round up so a non-zero remainder never collapses to
                    // NoWait purely from integer-tick truncation.
                    let ticks = remaining.as_nanos().div_ceil(tick_duration().as_nanos());
                    Timeout::Ticks(ticks.max(1) as u32)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_after_subtracts_elapsed() {
        let t = Timeout::Ticks(100);
        let reduced = t.remaining_after(Duration::from_millis(40));
        assert_eq!(reduced, Timeout::Ticks(60));
    }

    #[test]
    fn remaining_after_exhausted_is_no_wait() {
        let t = Timeout::Ticks(10);
        let reduced = t.remaining_after(Duration::from_millis(50));
        assert_eq!(reduced, Timeout::NoWait);
    }

    #[test]
    fn forever_and_no_wait_are_unaffected_by_elapsed() {
        assert_eq!(
            Timeout::Forever.remaining_after(Duration::from_secs(10)),
            Timeout::Forever
        );
        assert_eq!(
            Timeout::NoWait.remaining_after(Duration::from_secs(10)),
            Timeout::NoWait
        );
    }
}
