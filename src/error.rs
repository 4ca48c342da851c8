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

//! Status codes returned by every operation in this crate.
//!
//! The numeric discriminants are part of the public ABI: they match the
//! values a caller of the original C library would see, so that status
//! codes logged or compared numerically stay meaningful across a port.
//!
//! [`Status`] implements [`std::error::Error`] so it composes with `?` like
//! any other error type; the preserved discriminant is reachable through
//! [`Status::code`] for callers that still need the raw byte.

use std::fmt;

/// A status word returned by a primitive operation.
///
/// `Status::Success` is the only non-error variant. Operations that have no
/// useful success payload return `Result<(), Status>`; operations that
/// return a value (e.g. a lock guard) return `Result<T, Status>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    /// The operation completed successfully.
    Success = 0x00,
    /// The primitive was deleted while the caller was suspended on it.
    Deleted = 0x01,
    /// An invalid pointer or storage reference was supplied.
    PtrError = 0x03,
    /// A wait option other than no-wait was used from a context that
    /// cannot suspend.
    WaitError = 0x04,
    /// A size parameter (queue storage, stack) is invalid.
    SizeError = 0x05,
    /// The underlying queue object is invalid.
    QueueError = 0x09,
    /// Sending to a full queue timed out without enqueuing.
    QueueFull = 0x0B,
    /// The underlying semaphore object is invalid.
    SemaphoreError = 0x0C,
    /// A semaphore-like wait timed out.
    NoInstance = 0x0D,
    /// The underlying thread object is invalid, or thread creation failed.
    ThreadError = 0x0E,
    /// A priority value is out of range.
    PriorityError = 0x0F,
    /// Thread auto-start selection is invalid.
    StartError = 0x10,
    /// The caller is not allowed to invoke this service from its context.
    CallerError = 0x13,
    /// A preemption-threshold value is invalid.
    ThreshError = 0x18,
    /// A suspension was aborted by another thread (e.g. `Barrier::reset`).
    WaitAborted = 0x1A,
    /// The underlying mutex object is invalid.
    MutexError = 0x1C,
    /// A mutex-like wait timed out.
    NotAvailable = 0x1D,
    /// The caller does not own the resource it tried to release.
    NotOwned = 0x1E,
    /// The priority-inheritance flag is not recognized.
    InheritError = 0x1F,
    /// The feature was compiled out.
    FeatureNotEnabled = 0xFF,
}

impl Status {
    /// Returns the raw ABI discriminant.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Returns `true` for [`Status::Success`].
    pub fn is_ok(self) -> bool {
        matches!(self, Status::Success)
    }

    /// Returns `true` for any non-success code.
    pub fn is_err(self) -> bool {
        !self.is_ok()
    }

    fn as_str(self) -> &'static str {
        match self {
            Status::Success => "Success",
            Status::Deleted => "Deleted",
            Status::PtrError => "PtrError",
            Status::WaitError => "WaitError",
            Status::SizeError => "SizeError",
            Status::QueueError => "QueueError",
            Status::QueueFull => "QueueFull",
            Status::SemaphoreError => "SemaphoreError",
            Status::NoInstance => "NoInstance",
            Status::ThreadError => "ThreadError",
            Status::PriorityError => "PriorityError",
            Status::StartError => "StartError",
            Status::CallerError => "CallerError",
            Status::ThreshError => "ThreshError",
            Status::WaitAborted => "WaitAborted",
            Status::MutexError => "MutexError",
            Status::NotAvailable => "NotAvailable",
            Status::NotOwned => "NotOwned",
            Status::InheritError => "InheritError",
            Status::FeatureNotEnabled => "FeatureNotEnabled",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.as_str(), self.code())
    }
}

impl std::error::Error for Status {}

/// Shorthand for the `Result` type returned by most operations in this
/// crate.
pub type StatusResult<T> = Result<T, Status>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_abi() {
        assert_eq!(Status::Success.code(), 0x00);
        assert_eq!(Status::Deleted.code(), 0x01);
        assert_eq!(Status::PtrError.code(), 0x03);
        assert_eq!(Status::WaitError.code(), 0x04);
        assert_eq!(Status::SizeError.code(), 0x05);
        assert_eq!(Status::QueueError.code(), 0x09);
        assert_eq!(Status::QueueFull.code(), 0x0B);
        assert_eq!(Status::SemaphoreError.code(), 0x0C);
        assert_eq!(Status::NoInstance.code(), 0x0D);
        assert_eq!(Status::ThreadError.code(), 0x0E);
        assert_eq!(Status::PriorityError.code(), 0x0F);
        assert_eq!(Status::StartError.code(), 0x10);
        assert_eq!(Status::CallerError.code(), 0x13);
        assert_eq!(Status::ThreshError.code(), 0x18);
        assert_eq!(Status::WaitAborted.code(), 0x1A);
        assert_eq!(Status::MutexError.code(), 0x1C);
        assert_eq!(Status::NotAvailable.code(), 0x1D);
        assert_eq!(Status::NotOwned.code(), 0x1E);
        assert_eq!(Status::InheritError.code(), 0x1F);
        assert_eq!(Status::FeatureNotEnabled.code(), 0xFF);
    }

    #[test]
    fn success_is_ok() {
        assert!(Status::Success.is_ok());
        assert!(!Status::Success.is_err());
        assert!(Status::Deleted.is_err());
    }
}
