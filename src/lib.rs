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

//! Blocking concurrency primitives layered over a minimal real-time kernel.
//!
//! The [`kernel`] module is a façade standing in for the three building
//! blocks a host RTOS is assumed to already provide: a counting semaphore,
//! a priority-inheriting mutex, and a tick source. Everything else in this
//! crate -- [`barrier`], [`rwlock`], [`taskq`] -- is expressed purely in
//! terms of that façade.
//!
//! These three primitives are independent of one another; they only
//! compose through the kernel objects they're each built from.

pub mod barrier;
pub mod error;
pub mod kernel;
pub mod rwlock;
pub mod taskq;

pub use error::Status;
pub use error::StatusResult;
