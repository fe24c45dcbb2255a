// Copyright 2025 eraflo
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

//! # Courier Exec
//!
//! The threads everything else runs on:
//!
//! - [`Looper`]: a single-threaded message loop with delayed posting. One of
//!   them plays the role of the runtime's main thread.
//! - [`OnDemandLooper`]: a background loop thread that exists only while
//!   it has work and retires itself when idle.
//! - [`WorkerPool`]: bounded concurrency with a pending queue. Overflow work
//!   is parked, then re-posted through a looper as workers free up.
//! - [`WorkerPoolManager`]: a pool that tracks [`Task`]s so they can be
//!   cancelled by id.
//!
//! Cancellation is cooperative through [`CancelToken`].

#![warn(missing_docs)]

mod config;
mod error;
mod executor;
mod looper;
mod manager;
mod observer;
mod on_demand;
mod pool;
mod queue;
mod task;

pub use self::config::{ThreadPriority, WorkerPoolConfig};
pub use self::error::ExecError;
pub use self::executor::Executor;
pub use self::looper::{LoopRunner, Looper};
pub use self::manager::WorkerPoolManager;
pub use self::observer::{panic_message, ExecuteObserver, TaskFailure, TaskInfo};
pub use self::on_demand::OnDemandLooper;
pub use self::pool::{current_worker, WorkerInfo, WorkerPool};
pub use self::task::{CancelToken, Cancelled, Job, Task, TaskFn, TaskId};
