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

//! # Courier
//!
//! An in-process event dispatch runtime. A [`Runtime`] ties together:
//!
//! - a main [`Looper`](courier_exec::Looper), the single-threaded "main thread";
//! - a [`WorkerPoolManager`](courier_exec::WorkerPoolManager), bounded
//!   concurrency with cancelable tasks;
//! - an [`EventBus`](courier_bus::EventBus) dispatching on either of them.
//!
//! The building blocks are re-exported as modules, and the everyday types
//! through [`prelude`].

mod config;
mod logging;
mod runtime;

pub use self::config::RuntimeConfig;
pub use self::logging::init_logging;
pub use self::runtime::Runtime;

pub use courier_bus as bus;
pub use courier_cache as cache;
pub use courier_exec as exec;
pub use courier_pool as pool;

/// The types most applications need.
pub mod prelude {
    pub use crate::{init_logging, Runtime, RuntimeConfig};
    pub use courier_bus::{BusError, EventBus, Subscriber, ThreadMode, Token};
    pub use courier_cache::{Resource, ResourceCache, ResourceLoader, ResourceSource};
    pub use courier_exec::{CancelToken, ExecError, Looper, Task, TaskFn, WorkerPoolManager};
    pub use courier_pool::{BoundedPool, Pool, Recyclable, SinglePool, WeakPool};
}
