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

//! # Courier Pool
//!
//! Free-list pools that hand out reusable instances instead of allocating a
//! fresh one for every short-lived job, envelope or buffer.
//!
//! Three variants share the [`Pool`] contract:
//!
//! - [`SinglePool`]: one lock-free slot, for values recycled at most one at a time.
//! - [`BoundedPool`]: a LIFO free-list capped at `max_size`, guarded by a mutex.
//! - [`WeakPool`]: like [`BoundedPool`], but it only keeps [`std::sync::Weak`]
//!   handles, so it never extends the lifetime of what it stores.
//!
//! Types implementing [`Recyclable`] can be pooled through the `recyclable`
//! constructors, which clear their state each time they are handed back.

#![warn(missing_docs)]

mod bounded;
mod pool;
mod single;
mod weak;

pub use self::bounded::BoundedPool;
pub use self::pool::{Pool, Recyclable};
pub use self::single::SinglePool;
pub use self::weak::WeakPool;
