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

//! The contracts shared by every pool variant.

/// A source of reusable instances.
///
/// `obtain` hands out an instance taken from the free-list, or a fresh one
/// built by the pool's factory when the list is empty. `recycle` gives an
/// instance back; the pool may keep it for a later `obtain` or drop it.
///
/// An instance has exactly one owner at a time. Once recycled, the caller
/// no longer owns it and must not keep using it.
pub trait Pool<T>: Send + Sync {
    /// Returns a pooled instance, or a new one if none is available.
    fn obtain(&self) -> T;

    /// Returns an instance to the pool.
    fn recycle(&self, item: T);
}

/// A type that knows how to clear itself before being reused.
///
/// Pools built with a `recyclable` constructor call [`on_recycled`](Recyclable::on_recycled)
/// on every recycled instance, so no stale data or dangling handle leaks
/// into the next consumer.
pub trait Recyclable {
    /// Resets all fields to their pristine state.
    fn on_recycled(&mut self);
}

pub(crate) type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;
pub(crate) type Reset<T> = Box<dyn Fn(&mut T) + Send + Sync>;
