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

use crate::pool::{Factory, Pool, Recyclable, Reset};
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

/// A LIFO free-list pool holding at most `max_size` idle instances.
///
/// Push and pop happen under a mutex. Instances recycled while the list is
/// full are dropped.
pub struct BoundedPool<T> {
    factory: Factory<T>,
    reset: Option<Reset<T>>,
    max_size: usize,
    free: Mutex<Vec<T>>,
}

impl<T: Send> BoundedPool<T> {
    /// Creates a pool with no upper bound on the number of idle instances.
    pub fn unbounded<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(Box::new(factory), usize::MAX)
    }

    /// Creates a pool that keeps at most `max_size` idle instances.
    pub fn with_capacity<F>(factory: F, max_size: NonZeroUsize) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(Box::new(factory), max_size.get())
    }

    /// Installs a callback that clears an instance each time it is recycled.
    pub fn with_reset<R>(mut self, reset: R) -> Self
    where
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        self.reset = Some(Box::new(reset));
        self
    }

    /// Returns the number of idle instances currently held.
    pub fn len(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if no idle instance is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the maximum number of idle instances this pool keeps.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn build(factory: Factory<T>, max_size: usize) -> Self {
        Self {
            factory,
            reset: None,
            max_size,
            free: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Recyclable + Send + 'static> BoundedPool<T> {
    /// Creates a bounded pool whose instances are cleared through
    /// [`Recyclable::on_recycled`] when they come back.
    pub fn recyclable<F>(factory: F, max_size: NonZeroUsize) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_capacity(factory, max_size).with_reset(T::on_recycled)
    }
}

impl<T: Send> Pool<T> for BoundedPool<T> {
    fn obtain(&self) -> T {
        let pooled = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        pooled.unwrap_or_else(|| (self.factory)())
    }

    fn recycle(&self, mut item: T) {
        if let Some(reset) = &self.reset {
            reset(&mut item);
        }

        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.max_size {
            free.push(item);
        } else {
            log::trace!(
                "BoundedPool full ({} idle), dropping recycled instance.",
                self.max_size
            );
        }
    }
}

impl<T> std::fmt::Debug for BoundedPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedPool")
            .field("max_size", &self.max_size)
            .field("has_reset", &self.reset.is_some())
            .finish_non_exhaustive()
    }
}
