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

use crate::pool::{Factory, Pool};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError, Weak};

type SharedReset<T> = Box<dyn Fn(&T) + Send + Sync>;

/// A bounded free-list that only keeps [`Weak`] handles to its instances.
///
/// The pool never keeps an instance alive on its own: an entry survives only
/// while another owner (a cache, an arena, a backing store) still holds the
/// allocation. When that owner lets go, the entry dies and the next `obtain`
/// that pops it counts as a miss and builds a fresh instance.
pub struct WeakPool<T> {
    factory: Factory<T>,
    reset: Option<SharedReset<T>>,
    max_size: usize,
    free: Mutex<Vec<Weak<T>>>,
}

impl<T: Send + Sync> WeakPool<T> {
    /// Creates a weak pool with no upper bound on idle entries.
    pub fn unbounded<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(Box::new(factory), usize::MAX)
    }

    /// Creates a weak pool that keeps at most `max_size` idle entries.
    pub fn with_capacity<F>(factory: F, max_size: NonZeroUsize) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(Box::new(factory), max_size.get())
    }

    /// Installs a callback run on every recycled instance.
    ///
    /// The instance may be shared, so the callback only gets `&T` and must
    /// rely on interior mutability to clear state.
    pub fn with_reset<R>(mut self, reset: R) -> Self
    where
        R: Fn(&T) + Send + Sync + 'static,
    {
        self.reset = Some(Box::new(reset));
        self
    }

    /// Returns the number of idle entries, dead ones included.
    pub fn len(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if no idle entry is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
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

impl<T: Send + Sync> Pool<Arc<T>> for WeakPool<T> {
    fn obtain(&self) -> Arc<T> {
        let entry = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        match entry.and_then(|weak| weak.upgrade()) {
            Some(instance) => instance,
            None => Arc::new((self.factory)()),
        }
    }

    fn recycle(&self, item: Arc<T>) {
        if let Some(reset) = &self.reset {
            reset(&item);
        }

        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() >= self.max_size {
            free.retain(|weak| weak.strong_count() > 0);
        }
        if free.len() < self.max_size {
            free.push(Arc::downgrade(&item));
        }
    }
}

impl<T> std::fmt::Debug for WeakPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakPool")
            .field("max_size", &self.max_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn live_entry_is_handed_back() {
        let pool = WeakPool::unbounded(|| AtomicUsize::new(0));
        let instance = pool.obtain();
        let storage_owner = Arc::clone(&instance);

        pool.recycle(instance);
        let again = pool.obtain();

        assert!(Arc::ptr_eq(&again, &storage_owner));
    }

    #[test]
    fn dead_entry_is_a_miss() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let pool = WeakPool::unbounded(move || counter.fetch_add(1, Ordering::SeqCst));

        let first = pool.obtain();
        pool.recycle(first); // nothing else holds it: the entry dies here
        assert_eq!(pool.len(), 1);

        let second = pool.obtain();
        assert_eq!(*second, 1, "factory should have built a second instance");
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn full_pool_sweeps_dead_entries_first() {
        let pool = WeakPool::with_capacity(|| 0u32, NonZeroUsize::new(2).unwrap());
        pool.recycle(Arc::new(1));
        pool.recycle(Arc::new(2));
        assert_eq!(pool.len(), 2);

        let keep = Arc::new(3);
        pool.recycle(Arc::clone(&keep));

        assert_eq!(pool.len(), 1);
        assert_eq!(*pool.obtain(), 3);
    }

    #[test]
    fn reset_sees_recycled_instance() {
        let pool = WeakPool::unbounded(|| AtomicUsize::new(0))
            .with_reset(|counter: &AtomicUsize| counter.store(0, Ordering::SeqCst));
        let instance = pool.obtain();
        let owner = Arc::clone(&instance);
        instance.store(42, Ordering::SeqCst);

        pool.recycle(instance);

        assert_eq!(owner.load(Ordering::SeqCst), 0);
    }
}
