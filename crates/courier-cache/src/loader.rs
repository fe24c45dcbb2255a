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

//! Loads cache misses on the worker pool and delivers them on the main looper.

use crate::cache::{Resource, ResourceCache};
use courier_exec::{CancelToken, ExecError, Looper, TaskFn, TaskId, WorkerPoolManager};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Produces the resource for a key. Runs on a worker thread.
///
/// Long loads should poll `token` and stop early once it is cancelled.
pub trait ResourceSource<K, R>: Send + Sync + 'static {
    /// Loads the resource, or returns `Ok(None)` when there is none for `key`.
    fn load(&self, key: &K, token: &CancelToken) -> anyhow::Result<Option<R>>;
}

impl<K, R, F> ResourceSource<K, R> for F
where
    F: Fn(&K, &CancelToken) -> anyhow::Result<Option<R>> + Send + Sync + 'static,
{
    fn load(&self, key: &K, token: &CancelToken) -> anyhow::Result<Option<R>> {
        self(key, token)
    }
}

/// Why a load produced no resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The source has nothing for this key.
    #[error("no resource for this key")]
    Missing,
    /// The source failed.
    #[error("load failed: {0}")]
    Failed(String),
}

/// What [`ResourceLoader::load`] did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Served from the cache; the callback already ran.
    Cached,
    /// A new background load was started.
    Scheduled,
    /// Attached to a load already in flight for the same key.
    Joined,
    /// The loader is paused; nothing was scheduled.
    Paused,
    /// The loader is shut down; nothing was scheduled.
    Shutdown,
}

type Callback<K, R> = Box<dyn FnOnce(&K, Result<Arc<R>, LoadError>) + Send>;

struct InFlight<K, R> {
    id: TaskId,
    token: CancelToken,
    waiters: Vec<Callback<K, R>>,
}

struct Inner<K, R> {
    cache: Arc<ResourceCache<K, R>>,
    source: Box<dyn ResourceSource<K, R>>,
    manager: Arc<WorkerPoolManager>,
    main: Looper,
    paused: AtomicBool,
    shutdown: AtomicBool,
    next_id: AtomicU64,
    in_flight: Mutex<HashMap<K, InFlight<K, R>>>,
}

/// Background loader in front of a [`ResourceCache`].
///
/// Hits are answered inline. Misses become cancelable tasks on the worker
/// pool manager; concurrent requests for one key share a single load. Results
/// are stored in the cache and handed to the callbacks on the main looper.
pub struct ResourceLoader<K, R> {
    inner: Arc<Inner<K, R>>,
}

impl<K, R> ResourceLoader<K, R>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    R: Resource,
{
    /// Creates a loader.
    ///
    /// ## Arguments
    /// * `cache` - where loaded resources are stored and looked up.
    /// * `source` - produces resources on worker threads.
    /// * `manager` - runs the load tasks.
    /// * `main` - the looper callbacks are delivered on.
    pub fn new(
        cache: Arc<ResourceCache<K, R>>,
        source: impl ResourceSource<K, R>,
        manager: Arc<WorkerPoolManager>,
        main: Looper,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                source: Box::new(source),
                manager,
                main,
                paused: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Requests the resource for `key`.
    ///
    /// `on_loaded` runs inline for a cache hit, and on the main looper once a
    /// background load completes. It is dropped without being called when the
    /// load is cancelled or the loader shuts down.
    pub fn load<F>(&self, key: K, on_loaded: F) -> Result<LoadStatus, ExecError>
    where
        F: FnOnce(&K, Result<Arc<R>, LoadError>) + Send + 'static,
    {
        if self.is_shutdown() {
            return Ok(LoadStatus::Shutdown);
        }
        if let Some(resource) = self.inner.cache.get(&key) {
            on_loaded(&key, Ok(resource));
            return Ok(LoadStatus::Cached);
        }
        if self.is_paused() {
            log::trace!("Loader paused; not scheduling {key:?}.");
            return Ok(LoadStatus::Paused);
        }

        let mut in_flight = self.inner.in_flight();
        if let Some(pending) = in_flight.get_mut(&key) {
            pending.waiters.push(Box::new(on_loaded));
            return Ok(LoadStatus::Joined);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let task = TaskFn::new(id, move |token| {
            inner.run_load(task_key, id, token);
            Ok(())
        });
        in_flight.insert(
            key.clone(),
            InFlight {
                id,
                token: task.token(),
                waiters: vec![Box::new(on_loaded)],
            },
        );
        drop(in_flight);

        if let Err(error) = self.inner.manager.submit(task) {
            self.inner.in_flight().remove(&key);
            return Err(error);
        }
        log::trace!("Scheduled load #{id} for {key:?}.");
        Ok(LoadStatus::Scheduled)
    }

    /// Cancels the load in flight for `key`. Its callbacks are never called.
    pub fn cancel(&self, key: &K) -> bool {
        let Some(pending) = self.inner.in_flight().remove(key) else {
            return false;
        };
        pending.token.cancel();
        self.inner.manager.cancel(pending.id, true);
        true
    }

    /// Stops scheduling cache misses until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::Release);
    }

    /// Undoes [`pause`](Self::pause).
    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::Release);
    }

    /// Returns `true` while paused.
    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Acquire)
    }

    /// Cancels every load in flight and refuses new ones for good.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let pending: Vec<InFlight<K, R>> = self
            .inner
            .in_flight()
            .drain()
            .map(|(_, pending)| pending)
            .collect();
        for load in &pending {
            load.token.cancel();
            self.inner.manager.cancel(load.id, true);
        }
        log::debug!("Resource loader shut down ({} loads cancelled).", pending.len());
    }

    /// Returns `true` after [`shutdown`](Self::shutdown).
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Number of keys currently loading.
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight().len()
    }

    /// The cache this loader fills.
    pub fn cache(&self) -> &Arc<ResourceCache<K, R>> {
        &self.inner.cache
    }
}

impl<K, R> Inner<K, R>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    R: Resource,
{
    fn in_flight(&self) -> MutexGuard<'_, HashMap<K, InFlight<K, R>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stopped(&self, token: &CancelToken) -> bool {
        token.is_cancelled() || self.shutdown.load(Ordering::Acquire)
    }

    fn run_load(self: &Arc<Self>, key: K, id: TaskId, token: &CancelToken) {
        if self.stopped(token) {
            return;
        }

        let loaded = self.source.load(&key, token);
        if self.stopped(token) {
            return;
        }

        let outcome = match loaded {
            Ok(Some(resource)) => {
                let resource = Arc::new(resource);
                self.cache.put(key.clone(), Arc::clone(&resource));
                Ok(resource)
            }
            Ok(None) => Err(LoadError::Missing),
            Err(error) => {
                log::warn!("Loading {key:?} failed: {error:#}");
                Err(LoadError::Failed(format!("{error:#}")))
            }
        };

        let waiters = {
            let mut in_flight = self.in_flight();
            // A cancelled load may have been replaced by a newer one.
            if in_flight.get(&key).map(|pending| pending.id) != Some(id) {
                return;
            }
            in_flight
                .remove(&key)
                .map(|pending| pending.waiters)
                .unwrap_or_default()
        };

        let inner = Arc::clone(self);
        let posted = self.main.post(move || {
            if inner.shutdown.load(Ordering::Acquire) {
                return;
            }
            for waiter in waiters {
                waiter(&key, outcome.clone());
            }
        });
        if let Err(error) = posted {
            log::warn!("Dropping load #{id} results: {error}");
        }
    }
}

impl<K, R> fmt::Debug for ResourceLoader<K, R>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    R: Resource,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLoader")
            .field("in_flight", &self.in_flight_count())
            .field("paused", &self.is_paused())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
