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

//! A least-recently-used cache bounded by the total byte size of its entries.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A cacheable, shareable resource such as a decoded image.
pub trait Resource: Send + Sync + 'static {
    /// Bytes this resource accounts for in the cache budget.
    fn byte_size(&self) -> usize;

    /// Returns `false` once the resource can no longer be used. Invalid
    /// resources are dropped from the cache when looked up or trimmed.
    fn is_valid(&self) -> bool {
        true
    }

    /// Frees the underlying memory early. Called when the cache evicts a
    /// resource nobody else holds.
    fn release(&self) {}
}

/// Configuration for a [`ResourceCache`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Total byte budget of cached resources.
    pub max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 32 * 1024 * 1024,
        }
    }
}

struct Entry<R> {
    resource: Arc<R>,
    bytes: usize,
    stamp: u64,
}

struct Lru<K, R> {
    entries: HashMap<K, Entry<R>>,
    order: BTreeMap<u64, K>,
    next_stamp: u64,
    size: usize,
}

impl<K: Eq + Hash + Clone, R: Resource> Lru<K, R> {
    fn stamp(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }

    fn touch(&mut self, key: &K) -> Option<Arc<R>> {
        let stamp = self.stamp();
        let entry = self.entries.get_mut(key)?;
        self.order.remove(&entry.stamp);
        entry.stamp = stamp;
        self.order.insert(stamp, key.clone());
        Some(Arc::clone(&entry.resource))
    }

    fn insert(&mut self, key: K, resource: Arc<R>) -> Option<Arc<R>> {
        let bytes = resource.byte_size();
        let stamp = self.stamp();
        self.order.insert(stamp, key.clone());
        self.size += bytes;
        let previous = self.entries.insert(
            key,
            Entry {
                resource,
                bytes,
                stamp,
            },
        )?;
        self.order.remove(&previous.stamp);
        self.size -= previous.bytes;
        Some(previous.resource)
    }

    fn remove(&mut self, key: &K) -> Option<Arc<R>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.stamp);
        self.size -= entry.bytes;
        Some(entry.resource)
    }

    fn pop_oldest(&mut self) -> Option<Arc<R>> {
        let (_, key) = self.order.pop_first()?;
        let entry = self.entries.remove(&key)?;
        self.size -= entry.bytes;
        Some(entry.resource)
    }
}

/// A thread-safe LRU cache of shared resources with a byte budget.
///
/// Entries are [`Arc`]s: a resource handed out by [`get`](Self::get) stays
/// alive for its holder after eviction. Only resources the cache held alone
/// get their [`Resource::release`] hook called when they leave it.
pub struct ResourceCache<K, R> {
    max_bytes: usize,
    lru: Mutex<Lru<K, R>>,
}

impl<K, R> ResourceCache<K, R>
where
    K: Eq + Hash + Clone + fmt::Debug,
    R: Resource,
{
    /// Creates a cache holding at most `max_bytes` worth of resources.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            lru: Mutex::new(Lru {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_stamp: 0,
                size: 0,
            }),
        }
    }

    /// Creates a cache from its configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_bytes)
    }

    fn lru(&self) -> MutexGuard<'_, Lru<K, R>> {
        self.lru.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the resource for `key` and marks it most recently used.
    /// An invalid resource is removed and reported as a miss.
    pub fn get(&self, key: &K) -> Option<Arc<R>> {
        let resource = self.lru().touch(key)?;
        if resource.is_valid() {
            return Some(resource);
        }

        log::debug!("Cached resource {key:?} is no longer valid; removing it.");
        drop(resource);
        self.remove(key);
        None
    }

    /// Inserts `resource`, then evicts least recently used entries until the
    /// cache fits its budget again.
    pub fn put(&self, key: K, resource: Arc<R>) {
        let mut dropped = Vec::new();
        {
            let mut lru = self.lru();
            if let Some(previous) = lru.insert(key, Arc::clone(&resource)) {
                if !Arc::ptr_eq(&previous, &resource) {
                    dropped.push(previous);
                }
            }
            while lru.size > self.max_bytes {
                match lru.pop_oldest() {
                    Some(evicted) => dropped.push(evicted),
                    None => break,
                }
            }
        }
        drop(resource);
        if !dropped.is_empty() {
            log::trace!("Evicted {} resources to stay within budget.", dropped.len());
        }
        release_all(dropped);
    }

    /// Removes `key`. Returns `true` if it was cached.
    pub fn remove(&self, key: &K) -> bool {
        let removed = self.lru().remove(key);
        let found = removed.is_some();
        release_all(removed);
        found
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let dropped: Vec<Arc<R>> = {
            let mut lru = self.lru();
            lru.order.clear();
            lru.size = 0;
            lru.entries.drain().map(|(_, entry)| entry.resource).collect()
        };
        release_all(dropped);
    }

    /// Removes entries nobody outside the cache holds, and invalid ones.
    /// Returns how many were removed.
    pub fn trim(&self) -> usize {
        let dropped: Vec<Arc<R>> = {
            let mut lru = self.lru();
            let stale: Vec<K> = lru
                .entries
                .iter()
                .filter(|(_, entry)| {
                    Arc::strong_count(&entry.resource) == 1 || !entry.resource.is_valid()
                })
                .map(|(key, _)| key.clone())
                .collect();
            stale.iter().filter_map(|key| lru.remove(key)).collect()
        };
        let count = dropped.len();
        release_all(dropped);
        count
    }

    /// Bytes currently accounted for.
    pub fn size(&self) -> usize {
        self.lru().size
    }

    /// The byte budget.
    pub fn max_size(&self) -> usize {
        self.max_bytes
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.lru().entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, R> fmt::Debug for ResourceCache<K, R>
where
    K: Eq + Hash + Clone + fmt::Debug,
    R: Resource,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("len", &self.len())
            .field("size", &self.size())
            .field("max_size", &self.max_bytes)
            .finish()
    }
}

fn release_all<R: Resource>(resources: impl IntoIterator<Item = Arc<R>>) {
    for resource in resources {
        if Arc::strong_count(&resource) == 1 {
            resource.release();
        }
    }
}
