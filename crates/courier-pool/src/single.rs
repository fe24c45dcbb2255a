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
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// A pool with exactly one slot, updated with atomic swaps instead of a lock.
///
/// `recycle` only succeeds when the slot is empty; otherwise the instance is
/// dropped. This suits values that are typically obtained and recycled by one
/// caller at a time, such as a scratch buffer.
///
/// The slot stores its instance in a heap box. `obtain` moves the value out
/// and keeps the emptied box as a spare for the next `recycle`, so a steady
/// obtain/recycle cycle allocates only once.
pub struct SinglePool<T> {
    factory: Factory<T>,
    reset: Option<Reset<T>>,
    /// A box holding an initialized `T`, or null.
    slot: AtomicPtr<T>,
    /// An emptied box ready for reuse, or null.
    spare: AtomicPtr<MaybeUninit<T>>,
    _owns: PhantomData<Box<T>>,
}

// SAFETY: the slot owns at most one `Box<T>` and hands it out by value, so
// sharing the pool across threads only ever moves a `T` between them. The
// spare box holds no value.
unsafe impl<T: Send> Send for SinglePool<T> {}
// SAFETY: see above; no `&T` is ever exposed through a shared reference.
unsafe impl<T: Send> Sync for SinglePool<T> {}

impl<T: Send> SinglePool<T> {
    /// Creates an empty single-slot pool.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            reset: None,
            slot: AtomicPtr::new(ptr::null_mut()),
            spare: AtomicPtr::new(ptr::null_mut()),
            _owns: PhantomData,
        }
    }

    /// Installs a callback that clears an instance each time it is recycled.
    pub fn with_reset<R>(mut self, reset: R) -> Self
    where
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        self.reset = Some(Box::new(reset));
        self
    }

    /// Returns `true` if the slot currently holds no instance.
    pub fn is_empty(&self) -> bool {
        self.slot.load(Ordering::Acquire).is_null()
    }

    /// Keeps `empty` as the spare box, or frees it if a spare already exists.
    fn stash(&self, empty: *mut MaybeUninit<T>) {
        if self
            .spare
            .compare_exchange(ptr::null_mut(), empty, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // SAFETY: `empty` came from a box we own and holds no value, so
            // freeing it as `MaybeUninit` drops nothing.
            drop(unsafe { Box::from_raw(empty) });
        }
    }

    /// Moves `item` into the spare box, or a new one.
    fn boxed(&self, item: T) -> *mut T {
        let empty = self.spare.swap(ptr::null_mut(), Ordering::AcqRel);
        if empty.is_null() {
            return Box::into_raw(Box::new(item));
        }
        // SAFETY: the swap made us the only owner of the spare box, which has
        // the layout of `T` and holds no value.
        unsafe { (*empty).write(item) };
        empty.cast::<T>()
    }

    /// Takes the value out of an owned, initialized box and stashes the box.
    ///
    /// # Safety
    /// `full` must be an initialized box no one else can reach.
    unsafe fn unbox(&self, full: *mut T) -> T {
        // SAFETY: guaranteed by the caller.
        let item = unsafe { ptr::read(full) };
        self.stash(full.cast::<MaybeUninit<T>>());
        item
    }
}

impl<T: Recyclable + Send + 'static> SinglePool<T> {
    /// Creates a single-slot pool that calls [`Recyclable::on_recycled`] on
    /// every recycled instance.
    pub fn recyclable<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(factory).with_reset(T::on_recycled)
    }
}

impl<T: Send> Pool<T> for SinglePool<T> {
    fn obtain(&self) -> T {
        let taken = self.slot.swap(ptr::null_mut(), Ordering::AcqRel);
        if taken.is_null() {
            return (self.factory)();
        }

        // SAFETY: non-null slot values are initialized boxes published by
        // `recycle`, and the swap above removed it from the slot.
        unsafe { self.unbox(taken) }
    }

    fn recycle(&self, mut item: T) {
        if let Some(reset) = &self.reset {
            reset(&mut item);
        }

        let full = self.boxed(item);
        if self
            .slot
            .compare_exchange(ptr::null_mut(), full, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::trace!("SinglePool slot occupied, dropping recycled instance.");
            // SAFETY: the exchange failed, so `full` was never published.
            drop(unsafe { self.unbox(full) });
        }
    }
}

impl<T> Drop for SinglePool<T> {
    fn drop(&mut self) {
        let held = *self.slot.get_mut();
        if !held.is_null() {
            // SAFETY: `&mut self` guarantees no concurrent obtain/recycle.
            drop(unsafe { Box::from_raw(held) });
        }
        let spare = *self.spare.get_mut();
        if !spare.is_null() {
            // SAFETY: as above; the spare holds no value to drop.
            drop(unsafe { Box::from_raw(spare) });
        }
    }
}

impl<T> std::fmt::Debug for SinglePool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinglePool")
            .field("occupied", &!self.slot.load(Ordering::Acquire).is_null())
            .field("spare_box", &!self.spare.load(Ordering::Acquire).is_null())
            .finish_non_exhaustive()
    }
}
