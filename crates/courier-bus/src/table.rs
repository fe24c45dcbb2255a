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

use crate::error::BusError;
use crate::subscriber::Subscription;
use crate::token::Token;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Token to subscription map. Every read and write goes through one mutex.
pub(crate) struct SubscriberTable<A> {
    entries: Mutex<HashMap<Token, Arc<Subscription<A>>>>,
}

impl<A: 'static> SubscriberTable<A> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Token, Arc<Subscription<A>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts unless `token` is taken, in which case the table is unchanged.
    pub(crate) fn insert(
        &self,
        token: Token,
        subscription: Subscription<A>,
    ) -> Result<(), BusError> {
        match self.entries().entry(token) {
            Entry::Occupied(_) => Err(BusError::AlreadyRegistered { token }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(subscription));
                Ok(())
            }
        }
    }

    /// Returns the live subscription for `token`, evicting it if its
    /// subscriber has been dropped.
    pub(crate) fn lookup(&self, token: Token) -> Option<Arc<Subscription<A>>> {
        let mut entries = self.entries();
        let subscription = entries.get(&token)?;
        if subscription.is_alive() {
            return Some(Arc::clone(subscription));
        }

        log::warn!(
            "Subscriber `{}` for token {token} is gone; evicting it.",
            subscription.type_name()
        );
        entries.remove(&token);
        None
    }

    pub(crate) fn remove(&self, token: Token) -> bool {
        self.entries().remove(&token).is_some()
    }

    pub(crate) fn clear(&self) {
        self.entries().clear();
    }

    pub(crate) fn contains(&self, token: Token) -> bool {
        self.entries().contains_key(&token)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }
}
