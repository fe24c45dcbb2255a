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

//! Pooled dispatch envelopes and the context every mode handler shares.

use crate::config::BusConfig;
use crate::error::BusError;
use crate::subscriber::Subscription;
use crate::token::Token;
use courier_exec::{panic_message, Executor, Looper};
use courier_pool::{BoundedPool, Pool, Recyclable};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// One pending invocation. Obtained from the envelope pool on post and
/// handed back right after the callback ran, whatever its outcome.
pub(crate) struct Envelope<A> {
    token: Token,
    subscription: Option<Arc<Subscription<A>>>,
    args: Option<A>,
}

impl<A> Envelope<A> {
    fn empty() -> Self {
        Self {
            token: Token::new(0),
            subscription: None,
            args: None,
        }
    }

    pub(crate) fn token(&self) -> Token {
        self.token
    }

    /// Same token and same subscriber object.
    pub(crate) fn same_target(&self, other: &Envelope<A>) -> bool
    where
        A: 'static,
    {
        self.token == other.token
            && match (&self.subscription, &other.subscription) {
                (Some(left), Some(right)) => left.identity() == right.identity(),
                _ => false,
            }
    }

    /// Moves the call out, leaving token and subscriber in place for
    /// duplicate checks while the call runs.
    pub(crate) fn take_call(&mut self) -> Option<(Token, Arc<Subscription<A>>, A)> {
        let subscription = self.subscription.clone()?;
        let args = self.args.take()?;
        Some((self.token, subscription, args))
    }
}

impl<A> Recyclable for Envelope<A> {
    fn on_recycled(&mut self) {
        self.token = Token::new(0);
        self.subscription = None;
        self.args = None;
    }
}

/// State shared by the bus and all of its handlers.
pub(crate) struct Dispatcher<A> {
    pub(crate) main: Looper,
    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) config: BusConfig,
    envelopes: BoundedPool<Envelope<A>>,
}

impl<A: Send + 'static> Dispatcher<A> {
    pub(crate) fn new(main: Looper, executor: Arc<dyn Executor>, config: BusConfig) -> Self {
        let envelopes = BoundedPool::recyclable(Envelope::empty, config.envelope_capacity());
        Self {
            main,
            executor,
            config,
            envelopes,
        }
    }

    pub(crate) fn envelope(
        &self,
        token: Token,
        subscription: Arc<Subscription<A>>,
        args: A,
    ) -> Envelope<A> {
        let mut envelope = self.envelopes.obtain();
        envelope.token = token;
        envelope.subscription = Some(subscription);
        envelope.args = Some(args);
        envelope
    }

    pub(crate) fn recycle(&self, envelope: Envelope<A>) {
        self.envelopes.recycle(envelope);
    }

    /// Runs the envelope's call and recycles it.
    pub(crate) fn deliver(&self, mut envelope: Envelope<A>) -> Result<(), BusError> {
        let call = envelope.take_call();
        self.recycle(envelope);
        match call {
            Some((token, subscription, args)) => self.invoke(token, &subscription, args),
            None => Ok(()),
        }
    }

    /// Calls the subscriber, turning a panic into [`BusError::Panicked`].
    pub(crate) fn invoke(
        &self,
        token: Token,
        subscription: &Subscription<A>,
        args: A,
    ) -> Result<(), BusError> {
        panic::catch_unwind(AssertUnwindSafe(|| subscription.call(token, args))).unwrap_or_else(
            |payload| {
                Err(BusError::Panicked {
                    token,
                    message: panic_message(payload.as_ref()),
                })
            },
        )
    }

    #[cfg(test)]
    pub(crate) fn idle_envelopes(&self) -> usize {
        self.envelopes.len()
    }
}

/// An envelope travelling to another thread.
///
/// If it is dropped before [`deliver`](Parcel::deliver) runs (the looper
/// closed or the executor refused the job), the envelope goes back to the pool.
pub(crate) struct Parcel<A: Send + 'static> {
    dispatcher: Arc<Dispatcher<A>>,
    envelope: Option<Envelope<A>>,
}

impl<A: Send + 'static> Parcel<A> {
    pub(crate) fn new(dispatcher: &Arc<Dispatcher<A>>, envelope: Envelope<A>) -> Self {
        Self {
            dispatcher: Arc::clone(dispatcher),
            envelope: Some(envelope),
        }
    }

    pub(crate) fn deliver(mut self) -> Result<(), BusError> {
        match self.envelope.take() {
            Some(envelope) => self.dispatcher.deliver(envelope),
            None => Ok(()),
        }
    }
}

impl<A: Send + 'static> Drop for Parcel<A> {
    fn drop(&mut self) {
        if let Some(envelope) = self.envelope.take() {
            log::trace!("Event {} was never delivered; recycling its envelope.", envelope.token());
            self.dispatcher.recycle(envelope);
        }
    }
}
