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

use crate::config::BusConfig;
use crate::envelope::Dispatcher;
use crate::error::BusError;
use crate::handlers::{new_handler, ModeHandler};
use crate::mode::ThreadMode;
use crate::subscriber::{Subscriber, Subscription};
use crate::table::SubscriberTable;
use crate::token::{Token, TokenSequence};
use courier_exec::{Executor, Looper};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// A token-keyed event bus.
///
/// Subscribers register once and receive a [`Token`]. Posting to that token
/// with a [`ThreadMode`] runs the subscriber's callback on the thread the mode
/// selects: the posting thread, the main [`Looper`], the shared executor, or
/// a background thread owned by the bus. `A` is the event payload type.
///
/// Subscribers are held weakly. Events posted to a subscriber that has since
/// been dropped are discarded with a warning, but owners should still call
/// [`unregister`](Self::unregister) when they go away.
pub struct EventBus<A> {
    dispatcher: Arc<Dispatcher<A>>,
    table: SubscriberTable<A>,
    tokens: TokenSequence,
    handlers: [OnceLock<Arc<dyn ModeHandler<A>>>; ThreadMode::COUNT],
}

impl<A: Send + 'static> EventBus<A> {
    /// Creates a bus with the default [`BusConfig`].
    ///
    /// ## Arguments
    /// * `main` - the looper acting as the main thread.
    /// * `executor` - where asynchronous and sequential modes run.
    pub fn new(main: Looper, executor: Arc<dyn Executor>) -> Self {
        Self::with_config(main, executor, BusConfig::default())
    }

    /// Creates a bus with an explicit configuration.
    pub fn with_config(main: Looper, executor: Arc<dyn Executor>, config: BusConfig) -> Self {
        log::info!("Event bus created (main looper: '{}').", main.name());
        Self {
            dispatcher: Arc::new(Dispatcher::new(main, executor, config)),
            table: SubscriberTable::new(),
            tokens: TokenSequence::new(),
            handlers: std::array::from_fn(|_| OnceLock::new()),
        }
    }

    /// Registers `subscriber` under a freshly generated token.
    pub fn register<S>(&self, subscriber: &Arc<S>) -> Token
    where
        S: Subscriber<A> + ?Sized,
    {
        self.register_with(subscriber, |subscriber: &S, token, args| {
            subscriber.on_event(token, args)
        })
    }

    /// Registers `subscriber` with an explicit callback under a fresh token.
    ///
    /// `method` is typically a method path such as `Scoreboard::on_goal`.
    pub fn register_with<S, F>(&self, subscriber: &Arc<S>, method: F) -> Token
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&S, Token, A) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let method = Arc::new(method);
        loop {
            let token = self.tokens.next();
            let method = Arc::clone(&method);
            let subscription = Subscription::new(Arc::downgrade(subscriber), move |s: &S, t, a| {
                method(s, t, a)
            });
            // Explicit registrations may already hold the next counter value.
            if self.table.insert(token, subscription).is_ok() {
                log::debug!("Registered token {token}.");
                return token;
            }
        }
    }

    /// Registers `subscriber` under a caller-chosen token.
    ///
    /// ## Returns
    /// [`BusError::AlreadyRegistered`] if `token` is taken. The existing
    /// registration is left untouched.
    pub fn register_token<S>(&self, token: Token, subscriber: &Arc<S>) -> Result<(), BusError>
    where
        S: Subscriber<A> + ?Sized,
    {
        self.register_token_with(token, subscriber, |subscriber: &S, token, args| {
            subscriber.on_event(token, args)
        })
    }

    /// Like [`register_token`](Self::register_token), with an explicit callback.
    pub fn register_token_with<S, F>(
        &self,
        token: Token,
        subscriber: &Arc<S>,
        method: F,
    ) -> Result<(), BusError>
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&S, Token, A) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.table
            .insert(token, Subscription::new(Arc::downgrade(subscriber), method))?;
        log::debug!("Registered explicit token {token}.");
        Ok(())
    }

    /// Removes one registration. Returns `false` if `token` was unknown.
    pub fn unregister(&self, token: Token) -> bool {
        self.table.remove(token)
    }

    /// Removes every registration.
    pub fn unregister_all(&self) {
        self.table.clear();
        log::debug!("All subscribers unregistered.");
    }

    /// Returns `true` if `token` has a registration, live or not yet evicted.
    pub fn is_registered(&self, token: Token) -> bool {
        self.table.contains(token)
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes a value from the token counter without registering anything.
    pub fn generate_token(&self) -> Token {
        self.tokens.next()
    }

    /// Posts an event with no delay.
    pub fn post(&self, token: Token, mode: ThreadMode, args: A) -> Result<(), BusError> {
        self.post_delayed(token, mode, Duration::ZERO, args)
    }

    /// Posts an event to `token`, to be handled in `mode` after `delay`.
    ///
    /// Only [`ThreadMode::Main`] and [`ThreadMode::Dedicated`] honour the
    /// delay. Posting to an unknown token, or to one whose subscriber has been
    /// dropped, does nothing.
    ///
    /// ## Returns
    /// For modes that run on the posting thread, the callback's own failure.
    /// Otherwise only scheduling failures; callback failures are reported on
    /// the thread that ran them.
    pub fn post_delayed(
        &self,
        token: Token,
        mode: ThreadMode,
        delay: Duration,
        args: A,
    ) -> Result<(), BusError> {
        let Some(subscription) = self.table.lookup(token) else {
            log::trace!("No live subscriber for token {token}; event dropped.");
            return Ok(());
        };
        if !delay.is_zero() && !mode.supports_delay() {
            log::trace!("{mode} mode ignores the {delay:?} delay for token {token}.");
        }

        let envelope = self.dispatcher.envelope(token, subscription, args);
        self.handler(mode).handle(envelope, delay)
    }

    /// Runs `work` on the main looper: inline when already there, posted otherwise.
    pub fn run_on_main_thread<F>(&self, work: F) -> Result<(), BusError>
    where
        F: FnOnce() + Send + 'static,
    {
        Ok(self.dispatcher.main.run_or_post(work)?)
    }

    /// Runs `work` on the main looper and waits for its result.
    ///
    /// Safe to call from the main thread, where it runs inline.
    pub fn run_on_main_thread_blocking<R, F>(&self, work: F) -> Result<R, BusError>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        Ok(self.dispatcher.main.run_blocking(work)?)
    }

    /// The looper acting as the main thread.
    pub fn main_looper(&self) -> &Looper {
        &self.dispatcher.main
    }

    /// The executor behind the asynchronous modes.
    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.dispatcher.executor
    }

    fn handler(&self, mode: ThreadMode) -> &Arc<dyn ModeHandler<A>> {
        self.handlers[mode.index()].get_or_init(|| new_handler(mode, &self.dispatcher))
    }
}

impl<A> fmt::Debug for EventBus<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let created = self.handlers.iter().filter(|slot| slot.get().is_some()).count();
        f.debug_struct("EventBus")
            .field("main", &self.dispatcher.main)
            .field("handlers_created", &created)
            .finish_non_exhaustive()
    }
}
