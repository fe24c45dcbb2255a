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

//! Subscribers and the type-erased subscriptions the bus stores for them.

use crate::error::BusError;
use crate::token::Token;
use std::any;
use std::fmt;
use std::sync::Weak;

/// An object that receives events posted to its tokens.
///
/// Register it with [`EventBus::register`](crate::EventBus::register). To
/// route events to a different method, or to a closure, use
/// [`EventBus::register_with`](crate::EventBus::register_with) instead.
pub trait Subscriber<A>: Send + Sync + 'static {
    /// Handles one event. `token` tells which registration it was posted to.
    fn on_event(&self, token: Token, args: A) -> anyhow::Result<()>;
}

trait Target<A>: Send + Sync {
    /// Calls the callback, or returns `None` if the subscriber is gone.
    fn invoke(&self, token: Token, args: A) -> Option<anyhow::Result<()>>;

    fn is_alive(&self) -> bool;

    fn identity(&self) -> usize;

    fn type_name(&self) -> &'static str;
}

struct Bound<S: ?Sized, F> {
    subscriber: Weak<S>,
    method: F,
}

impl<A, S, F> Target<A> for Bound<S, F>
where
    S: ?Sized + Send + Sync + 'static,
    F: Fn(&S, Token, A) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn invoke(&self, token: Token, args: A) -> Option<anyhow::Result<()>> {
        let subscriber = self.subscriber.upgrade()?;
        Some((self.method)(&*subscriber, token, args))
    }

    fn is_alive(&self) -> bool {
        self.subscriber.strong_count() > 0
    }

    fn identity(&self) -> usize {
        self.subscriber.as_ptr().cast::<()>() as usize
    }

    fn type_name(&self) -> &'static str {
        any::type_name::<S>()
    }
}

/// A weakly held subscriber plus the callback resolved at registration.
pub(crate) struct Subscription<A> {
    target: Box<dyn Target<A>>,
}

impl<A: 'static> Subscription<A> {
    pub(crate) fn new<S, F>(subscriber: Weak<S>, method: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&S, Token, A) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            target: Box::new(Bound { subscriber, method }),
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.target.is_alive()
    }

    /// Address of the subscriber object; equal for every registration of it.
    pub(crate) fn identity(&self) -> usize {
        self.target.identity()
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.target.type_name()
    }

    /// Invokes the callback. A subscriber dropped since the post is not an error.
    pub(crate) fn call(&self, token: Token, args: A) -> Result<(), BusError> {
        match self.target.invoke(token, args) {
            Some(Ok(())) => Ok(()),
            Some(Err(error)) => Err(BusError::Invocation {
                token,
                subscriber: self.type_name(),
                source: error.into(),
            }),
            None => {
                log::warn!(
                    "Subscriber `{}` for event {token} was dropped before delivery; discarding.",
                    self.type_name()
                );
                Ok(())
            }
        }
    }
}

impl<A: 'static> fmt::Debug for Subscription<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subscriber", &self.type_name())
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counter(AtomicUsize);

    #[test]
    fn call_reaches_live_subscriber() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let subscription = Subscription::new(Arc::downgrade(&counter), |c: &Counter, _, n: usize| {
            c.0.fetch_add(n, Ordering::SeqCst);
            Ok(())
        });

        subscription.call(Token::new(1), 3).unwrap();

        assert!(subscription.is_alive());
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
        assert_eq!(subscription.identity(), Arc::as_ptr(&counter) as usize);
    }

    #[test]
    fn dropped_subscriber_is_skipped() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let subscription = Subscription::new(Arc::downgrade(&counter), |_: &Counter, _, _: ()| {
            panic!("must not be called")
        });
        drop(counter);

        assert!(!subscription.is_alive());
        assert!(subscription.call(Token::new(1), ()).is_ok());
    }

    #[test]
    fn callback_error_is_wrapped() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let subscription = Subscription::new(Arc::downgrade(&counter), |_: &Counter, _, _: ()| {
            anyhow::bail!("rejected")
        });

        let error = subscription.call(Token::new(9), ()).unwrap_err();
        match error {
            BusError::Invocation { token, subscriber, source } => {
                assert_eq!(token, Token::new(9));
                assert!(subscriber.ends_with("Counter"));
                assert_eq!(source.to_string(), "rejected");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
