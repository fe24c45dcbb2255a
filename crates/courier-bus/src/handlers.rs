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

//! The seven thread-affinity policies.

use crate::envelope::{Dispatcher, Envelope, Parcel};
use crate::error::BusError;
use crate::mode::ThreadMode;
use crate::sequential::SequentialQueue;
use courier_exec::{Job, OnDemandLooper};
use std::sync::Arc;
use std::time::Duration;

/// Routes one envelope to the thread its mode asks for.
pub(crate) trait ModeHandler<A>: Send + Sync {
    fn handle(&self, envelope: Envelope<A>, delay: Duration) -> Result<(), BusError>;
}

/// Builds the handler for `mode`. Called once per mode and bus.
pub(crate) fn new_handler<A: Send + 'static>(
    mode: ThreadMode,
    dispatcher: &Arc<Dispatcher<A>>,
) -> Arc<dyn ModeHandler<A>> {
    let dispatcher = Arc::clone(dispatcher);
    log::debug!("Creating the {mode} event handler.");
    match mode {
        ThreadMode::Direct => Arc::new(DirectHandler { dispatcher }),
        ThreadMode::Main => Arc::new(MainHandler { dispatcher }),
        ThreadMode::Async => Arc::new(AsyncHandler { dispatcher }),
        ThreadMode::Single => Arc::new(QueueHandler {
            queue: SequentialQueue::new(dispatcher, true),
        }),
        ThreadMode::Dedicated => {
            let looper = OnDemandLooper::new(
                dispatcher.config.dedicated_thread_prefix.clone(),
                dispatcher.config.dedicated_idle_timeout(),
            );
            Arc::new(DedicatedHandler { dispatcher, looper })
        }
        ThreadMode::Sequence => Arc::new(QueueHandler {
            queue: SequentialQueue::new(dispatcher, false),
        }),
        ThreadMode::Background => Arc::new(BackgroundHandler {
            queue: SequentialQueue::new(Arc::clone(&dispatcher), false),
            dispatcher,
        }),
    }
}

struct DirectHandler<A> {
    dispatcher: Arc<Dispatcher<A>>,
}

impl<A: Send + 'static> ModeHandler<A> for DirectHandler<A> {
    fn handle(&self, envelope: Envelope<A>, _delay: Duration) -> Result<(), BusError> {
        self.dispatcher.deliver(envelope)
    }
}

struct MainHandler<A> {
    dispatcher: Arc<Dispatcher<A>>,
}

impl<A: Send + 'static> ModeHandler<A> for MainHandler<A> {
    fn handle(&self, envelope: Envelope<A>, delay: Duration) -> Result<(), BusError> {
        if delay.is_zero() && self.dispatcher.main.is_current_thread() {
            return self.dispatcher.deliver(envelope);
        }

        let parcel = Parcel::new(&self.dispatcher, envelope);
        self.dispatcher
            .main
            .post_fallible(move || Ok(parcel.deliver()?), delay)?;
        Ok(())
    }
}

struct AsyncHandler<A> {
    dispatcher: Arc<Dispatcher<A>>,
}

impl<A: Send + 'static> ModeHandler<A> for AsyncHandler<A> {
    fn handle(&self, envelope: Envelope<A>, _delay: Duration) -> Result<(), BusError> {
        let parcel = Parcel::new(&self.dispatcher, envelope);
        self.dispatcher
            .executor
            .execute_job(Job::fallible(move || Ok(parcel.deliver()?)))?;
        Ok(())
    }
}

/// Single and Sequence: every event goes through the queue.
struct QueueHandler<A> {
    queue: SequentialQueue<A>,
}

impl<A: Send + 'static> ModeHandler<A> for QueueHandler<A> {
    fn handle(&self, envelope: Envelope<A>, _delay: Duration) -> Result<(), BusError> {
        self.queue.enqueue(envelope)
    }
}

struct DedicatedHandler<A> {
    dispatcher: Arc<Dispatcher<A>>,
    looper: OnDemandLooper,
}

impl<A: Send + 'static> ModeHandler<A> for DedicatedHandler<A> {
    fn handle(&self, envelope: Envelope<A>, delay: Duration) -> Result<(), BusError> {
        if delay.is_zero() && !self.dispatcher.main.is_current_thread() {
            return self.dispatcher.deliver(envelope);
        }

        let parcel = Parcel::new(&self.dispatcher, envelope);
        self.looper
            .post_delayed(move || Ok(parcel.deliver()?), delay)?;
        Ok(())
    }
}

/// Queued when posted from the main thread, inline from anywhere else.
struct BackgroundHandler<A> {
    dispatcher: Arc<Dispatcher<A>>,
    queue: SequentialQueue<A>,
}

impl<A: Send + 'static> ModeHandler<A> for BackgroundHandler<A> {
    fn handle(&self, envelope: Envelope<A>, _delay: Duration) -> Result<(), BusError> {
        if self.dispatcher.main.is_current_thread() {
            self.queue.enqueue(envelope)
        } else {
            self.dispatcher.deliver(envelope)
        }
    }
}
