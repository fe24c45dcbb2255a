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

//! One-at-a-time FIFO delivery on top of the executor.

use crate::envelope::{Dispatcher, Envelope};
use crate::error::BusError;
use courier_exec::Job;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct QueueState<A> {
    events: VecDeque<Envelope<A>>,
    draining: bool,
}

struct Inner<A> {
    dispatcher: Arc<Dispatcher<A>>,
    dedupe: bool,
    state: Mutex<QueueState<A>>,
}

/// A FIFO of envelopes drained by at most one executor job at a time.
///
/// The head envelope stays queued while its callback runs and is popped
/// afterwards, so duplicate checks see it too.
pub(crate) struct SequentialQueue<A> {
    inner: Arc<Inner<A>>,
}

impl<A: Send + 'static> SequentialQueue<A> {
    /// `dedupe` drops an event whose (subscriber, token) pair is already queued.
    pub(crate) fn new(dispatcher: Arc<Dispatcher<A>>, dedupe: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                dispatcher,
                dedupe,
                state: Mutex::new(QueueState {
                    events: VecDeque::new(),
                    draining: false,
                }),
            }),
        }
    }

    pub(crate) fn enqueue(&self, envelope: Envelope<A>) -> Result<(), BusError> {
        let start = {
            let mut state = self.inner.state();
            if self.inner.dedupe
                && state
                    .events
                    .iter()
                    .any(|queued| queued.same_target(&envelope))
            {
                log::warn!(
                    "Event {} is already queued for the same subscriber; discarding the new one.",
                    envelope.token()
                );
                drop(state);
                self.inner.dispatcher.recycle(envelope);
                return Ok(());
            }

            state.events.push_back(envelope);
            !std::mem::replace(&mut state.draining, true)
        };

        if !start {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        let submitted = self
            .inner
            .dispatcher
            .executor
            .execute_job(Job::fallible(move || inner.drain()));
        if let Err(error) = submitted {
            // Nothing will drain the queue; drop what it holds.
            let stranded: Vec<_> = {
                let mut state = self.inner.state();
                state.draining = false;
                state.events.drain(..).collect()
            };
            for envelope in stranded {
                self.inner.dispatcher.recycle(envelope);
            }
            return Err(error.into());
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.state().events.len()
    }
}

impl<A: Send + 'static> Inner<A> {
    fn state(&self) -> MutexGuard<'_, QueueState<A>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn drain(&self) -> anyhow::Result<()> {
        let mut first_error = None;
        loop {
            let call = {
                let mut state = self.state();
                match state.events.front_mut() {
                    Some(head) => head.take_call(),
                    None => {
                        state.draining = false;
                        break;
                    }
                }
            };

            let outcome = match call {
                Some((token, subscription, args)) => {
                    self.dispatcher.invoke(token, &subscription, args)
                }
                None => Ok(()),
            };

            let done = self.state().events.pop_front();
            if let Some(envelope) = done {
                self.dispatcher.recycle(envelope);
            }

            if let Err(error) = outcome {
                if first_error.is_none() {
                    first_error = Some(error);
                } else {
                    log::error!("Sequential delivery failed: {error}");
                }
            }
        }

        match first_error {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;
    use crate::subscriber::Subscription;
    use crate::token::Token;
    use courier_exec::{ExecError, Executor, Looper};

    /// Holds submitted jobs until the test runs them.
    #[derive(Default)]
    struct ManualExecutor {
        jobs: Mutex<Vec<Job>>,
    }

    impl Executor for ManualExecutor {
        fn execute_job(&self, job: Job) -> Result<(), ExecError> {
            self.jobs.lock().unwrap().push(job);
            Ok(())
        }
    }

    impl ManualExecutor {
        fn submitted(&self) -> usize {
            self.jobs.lock().unwrap().len()
        }

        fn run_all(&self) -> Vec<anyhow::Result<()>> {
            let jobs: Vec<Job> = self.jobs.lock().unwrap().drain(..).collect();
            jobs.into_iter()
                .map(|job| match job {
                    Job::Once(work) => work(),
                    Job::Tracked(task) => task.run(),
                })
                .collect()
        }
    }

    struct Log {
        events: Mutex<Vec<u32>>,
    }

    type Setup = (
        Arc<ManualExecutor>,
        SequentialQueue<u32>,
        Arc<Dispatcher<u32>>,
        Arc<Log>,
    );

    fn setup(dedupe: bool) -> Setup {
        let executor = Arc::new(ManualExecutor::default());
        let (main, _runner) = Looper::new("sequential-test");
        let dispatcher = Arc::new(Dispatcher::new(main, executor.clone(), BusConfig::default()));
        let queue = SequentialQueue::new(Arc::clone(&dispatcher), dedupe);
        let log = Arc::new(Log {
            events: Mutex::new(Vec::new()),
        });
        (executor, queue, dispatcher, log)
    }

    fn subscription(log: &Arc<Log>) -> Arc<Subscription<u32>> {
        Arc::new(Subscription::new(Arc::downgrade(log), |log: &Log, _, value: u32| {
            if value == 13 {
                anyhow::bail!("unlucky");
            }
            log.events.lock().unwrap().push(value);
            Ok(())
        }))
    }

    #[test]
    fn one_drain_job_delivers_in_order() {
        let (executor, queue, dispatcher, log) = setup(false);
        let target = subscription(&log);

        for value in 1..=3 {
            queue
                .enqueue(dispatcher.envelope(Token::new(1), Arc::clone(&target), value))
                .unwrap();
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(executor.submitted(), 1);

        assert!(executor.run_all().iter().all(Result::is_ok));
        assert_eq!(*log.events.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn duplicates_are_dropped_while_queued() {
        let (executor, queue, dispatcher, log) = setup(true);
        let target = subscription(&log);

        queue
            .enqueue(dispatcher.envelope(Token::new(4), Arc::clone(&target), 1))
            .unwrap();
        queue
            .enqueue(dispatcher.envelope(Token::new(4), Arc::clone(&target), 2))
            .unwrap();
        queue
            .enqueue(dispatcher.envelope(Token::new(5), Arc::clone(&target), 3))
            .unwrap();
        assert_eq!(queue.len(), 2);

        executor.run_all();
        assert_eq!(*log.events.lock().unwrap(), vec![1, 3]);

        queue
            .enqueue(dispatcher.envelope(Token::new(4), target, 4))
            .unwrap();
        assert_eq!(executor.submitted(), 1, "an idle queue starts a new drain");
    }

    #[test]
    fn failure_is_reported_after_the_rest_is_delivered() {
        let (executor, queue, dispatcher, log) = setup(false);
        let target = subscription(&log);

        for value in [12, 13, 14] {
            queue
                .enqueue(dispatcher.envelope(Token::new(2), Arc::clone(&target), value))
                .unwrap();
        }

        let results = executor.run_all();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
        assert_eq!(*log.events.lock().unwrap(), vec![12, 14]);
        assert_eq!(dispatcher.idle_envelopes(), 3);
    }
}
