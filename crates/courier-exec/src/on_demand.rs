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

//! A background loop thread that exists only while it has work.

use crate::error::ExecError;
use crate::queue::{run_message, Message, MessageQueue, Next, Signal};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

struct Active {
    tx: flume::Sender<Signal>,
    thread: ThreadId,
}

struct Shared {
    prefix: String,
    idle_timeout: Duration,
    slot: Mutex<Option<Active>>,
    spawned: AtomicUsize,
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, Option<Active>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A looper whose thread is created on first use and retired once its queue
/// has stayed empty for `idle_timeout`. The next post starts a new thread.
///
/// The handle itself lives as long as its owner; only the thread comes and goes.
pub struct OnDemandLooper {
    shared: Arc<Shared>,
}

impl OnDemandLooper {
    /// Creates the handle. No thread is started until the first post.
    pub fn new(prefix: impl Into<String>, idle_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                prefix: prefix.into(),
                idle_timeout,
                slot: Mutex::new(None),
                spawned: AtomicUsize::new(0),
            }),
        }
    }

    /// Queues `work` on the background thread, starting one if needed.
    pub fn post_delayed<F>(&self, work: F, delay: Duration) -> Result<(), ExecError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let mut signal = Signal::Run {
            at: Instant::now() + delay,
            message: Box::new(work) as Message,
        };

        let mut slot = self.shared.slot();
        if let Some(active) = slot.as_ref() {
            match active.tx.send(signal) {
                Ok(()) => return Ok(()),
                // The thread died without clearing the slot (a panic outside a
                // message); fall through and replace it.
                Err(flume::SendError(rejected)) => signal = rejected,
            }
        }

        let (tx, rx) = flume::unbounded();
        let _ = tx.send(signal);
        let number = self.shared.spawned.fetch_add(1, Ordering::Relaxed) + 1;
        let name = format!("{}-{number}", self.shared.prefix);
        let weak = Arc::downgrade(&self.shared);
        let idle_timeout = self.shared.idle_timeout;
        let thread_name = name.clone();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_until_idle(weak, thread_name, MessageQueue::new(rx), idle_timeout))
            .map_err(|source| ExecError::Spawn { name, source })?;

        *slot = Some(Active {
            tx,
            thread: handle.thread().id(),
        });
        Ok(())
    }

    /// Returns `true` while a background thread is alive.
    pub fn is_running(&self) -> bool {
        self.shared.slot().is_some()
    }

    /// Returns `true` when called from the current background thread.
    pub fn is_current_thread(&self) -> bool {
        self.shared
            .slot()
            .as_ref()
            .is_some_and(|active| active.thread == thread::current().id())
    }

    /// Number of threads started so far.
    pub fn threads_spawned(&self) -> usize {
        self.shared.spawned.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for OnDemandLooper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnDemandLooper")
            .field("prefix", &self.shared.prefix)
            .field("idle_timeout", &self.shared.idle_timeout)
            .field("running", &self.is_running())
            .finish()
    }
}

fn run_until_idle(
    shared: Weak<Shared>,
    name: String,
    mut queue: MessageQueue,
    idle_timeout: Duration,
) {
    log::debug!("On-demand looper '{name}' started.");
    loop {
        match queue.next(Some(idle_timeout)) {
            Next::Run(message) => run_message(&name, message),
            Next::Idle => {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                // Posters hold the slot lock while sending, so an empty queue
                // seen under the lock stays empty until the slot is cleared.
                let mut slot = shared.slot();
                if queue.is_drained() {
                    if slot
                        .as_ref()
                        .is_some_and(|active| active.thread == thread::current().id())
                    {
                        *slot = None;
                    }
                    break;
                }
            }
            Next::Quit => break,
        }
    }
    log::debug!("On-demand looper '{name}' retired.");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn thread_starts_lazily_and_runs_in_order() {
        let looper = OnDemandLooper::new("test-on-demand", Duration::from_secs(5));
        assert!(!looper.is_running());
        assert_eq!(looper.threads_spawned(), 0);

        let (tx, rx) = flume::unbounded();
        for value in 0..4 {
            let tx = tx.clone();
            looper
                .post_delayed(
                    move || {
                        tx.send((value, thread::current().name().map(String::from)))?;
                        Ok(())
                    },
                    Duration::ZERO,
                )
                .unwrap();
        }

        let received: Vec<_> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        assert_eq!(
            received.iter().map(|(value, _)| *value).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert_eq!(received[0].1.as_deref(), Some("test-on-demand-1"));
        assert_eq!(looper.threads_spawned(), 1);
    }

    #[test]
    fn idle_thread_retires_and_is_recreated() {
        let looper = OnDemandLooper::new("test-retire", Duration::from_millis(30));
        let (tx, rx) = flume::unbounded();

        let first = tx.clone();
        looper
            .post_delayed(
                move || {
                    first.send(1)?;
                    Ok(())
                },
                Duration::ZERO,
            )
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1);
        assert!(wait_until(|| !looper.is_running()), "thread should retire when idle");

        looper
            .post_delayed(
                move || {
                    tx.send(2)?;
                    Ok(())
                },
                Duration::ZERO,
            )
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 2);
        assert_eq!(looper.threads_spawned(), 2);
    }

    #[test]
    fn pending_delayed_work_keeps_thread_alive() {
        let looper = OnDemandLooper::new("test-delayed", Duration::from_millis(10));
        let (tx, rx) = flume::unbounded();

        looper
            .post_delayed(
                move || {
                    tx.send("late")?;
                    Ok(())
                },
                Duration::from_millis(80),
            )
            .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "late");
        assert_eq!(looper.threads_spawned(), 1);
    }
}
