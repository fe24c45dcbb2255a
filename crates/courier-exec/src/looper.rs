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

//! A single-threaded message loop: the "main thread" of a courier runtime.
//!
//! A [`Looper`] is a cheap, cloneable handle used to post work; the
//! [`LoopRunner`] owns the queue and executes that work on whichever thread
//! calls [`LoopRunner::run`]. Work runs strictly one item at a time, ordered
//! by deadline and then by arrival.

use crate::error::ExecError;
use crate::observer::panic_message;
use crate::queue::{run_message, Message, MessageQueue, Next, Signal};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

struct Inner {
    name: String,
    tx: flume::Sender<Signal>,
    thread: Arc<OnceLock<ThreadId>>,
    running: Arc<AtomicBool>,
    join: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a message loop.
#[derive(Clone)]
pub struct Looper {
    inner: Arc<Inner>,
}

/// The receiving half of a [`Looper`]; turns the calling thread into the loop thread.
pub struct LoopRunner {
    name: String,
    thread: Arc<OnceLock<ThreadId>>,
    running: Arc<AtomicBool>,
    queue: MessageQueue,
}

impl Looper {
    /// Creates a looper whose loop has not started yet.
    ///
    /// Work posted before [`LoopRunner::run`] is called waits in the queue.
    pub fn new(name: impl Into<String>) -> (Looper, LoopRunner) {
        let name = name.into();
        let (tx, rx) = flume::unbounded();
        let thread = Arc::new(OnceLock::new());
        let running = Arc::new(AtomicBool::new(false));

        let looper = Looper {
            inner: Arc::new(Inner {
                name: name.clone(),
                tx,
                thread: Arc::clone(&thread),
                running: Arc::clone(&running),
                join: Mutex::new(None),
            }),
        };
        let runner = LoopRunner {
            name,
            thread,
            running,
            queue: MessageQueue::new(rx),
        };
        (looper, runner)
    }

    /// Creates a looper and starts its loop on a new, named thread.
    pub fn spawn(name: impl Into<String>) -> Result<Looper, ExecError> {
        let (looper, runner) = Looper::new(name);
        let handle = thread::Builder::new()
            .name(looper.inner.name.clone())
            .spawn(move || runner.run())
            .map_err(|source| ExecError::Spawn {
                name: looper.inner.name.clone(),
                source,
            })?;

        let _ = looper.inner.thread.set(handle.thread().id());
        *looper
            .inner
            .join
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(looper)
    }

    /// The looper's name, also used as its thread name when spawned.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns `true` when called from the loop thread itself.
    pub fn is_current_thread(&self) -> bool {
        self.inner.thread.get() == Some(&thread::current().id())
    }

    /// Returns `true` while the loop is executing messages.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Queues `work` to run on the loop thread as soon as possible.
    pub fn post<F>(&self, work: F) -> Result<(), ExecError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_delayed(work, Duration::ZERO)
    }

    /// Queues `work` to run on the loop thread once `delay` has elapsed.
    pub fn post_delayed<F>(&self, work: F, delay: Duration) -> Result<(), ExecError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_fallible(
            move || {
                work();
                Ok(())
            },
            delay,
        )
    }

    /// Like [`post_delayed`](Self::post_delayed), for work that can fail.
    /// The error is logged on the loop thread.
    pub fn post_fallible<F>(&self, work: F, delay: Duration) -> Result<(), ExecError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.send(Box::new(work), delay)
    }

    /// Runs `work` immediately when already on the loop thread, otherwise posts it.
    pub fn run_or_post<F>(&self, work: F) -> Result<(), ExecError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_current_thread() {
            work();
            Ok(())
        } else {
            self.post(work)
        }
    }

    /// Runs `work` on the loop thread and waits for its result.
    ///
    /// On the loop thread itself the work runs inline, since waiting would
    /// deadlock. From any other thread the caller blocks until the loop has
    /// executed the work; a panic inside it is returned as
    /// [`ExecError::Panicked`].
    pub fn run_blocking<R, F>(&self, work: F) -> Result<R, ExecError>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.is_current_thread() {
            return Ok(work());
        }

        let (result_tx, result_rx) = flume::bounded(1);
        self.post(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(work));
            let _ = result_tx.send(outcome);
        })?;

        match result_rx.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(ExecError::Panicked(panic_message(payload.as_ref()))),
            Err(_) => Err(self.closed()),
        }
    }

    /// Asks the loop to stop. Messages still queued are dropped.
    pub fn quit(&self) {
        let _ = self.inner.tx.send(Signal::Quit);
    }

    /// Waits for a spawned loop thread to finish.
    ///
    /// Returns immediately for loops driven by a caller-owned thread, or when
    /// called from the loop thread itself.
    pub fn join(&self) -> Result<(), ExecError> {
        if self.is_current_thread() {
            return Ok(());
        }
        let handle = self
            .inner
            .join
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => handle
                .join()
                .map_err(|payload| ExecError::Panicked(panic_message(payload.as_ref()))),
            None => Ok(()),
        }
    }

    fn send(&self, message: Message, delay: Duration) -> Result<(), ExecError> {
        let at = Instant::now() + delay;
        self.inner
            .tx
            .send(Signal::Run { at, message })
            .map_err(|_| self.closed())
    }

    fn closed(&self) -> ExecError {
        ExecError::LooperClosed {
            name: self.inner.name.clone(),
        }
    }
}

impl fmt::Debug for Looper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Looper")
            .field("name", &self.inner.name)
            .field("running", &self.is_running())
            .finish()
    }
}

impl LoopRunner {
    /// Runs the loop on the current thread until [`Looper::quit`] is called
    /// or every [`Looper`] handle has been dropped.
    pub fn run(mut self) {
        if self.thread.set(thread::current().id()).is_err()
            && self.thread.get() != Some(&thread::current().id())
        {
            log::warn!(
                "Looper '{}' is bound to another thread; running it here anyway.",
                self.name
            );
        }
        self.running.store(true, Ordering::Release);
        log::info!("Looper '{}' started.", self.name);

        loop {
            match self.queue.next(None) {
                Next::Run(message) => run_message(&self.name, message),
                Next::Idle => {}
                Next::Quit => break,
            }
        }

        self.running.store(false, Ordering::Release);
        log::info!("Looper '{}' stopped.", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posted_work_runs_on_loop_thread() {
        let looper = Looper::spawn("test-main").unwrap();
        let (tx, rx) = flume::bounded(1);
        let spy = looper.clone();

        looper
            .post(move || {
                tx.send((thread::current().name().map(String::from), spy.is_current_thread()))
                    .unwrap();
            })
            .unwrap();

        let (name, on_loop) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(name.as_deref(), Some("test-main"));
        assert!(on_loop);
        assert!(!looper.is_current_thread());

        looper.quit();
        looper.join().unwrap();
        assert!(!looper.is_running());
    }

    #[test]
    fn delayed_work_waits() {
        let looper = Looper::spawn("test-delay").unwrap();
        let (tx, rx) = flume::bounded(1);
        let posted = Instant::now();

        looper
            .post_delayed(move || tx.send(Instant::now()).unwrap(), Duration::from_millis(50))
            .unwrap();

        let ran_at = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(ran_at.duration_since(posted) >= Duration::from_millis(50));
        looper.quit();
    }

    #[test]
    fn run_blocking_returns_value_and_surfaces_panics() {
        let looper = Looper::spawn("test-blocking").unwrap();

        assert_eq!(looper.run_blocking(|| 6 * 7).unwrap(), 42);

        let error = looper
            .run_blocking(|| -> u32 { panic!("main thread exploded") })
            .unwrap_err();
        assert!(matches!(error, ExecError::Panicked(ref m) if m == "main thread exploded"));

        // The loop survives the panic.
        assert_eq!(looper.run_blocking(|| "alive").unwrap(), "alive");
        looper.quit();
    }

    #[test]
    fn run_blocking_from_loop_thread_runs_inline() {
        let looper = Looper::spawn("test-reentrant").unwrap();
        let inner = looper.clone();

        let value = looper
            .run_blocking(move || inner.run_blocking(|| 5).unwrap())
            .unwrap();

        assert_eq!(value, 5);
        looper.quit();
    }

    #[test]
    fn caller_thread_can_drive_the_loop() {
        let (looper, runner) = Looper::new("caller-driven");
        let (tx, rx) = flume::unbounded();
        for value in 0..3 {
            let tx = tx.clone();
            looper.post(move || tx.send(value).unwrap()).unwrap();
        }
        let quitter = looper.clone();
        looper.post(move || quitter.quit()).unwrap();

        runner.run();

        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(looper.post(|| {}).is_err(), "loop is gone once run() returns");
    }
}
