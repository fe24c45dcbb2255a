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

//! A bounded worker pool that parks overflow work instead of rejecting it.
//!
//! Work is handed directly to an idle worker, or to a freshly spawned one
//! while the pool is below `max_threads`. When every slot is busy the job is
//! parked in a FIFO pending queue. Each time a worker finishes a job it pulls
//! one parked job and re-posts it through the pool's *reposter* looper,
//! which dispatches it again. Every accepted job therefore runs exactly once
//! without the pool ever growing past its limit.

use crate::config::{ThreadPriority, WorkerPoolConfig};
use crate::error::ExecError;
use crate::looper::Looper;
use crate::manager::RunningSet;
use crate::observer::{panic_message, ExecuteObserver, TaskFailure, TaskInfo};
use crate::task::{Job, Task, TaskId};
use courier_pool::{BoundedPool, Pool, Recyclable};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::thread;

static POOL_SEQUENCE: AtomicUsize = AtomicUsize::new(1);

/// Upper bound on pooled retry wrappers kept between reschedules.
const RETRY_POOL_SIZE: usize = 8;

thread_local! {
    static CURRENT_WORKER: RefCell<Option<WorkerInfo>> = const { RefCell::new(None) };
}

/// Describes the pool worker the calling code runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    /// Name of the owning pool, `"<prefix>-<n>"`.
    pub pool: String,
    /// Name of this worker thread, `"<pool>-thread-<m>"`.
    pub thread_name: String,
    /// The priority configured for the pool.
    pub priority: ThreadPriority,
    /// Whether the OS accepted `priority` for this thread.
    pub priority_applied: bool,
}

/// Returns the worker metadata of the current thread, or `None` outside a pool.
pub fn current_worker() -> Option<WorkerInfo> {
    CURRENT_WORKER.with(|current| current.borrow().clone())
}

enum Handoff {
    Run(Job),
    Exit,
}

#[derive(Default)]
struct State {
    workers: usize,
    idle: usize,
    pending: VecDeque<Job>,
    shutdown: bool,
}

/// A parked job on its way back through the reposter.
///
/// If the wrapper is dropped before it runs (the looper quit or refused the
/// message) the job is dispatched in place so it is never lost.
struct Retry {
    job: Option<Job>,
    pool: Weak<Shared>,
}

impl Recyclable for Retry {
    fn on_recycled(&mut self) {
        self.job = None;
        self.pool = Weak::new();
    }
}

impl Retry {
    fn dispatch(&mut self) {
        let Some(job) = self.job.take() else {
            return;
        };
        match self.pool.upgrade() {
            Some(shared) => shared.dispatch_retry(job),
            None => log::debug!("Dropping parked job: its pool is gone."),
        }
    }
}

impl Drop for Retry {
    fn drop(&mut self) {
        self.dispatch();
    }
}

struct Shared {
    name: String,
    config: WorkerPoolConfig,
    state: Mutex<State>,
    handoff_tx: flume::Sender<Handoff>,
    handoff_rx: flume::Receiver<Handoff>,
    reposter: Option<Looper>,
    observer: RwLock<Option<Arc<dyn ExecuteObserver>>>,
    tracker: Option<Arc<RunningSet>>,
    retries: BoundedPool<Retry>,
    thread_seq: AtomicUsize,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observer(&self) -> Option<Arc<dyn ExecuteObserver>> {
        self.observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn dispatch(self: &Arc<Self>, job: Job, front: bool) -> Result<(), ExecError> {
        let mut state = self.state();
        if state.shutdown {
            return Err(ExecError::Shutdown {
                pool: self.name.clone(),
            });
        }

        if state.idle > 0 {
            state.idle -= 1;
            // Sent under the lock so a worker timing out can observe it.
            let _ = self.handoff_tx.send(Handoff::Run(job));
            return Ok(());
        }

        if state.workers < self.config.max_threads() {
            state.workers += 1;
            return match self.spawn_worker(job) {
                Ok(()) => Ok(()),
                Err((error, job)) => {
                    state.workers -= 1;
                    if state.workers == 0 {
                        return Err(error);
                    }
                    log::warn!("[{}] {error}; parking the job instead.", self.name);
                    state.pending.push_back(job);
                    Ok(())
                }
            };
        }

        log::trace!(
            "[{}] All {} workers busy; parking job ({} pending).",
            self.name,
            state.workers,
            state.pending.len() + 1
        );
        if front {
            state.pending.push_front(job);
        } else {
            state.pending.push_back(job);
        }
        Ok(())
    }

    fn dispatch_retry(self: &Arc<Self>, job: Job) {
        let task = job.task().cloned();
        if let Err(error) = self.dispatch(job, true) {
            log::warn!("[{}] Parked job dropped: {error}", self.name);
            if let (Some(tracker), Some(task)) = (&self.tracker, task) {
                tracker.remove(&task);
            }
        }
    }

    fn spawn_worker(self: &Arc<Self>, first: Job) -> Result<(), (ExecError, Job)> {
        let number = self.thread_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let thread_name = format!("{}-thread-{number}", self.name);
        let info = WorkerInfo {
            pool: self.name.clone(),
            thread_name: thread_name.clone(),
            priority: self.config.priority,
            priority_applied: false,
        };

        // The job waits in a slot so it can be recovered if the thread never starts.
        let slot = Arc::new(Mutex::new(Some(first)));
        let handed = Arc::clone(&slot);
        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let mut info = info;
                info.priority_applied = info.priority.apply_to_current_thread();
                CURRENT_WORKER.with(|current| *current.borrow_mut() = Some(info));
                let first = handed.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(first) = first {
                    shared.worker_loop(first);
                }
            });

        match spawned {
            Ok(_) => {
                log::trace!("[{}] Spawned worker '{thread_name}'.", self.name);
                Ok(())
            }
            Err(source) => {
                let error = ExecError::Spawn {
                    name: thread_name,
                    source,
                };
                let job = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                Err((error, job.unwrap_or_else(|| Job::new(|| {}))))
            }
        }
    }

    fn worker_loop(self: &Arc<Self>, first: Job) {
        let mut next = Some(first);
        while let Some(job) = next.take() {
            self.run_job(job);
            if !self.become_idle() {
                break;
            }
            next = self.await_handoff();
        }
        log::trace!(
            "[{}] Worker '{}' exiting.",
            self.name,
            thread::current().name().unwrap_or("<unnamed>")
        );
    }

    fn run_job(&self, job: Job) {
        let task = job.task().cloned();
        if let Some(task) = &task {
            if task.is_cancelled() {
                log::debug!("[{}] Skipping cancelled task #{}.", self.name, task.id());
                self.untrack(task);
                return;
            }
            if let Some(tracker) = &self.tracker {
                tracker.insert(Arc::clone(task));
            }
        }

        let info = TaskInfo {
            id: job.id(),
            thread: thread::current()
                .name()
                .unwrap_or("<unnamed>")
                .to_string(),
        };
        let observer = self.observer();
        if let Some(observer) = &observer {
            notify(|| observer.on_before_execute(&info));
        }

        let failure = match panic::catch_unwind(AssertUnwindSafe(|| job.run())) {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(TaskFailure::Error(error)),
            Err(payload) => Some(TaskFailure::Panic(panic_message(payload.as_ref()))),
        };
        if let Some(failure) = &failure {
            log::error!("[{}] {info} failed: {failure}", self.name);
        }

        if let Some(task) = &task {
            self.untrack(task);
        }
        if let Some(observer) = &observer {
            notify(|| observer.on_after_execute(&info, failure.as_ref()));
        }
    }

    fn untrack(&self, task: &Arc<dyn Task>) {
        if let Some(tracker) = &self.tracker {
            tracker.remove(task);
        }
    }

    /// Marks the calling worker idle and hands one parked job to the reposter.
    /// Returns `false` when the worker should exit instead.
    fn become_idle(self: &Arc<Self>) -> bool {
        let parked = {
            let mut state = self.state();
            if state.shutdown {
                state.workers = state.workers.saturating_sub(1);
                return false;
            }
            state.idle += 1;
            state.pending.pop_front()
        };

        if let Some(job) = parked {
            self.reschedule(job);
        }
        true
    }

    fn await_handoff(&self) -> Option<Job> {
        match self.handoff_rx.recv_timeout(self.config.keep_alive()) {
            Ok(Handoff::Run(job)) => Some(job),
            Ok(Handoff::Exit) => {
                let mut state = self.state();
                state.workers = state.workers.saturating_sub(1);
                None
            }
            Err(_) => {
                let mut state = self.state();
                // A dispatcher may have picked this worker right before the
                // timeout fired.
                match self.handoff_rx.try_recv() {
                    Ok(Handoff::Run(job)) => Some(job),
                    Ok(Handoff::Exit) => {
                        state.workers = state.workers.saturating_sub(1);
                        None
                    }
                    Err(_) => {
                        state.idle = state.idle.saturating_sub(1);
                        state.workers = state.workers.saturating_sub(1);
                        log::trace!(
                            "[{}] Idle worker reclaimed ({} left).",
                            self.name,
                            state.workers
                        );
                        None
                    }
                }
            }
        }
    }

    fn reschedule(self: &Arc<Self>, job: Job) {
        if let (Some(tracker), Some(task)) = (&self.tracker, job.task()) {
            tracker.insert(Arc::clone(task));
        }

        let Some(reposter) = &self.reposter else {
            self.dispatch_retry(job);
            return;
        };

        let mut retry = self.retries.obtain();
        retry.job = Some(job);
        retry.pool = Arc::downgrade(self);
        // On failure the closure is dropped and `Retry::drop` dispatches in place.
        let _ = reposter.post(move || {
            let mut retry = retry;
            retry.dispatch();
            if let Some(shared) = retry.pool.upgrade() {
                shared.retries.recycle(retry);
            }
        });
    }
}

fn notify(hook: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(hook)) {
        log::error!(
            "Execute observer panicked: {}",
            panic_message(payload.as_ref())
        );
    }
}

/// A bounded-concurrency executor with a pending queue for overflow work.
///
/// Dropping the pool shuts it down; workers finish their current job and exit.
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Creates a pool with no threads running yet.
    ///
    /// ## Arguments
    /// * `config` - thread limit, keep-alive window, priority and naming.
    /// * `reposter` - the single-threaded looper parked jobs are re-posted
    ///   through. With `None` they are dispatched from the finishing worker.
    pub fn new(config: WorkerPoolConfig, reposter: Option<Looper>) -> Self {
        Self::build(config, reposter, None)
    }

    pub(crate) fn with_tracker(
        config: WorkerPoolConfig,
        reposter: Option<Looper>,
        tracker: Arc<RunningSet>,
    ) -> Self {
        Self::build(config, reposter, Some(tracker))
    }

    fn build(
        config: WorkerPoolConfig,
        reposter: Option<Looper>,
        tracker: Option<Arc<RunningSet>>,
    ) -> Self {
        let number = POOL_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{number}", config.prefix());
        let (handoff_tx, handoff_rx) = flume::unbounded();
        let retry_capacity = NonZeroUsize::new(RETRY_POOL_SIZE).unwrap_or(NonZeroUsize::MIN);

        log::debug!(
            "Worker pool '{name}' created (max_threads: {}, keep_alive: {:?}).",
            config.max_threads(),
            config.keep_alive()
        );

        Self {
            shared: Arc::new(Shared {
                name,
                config,
                state: Mutex::new(State::default()),
                handoff_tx,
                handoff_rx,
                reposter,
                observer: RwLock::new(None),
                tracker,
                retries: BoundedPool::recyclable(
                    || Retry {
                        job: None,
                        pool: Weak::new(),
                    },
                    retry_capacity,
                ),
                thread_seq: AtomicUsize::new(0),
            }),
        }
    }

    /// The pool's name, the prefix of all its worker thread names.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The configuration this pool was built with.
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.shared.config
    }

    /// Runs `work` on a worker, now or once a slot frees up.
    ///
    /// Plain closures have no identity: once parked, only
    /// [`remove_all`](Self::remove_all) can drop them. Use
    /// [`submit`](Self::submit) for work that must be removable or cancelable.
    pub fn execute<F>(&self, work: F) -> Result<(), ExecError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.execute_job(Job::new(work))
    }

    /// Like [`execute`](Self::execute); an error is reported as a task failure.
    pub fn execute_fallible<F>(&self, work: F) -> Result<(), ExecError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.execute_job(Job::fallible(work))
    }

    /// Submits a cancelable task.
    pub fn submit(&self, task: Arc<dyn Task>) -> Result<(), ExecError> {
        self.execute_job(Job::tracked(task))
    }

    /// Submits any [`Job`]. Only fails once the pool is shut down or when no
    /// thread at all could be started.
    pub fn execute_job(&self, job: Job) -> Result<(), ExecError> {
        self.shared.dispatch(job, false)
    }

    /// Removes the parked [`Task`] with `id` before it starts.
    ///
    /// Only submitted tasks carry an id; parked plain closures are never
    /// matched. Running tasks are unaffected.
    ///
    /// ## Returns
    /// `true` if a parked task was removed.
    pub fn remove(&self, id: TaskId) -> bool {
        self.take_pending(id).is_some()
    }

    /// Drops every parked job and returns how many there were.
    pub fn remove_all(&self) -> usize {
        let drained: Vec<Job> = self.shared.state().pending.drain(..).collect();
        drained.len()
    }

    /// Number of parked jobs.
    pub fn pending_count(&self) -> usize {
        self.shared.state().pending.len()
    }

    /// Number of live worker threads, busy or idle.
    pub fn worker_count(&self) -> usize {
        self.shared.state().workers
    }

    /// Number of workers waiting for work.
    pub fn idle_count(&self) -> usize {
        self.shared.state().idle
    }

    /// Installs or clears the execution observer.
    pub fn set_observer(&self, observer: Option<Arc<dyn ExecuteObserver>>) {
        *self
            .shared
            .observer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = observer;
    }

    /// Stops accepting work, drops parked jobs and releases idle workers.
    /// Busy workers exit after their current job.
    pub fn shutdown(&self) {
        let dropped = {
            let mut state = self.shared.state();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            for _ in 0..state.idle {
                let _ = self.shared.handoff_tx.send(Handoff::Exit);
            }
            state.idle = 0;
            state.pending.drain(..).collect::<Vec<_>>()
        };
        log::debug!(
            "Worker pool '{}' shut down ({} parked jobs dropped).",
            self.shared.name,
            dropped.len()
        );
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.shared.state().shutdown
    }

    pub(crate) fn take_pending(&self, id: TaskId) -> Option<Job> {
        let mut state = self.shared.state();
        let index = state.pending.iter().position(|job| job.id() == Some(id))?;
        state.pending.remove(index)
    }

    pub(crate) fn take_pending_tracked(&self) -> Vec<Arc<dyn Task>> {
        let mut state = self.shared.state();
        let (tracked, plain): (VecDeque<Job>, VecDeque<Job>) = state
            .pending
            .drain(..)
            .partition(|job| job.task().is_some());
        state.pending = plain;
        tracked.into_iter().filter_map(|job| job.task().cloned()).collect()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state();
        f.debug_struct("WorkerPool")
            .field("name", &self.shared.name)
            .field("workers", &state.workers)
            .field("idle", &state.idle)
            .field("pending", &state.pending.len())
            .field("shutdown", &state.shutdown)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskFn;
    use std::time::Duration;

    fn small_pool(max_threads: usize) -> WorkerPool {
        let config = WorkerPoolConfig {
            max_threads,
            name_prefix: Some("test-pool".to_string()),
            ..WorkerPoolConfig::default()
        };
        WorkerPool::new(config, None)
    }

    #[test]
    fn work_runs_on_named_worker_with_metadata() {
        let pool = small_pool(2);
        let (tx, rx) = flume::unbounded();

        pool.execute(move || {
            tx.send(current_worker()).unwrap();
        })
        .unwrap();

        let info = rx
            .recv_timeout(Duration::from_secs(2))
            .unwrap()
            .expect("should run on a pool worker");
        assert_eq!(info.pool, pool.name());
        assert!(info.thread_name.starts_with(&format!("{}-thread-", pool.name())));
        assert_eq!(info.priority, ThreadPriority::Normal);
        assert!(info.priority_applied);
        assert!(current_worker().is_none());
    }

    #[test]
    fn workers_run_whether_or_not_the_os_accepts_the_priority() {
        for priority in [ThreadPriority::Background, ThreadPriority::High] {
            let config = WorkerPoolConfig {
                max_threads: 1,
                priority,
                ..WorkerPoolConfig::default()
            };
            let pool = WorkerPool::new(config, None);
            let (tx, rx) = flume::unbounded();

            pool.execute(move || tx.send(current_worker()).unwrap()).unwrap();

            let info = rx
                .recv_timeout(Duration::from_secs(2))
                .unwrap()
                .expect("should run on a pool worker");
            assert_eq!(info.priority, priority);
        }
    }

    #[test]
    fn overflow_is_parked_then_drained() {
        let pool = small_pool(1);
        let (gate_tx, gate_rx) = flume::bounded::<()>(0);
        let (done_tx, done_rx) = flume::unbounded();

        pool.execute(move || {
            let _ = gate_rx.recv();
        })
        .unwrap();
        for value in 0..3 {
            let done_tx = done_tx.clone();
            pool.execute(move || done_tx.send(value).unwrap()).unwrap();
        }
        assert_eq!(pool.pending_count(), 3);
        assert_eq!(pool.worker_count(), 1);

        drop(gate_tx);
        let order: Vec<i32> = (0..3)
            .map(|_| done_rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(pool.worker_count(), 1);
    }

    #[test]
    fn remove_drops_parked_task_only() {
        let pool = small_pool(1);
        let (gate_tx, gate_rx) = flume::bounded::<()>(0);
        let (ran_tx, ran_rx) = flume::unbounded();

        pool.execute(move || {
            let _ = gate_rx.recv();
        })
        .unwrap();
        let parked = ran_tx.clone();
        pool.submit(TaskFn::new(11, move |_| {
            parked.send(11)?;
            Ok(())
        }))
        .unwrap();
        pool.submit(TaskFn::new(12, move |_| {
            ran_tx.send(12)?;
            Ok(())
        }))
        .unwrap();

        assert!(pool.remove(11));
        assert!(!pool.remove(11));
        drop(gate_tx);

        assert_eq!(ran_rx.recv_timeout(Duration::from_secs(2)).unwrap(), 12);
        assert!(ran_rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn plain_jobs_are_only_dropped_by_remove_all() {
        let pool = small_pool(1);
        let (gate_tx, gate_rx) = flume::bounded::<()>(0);
        let (ran_tx, ran_rx) = flume::unbounded();

        pool.execute(move || {
            let _ = gate_rx.recv();
        })
        .unwrap();
        let plain = ran_tx.clone();
        pool.execute(move || plain.send(0).unwrap()).unwrap();
        pool.submit(TaskFn::new(0, move |_| {
            ran_tx.send(1)?;
            Ok(())
        }))
        .unwrap();

        assert!(pool.remove(0), "the task with id 0 is removable");
        assert!(!pool.remove(0), "the plain closure is never matched by id");
        assert_eq!(pool.pending_count(), 1);

        assert_eq!(pool.remove_all(), 1);
        drop(gate_tx);
        assert!(ran_rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn failing_work_does_not_kill_the_worker() {
        let pool = small_pool(1);
        let (tx, rx) = flume::unbounded();

        pool.execute(|| panic!("boom")).unwrap();
        pool.execute_fallible(|| anyhow::bail!("nope")).unwrap();
        pool.execute(move || tx.send("still alive").unwrap()).unwrap();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            "still alive"
        );
    }

    #[test]
    fn shutdown_rejects_new_work() {
        let pool = small_pool(2);
        pool.shutdown();
        assert!(pool.is_shutdown());
        assert!(matches!(
            pool.execute(|| {}),
            Err(ExecError::Shutdown { .. })
        ));
    }

    #[test]
    fn parked_jobs_go_through_the_reposter() {
        let looper = Looper::spawn("test-reposter").unwrap();
        let config = WorkerPoolConfig {
            max_threads: 1,
            ..WorkerPoolConfig::default()
        };
        let pool = WorkerPool::new(config, Some(looper.clone()));
        let (tx, rx) = flume::unbounded();

        for value in 0..5 {
            let tx = tx.clone();
            pool.execute(move || tx.send(value).unwrap()).unwrap();
        }

        let mut seen: Vec<i32> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);

        looper.quit();
        looper.join().unwrap();
    }
}
