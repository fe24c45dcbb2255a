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

//! A worker pool that keeps track of the cancelable tasks it runs.

use crate::config::WorkerPoolConfig;
use crate::error::ExecError;
use crate::executor::Executor;
use crate::looper::Looper;
use crate::observer::ExecuteObserver;
use crate::pool::WorkerPool;
use crate::task::{Job, Task, TaskId};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The tracked tasks currently running (or on their way to a worker).
///
/// Used for cancellation lookups only; scheduling never reads it.
#[derive(Default)]
pub(crate) struct RunningSet {
    tasks: Mutex<Vec<Arc<dyn Task>>>,
}

impl RunningSet {
    fn tasks(&self) -> MutexGuard<'_, Vec<Arc<dyn Task>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, task: Arc<dyn Task>) {
        let mut tasks = self.tasks();
        if !tasks.iter().any(|known| Arc::ptr_eq(known, &task)) {
            tasks.push(task);
        }
    }

    pub(crate) fn remove(&self, task: &Arc<dyn Task>) {
        self.tasks().retain(|known| !Arc::ptr_eq(known, task));
    }

    fn find(&self, id: TaskId) -> Option<Arc<dyn Task>> {
        self.tasks().iter().find(|task| task.id() == id).cloned()
    }

    fn snapshot(&self) -> Vec<Arc<dyn Task>> {
        self.tasks().clone()
    }

    fn len(&self) -> usize {
        self.tasks().len()
    }
}

/// A [`WorkerPool`] that can cancel tasks by id, whether parked or running.
pub struct WorkerPoolManager {
    pool: WorkerPool,
    running: Arc<RunningSet>,
}

impl WorkerPoolManager {
    /// Creates a manager over a new pool. See [`WorkerPool::new`].
    pub fn new(config: WorkerPoolConfig, reposter: Option<Looper>) -> Self {
        let running = Arc::new(RunningSet::default());
        Self {
            pool: WorkerPool::with_tracker(config, reposter, Arc::clone(&running)),
            running,
        }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// See [`WorkerPool::execute`].
    pub fn execute<F>(&self, work: F) -> Result<(), ExecError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.execute(work)
    }

    /// Submits a cancelable task.
    pub fn submit(&self, task: Arc<dyn Task>) -> Result<(), ExecError> {
        self.pool.submit(task)
    }

    /// Removes a parked task by id before it starts. Has no effect once it
    /// runs, and never matches plain closures. See [`WorkerPool::remove`].
    pub fn remove(&self, id: TaskId) -> bool {
        self.pool.remove(id)
    }

    /// Drops every parked job.
    pub fn remove_all(&self) -> usize {
        self.pool.remove_all()
    }

    /// Cancels the task with `id`.
    ///
    /// With `include_pending`, a parked task is removed from the queue and
    /// cancelled, so it never runs. Otherwise, or when nothing was parked
    /// under that id, a running task gets its cancellation flag set.
    ///
    /// ## Returns
    /// `true` if a task with that id was found.
    pub fn cancel(&self, id: TaskId, include_pending: bool) -> bool {
        if include_pending {
            if let Some(job) = self.pool.take_pending(id) {
                job.cancel();
                log::debug!("Cancelled parked task #{id}.");
                return true;
            }
        }

        match self.running.find(id) {
            Some(task) => {
                task.cancel();
                log::debug!("Cancellation requested for running task #{id}.");
                true
            }
            None => false,
        }
    }

    /// Cancels every running task, and every parked one with `include_pending`.
    /// Returns how many tasks were signalled.
    pub fn cancel_all(&self, include_pending: bool) -> usize {
        let mut count = 0;
        if include_pending {
            for task in self.pool.take_pending_tracked() {
                task.cancel();
                count += 1;
            }
        }
        for task in self.running.snapshot() {
            task.cancel();
            count += 1;
        }
        count
    }

    /// Number of tracked tasks currently running.
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Returns `true` while a task with `id` is running.
    pub fn is_running(&self, id: TaskId) -> bool {
        self.running.find(id).is_some()
    }

    /// See [`WorkerPool::set_observer`].
    pub fn set_observer(&self, observer: Option<Arc<dyn ExecuteObserver>>) {
        self.pool.set_observer(observer);
    }

    /// See [`WorkerPool::shutdown`].
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

impl Executor for WorkerPoolManager {
    fn execute_job(&self, job: Job) -> Result<(), ExecError> {
        self.pool.execute_job(job)
    }
}

impl fmt::Debug for WorkerPoolManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPoolManager")
            .field("pool", &self.pool)
            .field("running", &self.running.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskFn;
    use std::time::Duration;

    fn manager(max_threads: usize) -> WorkerPoolManager {
        WorkerPoolManager::new(WorkerPoolConfig::with_max_threads(max_threads), None)
    }

    #[test]
    fn cancel_unknown_task_is_a_no_op() {
        let manager = manager(1);
        assert!(!manager.cancel(99, true));
        assert!(!manager.cancel(99, false));
        assert_eq!(manager.cancel_all(true), 0);
    }

    #[test]
    fn running_task_is_tracked_until_it_finishes() {
        let manager = manager(1);
        let (started_tx, started_rx) = flume::unbounded();
        let (gate_tx, gate_rx) = flume::bounded::<()>(0);

        manager
            .submit(TaskFn::new(5, move |_| {
                started_tx.send(())?;
                let _ = gate_rx.recv();
                Ok(())
            }))
            .unwrap();
        started_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(manager.is_running(5));
        assert_eq!(manager.running_count(), 1);

        drop(gate_tx);
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while manager.is_running(5) && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!manager.is_running(5));
    }

    #[test]
    fn cancel_all_reaches_parked_tasks() {
        let manager = manager(1);
        let (gate_tx, gate_rx) = flume::bounded::<()>(0);
        manager
            .execute(move || {
                let _ = gate_rx.recv();
            })
            .unwrap();

        let parked: Vec<_> = (0..3).map(|id| TaskFn::new(id, |_| Ok(()))).collect();
        for task in &parked {
            manager.submit(task.clone()).unwrap();
        }

        assert_eq!(manager.cancel_all(true), 3);
        assert!(parked.iter().all(|task| task.is_cancelled()));
        assert_eq!(manager.pool().pending_count(), 0);
        drop(gate_tx);
    }
}
