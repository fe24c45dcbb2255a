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

//! Units of work accepted by the worker pool.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Identity of a cancelable [`Task`].
pub type TaskId = u64;

/// A shared cancellation flag.
///
/// Cancellation is cooperative: [`cancel`](CancelToken::cancel) only records
/// the intent. Long-running work checks the flag at its own pause points
/// and returns early, typically with `token.check()?`.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Calling it more than once is harmless.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns `Err(Cancelled)` once cancellation has been requested.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Returned by [`CancelToken::check`] when the task should stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("task was cancelled")]
pub struct Cancelled;

/// A unit of work with an identity that can be cancelled while queued or running.
///
/// The [`WorkerPoolManager`](crate::WorkerPoolManager) tracks these by id.
pub trait Task: Send + Sync + 'static {
    /// The identity used by `cancel` and `remove`.
    fn id(&self) -> TaskId;

    /// Requests cooperative cancellation.
    fn cancel(&self);

    /// Returns `true` once cancellation has been requested.
    fn is_cancelled(&self) -> bool;

    /// Runs the task. Called at most once by the pool.
    fn run(&self) -> anyhow::Result<()>;
}

type Body = Box<dyn FnOnce(&CancelToken) -> anyhow::Result<()> + Send>;

/// A [`Task`] built from a closure that receives its own [`CancelToken`].
///
/// Returning [`Cancelled`] from the closure counts as a clean early exit,
/// not as a failure.
pub struct TaskFn {
    id: TaskId,
    token: CancelToken,
    body: Mutex<Option<Body>>,
}

impl TaskFn {
    /// Wraps `body` into a shareable task.
    pub fn new<F>(id: TaskId, body: F) -> Arc<Self>
    where
        F: FnOnce(&CancelToken) -> anyhow::Result<()> + Send + 'static,
    {
        Arc::new(Self {
            id,
            token: CancelToken::new(),
            body: Mutex::new(Some(Box::new(body))),
        })
    }

    /// Returns a clone of the task's cancellation token.
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }
}

impl Task for TaskFn {
    fn id(&self) -> TaskId {
        self.id
    }

    fn cancel(&self) {
        self.token.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn run(&self) -> anyhow::Result<()> {
        let body = self
            .body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(body) = body else {
            log::warn!("Task #{} was run twice; ignoring.", self.id);
            return Ok(());
        };

        match body(&self.token) {
            Err(error) if error.is::<Cancelled>() => {
                log::debug!("Task #{} stopped after cancellation.", self.id);
                Ok(())
            }
            other => other,
        }
    }
}

impl fmt::Debug for TaskFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFn")
            .field("id", &self.id)
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// A job accepted by an [`Executor`](crate::Executor).
pub enum Job {
    /// A plain closure. It has no identity and cannot be cancelled.
    Once(Box<dyn FnOnce() -> anyhow::Result<()> + Send>),
    /// A cancelable task tracked by id.
    Tracked(Arc<dyn Task>),
}

impl Job {
    /// Wraps an infallible closure.
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Job::Once(Box::new(move || {
            work();
            Ok(())
        }))
    }

    /// Wraps a closure whose error is reported as a task failure.
    pub fn fallible<F>(work: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Job::Once(Box::new(work))
    }

    /// Wraps a cancelable task.
    pub fn tracked(task: Arc<dyn Task>) -> Self {
        Job::Tracked(task)
    }

    /// The task id, for tracked jobs.
    pub fn id(&self) -> Option<TaskId> {
        self.task().map(|task| task.id())
    }

    /// The underlying task, for tracked jobs.
    pub fn task(&self) -> Option<&Arc<dyn Task>> {
        match self {
            Job::Tracked(task) => Some(task),
            Job::Once(_) => None,
        }
    }

    /// Cancels the job if it is a tracked task. Plain closures ignore it.
    pub fn cancel(&self) {
        if let Some(task) = self.task() {
            task.cancel();
        }
    }

    pub(crate) fn run(self) -> anyhow::Result<()> {
        match self {
            Job::Once(work) => work(),
            Job::Tracked(task) => task.run(),
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Once(_) => f.write_str("Job::Once"),
            Job::Tracked(task) => write!(f, "Job::Tracked(#{})", task.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn token_clones_share_state() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(observer.check().is_ok());

        token.cancel();
        token.cancel();

        assert!(observer.is_cancelled());
        assert_eq!(observer.check(), Err(Cancelled));
    }

    #[test]
    fn task_fn_runs_body_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let task = TaskFn::new(7, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        task.run().unwrap();
        task.run().unwrap();

        assert_eq!(task.id(), 7);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_exit_is_not_a_failure() {
        let task = TaskFn::new(1, |token| {
            token.check()?;
            anyhow::bail!("should have stopped before this point")
        });
        task.cancel();

        assert!(task.is_cancelled());
        assert!(task.run().is_ok());
    }

    #[test]
    fn real_errors_are_kept() {
        let task = TaskFn::new(2, |_| anyhow::bail!("disk on fire"));
        let error = task.run().unwrap_err();
        assert_eq!(error.to_string(), "disk on fire");
    }

    #[test]
    fn job_ids_only_exist_for_tracked_tasks() {
        let plain = Job::new(|| {});
        let tracked = Job::tracked(TaskFn::new(42, |_| Ok(())));
        assert_eq!(plain.id(), None);
        assert_eq!(tracked.id(), Some(42));
    }
}
