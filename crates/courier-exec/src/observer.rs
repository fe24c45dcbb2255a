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

//! Hooks observing task execution on worker threads.

use crate::task::TaskId;
use std::any::Any;
use std::fmt;

/// What an [`ExecuteObserver`] learns about the task being run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    /// The task id, for tracked tasks.
    pub id: Option<TaskId>,
    /// Name of the worker thread running it.
    pub thread: String,
}

impl fmt::Display for TaskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "task #{id} on '{}'", self.thread),
            None => write!(f, "task on '{}'", self.thread),
        }
    }
}

/// Why a task did not complete normally.
#[derive(Debug)]
pub enum TaskFailure {
    /// The task returned an error.
    Error(anyhow::Error),
    /// The task panicked; carries the panic message.
    Panic(String),
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Error(error) => write!(f, "{error:#}"),
            TaskFailure::Panic(message) => write!(f, "panicked: {message}"),
        }
    }
}

/// Receives a notification before and after every task a pool runs.
///
/// Both callbacks run on the worker thread, so they should return quickly.
pub trait ExecuteObserver: Send + Sync {
    /// Called right before the task starts.
    fn on_before_execute(&self, _task: &TaskInfo) {}

    /// Called once the task has finished, with its failure if it had one.
    fn on_after_execute(&self, _task: &TaskInfo, _failure: Option<&TaskFailure>) {}
}

/// Extracts the message of a panic payload caught with `catch_unwind`.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
