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

use crate::error::ExecError;
use crate::pool::WorkerPool;
use crate::task::Job;

/// Anything that accepts [`Job`]s for asynchronous execution.
///
/// The event bus depends on this seam rather than on a concrete pool, so a
/// plain [`WorkerPool`] and a [`WorkerPoolManager`](crate::WorkerPoolManager)
/// are interchangeable behind an `Arc<dyn Executor>`.
pub trait Executor: Send + Sync {
    /// Schedules `job`. Accepted jobs run exactly once.
    fn execute_job(&self, job: Job) -> Result<(), ExecError>;
}

impl Executor for WorkerPool {
    fn execute_job(&self, job: Job) -> Result<(), ExecError> {
        WorkerPool::execute_job(self, job)
    }
}
