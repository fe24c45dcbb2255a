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

use thiserror::Error;

/// Errors raised by loopers and worker pools.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The looper's thread has exited, so nothing posted to it can run.
    #[error("looper '{name}' is no longer running")]
    LooperClosed {
        /// Name of the looper.
        name: String,
    },
    /// The worker pool no longer accepts work.
    #[error("worker pool '{pool}' has been shut down")]
    Shutdown {
        /// Name of the pool.
        pool: String,
    },
    /// The OS refused to start a thread.
    #[error("failed to spawn thread '{name}': {source}")]
    Spawn {
        /// Name the thread would have had.
        name: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Work run on another thread panicked before producing a result.
    #[error("work panicked: {0}")]
    Panicked(String),
}
