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

//! Configuration for the worker pool.

use serde::Deserialize;
use std::time::Duration;
use thread_priority::{
    set_current_thread_priority, ThreadPriority as OsPriority, ThreadPriorityValue,
};

/// Scheduling priority applied to every worker thread of a pool.
///
/// Each worker sets it on its own OS thread when it starts. `Normal` keeps
/// the priority inherited from the spawning thread. Raising the priority
/// usually needs privileges; when the OS refuses, the worker keeps running
/// at its inherited priority and a warning is logged. Tasks can check the
/// outcome through [`current_worker`](crate::current_worker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadPriority {
    /// Work nobody is waiting on.
    Background,
    /// Below the default.
    Low,
    /// The default priority.
    #[default]
    Normal,
    /// Latency-sensitive work.
    High,
}

impl ThreadPriority {
    /// The OS level this priority maps to, or `None` to leave the thread as is.
    pub(crate) fn os_level(self) -> Option<OsPriority> {
        match self {
            ThreadPriority::Background => Some(OsPriority::Min),
            ThreadPriority::Low => ThreadPriorityValue::try_from(25u8)
                .ok()
                .map(OsPriority::Crossplatform),
            ThreadPriority::Normal => None,
            ThreadPriority::High => Some(OsPriority::Max),
        }
    }

    /// Applies the priority to the calling thread.
    ///
    /// ## Returns
    /// `true` if the thread now runs at this priority. `Normal` always
    /// succeeds since nothing has to change.
    pub(crate) fn apply_to_current_thread(self) -> bool {
        let Some(level) = self.os_level() else {
            return true;
        };
        match set_current_thread_priority(level) {
            Ok(()) => true,
            Err(error) => {
                log::warn!(
                    "Keeping inherited priority on '{}', {self:?} refused: {error:?}",
                    std::thread::current().name().unwrap_or("<unnamed>")
                );
                false
            }
        }
    }
}

/// Configuration for a [`WorkerPool`](crate::WorkerPool).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Upper bound on concurrently running worker threads. Clamped to at least 1.
    pub max_threads: usize,
    /// How long an idle worker waits for work before its thread is reclaimed.
    pub keep_alive_ms: u64,
    /// Priority recorded for the pool's workers.
    pub priority: ThreadPriority,
    /// Prefix for worker thread names. Defaults to `"WorkerPool"`.
    pub name_prefix: Option<String>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_threads: 6,
            keep_alive_ms: 60_000,
            priority: ThreadPriority::Normal,
            name_prefix: None,
        }
    }
}

impl WorkerPoolConfig {
    /// Returns the default configuration with a different thread limit.
    pub fn with_max_threads(max_threads: usize) -> Self {
        Self {
            max_threads,
            ..Self::default()
        }
    }

    /// The effective thread limit.
    pub fn max_threads(&self) -> usize {
        self.max_threads.max(1)
    }

    /// The idle keep-alive window as a [`Duration`].
    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    pub(crate) fn prefix(&self) -> &str {
        self.name_prefix.as_deref().unwrap_or("WorkerPool")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.max_threads(), 6);
        assert_eq!(config.keep_alive(), Duration::from_secs(60));
        assert_eq!(config.priority, ThreadPriority::Normal);
        assert_eq!(config.prefix(), "WorkerPool");
    }

    #[test]
    fn priorities_map_to_os_levels() {
        assert_eq!(ThreadPriority::Normal.os_level(), None);
        assert_eq!(ThreadPriority::Background.os_level(), Some(OsPriority::Min));
        assert_eq!(ThreadPriority::High.os_level(), Some(OsPriority::Max));
        assert!(matches!(
            ThreadPriority::Low.os_level(),
            Some(OsPriority::Crossplatform(_))
        ));
    }

    #[test]
    fn normal_priority_leaves_the_thread_alone() {
        let applied = std::thread::spawn(|| ThreadPriority::Normal.apply_to_current_thread())
            .join()
            .unwrap();
        assert!(applied);
    }

    #[test]
    fn refused_priority_is_reported_not_fatal() {
        // Unprivileged processes usually cannot raise priority; either outcome
        // must leave the thread usable.
        let (applied, still_running) = std::thread::spawn(|| {
            let applied = ThreadPriority::High.apply_to_current_thread();
            (applied, 6 * 7)
        })
        .join()
        .unwrap();
        assert_eq!(still_running, 42);
        if applied {
            let current = thread_priority::get_current_thread_priority();
            assert!(current.is_ok());
        }
    }

    #[test]
    fn zero_threads_is_clamped() {
        assert_eq!(WorkerPoolConfig::with_max_threads(0).max_threads(), 1);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: WorkerPoolConfig =
            serde_json::from_str(r#"{ "max_threads": 2, "priority": "background" }"#).unwrap();
        assert_eq!(config.max_threads, 2);
        assert_eq!(config.priority, ThreadPriority::Background);
        assert_eq!(config.keep_alive_ms, 60_000);
    }
}
