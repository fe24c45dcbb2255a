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

use serde::Deserialize;
use std::num::NonZeroUsize;
use std::time::Duration;

/// Configuration for an [`EventBus`](crate::EventBus).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Idle dispatch envelopes kept for reuse.
    pub envelope_pool_size: usize,
    /// How long the dedicated thread survives with an empty queue.
    pub dedicated_idle_timeout_ms: u64,
    /// Name prefix of the dedicated thread, followed by `-<n>`.
    pub dedicated_thread_prefix: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            envelope_pool_size: 8,
            dedicated_idle_timeout_ms: 60_000,
            dedicated_thread_prefix: "EventBus-thread".to_string(),
        }
    }
}

impl BusConfig {
    pub(crate) fn envelope_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.envelope_pool_size).unwrap_or(NonZeroUsize::MIN)
    }

    /// The dedicated thread's idle window as a [`Duration`].
    pub fn dedicated_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.dedicated_idle_timeout_ms)
    }
}
