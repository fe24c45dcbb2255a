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

use anyhow::{Context, Result};
use courier_bus::BusConfig;
use courier_exec::WorkerPoolConfig;
use serde::Deserialize;
use std::path::Path;

/// Everything needed to build a [`Runtime`](crate::Runtime).
///
/// Every field has a default, so a config file only lists what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Name of the main looper thread.
    pub main_thread_name: String,
    /// The shared worker pool.
    pub worker_pool: WorkerPoolConfig,
    /// The event bus.
    pub bus: BusConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            main_thread_name: "courier-main".to_string(),
            worker_pool: WorkerPoolConfig::default(),
            bus: BusConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid runtime configuration")
    }

    /// Reads and parses a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read runtime configuration {}", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("Failed to load runtime configuration {}", path.display()))
    }
}
