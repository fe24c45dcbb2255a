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

use crate::config::RuntimeConfig;
use anyhow::{Context, Result};
use courier_bus::EventBus;
use courier_exec::{Executor, LoopRunner, Looper, WorkerPoolManager};
use std::sync::Arc;

/// One main looper, one worker pool manager and one event bus, wired together.
///
/// Construct it once at startup and hand references to the parts that need
/// it. `A` is the bus payload type.
pub struct Runtime<A> {
    main: Looper,
    workers: Arc<WorkerPoolManager>,
    bus: EventBus<A>,
}

impl<A: Send + 'static> Runtime<A> {
    /// Builds a runtime whose main looper runs on a new thread.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let main = Looper::spawn(config.main_thread_name.clone())
            .context("Failed to start the main looper")?;
        Ok(Self::assemble(config, main))
    }

    /// Builds a runtime whose main looper is driven by the caller.
    ///
    /// Call [`LoopRunner::run`] on the thread that should become the main
    /// thread; it returns once [`shutdown`](Self::shutdown) quits the loop.
    pub fn on_current_thread(config: RuntimeConfig) -> (Self, LoopRunner) {
        let (main, runner) = Looper::new(config.main_thread_name.clone());
        (Self::assemble(config, main), runner)
    }

    fn assemble(config: RuntimeConfig, main: Looper) -> Self {
        let workers = Arc::new(WorkerPoolManager::new(
            config.worker_pool,
            Some(main.clone()),
        ));
        let executor: Arc<dyn Executor> = workers.clone();
        let bus = EventBus::with_config(main.clone(), executor, config.bus);
        log::info!("Courier runtime ready (main thread: '{}').", main.name());
        Self { main, workers, bus }
    }

    /// The event bus.
    pub fn bus(&self) -> &EventBus<A> {
        &self.bus
    }

    /// The main looper.
    pub fn main_looper(&self) -> &Looper {
        &self.main
    }

    /// The worker pool manager shared by the bus and any other client.
    pub fn workers(&self) -> &Arc<WorkerPoolManager> {
        &self.workers
    }

    /// Unregisters every subscriber, stops the pool and the main looper, and
    /// waits for a spawned main thread to finish.
    pub fn shutdown(self) -> Result<()> {
        log::info!("Shutting down the courier runtime.");
        self.bus.unregister_all();
        self.workers.shutdown();
        self.main.quit();
        self.main.join().context("Main looper did not stop cleanly")?;
        Ok(())
    }
}
