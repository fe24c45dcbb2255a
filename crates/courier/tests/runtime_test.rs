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

//! Runtime wiring: every part shares one main thread and one pool.

use anyhow::Result;
use courier::exec::current_worker;
use courier::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

struct Forward(flume::Sender<(String, Option<String>)>);

impl Subscriber<String> for Forward {
    fn on_event(&self, _token: Token, args: String) -> anyhow::Result<()> {
        self.0
            .send((args, thread::current().name().map(String::from)))?;
        Ok(())
    }
}

fn config(name: &str) -> RuntimeConfig {
    RuntimeConfig {
        main_thread_name: name.to_string(),
        ..RuntimeConfig::default()
    }
}

#[test]
fn test_runtime_routes_main_and_async_modes() -> Result<()> {
    init_logging();
    init_logging();

    let runtime: Runtime<String> = Runtime::new(config("rt-main"))?;
    let (tx, rx) = flume::unbounded();
    let subscriber = Arc::new(Forward(tx));
    let token = runtime.bus().register(&subscriber);

    runtime.bus().post(token, ThreadMode::Main, "to main".to_string())?;
    let (args, thread_name) = rx.recv_timeout(TIMEOUT)?;
    assert_eq!(args, "to main");
    assert_eq!(thread_name.as_deref(), Some("rt-main"));

    runtime.bus().post(token, ThreadMode::Async, "to pool".to_string())?;
    let (_, worker) = rx.recv_timeout(TIMEOUT)?;
    assert!(worker.is_some_and(|name| name.contains("-thread-")));

    runtime.shutdown()?;
    Ok(())
}

#[test]
fn test_caller_thread_can_be_the_main_thread() -> Result<()> {
    let (runtime, runner) = Runtime::<String>::on_current_thread(config("rt-caller"));
    let (tx, rx) = flume::unbounded();
    let subscriber = Arc::new(Forward(tx));
    let token = runtime.bus().register(&subscriber);
    let runtime = Arc::new(runtime);

    let poster = Arc::clone(&runtime);
    let looper = runtime.main_looper().clone();
    let background = thread::spawn(move || -> Result<()> {
        poster
            .bus()
            .post(token, ThreadMode::Main, "hello".to_string())?;
        let (_, thread_name) = rx.recv_timeout(TIMEOUT)?;
        let on_worker = poster
            .workers()
            .pool()
            .execute(|| assert!(current_worker().is_some()));
        looper.quit();
        on_worker?;
        assert_eq!(thread_name.as_deref(), Some("rt-caller"));
        Ok(())
    });

    runner.run();
    background
        .join()
        .map_err(|_| anyhow::anyhow!("background thread panicked"))??;
    Ok(())
}

#[test]
fn test_shutdown_stops_pool_and_main() -> Result<()> {
    let runtime: Runtime<String> = Runtime::new(config("rt-stop"))?;
    let looper = runtime.main_looper().clone();
    let workers = Arc::clone(runtime.workers());

    runtime.shutdown()?;

    assert!(!looper.is_running());
    assert!(matches!(
        workers.execute(|| {}),
        Err(ExecError::Shutdown { .. })
    ));
    Ok(())
}
