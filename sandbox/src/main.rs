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
use courier::cache::LoadStatus;
use courier::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
enum MatchEvent {
    Goal { team: String, minute: u8 },
    Whistle(&'static str),
}

/// Counts goals and reports every event it sees.
#[derive(Default)]
struct Scoreboard {
    goals: Mutex<HashMap<String, u32>>,
}

impl Subscriber<MatchEvent> for Scoreboard {
    fn on_event(&self, token: Token, event: MatchEvent) -> anyhow::Result<()> {
        let thread_name = thread::current().name().unwrap_or("<unnamed>").to_string();
        if let MatchEvent::Goal { team, minute } = &event {
            let mut goals = self.goals.lock().unwrap_or_else(PoisonError::into_inner);
            *goals.entry(team.clone()).or_default() += 1;
            log::info!("[{thread_name}] {token}: {team} scores at {minute}'");
        } else {
            log::info!("[{thread_name}] {token}: {event:?}");
        }
        Ok(())
    }
}

struct Commentator;

impl Commentator {
    fn announce(&self, token: Token, event: MatchEvent) -> anyhow::Result<()> {
        log::info!("Commentary on {token}: {event:?}");
        Ok(())
    }
}

struct Crest {
    team: String,
    pixels: Vec<u8>,
}

impl Resource for Crest {
    fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

fn goal(team: &str, minute: u8) -> MatchEvent {
    MatchEvent::Goal {
        team: team.to_string(),
        minute,
    }
}

fn dispatch_modes(runtime: &Runtime<MatchEvent>) -> Result<()> {
    let scoreboard = Arc::new(Scoreboard::default());
    let bus = runtime.bus();
    let token = bus.register(&scoreboard);
    let commentator = Arc::new(Commentator);
    let commentary = bus.register_with(&commentator, Commentator::announce);

    for (minute, mode) in (10u8..).step_by(10).zip(ThreadMode::ALL) {
        bus.post(token, mode, goal("Home", minute))?;
    }
    bus.post_delayed(
        commentary,
        ThreadMode::Main,
        Duration::from_millis(50),
        MatchEvent::Whistle("half time"),
    )?;
    bus.post_delayed(
        commentary,
        ThreadMode::Dedicated,
        Duration::from_millis(20),
        MatchEvent::Whistle("water break"),
    )?;

    // The second post is dropped if the first is still queued.
    bus.post(token, ThreadMode::Single, goal("Away", 88))?;
    bus.post(token, ThreadMode::Single, goal("Away", 89))?;

    let settled = bus.run_on_main_thread_blocking(|| "main thread drained")?;
    log::info!("{settled}");
    thread::sleep(Duration::from_millis(100));

    let goals = scoreboard
        .goals
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    log::info!("Final tally: {goals:?}");

    bus.unregister(commentary);
    bus.unregister(token);
    Ok(())
}

fn cancellation(runtime: &Runtime<MatchEvent>) -> Result<()> {
    let workers = runtime.workers();
    let (started_tx, started_rx) = flume::bounded(1);
    let replay = TaskFn::new(1, move |token| {
        let _ = started_tx.send(());
        let mut frame = 0u64;
        loop {
            token.check()?;
            if frame % 50 == 0 {
                log::debug!("Rendering replay frame {frame}");
            }
            frame += 1;
            thread::sleep(Duration::from_millis(2));
        }
    });
    workers.submit(replay)?;
    started_rx
        .recv_timeout(WAIT)
        .context("Replay task never started")?;

    let found = workers.cancel(1, false);
    log::info!("Replay cancelled while running: {found}");
    Ok(())
}

fn resource_loading(runtime: &Runtime<MatchEvent>) -> Result<()> {
    let cache = Arc::new(ResourceCache::new(64 * 1024));
    let source = |team: &String, _token: &CancelToken| -> anyhow::Result<Option<Crest>> {
        thread::sleep(Duration::from_millis(10));
        Ok(Some(Crest {
            team: team.clone(),
            pixels: vec![0; 4 * 32 * 32],
        }))
    };
    let loader = ResourceLoader::new(
        Arc::clone(&cache),
        source,
        Arc::clone(runtime.workers()),
        runtime.main_looper().clone(),
    );

    let (loaded_tx, loaded_rx) = flume::unbounded();
    for team in ["Home", "Away", "Home"] {
        let loaded_tx = loaded_tx.clone();
        let status = loader.load(team.to_string(), move |_, crest| {
            let _ = loaded_tx.send(crest.map(|crest| crest.team.clone()));
        })?;
        log::info!("Crest for {team}: {status:?}");
    }
    for _ in 0..3 {
        let crest = loaded_rx.recv_timeout(WAIT)?;
        log::info!("Crest delivered: {crest:?}");
    }

    let status = loader.load("Home".to_string(), |_, _| {})?;
    anyhow::ensure!(status == LoadStatus::Cached, "Crest was not cached");
    log::info!("Cache holds {} crests ({} bytes).", cache.len(), cache.size());
    loader.shutdown();
    Ok(())
}

fn main() -> Result<()> {
    init_logging();

    let config = match std::env::args().nth(1) {
        Some(path) => RuntimeConfig::from_path(path)?,
        None => RuntimeConfig::default(),
    };
    let runtime: Runtime<MatchEvent> = Runtime::new(config)?;

    dispatch_modes(&runtime)?;
    cancellation(&runtime)?;
    resource_loading(&runtime)?;

    runtime.shutdown()
}
