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

//! The delay-ordered message queue shared by every looper thread.

use crate::observer::panic_message;
use flume::RecvTimeoutError;
use std::cmp::Ordering;
use std::collections::binary_heap::PeekMut;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

pub(crate) type Message = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

pub(crate) enum Signal {
    Run { at: Instant, message: Message },
    Quit,
}

pub(crate) enum Next {
    Run(Message),
    Idle,
    Quit,
}

struct Scheduled {
    at: Instant,
    seq: u64,
    message: Message,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed: `BinaryHeap` is a max-heap and the earliest deadline must win.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Receives signals from a channel and releases messages once their deadline
/// has passed. Messages with the same deadline come out in arrival order.
pub(crate) struct MessageQueue {
    rx: flume::Receiver<Signal>,
    due: BinaryHeap<Scheduled>,
    seq: u64,
}

impl MessageQueue {
    pub(crate) fn new(rx: flume::Receiver<Signal>) -> Self {
        Self {
            rx,
            due: BinaryHeap::new(),
            seq: 0,
        }
    }

    /// Blocks until a message is due, the queue is told to quit, or nothing
    /// happened for `idle_timeout` while no delayed message was pending.
    pub(crate) fn next(&mut self, idle_timeout: Option<Duration>) -> Next {
        loop {
            let now = Instant::now();
            if let Some(top) = self.due.peek_mut() {
                if top.at <= now {
                    return Next::Run(PeekMut::pop(top).message);
                }
            }

            let wait = self
                .due
                .peek()
                .map(|top| top.at.saturating_duration_since(now))
                .or(idle_timeout);
            let received = match wait {
                Some(wait) => self.rx.recv_timeout(wait),
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(Signal::Run { at, message }) => self.schedule(at, message),
                Ok(Signal::Quit) => return Next::Quit,
                Err(RecvTimeoutError::Timeout) => {
                    if self.due.is_empty() {
                        return Next::Idle;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Next::Quit,
            }
        }
    }

    /// `true` when nothing is scheduled and nothing is waiting in the channel.
    pub(crate) fn is_drained(&self) -> bool {
        self.due.is_empty() && self.rx.is_empty()
    }

    fn schedule(&mut self, at: Instant, message: Message) {
        self.seq = self.seq.wrapping_add(1);
        self.due.push(Scheduled {
            at,
            seq: self.seq,
            message,
        });
    }
}

/// Runs one message, logging its failure under the owning thread's name.
pub(crate) fn run_message(owner: &str, message: Message) {
    match panic::catch_unwind(AssertUnwindSafe(message)) {
        Ok(Ok(())) => {}
        Ok(Err(error)) => log::error!("[{owner}] Message failed: {error:#}"),
        Err(payload) => log::error!(
            "[{owner}] Message panicked: {}",
            panic_message(payload.as_ref())
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(log: &flume::Sender<u32>, value: u32) -> Message {
        let log = log.clone();
        Box::new(move || -> anyhow::Result<()> {
            log.send(value)?;
            Ok(())
        })
    }

    fn drain(queue: &mut MessageQueue, count: usize) {
        for _ in 0..count {
            match queue.next(Some(Duration::from_secs(1))) {
                Next::Run(message) => run_message("test", message),
                Next::Idle => panic!("queue went idle early"),
                Next::Quit => panic!("queue quit early"),
            }
        }
    }

    #[test]
    fn same_deadline_keeps_arrival_order() {
        let (tx, rx) = flume::unbounded();
        let (log_tx, log_rx) = flume::unbounded();
        let mut queue = MessageQueue::new(rx);
        let at = Instant::now();
        for value in 0..5 {
            tx.send(Signal::Run {
                at,
                message: message(&log_tx, value),
            })
            .unwrap();
        }

        drain(&mut queue, 5);

        assert_eq!(log_rx.try_iter().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn earlier_deadline_runs_first() {
        let (tx, rx) = flume::unbounded();
        let (log_tx, log_rx) = flume::unbounded();
        let mut queue = MessageQueue::new(rx);
        let now = Instant::now();
        tx.send(Signal::Run {
            at: now + Duration::from_millis(40),
            message: message(&log_tx, 2),
        })
        .unwrap();
        tx.send(Signal::Run {
            at: now,
            message: message(&log_tx, 1),
        })
        .unwrap();

        drain(&mut queue, 2);

        assert_eq!(log_rx.try_iter().collect::<Vec<_>>(), vec![1, 2]);
        assert!(now.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn idle_and_quit_are_reported() {
        let (tx, rx) = flume::unbounded();
        let mut queue = MessageQueue::new(rx);

        assert!(matches!(queue.next(Some(Duration::from_millis(10))), Next::Idle));
        assert!(queue.is_drained());

        tx.send(Signal::Quit).unwrap();
        assert!(matches!(queue.next(None), Next::Quit));

        drop(tx);
        assert!(matches!(queue.next(None), Next::Quit));
    }

    #[test]
    fn failing_message_does_not_unwind() {
        run_message("test", Box::new(|| -> anyhow::Result<()> { anyhow::bail!("boom") }));
        run_message("test", Box::new(|| -> anyhow::Result<()> { panic!("kaboom") }));
    }
}
