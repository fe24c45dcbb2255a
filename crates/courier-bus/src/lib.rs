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

//! # Courier Bus
//!
//! A token-keyed event bus. Subscribers register and get a [`Token`];
//! events posted to that token are delivered on the thread picked by a
//! [`ThreadMode`]:
//!
//! | Mode | Runs on |
//! |---|---|
//! | [`Direct`](ThreadMode::Direct) | the posting thread |
//! | [`Main`](ThreadMode::Main) | the main looper (inline if already there and undelayed) |
//! | [`Async`](ThreadMode::Async) | the executor |
//! | [`Single`](ThreadMode::Single) | the executor, one at a time, duplicates dropped |
//! | [`Dedicated`](ThreadMode::Dedicated) | a background thread when delayed or posted from main, else inline |
//! | [`Sequence`](ThreadMode::Sequence) | the executor, one at a time |
//! | [`Background`](ThreadMode::Background) | like `Sequence` from the main thread, else inline |
//!
//! Each mode's handler is created on first use and lives as long as the bus.
//! Dispatch envelopes are pooled and handed back right after delivery.

#![warn(missing_docs)]

mod bus;
mod config;
mod envelope;
mod error;
mod handlers;
mod mode;
mod sequential;
mod subscriber;
mod table;
mod token;

pub use self::bus::EventBus;
pub use self::config::BusConfig;
pub use self::error::BusError;
pub use self::mode::ThreadMode;
pub use self::subscriber::Subscriber;
pub use self::token::Token;
