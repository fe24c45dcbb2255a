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
use std::fmt;

/// Decides which thread runs a subscriber callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadMode {
    /// On the posting thread, synchronously.
    Direct,
    /// On the main looper. Inline when posted from it without delay.
    Main,
    /// On the shared worker pool, never on the posting or main thread.
    Async,
    /// One at a time on the worker pool, in order. An event for a
    /// (subscriber, token) pair already queued is discarded.
    Single,
    /// On a background thread created on demand. Only used when there is a
    /// delay or the poster is the main thread; otherwise inline.
    Dedicated,
    /// One at a time on the worker pool, in order.
    Sequence,
    /// Like [`Sequence`](ThreadMode::Sequence) when posted from the main
    /// thread; inline otherwise.
    Background,
}

impl ThreadMode {
    /// Number of modes.
    pub const COUNT: usize = 7;

    /// Every mode, in declaration order.
    pub const ALL: [ThreadMode; Self::COUNT] = [
        ThreadMode::Direct,
        ThreadMode::Main,
        ThreadMode::Async,
        ThreadMode::Single,
        ThreadMode::Dedicated,
        ThreadMode::Sequence,
        ThreadMode::Background,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Returns `true` for the modes that honour a posting delay.
    pub fn supports_delay(self) -> bool {
        matches!(self, ThreadMode::Main | ThreadMode::Dedicated)
    }
}

impl fmt::Display for ThreadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThreadMode::Direct => "direct",
            ThreadMode::Main => "main",
            ThreadMode::Async => "async",
            ThreadMode::Single => "single",
            ThreadMode::Dedicated => "dedicated",
            ThreadMode::Sequence => "sequence",
            ThreadMode::Background => "background",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_cover_every_slot() {
        for (expected, mode) in ThreadMode::ALL.iter().enumerate() {
            assert_eq!(mode.index(), expected);
        }
    }

    #[test]
    fn modes_parse_from_snake_case() {
        let mode: ThreadMode = serde_json::from_str(r#""dedicated""#).unwrap();
        assert_eq!(mode, ThreadMode::Dedicated);
        assert_eq!(mode.to_string(), "dedicated");
    }
}
