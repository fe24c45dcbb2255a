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

use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

/// Opaque identity of one registered subscription.
///
/// Tokens are plain integers so callers can also pick their own (see
/// [`EventBus::register_token`](crate::EventBus::register_token)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(i32);

impl Token {
    /// Wraps a raw value.
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// The raw value.
    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl From<i32> for Token {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out tokens from a counter starting at `i32::MIN`.
///
/// The counter wraps on overflow; the bus skips values still in use.
#[derive(Debug)]
pub(crate) struct TokenSequence {
    last: AtomicI32,
}

impl TokenSequence {
    pub(crate) fn new() -> Self {
        Self::starting_after(i32::MIN)
    }

    pub(crate) fn starting_after(last: i32) -> Self {
        Self {
            last: AtomicI32::new(last),
        }
    }

    pub(crate) fn next(&self) -> Token {
        Token(self.last.fetch_add(1, Ordering::Relaxed).wrapping_add(1))
    }
}
