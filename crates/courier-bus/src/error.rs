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

use crate::token::Token;
use courier_exec::ExecError;
use thiserror::Error;

/// Errors raised by the event bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// An explicit token was registered twice. The first registration is kept.
    #[error("token {token} is already registered")]
    AlreadyRegistered {
        /// The contested token.
        token: Token,
    },
    /// A subscriber callback returned an error.
    #[error("subscriber `{subscriber}` failed handling event {token}")]
    Invocation {
        /// Token of the event.
        token: Token,
        /// Type name of the subscriber.
        subscriber: &'static str,
        /// The callback's error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
    /// A subscriber callback panicked.
    #[error("subscriber for event {token} panicked: {message}")]
    Panicked {
        /// Token of the event.
        token: Token,
        /// The panic message.
        message: String,
    },
    /// The main looper or the executor refused the work.
    #[error(transparent)]
    Exec(#[from] ExecError),
}
