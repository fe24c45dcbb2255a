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

//! # Courier Cache
//!
//! A reference-counted resource cache bounded by bytes ([`ResourceCache`]),
//! and a [`ResourceLoader`] that fills it from a [`ResourceSource`] on the
//! worker pool, coalescing concurrent requests and delivering results on the
//! main looper.

#![warn(missing_docs)]

mod cache;
mod loader;

pub use self::cache::{CacheConfig, Resource, ResourceCache};
pub use self::loader::{LoadError, LoadStatus, ResourceLoader, ResourceSource};
