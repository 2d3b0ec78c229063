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

//! # BundleFS Agents
//!
//! The bundle lifecycle: a registry of reference-counted bundles with
//! transitive dependency acquisition, weakly cached asset and file-system
//! handles, and the [`Provider`] that ties them to the download scheduler.
//!
//! Everything here lives on one owning thread.

pub mod asset_agent;
pub mod bundle_agent;
pub mod provider;

pub use asset_agent::{Asset, AssetHandle, FileSystem, FileSystemHandle, WeakCache};
pub use bundle_agent::{Bundle, BundleGuard, BundleRegistry, BundleState};
pub use provider::{Dispatcher, Provider, ProviderBuilder};
