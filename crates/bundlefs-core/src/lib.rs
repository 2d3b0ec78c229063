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

//! # BundleFS Core
//!
//! Foundational crate containing the manifest data model, the collaborator
//! traits and the small runtime primitives that the rest of the workspace is
//! built on.
//!
//! Nothing in this crate performs I/O on its own: fetching, decoding and the
//! bundle lifecycle live in `bundlefs-io` and `bundlefs-agents`.

#![warn(missing_docs)]

pub mod config;
pub mod content;
pub mod error;
pub mod event;
pub mod graph;
pub mod listener;
pub mod manifest;
pub mod source;
pub mod subscription;
pub mod task;
pub mod telemetry;

pub use config::ProviderConfig;
pub use error::{ConfigError, ManifestError};
pub use manifest::{BundleInfo, BundleKind, Manifest, ManifestDocument, PathTransform};
pub use subscription::Completion;
