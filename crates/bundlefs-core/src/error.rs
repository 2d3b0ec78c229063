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

//! Error types shared across the workspace.
//!
//! Only failures that must reach the top-level caller are modelled as errors.
//! Unresolvable assets, missing bundles and exhausted downloads are represented
//! by sentinel handles in `bundlefs-agents` instead.

use std::path::PathBuf;
use thiserror::Error;

/// An error raised while acquiring, parsing or validating a manifest.
///
/// Any of these is fatal for the manifest generation being loaded and is
/// surfaced to the caller of `Provider::open` without an internal retry.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// No origin produced a manifest document.
    #[error("manifest unavailable: {0}")]
    Unavailable(String),

    /// The manifest bytes do not hash to the published checksum.
    #[error("manifest checksum mismatch (expected {expected}, got {actual})")]
    ChecksumMismatch {
        /// The checksum published next to the manifest.
        expected: String,
        /// The checksum of the bytes that were received.
        actual: String,
    },

    /// The document could not be parsed.
    #[error("malformed manifest document: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Two bundles share a name.
    #[error("bundle '{0}' is declared more than once")]
    DuplicateBundle(String),

    /// An asset path is listed by more than one bundle.
    #[error("asset '{path}' is listed by both '{first}' and '{second}'")]
    DuplicateAsset {
        /// The asset path (after path transformation).
        path: String,
        /// The bundle that listed it first.
        first: String,
        /// The bundle that listed it again.
        second: String,
    },

    /// A bundle names a dependency that is not in the manifest.
    #[error("bundle '{bundle}' depends on unknown bundle '{dependency}'")]
    UnknownDependency {
        /// The dependent bundle.
        bundle: String,
        /// The missing dependency name.
        dependency: String,
    },

    /// The dependency graph contains a cycle.
    #[error("cyclic dependency between bundles {0:?}")]
    CyclicDependency(Vec<String>),

    /// Local manifest storage failed.
    #[error("manifest I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// An error raised while reading a [`ProviderConfig`](crate::ProviderConfig) file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config '{path}': {source}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected schema.
    #[error("failed to parse config '{path}': {source}")]
    Parse {
        /// Path of the file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}
