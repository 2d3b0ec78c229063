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

//! Constructor-time configuration of a provider.

use crate::error::ConfigError;
use crate::manifest::PathTransform;
use crate::source::FetchOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound applied to the configured number of concurrent downloads.
pub const MAX_CONCURRENT_TASKS: usize = 4;

/// Configuration for a bundle provider.
///
/// Immutable once the provider is built. Everything except the asset path
/// transform can be read from a JSON file with [`ProviderConfig::from_json_file`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Origin base URLs, tried in order; the last one is retried once the
    /// list is exhausted.
    pub urls: Vec<String>,
    /// Directory where downloaded bundles and the manifest are stored.
    pub local_root: PathBuf,
    /// Requested number of concurrent downloads, clamped to `1..=4`.
    pub concurrent_tasks: usize,
    /// Attempts made for one bundle before the download is reported failed.
    pub max_attempts: u32,
    /// Artificial delay inserted after every transferred chunk, in milliseconds.
    pub artificial_delay_ms: u64,
    /// Transfer chunk size in bytes; `0` selects the fetcher's default.
    pub buffer_size: usize,
    /// Rewrites asset paths before they are used as index or cache keys.
    #[serde(skip)]
    pub path_transform: Option<PathTransform>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            local_root: PathBuf::from("bundles"),
            concurrent_tasks: 3,
            max_attempts: 10,
            artificial_delay_ms: 0,
            buffer_size: 0,
            path_transform: None,
        }
    }
}

impl ProviderConfig {
    /// Creates a configuration for the given origins and storage directory.
    pub fn new(urls: impl IntoIterator<Item = impl Into<String>>, local_root: impl Into<PathBuf>) -> Self {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            local_root: local_root.into(),
            ..Self::default()
        }
    }

    /// Reads a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Sets the asset path transform.
    pub fn with_path_transform(mut self, transform: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.path_transform = Some(Arc::new(transform));
        self
    }

    /// Sets the requested download concurrency.
    pub fn with_concurrent_tasks(mut self, concurrent_tasks: usize) -> Self {
        self.concurrent_tasks = concurrent_tasks;
        self
    }

    /// Sets the per-bundle attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// The effective download concurrency.
    pub fn clamped_concurrency(&self) -> usize {
        self.concurrent_tasks.clamp(1, MAX_CONCURRENT_TASKS)
    }

    /// Applies the configured transform to an asset path.
    pub fn transform_path(&self, asset_path: &str) -> String {
        match &self.path_transform {
            Some(transform) => transform(asset_path),
            None => asset_path.to_owned(),
        }
    }

    /// Throughput parameters handed to every download.
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            buffer_size: self.buffer_size,
            chunk_delay: Duration::from_millis(self.artificial_delay_ms),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("urls", &self.urls)
            .field("local_root", &self.local_root)
            .field("concurrent_tasks", &self.concurrent_tasks)
            .field("max_attempts", &self.max_attempts)
            .field("artificial_delay_ms", &self.artificial_delay_ms)
            .field("buffer_size", &self.buffer_size)
            .field("path_transform", &self.path_transform.is_some())
            .finish()
    }
}
