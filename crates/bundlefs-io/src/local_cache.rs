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

//! A read-only directory of bundles shipped with the application.

use crate::manifest_transport::MANIFEST_FILE;
use bundlefs_core::source::LocalCache;
use bundlefs_core::{ManifestDocument, ManifestError};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A pre-seeded bundle directory described by its own `manifest.json`.
///
/// Only the checksum and size recorded in that manifest are consulted; the
/// bundle files are not hashed again when queried.
#[derive(Debug, Clone)]
pub struct DirectoryCache {
    root: PathBuf,
    entries: HashMap<String, (String, u64)>,
}

impl DirectoryCache {
    /// Opens the cache at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ManifestError> {
        let root = root.into();
        let bytes = fs::read(root.join(MANIFEST_FILE))?;
        let document = ManifestDocument::from_json(&bytes)?;
        let entries = document
            .bundles
            .into_iter()
            .map(|info| (info.name, (info.checksum, info.size)))
            .collect();
        Ok(Self { root, entries })
    }

    /// An empty cache.
    pub fn empty(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: HashMap::new(),
        }
    }

    /// The cache directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of cached bundles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache lists no bundle.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LocalCache for DirectoryCache {
    fn contains(&self, name: &str, checksum: &str, size: u64) -> bool {
        self.entries
            .get(name)
            .is_some_and(|(cached, cached_size)| *cached_size == size && cached.eq_ignore_ascii_case(checksum))
    }

    fn load_bundle(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.root.join(name))
    }
}
