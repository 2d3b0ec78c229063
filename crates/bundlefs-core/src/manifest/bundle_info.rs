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

use serde::{Deserialize, Serialize};

/// The packaging format of a bundle, which selects the opener used to turn its
/// bytes into content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleKind {
    /// An engine-specific content archive, decoded by a host-supplied opener.
    ContentArchive,
    /// A zip archive exposed as a read-only file system.
    ZipArchive,
    /// A JSON listing of loose files with their sizes and checksums.
    FileListArchive,
}

/// Immutable description of one bundle in a manifest generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleInfo {
    /// Unique bundle name, also used as its file name on storage and origins.
    pub name: String,
    /// Lower-case hex BLAKE3 digest of the bundle file.
    pub checksum: String,
    /// Size of the bundle file in bytes.
    pub size: u64,
    /// Packaging format.
    pub kind: BundleKind,
    /// Whether the bundle must be locally available before the manifest is
    /// installed.
    #[serde(default)]
    pub startup: bool,
    /// Names of the bundles this one depends on, in declaration order.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Asset paths contained in this bundle.
    #[serde(default)]
    pub assets: Vec<String>,
}

impl BundleInfo {
    /// Returns `true` if `checksum` and `size` describe this bundle's file.
    pub fn matches(&self, checksum: &str, size: u64) -> bool {
        self.size == size && self.checksum.eq_ignore_ascii_case(checksum)
    }
}
