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

//! Acquiring the manifest document from origins, with a local copy.
//!
//! An origin publishes `manifest.json` next to `manifest.checksum`, which holds
//! the hex BLAKE3 digest of the document. The local copy under the storage root
//! is reused whenever it matches the published checksum.

use crate::checksum;
use crate::fetch::join_url;
use bundlefs_core::source::{FetchOptions, Fetcher, ManifestTransport};
use bundlefs_core::{Manifest, ManifestDocument, ManifestError, PathTransform};
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// File name of the manifest document.
pub const MANIFEST_FILE: &str = "manifest.json";
/// File name of the published manifest checksum.
pub const MANIFEST_CHECKSUM_FILE: &str = "manifest.checksum";

/// Fetches and verifies the manifest through a [`Fetcher`].
pub struct OriginManifestTransport {
    fetcher: Arc<dyn Fetcher>,
    options: FetchOptions,
}

impl OriginManifestTransport {
    /// Creates a transport over `fetcher`.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            options: FetchOptions::default(),
        }
    }

    /// Sets the throughput parameters used for manifest transfers.
    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, ManifestError> {
        let mut bytes = Vec::new();
        self.fetcher
            .fetch(url, &mut bytes, &self.options, &AtomicBool::new(false))
            .map_err(|e| ManifestError::Unavailable(e.to_string()))?;
        Ok(bytes)
    }

    fn fetch_from(&self, base: &str, local_root: &Path) -> Result<Vec<u8>, ManifestError> {
        let published = self.fetch(&join_url(base, MANIFEST_CHECKSUM_FILE))?;
        let expected = String::from_utf8_lossy(&published).trim().to_ascii_lowercase();

        let local = local_root.join(MANIFEST_FILE);
        if let Ok(bytes) = fs::read(&local) {
            if checksum::digest(&bytes) == expected {
                log::debug!("Reusing local manifest {}", local.display());
                return Ok(bytes);
            }
        }

        let bytes = self.fetch(&join_url(base, MANIFEST_FILE))?;
        let actual = checksum::digest(&bytes);
        if actual != expected {
            return Err(ManifestError::ChecksumMismatch { expected, actual });
        }
        store_local(local_root, &bytes, &actual)?;
        Ok(bytes)
    }
}

impl ManifestTransport for OriginManifestTransport {
    fn fetch_manifest(&self, urls: &[String], local_root: &Path) -> Result<Vec<u8>, ManifestError> {
        if urls.is_empty() {
            return read_local(local_root);
        }
        let mut last = None;
        for base in urls {
            match self.fetch_from(base, local_root) {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    log::warn!("Manifest from '{base}' unavailable: {e}");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| ManifestError::Unavailable("no origin configured".into())))
    }
}

fn store_local(local_root: &Path, bytes: &[u8], digest: &str) -> Result<(), ManifestError> {
    fs::create_dir_all(local_root)?;
    fs::write(local_root.join(MANIFEST_FILE), bytes)?;
    fs::write(local_root.join(MANIFEST_CHECKSUM_FILE), digest)?;
    Ok(())
}

/// Reads the local copy, verified against its stored checksum.
fn read_local(local_root: &Path) -> Result<Vec<u8>, ManifestError> {
    let bytes = fs::read(local_root.join(MANIFEST_FILE))
        .map_err(|e| ManifestError::Unavailable(format!("no origin and no local manifest: {e}")))?;
    let expected = fs::read_to_string(local_root.join(MANIFEST_CHECKSUM_FILE))?
        .trim()
        .to_ascii_lowercase();
    let actual = checksum::digest(&bytes);
    if actual != expected {
        return Err(ManifestError::ChecksumMismatch { expected, actual });
    }
    Ok(bytes)
}

/// Writes `document` and its checksum into `dir`, the layout served by origins.
///
/// Returns the checksum.
pub fn publish_manifest(dir: &Path, document: &ManifestDocument) -> Result<String, ManifestError> {
    let bytes = document.to_json()?;
    let digest = checksum::digest(&bytes);
    store_local(dir, &bytes, &digest)?;
    Ok(digest)
}

/// Acquires, parses, validates and indexes the manifest.
pub fn load_manifest(
    transport: &dyn ManifestTransport,
    urls: &[String],
    local_root: &Path,
    transform: Option<&PathTransform>,
) -> Result<Manifest, ManifestError> {
    let bytes = transport.fetch_manifest(urls, local_root)?;
    let document = ManifestDocument::from_json(&bytes)?;
    Manifest::build(document, transform)
}
