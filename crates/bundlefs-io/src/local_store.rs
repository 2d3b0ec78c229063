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

//! Bundles stored on local, writable storage.

use crate::checksum;
use bundlefs_core::BundleInfo;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The local bundle directory. A bundle file is named after its bundle.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the bundle file for `name` lives.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Where an in-progress download of `name` is written.
    pub fn partial_path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.part"))
    }

    /// Returns `true` if the stored file matches the bundle's size and checksum.
    pub fn is_valid(&self, info: &BundleInfo) -> bool {
        self.read_valid(info).is_some()
    }

    /// Reads the stored file if it matches the bundle's size and checksum.
    pub fn read_valid(&self, info: &BundleInfo) -> Option<Vec<u8>> {
        let path = self.path_for(&info.name);
        let len = fs::metadata(&path).ok()?.len();
        if len != info.size {
            log::trace!("Local bundle '{}' has size {len}, expected {}", info.name, info.size);
            return None;
        }
        let bytes = fs::read(&path).ok()?;
        if checksum::verify(&bytes, &info.checksum, info.size) {
            Some(bytes)
        } else {
            log::debug!("Local bundle '{}' failed checksum verification", info.name);
            None
        }
    }

    /// Writes `bytes` as the bundle file for `name`, creating directories.
    pub fn write(&self, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.path_for(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundlefs_core::BundleKind;

    fn info_for(name: &str, bytes: &[u8]) -> BundleInfo {
        BundleInfo {
            name: name.to_owned(),
            checksum: checksum::digest(bytes),
            size: bytes.len() as u64,
            kind: BundleKind::ContentArchive,
            startup: false,
            dependencies: Vec::new(),
            assets: Vec::new(),
        }
    }

    #[test]
    fn valid_file_is_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let info = info_for("nested/ui.bundle", b"ui bytes");

        assert!(!store.is_valid(&info));
        store.write(&info.name, b"ui bytes").unwrap();
        assert!(store.is_valid(&info));
        assert_eq!(store.read_valid(&info).as_deref(), Some(&b"ui bytes"[..]));
    }

    #[test]
    fn stale_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let info = info_for("ui", b"version two");

        store.write("ui", b"version one").unwrap();
        assert!(store.read_valid(&info).is_none());

        store.write("ui", b"short").unwrap();
        assert!(!store.is_valid(&info));
    }

    #[test]
    fn partial_path_is_beside_final_path() {
        let store = LocalStore::new("/data/bundles");
        assert_eq!(store.path_for("ui"), PathBuf::from("/data/bundles/ui"));
        assert_eq!(store.partial_path_for("ui"), PathBuf::from("/data/bundles/ui.part"));
    }
}
