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

use bundlefs_core::content::{BundleContent, BundleOpener, OpenError};
use bundlefs_core::BundleInfo;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::rc::Rc;

/// One loose file listed by a `FileListArchive` bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListEntry {
    /// Relative file name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Hex BLAKE3 digest.
    pub checksum: String,
}

/// The decoded body of a `FileListArchive` bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListManifest {
    /// Listed files.
    #[serde(default)]
    pub files: Vec<FileListEntry>,
}

impl FileListManifest {
    /// Looks up a listed file.
    pub fn get(&self, name: &str) -> Option<&FileListEntry> {
        self.files.iter().find(|entry| entry.name == name)
    }

    /// Sum of the listed file sizes.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|entry| entry.size).sum()
    }
}

/// Opens `FileListArchive` bundles.
///
/// Every asset path of the bundle resolves to the decoded
/// [`FileListManifest`]; raw reads return the JSON document.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileListOpener;

impl BundleOpener for FileListOpener {
    fn open(&self, info: &BundleInfo, bytes: Vec<u8>) -> Result<Box<dyn BundleContent>, OpenError> {
        let list: FileListManifest = serde_json::from_slice(&bytes).map_err(|e| OpenError::Corrupt {
            bundle: info.name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(FileListContent {
            list: Rc::new(list),
            raw: bytes,
            assets: info.assets.clone(),
        }))
    }
}

struct FileListContent {
    list: Rc<FileListManifest>,
    raw: Vec<u8>,
    assets: Vec<String>,
}

impl BundleContent for FileListContent {
    fn read_bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.contains(path).then(|| self.raw.clone())
    }

    fn contains(&self, path: &str) -> bool {
        self.assets.iter().any(|asset| asset == path)
    }

    fn entries(&self) -> Vec<String> {
        self.list.files.iter().map(|entry| entry.name.clone()).collect()
    }

    fn load_object(&self, path: &str, type_id: Option<TypeId>) -> Option<Rc<dyn Any>> {
        if !self.contains(path) {
            return None;
        }
        match type_id {
            None => Some(Rc::clone(&self.list) as Rc<dyn Any>),
            Some(id) if id == TypeId::of::<FileListManifest>() => Some(Rc::clone(&self.list) as Rc<dyn Any>),
            Some(_) => None,
        }
    }
}
