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
use std::cell::RefCell;
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// Opens `ZipArchive` bundles as a read-only set of files.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipArchiveOpener;

impl BundleOpener for ZipArchiveOpener {
    fn open(&self, info: &BundleInfo, bytes: Vec<u8>) -> Result<Box<dyn BundleContent>, OpenError> {
        let archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| OpenError::Corrupt {
            bundle: info.name.clone(),
            reason: e.to_string(),
        })?;
        let mut names: Vec<String> = archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_owned)
            .collect();
        names.sort_unstable();
        log::debug!("Opened zip bundle '{}' ({} entries)", info.name, names.len());
        Ok(Box::new(ZipContent {
            archive: RefCell::new(archive),
            names,
        }))
    }
}

struct ZipContent {
    archive: RefCell<ZipArchive<Cursor<Vec<u8>>>>,
    /// Sorted file entries.
    names: Vec<String>,
}

impl BundleContent for ZipContent {
    fn read_bytes(&self, path: &str) -> Option<Vec<u8>> {
        let mut archive = self.archive.borrow_mut();
        let mut file = archive.by_name(path).ok()?;
        let mut bytes = Vec::with_capacity(file.size() as usize);
        match file.read_to_end(&mut bytes) {
            Ok(_) => Some(bytes),
            Err(e) => {
                log::warn!("Failed to read '{path}' from zip bundle: {e}");
                None
            }
        }
    }

    fn contains(&self, path: &str) -> bool {
        self.names.binary_search_by(|name| name.as_str().cmp(path)).is_ok()
    }

    fn entries(&self) -> Vec<String> {
        self.names.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundlefs_core::BundleKind;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn zip_of(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, bytes) in files {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn info() -> BundleInfo {
        BundleInfo {
            name: "docs".into(),
            checksum: String::new(),
            size: 0,
            kind: BundleKind::ZipArchive,
            startup: false,
            dependencies: Vec::new(),
            assets: Vec::new(),
        }
    }

    #[test]
    fn serves_archive_entries() {
        let bytes = zip_of(&[("readme.txt", b"hello"), ("data/level.json", b"{}")]);
        let content = ZipArchiveOpener.open(&info(), bytes).unwrap();

        assert_eq!(content.entries(), vec!["data/level.json", "readme.txt"]);
        assert!(content.contains("readme.txt"));
        assert!(!content.contains("missing.txt"));
        assert_eq!(content.read_bytes("readme.txt").as_deref(), Some(&b"hello"[..]));
        assert_eq!(content.read_bytes("missing.txt"), None);
    }

    #[test]
    fn garbage_is_corrupt() {
        let err = ZipArchiveOpener.open(&info(), b"not a zip".to_vec()).err().unwrap();
        assert!(matches!(err, OpenError::Corrupt { ref bundle, .. } if bundle == "docs"));
    }
}
