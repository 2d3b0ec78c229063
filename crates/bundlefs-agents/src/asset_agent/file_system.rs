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

use crate::bundle_agent::{Bundle, BundleGuard, BundleState};
use bundlefs_core::content::BundleContent;
use bundlefs_core::Completion;
use std::fmt;
use std::rc::Rc;

/// Shared handle to a file system view.
pub type FileSystemHandle = Rc<FileSystem>;

/// A read-only file view over an archive bundle.
///
/// The failure variant stands in for bundles that are absent or not archives:
/// it is loaded from the start and every lookup misses.
pub struct FileSystem {
    name: String,
    bundle: Option<BundleGuard>,
    loaded: Completion<()>,
}

impl FileSystem {
    /// Creates the failure file system for `bundle_name`.
    pub fn failure(bundle_name: impl Into<String>) -> FileSystemHandle {
        Rc::new(Self {
            name: bundle_name.into(),
            bundle: None,
            loaded: Completion::completed(()),
        })
    }

    pub(crate) fn open(bundle: &Rc<Bundle>) -> FileSystemHandle {
        let fs = Rc::new(Self {
            name: bundle.name().to_owned(),
            bundle: Some(BundleGuard::new(Rc::clone(bundle))),
            loaded: Completion::new(),
        });
        let weak = Rc::downgrade(&fs);
        bundle.on_loaded(move |_| {
            if let Some(fs) = weak.upgrade() {
                fs.loaded.complete(());
            }
        });
        fs
    }

    /// The bundle name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `false` for the failure variant.
    pub fn is_valid(&self) -> bool {
        self.bundle.is_some()
    }

    /// Returns `true` once the bundle settled.
    pub fn is_loaded(&self) -> bool {
        self.loaded.is_completed()
    }

    /// Runs `callback` once loaded, or now if already loaded.
    pub fn on_loaded(self: &Rc<Self>, callback: impl FnOnce(&FileSystem) + 'static) {
        let weak = Rc::downgrade(self);
        self.loaded.subscribe(move |_| {
            if let Some(fs) = weak.upgrade() {
                callback(&*fs);
            }
        });
    }

    fn content(&self) -> Option<Rc<dyn BundleContent>> {
        let guard = self.bundle.as_ref()?;
        if guard.bundle().state() != BundleState::Ready {
            return None;
        }
        guard.bundle().content()
    }

    /// Returns `true` if `path` is stored in the archive.
    pub fn exists(&self, path: &str) -> bool {
        self.content().is_some_and(|content| content.contains(path))
    }

    /// Returns a copy of the file at `path`.
    pub fn read_all_bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.content()?.read_bytes(path)
    }

    /// Lists the archive's files.
    pub fn entries(&self) -> Vec<String> {
        self.content().map(|content| content.entries()).unwrap_or_default()
    }
}

impl fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystem")
            .field("name", &self.name)
            .field("valid", &self.is_valid())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
