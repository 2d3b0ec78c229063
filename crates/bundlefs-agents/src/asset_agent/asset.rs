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
use bundlefs_core::listener::AssetAnalyzer;
use bundlefs_core::Completion;
use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Shared handle to an asset.
pub type AssetHandle = Rc<Asset>;

/// A handle to one named piece of content, resolved through one bundle.
///
/// An asset either holds a reference on its bundle until it is disposed, or is
/// *invalid*: its path resolved to no bundle. Invalid assets count as loaded
/// and every read yields `None`.
pub struct Asset {
    path: String,
    valid: bool,
    bundle: RefCell<Option<BundleGuard>>,
    type_id: Option<TypeId>,
    value: RefCell<Option<Rc<dyn Any>>>,
    loaded: Completion<()>,
    disposed: Cell<bool>,
    analyzer: Option<Rc<dyn AssetAnalyzer>>,
}

impl Asset {
    /// Creates an asset for a path that resolves to no bundle.
    pub fn invalid(path: impl Into<String>) -> AssetHandle {
        Rc::new(Self {
            path: path.into(),
            valid: false,
            bundle: RefCell::new(None),
            type_id: None,
            value: RefCell::new(None),
            loaded: Completion::completed(()),
            disposed: Cell::new(false),
            analyzer: None,
        })
    }

    /// Creates an asset backed by `bundle`, taking its own reference on it.
    ///
    /// The asset becomes loaded when the bundle settles.
    pub(crate) fn open(
        path: impl Into<String>,
        bundle: &Rc<Bundle>,
        type_id: Option<TypeId>,
        analyzer: Rc<dyn AssetAnalyzer>,
    ) -> AssetHandle {
        let asset = Rc::new(Self {
            path: path.into(),
            valid: true,
            bundle: RefCell::new(Some(BundleGuard::new(Rc::clone(bundle)))),
            type_id,
            value: RefCell::new(None),
            loaded: Completion::new(),
            disposed: Cell::new(false),
            analyzer: Some(analyzer),
        });
        let weak = Rc::downgrade(&asset);
        bundle.on_loaded(move |_| {
            if let Some(asset) = weak.upgrade() {
                asset.loaded.complete(());
            }
        });
        asset
    }

    /// The asset path as requested, before any path transform.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns `false` if the path resolved to no bundle.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Returns `true` once the owning bundle settled.
    pub fn is_loaded(&self) -> bool {
        self.loaded.is_completed()
    }

    /// Returns `true` if the content can be read now.
    pub fn is_available(&self) -> bool {
        self.bundle
            .borrow()
            .as_ref()
            .is_some_and(|guard| guard.bundle().state() == BundleState::Ready)
    }

    /// Returns `true` once the asset was disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// The name of the owning bundle.
    pub fn bundle_name(&self) -> Option<String> {
        self.bundle.borrow().as_ref().map(|guard| guard.bundle().name().to_owned())
    }

    /// Runs `callback` once the asset is loaded, or now if it already is.
    pub fn on_loaded(self: &Rc<Self>, callback: impl FnOnce(&Asset) + 'static) {
        if self.disposed.get() {
            log::error!("Asset already disposed ({})", self.path);
        }
        let weak = Rc::downgrade(self);
        self.loaded.subscribe(move |_| {
            if let Some(asset) = weak.upgrade() {
                callback(&*asset);
            }
        });
    }

    /// Returns a copy of the asset's bytes.
    pub fn read_all_bytes(&self) -> Option<Vec<u8>> {
        let content = self.readable_content()?;
        content.read_bytes(&self.path)
    }

    /// The decoded object, as the type requested when the asset was opened.
    pub fn object(&self) -> Option<Rc<dyn Any>> {
        self.load_object(self.type_id)
    }

    /// The decoded object as `T`.
    pub fn value<T: Any>(&self) -> Option<Rc<T>> {
        let object = self.load_object(Some(TypeId::of::<T>()))?;
        object.downcast::<T>().ok()
    }

    fn load_object(&self, type_id: Option<TypeId>) -> Option<Rc<dyn Any>> {
        let cached = self.value.borrow().clone();
        if let Some(object) = cached {
            if type_id.map_or(true, |id| (*object).type_id() == id) {
                return Some(object);
            }
        }
        let content = self.readable_content()?;
        let object = content.load_object(&self.path, type_id)?;
        if type_id == self.type_id {
            *self.value.borrow_mut() = Some(Rc::clone(&object));
        }
        Some(object)
    }

    fn readable_content(&self) -> Option<Rc<dyn BundleContent>> {
        if self.disposed.get() {
            log::error!("Asset already disposed ({})", self.path);
            return None;
        }
        let content = self.bundle.borrow().as_ref().and_then(|guard| guard.bundle().content());
        content
    }

    /// Releases the bundle reference. Reads afterwards are reported and yield
    /// `None`.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        *self.value.borrow_mut() = None;
        let guard = self.bundle.borrow_mut().take();
        if guard.is_some() {
            if let Some(analyzer) = &self.analyzer {
                analyzer.on_asset_close(&self.path);
            }
        }
        drop(guard);
    }
}

impl Drop for Asset {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("path", &self.path)
            .field("bundle", &self.bundle_name())
            .field("loaded", &self.is_loaded())
            .field("disposed", &self.disposed.get())
            .finish()
    }
}
