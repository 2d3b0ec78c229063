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

use super::registry::BundleRegistry;
use bundlefs_core::content::BundleContent;
use bundlefs_core::{BundleInfo, BundleKind, Completion};
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

/// Lifecycle state of a runtime bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleState {
    /// Torn down; the content handle has been released.
    Unloaded,
    /// Waiting for its bytes or for its dependencies.
    Loading,
    /// Content is open.
    Ready,
    /// Bytes could not be obtained or opened; content is empty.
    Failed,
}

impl BundleState {
    /// Returns `true` for [`BundleState::Ready`] and [`BundleState::Failed`].
    pub fn is_settled(self) -> bool {
        matches!(self, BundleState::Ready | BundleState::Failed)
    }
}

/// Where the bundle's own bytes are.
pub(crate) enum Payload {
    /// Still being fetched or read.
    Pending,
    /// Available and not yet opened.
    Bytes(Vec<u8>),
    /// Could not be obtained.
    Missing,
    /// Handed to the opener.
    Consumed,
}

/// A reference-counted runtime container for one bundle.
///
/// Created lazily by the [`BundleRegistry`], which owns the table entry.
/// Dependencies are held by name and resolved through the registry.
pub struct Bundle {
    info: Arc<BundleInfo>,
    refs: Cell<usize>,
    state: Cell<BundleState>,
    content: RefCell<Option<Rc<dyn BundleContent>>>,
    dependencies: RefCell<Vec<String>>,
    payload: RefCell<Payload>,
    waiting: Cell<bool>,
    loaded: Completion<BundleState>,
    released: Cell<bool>,
    registry: Weak<BundleRegistry>,
}

impl Bundle {
    pub(crate) fn new(info: Arc<BundleInfo>, registry: Weak<BundleRegistry>) -> Self {
        Self {
            info,
            refs: Cell::new(0),
            state: Cell::new(BundleState::Loading),
            content: RefCell::new(None),
            dependencies: RefCell::new(Vec::new()),
            payload: RefCell::new(Payload::Pending),
            waiting: Cell::new(false),
            loaded: Completion::new(),
            released: Cell::new(false),
            registry,
        }
    }

    /// The bundle name.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// The manifest entry this bundle was created from.
    pub fn info(&self) -> &Arc<BundleInfo> {
        &self.info
    }

    /// The packaging format.
    pub fn kind(&self) -> BundleKind {
        self.info.kind
    }

    /// Current state.
    pub fn state(&self) -> BundleState {
        self.state.get()
    }

    /// Current reference count.
    pub fn ref_count(&self) -> usize {
        self.refs.get()
    }

    /// Returns `true` once the bundle is Ready or Failed.
    pub fn is_loaded(&self) -> bool {
        self.state().is_settled()
    }

    /// Returns `true` once the bundle has been torn down.
    pub fn is_released(&self) -> bool {
        self.released.get()
    }

    /// Names of the bundles this one holds a reference on, direct and
    /// transitive, in acquisition order.
    pub fn dependencies(&self) -> Vec<String> {
        self.dependencies.borrow().clone()
    }

    /// The opened content. `None` while loading and after teardown.
    pub fn content(&self) -> Option<Rc<dyn BundleContent>> {
        self.content.borrow().clone()
    }

    /// Runs `callback` once the bundle settles, or now if it already has.
    pub fn on_loaded(&self, callback: impl FnOnce(BundleState) + 'static) {
        self.loaded.subscribe(move |state| callback(*state));
    }

    /// Takes a reference.
    pub fn add_ref(&self) {
        self.refs.set(self.refs.get() + 1);
    }

    /// Drops a reference; the last one tears the bundle down.
    pub fn remove_ref(&self) {
        let refs = self.refs.get();
        if refs == 0 {
            log::error!("Bundle '{}' released more often than acquired", self.name());
            return;
        }
        self.refs.set(refs - 1);
        if refs == 1 && !self.released.get() {
            match self.registry.upgrade() {
                Some(registry) => registry.unload(self),
                None => self.teardown(),
            }
        }
    }

    pub(crate) fn dependency_names(&self) -> Ref<'_, Vec<String>> {
        self.dependencies.borrow()
    }

    pub(crate) fn push_dependency(&self, name: &str) -> bool {
        let mut dependencies = self.dependencies.borrow_mut();
        if dependencies.iter().any(|d| d == name) {
            return false;
        }
        dependencies.push(name.to_owned());
        true
    }

    pub(crate) fn set_payload(&self, payload: Payload) {
        *self.payload.borrow_mut() = payload;
    }

    pub(crate) fn has_payload(&self) -> bool {
        !matches!(*self.payload.borrow(), Payload::Pending)
    }

    pub(crate) fn take_payload(&self) -> Payload {
        std::mem::replace(&mut *self.payload.borrow_mut(), Payload::Consumed)
    }

    /// Marks that a dependency subscription is outstanding. Returns `false`
    /// if one already was.
    pub(crate) fn begin_waiting(&self) -> bool {
        !self.waiting.replace(true)
    }

    pub(crate) fn end_waiting(&self) {
        self.waiting.set(false);
    }

    /// Stores the content and notifies subscribers.
    pub(crate) fn settle(&self, state: BundleState, content: Rc<dyn BundleContent>) {
        if self.released.get() || self.state().is_settled() {
            return;
        }
        *self.content.borrow_mut() = Some(content);
        self.state.set(state);
        log::debug!("Bundle '{}' settled as {state:?}", self.name());
        self.loaded.complete(state);
    }

    /// Releases the content handle. Idempotent.
    pub(crate) fn teardown(&self) {
        if self.released.replace(true) {
            return;
        }
        self.state.set(BundleState::Unloaded);
        *self.payload.borrow_mut() = Payload::Consumed;
        let content = self.content.borrow_mut().take();
        drop(content);
        log::debug!("Bundle '{}' unloaded", self.name());
    }
}

impl fmt::Debug for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundle")
            .field("name", &self.info.name)
            .field("state", &self.state.get())
            .field("refs", &self.refs.get())
            .field("dependencies", &self.dependencies.borrow())
            .finish()
    }
}

/// Holds one reference on a bundle for as long as it lives.
pub struct BundleGuard {
    bundle: Rc<Bundle>,
}

impl BundleGuard {
    /// Takes a reference on `bundle`.
    pub fn new(bundle: Rc<Bundle>) -> Self {
        bundle.add_ref();
        Self { bundle }
    }

    /// The guarded bundle.
    pub fn bundle(&self) -> &Rc<Bundle> {
        &self.bundle
    }
}

impl Drop for BundleGuard {
    fn drop(&mut self) {
        self.bundle.remove_ref();
    }
}

impl fmt::Debug for BundleGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BundleGuard").field(&self.bundle.name()).finish()
    }
}
