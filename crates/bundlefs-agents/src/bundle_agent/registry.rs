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

//! The bundle table, dependency acquisition and content population.

use super::bundle::{Bundle, BundleState, Payload};
use bundlefs_core::content::{BundleContent, BundleOpener, EmptyContent, OpenError};
use bundlefs_core::listener::ProviderListener;
use bundlefs_core::source::LocalCache;
use bundlefs_core::task::{Priority, TaskSnapshot};
use bundlefs_core::{BundleInfo, BundleKind, Completion, Manifest};
use bundlefs_io::download::spawn_cache_load;
use bundlefs_io::{DownloadScheduler, DownloadTask, FinishedTask, LocalStore, WorkerEvent};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

/// Maps bundle names to live bundles and drives their population.
///
/// Owning-thread only. Every method may re-enter the registry through
/// completion callbacks, so no `RefCell` borrow is held across a callback.
pub struct BundleRegistry {
    manifest: RefCell<Option<Arc<Manifest>>>,
    ready: Completion<()>,
    bundles: RefCell<HashMap<String, Rc<Bundle>>>,
    pending_cache: RefCell<HashMap<String, Rc<Bundle>>>,
    scheduler: RefCell<DownloadScheduler>,
    store: LocalStore,
    origins: Vec<String>,
    local_cache: Option<Arc<dyn LocalCache>>,
    openers: HashMap<BundleKind, Box<dyn BundleOpener>>,
    listeners: Vec<Rc<dyn ProviderListener>>,
    events: flume::Sender<WorkerEvent>,
    closed: Cell<bool>,
}

impl BundleRegistry {
    pub(crate) fn new(
        scheduler: DownloadScheduler,
        store: LocalStore,
        origins: Vec<String>,
        local_cache: Option<Arc<dyn LocalCache>>,
        openers: HashMap<BundleKind, Box<dyn BundleOpener>>,
        listeners: Vec<Rc<dyn ProviderListener>>,
        events: flume::Sender<WorkerEvent>,
    ) -> Rc<Self> {
        Rc::new(Self {
            manifest: RefCell::new(None),
            ready: Completion::new(),
            bundles: RefCell::new(HashMap::new()),
            pending_cache: RefCell::new(HashMap::new()),
            scheduler: RefCell::new(scheduler),
            store,
            origins,
            local_cache,
            openers,
            listeners,
            events,
            closed: Cell::new(false),
        })
    }

    /// The installed manifest generation.
    pub fn manifest(&self) -> Option<Arc<Manifest>> {
        self.manifest.borrow().clone()
    }

    /// Swaps in a new manifest generation.
    ///
    /// Bundles opened under the previous generation keep their entries.
    pub(crate) fn install_manifest(&self, manifest: Arc<Manifest>) {
        *self.manifest.borrow_mut() = Some(Arc::clone(&manifest));
        for listener in &self.listeners {
            listener.on_manifest_installed(&manifest);
        }
        self.ready.complete(());
    }

    pub(crate) fn ready(&self) -> &Completion<()> {
        &self.ready
    }

    pub(crate) fn store(&self) -> &LocalStore {
        &self.store
    }

    pub(crate) fn origins(&self) -> &[String] {
        &self.origins
    }

    pub(crate) fn listeners(&self) -> &[Rc<dyn ProviderListener>] {
        &self.listeners
    }

    /// Returns `true` if the pre-seeded cache holds this exact bundle.
    pub fn cache_contains(&self, info: &BundleInfo) -> bool {
        self.local_cache
            .as_ref()
            .is_some_and(|cache| cache.contains(&info.name, &info.checksum, info.size))
    }

    /// Returns the live bundle for `name`, creating and populating it on
    /// first use.
    ///
    /// Returns `None` if no manifest is installed or it does not list `name`.
    /// The caller gets no reference: a bundle nobody references stays in the
    /// table until [`BundleRegistry::release_all`].
    pub fn get_bundle(self: &Rc<Self>, name: &str) -> Option<Rc<Bundle>> {
        if let Some(bundle) = self.bundles.borrow().get(name) {
            return Some(Rc::clone(bundle));
        }
        if self.closed.get() {
            return None;
        }
        let info = Arc::clone(self.manifest.borrow().as_ref()?.bundle(name)?);
        let bundle = Rc::new(Bundle::new(info, Rc::downgrade(self)));
        self.bundles.borrow_mut().insert(name.to_owned(), Rc::clone(&bundle));
        let dependencies = bundle.info().dependencies.clone();
        self.add_dependencies(&bundle, &dependencies);
        self.populate(&bundle);
        Some(bundle)
    }

    /// Takes a reference on every dependency in `names` and, transitively, on
    /// their own dependencies. Each dependency is acquired once per bundle.
    fn add_dependencies(self: &Rc<Self>, bundle: &Bundle, names: &[String]) {
        for name in names {
            if bundle.dependency_names().contains(name) {
                continue;
            }
            let Some(dependency) = self.get_bundle(name) else {
                log::error!("Bundle '{}' depends on unknown bundle '{name}'", bundle.name());
                continue;
            };
            bundle.push_dependency(name);
            dependency.add_ref();
            let nested = dependency.info().dependencies.clone();
            self.add_dependencies(bundle, &nested);
        }
    }

    /// Obtains the bundle's bytes: valid local file, then the pre-seeded
    /// cache, then a download.
    fn populate(self: &Rc<Self>, bundle: &Rc<Bundle>) {
        let info = bundle.info();
        if let Some(bytes) = self.store.read_valid(info) {
            log::trace!("Bundle '{}' found on local storage", info.name);
            bundle.set_payload(Payload::Bytes(bytes));
            self.try_open(bundle);
            return;
        }

        if let Some(cache) = self.local_cache.as_ref().filter(|_| self.cache_contains(info)) {
            log::trace!("Bundle '{}' loading from pre-seeded cache", info.name);
            // Held until the read completes.
            bundle.add_ref();
            self.pending_cache
                .borrow_mut()
                .insert(info.name.clone(), Rc::clone(bundle));
            spawn_cache_load(Arc::clone(cache), info.name.clone(), self.events.clone());
            return;
        }

        self.download(bundle);
    }

    /// Queues a download of the bundle from the origins.
    ///
    /// The bundle holds a reference on itself until the task completes. Once
    /// downloads are aborted the bundle settles as failed right away.
    fn download(self: &Rc<Self>, bundle: &Rc<Bundle>) {
        if self.downloads_stopped() {
            log::warn!("Downloads aborted, bundle '{}' cannot be fetched", bundle.name());
            bundle.set_payload(Payload::Missing);
            self.try_open(bundle);
            return;
        }

        bundle.add_ref();
        let registry = Rc::downgrade(self);
        let target = Rc::clone(bundle);
        let info = Arc::clone(bundle.info());
        let task = DownloadTask::new(info, &self.origins, Priority::NORMAL, move |_outcome| {
            if let Some(registry) = registry.upgrade() {
                registry.finish_download(&target);
            }
        });
        self.enqueue(task);
        self.schedule();
    }

    fn finish_download(self: &Rc<Self>, bundle: &Rc<Bundle>) {
        if bundle.is_released() {
            return;
        }
        // The worker wrote the file; read it back through the same validity check.
        let payload = match self.store.read_valid(bundle.info()) {
            Some(bytes) => Payload::Bytes(bytes),
            None => {
                log::warn!("Bundle '{}' is unavailable after download", bundle.name());
                Payload::Missing
            }
        };
        bundle.set_payload(payload);
        self.try_open(bundle);
        bundle.remove_ref();
    }

    fn finish_cache_load(self: &Rc<Self>, name: &str, result: std::io::Result<Vec<u8>>) {
        let Some(bundle) = self.pending_cache.borrow_mut().remove(name) else {
            return;
        };
        if bundle.is_released() {
            return;
        }
        match result {
            Ok(bytes) => {
                bundle.set_payload(Payload::Bytes(bytes));
                self.try_open(&bundle);
            }
            Err(e) => {
                log::warn!("Failed to read bundle '{name}' from the pre-seeded cache, downloading it: {e}");
                self.download(&bundle);
            }
        }
        bundle.remove_ref();
    }

    /// Opens the bundle once its bytes are available and every dependency has
    /// settled. Otherwise waits for the first unsettled dependency.
    pub(crate) fn try_open(self: &Rc<Self>, bundle: &Rc<Bundle>) {
        if bundle.is_released() || bundle.state() != BundleState::Loading || !bundle.has_payload() {
            return;
        }
        let unsettled = {
            let table = self.bundles.borrow();
            let names = bundle.dependency_names();
            let found = names
                .iter()
                .filter_map(|name| table.get(name))
                .find(|dependency| dependency.state() == BundleState::Loading)
                .cloned();
            found
        };
        if let Some(dependency) = unsettled {
            if bundle.begin_waiting() {
                log::trace!("Bundle '{}' waits for '{}'", bundle.name(), dependency.name());
                let registry = Rc::downgrade(self);
                let waiting = Rc::downgrade(bundle);
                dependency.on_loaded(move |_| {
                    if let (Some(registry), Some(bundle)) = (registry.upgrade(), waiting.upgrade()) {
                        bundle.end_waiting();
                        registry.try_open(&bundle);
                    }
                });
            }
            return;
        }

        let (state, content) = match bundle.take_payload() {
            Payload::Bytes(bytes) => match self.open_content(bundle.info(), bytes) {
                Ok(content) => (BundleState::Ready, content),
                Err(e) => {
                    log::error!("{e}");
                    (BundleState::Failed, Box::new(EmptyContent) as Box<dyn BundleContent>)
                }
            },
            _ => (BundleState::Failed, Box::new(EmptyContent) as Box<dyn BundleContent>),
        };
        bundle.settle(state, Rc::from(content));
    }

    fn open_content(&self, info: &BundleInfo, bytes: Vec<u8>) -> Result<Box<dyn BundleContent>, OpenError> {
        let opener = self.openers.get(&info.kind).ok_or(OpenError::NoOpener(info.kind))?;
        opener.open(info, bytes)
    }

    /// Removes a bundle whose last reference was dropped, releases its content
    /// and drops the references it held on its dependencies.
    pub(crate) fn unload(&self, bundle: &Bundle) {
        {
            let mut table = self.bundles.borrow_mut();
            if table
                .get(bundle.name())
                .is_some_and(|entry| std::ptr::eq(Rc::as_ptr(entry), bundle))
            {
                table.remove(bundle.name());
            }
        }
        bundle.teardown();
        let dependencies = bundle.dependencies();
        for name in dependencies {
            let dependency = self.bundles.borrow().get(&name).cloned();
            if let Some(dependency) = dependency {
                dependency.remove_ref();
            }
        }
    }

    /// Tears down every live bundle regardless of reference counts.
    pub(crate) fn release_all(&self) {
        self.closed.set(true);
        self.pending_cache.borrow_mut().clear();
        let bundles: Vec<Rc<Bundle>> = self.bundles.borrow_mut().drain().map(|(_, b)| b).collect();
        for bundle in bundles {
            bundle.teardown();
        }
    }

    /// Adds a task to the download queue. Dropped once downloads are aborted.
    pub(crate) fn enqueue(&self, task: DownloadTask) {
        self.scheduler.borrow_mut().enqueue(task);
    }

    /// Returns `true` once [`BundleRegistry::abort`] ran.
    pub fn downloads_stopped(&self) -> bool {
        self.scheduler.borrow().is_stopped()
    }

    /// Starts queued downloads up to the concurrency cap.
    pub(crate) fn schedule(&self) {
        let started = self.scheduler.borrow_mut().schedule();
        for task in &started {
            for listener in &self.listeners {
                listener.on_task_start(task);
            }
        }
    }

    /// Cancels every download and stops the queue for good.
    ///
    /// The cancelled tasks complete as failures, so bundles waiting on them
    /// settle as failed and drop the reference they held on themselves.
    pub(crate) fn abort(&self) -> Vec<TaskSnapshot> {
        let aborted = self.scheduler.borrow_mut().abort();
        aborted.into_iter().map(|mut task| self.complete(&mut task)).collect()
    }

    fn complete(&self, finished: &mut FinishedTask) -> TaskSnapshot {
        finished.run_callback();
        for listener in &self.listeners {
            listener.on_task_complete(&finished.snapshot);
        }
        finished.snapshot.clone()
    }

    /// Snapshots of queued and running downloads.
    pub fn tasks(&self) -> Vec<TaskSnapshot> {
        self.scheduler.borrow().tasks().map(|t| t.snapshot()).collect()
    }

    /// Applies one worker result.
    pub(crate) fn handle_event(self: &Rc<Self>, event: WorkerEvent) {
        if self.closed.get() {
            return;
        }
        match event {
            WorkerEvent::Download { id, result } => {
                let finished = self.scheduler.borrow_mut().finish(id, result);
                let Some(mut finished) = finished else {
                    log::debug!("Ignoring result of unknown {id}");
                    return;
                };
                self.complete(&mut finished);
                self.schedule();
            }
            WorkerEvent::CacheLoaded { bundle, result } => self.finish_cache_load(&bundle, result),
        }
    }

    /// Looks up a live bundle without creating it.
    pub fn live_bundle(&self, name: &str) -> Option<Rc<Bundle>> {
        self.bundles.borrow().get(name).cloned()
    }

    /// Number of live bundles.
    pub fn len(&self) -> usize {
        self.bundles.borrow().len()
    }

    /// Returns `true` if no bundle is live.
    pub fn is_empty(&self) -> bool {
        self.bundles.borrow().is_empty()
    }

    /// Returns `true` once [`BundleRegistry::release_all`] ran.
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}
