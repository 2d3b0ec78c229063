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

//! The composition root: manifest installation, asset and file-system
//! resolution, and the owning-thread tick that applies worker results.

use crate::asset_agent::{Asset, AssetHandle, FileSystem, FileSystemHandle, WeakCache};
use crate::bundle_agent::{Bundle, BundleGuard, BundleRegistry, BundleState};
use bundlefs_core::content::BundleOpener;
use bundlefs_core::event::HandOff;
use bundlefs_core::listener::{AssetAnalyzer, LoggingListener, NullAnalyzer, ProviderListener};
use bundlefs_core::source::{Fetcher, LocalCache, ManifestTransport};
use bundlefs_core::task::{Priority, TaskSnapshot};
use bundlefs_core::telemetry::MetricsError;
use bundlefs_core::{BundleInfo, BundleKind, Manifest, ManifestDocument, ManifestError, ProviderConfig};
use bundlefs_io::{
    load_manifest, DownloadScheduler, DownloadTask, DownloadWorker, FileFetcher, FileListOpener,
    LocalStore, OriginManifestTransport, ThreadedDownloader, WorkerEvent, ZipArchiveOpener,
};
use bundlefs_telemetry::{MetricsAnalyzer, MetricsListener, MetricsRegistry};
use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

type WorkerFactory = Box<dyn FnOnce(flume::Sender<WorkerEvent>) -> Box<dyn DownloadWorker>>;
type Deferred = Box<dyn FnOnce() + Send>;

/// Posts closures to the provider's owning thread from anywhere.
///
/// Posted closures run during the next [`Provider::tick`], in posting order.
#[derive(Clone)]
pub struct Dispatcher {
    sender: flume::Sender<Deferred>,
}

impl Dispatcher {
    /// Queues `callback` for the owning thread. Dropped silently once the
    /// provider is gone.
    pub fn post(&self, callback: impl FnOnce() + Send + 'static) {
        if self.sender.send(Box::new(callback)).is_err() {
            log::debug!("Provider gone, dropping posted callback");
        }
    }
}

/// Builds a [`Provider`] from a configuration and its collaborators.
pub struct ProviderBuilder {
    config: ProviderConfig,
    fetcher: Arc<dyn Fetcher>,
    transport: Option<Arc<dyn ManifestTransport>>,
    local_cache: Option<Arc<dyn LocalCache>>,
    openers: HashMap<BundleKind, Box<dyn BundleOpener>>,
    listeners: Vec<Rc<dyn ProviderListener>>,
    analyzer: Rc<dyn AssetAnalyzer>,
    worker: Option<WorkerFactory>,
}

impl ProviderBuilder {
    /// Starts from `config` with a [`FileFetcher`], the zip and file-list
    /// openers and a logging listener.
    pub fn new(config: ProviderConfig) -> Self {
        let mut openers: HashMap<BundleKind, Box<dyn BundleOpener>> = HashMap::new();
        openers.insert(BundleKind::ZipArchive, Box::new(ZipArchiveOpener));
        openers.insert(BundleKind::FileListArchive, Box::new(FileListOpener));
        Self {
            config,
            fetcher: Arc::new(FileFetcher),
            transport: None,
            local_cache: None,
            openers,
            listeners: vec![Rc::new(LoggingListener)],
            analyzer: Rc::new(NullAnalyzer),
            worker: None,
        }
    }

    /// The configuration the provider will be built with.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Sets the byte transport used for bundles and, unless overridden, the
    /// manifest.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Sets the manifest transport.
    pub fn with_transport(mut self, transport: Arc<dyn ManifestTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the pre-seeded read-only cache.
    pub fn with_local_cache(mut self, cache: Arc<dyn LocalCache>) -> Self {
        self.local_cache = Some(cache);
        self
    }

    /// Registers the opener for one bundle kind, replacing any default.
    pub fn with_opener(mut self, kind: BundleKind, opener: impl BundleOpener + 'static) -> Self {
        self.openers.insert(kind, Box::new(opener));
        self
    }

    /// Adds a lifecycle listener.
    pub fn with_listener(mut self, listener: Rc<dyn ProviderListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Sets the asset analyzer.
    pub fn with_analyzer(mut self, analyzer: Rc<dyn AssetAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Records asset and download metrics in `registry`.
    pub fn with_metrics(self, registry: &MetricsRegistry) -> Result<Self, MetricsError> {
        let analyzer = MetricsAnalyzer::new(registry)?;
        let listener = MetricsListener::new(registry)?;
        Ok(self.with_analyzer(Rc::new(analyzer)).with_listener(Rc::new(listener)))
    }

    /// Replaces the threaded downloader. `factory` receives the sender of the
    /// hand-off queue its results must be posted to.
    pub fn with_download_worker<W, F>(mut self, factory: F) -> Self
    where
        W: DownloadWorker + 'static,
        F: FnOnce(flume::Sender<WorkerEvent>) -> W + 'static,
    {
        self.worker = Some(Box::new(move |sender| Box::new(factory(sender)) as Box<dyn DownloadWorker>));
        self
    }

    /// Builds the provider without loading a manifest.
    pub fn build(self) -> Provider {
        let events = HandOff::new();
        let worker: Box<dyn DownloadWorker> = match self.worker {
            Some(factory) => factory(events.sender()),
            None => Box::new(ThreadedDownloader::new(Arc::clone(&self.fetcher), events.sender())),
        };
        let store = LocalStore::new(self.config.local_root.clone());
        let scheduler = DownloadScheduler::new(
            store.clone(),
            worker,
            self.config.clamped_concurrency(),
            self.config.max_attempts,
            self.config.fetch_options(),
        );
        let transport = self.transport.unwrap_or_else(|| {
            Arc::new(OriginManifestTransport::new(Arc::clone(&self.fetcher)).with_options(self.config.fetch_options()))
        });
        let registry = BundleRegistry::new(
            scheduler,
            store,
            self.config.urls.clone(),
            self.local_cache,
            self.openers,
            self.listeners,
            events.sender(),
        );
        log::info!(
            "Provider created ({} origins, {} concurrent downloads, storage {})",
            self.config.urls.len(),
            self.config.clamped_concurrency(),
            self.config.local_root.display()
        );
        Provider {
            config: self.config,
            transport,
            registry,
            events,
            deferred: HandOff::new(),
            assets: RefCell::new(WeakCache::new()),
            file_systems: RefCell::new(WeakCache::new()),
            analyzer: self.analyzer,
            closed: Cell::new(false),
        }
    }

    /// Builds the provider and starts loading the manifest.
    ///
    /// The manifest is installed once every startup bundle is local; drive
    /// [`Provider::tick`] until [`Provider::is_ready`].
    pub fn open(self) -> Result<Provider, ManifestError> {
        let provider = self.build();
        provider.load_manifest()?;
        Ok(provider)
    }
}

/// Resolves asset paths and bundle names to shared, reference-counted handles.
///
/// Owning-thread only (`!Send`). Worker threads report through a hand-off
/// queue applied by [`Provider::tick`].
pub struct Provider {
    config: ProviderConfig,
    transport: Arc<dyn ManifestTransport>,
    registry: Rc<BundleRegistry>,
    events: HandOff<WorkerEvent>,
    deferred: HandOff<Deferred>,
    assets: RefCell<WeakCache<Asset>>,
    file_systems: RefCell<WeakCache<FileSystem>>,
    analyzer: Rc<dyn AssetAnalyzer>,
    closed: Cell<bool>,
}

impl Provider {
    /// Starts a builder.
    pub fn builder(config: ProviderConfig) -> ProviderBuilder {
        ProviderBuilder::new(config)
    }

    /// The configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Acquires a new manifest generation through the transport.
    ///
    /// Failures are returned as is and never retried here.
    pub fn load_manifest(&self) -> Result<(), ManifestError> {
        let manifest = load_manifest(
            self.transport.as_ref(),
            &self.config.urls,
            &self.config.local_root,
            self.config.path_transform.as_ref(),
        )?;
        self.stage_manifest(Arc::new(manifest));
        Ok(())
    }

    /// Validates and stages an in-memory manifest document.
    pub fn install_document(&self, document: ManifestDocument) -> Result<(), ManifestError> {
        let manifest = Manifest::build(document, self.config.path_transform.as_ref())?;
        self.stage_manifest(Arc::new(manifest));
        Ok(())
    }

    /// Fetches the startup bundles that are not local yet, then installs.
    fn stage_manifest(&self, manifest: Arc<Manifest>) {
        let registry = &self.registry;
        let pending: Vec<Arc<BundleInfo>> = manifest
            .startup_bundles()
            .filter(|info| !registry.store().is_valid(info) && !registry.cache_contains(info))
            .cloned()
            .collect();
        for listener in registry.listeners() {
            listener.on_startup_tasks(&pending);
        }
        if pending.is_empty() {
            registry.install_manifest(manifest);
            return;
        }
        if registry.downloads_stopped() {
            log::warn!("Downloads aborted, installing manifest without {} startup bundles", pending.len());
            registry.install_manifest(manifest);
            return;
        }

        let remaining = Rc::new(Cell::new(pending.len()));
        for info in pending {
            let registry_ref = Rc::downgrade(registry);
            let manifest = Arc::clone(&manifest);
            let remaining = Rc::clone(&remaining);
            let task = DownloadTask::new(info, registry.origins(), Priority::STARTUP, move |outcome| {
                if !outcome.is_success() {
                    log::warn!("Startup bundle '{}' could not be fetched", outcome.bundle.name);
                }
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    if let Some(registry) = registry_ref.upgrade() {
                        registry.install_manifest(manifest);
                    }
                }
            });
            registry.enqueue(task);
        }
        registry.schedule();
    }

    /// Returns `true` once a manifest is installed.
    pub fn is_ready(&self) -> bool {
        self.registry.ready().is_completed()
    }

    /// Runs `callback` after the first manifest installation, or now if a
    /// manifest is already installed.
    pub fn on_ready(&self, callback: impl FnOnce() + 'static) {
        self.registry.ready().subscribe(move |_| callback());
    }

    /// The installed manifest.
    pub fn manifest(&self) -> Option<Arc<Manifest>> {
        self.registry.manifest()
    }

    /// A handle for posting work to this provider's owning thread.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            sender: self.deferred.sender(),
        }
    }

    /// Runs `callback` on the owning thread. The caller already is on it, so
    /// this is immediate.
    pub fn post_to_owner(&self, callback: impl FnOnce()) {
        callback();
    }

    /// Applies every queued worker result and posted callback. Returns how
    /// many were applied.
    pub fn tick(&self) -> usize {
        self.apply(self.events.drain())
    }

    /// Waits up to `timeout` for worker results, then applies them along with
    /// any posted callbacks.
    pub fn tick_blocking(&self, timeout: Duration) -> usize {
        let events = if self.deferred.is_empty() {
            self.events.wait(timeout)
        } else {
            self.events.drain()
        };
        self.apply(events)
    }

    /// Ticks until `done` returns `true` or `timeout` elapses. Returns the
    /// final value of `done`.
    pub fn tick_until(&self, timeout: Duration, mut done: impl FnMut(&Provider) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if done(self) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.tick_blocking((deadline - now).min(Duration::from_millis(50)));
        }
    }

    fn apply(&self, events: Vec<WorkerEvent>) -> usize {
        let mut count = events.len();
        for event in events {
            self.registry.handle_event(event);
        }
        for callback in self.deferred.drain() {
            callback();
            count += 1;
        }
        count
    }

    /// Returns the asset for `path`.
    ///
    /// Unresolvable paths yield an invalid asset rather than an error.
    pub fn get_asset(&self, path: &str) -> AssetHandle {
        self.resolve_asset(path, None)
    }

    /// Returns the asset for `path`, decoded as `T` by [`Asset::object`].
    pub fn get_asset_typed<T: Any>(&self, path: &str) -> AssetHandle {
        self.resolve_asset(path, Some(TypeId::of::<T>()))
    }

    fn resolve_asset(&self, path: &str, type_id: Option<TypeId>) -> AssetHandle {
        let key = self.config.transform_path(path);
        let cached = self.assets.borrow_mut().get(&key);
        if let Some(asset) = cached {
            self.analyzer.on_asset_access(path);
            return asset;
        }

        let bundle = self
            .find_bundle_name(&key)
            .and_then(|name| self.registry.get_bundle(&name));
        let asset = match bundle {
            Some(bundle) => {
                // Unreferenced until the asset takes its own guard.
                let guard = BundleGuard::new(bundle);
                self.analyzer.on_asset_open(path);
                Asset::open(path, guard.bundle(), type_id, Rc::clone(&self.analyzer))
            }
            None => {
                log::warn!("Asset '{path}' is not in the manifest");
                Asset::invalid(path)
            }
        };
        self.assets.borrow_mut().insert(key, &asset);
        asset
    }

    /// Returns a file-system view over the archive bundle `bundle_name`.
    ///
    /// Absent bundles and bundles that are not zip archives yield the failure
    /// file system.
    pub fn get_file_system(&self, bundle_name: &str) -> FileSystemHandle {
        let cached = self.file_systems.borrow_mut().get(bundle_name);
        if let Some(fs) = cached {
            return fs;
        }

        let kind = self
            .registry
            .manifest()
            .and_then(|manifest| manifest.bundle(bundle_name).map(|info| info.kind));
        let fs = match kind {
            Some(BundleKind::ZipArchive) => match self.registry.get_bundle(bundle_name) {
                Some(bundle) => FileSystem::open(&bundle),
                None => FileSystem::failure(bundle_name),
            },
            Some(kind) => {
                log::error!("Bundle '{bundle_name}' is a {kind:?}, not a zip archive");
                FileSystem::failure(bundle_name)
            }
            None => {
                log::warn!("Bundle '{bundle_name}' is not in the manifest");
                FileSystem::failure(bundle_name)
            }
        };
        self.file_systems.borrow_mut().insert(bundle_name, &fs);
        fs
    }

    /// Returns the live bundle for `name`, creating it on first use.
    ///
    /// The returned bundle carries no reference of its own. Wrap it in a
    /// [`BundleGuard`] to hold it: a bundle that is never referenced is not
    /// unloaded and stays registered until [`Provider::close`].
    pub fn get_bundle(&self, name: &str) -> Option<Rc<Bundle>> {
        self.registry.get_bundle(name)
    }

    fn find_bundle_name(&self, key: &str) -> Option<String> {
        self.registry.manifest()?.find(key).map(str::to_owned)
    }

    /// The name of the bundle containing `path`.
    pub fn find(&self, path: &str) -> Option<String> {
        self.find_bundle_name(&self.config.transform_path(path))
    }

    /// Returns `true` if the installed manifest lists `path`.
    pub fn is_asset_exists(&self, path: &str) -> bool {
        self.find(path).is_some()
    }

    /// Returns `true` if `path` can be served without a download: a live
    /// asset exists or its bundle is available.
    pub fn is_asset_available(&self, path: &str) -> bool {
        let key = self.config.transform_path(path);
        if self.assets.borrow().contains_live(&key) {
            return true;
        }
        self.find_bundle_name(&key)
            .is_some_and(|name| self.is_bundle_available(&name))
    }

    /// Returns `true` if the bundle is open, valid on local storage or in the
    /// pre-seeded cache.
    pub fn is_bundle_available(&self, name: &str) -> bool {
        if self
            .registry
            .live_bundle(name)
            .is_some_and(|bundle| bundle.state() == BundleState::Ready)
        {
            return true;
        }
        let Some(manifest) = self.registry.manifest() else {
            return false;
        };
        manifest
            .bundle(name)
            .is_some_and(|info| self.registry.store().is_valid(info) || self.registry.cache_contains(info))
    }

    /// Calls `visit` for every queued or running download.
    pub fn for_each_task(&self, mut visit: impl FnMut(&TaskSnapshot)) {
        for task in self.registry.tasks() {
            visit(&task);
        }
    }

    /// Number of live bundles.
    pub fn bundle_count(&self) -> usize {
        self.registry.len()
    }

    /// Cancels all downloads and refuses new ones. Bundles that were waiting
    /// on a download settle as failed; ready bundles and outstanding handles
    /// stay usable.
    pub fn abort(&self) {
        let aborted = self.registry.abort();
        if !aborted.is_empty() {
            log::info!("Aborted {} download tasks", aborted.len());
        }
    }

    /// Aborts downloads and force-releases every bundle. Idempotent.
    pub fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        self.abort();
        self.registry.release_all();
        self.assets.borrow_mut().clear();
        self.file_systems.borrow_mut().clear();
        log::info!("Provider closed");
    }

    /// Returns `true` once [`Provider::close`] ran.
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

impl Drop for Provider {
    fn drop(&mut self) {
        self.close();
    }
}
