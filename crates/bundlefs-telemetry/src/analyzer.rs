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

//! Provider hooks backed by metrics.

use crate::metrics::registry::{CounterHandle, GaugeHandle, MetricsRegistry};
use bundlefs_core::listener::{AssetAnalyzer, ProviderListener};
use bundlefs_core::task::{TaskSnapshot, TaskState};
use bundlefs_core::telemetry::MetricsResult;
use bundlefs_core::{BundleInfo, Manifest};
use std::sync::Arc;

fn record(result: MetricsResult<impl Sized>) {
    if let Err(e) = result {
        log::warn!("Failed to record metric: {e}");
    }
}

/// Counts asset opens, accesses and closes in the `assets` namespace.
#[derive(Debug, Clone)]
pub struct MetricsAnalyzer {
    opened: CounterHandle,
    accessed: CounterHandle,
    closed: CounterHandle,
    live: GaugeHandle,
}

impl MetricsAnalyzer {
    /// Registers the asset metrics in `registry`.
    pub fn new(registry: &MetricsRegistry) -> MetricsResult<Self> {
        Ok(Self {
            opened: registry.register_counter("assets", "opened_total", "Assets minted on a cache miss")?,
            accessed: registry.register_counter("assets", "accessed_total", "Live cached assets returned")?,
            closed: registry.register_counter("assets", "closed_total", "Assets disposed")?,
            live: registry.register_gauge("assets", "live", "Assets opened and not yet disposed", "count")?,
        })
    }

    /// Assets minted so far.
    pub fn opened(&self) -> u64 {
        self.opened.get().unwrap_or(0)
    }

    /// Cache hits so far.
    pub fn accessed(&self) -> u64 {
        self.accessed.get().unwrap_or(0)
    }

    /// Assets disposed so far.
    pub fn closed(&self) -> u64 {
        self.closed.get().unwrap_or(0)
    }
}

impl AssetAnalyzer for MetricsAnalyzer {
    fn on_asset_open(&self, path: &str) {
        log::trace!("Asset opened: {path}");
        record(self.opened.increment());
        record(self.live.add(1.0));
    }

    fn on_asset_access(&self, path: &str) {
        log::trace!("Asset accessed: {path}");
        record(self.accessed.increment());
    }

    fn on_asset_close(&self, path: &str) {
        log::trace!("Asset closed: {path}");
        record(self.closed.increment());
        record(self.live.sub(1.0));
    }
}

/// Counts lifecycle notifications in the `provider` and `downloads`
/// namespaces.
#[derive(Debug, Clone)]
pub struct MetricsListener {
    manifests: CounterHandle,
    startup_bundles: GaugeHandle,
    started: CounterHandle,
    completed: CounterHandle,
    failed: CounterHandle,
    bytes: CounterHandle,
}

impl MetricsListener {
    /// Registers the lifecycle metrics in `registry`.
    pub fn new(registry: &MetricsRegistry) -> MetricsResult<Self> {
        Ok(Self {
            manifests: registry.register_counter("provider", "manifests_installed", "Manifest generations installed")?,
            startup_bundles: registry.register_gauge(
                "provider",
                "startup_bundles",
                "Startup bundles fetched before the last installation",
                "count",
            )?,
            started: registry.register_counter("downloads", "started_total", "Download tasks started")?,
            completed: registry.register_counter("downloads", "completed_total", "Download tasks finished")?,
            failed: registry.register_counter("downloads", "failed_total", "Download tasks that failed")?,
            bytes: registry.register_counter("downloads", "bytes_total", "Bytes of successfully fetched bundles")?,
        })
    }

    /// Tasks started so far.
    pub fn started(&self) -> u64 {
        self.started.get().unwrap_or(0)
    }

    /// Tasks finished so far, successful or not.
    pub fn completed(&self) -> u64 {
        self.completed.get().unwrap_or(0)
    }

    /// Tasks that failed so far.
    pub fn failed(&self) -> u64 {
        self.failed.get().unwrap_or(0)
    }

    /// Manifest generations installed so far.
    pub fn manifests_installed(&self) -> u64 {
        self.manifests.get().unwrap_or(0)
    }
}

impl ProviderListener for MetricsListener {
    fn on_manifest_installed(&self, _manifest: &Manifest) {
        record(self.manifests.increment());
    }

    fn on_startup_tasks(&self, bundles: &[Arc<BundleInfo>]) {
        record(self.startup_bundles.set(bundles.len() as f64));
    }

    fn on_task_start(&self, _task: &TaskSnapshot) {
        record(self.started.increment());
    }

    fn on_task_complete(&self, task: &TaskSnapshot) {
        record(self.completed.increment());
        match task.state {
            TaskState::Done => record(self.bytes.increment_by(task.bundle.size)),
            _ => record(self.failed.increment()),
        }
    }
}
