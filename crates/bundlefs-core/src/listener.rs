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

//! Notification hooks. Listeners observe the lifecycle; they cannot influence
//! scheduling decisions.

use crate::manifest::{BundleInfo, Manifest};
use crate::task::TaskSnapshot;
use std::sync::Arc;

/// Receives provider lifecycle events on the owning thread.
pub trait ProviderListener {
    /// A manifest generation was installed.
    fn on_manifest_installed(&self, _manifest: &Manifest) {}

    /// The set of startup bundles that must be fetched is known.
    fn on_startup_tasks(&self, _bundles: &[Arc<BundleInfo>]) {}

    /// A download task was handed to a worker.
    fn on_task_start(&self, _task: &TaskSnapshot) {}

    /// A download task finished, successfully or not.
    fn on_task_complete(&self, _task: &TaskSnapshot) {}
}

/// Receives asset access telemetry on the owning thread.
pub trait AssetAnalyzer {
    /// An asset was minted for `path`.
    fn on_asset_open(&self, _path: &str) {}

    /// A live cached asset was returned for `path`.
    fn on_asset_access(&self, _path: &str) {}

    /// The asset for `path` was disposed.
    fn on_asset_close(&self, _path: &str) {}
}

/// A listener that writes lifecycle events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl ProviderListener for LoggingListener {
    fn on_manifest_installed(&self, manifest: &Manifest) {
        log::info!(
            "Manifest v{} installed ({} bundles, {} assets)",
            manifest.version(),
            manifest.len(),
            manifest.asset_count()
        );
    }

    fn on_startup_tasks(&self, bundles: &[Arc<BundleInfo>]) {
        let total: u64 = bundles.iter().map(|b| b.size).sum();
        log::info!(
            "Startup bundles to download: {} ({:.2} KiB)",
            bundles.len(),
            total as f64 / 1024.0
        );
    }

    fn on_task_start(&self, task: &TaskSnapshot) {
        log::debug!("{} started: {}", task.id, task.name());
    }

    fn on_task_complete(&self, task: &TaskSnapshot) {
        log::debug!("{} complete: {} ({:?})", task.id, task.name(), task.state);
    }
}

/// An analyzer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAnalyzer;

impl AssetAnalyzer for NullAnalyzer {}
