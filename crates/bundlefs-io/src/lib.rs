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

//! # BundleFS I/O
//!
//! Everything that touches bytes: verifying and reading bundles on local
//! storage, fetching them from origins, scheduling downloads under a
//! concurrency cap, acquiring the manifest and opening the built-in bundle
//! formats.
//!
//! Types in [`download::scheduler`] live on the owning thread; the fetch itself
//! runs on worker threads that report back through a
//! [`HandOff`](bundlefs_core::event::HandOff) queue as [`WorkerEvent`]s.

pub mod checksum;
pub mod download;
pub mod fetch;
pub mod local_cache;
pub mod local_store;
pub mod manifest_transport;
pub mod openers;

pub use download::{
    DownloadError, DownloadJob, DownloadScheduler, DownloadTask, DownloadWorker, FinishedTask,
    TaskOutcome, ThreadedDownloader, WorkerEvent,
};
pub use fetch::FileFetcher;
#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
pub use local_cache::DirectoryCache;
pub use local_store::LocalStore;
pub use manifest_transport::{load_manifest, publish_manifest, OriginManifestTransport};
pub use openers::{FileListEntry, FileListManifest, FileListOpener, ZipArchiveOpener};
