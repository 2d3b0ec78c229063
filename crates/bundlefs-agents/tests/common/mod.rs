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

#![allow(dead_code)]

use anyhow::Result;
use bundlefs_agents::{Provider, ProviderBuilder};
use bundlefs_core::content::{BundleContent, OpenError};
use bundlefs_core::{BundleInfo, BundleKind, ManifestDocument, ProviderConfig};
use bundlefs_io::download::run_job;
use bundlefs_io::{checksum, publish_manifest, DownloadJob, DownloadWorker, FileFetcher, WorkerEvent};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

pub const TIMEOUT: Duration = Duration::from_secs(10);

/// A bundle served by a test origin.
pub struct TestBundle {
    pub name: &'static str,
    pub kind: BundleKind,
    pub startup: bool,
    pub dependencies: Vec<&'static str>,
    pub files: Vec<(&'static str, &'static str)>,
}

impl TestBundle {
    pub fn content(name: &'static str, files: &[(&'static str, &'static str)]) -> Self {
        Self {
            name,
            kind: BundleKind::ContentArchive,
            startup: false,
            dependencies: Vec::new(),
            files: files.to_vec(),
        }
    }

    pub fn depends_on(mut self, names: &[&'static str]) -> Self {
        self.dependencies = names.to_vec();
        self
    }

    pub fn startup(mut self) -> Self {
        self.startup = true;
        self
    }

    /// `path=value` lines, the format read by [`TextOpener`].
    pub fn payload(&self) -> Vec<u8> {
        self.files
            .iter()
            .map(|(path, value)| format!("{path}={value}\n"))
            .collect::<String>()
            .into_bytes()
    }

    pub fn info(&self) -> BundleInfo {
        let payload = self.payload();
        BundleInfo {
            name: self.name.to_owned(),
            checksum: checksum::digest(&payload),
            size: payload.len() as u64,
            kind: self.kind,
            startup: self.startup,
            dependencies: self.dependencies.iter().map(|d| d.to_string()).collect(),
            assets: self.files.iter().map(|(path, _)| path.to_string()).collect(),
        }
    }
}

pub fn document(bundles: &[TestBundle]) -> ManifestDocument {
    ManifestDocument {
        version: 1,
        bundles: bundles.iter().map(TestBundle::info).collect(),
    }
}

/// Writes the bundles and the published manifest into `dir`.
pub fn publish(dir: &Path, bundles: &[TestBundle]) -> Result<()> {
    for bundle in bundles {
        std::fs::write(dir.join(bundle.name), bundle.payload())?;
    }
    publish_manifest(dir, &document(bundles))?;
    Ok(())
}

pub fn config(origin: &Path, local: &Path) -> ProviderConfig {
    ProviderConfig::new([origin.display().to_string()], local).with_max_attempts(2)
}

/// Counts opened and dropped [`TextContent`]s.
#[derive(Default)]
pub struct ContentCounters {
    pub opened: Cell<usize>,
    pub dropped: Cell<usize>,
}

/// Serves the `path=value` format.
pub struct TextOpener(pub Rc<ContentCounters>);

impl bundlefs_core::content::BundleOpener for TextOpener {
    fn open(&self, info: &BundleInfo, bytes: Vec<u8>) -> Result<Box<dyn BundleContent>, OpenError> {
        let text = String::from_utf8(bytes).map_err(|e| OpenError::Corrupt {
            bundle: info.name.clone(),
            reason: e.to_string(),
        })?;
        let files = text
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(path, value)| (path.to_owned(), value.as_bytes().to_vec()))
            .collect();
        self.0.opened.set(self.0.opened.get() + 1);
        Ok(Box::new(TextContent {
            files,
            counters: Rc::clone(&self.0),
        }))
    }
}

pub struct TextContent {
    files: HashMap<String, Vec<u8>>,
    counters: Rc<ContentCounters>,
}

impl BundleContent for TextContent {
    fn read_bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.files.get(path).cloned()
    }

    fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn entries(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }
}

impl Drop for TextContent {
    fn drop(&mut self) {
        self.counters.dropped.set(self.counters.dropped.get() + 1);
    }
}

pub fn builder(config: ProviderConfig, counters: &Rc<ContentCounters>) -> ProviderBuilder {
    Provider::builder(config).with_opener(BundleKind::ContentArchive, TextOpener(Rc::clone(counters)))
}

/// A worker that only records jobs; the test decides when each one runs.
#[derive(Clone, Default)]
pub struct ManualWorker {
    jobs: Rc<RefCell<Vec<DownloadJob>>>,
    events: Rc<RefCell<Option<flume::Sender<WorkerEvent>>>>,
}

impl ManualWorker {
    pub fn attach(&self, events: flume::Sender<WorkerEvent>) -> Self {
        *self.events.borrow_mut() = Some(events);
        self.clone()
    }

    pub fn pending(&self) -> Vec<String> {
        self.jobs.borrow().iter().map(|job| job.bundle.name.clone()).collect()
    }

    /// Runs the job for `bundle` with a [`FileFetcher`] and posts its result.
    pub fn complete(&self, bundle: &str) -> Result<()> {
        let job = {
            let mut jobs = self.jobs.borrow_mut();
            let index = jobs
                .iter()
                .position(|job| job.bundle.name == bundle)
                .ok_or_else(|| anyhow::anyhow!("no job for '{bundle}'"))?;
            jobs.remove(index)
        };
        let result = run_job(&FileFetcher, &job);
        let events = self.events.borrow().clone().ok_or_else(|| anyhow::anyhow!("worker not attached"))?;
        events
            .send(WorkerEvent::Download { id: job.id, result })
            .map_err(|_| anyhow::anyhow!("event queue closed"))?;
        Ok(())
    }
}

impl DownloadWorker for ManualWorker {
    fn start(&self, job: DownloadJob) {
        self.jobs.borrow_mut().push(job);
    }
}
