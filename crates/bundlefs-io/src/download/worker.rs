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

use super::task::{url_for_attempt, DownloadJob};
use crate::checksum::HashingWriter;
use bundlefs_core::source::{FetchError, Fetcher, LocalCache};
use bundlefs_core::task::TaskId;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use thiserror::Error;

/// A result produced off the owning thread.
#[derive(Debug)]
pub enum WorkerEvent {
    /// A download job finished.
    Download {
        /// The task the job belonged to.
        id: TaskId,
        /// The verified bundle file, or why it could not be obtained.
        result: Result<PathBuf, DownloadError>,
    },
    /// A bundle was read from the pre-seeded local cache.
    CacheLoaded {
        /// The bundle name.
        bundle: String,
        /// The bundle bytes.
        result: io::Result<Vec<u8>>,
    },
}

/// An error raised while downloading one bundle.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The transport failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Writing the bundle file failed.
    #[error("failed to store bundle: {0}")]
    Io(#[from] io::Error),

    /// The transferred bytes do not match the manifest.
    #[error("downloaded {size} bytes with checksum {actual}, expected {expected}")]
    Corrupt {
        /// Checksum from the manifest.
        expected: String,
        /// Checksum of the received bytes.
        actual: String,
        /// Received byte count.
        size: u64,
    },

    /// The task has no candidate URL.
    #[error("no origin configured for bundle '{0}'")]
    NoUrls(String),

    /// Every attempt failed.
    #[error("bundle '{bundle}' failed after {attempts} attempts: {last}")]
    Exhausted {
        /// The bundle name.
        bundle: String,
        /// Attempts made.
        attempts: u32,
        /// The error of the final attempt.
        #[source]
        last: Box<DownloadError>,
    },
}

impl DownloadError {
    /// Returns `true` if the job stopped because it was cancelled.
    pub fn is_cancelled(&self) -> bool {
        match self {
            DownloadError::Fetch(FetchError::Cancelled(_)) => true,
            DownloadError::Exhausted { last, .. } => last.is_cancelled(),
            _ => false,
        }
    }
}

/// Runs download jobs away from the owning thread.
pub trait DownloadWorker {
    /// Starts `job`. The outcome must eventually be reported as a
    /// [`WorkerEvent::Download`] carrying `job.id`.
    fn start(&self, job: DownloadJob);
}

/// Runs every job on its own named thread with a shared [`Fetcher`].
pub struct ThreadedDownloader {
    fetcher: Arc<dyn Fetcher>,
    events: flume::Sender<WorkerEvent>,
}

impl ThreadedDownloader {
    /// Creates a downloader reporting to `events`.
    pub fn new(fetcher: Arc<dyn Fetcher>, events: flume::Sender<WorkerEvent>) -> Self {
        Self { fetcher, events }
    }
}

impl DownloadWorker for ThreadedDownloader {
    fn start(&self, job: DownloadJob) {
        let fetcher = Arc::clone(&self.fetcher);
        let events = self.events.clone();
        let id = job.id;
        let spawned = thread::Builder::new()
            .name(format!("bundlefs-download-{}", job.bundle.name))
            .spawn(move || {
                let result = run_job(fetcher.as_ref(), &job);
                if events.send(WorkerEvent::Download { id, result }).is_err() {
                    log::debug!("Download of '{}' finished after the provider closed", job.bundle.name);
                }
            });
        if let Err(e) = spawned {
            log::error!("Failed to spawn download thread for {id}: {e}");
            let _ = self.events.send(WorkerEvent::Download {
                id,
                result: Err(DownloadError::Io(e)),
            });
        }
    }
}

/// Runs one job to completion on the calling thread.
///
/// Attempt `i` fetches `url_for_attempt(urls, i)`. Each attempt writes to the
/// partial path, verifies size and checksum and renames into place.
pub fn run_job(fetcher: &dyn Fetcher, job: &DownloadJob) -> Result<PathBuf, DownloadError> {
    let budget = job.max_attempts.max(1);
    let mut last = None;
    for attempt in 0..budget {
        let url = url_for_attempt(&job.urls, attempt)
            .ok_or_else(|| DownloadError::NoUrls(job.bundle.name.clone()))?;
        job.attempts.store(attempt + 1, Ordering::Relaxed);
        match attempt_once(fetcher, job, url) {
            Ok(path) => return Ok(path),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                log::warn!(
                    "Attempt {}/{budget} for bundle '{}' from {url} failed: {e}",
                    attempt + 1,
                    job.bundle.name
                );
                last = Some(e);
            }
        }
    }
    let last = last.unwrap_or_else(|| DownloadError::NoUrls(job.bundle.name.clone()));
    Err(DownloadError::Exhausted {
        bundle: job.bundle.name.clone(),
        attempts: budget,
        last: Box::new(last),
    })
}

fn attempt_once(fetcher: &dyn Fetcher, job: &DownloadJob, url: &str) -> Result<PathBuf, DownloadError> {
    if job.cancel.load(Ordering::Relaxed) {
        return Err(FetchError::Cancelled(url.to_owned()).into());
    }
    if let Some(parent) = job.partial.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = HashingWriter::new(BufWriter::new(File::create(&job.partial)?));
    let fetched = fetcher.fetch(url, &mut writer, &job.options, &job.cancel);
    let (file, actual, size) = writer.finish();
    let flushed = file.into_inner().map_err(|e| e.into_error());

    let verified = match (fetched, flushed) {
        (Err(e), _) => Err(DownloadError::from(e)),
        (Ok(_), Err(e)) => Err(DownloadError::from(e)),
        (Ok(_), Ok(_)) if !job.bundle.matches(&actual, size) => Err(DownloadError::Corrupt {
            expected: job.bundle.checksum.clone(),
            actual,
            size,
        }),
        (Ok(_), Ok(_)) => Ok(()),
    };
    if let Err(e) = verified {
        let _ = fs::remove_file(&job.partial);
        return Err(e);
    }
    fs::rename(&job.partial, &job.destination)?;
    Ok(job.destination.clone())
}

/// Reads `name` from the pre-seeded cache on a worker thread.
pub fn spawn_cache_load(cache: Arc<dyn LocalCache>, name: String, events: flume::Sender<WorkerEvent>) {
    let thread_name = format!("bundlefs-cache-{name}");
    let spawned = thread::Builder::new().name(thread_name).spawn({
        let name = name.clone();
        let events = events.clone();
        move || {
            let result = cache.load_bundle(&name);
            if events.send(WorkerEvent::CacheLoaded { bundle: name, result }).is_err() {
                log::debug!("Cache load finished after the provider closed");
            }
        }
    });
    if let Err(e) = spawned {
        log::error!("Failed to spawn cache load for '{name}': {e}");
        let _ = events.send(WorkerEvent::CacheLoaded {
            bundle: name,
            result: Err(e),
        });
    }
}
