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

use crate::fetch::join_url;
use bundlefs_core::source::FetchOptions;
use bundlefs_core::task::{Priority, TaskId, TaskSnapshot, TaskState};
use bundlefs_core::BundleInfo;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Invoked once on the owning thread when a task finishes.
pub type TaskCallback = Box<dyn FnOnce(&TaskOutcome)>;

/// What a finished task produced.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// The bundle that was fetched.
    pub bundle: Arc<BundleInfo>,
    /// The verified bundle file, or `None` if every attempt failed.
    pub path: Option<PathBuf>,
    /// Attempts made.
    pub attempts: u32,
    /// The last error, for failed tasks.
    pub error: Option<String>,
}

impl TaskOutcome {
    /// Returns `true` if the bundle file was obtained.
    pub fn is_success(&self) -> bool {
        self.path.is_some()
    }
}

/// Picks the address for a 0-based attempt.
///
/// Addresses are tried in order; attempts past the end of the list keep using
/// the last address. Returns `None` for an empty list.
pub fn url_for_attempt(urls: &[String], attempt: u32) -> Option<&str> {
    let last = urls.len().checked_sub(1)?;
    let index = (attempt as usize).min(last);
    Some(urls[index].as_str())
}

/// One bundle fetch waiting in, or running from, the scheduler.
pub struct DownloadTask {
    pub(crate) id: TaskId,
    pub(crate) info: Arc<BundleInfo>,
    pub(crate) urls: Vec<String>,
    pub(crate) priority: Priority,
    pub(crate) state: TaskState,
    pub(crate) options: FetchOptions,
    pub(crate) attempts: Arc<AtomicU32>,
    pub(crate) cancel: Arc<AtomicBool>,
    pub(crate) callback: Option<TaskCallback>,
}

impl DownloadTask {
    /// Creates a queued task fetching `info` from the given origin base URLs.
    pub fn new(
        info: Arc<BundleInfo>,
        origins: &[String],
        priority: Priority,
        callback: impl FnOnce(&TaskOutcome) + 'static,
    ) -> Self {
        let urls = origins.iter().map(|base| join_url(base, &info.name)).collect();
        Self {
            id: TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)),
            info,
            urls,
            priority,
            state: TaskState::Queued,
            options: FetchOptions::default(),
            attempts: Arc::new(AtomicU32::new(0)),
            cancel: Arc::new(AtomicBool::new(false)),
            callback: Some(Box::new(callback)),
        }
    }

    /// The task identity.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The bundle being fetched.
    pub fn info(&self) -> &Arc<BundleInfo> {
        &self.info
    }

    /// Full candidate URLs for the bundle file.
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// The scheduling priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// The current state.
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Throughput parameters applied when the task was started.
    pub fn options(&self) -> FetchOptions {
        self.options
    }

    /// A point-in-time view of the task.
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            bundle: Arc::clone(&self.info),
            priority: self.priority,
            state: self.state,
            attempts: self.attempts.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for DownloadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadTask")
            .field("id", &self.id)
            .field("bundle", &self.info.name)
            .field("priority", &self.priority)
            .field("state", &self.state)
            .field("attempts", &self.attempts.load(Ordering::Relaxed))
            .finish()
    }
}

/// Everything a worker needs to run a task. Sent to the worker thread.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    /// The task this job belongs to.
    pub id: TaskId,
    /// The bundle being fetched.
    pub bundle: Arc<BundleInfo>,
    /// Candidate URLs, rotated by attempt.
    pub urls: Vec<String>,
    /// Final location of the verified file.
    pub destination: PathBuf,
    /// Location the transfer is written to before verification.
    pub partial: PathBuf,
    /// Attempt budget.
    pub max_attempts: u32,
    /// Throughput parameters.
    pub options: FetchOptions,
    /// Attempt counter shared with the owning task.
    pub attempts: Arc<AtomicU32>,
    /// Raised when the task is aborted.
    pub cancel: Arc<AtomicBool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_url_is_reused() {
        let urls = urls(&["u0"]);
        let picked: Vec<_> = (0..5).map(|i| url_for_attempt(&urls, i).unwrap()).collect();
        assert_eq!(picked, vec!["u0"; 5]);
    }

    #[test]
    fn last_url_is_retried_past_the_list() {
        let urls = urls(&["u0", "u1"]);
        let picked: Vec<_> = (0..5).map(|i| url_for_attempt(&urls, i).unwrap()).collect();
        assert_eq!(picked, vec!["u0", "u1", "u1", "u1", "u1"]);
    }

    #[test]
    fn no_urls_yields_none() {
        assert_eq!(url_for_attempt(&[], 0), None);
    }

    #[test]
    fn task_urls_point_at_bundle_file() {
        let info = Arc::new(BundleInfo {
            name: "ui".into(),
            checksum: String::new(),
            size: 0,
            kind: bundlefs_core::BundleKind::ZipArchive,
            startup: false,
            dependencies: Vec::new(),
            assets: Vec::new(),
        });
        let task = DownloadTask::new(info, &urls(&["http://a/", "http://b"]), Priority::NORMAL, |_| {});
        assert_eq!(task.urls(), ["http://a/ui", "http://b/ui"]);
        assert_eq!(task.state(), TaskState::Queued);
    }
}
