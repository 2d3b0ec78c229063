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

//! Identity and observable state of download tasks.

use crate::manifest::BundleInfo;
use std::fmt;
use std::sync::Arc;

/// Identifies one download task for its whole life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Scheduling priority. Higher values run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Priority(pub i32);

impl Priority {
    /// Priority of startup bundles fetched before the manifest is installed.
    pub const STARTUP: Priority = Priority(100);
    /// Priority of bundles fetched on demand.
    pub const NORMAL: Priority = Priority(10);
}

/// The lifecycle state of a download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Waiting for a free concurrency slot.
    Queued,
    /// Handed to a download worker.
    Running,
    /// The bundle file was written and verified.
    Done,
    /// Every attempt failed, or the task was aborted.
    Failed,
}

impl TaskState {
    /// Returns `true` for [`TaskState::Done`] and [`TaskState::Failed`].
    pub fn is_finished(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }
}

/// A point-in-time view of a task, handed to listeners and inspectors.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    /// Task identity.
    pub id: TaskId,
    /// The bundle being fetched.
    pub bundle: Arc<BundleInfo>,
    /// Scheduling priority.
    pub priority: Priority,
    /// State at the time of the snapshot.
    pub state: TaskState,
    /// Attempts started so far.
    pub attempts: u32,
}

impl TaskSnapshot {
    /// The name of the bundle being fetched.
    pub fn name(&self) -> &str {
        &self.bundle.name
    }
}
