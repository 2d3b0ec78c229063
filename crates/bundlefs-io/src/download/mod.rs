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

//! Priority-ordered bundle downloads under a concurrency cap.
//!
//! The [`DownloadScheduler`] owns the task queue and runs on the owning
//! thread. Each started task becomes a [`DownloadJob`] handed to a
//! [`DownloadWorker`]; the worker reports back with a [`WorkerEvent`] which the
//! owner feeds into [`DownloadScheduler::finish`].

mod scheduler;
mod task;
mod worker;

pub use scheduler::{DownloadScheduler, FinishedTask};
pub use task::{url_for_attempt, DownloadJob, DownloadTask, TaskCallback, TaskOutcome};
pub use worker::{run_job, spawn_cache_load, DownloadError, DownloadWorker, ThreadedDownloader, WorkerEvent};
