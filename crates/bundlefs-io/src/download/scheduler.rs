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

use super::task::{DownloadJob, DownloadTask, TaskCallback, TaskOutcome};
use super::worker::{DownloadError, DownloadWorker};
use crate::local_store::LocalStore;
use bundlefs_core::config::MAX_CONCURRENT_TASKS;
use bundlefs_core::source::FetchOptions;
use bundlefs_core::task::{TaskId, TaskSnapshot, TaskState};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// A task removed from the scheduler after its job reported back.
///
/// The callback is not run by the scheduler itself, so the caller can release
/// its own borrows first.
pub struct FinishedTask {
    /// The task in its final state.
    pub snapshot: TaskSnapshot,
    /// What the task produced.
    pub outcome: TaskOutcome,
    callback: Option<TaskCallback>,
}

impl FinishedTask {
    /// Runs the completion callback. Subsequent calls do nothing.
    pub fn run_callback(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(&self.outcome);
        }
    }
}

/// Queues download tasks by priority and starts them under a concurrency cap.
///
/// Tasks stay in the list while queued or running, in start order: queued
/// tasks are sorted by descending priority, FIFO among equal priorities.
///
/// Once [`DownloadScheduler::abort`] ran, the scheduler is stopped and refuses
/// new work.
pub struct DownloadScheduler {
    tasks: Vec<DownloadTask>,
    running: usize,
    stopped: bool,
    concurrency: usize,
    max_attempts: u32,
    options: FetchOptions,
    store: LocalStore,
    worker: Box<dyn DownloadWorker>,
}

impl DownloadScheduler {
    /// Creates a scheduler writing verified bundles into `store`.
    ///
    /// `concurrency` is clamped to `1..=MAX_CONCURRENT_TASKS`.
    pub fn new(
        store: LocalStore,
        worker: Box<dyn DownloadWorker>,
        concurrency: usize,
        max_attempts: u32,
        options: FetchOptions,
    ) -> Self {
        Self {
            tasks: Vec::new(),
            running: 0,
            stopped: false,
            concurrency: concurrency.clamp(1, MAX_CONCURRENT_TASKS),
            max_attempts: max_attempts.max(1),
            options,
            store,
            worker,
        }
    }

    /// The effective concurrency cap.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns `true` once the scheduler was aborted.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Adds a task to the queue without starting it.
    ///
    /// Returns `None` and drops the task, callback included, if the scheduler
    /// is stopped.
    pub fn enqueue(&mut self, task: DownloadTask) -> Option<TaskId> {
        if self.stopped {
            log::warn!("Scheduler stopped, dropping download of '{}'", task.info.name);
            return None;
        }
        let id = task.id;
        let index = self
            .tasks
            .iter()
            .position(|queued| queued.state == TaskState::Queued && queued.priority < task.priority)
            .unwrap_or(self.tasks.len());
        log::trace!("Enqueued {id} for '{}' at {index} ({:?})", task.info.name, task.priority);
        self.tasks.insert(index, task);
        Some(id)
    }

    /// Starts queued tasks until the concurrency cap is reached.
    ///
    /// Returns snapshots of the tasks started by this call, in start order.
    pub fn schedule(&mut self) -> Vec<TaskSnapshot> {
        let mut started = Vec::new();
        while !self.stopped && self.running < self.concurrency {
            let Some(task) = self.tasks.iter_mut().find(|t| t.state == TaskState::Queued) else {
                break;
            };
            task.state = TaskState::Running;
            task.options = self.options;
            let job = DownloadJob {
                id: task.id,
                bundle: Arc::clone(&task.info),
                urls: task.urls.clone(),
                destination: self.store.path_for(&task.info.name),
                partial: self.store.partial_path_for(&task.info.name),
                max_attempts: self.max_attempts,
                options: task.options,
                attempts: Arc::clone(&task.attempts),
                cancel: Arc::clone(&task.cancel),
            };
            started.push(task.snapshot());
            self.running += 1;
            self.worker.start(job);
        }
        started
    }

    /// Removes the task `id` and reports its outcome.
    ///
    /// Returns `None` if the task is unknown, for example because it was
    /// aborted while its job was in flight.
    pub fn finish(&mut self, id: TaskId, result: Result<PathBuf, DownloadError>) -> Option<FinishedTask> {
        let index = self.tasks.iter().position(|t| t.id == id)?;
        let task = self.tasks.remove(index);
        if task.state == TaskState::Running {
            self.running -= 1;
        }
        let result = result.map_err(|e| {
            log::warn!("Download of '{}' failed: {e}", task.info.name);
            e.to_string()
        });
        Some(conclude(task, result))
    }

    /// Stops the scheduler and cancels every queued and running task.
    ///
    /// The tasks come back failed, callbacks attached, so their owners can
    /// settle. Results their jobs report later are ignored by
    /// [`DownloadScheduler::finish`].
    pub fn abort(&mut self) -> Vec<FinishedTask> {
        self.stopped = true;
        self.running = 0;
        self.tasks
            .drain(..)
            .map(|task| {
                task.cancel.store(true, Ordering::Relaxed);
                conclude(task, Err("aborted".to_owned()))
            })
            .collect()
    }

    /// Queued and running tasks, running ones first.
    pub fn tasks(&self) -> impl Iterator<Item = &DownloadTask> {
        self.tasks.iter()
    }

    /// Number of running tasks.
    pub fn running_count(&self) -> usize {
        self.running
    }

    /// Number of queued tasks.
    pub fn queued_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.state == TaskState::Queued).count()
    }

    /// Number of queued and running tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if nothing is queued or running.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

fn conclude(mut task: DownloadTask, result: Result<PathBuf, String>) -> FinishedTask {
    let (path, error) = match result {
        Ok(path) => {
            task.state = TaskState::Done;
            (Some(path), None)
        }
        Err(e) => {
            task.state = TaskState::Failed;
            (None, Some(e))
        }
    };
    let outcome = TaskOutcome {
        bundle: Arc::clone(&task.info),
        path,
        attempts: task.attempts.load(Ordering::Relaxed),
        error,
    };
    FinishedTask {
        snapshot: task.snapshot(),
        outcome,
        callback: task.callback.take(),
    }
}
