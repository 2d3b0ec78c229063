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

use std::time::Duration;

/// A multi-producer, single-consumer queue from worker threads to the owner.
///
/// Producers get a cloned [`flume::Sender`]; the owning thread keeps the
/// `HandOff` and drains it with [`HandOff::drain`] or [`HandOff::wait`].
#[derive(Debug)]
pub struct HandOff<T: Send + 'static> {
    sender: flume::Sender<T>,
    receiver: flume::Receiver<T>,
}

impl<T: Send + 'static> HandOff<T> {
    /// Creates an unbounded hand-off queue.
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self { sender, receiver }
    }

    /// Returns a sender for a worker thread.
    pub fn sender(&self) -> flume::Sender<T> {
        self.sender.clone()
    }

    /// Posts a message from the owning thread itself.
    pub fn post(&self, message: T) {
        if let Err(e) = self.sender.send(message) {
            log::error!("Failed to post to hand-off queue: {e}");
        }
    }

    /// Takes every message currently queued, in posting order.
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }

    /// Blocks up to `timeout` for the first message, then takes it together
    /// with everything queued behind it.
    pub fn wait(&self, timeout: Duration) -> Vec<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(first) => {
                let mut messages = vec![first];
                messages.extend(self.receiver.try_iter());
                messages
            }
            Err(_) => Vec::new(),
        }
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns `true` if no message is queued.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl<T: Send + 'static> Default for HandOff<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[derive(Debug, Clone, PartialEq)]
    enum WorkerResult {
        Fetched { name: String, bytes: usize },
        Failed(String),
    }

    #[test]
    fn drain_empty_queue() {
        let queue = HandOff::<WorkerResult>::new();
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn drain_preserves_posting_order() {
        let queue = HandOff::new();
        queue.post(WorkerResult::Failed("a".into()));
        queue.post(WorkerResult::Fetched {
            name: "b".into(),
            bytes: 3,
        });
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert_eq!(
            drained,
            vec![
                WorkerResult::Failed("a".into()),
                WorkerResult::Fetched {
                    name: "b".into(),
                    bytes: 3
                },
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn wait_receives_from_worker_thread() {
        let queue = HandOff::new();
        let sender = queue.sender();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            sender
                .send(WorkerResult::Fetched {
                    name: "ui".into(),
                    bytes: 42,
                })
                .expect("Send from thread failed");
        });

        let received = queue.wait(Duration::from_secs(1));
        assert_eq!(
            received,
            vec![WorkerResult::Fetched {
                name: "ui".into(),
                bytes: 42
            }]
        );
        handle.join().expect("Thread join failed");
    }

    #[test]
    fn wait_times_out_without_messages() {
        let queue = HandOff::<WorkerResult>::new();
        assert!(queue.wait(Duration::from_millis(10)).is_empty());
    }
}
