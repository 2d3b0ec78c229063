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

//! Collaborator traits for everything that moves bytes: the byte transport,
//! the manifest transport and the pre-seeded read-only local cache.
//!
//! Implementations are called from worker threads and must be `Send + Sync`.

use crate::error::ManifestError;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use thiserror::Error;

/// Throughput parameters applied to one transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Chunk size in bytes; `0` lets the fetcher pick.
    pub buffer_size: usize,
    /// Delay inserted after every chunk, used to simulate slow links.
    pub chunk_delay: Duration,
}

impl FetchOptions {
    /// Chunk size used when none is configured.
    pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

    /// The chunk size to use, falling back to [`Self::DEFAULT_BUFFER_SIZE`].
    pub fn effective_buffer_size(&self) -> usize {
        if self.buffer_size == 0 {
            Self::DEFAULT_BUFFER_SIZE
        } else {
            self.buffer_size
        }
    }
}

/// An error raised by a single transfer attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Reading the source or writing the sink failed.
    #[error("I/O error while fetching '{url}': {source}")]
    Io {
        /// The URL being fetched.
        url: String,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// The origin answered with a non-success status.
    #[error("origin returned status {status} for '{url}'")]
    Status {
        /// The URL being fetched.
        url: String,
        /// The status code.
        status: u16,
    },

    /// The fetcher does not understand the URL scheme.
    #[error("unsupported url '{0}'")]
    UnsupportedUrl(String),

    /// The transfer was cancelled through its cancel flag.
    #[error("fetch of '{0}' was cancelled")]
    Cancelled(String),

    /// Any other transport failure.
    #[error("transport error for '{url}': {message}")]
    Transport {
        /// The URL being fetched.
        url: String,
        /// A description of the failure.
        message: String,
    },
}

/// Moves the bytes behind a URL into a sink.
pub trait Fetcher: Send + Sync {
    /// Streams `url` into `sink`, honouring `options`, and returns the number
    /// of bytes written.
    ///
    /// Implementations should check `cancel` between chunks and return
    /// [`FetchError::Cancelled`] once it is set.
    fn fetch(
        &self,
        url: &str,
        sink: &mut dyn Write,
        options: &FetchOptions,
        cancel: &AtomicBool,
    ) -> Result<u64, FetchError>;
}

/// Produces the bytes of the current manifest document.
pub trait ManifestTransport: Send + Sync {
    /// Returns checksum-verified manifest bytes, preferring a valid copy under
    /// `local_root` over a network round-trip.
    fn fetch_manifest(&self, urls: &[String], local_root: &Path) -> Result<Vec<u8>, ManifestError>;
}

/// A read-only store of bundles shipped with the application.
///
/// Queried before a bundle is downloaded; a hit is loaded on a worker thread.
pub trait LocalCache: Send + Sync {
    /// Returns `true` if the cache holds exactly this version of the bundle.
    fn contains(&self, name: &str, checksum: &str, size: u64) -> bool;

    /// Reads the cached bundle bytes.
    fn load_bundle(&self, name: &str) -> io::Result<Vec<u8>>;
}
