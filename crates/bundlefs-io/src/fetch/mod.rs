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

//! [`Fetcher`](bundlefs_core::source::Fetcher) implementations.

mod file_fetcher;
#[cfg(feature = "http")]
mod http_fetcher;

pub use file_fetcher::FileFetcher;
#[cfg(feature = "http")]
pub use http_fetcher::HttpFetcher;

use bundlefs_core::source::{FetchError, FetchOptions};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Joins an origin base URL and a file name.
pub fn join_url(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

/// Copies `source` into `sink` chunk by chunk, applying the throttle and
/// checking `cancel` between chunks.
pub(crate) fn copy_throttled(
    url: &str,
    source: &mut dyn Read,
    sink: &mut dyn Write,
    options: &FetchOptions,
    cancel: &AtomicBool,
) -> Result<u64, FetchError> {
    let io_error = |source| FetchError::Io {
        url: url.to_owned(),
        source,
    };
    let mut buffer = vec![0u8; options.effective_buffer_size()];
    let mut total = 0u64;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(FetchError::Cancelled(url.to_owned()));
        }
        let n = source.read(&mut buffer).map_err(io_error)?;
        if n == 0 {
            break;
        }
        sink.write_all(&buffer[..n]).map_err(io_error)?;
        total += n as u64;
        if !options.chunk_delay.is_zero() {
            thread::sleep(options.chunk_delay);
        }
    }
    sink.flush().map_err(io_error)?;
    Ok(total)
}
