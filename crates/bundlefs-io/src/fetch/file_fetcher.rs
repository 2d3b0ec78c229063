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

use super::copy_throttled;
use bundlefs_core::source::{FetchError, FetchOptions, Fetcher};
use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

/// Fetches from a directory origin: plain paths and `file://` URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileFetcher;

impl FileFetcher {
    fn resolve(url: &str) -> Option<PathBuf> {
        if let Some(path) = url.strip_prefix("file://") {
            Some(PathBuf::from(path))
        } else if url.contains("://") {
            None
        } else {
            Some(PathBuf::from(url))
        }
    }
}

impl Fetcher for FileFetcher {
    fn fetch(
        &self,
        url: &str,
        sink: &mut dyn Write,
        options: &FetchOptions,
        cancel: &AtomicBool,
    ) -> Result<u64, FetchError> {
        let path = Self::resolve(url).ok_or_else(|| FetchError::UnsupportedUrl(url.to_owned()))?;
        let mut file = File::open(&path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => FetchError::Status {
                url: url.to_owned(),
                status: 404,
            },
            _ => FetchError::Io {
                url: url.to_owned(),
                source,
            },
        })?;
        copy_throttled(url, &mut file, sink, options, cancel)
    }
}
