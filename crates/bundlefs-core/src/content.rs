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

//! The opaque content of a loaded bundle and the openers that produce it.
//!
//! The lifecycle manager never decodes bundle formats itself. Each
//! [`BundleKind`](crate::BundleKind) is mapped to a [`BundleOpener`] that turns
//! the raw bytes into a [`BundleContent`], which in turn serves assets.

use crate::manifest::{BundleInfo, BundleKind};
use std::any::{Any, TypeId};
use std::rc::Rc;
use thiserror::Error;

/// An error raised while turning bundle bytes into content.
#[derive(Debug, Error)]
pub enum OpenError {
    /// The bytes are not a valid bundle of the declared kind.
    #[error("bundle '{bundle}' is corrupt: {reason}")]
    Corrupt {
        /// The bundle name.
        bundle: String,
        /// What was wrong with it.
        reason: String,
    },

    /// No opener is registered for the bundle's kind.
    #[error("no opener registered for {0:?} bundles")]
    NoOpener(BundleKind),
}

/// Decoded content of one bundle. Lives on the owning thread.
pub trait BundleContent {
    /// Returns a copy of the bytes stored under `path`.
    fn read_bytes(&self, path: &str) -> Option<Vec<u8>>;

    /// Returns `true` if `path` is stored in this bundle.
    fn contains(&self, path: &str) -> bool;

    /// Lists the stored paths.
    fn entries(&self) -> Vec<String> {
        Vec::new()
    }

    /// Produces the object stored under `path`, optionally decoded as the
    /// requested type.
    fn load_object(&self, _path: &str, _type_id: Option<TypeId>) -> Option<Rc<dyn Any>> {
        None
    }
}

/// Content handed to bundles that could not be obtained or opened.
///
/// Every read reports absence.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyContent;

impl BundleContent for EmptyContent {
    fn read_bytes(&self, _path: &str) -> Option<Vec<u8>> {
        None
    }

    fn contains(&self, _path: &str) -> bool {
        false
    }
}

/// Turns the raw bytes of a bundle into content.
pub trait BundleOpener {
    /// Opens `bytes` as the bundle described by `info`.
    fn open(&self, info: &BundleInfo, bytes: Vec<u8>) -> Result<Box<dyn BundleContent>, OpenError>;
}

impl<F> BundleOpener for F
where
    F: Fn(&BundleInfo, Vec<u8>) -> Result<Box<dyn BundleContent>, OpenError>,
{
    fn open(&self, info: &BundleInfo, bytes: Vec<u8>) -> Result<Box<dyn BundleContent>, OpenError> {
        self(info, bytes)
    }
}
