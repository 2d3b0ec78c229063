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

//! The manifest: the authoritative description of every bundle and the asset
//! paths it contains.
//!
//! A [`ManifestDocument`] is the serialized form published by an origin. A
//! [`Manifest`] is the validated, indexed runtime form. It is built in full
//! before it is handed out, so a reader can never observe bundles whose asset
//! paths are not indexed yet.

mod bundle_info;

pub use bundle_info::{BundleInfo, BundleKind};

use crate::error::ManifestError;
use crate::graph::topological_sort;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Rewrites an asset path before it is used as an index or cache key.
pub type PathTransform = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// The serialized manifest, as published next to the bundles on an origin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDocument {
    /// A monotonically increasing generation number chosen by the packager.
    #[serde(default)]
    pub version: u32,
    /// Every bundle known to this generation.
    #[serde(default)]
    pub bundles: Vec<BundleInfo>,
}

impl ManifestDocument {
    /// Parses a JSON manifest document.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ManifestError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serializes the document as pretty-printed JSON.
    pub fn to_json(&self) -> Result<Vec<u8>, ManifestError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// A validated manifest generation with its asset-path index.
pub struct Manifest {
    version: u32,
    /// Bundles in dependency order: every bundle follows its dependencies.
    ordered: Vec<Arc<BundleInfo>>,
    bundles: HashMap<String, Arc<BundleInfo>>,
    /// Transformed asset path -> bundle name.
    asset_index: HashMap<String, String>,
}

impl Manifest {
    /// Validates `document` and builds the asset-path index.
    ///
    /// Asset paths are passed through `transform` before being indexed, so
    /// lookups through [`Manifest::find`] must use transformed paths too.
    ///
    /// # Errors
    /// Rejects duplicate bundle names, asset paths listed by two bundles,
    /// dependencies on unknown bundles and dependency cycles.
    pub fn build(
        document: ManifestDocument,
        transform: Option<&PathTransform>,
    ) -> Result<Self, ManifestError> {
        let mut bundles: HashMap<String, Arc<BundleInfo>> = HashMap::new();
        let mut asset_index: HashMap<String, String> = HashMap::new();

        for info in document.bundles {
            for asset in &info.assets {
                let key = match transform {
                    Some(transform) => transform(asset),
                    None => asset.clone(),
                };
                if let Some(first) = asset_index.get(&key) {
                    return Err(ManifestError::DuplicateAsset {
                        path: key,
                        first: first.clone(),
                        second: info.name.clone(),
                    });
                }
                asset_index.insert(key, info.name.clone());
            }
            let name = info.name.clone();
            if bundles.insert(name.clone(), Arc::new(info)).is_some() {
                return Err(ManifestError::DuplicateBundle(name));
            }
        }

        let mut names: Vec<&str> = bundles.keys().map(String::as_str).collect();
        names.sort_unstable();
        let mut edges = Vec::new();
        for &name in &names {
            for dependency in &bundles[name].dependencies {
                if !bundles.contains_key(dependency) {
                    return Err(ManifestError::UnknownDependency {
                        bundle: name.to_owned(),
                        dependency: dependency.clone(),
                    });
                }
                edges.push((dependency.as_str(), name));
            }
        }

        let order = topological_sort(names, edges).map_err(|cycle| {
            ManifestError::CyclicDependency(cycle.remaining.into_iter().map(str::to_owned).collect())
        })?;
        let ordered = order
            .into_iter()
            .map(|name| Arc::clone(&bundles[name]))
            .collect();

        Ok(Self {
            version: document.version,
            ordered,
            bundles,
            asset_index,
        })
    }

    /// The generation number of this manifest.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Looks up a bundle by name.
    pub fn bundle(&self, name: &str) -> Option<&Arc<BundleInfo>> {
        self.bundles.get(name)
    }

    /// Returns the name of the bundle containing the (transformed) asset path.
    pub fn find(&self, asset_path: &str) -> Option<&str> {
        self.asset_index.get(asset_path).map(String::as_str)
    }

    /// Iterates bundles so that dependencies are visited before dependents.
    pub fn bundles(&self) -> impl Iterator<Item = &Arc<BundleInfo>> {
        self.ordered.iter()
    }

    /// Bundles flagged as required before normal operation begins.
    pub fn startup_bundles(&self) -> impl Iterator<Item = &Arc<BundleInfo>> {
        self.ordered.iter().filter(|info| info.startup)
    }

    /// Number of bundles.
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Returns `true` if the manifest declares no bundles.
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Number of indexed asset paths.
    pub fn asset_count(&self) -> usize {
        self.asset_index.len()
    }
}

impl fmt::Debug for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manifest")
            .field("version", &self.version)
            .field("bundles", &self.ordered.len())
            .field("assets", &self.asset_index.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(name: &str, dependencies: &[&str], assets: &[&str]) -> BundleInfo {
        BundleInfo {
            name: name.to_owned(),
            checksum: String::new(),
            size: 0,
            kind: BundleKind::ContentArchive,
            startup: false,
            dependencies: dependencies.iter().map(|s| s.to_string()).collect(),
            assets: assets.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn document(bundles: Vec<BundleInfo>) -> ManifestDocument {
        ManifestDocument {
            version: 3,
            bundles,
        }
    }

    #[test]
    fn indexes_every_asset_path() {
        let manifest = Manifest::build(
            document(vec![
                bundle("ui", &["fonts"], &["Assets/UI/main.prefab", "Assets/UI/icon.png"]),
                bundle("fonts", &[], &["Assets/Fonts/sans.ttf"]),
            ]),
            None,
        )
        .unwrap();

        assert_eq!(manifest.version(), 3);
        assert_eq!(manifest.asset_count(), 3);
        assert_eq!(manifest.find("Assets/UI/icon.png"), Some("ui"));
        assert_eq!(manifest.find("Assets/Fonts/sans.ttf"), Some("fonts"));
        assert_eq!(manifest.find("Assets/missing"), None);
    }

    #[test]
    fn bundles_are_in_dependency_order() {
        let manifest = Manifest::build(
            document(vec![
                bundle("a", &["b"], &[]),
                bundle("b", &["c"], &[]),
                bundle("c", &[], &[]),
            ]),
            None,
        )
        .unwrap();

        let names: Vec<&str> = manifest.bundles().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[test]
    fn transform_is_applied_to_index_keys() {
        let lower: PathTransform = Arc::new(|path: &str| path.to_lowercase());
        let manifest = Manifest::build(
            document(vec![bundle("ui", &[], &["Assets/UI/Main.prefab"])]),
            Some(&lower),
        )
        .unwrap();

        assert_eq!(manifest.find("assets/ui/main.prefab"), Some("ui"));
        assert_eq!(manifest.find("Assets/UI/Main.prefab"), None);
    }

    #[test]
    fn rejects_asset_listed_twice() {
        let err = Manifest::build(
            document(vec![
                bundle("a", &[], &["Assets/shared.txt"]),
                bundle("b", &[], &["Assets/shared.txt"]),
            ]),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateAsset { ref first, ref second, .. }
            if first == "a" && second == "b"));
    }

    #[test]
    fn rejects_duplicate_bundle_names() {
        let err = Manifest::build(document(vec![bundle("a", &[], &[]), bundle("a", &[], &[])]), None)
            .unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateBundle(ref name) if name == "a"));
    }

    #[test]
    fn rejects_unknown_dependency() {
        let err = Manifest::build(document(vec![bundle("a", &["ghost"], &[])]), None).unwrap_err();
        assert!(matches!(err, ManifestError::UnknownDependency { ref dependency, .. }
            if dependency == "ghost"));
    }

    #[test]
    fn rejects_dependency_cycles() {
        let err = Manifest::build(
            document(vec![
                bundle("a", &["b"], &[]),
                bundle("b", &["a"], &[]),
                bundle("c", &[], &[]),
            ]),
            None,
        )
        .unwrap_err();
        match err {
            ManifestError::CyclicDependency(names) => assert_eq!(names, vec!["a", "b"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn document_round_trips_through_json() {
        let doc = document(vec![bundle("a", &[], &["Assets/a.txt"])]);
        let parsed = ManifestDocument::from_json(&doc.to_json().unwrap()).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = ManifestDocument::from_json(b"{ not json").unwrap_err();
        assert!(matches!(err, ManifestError::Malformed(_)));
    }
}
