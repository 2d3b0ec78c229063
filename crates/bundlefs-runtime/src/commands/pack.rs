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

use anyhow::{bail, Context, Result};
use bundlefs_core::{BundleInfo, BundleKind, ManifestDocument};
use bundlefs_io::{checksum, publish_manifest};
use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

/// Packs each sub-directory of `source` into a zip bundle under `out` and
/// publishes the manifest describing them.
pub fn run(source: &Path, out: &Path, startup: &[String], dependencies: &[String]) -> Result<()> {
    let edges = parse_dependencies(dependencies)?;
    let document = pack(source, out, startup, &edges)?;
    log::info!(
        "Packed {} bundles ({} assets) into {}",
        document.bundles.len(),
        document.bundles.iter().map(|b| b.assets.len()).sum::<usize>(),
        out.display()
    );
    Ok(())
}

fn parse_dependencies(edges: &[String]) -> Result<HashMap<String, Vec<String>>> {
    let mut parsed: HashMap<String, Vec<String>> = HashMap::new();
    for edge in edges {
        let Some((bundle, dependency)) = edge.split_once('=') else {
            bail!("dependency '{edge}' is not of the form bundle=dependency");
        };
        parsed
            .entry(bundle.trim().to_owned())
            .or_default()
            .push(dependency.trim().to_owned());
    }
    Ok(parsed)
}

pub(crate) fn pack(
    source: &Path,
    out: &Path,
    startup: &[String],
    dependencies: &HashMap<String, Vec<String>>,
) -> Result<ManifestDocument> {
    let mut directories: Vec<_> = fs::read_dir(source)
        .with_context(|| format!("reading {}", source.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .collect();
    directories.sort_by_key(|entry| entry.file_name());
    fs::create_dir_all(out)?;

    let mut bundles = Vec::with_capacity(directories.len());
    for entry in directories {
        let name = entry.file_name().to_string_lossy().into_owned();
        let (bytes, assets) = zip_directory(&entry.path(), &name)?;
        fs::write(out.join(&name), &bytes).with_context(|| format!("writing bundle '{name}'"))?;
        log::debug!("Bundle '{name}': {} assets, {} bytes", assets.len(), bytes.len());
        bundles.push(BundleInfo {
            checksum: checksum::digest(&bytes),
            size: bytes.len() as u64,
            kind: BundleKind::ZipArchive,
            startup: startup.contains(&name),
            dependencies: dependencies.get(&name).cloned().unwrap_or_default(),
            assets,
            name,
        });
    }

    let document = ManifestDocument { version: 1, bundles };
    publish_manifest(out, &document).context("publishing manifest")?;
    Ok(document)
}

/// Zips every file under `dir`. Entry names are `<bundle>/<relative path>`.
fn zip_directory(dir: &Path, bundle: &str) -> Result<(Vec<u8>, Vec<String>)> {
    let mut files: Vec<_> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let mut assets = Vec::with_capacity(files.len());
    for path in files {
        let relative = path.strip_prefix(dir)?;
        let parts: Vec<_> = relative.components().map(|c| c.as_os_str().to_string_lossy()).collect();
        let entry = format!("{bundle}/{}", parts.join("/"));
        writer.start_file(entry.as_str(), SimpleFileOptions::default())?;
        writer.write_all(&fs::read(&path)?)?;
        assets.push(entry);
    }
    Ok((writer.finish()?.into_inner(), assets))
}
