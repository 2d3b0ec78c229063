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

mod common;

use anyhow::{Context, Result};
use bundlefs_agents::{BundleState, Provider};
use bundlefs_core::source::LocalCache;
use bundlefs_core::telemetry::MetricId;
use bundlefs_core::{BundleInfo, BundleKind, ManifestDocument, ManifestError, ProviderConfig};
use bundlefs_io::{checksum, publish_manifest, DirectoryCache};
use bundlefs_telemetry::{MetricsAnalyzer, MetricsRegistry};
use common::{builder, config, ContentCounters, TestBundle, TIMEOUT};
use std::cell::Cell;
use std::io::Write;
use std::rc::Rc;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn asset_handles_are_shared_while_alive() -> Result<()> {
    let origin = tempdir()?;
    let local = tempdir()?;
    common::publish(origin.path(), &[TestBundle::content("ui", &[("ui/logo.txt", "logo"), ("ui/font.txt", "font")])])?;

    let registry = MetricsRegistry::new();
    let analyzer = Rc::new(MetricsAnalyzer::new(&registry)?);
    let counters = Rc::new(ContentCounters::default());
    let provider = builder(config(origin.path(), local.path()), &counters)
        .with_analyzer(analyzer.clone())
        .open()?;
    assert!(provider.tick_until(TIMEOUT, Provider::is_ready));

    let first = provider.get_asset("ui/logo.txt");
    let second = provider.get_asset("ui/logo.txt");
    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(analyzer.opened(), 1);
    assert_eq!(analyzer.accessed(), 1);

    assert!(provider.tick_until(TIMEOUT, |_| first.is_loaded()));
    assert_eq!(first.read_all_bytes().as_deref(), Some(&b"logo"[..]));
    assert_eq!(first.bundle_name().as_deref(), Some("ui"));
    assert!(provider.is_asset_available("ui/font.txt"));

    drop(first);
    assert_eq!(analyzer.closed(), 0);
    drop(second);
    assert_eq!(analyzer.closed(), 1);
    assert_eq!(provider.bundle_count(), 0);
    assert_eq!(counters.opened.get(), 1);
    assert_eq!(counters.dropped.get(), 1);

    // The cache entry died with the last handle.
    let third = provider.get_asset("ui/logo.txt");
    assert_eq!(analyzer.opened(), 2);
    assert!(third.is_valid());
    Ok(())
}

#[test]
fn unknown_path_yields_loaded_invalid_asset() -> Result<()> {
    let origin = tempdir()?;
    let local = tempdir()?;
    common::publish(origin.path(), &[TestBundle::content("ui", &[("ui/logo.txt", "logo")])])?;
    let counters = Rc::new(ContentCounters::default());
    let provider = builder(config(origin.path(), local.path()), &counters).open()?;
    assert!(provider.tick_until(TIMEOUT, Provider::is_ready));

    let asset = provider.get_asset("missing/file.txt");
    assert!(!asset.is_valid());
    assert!(asset.is_loaded());
    assert!(asset.read_all_bytes().is_none());
    assert!(!provider.is_asset_exists("missing/file.txt"));

    let fired = Rc::new(Cell::new(false));
    let flag = Rc::clone(&fired);
    asset.on_loaded(move |a| flag.set(!a.is_valid()));
    assert!(fired.get());
    assert!(Rc::ptr_eq(&asset, &provider.get_asset("missing/file.txt")));
    assert_eq!(provider.bundle_count(), 0);
    Ok(())
}

#[test]
fn startup_bundles_are_fetched_before_ready() -> Result<()> {
    let origin = tempdir()?;
    let local = tempdir()?;
    common::publish(
        origin.path(),
        &[
            TestBundle::content("core", &[("core/boot.txt", "boot")]).startup(),
            TestBundle::content("level", &[("level/map.txt", "map")]),
        ],
    )?;
    let counters = Rc::new(ContentCounters::default());
    let provider = builder(config(origin.path(), local.path()), &counters).open()?;

    let ready_calls = Rc::new(Cell::new(0));
    let calls = Rc::clone(&ready_calls);
    provider.on_ready(move || calls.set(calls.get() + 1));
    assert!(!provider.is_ready());
    assert!(provider.manifest().is_none());

    assert!(provider.tick_until(TIMEOUT, Provider::is_ready));
    assert_eq!(ready_calls.get(), 1);
    assert!(local.path().join("core").exists());
    assert!(!local.path().join("level").exists());
    assert!(provider.is_bundle_available("core"));
    assert!(!provider.is_bundle_available("level"));
    assert_eq!(provider.manifest().context("manifest")?.len(), 2);

    let late = Rc::new(Cell::new(false));
    let flag = Rc::clone(&late);
    provider.on_ready(move || flag.set(true));
    assert!(late.get());
    Ok(())
}

#[test]
fn local_startup_bundles_install_immediately() -> Result<()> {
    let origin = tempdir()?;
    let local = tempdir()?;
    let bundles = [TestBundle::content("core", &[("core/boot.txt", "boot")]).startup()];
    common::publish(origin.path(), &bundles)?;
    std::fs::write(local.path().join("core"), bundles[0].payload())?;

    let counters = Rc::new(ContentCounters::default());
    let provider = builder(config(origin.path(), local.path()), &counters).open()?;
    assert!(provider.is_ready());

    // A valid local file opens synchronously.
    let asset = provider.get_asset("core/boot.txt");
    assert!(asset.is_loaded());
    assert_eq!(asset.read_all_bytes().as_deref(), Some(&b"boot"[..]));
    Ok(())
}

#[test]
fn manifest_checksum_mismatch_is_reported() -> Result<()> {
    let origin = tempdir()?;
    let local = tempdir()?;
    common::publish(origin.path(), &[TestBundle::content("ui", &[("ui/logo.txt", "logo")])])?;
    std::fs::write(origin.path().join("manifest.checksum"), checksum::digest(b"something else"))?;

    let counters = Rc::new(ContentCounters::default());
    let result = builder(config(origin.path(), local.path()), &counters).open();
    assert!(matches!(result, Err(ManifestError::ChecksumMismatch { .. })));
    Ok(())
}

#[test]
fn offline_start_reuses_local_manifest() -> Result<()> {
    let origin = tempdir()?;
    let local = tempdir()?;
    common::publish(origin.path(), &[TestBundle::content("ui", &[("ui/logo.txt", "logo")])])?;
    let counters = Rc::new(ContentCounters::default());
    drop(builder(config(origin.path(), local.path()), &counters).open()?);

    let offline = ProviderConfig::new(Vec::<String>::new(), local.path());
    let provider = builder(offline, &counters).open()?;
    assert!(provider.is_ready());
    assert!(provider.is_asset_exists("ui/logo.txt"));
    Ok(())
}

#[test]
fn unreachable_bundle_settles_as_failed() -> Result<()> {
    let origin = tempdir()?;
    let local = tempdir()?;
    let bundles = [TestBundle::content("ui", &[("ui/logo.txt", "logo")])];
    common::publish(origin.path(), &bundles)?;
    std::fs::remove_file(origin.path().join("ui"))?;

    let counters = Rc::new(ContentCounters::default());
    let provider = builder(config(origin.path(), local.path()), &counters).open()?;
    assert!(provider.tick_until(TIMEOUT, Provider::is_ready));

    let asset = provider.get_asset("ui/logo.txt");
    assert!(asset.is_valid());
    assert!(provider.tick_until(TIMEOUT, |_| asset.is_loaded()));
    assert!(!asset.is_available());
    assert!(asset.read_all_bytes().is_none());
    let bundle = provider.get_bundle("ui").context("bundle")?;
    assert_eq!(bundle.state(), BundleState::Failed);
    assert_eq!(counters.opened.get(), 0);
    Ok(())
}

#[test]
fn corrupt_payload_settles_as_failed() -> Result<()> {
    let origin = tempdir()?;
    let local = tempdir()?;
    let bytes = vec![0xff, 0xfe, 0x00];
    std::fs::write(origin.path().join("blob"), &bytes)?;
    publish_manifest(
        origin.path(),
        &ManifestDocument {
            version: 1,
            bundles: vec![BundleInfo {
                name: "blob".into(),
                checksum: checksum::digest(&bytes),
                size: bytes.len() as u64,
                kind: BundleKind::ContentArchive,
                startup: false,
                dependencies: Vec::new(),
                assets: vec!["blob/data".into()],
            }],
        },
    )?;

    let counters = Rc::new(ContentCounters::default());
    let provider = builder(config(origin.path(), local.path()), &counters).open()?;
    assert!(provider.tick_until(TIMEOUT, Provider::is_ready));
    let asset = provider.get_asset("blob/data");
    assert!(provider.tick_until(TIMEOUT, |_| asset.is_loaded()));
    assert!(asset.read_all_bytes().is_none());
    assert_eq!(provider.get_bundle("blob").context("bundle")?.state(), BundleState::Failed);
    Ok(())
}

fn zip_bytes(files: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, bytes) in files {
        writer.start_file(*name, zip::write::SimpleFileOptions::default())?;
        writer.write_all(bytes)?;
    }
    Ok(writer.finish()?.into_inner())
}

#[test]
fn file_system_reads_zip_archives_only() -> Result<()> {
    let origin = tempdir()?;
    let local = tempdir()?;
    let archive = zip_bytes(&[("maps/a.txt", b"alpha"), ("maps/b.txt", b"beta")])?;
    std::fs::write(origin.path().join("maps"), &archive)?;
    let text = TestBundle::content("ui", &[("ui/logo.txt", "logo")]);
    std::fs::write(origin.path().join("ui"), text.payload())?;
    publish_manifest(
        origin.path(),
        &ManifestDocument {
            version: 1,
            bundles: vec![
                BundleInfo {
                    name: "maps".into(),
                    checksum: checksum::digest(&archive),
                    size: archive.len() as u64,
                    kind: BundleKind::ZipArchive,
                    startup: false,
                    dependencies: Vec::new(),
                    assets: vec!["maps/a.txt".into(), "maps/b.txt".into()],
                },
                text.info(),
            ],
        },
    )?;

    let counters = Rc::new(ContentCounters::default());
    let provider = builder(config(origin.path(), local.path()), &counters).open()?;
    assert!(provider.tick_until(TIMEOUT, Provider::is_ready));

    let fs = provider.get_file_system("maps");
    assert!(fs.is_valid());
    assert!(Rc::ptr_eq(&fs, &provider.get_file_system("maps")));
    assert!(provider.tick_until(TIMEOUT, |_| fs.is_loaded()));
    assert!(fs.exists("maps/b.txt"));
    assert_eq!(fs.read_all_bytes("maps/a.txt").as_deref(), Some(&b"alpha"[..]));
    assert_eq!(fs.entries().len(), 2);

    let wrong_kind = provider.get_file_system("ui");
    assert!(!wrong_kind.is_valid());
    assert!(wrong_kind.is_loaded());
    assert!(!wrong_kind.exists("ui/logo.txt"));
    assert!(provider.get_bundle("maps").is_some());
    assert_eq!(provider.bundle_count(), 1);

    assert!(!provider.get_file_system("nowhere").is_valid());
    Ok(())
}

#[test]
fn pre_seeded_cache_is_used_before_origins() -> Result<()> {
    let origin = tempdir()?;
    let local = tempdir()?;
    let cache_dir = tempdir()?;
    let bundles = [TestBundle::content("intro", &[("intro/title.txt", "welcome")])];
    // Only the cache holds the bundle.
    common::publish(cache_dir.path(), &bundles)?;
    publish_manifest(origin.path(), &common::document(&bundles))?;

    let counters = Rc::new(ContentCounters::default());
    let provider = builder(config(origin.path(), local.path()), &counters)
        .with_local_cache(Arc::new(DirectoryCache::open(cache_dir.path())?))
        .open()?;
    assert!(provider.is_ready());
    assert!(provider.is_bundle_available("intro"));

    let asset = provider.get_asset("intro/title.txt");
    let mut tasks = 0;
    provider.for_each_task(|_| tasks += 1);
    assert_eq!(tasks, 0);
    assert!(provider.tick_until(TIMEOUT, |_| asset.is_loaded()));
    assert_eq!(asset.read_all_bytes().as_deref(), Some(&b"welcome"[..]));
    assert!(!local.path().join("intro").exists());
    Ok(())
}

/// Claims every bundle but cannot read any of them.
struct UnreadableCache;

impl LocalCache for UnreadableCache {
    fn contains(&self, _name: &str, _checksum: &str, _size: u64) -> bool {
        true
    }

    fn load_bundle(&self, name: &str) -> std::io::Result<Vec<u8>> {
        Err(std::io::Error::other(format!("{name} is unreadable")))
    }
}

#[test]
fn unreadable_cache_entry_falls_back_to_download() -> Result<()> {
    let origin = tempdir()?;
    let local = tempdir()?;
    common::publish(origin.path(), &[TestBundle::content("intro", &[("intro/title.txt", "welcome")])])?;

    let counters = Rc::new(ContentCounters::default());
    let provider = builder(config(origin.path(), local.path()), &counters)
        .with_local_cache(Arc::new(UnreadableCache))
        .open()?;
    assert!(provider.tick_until(TIMEOUT, Provider::is_ready));

    let asset = provider.get_asset("intro/title.txt");
    assert!(provider.tick_until(TIMEOUT, |_| asset.is_loaded()));
    assert_eq!(asset.read_all_bytes().as_deref(), Some(&b"welcome"[..]));
    let bundle = provider.get_bundle("intro").context("intro")?;
    assert_eq!(bundle.state(), BundleState::Ready);
    assert_eq!(bundle.ref_count(), 1);
    assert!(local.path().join("intro").exists());
    Ok(())
}

#[test]
fn path_transform_applies_to_lookups() -> Result<()> {
    let origin = tempdir()?;
    let local = tempdir()?;
    common::publish(origin.path(), &[TestBundle::content("ui", &[("ui/logo.txt", "logo")])])?;
    let config = config(origin.path(), local.path()).with_path_transform(|path| path.to_ascii_lowercase());
    let counters = Rc::new(ContentCounters::default());
    let provider = builder(config, &counters).open()?;
    assert!(provider.tick_until(TIMEOUT, Provider::is_ready));

    assert_eq!(provider.find("UI/Logo.TXT").as_deref(), Some("ui"));
    let upper = provider.get_asset("UI/LOGO.txt");
    let lower = provider.get_asset("ui/logo.txt");
    assert!(Rc::ptr_eq(&upper, &lower));
    assert_eq!(upper.path(), "UI/LOGO.txt");
    Ok(())
}

#[test]
fn metrics_track_downloads() -> Result<()> {
    let origin = tempdir()?;
    let local = tempdir()?;
    common::publish(origin.path(), &[TestBundle::content("core", &[("core/boot.txt", "boot")]).startup()])?;
    let registry = MetricsRegistry::new();
    let counters = Rc::new(ContentCounters::default());
    let provider = builder(config(origin.path(), local.path()), &counters)
        .with_metrics(&registry)?
        .open()?;
    assert!(provider.tick_until(TIMEOUT, Provider::is_ready));

    let completed = registry.get_metric(&MetricId::new("downloads", "completed_total"))?;
    assert_eq!(completed.value.as_counter(), Some(1));
    let installed = registry.get_metric(&MetricId::new("provider", "manifests_installed"))?;
    assert_eq!(installed.value.as_counter(), Some(1));
    Ok(())
}

#[test]
fn posted_callbacks_run_on_tick() -> Result<()> {
    let origin = tempdir()?;
    let local = tempdir()?;
    common::publish(origin.path(), &[TestBundle::content("ui", &[("ui/logo.txt", "logo")])])?;
    let counters = Rc::new(ContentCounters::default());
    let provider = builder(config(origin.path(), local.path()), &counters).open()?;

    let (sender, receiver) = std::sync::mpsc::channel();
    let dispatcher = provider.dispatcher();
    std::thread::spawn(move || {
        dispatcher.post(move || {
            let _ = sender.send(std::thread::current().id());
        })
    })
    .join()
    .map_err(|_| anyhow::anyhow!("poster panicked"))?;
    assert!(receiver.try_recv().is_err());

    assert_eq!(provider.tick(), 1);
    assert_eq!(receiver.try_recv()?, std::thread::current().id());

    let ran = Rc::new(Cell::new(false));
    let flag = Rc::clone(&ran);
    provider.post_to_owner(move || flag.set(true));
    assert!(ran.get());
    Ok(())
}
