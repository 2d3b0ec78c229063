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
use bundlefs_agents::{BundleGuard, BundleState, Provider};
use common::{builder, config, ContentCounters, ManualWorker, TestBundle, TIMEOUT};
use std::rc::Rc;
use tempfile::tempdir;

fn task_names(provider: &Provider) -> Vec<String> {
    let mut names = Vec::new();
    provider.for_each_task(|task| names.push(task.bundle.name.clone()));
    names.sort();
    names
}

#[test]
fn bundle_waits_for_its_dependencies() -> Result<()> {
    let origin = tempdir()?;
    let local = tempdir()?;
    common::publish(
        origin.path(),
        &[
            TestBundle::content("level", &[("level/map.txt", "map")]).depends_on(&["textures"]),
            TestBundle::content("textures", &[("textures/rock.txt", "rock")]),
        ],
    )?;

    let worker = ManualWorker::default();
    let handle = worker.clone();
    let counters = Rc::new(ContentCounters::default());
    let provider = builder(config(origin.path(), local.path()), &counters)
        .with_download_worker(move |events| handle.attach(events))
        .open()?;
    assert!(provider.is_ready());

    let map = provider.get_asset("level/map.txt");
    let rock = provider.get_asset("textures/rock.txt");
    assert_eq!(task_names(&provider), ["level", "textures"]);
    let mut pending = worker.pending();
    pending.sort();
    assert_eq!(pending, ["level", "textures"]);

    worker.complete("level")?;
    assert!(provider.tick_until(TIMEOUT, |p| task_names(p) == ["textures"]));
    let level = provider.get_bundle("level").context("level")?;
    assert_eq!(level.state(), BundleState::Loading);
    assert!(!map.is_loaded());

    worker.complete("textures")?;
    assert!(provider.tick_until(TIMEOUT, |_| map.is_loaded()));
    assert!(rock.is_loaded());
    assert_eq!(level.state(), BundleState::Ready);
    assert_eq!(map.read_all_bytes().as_deref(), Some(&b"map"[..]));
    assert!(task_names(&provider).is_empty());
    Ok(())
}

#[test]
fn references_are_released_symmetrically() -> Result<()> {
    let origin = tempdir()?;
    let local = tempdir()?;
    common::publish(
        origin.path(),
        &[
            TestBundle::content("a", &[("a/file", "a")]).depends_on(&["b"]),
            TestBundle::content("b", &[("b/file", "b")]).depends_on(&["c"]),
            TestBundle::content("c", &[("c/file", "c")]),
        ],
    )?;
    let counters = Rc::new(ContentCounters::default());
    let provider = builder(config(origin.path(), local.path()), &counters).open()?;

    let asset = provider.get_asset("a/file");
    assert!(provider.tick_until(TIMEOUT, |_| asset.is_loaded()));
    assert_eq!(provider.bundle_count(), 3);

    let a = provider.get_bundle("a").context("a")?;
    let b = provider.get_bundle("b").context("b")?;
    let c = provider.get_bundle("c").context("c")?;
    assert_eq!(a.ref_count(), 1);
    assert_eq!(b.ref_count(), 1);
    // Held by both `b` and, transitively, `a`.
    assert_eq!(c.ref_count(), 2);
    assert_eq!(a.dependencies(), ["b", "c"]);
    assert!([&a, &b, &c].iter().all(|bundle| bundle.state() == BundleState::Ready));

    drop(asset);
    assert_eq!(provider.bundle_count(), 0);
    assert!([&a, &b, &c].iter().all(|bundle| bundle.is_released()));
    assert_eq!(counters.opened.get(), 3);
    assert_eq!(counters.dropped.get(), 3);
    Ok(())
}

#[test]
fn guards_keep_bundles_alive() -> Result<()> {
    let origin = tempdir()?;
    let local = tempdir()?;
    let bundles = [TestBundle::content("ui", &[("ui/logo.txt", "logo")])];
    common::publish(origin.path(), &bundles)?;
    std::fs::write(local.path().join("ui"), bundles[0].payload())?;
    let counters = Rc::new(ContentCounters::default());
    let provider = builder(config(origin.path(), local.path()), &counters).open()?;

    let guard = BundleGuard::new(provider.get_bundle("ui").context("ui")?);
    assert!(guard.bundle().is_loaded());
    let asset = provider.get_asset("ui/logo.txt");
    assert_eq!(guard.bundle().ref_count(), 2);
    drop(asset);
    assert_eq!(guard.bundle().ref_count(), 1);
    assert_eq!(provider.bundle_count(), 1);

    let bundle = Rc::clone(guard.bundle());
    drop(guard);
    assert!(bundle.is_released());
    assert_eq!(provider.bundle_count(), 0);
    Ok(())
}

#[test]
fn unreferenced_bundles_stay_registered_until_guarded() -> Result<()> {
    let origin = tempdir()?;
    let local = tempdir()?;
    let bundles = [TestBundle::content("ui", &[("ui/logo.txt", "logo")])];
    common::publish(origin.path(), &bundles)?;
    std::fs::write(local.path().join("ui"), bundles[0].payload())?;
    let counters = Rc::new(ContentCounters::default());
    let provider = builder(config(origin.path(), local.path()), &counters).open()?;

    let bundle = provider.get_bundle("ui").context("ui")?;
    assert_eq!(bundle.ref_count(), 0);
    assert!(bundle.is_loaded());
    assert_eq!(provider.bundle_count(), 1);

    // Resolving an asset leaves the count where the asset's own guard puts it.
    let asset = provider.get_asset("ui/logo.txt");
    assert_eq!(bundle.ref_count(), 1);
    drop(asset);
    assert!(bundle.is_released());
    assert_eq!(provider.bundle_count(), 0);
    Ok(())
}

#[test]
fn abort_fails_pending_downloads_and_refuses_new_ones() -> Result<()> {
    let origin = tempdir()?;
    let local = tempdir()?;
    common::publish(
        origin.path(),
        &[
            TestBundle::content("one", &[("one/file", "1")]),
            TestBundle::content("two", &[("two/file", "2")]),
            TestBundle::content("three", &[("three/file", "3")]),
        ],
    )?;
    let worker = ManualWorker::default();
    let handle = worker.clone();
    let counters = Rc::new(ContentCounters::default());
    let provider = builder(config(origin.path(), local.path()).with_concurrent_tasks(1), &counters)
        .with_download_worker(move |events| handle.attach(events))
        .open()?;

    let one = provider.get_asset("one/file");
    let two = provider.get_asset("two/file");
    assert_eq!(worker.pending(), ["one"]);
    assert_eq!(task_names(&provider), ["one", "two"]);

    provider.abort();
    assert!(task_names(&provider).is_empty());
    assert!(one.is_loaded());
    assert!(two.is_loaded());
    for name in ["one", "two"] {
        let bundle = provider.get_bundle(name).context(name)?;
        assert_eq!(bundle.state(), BundleState::Failed);
        // Only the asset still references it.
        assert_eq!(bundle.ref_count(), 1);
    }

    // Nothing new is queued or started after the abort.
    let three = provider.get_asset("three/file");
    assert!(three.is_loaded());
    assert_eq!(provider.get_bundle("three").context("three")?.state(), BundleState::Failed);
    assert!(task_names(&provider).is_empty());
    assert_eq!(worker.pending(), ["one"]);

    // A result arriving after the abort is ignored.
    worker.complete("one")?;
    provider.tick_blocking(std::time::Duration::from_millis(200));
    assert_eq!(provider.get_bundle("one").context("one")?.state(), BundleState::Failed);
    assert_eq!(counters.opened.get(), 0);
    Ok(())
}

#[test]
fn close_releases_everything() -> Result<()> {
    let origin = tempdir()?;
    let local = tempdir()?;
    let bundles = [TestBundle::content("ui", &[("ui/logo.txt", "logo")])];
    common::publish(origin.path(), &bundles)?;
    std::fs::write(local.path().join("ui"), bundles[0].payload())?;
    let counters = Rc::new(ContentCounters::default());
    let provider = builder(config(origin.path(), local.path()), &counters).open()?;

    let asset = provider.get_asset("ui/logo.txt");
    let bundle = provider.get_bundle("ui").context("ui")?;
    assert!(asset.is_available());

    provider.close();
    provider.close();
    assert!(provider.is_closed());
    assert!(bundle.is_released());
    assert_eq!(bundle.state(), BundleState::Unloaded);
    assert_eq!(counters.dropped.get(), 1);
    assert!(!asset.is_available());
    assert!(asset.read_all_bytes().is_none());
    assert_eq!(provider.bundle_count(), 0);
    assert!(!provider.get_asset("ui/logo.txt").is_valid());

    // Handles outliving the provider drop without effect.
    drop(provider);
    drop(asset);
    assert_eq!(bundle.ref_count(), 0);
    Ok(())
}
