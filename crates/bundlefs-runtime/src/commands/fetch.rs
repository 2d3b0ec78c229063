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
use bundlefs_agents::{AssetHandle, Provider, ProviderBuilder};
use bundlefs_core::ProviderConfig;
use bundlefs_telemetry::MetricsRegistry;
use std::path::Path;
use std::time::Duration;

/// Opens a provider from `config_path`, loads `assets` and prints their sizes.
pub fn run(config_path: &Path, timeout_secs: u64, show_metrics: bool, assets: &[String]) -> Result<()> {
    let config = ProviderConfig::from_json_file(config_path)?;
    let timeout = Duration::from_secs(timeout_secs);
    let registry = MetricsRegistry::new();

    let mut builder = select_fetcher(Provider::builder(config))?;
    if show_metrics {
        builder = builder.with_metrics(&registry)?;
    }
    let provider = builder.open().context("loading manifest")?;

    if !provider.tick_until(timeout, Provider::is_ready) {
        bail!("manifest was not installed within {timeout_secs}s");
    }
    let manifest = provider.manifest().context("manifest")?;
    println!(
        "Manifest v{}: {} bundles, {} assets",
        manifest.version(),
        manifest.len(),
        manifest.asset_count()
    );

    let handles: Vec<AssetHandle> = assets.iter().map(|path| provider.get_asset(path)).collect();
    if !provider.tick_until(timeout, |_| handles.iter().all(|asset| asset.is_loaded())) {
        bail!("assets were not loaded within {timeout_secs}s");
    }

    let mut missing = 0;
    for asset in &handles {
        match asset.read_all_bytes() {
            Some(bytes) => println!("{:>10}  {}", bytes.len(), asset.path()),
            None => {
                missing += 1;
                println!("{:>10}  {}", "missing", asset.path());
            }
        }
    }

    if show_metrics {
        for namespace in ["provider", "downloads", "assets"] {
            for metric in registry.namespace_metrics(namespace) {
                println!("{}: {:?}", metric.id, metric.value);
            }
        }
    }

    if missing > 0 {
        bail!("{missing} of {} assets could not be read", handles.len());
    }
    Ok(())
}

fn uses_http(builder: &ProviderBuilder) -> bool {
    builder
        .config()
        .urls
        .iter()
        .any(|url| url.starts_with("http://") || url.starts_with("https://"))
}

#[cfg(feature = "http")]
fn select_fetcher(builder: ProviderBuilder) -> Result<ProviderBuilder> {
    if !uses_http(&builder) {
        return Ok(builder);
    }
    let fetcher = bundlefs_io::HttpFetcher::new()?;
    Ok(builder.with_fetcher(std::sync::Arc::new(fetcher)))
}

#[cfg(not(feature = "http"))]
fn select_fetcher(builder: ProviderBuilder) -> Result<ProviderBuilder> {
    if uses_http(&builder) {
        log::warn!("HTTP origins configured but this build has no HTTP support");
    }
    Ok(builder)
}
