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

//! Packs bundle origins and fetches assets through a provider.
//!
//! ```text
//! bundlefs pack --source assets --out dist/origin --startup core
//! bundlefs fetch --config bundlefs.json ui/logo.png maps/level1.bin
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bundlefs", version)]
#[command(about = "Bundle origin packer and asset fetcher", long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack every sub-directory of SOURCE into a zip bundle and publish a manifest
    Pack {
        /// Directory whose sub-directories become bundles
        #[arg(short, long)]
        source: PathBuf,

        /// Origin directory to write bundles and the manifest into
        #[arg(short, long)]
        out: PathBuf,

        /// Bundles fetched before the manifest is installed
        #[arg(long)]
        startup: Vec<String>,

        /// Dependency edges, as `bundle=dependency`
        #[arg(long = "depends")]
        dependencies: Vec<String>,
    },

    /// Open a provider and load assets
    Fetch {
        /// Provider configuration (JSON)
        #[arg(short, long, default_value = "bundlefs.json")]
        config: PathBuf,

        /// Seconds to wait for the manifest and the assets
        #[arg(short, long, default_value_t = 60)]
        timeout: u64,

        /// Print download and asset counters when done
        #[arg(long)]
        metrics: bool,

        /// Asset paths to load
        assets: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    bundlefs_telemetry::logging::init(&cli.log);

    match cli.command {
        Commands::Pack {
            source,
            out,
            startup,
            dependencies,
        } => commands::pack::run(&source, &out, &startup, &dependencies),
        Commands::Fetch {
            config,
            timeout,
            metrics,
            assets,
        } => commands::fetch::run(&config, timeout, metrics, &assets),
    }
}
