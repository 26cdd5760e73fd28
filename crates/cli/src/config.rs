//! CLI argument parsing and store bootstrap.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use corelib::{MapDataStore, MapStoreConfig, SerializerRegistry};

use crate::commands::Command;

/// Operate a partitioned map data store from the command line.
#[derive(Debug, Parser)]
#[command(name = "mapstore", version, about)]
pub struct CliConfig {
    /// Path to the store configuration (JSON).
    #[arg(short, long)]
    pub config: PathBuf,

    /// Per-operation lock timeout in milliseconds.
    #[arg(long, default_value_t = 5000)]
    pub timeout_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    /// Opens the store, runs the requested command, and disposes.
    pub fn run(self) -> anyhow::Result<()> {
        let CliConfig {
            config,
            timeout_ms,
            command,
        } = self;

        let raw = fs::read_to_string(&config)
            .with_context(|| format!("cannot read store config {}", config.display()))?;
        let store_config: MapStoreConfig = serde_json::from_str(&raw)
            .with_context(|| format!("invalid store config {}", config.display()))?;

        let store = Arc::new(MapDataStore::<String, String>::new(store_config.name.clone()));
        store.configure(&store_config, SerializerRegistry::global())?;

        let result = command.execute(&store, Duration::from_millis(timeout_ms));
        store.dispose()?;
        result
    }
}
