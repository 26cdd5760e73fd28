//! Store configuration.
//!
//! A [`MapStoreConfig`] is what the surrounding platform hands a store at
//! configure time: the store name, optional serializer names, and the
//! partitions block. Validation is explicit and fail-fast so a bad config
//! never produces a half-configured store.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default partition fill threshold, in percent.
pub const DEFAULT_FILL_PERCENT: u8 = 70;

/// Default maintenance interval, in seconds.
pub const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 60;

/// Configuration for one map data store instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapStoreConfig {
    /// Store name, used in logging and diagnostics.
    pub name: String,

    /// Registry name of the key serializer; defaults to type-based lookup.
    #[serde(default)]
    pub key_serializer: Option<String>,

    /// Registry name of the value serializer; defaults to type-based lookup.
    #[serde(default)]
    pub value_serializer: Option<String>,

    /// Partition sizing and placement.
    pub partitions: PartitionsConfig,

    /// Seconds between maintenance runs.
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
}

/// Partition block of the store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionsConfig {
    /// Hard ceiling on live partitions.
    pub max_count: usize,

    /// Partitions present after startup when none are recoverable.
    pub min_count: usize,

    /// Directory holding one subdirectory per partition.
    pub base_dir: PathBuf,

    /// Declared maximum entry count per partition.
    pub max_entries: u64,

    /// Average key size hint, in bytes.
    pub avg_key_size: u32,

    /// Average value size hint, in bytes.
    pub avg_value_size: u32,

    /// Fill threshold in percent (1-100). Defaults to 70.
    #[serde(default)]
    pub fill_percent: Option<u8>,
}

fn default_maintenance_interval_secs() -> u64 {
    DEFAULT_MAINTENANCE_INTERVAL_SECS
}

impl MapStoreConfig {
    /// Checks the configuration, failing fast on anything unusable.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("store name must not be empty".to_string()));
        }
        self.partitions.validate()
    }

    /// Maintenance interval as a [`Duration`].
    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }
}

impl PartitionsConfig {
    fn validate(&self) -> Result<()> {
        if self.min_count < 1 {
            return Err(Error::Config(
                "minimum partition count must be at least 1".to_string(),
            ));
        }
        if self.min_count > self.max_count {
            return Err(Error::Config(format!(
                "minimum partition count {} exceeds maximum {}",
                self.min_count, self.max_count
            )));
        }
        if self.max_entries == 0 {
            return Err(Error::Config(
                "per-partition maximum entry count must be at least 1".to_string(),
            ));
        }
        if self.base_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "partition base directory must not be empty".to_string(),
            ));
        }
        if let Some(percent) = self.fill_percent {
            if percent == 0 || percent > 100 {
                return Err(Error::Config(format!(
                    "fill percent {percent} outside 1..=100"
                )));
            }
        }
        Ok(())
    }

    /// Fill threshold as a 0-1 fraction.
    pub fn fill_ratio(&self) -> f64 {
        f64::from(self.fill_percent.unwrap_or(DEFAULT_FILL_PERCENT)) / 100.0
    }

    /// Template handed to partition creation and recovery.
    pub fn template(&self) -> PartitionTemplate {
        PartitionTemplate {
            base_dir: self.base_dir.clone(),
            max_entries: self.max_entries,
            avg_key_size: self.avg_key_size,
            avg_value_size: self.avg_value_size,
            fill_ratio: self.fill_ratio(),
        }
    }
}

/// Fixed parameters applied to every partition a store creates or recovers.
///
/// A partition's capacity and size hints never change after creation; only
/// its occupancy does.
#[derive(Debug, Clone)]
pub struct PartitionTemplate {
    /// Directory holding one subdirectory per partition.
    pub base_dir: PathBuf,
    /// Declared maximum entry count.
    pub max_entries: u64,
    /// Average key size hint, in bytes.
    pub avg_key_size: u32,
    /// Average value size hint, in bytes.
    pub avg_value_size: u32,
    /// Occupancy fraction at which a partition counts as saturated.
    pub fill_ratio: f64,
}
