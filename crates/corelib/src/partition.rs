//! Durable key-value partitions.
//!
//! A partition is one bounded, independently durable segment of a store.
//! Its declared capacity and size hints are fixed at creation; only its
//! occupancy changes. Every access to the underlying durable map is
//! serialized behind the partition's single lock, acquired with a
//! caller-supplied timeout.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::PartitionTemplate;
use crate::engine::{DurableMap, Engine, EngineError};
use crate::error::{Error, Result};

/// Prefix of every partition id (and directory name).
pub const PARTITION_ID_PREFIX: &str = "partition-";

/// Well-known backing file name inside a partition directory.
pub const DATA_FILE_NAME: &str = "data.map";

/// Sentinel returned by [`Partition::used_ratio`] when the partition is
/// not operable.
pub const RATIO_UNAVAILABLE: f64 = -1.0;

/// One bounded, independently durable key-value segment.
pub struct Partition {
    id: String,
    dir: PathBuf,
    max_entries: u64,
    fill_ratio: f64,
    // None once disposed
    map: Mutex<Option<Box<dyn DurableMap>>>,
}

impl Partition {
    /// Creates a fresh partition under the template's base directory.
    pub fn create(template: &PartitionTemplate, engine: &dyn Engine) -> Result<Self> {
        let id = format!("{PARTITION_ID_PREFIX}{}", Uuid::new_v4());
        let dir = template.base_dir.join(&id);
        fs::create_dir_all(&dir).map_err(|e| storage_err(&id, e.into()))?;
        let map = open_map(&id, &dir, template, engine)?;
        info!(partition = %id, dir = %dir.display(), "created partition");
        Ok(Self::assemble(id, dir, template, map))
    }

    /// Recovers a partition from an existing directory.
    ///
    /// The directory must contain the well-known backing file; callers
    /// discover candidates with [`Partition::scan_base_dir`].
    pub fn recover(dir: &Path, template: &PartitionTemplate, engine: &dyn Engine) -> Result<Self> {
        let id = dir
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_owned)
            .ok_or_else(|| {
                Error::Config(format!(
                    "partition directory {} has no usable name",
                    dir.display()
                ))
            })?;
        let map = open_map(&id, dir, template, engine)?;
        info!(partition = %id, entries = map.len(), "recovered partition");
        Ok(Self::assemble(id, dir.to_path_buf(), template, map))
    }

    /// Lists subdirectories of `base_dir` that hold a valid backing file.
    pub fn scan_base_dir(base_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        if !base_dir.exists() {
            return Ok(found);
        }
        let entries = fs::read_dir(base_dir).map_err(|e| {
            Error::Config(format!(
                "cannot scan partition base directory {}: {e}",
                base_dir.display()
            ))
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| {
                Error::Config(format!(
                    "cannot scan partition base directory {}: {e}",
                    base_dir.display()
                ))
            })?;
            let path = entry.path();
            if path.is_dir() && path.join(DATA_FILE_NAME).is_file() {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }

    fn assemble(
        id: String,
        dir: PathBuf,
        template: &PartitionTemplate,
        map: Box<dyn DurableMap>,
    ) -> Self {
        Self {
            id,
            dir,
            max_entries: template.max_entries,
            fill_ratio: template.fill_ratio,
            map: Mutex::new(Some(map)),
        }
    }

    /// This partition's globally unique id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Directory holding the backing file.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Inserts or overwrites an entry; true when the durable write
    /// occurred.
    pub fn put(&self, key: &[u8], value: &[u8], timeout: Duration) -> Result<bool> {
        let mut guard = self.lock(timeout)?;
        let map = operable(&self.id, guard.as_mut())?;
        map.put(key, value).map_err(|e| storage_err(&self.id, e))?;
        Ok(true)
    }

    /// Returns the stored bytes for a key.
    pub fn get(&self, key: &[u8], timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut guard = self.lock(timeout)?;
        let map = operable(&self.id, guard.as_mut())?;
        map.get(key).map_err(|e| storage_err(&self.id, e))
    }

    /// Removes an entry, returning the prior value.
    pub fn remove(&self, key: &[u8], timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut guard = self.lock(timeout)?;
        let map = operable(&self.id, guard.as_mut())?;
        map.remove(key).map_err(|e| storage_err(&self.id, e))
    }

    /// Snapshot check for key presence. Waits on the lock unboundedly; the
    /// underlying check is cheap.
    pub fn contains_key(&self, key: &[u8]) -> Result<bool> {
        let mut guard = self.map.lock();
        let map = operable(&self.id, guard.as_mut())?;
        map.contains_key(key).map_err(|e| storage_err(&self.id, e))
    }

    /// Current entry count.
    pub fn entry_count(&self) -> u64 {
        self.map.lock().as_ref().map_or(0, |map| map.len())
    }

    /// Current entries over declared maximum, or [`RATIO_UNAVAILABLE`]
    /// when the partition is not operable.
    pub fn used_ratio(&self) -> f64 {
        match self.map.lock().as_ref() {
            Some(map) => map.len() as f64 / self.max_entries as f64,
            None => RATIO_UNAVAILABLE,
        }
    }

    /// True once occupancy is at or past the configured fill threshold.
    pub fn fill_threshold_reached(&self) -> bool {
        let ratio = self.used_ratio();
        ratio >= 0.0 && ratio >= self.fill_ratio
    }

    /// Closes the backing map. Idempotent; never deletes persisted bytes.
    pub fn dispose(&self) -> Result<()> {
        let mut guard = self.map.lock();
        if let Some(mut map) = guard.take() {
            map.close().map_err(|e| storage_err(&self.id, e))?;
            debug!(partition = %self.id, "disposed partition");
        }
        Ok(())
    }

    fn lock(&self, timeout: Duration) -> Result<MutexGuard<'_, Option<Box<dyn DurableMap>>>> {
        self.map.try_lock_for(timeout).ok_or_else(|| Error::LockTimeout {
            partition: self.id.clone(),
            timeout,
        })
    }
}

fn open_map(
    id: &str,
    dir: &Path,
    template: &PartitionTemplate,
    engine: &dyn Engine,
) -> Result<Box<dyn DurableMap>> {
    engine
        .open(&dir.join(DATA_FILE_NAME), template)
        .map_err(|e| storage_err(id, e))
}

fn operable<'a>(
    id: &str,
    map: Option<&'a mut Box<dyn DurableMap>>,
) -> Result<&'a mut Box<dyn DurableMap>> {
    map.ok_or_else(|| storage_err(id, EngineError::Closed))
}

fn storage_err(id: &str, source: EngineError) -> Error {
    Error::Storage {
        partition: id.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use tempfile::TempDir;

    use super::*;
    use crate::engine::{EngineResult, LogEngine};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn template(dir: &TempDir, max_entries: u64) -> PartitionTemplate {
        PartitionTemplate {
            base_dir: dir.path().to_path_buf(),
            max_entries,
            avg_key_size: 16,
            avg_value_size: 64,
            fill_ratio: 0.7,
        }
    }

    #[test]
    fn test_create_lays_out_directory() {
        let dir = TempDir::new().unwrap();
        let partition = Partition::create(&template(&dir, 10), &LogEngine).unwrap();

        assert!(partition.id().starts_with(PARTITION_ID_PREFIX));
        assert_eq!(partition.dir(), dir.path().join(partition.id()));
        assert!(partition.dir().join(DATA_FILE_NAME).is_file());
    }

    #[test]
    fn test_operations_round_trip() {
        let dir = TempDir::new().unwrap();
        let partition = Partition::create(&template(&dir, 10), &LogEngine).unwrap();

        assert!(partition.put(b"k", b"v", TIMEOUT).unwrap());
        assert_eq!(partition.get(b"k", TIMEOUT).unwrap(), Some(b"v".to_vec()));
        assert!(partition.contains_key(b"k").unwrap());
        assert_eq!(partition.entry_count(), 1);

        assert_eq!(partition.remove(b"k", TIMEOUT).unwrap(), Some(b"v".to_vec()));
        assert_eq!(partition.remove(b"k", TIMEOUT).unwrap(), None);
        assert!(!partition.contains_key(b"k").unwrap());
    }

    #[test]
    fn test_used_ratio_tracks_occupancy() {
        let dir = TempDir::new().unwrap();
        let partition = Partition::create(&template(&dir, 10), &LogEngine).unwrap();

        assert_eq!(partition.used_ratio(), 0.0);
        assert!(!partition.fill_threshold_reached());

        for n in 0..7u8 {
            partition.put(&[n], b"v", TIMEOUT).unwrap();
        }
        assert_eq!(partition.used_ratio(), 0.7);
        assert!(partition.fill_threshold_reached());
    }

    #[test]
    fn test_dispose_is_idempotent_and_keeps_bytes() {
        let dir = TempDir::new().unwrap();
        let template = template(&dir, 10);
        let partition = Partition::create(&template, &LogEngine).unwrap();
        partition.put(b"k", b"v", TIMEOUT).unwrap();
        let partition_dir = partition.dir().to_path_buf();

        partition.dispose().unwrap();
        partition.dispose().unwrap();
        assert_eq!(partition.used_ratio(), RATIO_UNAVAILABLE);
        assert!(matches!(
            partition.get(b"k", TIMEOUT),
            Err(Error::Storage { .. })
        ));

        // the backing file survives and recovers
        let recovered = Partition::recover(&partition_dir, &template, &LogEngine).unwrap();
        assert_eq!(recovered.get(b"k", TIMEOUT).unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_scan_base_dir_requires_backing_file() {
        let dir = TempDir::new().unwrap();
        let template = template(&dir, 10);
        let partition = Partition::create(&template, &LogEngine).unwrap();
        partition.dispose().unwrap();

        // a stray directory without the well-known file is not a partition
        fs::create_dir_all(dir.path().join("partition-not-really")).unwrap();
        fs::write(dir.path().join("loose-file"), b"x").unwrap();

        let found = Partition::scan_base_dir(dir.path()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0], partition.dir());

        let missing = Partition::scan_base_dir(&dir.path().join("nope")).unwrap();
        assert!(missing.is_empty());
    }

    // engine double whose reads hold the partition lock for a while
    struct SlowMap;

    impl DurableMap for SlowMap {
        fn put(&mut self, _key: &[u8], _value: &[u8]) -> EngineResult<()> {
            Ok(())
        }

        fn get(&self, _key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
            thread::sleep(Duration::from_millis(300));
            Ok(None)
        }

        fn remove(&mut self, _key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
            Ok(None)
        }

        fn contains_key(&self, _key: &[u8]) -> EngineResult<bool> {
            Ok(false)
        }

        fn len(&self) -> u64 {
            0
        }

        fn close(&mut self) -> EngineResult<()> {
            Ok(())
        }
    }

    struct SlowEngine;

    impl Engine for SlowEngine {
        fn open(
            &self,
            _path: &Path,
            _template: &PartitionTemplate,
        ) -> EngineResult<Box<dyn DurableMap>> {
            Ok(Box::new(SlowMap))
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[test]
    fn test_contended_lock_times_out() {
        let dir = TempDir::new().unwrap();
        let partition = Arc::new(Partition::create(&template(&dir, 10), &SlowEngine).unwrap());

        let reader = Arc::clone(&partition);
        let handle = thread::spawn(move || {
            reader.get(b"k", TIMEOUT).unwrap();
        });

        // let the reader take the lock, then fail fast on our side
        thread::sleep(Duration::from_millis(50));
        let result = partition.put(b"k", b"v", Duration::from_millis(10));
        assert!(matches!(result, Err(Error::LockTimeout { .. })));

        handle.join().unwrap();
    }
}
