//! Durable map capability and engine seam.

use std::io;
use std::path::Path;

use thiserror::Error;

use crate::config::PartitionTemplate;

/// Result type alias for the engine layer.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Failures raised by the durable-map layer.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Underlying file I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Backing file exists but is not a valid map file.
    #[error("corrupt map file {path}: {reason}")]
    Corrupt {
        /// Path of the unreadable file.
        path: String,
        /// What made it unreadable.
        reason: String,
    },

    /// A new key would exceed the pre-declared maximum entry count.
    #[error("map is full: declared capacity {capacity} reached")]
    Full {
        /// The declared capacity.
        capacity: u64,
    },

    /// Operation on a closed map.
    #[error("map is closed")]
    Closed,
}

/// Byte-keyed, byte-valued, crash-recoverable persistent hash map.
///
/// Implementations are driven through a single partition lock, so `&mut`
/// receivers suffice. Crash durability must not depend on callers issuing
/// any explicit flush.
pub trait DurableMap: Send {
    /// Inserts or overwrites an entry.
    fn put(&mut self, key: &[u8], value: &[u8]) -> EngineResult<()>;

    /// Returns the stored bytes for a key.
    fn get(&self, key: &[u8]) -> EngineResult<Option<Vec<u8>>>;

    /// Removes an entry, returning the prior value.
    fn remove(&mut self, key: &[u8]) -> EngineResult<Option<Vec<u8>>>;

    /// True if the key is present.
    fn contains_key(&self, key: &[u8]) -> EngineResult<bool>;

    /// Current number of entries.
    fn len(&self) -> u64;

    /// True if the map holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flushes and closes the backing file. Idempotent.
    fn close(&mut self) -> EngineResult<()>;
}

/// Opens durable maps for partitions; the pluggable engine seam.
///
/// An explicit trait object instead of a config-string lookup: callers
/// wire the engine they want at store construction time.
pub trait Engine: Send + Sync {
    /// Opens or creates the backing map at `path`, honoring the template's
    /// declared capacity and average-size hints.
    fn open(&self, path: &Path, template: &PartitionTemplate) -> EngineResult<Box<dyn DurableMap>>;

    /// Engine name for logging and diagnostics.
    fn name(&self) -> &'static str;
}
