//! Map data store orchestration.
//!
//! A [`MapDataStore`] owns a name-indexed set of partitions, the rendezvous
//! ring over their ids, and the serializers for its key and value types.
//! Two locking levels apply: the store-level reader/writer lock here (read
//! side for key operations, write side for structural mutation) and each
//! partition's own bounded-timeout lock.

use std::any::type_name;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{error, info, warn};

use crate::config::{MapStoreConfig, PartitionTemplate, DEFAULT_MAINTENANCE_INTERVAL_SECS};
use crate::engine::{Engine, LogEngine};
use crate::error::{Error, Result};
use crate::partition::Partition;
use crate::ring::RendezvousRing;
use crate::serializer::{Serializer, SerializerRegistry};

/// Lifecycle state of a [`MapDataStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreState {
    /// Constructed, not yet configured.
    Unknown,
    /// Configuration accepted, partitions not yet linked.
    Initialized,
    /// Fully operational.
    Available,
    /// A structural failure occurred; key operations are blocked.
    Exception,
    /// Disposed; partitions closed.
    Disposed,
}

impl fmt::Display for StoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreState::Unknown => "unknown",
            StoreState::Initialized => "initialized",
            StoreState::Available => "available",
            StoreState::Exception => "exception",
            StoreState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Everything mutated under the store lock: routing structure, lifecycle
/// state, and the configuration resolved at configure time.
struct Shared<K: 'static, V: 'static> {
    state: StoreState,
    key_serializer: Option<Arc<dyn Serializer<K>>>,
    value_serializer: Option<Arc<dyn Serializer<V>>>,
    template: Option<PartitionTemplate>,
    min_partitions: usize,
    max_partitions: usize,
    maintenance_interval: Duration,
    partitions: HashMap<String, Partition>,
    ring: RendezvousRing,
}

impl<K: 'static, V: 'static> Shared<K, V> {
    /// Links a fully constructed partition into the map and the ring.
    fn link(&mut self, partition: Partition) {
        let id = partition.id().to_string();
        self.ring.insert(id.clone());
        self.partitions.insert(id, partition);
    }

    fn key_bytes(&self, key: &K) -> Result<Vec<u8>> {
        let serializer = self
            .key_serializer
            .as_ref()
            .ok_or_else(|| Error::Config("key serializer not configured".to_string()))?;
        let bytes = serializer.serialize(key)?;
        if bytes.is_empty() {
            return Err(Error::EmptySerialized {
                type_name: type_name::<K>(),
            });
        }
        Ok(bytes)
    }

    fn value_bytes(&self, value: &V) -> Result<Vec<u8>> {
        let serializer = self
            .value_serializer
            .as_ref()
            .ok_or_else(|| Error::Config("value serializer not configured".to_string()))?;
        let bytes = serializer.serialize(value)?;
        if bytes.is_empty() {
            return Err(Error::EmptySerialized {
                type_name: type_name::<V>(),
            });
        }
        Ok(bytes)
    }

    fn value_from(&self, bytes: &[u8]) -> Result<V> {
        self.value_serializer
            .as_ref()
            .ok_or_else(|| Error::Config("value serializer not configured".to_string()))?
            .deserialize(bytes)
    }

    fn partition_for(&self, key_bytes: &[u8]) -> Result<&Partition> {
        let id = self.ring.route(key_bytes)?;
        self.partitions
            .get(id)
            .ok_or_else(|| Error::MissingPartition(id.to_string()))
    }
}

/// Partitioned, persistent, typed key-value store.
///
/// Constructed unconfigured; [`configure`](MapDataStore::configure) loads
/// serializers, recovers or creates partitions, and makes the store
/// available. Key operations serialize the key, route its bytes through
/// the ring, and delegate to exactly one partition.
pub struct MapDataStore<K: 'static, V: 'static> {
    name: String,
    engine: Arc<dyn Engine>,
    shared: RwLock<Shared<K, V>>,
}

impl<K: 'static, V: 'static> MapDataStore<K, V> {
    /// Creates an unconfigured store with the default engine.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_engine(name, Arc::new(LogEngine))
    }

    /// Creates an unconfigured store backed by a custom engine.
    pub fn with_engine(name: impl Into<String>, engine: Arc<dyn Engine>) -> Self {
        Self {
            name: name.into(),
            engine,
            shared: RwLock::new(Shared {
                state: StoreState::Unknown,
                key_serializer: None,
                value_serializer: None,
                template: None,
                min_partitions: 0,
                max_partitions: 0,
                maintenance_interval: Duration::from_secs(DEFAULT_MAINTENANCE_INTERVAL_SECS),
                partitions: HashMap::new(),
                ring: RendezvousRing::new(),
            }),
        }
    }

    /// Store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StoreState {
        self.shared.read().state
    }

    /// Loads serializers, recovers or creates partitions, and transitions
    /// the store to available.
    ///
    /// Fails fast with a configuration error when the config is invalid or
    /// either serializer cannot be resolved; the store then stays
    /// un-available.
    pub fn configure(&self, config: &MapStoreConfig, registry: &SerializerRegistry) -> Result<()> {
        let mut shared = self.shared.write();
        if shared.state != StoreState::Unknown {
            return Err(Error::InvalidState {
                operation: "configure",
                state: shared.state,
            });
        }

        config.validate()?;
        let key_serializer = registry.resolve::<K>(config.key_serializer.as_deref())?;
        let value_serializer = registry.resolve::<V>(config.value_serializer.as_deref())?;
        let template = config.partitions.template();

        shared.key_serializer = Some(key_serializer);
        shared.value_serializer = Some(value_serializer);
        shared.min_partitions = config.partitions.min_count;
        shared.max_partitions = config.partitions.max_count;
        shared.maintenance_interval = config.maintenance_interval();
        shared.template = Some(template.clone());
        shared.state = StoreState::Initialized;

        // recover what a prior run left behind, then top up to the minimum
        for dir in Partition::scan_base_dir(&template.base_dir)? {
            let partition = Partition::recover(&dir, &template, self.engine.as_ref())?;
            shared.link(partition);
        }
        while shared.partitions.len() < shared.min_partitions {
            let partition = Partition::create(&template, self.engine.as_ref())?;
            shared.link(partition);
        }
        if shared.partitions.len() > shared.max_partitions {
            warn!(
                store = %self.name,
                recovered = shared.partitions.len(),
                max = shared.max_partitions,
                "recovered more partitions than the configured maximum"
            );
        }

        shared.state = StoreState::Available;
        info!(
            store = %self.name,
            engine = self.engine.name(),
            partitions = shared.partitions.len(),
            "store available"
        );
        Ok(())
    }

    /// Returns the value stored under `key`, if any.
    pub fn get(&self, key: &K, timeout: Duration) -> Result<Option<V>> {
        let shared = self.read_available("get")?;
        let key_bytes = shared.key_bytes(key)?;
        let partition = shared.partition_for(&key_bytes)?;
        match partition.get(&key_bytes, timeout)? {
            Some(bytes) => shared.value_from(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Stores `value` under `key`; true when the durable write occurred.
    pub fn put(&self, key: &K, value: &V, timeout: Duration) -> Result<bool> {
        let shared = self.read_available("put")?;
        let key_bytes = shared.key_bytes(key)?;
        let value_bytes = shared.value_bytes(value)?;
        let partition = shared.partition_for(&key_bytes)?;
        partition.put(&key_bytes, &value_bytes, timeout)
    }

    /// Removes the entry for `key`, returning the prior value.
    pub fn remove(&self, key: &K, timeout: Duration) -> Result<Option<V>> {
        let shared = self.read_available("remove")?;
        let key_bytes = shared.key_bytes(key)?;
        let partition = shared.partition_for(&key_bytes)?;
        match partition.remove(&key_bytes, timeout)? {
            Some(bytes) => shared.value_from(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// True if an entry exists for `key`.
    ///
    /// The timeout is accepted for interface symmetry with the other key
    /// operations; the partition-level check is a snapshot and does not
    /// take one.
    pub fn contains_key(&self, key: &K, _timeout: Duration) -> Result<bool> {
        let shared = self.read_available("containsKey")?;
        let key_bytes = shared.key_bytes(key)?;
        let partition = shared.partition_for(&key_bytes)?;
        partition.contains_key(&key_bytes)
    }

    /// Diagnostic snapshot of per-partition entry counts.
    pub fn sizes(&self) -> Result<BTreeMap<String, u64>> {
        let shared = self.read_available("getSizes")?;
        Ok(shared
            .partitions
            .iter()
            .map(|(id, partition)| (id.clone(), partition.entry_count()))
            .collect())
    }

    /// Scale-out pass: creates one partition per saturated partition, up
    /// to the configured ceiling. Idempotent; also run by the maintenance
    /// task. Returns the number of partitions created.
    ///
    /// A partition-creation failure transitions the store to the exception
    /// state and surfaces the error.
    pub fn run_check(&self) -> Result<usize> {
        let mut shared = self.shared.write();
        if shared.state != StoreState::Available {
            return Err(Error::InvalidState {
                operation: "runCheck",
                state: shared.state,
            });
        }

        let saturated = shared
            .partitions
            .values()
            .filter(|partition| partition.fill_threshold_reached())
            .count();
        if saturated == 0 {
            return Ok(0);
        }

        let headroom = shared.max_partitions.saturating_sub(shared.partitions.len());
        if headroom == 0 {
            warn!(
                store = %self.name,
                max = shared.max_partitions,
                saturated,
                "partition ceiling reached; cannot scale out"
            );
            return Ok(0);
        }

        let template = shared
            .template
            .clone()
            .ok_or_else(|| Error::Config("store has no partition template".to_string()))?;
        let to_create = saturated.min(headroom);
        info!(store = %self.name, saturated, to_create, "scaling out partitions");
        for _ in 0..to_create {
            match Partition::create(&template, self.engine.as_ref()) {
                Ok(partition) => shared.link(partition),
                Err(e) => {
                    shared.state = StoreState::Exception;
                    error!(
                        store = %self.name,
                        error = %e,
                        "partition creation failed; store moved to exception state"
                    );
                    return Err(e);
                }
            }
        }
        Ok(to_create)
    }

    /// Closes every partition and clears the ring. Idempotent; persisted
    /// bytes survive and are rediscovered by the next configure.
    pub fn dispose(&self) -> Result<()> {
        let mut shared = self.shared.write();
        if shared.state == StoreState::Disposed {
            return Ok(());
        }

        let mut first_failure = None;
        for partition in shared.partitions.values() {
            if let Err(e) = partition.dispose() {
                error!(store = %self.name, error = %e, "failed to close partition");
                if first_failure.is_none() {
                    first_failure = Some(e);
                }
            }
        }
        shared.partitions.clear();
        shared.ring.clear();
        shared.state = StoreState::Disposed;
        info!(store = %self.name, "store disposed");

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Interval between maintenance runs, as configured.
    pub fn maintenance_interval(&self) -> Duration {
        self.shared.read().maintenance_interval
    }

    fn read_available(
        &self,
        operation: &'static str,
    ) -> Result<RwLockReadGuard<'_, Shared<K, V>>> {
        let shared = self.shared.read();
        if shared.state != StoreState::Available {
            return Err(Error::InvalidState {
                operation,
                state: shared.state,
            });
        }
        Ok(shared)
    }
}
