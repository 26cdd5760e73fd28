//! Core library for the partitioned map data store.
//!
//! This crate provides a persistent, typed key-value store built from:
//! - Serializer registry mapping value types to byte serializers
//! - Rendezvous-hash routing of keys onto partition ids
//! - Bounded, independently durable partitions over a pluggable engine
//! - Elastic partition creation when occupancy nears capacity

pub mod config;
pub mod engine;
pub mod error;
pub mod maintenance;
pub mod partition;
pub mod ring;
pub mod serializer;
pub mod store;

pub use config::{MapStoreConfig, PartitionTemplate, PartitionsConfig};
pub use engine::{DurableMap, Engine, EngineError, LogEngine, LogMap};
pub use error::{Error, Result};
pub use maintenance::{MaintenanceTask, Task, TaskState};
pub use partition::Partition;
pub use ring::RendezvousRing;
pub use serializer::{Serializer, SerializerRegistry};
pub use store::{MapDataStore, StoreState};
