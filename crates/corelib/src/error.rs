//! Error types for the core library.

use std::time::Duration;

use thiserror::Error;

use crate::engine::EngineError;
use crate::store::StoreState;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the map data store.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or incomplete configuration; fatal to `configure`.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Operation invoked while the store is not in a usable state.
    #[error("cannot {operation} while store is {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The store's state at the time of the call.
        state: StoreState,
    },

    /// Partition lock could not be acquired within the caller's budget.
    ///
    /// Safe to retry; implies nothing about data integrity.
    #[error("timed out after {timeout:?} waiting for lock on partition {partition}")]
    LockTimeout {
        /// Id of the contended partition.
        partition: String,
        /// The caller-supplied budget that expired.
        timeout: Duration,
    },

    /// Routing was attempted against an empty ring.
    #[error("no partition available for routing")]
    NoPartitionAvailable,

    /// The ring produced an id with no live partition behind it.
    ///
    /// Ring and partition map are mutated together under the store write
    /// lock, so this is an internal invariant violation.
    #[error("ring routed to partition {0} but no such partition is live")]
    MissingPartition(String),

    /// Serializer produced zero bytes, which cannot be routed or stored.
    #[error("serializer for {type_name} produced no bytes")]
    EmptySerialized {
        /// The offending value type.
        type_name: &'static str,
    },

    /// Serializer rejected a value.
    #[error("failed to serialize {type_name}: {reason}")]
    Serialize {
        /// The value type being serialized.
        type_name: &'static str,
        /// Serializer-reported cause.
        reason: String,
    },

    /// Stored bytes could not be turned back into a value.
    #[error("failed to deserialize {type_name}: {reason}")]
    Deserialize {
        /// The value type being deserialized.
        type_name: &'static str,
        /// Serializer-reported cause.
        reason: String,
    },

    /// Failure from the durable-map layer, tagged with the partition.
    #[error("storage failure on partition {partition}")]
    Storage {
        /// Id of the failing partition.
        partition: String,
        /// The underlying engine failure.
        #[source]
        source: EngineError,
    },

    /// Failure captured by the maintenance task.
    #[error("maintenance failure: {0}")]
    Maintenance(String),
}
