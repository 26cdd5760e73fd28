//! Core serializer trait definitions.

use std::any::TypeId;

use crate::error::Result;

/// Turns typed values into bytes and back.
///
/// Serializers are stateless and thread-safe, so a single instance can be
/// shared by every store that handles the type.
pub trait Serializer<T: 'static>: Send + Sync + 'static {
    /// Converts a value into its byte representation.
    fn serialize(&self, value: &T) -> Result<Vec<u8>>;

    /// Reconstructs a value from bytes produced by
    /// [`serialize`](Serializer::serialize).
    fn deserialize(&self, bytes: &[u8]) -> Result<T>;

    /// Whether this serializer handles the given runtime type.
    fn accepts(&self, type_id: TypeId) -> bool {
        type_id == TypeId::of::<T>()
    }

    /// Name of this serializer (registry/config key, logging).
    fn name(&self) -> &'static str;
}
