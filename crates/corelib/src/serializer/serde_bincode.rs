//! Serde-backed serializer adapter.
//!
//! Bridges any serde-serializable type into the byte-oriented store via the
//! `bincode` wire format. Register an instance explicitly for each concrete
//! type that should flow through a store.

use std::any::type_name;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::serializer::traits::Serializer;

/// Bincode serializer for any serde-capable type.
pub struct SerdeBincode<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeBincode<T> {
    /// Creates a serializer for `T`.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for SerdeBincode<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Serializer<T> for SerdeBincode<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn serialize(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| Error::Serialize {
            type_name: type_name::<T>(),
            reason: e.to_string(),
        })
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialize {
            type_name: type_name::<T>(),
            reason: e.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "bincode"
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Offset {
        topic: String,
        position: u64,
    }

    #[test]
    fn test_struct_round_trip() {
        let serializer = SerdeBincode::<Offset>::new();
        let value = Offset {
            topic: "events".to_string(),
            position: 42,
        };
        let bytes = serializer.serialize(&value).unwrap();
        assert_eq!(serializer.deserialize(&bytes).unwrap(), value);
    }

    #[test]
    fn test_garbage_is_a_deserialize_error() {
        let serializer = SerdeBincode::<Offset>::new();
        let result = serializer.deserialize(&[1]);
        assert!(matches!(result, Err(Error::Deserialize { .. })));
    }
}
