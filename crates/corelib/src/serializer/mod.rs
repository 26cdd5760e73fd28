//! Typed serialization for store keys and values.
//!
//! Serializers turn typed values into the raw bytes partitions store and
//! route on. The registry maps runtime types (and configuration names) to
//! serializer instances.

pub mod builtin;
pub mod registry;
pub mod serde_bincode;
pub mod traits;

pub use builtin::{BytesSerializer, StringSerializer};
pub use registry::SerializerRegistry;
pub use serde_bincode::SerdeBincode;
pub use traits::Serializer;
