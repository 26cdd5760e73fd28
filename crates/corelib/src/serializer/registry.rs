//! Serializer registry.

use std::any::{type_name, Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::error::{Error, Result};
use crate::serializer::builtin::{BytesSerializer, StringSerializer};
use crate::serializer::traits::Serializer;

/// Type-erased registry slot; concretely an `Arc<Registered<T>>`.
type Slot = Arc<dyn Any + Send + Sync>;

struct Registered<T: 'static> {
    serializer: Arc<dyn Serializer<T>>,
}

static GLOBAL: Lazy<SerializerRegistry> = Lazy::new(SerializerRegistry::with_builtins);

/// Mapping from value types (and configuration names) to serializers.
///
/// Prefer constructing and injecting an instance per store; the
/// [`global`](SerializerRegistry::global) instance exists for convenience
/// and is seeded with the built-in byte and string serializers.
pub struct SerializerRegistry {
    by_type: DashMap<TypeId, Slot>,
    by_name: DashMap<String, Slot>,
}

impl SerializerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            by_type: DashMap::new(),
            by_name: DashMap::new(),
        }
    }

    /// Creates a registry seeded with the built-in serializers.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(BytesSerializer);
        registry.register(StringSerializer);
        registry
    }

    /// Shared process-wide default registry.
    pub fn global() -> &'static SerializerRegistry {
        &GLOBAL
    }

    /// Registers a serializer for `T`, keyed by type and by the
    /// serializer's name. Replaces any previous registration for either
    /// key.
    pub fn register<T, S>(&self, serializer: S)
    where
        T: 'static,
        S: Serializer<T>,
    {
        let name = serializer.name();
        let slot: Slot = Arc::new(Registered {
            serializer: Arc::new(serializer) as Arc<dyn Serializer<T>>,
        });
        self.by_type.insert(TypeId::of::<T>(), slot.clone());
        self.by_name.insert(name.to_string(), slot);
    }

    /// Looks up the serializer registered for `T`.
    pub fn lookup<T: 'static>(&self) -> Option<Arc<dyn Serializer<T>>> {
        let slot = self
            .by_type
            .get(&TypeId::of::<T>())
            .map(|entry| entry.value().clone())?;
        downcast::<T>(slot)
    }

    /// Looks up a serializer by configuration name, checking that it
    /// accepts `T`.
    pub fn lookup_named<T: 'static>(&self, name: &str) -> Result<Arc<dyn Serializer<T>>> {
        let slot = self
            .by_name
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::Config(format!("no serializer registered under name `{name}`")))?;
        downcast::<T>(slot).ok_or_else(|| {
            Error::Config(format!(
                "serializer `{name}` does not accept type {}",
                type_name::<T>()
            ))
        })
    }

    /// Resolves the serializer for `T`: by explicit configuration name when
    /// given, otherwise by registered type. Absence of a usable serializer
    /// is a configuration error.
    pub fn resolve<T: 'static>(&self, name: Option<&str>) -> Result<Arc<dyn Serializer<T>>> {
        match name {
            Some(name) => self.lookup_named::<T>(name),
            None => self.lookup::<T>().ok_or_else(|| {
                Error::Config(format!(
                    "no serializer registered for type {}",
                    type_name::<T>()
                ))
            }),
        }
    }
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn downcast<T: 'static>(slot: Slot) -> Option<Arc<dyn Serializer<T>>> {
    slot.downcast::<Registered<T>>()
        .ok()
        .map(|registered| registered.serializer.clone())
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::serializer::serde_bincode::SerdeBincode;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Offset {
        position: u64,
    }

    #[test]
    fn test_builtins_resolve_by_type() {
        let registry = SerializerRegistry::with_builtins();
        assert!(registry.lookup::<String>().is_some());
        assert!(registry.lookup::<Vec<u8>>().is_some());
        assert!(registry.lookup::<u64>().is_none());
    }

    #[test]
    fn test_named_lookup_checks_type() {
        let registry = SerializerRegistry::with_builtins();
        assert!(registry.lookup_named::<String>("string").is_ok());

        // "bytes" exists but handles Vec<u8>, not String
        let result = registry.lookup_named::<String>("bytes");
        assert!(matches!(result, Err(Error::Config(_))));

        let result = registry.lookup_named::<String>("missing");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_resolve_prefers_explicit_name() {
        let registry = SerializerRegistry::with_builtins();
        let by_name = registry.resolve::<String>(Some("string")).unwrap();
        assert_eq!(by_name.name(), "string");
        let by_type = registry.resolve::<String>(None).unwrap();
        assert_eq!(by_type.name(), "string");
        assert!(registry.resolve::<Offset>(None).is_err());
    }

    #[test]
    fn test_registered_type_round_trips() {
        let registry = SerializerRegistry::with_builtins();
        registry.register(SerdeBincode::<Offset>::new());

        let serializer = registry.lookup::<Offset>().expect("registered");
        let value = Offset { position: 9 };
        let bytes = serializer.serialize(&value).unwrap();
        assert_eq!(serializer.deserialize(&bytes).unwrap(), value);
    }

    #[test]
    fn test_global_is_seeded() {
        assert!(SerializerRegistry::global().lookup::<String>().is_some());
        assert!(SerializerRegistry::global().lookup::<Vec<u8>>().is_some());
    }
}
