//! Durable map engine boundary.
//!
//! Each partition persists through a [`DurableMap`]: a byte-keyed,
//! byte-valued, crash-recoverable persistent hash map with a fixed
//! pre-declared capacity. The store depends only on this capability; the
//! default engine is the append-log implementation in [`log`].

pub mod log;
pub mod traits;

pub use log::{LogEngine, LogMap};
pub use traits::{DurableMap, Engine, EngineError, EngineResult};
