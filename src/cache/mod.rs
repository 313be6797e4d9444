//! Generic caching layer.
//!
//! This module provides a domain-agnostic cache store that:
//! - Keeps serialized values keyed by entity type + key, each with its own TTL
//! - Layers a bounded in-process tier over a shared SQLite tier
//! - Can be swapped for a no-op store when caching is disabled

mod layer;
mod storage;
mod traits;

pub use layer::TieredStore;
pub use storage::NoopStorage;
#[cfg(test)]
pub use traits::CacheSource;
pub use traits::{CacheResult, CacheStore, Cacheable};
