//! AltSvc Storage - Alternate-Protocols Cache and Manager
//!
//! Remembers, per origin, which alternate protocols a server advertised and
//! which of them recently failed. Each worker owns its own cache instances;
//! the [`CacheManager`] decides which named caches exist and builds a copy
//! per [`WorkerContext`] on first use.

pub mod cache;
pub mod manager;

pub use cache::{
    create_store, AlternateProtocolsCache, BrokenState, CacheStats, InMemoryStore, KeyValueStore,
    LmdbStore, LmdbStoreError,
};
pub use manager::{
    CacheHandle, CacheManager, CacheManagerFactory, CacheWithOptions, ManagerData, WorkerContext,
};
