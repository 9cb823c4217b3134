//! Alternate-protocols cache with expiration, LRU eviction and failure backoff.
//!
//! # Design Philosophy
//!
//! Expiration is never swept in the background. Every read re-evaluates the
//! clock, drops dead alternatives, and removes origins left with nothing.
//! The same applies to broken alternatives: a backoff simply stops applying
//! once its deadline passes.
//!
//! # Persistence
//!
//! A cache may be handed a [`KeyValueStore`]. It hydrates from the store on
//! construction and writes through on every mutation. Persisted state is an
//! optimisation only; malformed records are logged and skipped.
//!
//! # Example
//!
//! ```ignore
//! let mut cache = AlternateProtocolsCache::new(clock, None, 1024, backoff);
//! cache.set_alternatives(&origin, vec![h3]);
//! if let Some(alternatives) = cache.find_alternatives(&origin) {
//!     // try alternatives[0] first
//! }
//! ```

pub mod alternate_protocols;
pub mod broken;
pub mod codec;
pub mod lmdb_backend;
pub mod memory_store;
pub mod traits;

pub use alternate_protocols::AlternateProtocolsCache;
pub use broken::BrokenState;
pub use lmdb_backend::{LmdbStore, LmdbStoreError};
pub use memory_store::InMemoryStore;
pub use traits::{CacheStats, KeyValueStore};

use altsvc_core::{AltSvcResult, KeyValueStoreConfig};

/// Build the store selected by `config`.
pub fn create_store(config: &KeyValueStoreConfig) -> AltSvcResult<Box<dyn KeyValueStore>> {
    match config {
        KeyValueStoreConfig::Memory => Ok(Box::new(InMemoryStore::new())),
        KeyValueStoreConfig::Lmdb { path, max_size_mb } => {
            Ok(Box::new(LmdbStore::open(path, *max_size_mb)?))
        }
    }
}
