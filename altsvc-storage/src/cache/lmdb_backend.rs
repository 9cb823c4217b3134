//! LMDB-backed key/value store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep persisted alternate
//! protocol records in a memory-mapped database that survives restarts.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The store uses:
//! - A read transaction for `load_all`
//! - One write transaction per `set` and `remove`
//! - `force_sync` for `flush`

use std::path::Path;

use altsvc_core::{AltSvcError, AltSvcResult, StorageError};
use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions};

use super::traits::KeyValueStore;

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbStoreError to StorageError.
impl From<LmdbStoreError> for StorageError {
    fn from(e: LmdbStoreError) -> Self {
        match e {
            LmdbStoreError::EnvOpen(_) | LmdbStoreError::DbOpen(_) | LmdbStoreError::Io(_) => {
                StorageError::Open {
                    reason: e.to_string(),
                }
            }
            LmdbStoreError::Transaction(_) => StorageError::TransactionFailed {
                reason: e.to_string(),
            },
        }
    }
}

impl From<LmdbStoreError> for AltSvcError {
    fn from(e: LmdbStoreError) -> Self {
        AltSvcError::Storage(e.into())
    }
}

/// LMDB-backed store for alternate protocol records.
///
/// # Example
///
/// ```ignore
/// use altsvc_storage::cache::{KeyValueStore, LmdbStore};
///
/// let store = LmdbStore::open("/var/cache/altsvc", 16)?;
/// store.set("https://example.com:443", &record)?;
/// ```
pub struct LmdbStore {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Str, Str>,
}

impl LmdbStore {
    /// Open (or create) an LMDB store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `max_size_mb` does not fit in memory as a byte count
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        let map_size = max_size_mb.checked_mul(1024 * 1024).ok_or_else(|| {
            LmdbStoreError::EnvOpen(format!("map size of {} MB overflows usize", max_size_mb))
        })?;

        // Ensure directory exists
        std::fs::create_dir_all(&path)?;

        // Open LMDB environment
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        // Open the default database
        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let db: Database<Str, Str> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(Self { env, db })
    }
}

impl KeyValueStore for LmdbStore {
    fn load_all(&self) -> AltSvcResult<Vec<(String, String)>> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let iter = self
            .db
            .iter(&rtxn)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let mut records = Vec::new();
        for result in iter {
            match result {
                Ok((key, value)) => records.push((key.to_string(), value.to_string())),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable LMDB record");
                }
            }
        }

        Ok(records)
    }

    fn set(&self, key: &str, value: &str) -> AltSvcResult<()> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        self.db
            .put(&mut wtxn, key, value)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(())
    }

    fn remove(&self, key: &str) -> AltSvcResult<()> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        self.db
            .delete(&mut wtxn, key)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(())
    }

    fn flush(&self) -> AltSvcResult<()> {
        self.env
            .force_sync()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (LmdbStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbStore::open(temp_dir.path(), 10).expect("store creation should succeed");
        (store, temp_dir)
    }

    #[test]
    fn test_oversized_map_is_rejected() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let result = LmdbStore::open(temp_dir.path().join("huge"), usize::MAX / 2);
        assert!(matches!(result, Err(LmdbStoreError::EnvOpen(_))));
        assert!(!temp_dir.path().join("huge").exists());
    }

    #[test]
    fn test_open_store() {
        let (store, _temp_dir) = create_test_store();
        let records = store.load_all().expect("load_all should succeed");
        assert!(records.is_empty());
    }

    #[test]
    fn test_set_and_load() {
        let (store, _temp_dir) = create_test_store();
        store
            .set("https://example.com:443", "record-a")
            .expect("set should succeed");
        store
            .set("https://other.example:443", "record-b")
            .expect("set should succeed");

        let records = store.load_all().expect("load_all should succeed");
        assert_eq!(records.len(), 2);
        assert!(records.contains(&("https://example.com:443".to_string(), "record-a".to_string())));
    }

    #[test]
    fn test_overwrite() {
        let (store, _temp_dir) = create_test_store();
        store.set("k", "v1").expect("set should succeed");
        store.set("k", "v2").expect("set should succeed");

        let records = store.load_all().expect("load_all should succeed");
        assert_eq!(records, vec![("k".to_string(), "v2".to_string())]);
    }

    #[test]
    fn test_remove() {
        let (store, _temp_dir) = create_test_store();
        store.set("k", "v").expect("set should succeed");
        store.remove("k").expect("remove should succeed");
        store.remove("never-set").expect("remove of missing key should succeed");

        assert!(store.load_all().expect("load_all should succeed").is_empty());
    }

    #[test]
    fn test_survives_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let store = LmdbStore::open(temp_dir.path(), 10).expect("store creation should succeed");
            store.set("k", "v").expect("set should succeed");
            store.flush().expect("flush should succeed");
        }

        let reopened = LmdbStore::open(temp_dir.path(), 10).expect("reopen should succeed");
        let records = reopened.load_all().expect("load_all should succeed");
        assert_eq!(records, vec![("k".to_string(), "v".to_string())]);
    }

    #[test]
    fn test_error_conversion() {
        let err: StorageError = LmdbStoreError::Transaction("boom".to_string()).into();
        assert!(matches!(err, StorageError::TransactionFailed { .. }));

        let err: AltSvcError = LmdbStoreError::EnvOpen("nope".to_string()).into();
        assert!(matches!(err, AltSvcError::Storage(StorageError::Open { .. })));
    }
}
