//! Error types for alternate-protocols cache operations

use thiserror::Error;

/// Configuration errors.
///
/// These abort cache construction and are surfaced to whoever asked for the
/// cache. They describe process-level misconfiguration and are never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error(
        "options specified alternate protocols cache '{name}' with different settings first '{first}' second '{second}'"
    )]
    ConfigurationConflict {
        name: String,
        first: String,
        second: String,
    },

    #[error("options has key value store but concurrency = {concurrency} : {options}")]
    UnsupportedConcurrency { concurrency: u32, options: String },

    #[error("Failed to read configuration from {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Persistence layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Failed to open key value store: {reason}")]
    Open { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Malformed persisted record for '{key}': {reason}")]
    Decode { key: String, reason: String },

    #[error("Failed to encode record for '{key}': {reason}")]
    Encode { key: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Master error type for the alternate-protocols cache.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AltSvcError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for alternate-protocols cache operations.
pub type AltSvcResult<T> = Result<T, AltSvcError>;

// =============================================================================
// TESTS
// =============================================================================
