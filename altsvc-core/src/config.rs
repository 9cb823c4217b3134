//! Cache configuration types.
//!
//! All fields are required unless explicitly marked optional. No defaults
//! beyond an empty prepopulation list and an absent key value store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Options for one named alternate-protocols cache.
///
/// Two requests for the same cache name must carry equal options; equality
/// is the derived structural comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheOptions {
    pub name: String,
    /// Upper bound on the number of origins tracked.
    pub max_entries: u32,
    #[serde(default)]
    pub prepopulated_entries: Vec<PrepopulatedEntry>,
    /// Durable backing store. Only valid when the runtime runs one worker.
    pub key_value_store: Option<KeyValueStoreConfig>,
    pub backoff: BackoffPolicy,
}

/// A statically configured `https` origin assumed to speak h3 on the same port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrepopulatedEntry {
    pub hostname: String,
    pub port: u16,
}

/// Backing store selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyValueStoreConfig {
    /// Process-local map. Survives nothing; useful for tests.
    Memory,
    /// LMDB environment rooted at `path`.
    Lmdb { path: PathBuf, max_size_mb: usize },
}

/// Exponential backoff applied to broken alternatives.
///
/// The n-th consecutive failure keeps the alternative out of rotation for
/// `base * 2^(n-1)`, never longer than `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base_ms: duration_to_ms(base),
            max_ms: duration_to_ms(max),
        }
    }

    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    /// Backoff to apply after `consecutive_failures` failures in a row.
    pub fn backoff_for(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_ms.saturating_mul(factor).min(self.max_ms))
    }
}

fn duration_to_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl CacheOptions {
    /// Parse options from a TOML document and validate them.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let options: CacheOptions = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        options.validate()?;
        Ok(options)
    }

    /// Read, parse and validate options from a TOML file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn has_key_value_store(&self) -> bool {
        self.key_value_store.is_some()
    }

    /// Stable single-line rendering used in error messages.
    pub fn describe(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "name".to_string(),
            });
        }
        if self.max_entries == 0 {
            return Err(invalid("max_entries", "0", "must be > 0"));
        }
        for (i, entry) in self.prepopulated_entries.iter().enumerate() {
            if entry.hostname.trim().is_empty() {
                return Err(invalid(
                    &format!("prepopulated_entries[{}].hostname", i),
                    &entry.hostname,
                    "must not be empty",
                ));
            }
            if entry.port == 0 {
                return Err(invalid(
                    &format!("prepopulated_entries[{}].port", i),
                    "0",
                    "must be > 0",
                ));
            }
        }
        if self.backoff.base_ms == 0 {
            return Err(invalid("backoff.base_ms", "0", "must be > 0"));
        }
        if self.backoff.max_ms < self.backoff.base_ms {
            return Err(invalid(
                "backoff.max_ms",
                &self.backoff.max_ms.to_string(),
                "must be >= backoff.base_ms",
            ));
        }
        if let Some(KeyValueStoreConfig::Lmdb { path, max_size_mb }) = &self.key_value_store {
            if path.as_os_str().is_empty() {
                return Err(invalid("key_value_store.path", "", "must not be empty"));
            }
            if *max_size_mb == 0 {
                return Err(invalid("key_value_store.max_size_mb", "0", "must be > 0"));
            }
            if max_size_mb.checked_mul(1024 * 1024).is_none() {
                return Err(invalid(
                    "key_value_store.max_size_mb",
                    &max_size_mb.to_string(),
                    "byte size overflows usize",
                ));
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
