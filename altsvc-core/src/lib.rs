//! AltSvc Core - Alternate-Protocols Cache Types
//!
//! Pure data structures shared by the cache, the persistence layer and the
//! manager. This crate holds no cache behaviour, only the value types, the
//! option types, the error taxonomy and the clock abstraction.

use std::time::Duration;

pub mod clock;
pub mod config;
pub mod error;
pub mod origin;

pub use clock::{ManualTimeSource, MonotonicTime, RealTimeSource, TimeSource};
pub use config::{BackoffPolicy, CacheOptions, KeyValueStoreConfig, PrepopulatedEntry};
pub use error::{AltSvcError, AltSvcResult, ConfigError, StorageError};
pub use origin::{AlternateProtocol, Origin};

// ============================================================================
// PREPOPULATION DEFAULTS
// ============================================================================

/// Lifetime given to alternatives installed from static configuration.
pub const PREPOPULATED_TTL: Duration = Duration::from_secs(168 * 60 * 60);

/// Scheme of origins installed from static configuration.
pub const PREPOPULATED_SCHEME: &str = "https";

/// Protocol advertised for origins installed from static configuration.
pub const PREPOPULATED_ALPN: &str = "h3";
