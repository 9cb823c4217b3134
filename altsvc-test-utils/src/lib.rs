//! AltSvc Test Utilities
//!
//! Centralized test infrastructure for the workspace:
//! - Proptest generators for origins, alternatives and options
//! - Test fixtures for common scenarios
//! - Custom assertions for error variants

// Re-export core types for convenience
pub use altsvc_core::{
    AltSvcError, AltSvcResult, AlternateProtocol, BackoffPolicy, CacheOptions, ConfigError,
    KeyValueStoreConfig, ManualTimeSource, MonotonicTime, Origin, PrepopulatedEntry,
    StorageError, TimeSource,
};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating cache inputs.

    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    /// Generate a DNS-style hostname.
    pub fn arb_hostname() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9]{0,10}(\\.[a-z]{2,6}){1,2}"
    }

    /// Generate a non-zero port.
    pub fn arb_port() -> impl Strategy<Value = u16> {
        1u16..=u16::MAX
    }

    /// Generate an origin with a web scheme.
    pub fn arb_origin() -> impl Strategy<Value = Origin> {
        (prop_oneof![Just("https"), Just("http")], arb_hostname(), arb_port())
            .prop_map(|(scheme, host, port)| Origin::new(scheme, host, port))
    }

    /// Generate a protocol identifier.
    pub fn arb_alpn() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("h3".to_string()),
            Just("h3-29".to_string()),
            Just("h2".to_string()),
        ]
    }

    /// Generate a live alternative expiring between one second and one day after `now`.
    pub fn arb_alternate_protocol(now: MonotonicTime) -> impl Strategy<Value = AlternateProtocol> {
        (arb_alpn(), arb_hostname(), arb_port(), 1u64..86_400).prop_map(
            move |(alpn, host, port, ttl_secs)| {
                AlternateProtocol::new(alpn, host, port, now + Duration::from_secs(ttl_secs))
            },
        )
    }

    /// Generate a non-empty list of live alternatives.
    pub fn arb_alternatives(now: MonotonicTime) -> impl Strategy<Value = Vec<AlternateProtocol>> {
        proptest::collection::vec(arb_alternate_protocol(now), 1..5)
    }

    /// Generate a valid backoff policy.
    pub fn arb_backoff_policy() -> impl Strategy<Value = BackoffPolicy> {
        (1u64..600_000, 0u64..86_400_000).prop_map(|(base_ms, extra)| BackoffPolicy {
            base_ms,
            max_ms: base_ms + extra,
        })
    }

    /// Generate valid in-memory cache options.
    pub fn arb_cache_options() -> impl Strategy<Value = CacheOptions> {
        (
            "[a-z]{1,12}",
            1u32..10_000,
            proptest::collection::vec(
                (arb_hostname(), arb_port())
                    .prop_map(|(hostname, port)| PrepopulatedEntry { hostname, port }),
                0..4,
            ),
            arb_backoff_policy(),
        )
            .prop_map(|(name, max_entries, prepopulated_entries, backoff)| CacheOptions {
                name,
                max_entries,
                prepopulated_entries,
                key_value_store: None,
                backoff,
            })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made values for common scenarios.

    use super::*;
    use std::time::Duration;

    pub const ONE_HOUR: Duration = Duration::from_secs(3600);

    /// `https://example.com:443`
    pub fn example_origin() -> Origin {
        Origin::new("https", "example.com", 443)
    }

    /// `https://<host>:443`
    pub fn https_origin(host: &str) -> Origin {
        Origin::new("https", host, 443)
    }

    /// An h3 alternative on port 443 of `host`, live for `ttl` from the clock's now.
    pub fn h3_alternative(clock: &dyn TimeSource, host: &str, ttl: Duration) -> AlternateProtocol {
        AlternateProtocol::new("h3", host, 443, clock.monotonic_now() + ttl)
    }

    /// Five minute base, one day cap.
    pub fn standard_backoff() -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_secs(300), Duration::from_secs(86_400))
    }

    /// Valid options without a store or prepopulation.
    pub fn memory_options(name: &str, max_entries: u32) -> CacheOptions {
        CacheOptions {
            name: name.to_string(),
            max_entries,
            prepopulated_entries: vec![],
            key_value_store: None,
            backoff: standard_backoff(),
        }
    }

    /// Valid options backed by an LMDB store at `path`.
    pub fn lmdb_options(name: &str, max_entries: u32, path: &std::path::Path) -> CacheOptions {
        CacheOptions {
            key_value_store: Some(KeyValueStoreConfig::Lmdb {
                path: path.to_path_buf(),
                max_size_mb: 10,
            }),
            ..memory_options(name, max_entries)
        }
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over result variants.

    use super::*;

    pub fn assert_config_conflict<T: std::fmt::Debug>(result: &AltSvcResult<T>, name: &str) {
        match result {
            Err(AltSvcError::Config(ConfigError::ConfigurationConflict { name: got, .. })) => {
                assert_eq!(got, name, "conflict reported for the wrong cache");
            }
            other => panic!("Expected ConfigurationConflict, got {:?}", other),
        }
    }

    pub fn assert_unsupported_concurrency<T: std::fmt::Debug>(result: &AltSvcResult<T>) {
        assert!(
            matches!(
                result,
                Err(AltSvcError::Config(ConfigError::UnsupportedConcurrency { .. }))
            ),
            "Expected UnsupportedConcurrency, got {:?}",
            result
        );
    }

    pub fn assert_invalid_config<T: std::fmt::Debug>(result: &AltSvcResult<T>) {
        assert!(
            matches!(
                result,
                Err(AltSvcError::Config(
                    ConfigError::InvalidValue { .. } | ConfigError::MissingRequired { .. }
                ))
            ),
            "Expected invalid configuration, got {:?}",
            result
        );
    }
}
