//! Persistence encoding for origins and their alternatives.
//!
//! # Key Format
//!
//! `scheme://hostname:port`. Hostnames may themselves contain `:` (IPv6
//! literals), so the port is always split off the right-hand side.
//!
//! # Record Format
//!
//! A flat JSON object tagged with a format version:
//!
//! ```text
//! {"version":1,"alternatives":[{"alpn":"h3","hostname":"alt.example.com","port":443,"expires_at_ms":1767225600000}]}
//! ```
//!
//! Expirations are monotonic in memory but a monotonic instant means nothing
//! after a restart, so each one is written as a wall-clock Unix timestamp in
//! milliseconds, derived from its remaining lifetime, and mapped back onto
//! the monotonic clock when read.

use std::time::Duration;

use altsvc_core::{AlternateProtocol, Origin, StorageError, TimeSource};
use serde::{Deserialize, Serialize};

/// Current record format version.
pub const RECORD_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct PersistedRecord {
    version: u32,
    alternatives: Vec<PersistedAlternative>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct PersistedAlternative {
    alpn: String,
    hostname: String,
    port: u16,
    expires_at_ms: i64,
}

/// Encode an origin into its persistence key.
pub fn encode_origin(origin: &Origin) -> String {
    origin.to_string()
}

/// Decode a persistence key.
///
/// Returns `None` if:
/// - The `://` separator is missing
/// - The scheme or hostname is empty
/// - The port is missing or not a valid `u16`
pub fn decode_origin(key: &str) -> Option<Origin> {
    let (scheme, rest) = key.split_once("://")?;
    let (hostname, port) = rest.rsplit_once(':')?;
    if scheme.is_empty() || hostname.is_empty() {
        return None;
    }
    let port = port.parse::<u16>().ok()?;
    Some(Origin::new(scheme, hostname, port))
}

/// Encode the alternatives of `origin` into a versioned record.
pub fn encode_alternatives(
    origin: &Origin,
    protocols: &[AlternateProtocol],
    clock: &dyn TimeSource,
) -> Result<String, StorageError> {
    let mono_now = clock.monotonic_now();
    let wall_now_ms = clock.system_now().timestamp_millis();

    let alternatives = protocols
        .iter()
        .map(|p| {
            let remaining = p.expiration().saturating_duration_since(mono_now);
            let remaining_ms = i64::try_from(remaining.as_millis()).unwrap_or(i64::MAX);
            PersistedAlternative {
                alpn: p.alpn().to_string(),
                hostname: p.hostname().to_string(),
                port: p.port(),
                expires_at_ms: wall_now_ms.saturating_add(remaining_ms),
            }
        })
        .collect();

    let record = PersistedRecord {
        version: RECORD_VERSION,
        alternatives,
    };

    serde_json::to_string(&record).map_err(|e| StorageError::Encode {
        key: encode_origin(origin),
        reason: e.to_string(),
    })
}

/// Decode a persisted record back into an origin and its live alternatives.
///
/// Alternatives whose wall-clock expiration has already passed are dropped,
/// so the returned list may be empty. Structural problems are reported as
/// [`StorageError::Decode`].
pub fn decode_entry(
    key: &str,
    value: &str,
    clock: &dyn TimeSource,
) -> Result<(Origin, Vec<AlternateProtocol>), StorageError> {
    let decode_error = |reason: String| StorageError::Decode {
        key: key.to_string(),
        reason,
    };

    let origin = decode_origin(key).ok_or_else(|| decode_error("invalid origin key".to_string()))?;

    let record: PersistedRecord =
        serde_json::from_str(value).map_err(|e| decode_error(e.to_string()))?;

    if record.version != RECORD_VERSION {
        return Err(decode_error(format!(
            "unsupported record version {}",
            record.version
        )));
    }
    if record.alternatives.is_empty() {
        return Err(decode_error("record has no alternatives".to_string()));
    }

    let mono_now = clock.monotonic_now();
    let wall_now_ms = clock.system_now().timestamp_millis();

    let mut protocols = Vec::with_capacity(record.alternatives.len());
    for alt in record.alternatives {
        if alt.alpn.is_empty() || alt.hostname.is_empty() {
            return Err(decode_error("alternative with empty alpn or hostname".to_string()));
        }
        let remaining_ms = alt.expires_at_ms.saturating_sub(wall_now_ms);
        if remaining_ms <= 0 {
            continue;
        }
        // remaining_ms is positive here
        let expiration = mono_now + Duration::from_millis(remaining_ms as u64);
        protocols.push(AlternateProtocol::new(alt.alpn, alt.hostname, alt.port, expiration));
    }

    Ok((origin, protocols))
}
