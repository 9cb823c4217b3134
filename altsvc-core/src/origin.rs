//! Origin and alternate-protocol value types.

use std::fmt;

use crate::clock::MonotonicTime;

/// A server identified by scheme, hostname and port.
///
/// Comparison is exact: scheme and hostname are compared byte for byte as
/// the caller supplied them. Origins are immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Origin {
    scheme: String,
    hostname: String,
    port: u16,
}

impl Origin {
    pub fn new(scheme: impl Into<String>, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            hostname: hostname.into(),
            port,
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Canonical `scheme://hostname:port` form, also used as the persistence key.
impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.hostname, self.port)
    }
}

/// One advertised alternative for an origin.
///
/// The alternative is reachable at `hostname:port` speaking `alpn`, and is
/// valid until the monotonic `expiration` instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlternateProtocol {
    alpn: String,
    hostname: String,
    port: u16,
    expiration: MonotonicTime,
}

impl AlternateProtocol {
    pub fn new(
        alpn: impl Into<String>,
        hostname: impl Into<String>,
        port: u16,
        expiration: MonotonicTime,
    ) -> Self {
        Self {
            alpn: alpn.into(),
            hostname: hostname.into(),
            port,
            expiration,
        }
    }

    /// Protocol identifier, e.g. `h3`.
    pub fn alpn(&self) -> &str {
        &self.alpn
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn expiration(&self) -> MonotonicTime {
        self.expiration
    }

    /// An alternative whose expiration is at or before `now` is dead.
    pub fn is_expired(&self, now: MonotonicTime) -> bool {
        self.expiration <= now
    }

    /// True when both values name the same endpoint, ignoring expiration.
    pub fn same_endpoint(&self, other: &AlternateProtocol) -> bool {
        self.alpn == other.alpn && self.hostname == other.hostname && self.port == other.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_origin_equality_is_exact() {
        let a = Origin::new("https", "example.com", 443);
        assert_eq!(a, Origin::new("https", "example.com", 443));
        assert_ne!(a, Origin::new("https", "Example.com", 443));
        assert_ne!(a, Origin::new("http", "example.com", 443));
        assert_ne!(a, Origin::new("https", "example.com", 8443));
    }

    #[test]
    fn test_origin_display() {
        let origin = Origin::new("https", "example.com", 443);
        assert_eq!(origin.to_string(), "https://example.com:443");
    }

    #[test]
    fn test_alternate_protocol_expiry_boundary() {
        let now = Instant::now();
        let alt = AlternateProtocol::new("h3", "example.com", 443, now + Duration::from_secs(10));
        assert!(!alt.is_expired(now));
        assert!(alt.is_expired(now + Duration::from_secs(10)));
        assert!(alt.is_expired(now + Duration::from_secs(11)));
    }

    #[test]
    fn test_same_endpoint_ignores_expiration() {
        let now = Instant::now();
        let a = AlternateProtocol::new("h3", "alt.example.com", 443, now);
        let b = AlternateProtocol::new("h3", "alt.example.com", 443, now + Duration::from_secs(60));
        let c = AlternateProtocol::new("h3-29", "alt.example.com", 443, now);
        assert!(a.same_endpoint(&b));
        assert!(!a.same_endpoint(&c));
        assert_ne!(a, b);
    }
}
