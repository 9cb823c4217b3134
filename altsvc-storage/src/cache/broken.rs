//! Broken-alternative state machine.
//!
//! ```text
//! Trusted --mark_broken--> Broken(now + base, 1)
//! Broken(_, n) --mark_broken--> Broken(now + min(base * 2^n, max), n + 1)
//! Broken --confirm--> Trusted
//! ```
//!
//! A `Broken` state whose deadline has passed is treated as usable without
//! any explicit transition, but it keeps its failure count: the next failure
//! continues the geometric growth instead of starting over.

use altsvc_core::{AlternateProtocol, BackoffPolicy, MonotonicTime};

/// Failure memory for one (origin, alternative) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrokenState {
    #[default]
    Trusted,
    Broken {
        until: MonotonicTime,
        consecutive_failures: u32,
    },
}

impl BrokenState {
    /// Record one more failure observed at `now`.
    pub fn mark_broken(self, now: MonotonicTime, policy: &BackoffPolicy) -> Self {
        let consecutive_failures = match self {
            Self::Trusted => 1,
            Self::Broken {
                consecutive_failures,
                ..
            } => consecutive_failures.saturating_add(1),
        };
        Self::Broken {
            until: now + policy.backoff_for(consecutive_failures),
            consecutive_failures,
        }
    }

    /// A successful use forgets every earlier failure.
    pub fn confirm(self) -> Self {
        Self::Trusted
    }

    pub fn is_broken(&self, now: MonotonicTime) -> bool {
        matches!(self, Self::Broken { until, .. } if now < *until)
    }

    pub fn broken_until(&self) -> Option<MonotonicTime> {
        match self {
            Self::Trusted => None,
            Self::Broken { until, .. } => Some(*until),
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        match self {
            Self::Trusted => 0,
            Self::Broken {
                consecutive_failures,
                ..
            } => *consecutive_failures,
        }
    }
}

/// Identity of an alternative for broken-state bookkeeping.
///
/// Expiration is deliberately absent: a re-advertised alternative with a
/// fresh lifetime is still the same endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct AlternateKey {
    alpn: String,
    hostname: String,
    port: u16,
}

impl From<&AlternateProtocol> for AlternateKey {
    fn from(protocol: &AlternateProtocol) -> Self {
        Self {
            alpn: protocol.alpn().to_string(),
            hostname: protocol.hostname().to_string(),
            port: protocol.port(),
        }
    }
}

impl AlternateKey {
    pub(crate) fn identifies(&self, protocol: &AlternateProtocol) -> bool {
        self.port == protocol.port()
            && self.alpn == protocol.alpn()
            && self.hostname == protocol.hostname()
    }
}
