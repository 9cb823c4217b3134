//! Clock abstraction.
//!
//! Expirations and backoff deadlines are monotonic instants so that wall
//! clock adjustments never resurrect or kill entries. The wall clock is only
//! consulted when an expiration has to be written to, or read from, durable
//! storage.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Monotonic timestamp used for expirations and broken-until deadlines.
pub type MonotonicTime = Instant;

/// Source of monotonic and wall-clock time.
pub trait TimeSource: Send + Sync + fmt::Debug {
    /// Current monotonic time.
    fn monotonic_now(&self) -> MonotonicTime;

    /// Current wall-clock time.
    fn system_now(&self) -> DateTime<Utc>;
}

/// Time source backed by the operating system clocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealTimeSource;

impl TimeSource for RealTimeSource {
    fn monotonic_now(&self) -> MonotonicTime {
        Instant::now()
    }

    fn system_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Time source that only moves when told to.
///
/// Both clocks advance together, so a monotonic interval always maps to the
/// same wall-clock interval.
#[derive(Debug)]
pub struct ManualTimeSource {
    monotonic_base: Instant,
    system_base: DateTime<Utc>,
    offset_nanos: AtomicU64,
}

impl ManualTimeSource {
    /// Start both clocks at the current real time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Start the wall clock at `system_base`.
    pub fn starting_at(system_base: DateTime<Utc>) -> Self {
        Self {
            monotonic_base: Instant::now(),
            system_base,
            offset_nanos: AtomicU64::new(0),
        }
    }

    /// Move both clocks forward.
    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        let _ = self
            .offset_nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(nanos))
            });
    }

    /// Total time advanced since construction.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn monotonic_now(&self) -> MonotonicTime {
        self.monotonic_base + self.elapsed()
    }

    fn system_now(&self) -> DateTime<Utc> {
        let millis = i64::try_from(self.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.system_base + chrono::Duration::milliseconds(millis)
    }
}
