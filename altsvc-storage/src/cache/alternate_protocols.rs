//! Per-origin alternate protocol cache.
//!
//! The cache is owned by a single worker and takes `&mut self` for every
//! operation that can prune, evict, or refresh recency. It never locks.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use altsvc_core::{AlternateProtocol, BackoffPolicy, MonotonicTime, Origin, TimeSource};
use lru::LruCache;

use super::broken::{AlternateKey, BrokenState};
use super::codec;
use super::traits::{CacheStats, KeyValueStore};

/// Stored state for one origin.
#[derive(Debug)]
struct CacheEntry {
    protocols: Vec<AlternateProtocol>,
    /// Only non-trusted pairs are kept, and only for advertised alternatives.
    broken: HashMap<AlternateKey, BrokenState>,
}

impl CacheEntry {
    fn new(protocols: Vec<AlternateProtocol>) -> Self {
        Self {
            protocols,
            broken: HashMap::new(),
        }
    }

    fn broken_state(&self, protocol: &AlternateProtocol) -> BrokenState {
        self.broken
            .get(&AlternateKey::from(protocol))
            .copied()
            .unwrap_or_default()
    }

    fn advertises(&self, protocol: &AlternateProtocol) -> bool {
        self.protocols.iter().any(|p| p.same_endpoint(protocol))
    }

    /// Drop failure memory for alternatives no longer in `protocols`.
    fn prune_broken(&mut self) {
        let protocols = &self.protocols;
        self.broken
            .retain(|key, _| protocols.iter().any(|p| key.identifies(p)));
    }
}

/// Outcome of a lookup, computed while the entry is borrowed.
enum Lookup {
    Miss,
    Expired,
    Found(Vec<AlternateProtocol>),
}

/// Cache of advertised alternate protocols keyed by origin.
///
/// - Capacity is a hard cap on tracked origins; inserting a new origin into
///   a full cache evicts the least recently used origin first.
/// - Expired alternatives are removed lazily on lookup, and an origin left
///   without alternatives is removed entirely.
/// - Broken alternatives stay stored but are filtered out of lookups until
///   their backoff deadline passes.
pub struct AlternateProtocolsCache {
    entries: LruCache<Origin, CacheEntry>,
    backoff: BackoffPolicy,
    time_source: Arc<dyn TimeSource>,
    store: Option<Box<dyn KeyValueStore>>,
    stats: CacheStats,
}

impl AlternateProtocolsCache {
    /// Create a cache, hydrating it from `store` when one is given.
    ///
    /// `max_entries` is clamped to at least one.
    pub fn new(
        time_source: Arc<dyn TimeSource>,
        store: Option<Box<dyn KeyValueStore>>,
        max_entries: usize,
        backoff: BackoffPolicy,
    ) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        let mut cache = Self {
            entries: LruCache::new(capacity),
            backoff,
            time_source,
            store,
            stats: CacheStats::default(),
        };
        cache.hydrate();
        cache
    }

    /// Load every live persisted record.
    ///
    /// Records are admitted in order of their latest expiration, so the
    /// origins with the longest remaining lifetime count as most recently
    /// used. When the store holds more records than the capacity, the ones
    /// closest to expiring are evicted and removed from the store.
    fn hydrate(&mut self) {
        let records = match self.store.as_ref().map(|store| store.load_all()) {
            None => return,
            Some(Ok(records)) => records,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Failed to load persisted alternate protocols");
                return;
            }
        };

        let mut live = Vec::with_capacity(records.len());
        for (key, value) in records {
            match codec::decode_entry(&key, &value, self.time_source.as_ref()) {
                Ok((origin, protocols)) if protocols.is_empty() => {
                    tracing::debug!(origin = %origin, "Dropping fully expired persisted entry");
                    self.store_remove(&key);
                }
                Ok((origin, protocols)) => live.push((origin, protocols)),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping malformed persisted entry");
                }
            }
        }

        live.sort_by_key(|(_, protocols)| protocols.iter().map(|p| p.expiration()).max());
        let loaded = live.len();
        for (origin, protocols) in live {
            self.admit(origin, protocols);
        }
        tracing::debug!(loaded, tracked = self.entries.len(), "Hydrated alternate protocols cache");
    }

    /// Current non-expired, non-broken alternatives for `origin`.
    ///
    /// Drops expired alternatives from the stored list as a side effect,
    /// removes the origin if none remain, and marks the origin as recently
    /// used on a hit.
    pub fn find_alternatives(&mut self, origin: &Origin) -> Option<Vec<AlternateProtocol>> {
        let now = self.time_source.monotonic_now();

        let lookup = match self.entries.get_mut(origin) {
            None => Lookup::Miss,
            Some(entry) => {
                entry.protocols.retain(|p| !p.is_expired(now));
                if entry.protocols.is_empty() {
                    Lookup::Expired
                } else {
                    entry.prune_broken();
                    let usable = entry
                        .protocols
                        .iter()
                        .filter(|p| !entry.broken_state(p).is_broken(now))
                        .cloned()
                        .collect::<Vec<_>>();
                    Lookup::Found(usable)
                }
            }
        };

        match lookup {
            Lookup::Miss => {
                self.stats.misses += 1;
                None
            }
            Lookup::Expired => {
                tracing::debug!(origin = %origin, "All alternatives expired");
                self.remove_entry(origin);
                self.stats.expirations += 1;
                self.stats.misses += 1;
                None
            }
            Lookup::Found(usable) if usable.is_empty() => {
                self.stats.misses += 1;
                None
            }
            Lookup::Found(usable) => {
                self.stats.hits += 1;
                Some(usable)
            }
        }
    }

    /// Whether `origin` is tracked with at least one unexpired alternative.
    ///
    /// Does not refresh recency, prune, or count towards the stats.
    pub fn contains(&self, origin: &Origin) -> bool {
        let now = self.time_source.monotonic_now();
        self.entries
            .peek(origin)
            .is_some_and(|entry| entry.protocols.iter().any(|p| !p.is_expired(now)))
    }

    /// Replace the alternatives advertised for `origin`.
    ///
    /// An empty list is rejected; use [`Self::clear_alternatives`] to forget
    /// an origin. Broken-state memory is kept for alternatives that are
    /// advertised again and dropped for the rest.
    pub fn set_alternatives(&mut self, origin: &Origin, protocols: Vec<AlternateProtocol>) {
        if protocols.is_empty() {
            tracing::warn!(
                origin = %origin,
                "Rejecting empty alternate protocol list, use clear_alternatives instead"
            );
            return;
        }

        self.write_through(origin, &protocols);
        if let Some(entry) = self.entries.get_mut(origin) {
            entry.protocols = protocols;
            entry.prune_broken();
        } else {
            self.admit(origin.clone(), protocols);
        }
    }

    /// Forget `origin`, including its broken-state memory.
    ///
    /// Returns whether the origin was tracked.
    pub fn clear_alternatives(&mut self, origin: &Origin) -> bool {
        self.remove_entry(origin)
    }

    /// Record a failure of `protocol` for `origin`.
    ///
    /// Ignored if the origin is not tracked or does not currently advertise
    /// `protocol`. Refreshes the origin's recency otherwise.
    pub fn mark_broken(&mut self, origin: &Origin, protocol: &AlternateProtocol) {
        let now = self.time_source.monotonic_now();
        let policy = self.backoff;
        let Some(entry) = self.entries.get_mut(origin) else {
            tracing::debug!(origin = %origin, alpn = protocol.alpn(), "mark_broken on unknown origin");
            return;
        };
        if !entry.advertises(protocol) {
            tracing::debug!(
                origin = %origin,
                alpn = protocol.alpn(),
                alt_host = protocol.hostname(),
                alt_port = protocol.port(),
                "mark_broken on alternative the origin does not advertise"
            );
            return;
        }

        let state = entry
            .broken
            .entry(AlternateKey::from(protocol))
            .or_default();
        *state = state.mark_broken(now, &policy);
        tracing::debug!(
            origin = %origin,
            alpn = protocol.alpn(),
            alt_host = protocol.hostname(),
            alt_port = protocol.port(),
            consecutive_failures = state.consecutive_failures(),
            "Marked alternate protocol broken"
        );
    }

    /// Record a successful use of `protocol` for `origin`, clearing any backoff.
    ///
    /// Refreshes the origin's recency like every other backoff update.
    pub fn confirm_alternate_protocol(&mut self, origin: &Origin, protocol: &AlternateProtocol) {
        let Some(entry) = self.entries.get_mut(origin) else {
            tracing::debug!(origin = %origin, alpn = protocol.alpn(), "confirm on unknown origin");
            return;
        };
        if let Some(state) = entry.broken.remove(&AlternateKey::from(protocol)) {
            tracing::debug!(
                origin = %origin,
                alpn = protocol.alpn(),
                previous_failures = state.consecutive_failures(),
                "Confirmed alternate protocol"
            );
        }
    }

    /// Whether `protocol` is currently in backoff for `origin`. No side effects.
    pub fn is_broken(&self, origin: &Origin, protocol: &AlternateProtocol) -> bool {
        let now = self.time_source.monotonic_now();
        self.broken_state(origin, protocol).is_broken(now)
    }

    /// Deadline of the current or most recent backoff, if any.
    pub fn broken_until(&self, origin: &Origin, protocol: &AlternateProtocol) -> Option<MonotonicTime> {
        self.broken_state(origin, protocol).broken_until()
    }

    pub fn consecutive_failures(&self, origin: &Origin, protocol: &AlternateProtocol) -> u32 {
        self.broken_state(origin, protocol).consecutive_failures()
    }

    fn broken_state(&self, origin: &Origin, protocol: &AlternateProtocol) -> BrokenState {
        self.entries
            .peek(origin)
            .map(|entry| entry.broken_state(protocol))
            .unwrap_or_default()
    }

    /// Number of origins tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.entries.len() as u64,
            ..self.stats.clone()
        }
    }

    /// Flush the backing store, if any.
    pub fn flush(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.flush() {
                tracing::warn!(error = %e, "Failed to flush alternate protocols store");
            }
        }
    }

    /// Insert a new origin as most recently used, evicting the least
    /// recently used one if the cache is full.
    fn admit(&mut self, origin: Origin, protocols: Vec<AlternateProtocol>) {
        if let Some((evicted, _)) = self.entries.push(origin.clone(), CacheEntry::new(protocols)) {
            if evicted != origin {
                self.store_remove(&codec::encode_origin(&evicted));
                self.stats.evictions += 1;
                tracing::debug!(origin = %evicted, "Evicted least recently used origin");
            }
        }
    }

    fn remove_entry(&mut self, origin: &Origin) -> bool {
        match self.entries.pop(origin) {
            Some(_) => {
                self.store_remove(&codec::encode_origin(origin));
                true
            }
            None => false,
        }
    }

    fn write_through(&self, origin: &Origin, protocols: &[AlternateProtocol]) {
        let Some(store) = &self.store else {
            return;
        };
        let result = codec::encode_alternatives(origin, protocols, self.time_source.as_ref())
            .map_err(Into::into)
            .and_then(|value| store.set(&codec::encode_origin(origin), &value));
        if let Err(e) = result {
            tracing::warn!(origin = %origin, error = %e, "Failed to persist alternate protocols");
        }
    }

    fn store_remove(&self, key: &str) {
        if let Some(store) = &self.store {
            if let Err(e) = store.remove(key) {
                tracing::warn!(key = %key, error = %e, "Failed to remove persisted alternate protocols");
            }
        }
    }
}

impl Drop for AlternateProtocolsCache {
    fn drop(&mut self) {
        self.flush();
    }
}

impl std::fmt::Debug for AlternateProtocolsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlternateProtocolsCache")
            .field("entries", &self.entries.len())
            .field("max_entries", &self.max_entries())
            .field("backoff", &self.backoff)
            .field("persistent", &self.store.is_some())
            .finish()
    }
}
