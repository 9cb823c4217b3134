//! Property tests for the alternate-protocols cache.

use std::sync::Arc;
use std::time::Duration;

use altsvc_storage::{AlternateProtocolsCache, InMemoryStore};
use altsvc_test_utils::fixtures::{example_origin, h3_alternative, standard_backoff, ONE_HOUR};
use altsvc_test_utils::generators::{arb_alpn, arb_hostname, arb_origin, arb_port};
use altsvc_test_utils::{AlternateProtocol, ManualTimeSource, TimeSource};
use proptest::prelude::*;

fn new_cache(max_entries: usize) -> (AlternateProtocolsCache, Arc<ManualTimeSource>) {
    let clock = Arc::new(ManualTimeSource::new());
    let cache = AlternateProtocolsCache::new(clock.clone(), None, max_entries, standard_backoff());
    (cache, clock)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Origins that were never set are never found.
    #[test]
    fn prop_unknown_origins_miss(origins in proptest::collection::vec(arb_origin(), 1..20)) {
        let (mut cache, _clock) = new_cache(16);
        for origin in &origins {
            prop_assert!(cache.find_alternatives(origin).is_none());
        }
    }

    /// Whatever is set is read back unchanged and in order.
    #[test]
    fn prop_set_then_find_roundtrips(
        origin in arb_origin(),
        specs in proptest::collection::vec((arb_alpn(), arb_hostname(), arb_port(), 1u64..86_400), 1..5),
    ) {
        let (mut cache, clock) = new_cache(16);
        let protocols: Vec<AlternateProtocol> = specs
            .into_iter()
            .map(|(alpn, host, port, ttl)| {
                AlternateProtocol::new(alpn, host, port, clock.monotonic_now() + Duration::from_secs(ttl))
            })
            .collect();

        cache.set_alternatives(&origin, protocols.clone());
        prop_assert_eq!(cache.find_alternatives(&origin), Some(protocols.clone()));

        // Setting the same list again changes nothing observable.
        cache.set_alternatives(&origin, protocols.clone());
        prop_assert_eq!(cache.len(), 1);
        prop_assert_eq!(cache.find_alternatives(&origin), Some(protocols));
    }

    /// Nothing past its expiration is ever returned.
    #[test]
    fn prop_expired_alternatives_never_returned(
        ttls in proptest::collection::vec(1u64..1000, 1..6),
        advance in 0u64..1200,
    ) {
        let (mut cache, clock) = new_cache(4);
        let origin = example_origin();
        let protocols: Vec<_> = ttls
            .iter()
            .enumerate()
            .map(|(i, ttl)| h3_alternative(&*clock, &format!("alt{}.example.com", i), Duration::from_secs(*ttl)))
            .collect();
        cache.set_alternatives(&origin, protocols);

        clock.advance(Duration::from_secs(advance));
        let now = clock.monotonic_now();
        match cache.find_alternatives(&origin) {
            Some(found) => {
                prop_assert!(found.iter().all(|p| p.expiration() > now));
                prop_assert_eq!(found.len(), ttls.iter().filter(|t| **t > advance).count());
            }
            None => {
                prop_assert!(ttls.iter().all(|t| *t <= advance));
                prop_assert_eq!(cache.len(), 0);
            }
        }
    }
}

#[test]
fn concrete_h3_scenario() {
    let (mut cache, clock) = new_cache(8);
    let origin = example_origin();
    let alt = h3_alternative(&*clock, "example.com", ONE_HOUR);

    cache.set_alternatives(&origin, vec![alt.clone()]);
    assert_eq!(cache.find_alternatives(&origin), Some(vec![alt]));

    clock.advance(ONE_HOUR + Duration::from_secs(1));
    assert_eq!(cache.find_alternatives(&origin), None);
    assert_eq!(cache.len(), 0);
}

#[test]
fn broken_alternative_backoff_scenario() {
    let (mut cache, clock) = new_cache(8);
    let origin = example_origin();
    let alt = h3_alternative(&*clock, "example.com", Duration::from_secs(30 * 24 * 3600));
    cache.set_alternatives(&origin, vec![alt.clone()]);

    let start = clock.monotonic_now();
    let mut previous = Duration::ZERO;
    for _ in 0..12 {
        cache.mark_broken(&origin, &alt);
        let until = cache.broken_until(&origin, &alt).expect("alternative should be broken");
        let backoff = until - clock.monotonic_now();
        assert!(backoff >= previous, "backoff must not shrink");
        assert!(backoff <= standard_backoff().max());
        previous = backoff;
    }
    assert_eq!(previous, standard_backoff().max());
    assert!(cache.is_broken(&origin, &alt));
    assert!(cache.broken_until(&origin, &alt).expect("broken") > start);

    cache.confirm_alternate_protocol(&origin, &alt);
    assert!(!cache.is_broken(&origin, &alt));
    assert_eq!(cache.find_alternatives(&origin), Some(vec![alt]));
}

#[test]
fn persisted_state_survives_restart() {
    let clock = Arc::new(ManualTimeSource::new());
    let store = InMemoryStore::new();
    let origin = example_origin();
    let alt = h3_alternative(&*clock, "alt.example.com", ONE_HOUR);

    {
        let mut cache = AlternateProtocolsCache::new(
            clock.clone(),
            Some(Box::new(store.clone())),
            8,
            standard_backoff(),
        );
        cache.set_alternatives(&origin, vec![alt.clone()]);
    }
    assert_eq!(store.flush_count(), 1);

    let mut restarted = AlternateProtocolsCache::new(
        clock.clone(),
        Some(Box::new(store.clone())),
        8,
        standard_backoff(),
    );
    assert_eq!(restarted.find_alternatives(&origin), Some(vec![alt]));
}
