//! Manager behaviour across real worker threads.

use std::sync::{Arc, Barrier};
use std::thread;

use altsvc_core::RealTimeSource;
use altsvc_storage::{CacheManagerFactory, ManagerData, WorkerContext};
use altsvc_test_utils::assertions::{
    assert_config_conflict, assert_invalid_config, assert_unsupported_concurrency,
};
use altsvc_test_utils::fixtures::{
    example_origin, h3_alternative, lmdb_options, memory_options, ONE_HOUR,
};
use altsvc_test_utils::TimeSource;
use tempfile::TempDir;

#[test]
fn workers_build_independent_copies_of_each_named_cache() {
    const WORKERS: usize = 4;
    let factory = Arc::new(CacheManagerFactory::new(ManagerData {
        concurrency: WORKERS as u32,
    }));
    let barrier = Arc::new(Barrier::new(WORKERS));

    let handles: Vec<_> = (0..WORKERS)
        .map(|id| {
            let factory = Arc::clone(&factory);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let manager = factory.get();
                let clock: Arc<dyn TimeSource> = Arc::new(RealTimeSource);
                let mut ctx = WorkerContext::new(id, clock.clone());
                barrier.wait();

                let cache = manager
                    .get_cache(&memory_options("shared", 32), &mut ctx)
                    .expect("get_cache should succeed");
                let again = manager
                    .get_cache(&memory_options("shared", 32), &mut ctx)
                    .expect("get_cache should succeed");
                assert!(cache.ptr_eq(&again));

                // Only worker 0 learns about the origin.
                let origin = example_origin();
                if id == 0 {
                    cache.set_alternatives(
                        &origin,
                        vec![h3_alternative(clock.as_ref(), "example.com", ONE_HOUR)],
                    );
                }
                cache.find_alternatives(&origin).is_some()
            })
        })
        .collect();

    let seen: Vec<bool> = handles
        .into_iter()
        .map(|h| h.join().expect("worker should not panic"))
        .collect();
    assert_eq!(seen, vec![true, false, false, false]);
    assert_eq!(factory.get().registered_names(), vec!["shared".to_string()]);
}

#[test]
fn conflicting_definitions_are_rejected_on_any_worker() {
    let factory = CacheManagerFactory::new(ManagerData { concurrency: 2 });
    let manager = factory.get();

    let mut first = WorkerContext::new(0, Arc::new(RealTimeSource));
    manager
        .get_cache(&memory_options("default", 10), &mut first)
        .expect("get_cache should succeed");

    let second_manager = factory.get();
    let mut second = WorkerContext::new(1, Arc::new(RealTimeSource));
    let result = second_manager.get_cache(&memory_options("default", 99), &mut second);
    assert_config_conflict(&result, "default");

    let result = second_manager.get_cache(&memory_options("default", 0), &mut second);
    assert_invalid_config(&result);
}

#[test]
fn persistent_cache_rejected_with_multiple_workers() {
    let temp_dir = TempDir::new().expect("TempDir creation should succeed");
    let factory = CacheManagerFactory::new(ManagerData { concurrency: 8 });
    let mut ctx = WorkerContext::new(0, Arc::new(RealTimeSource));

    let result = factory
        .get()
        .get_cache(&lmdb_options("disk", 10, temp_dir.path()), &mut ctx);
    assert_unsupported_concurrency(&result);
}

#[test]
fn persistent_cache_reloads_after_restart() {
    let temp_dir = TempDir::new().expect("TempDir creation should succeed");
    let options = lmdb_options("disk", 10, temp_dir.path());
    let origin = example_origin();
    let clock: Arc<dyn TimeSource> = Arc::new(RealTimeSource);

    {
        let factory = CacheManagerFactory::new(ManagerData { concurrency: 1 });
        let mut ctx = WorkerContext::new(0, clock.clone());
        let cache = factory
            .get()
            .get_cache(&options, &mut ctx)
            .expect("get_cache should succeed");
        cache.set_alternatives(
            &origin,
            vec![h3_alternative(clock.as_ref(), "alt.example.com", ONE_HOUR)],
        );
    }

    let factory = CacheManagerFactory::new(ManagerData { concurrency: 1 });
    let mut ctx = WorkerContext::new(0, clock.clone());
    let cache = factory
        .get()
        .get_cache(&options, &mut ctx)
        .expect("get_cache should succeed");
    let found = cache
        .find_alternatives(&origin)
        .expect("persisted alternatives should be reloaded");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].hostname(), "alt.example.com");
}
