//! Named cache registry with one cache copy per worker.
//!
//! # Ownership
//!
//! The [`CacheManager`] is shared by every worker and only remembers which
//! named caches exist and with which options. The caches themselves live in
//! each worker's [`WorkerContext`]: a worker builds its own copy of a named
//! cache the first time it asks for it, so cache operations never cross a
//! thread boundary and never lock. Copies on different workers diverge
//! unless they share a persistent store, which in turn is only allowed with
//! a single worker.
//!
//! # Example
//!
//! ```ignore
//! let factory = CacheManagerFactory::new(ManagerData { concurrency: 1 });
//! let manager = factory.get();
//!
//! // On the worker thread:
//! let mut ctx = WorkerContext::new(0, Arc::new(RealTimeSource));
//! let cache = manager.get_cache(&options, &mut ctx)?;
//! cache.set_alternatives(&origin, alternatives);
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use altsvc_core::{
    AltSvcResult, AlternateProtocol, CacheOptions, ConfigError, MonotonicTime, Origin,
    StorageError, TimeSource, PREPOPULATED_ALPN, PREPOPULATED_SCHEME, PREPOPULATED_TTL,
};
use once_cell::sync::OnceCell;

use crate::cache::{create_store, AlternateProtocolsCache, CacheStats};

/// Runtime facts the manager needs when building caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerData {
    /// Number of worker threads in the hosting runtime.
    pub concurrency: u32,
}

// ============================================================================
// CACHE HANDLE
// ============================================================================

/// Shared handle to a worker-local cache.
///
/// Clones observe the same cache. The handle is `!Send` so a cache can never
/// escape the worker that built it.
#[derive(Clone, Debug)]
pub struct CacheHandle {
    inner: Rc<RefCell<AlternateProtocolsCache>>,
}

impl CacheHandle {
    pub fn new(cache: AlternateProtocolsCache) -> Self {
        Self {
            inner: Rc::new(RefCell::new(cache)),
        }
    }

    pub fn find_alternatives(&self, origin: &Origin) -> Option<Vec<AlternateProtocol>> {
        self.inner.borrow_mut().find_alternatives(origin)
    }

    pub fn set_alternatives(&self, origin: &Origin, protocols: Vec<AlternateProtocol>) {
        self.inner.borrow_mut().set_alternatives(origin, protocols)
    }

    pub fn clear_alternatives(&self, origin: &Origin) -> bool {
        self.inner.borrow_mut().clear_alternatives(origin)
    }

    pub fn mark_broken(&self, origin: &Origin, protocol: &AlternateProtocol) {
        self.inner.borrow_mut().mark_broken(origin, protocol)
    }

    pub fn confirm_alternate_protocol(&self, origin: &Origin, protocol: &AlternateProtocol) {
        self.inner
            .borrow_mut()
            .confirm_alternate_protocol(origin, protocol)
    }

    pub fn contains(&self, origin: &Origin) -> bool {
        self.inner.borrow().contains(origin)
    }

    pub fn is_broken(&self, origin: &Origin, protocol: &AlternateProtocol) -> bool {
        self.inner.borrow().is_broken(origin, protocol)
    }

    pub fn broken_until(&self, origin: &Origin, protocol: &AlternateProtocol) -> Option<MonotonicTime> {
        self.inner.borrow().broken_until(origin, protocol)
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.borrow().stats()
    }

    pub fn flush(&self) {
        self.inner.borrow().flush()
    }

    /// True when both handles refer to the same cache.
    pub fn ptr_eq(&self, other: &CacheHandle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// A built cache together with the options it was built from.
#[derive(Debug, Clone)]
pub struct CacheWithOptions {
    pub options: CacheOptions,
    pub cache: CacheHandle,
}

// ============================================================================
// WORKER CONTEXT
// ============================================================================

/// Per-worker table of cache copies.
///
/// Create one per worker thread, on that thread, and pass it to every
/// [`CacheManager::get_cache`] call made from the worker.
#[derive(Debug)]
pub struct WorkerContext {
    id: usize,
    time_source: Arc<dyn TimeSource>,
    caches: HashMap<String, CacheWithOptions>,
}

impl WorkerContext {
    pub fn new(id: usize, time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            id,
            time_source,
            caches: HashMap::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn time_source(&self) -> &Arc<dyn TimeSource> {
        &self.time_source
    }

    /// The cache this worker built for `name`, if any.
    pub fn cache(&self, name: &str) -> Option<&CacheWithOptions> {
        self.caches.get(name)
    }

    /// Number of named caches this worker has built.
    pub fn cache_count(&self) -> usize {
        self.caches.len()
    }
}

// ============================================================================
// MANAGER
// ============================================================================

/// Registry of named alternate-protocols caches.
#[derive(Debug)]
pub struct CacheManager {
    data: ManagerData,
    /// First options registered for each name, across all workers.
    registered: Mutex<HashMap<String, CacheOptions>>,
}

impl CacheManager {
    pub fn new(data: ManagerData) -> Self {
        Self {
            data,
            registered: Mutex::new(HashMap::new()),
        }
    }

    pub fn data(&self) -> ManagerData {
        self.data
    }

    /// Return this worker's copy of the cache named by `options`, building it
    /// on first use.
    ///
    /// # Errors
    ///
    /// - `ConfigError::MissingRequired` / `InvalidValue` for invalid options
    /// - `ConfigError::UnsupportedConcurrency` when a persistent store is
    ///   requested and the runtime runs more than one worker
    /// - `ConfigError::ConfigurationConflict` when the name is already
    ///   registered with different options
    /// - Storage errors if the persistent store cannot be opened
    pub fn get_cache(
        &self,
        options: &CacheOptions,
        ctx: &mut WorkerContext,
    ) -> AltSvcResult<CacheHandle> {
        options.validate()?;

        if options.has_key_value_store() && self.data.concurrency != 1 {
            return Err(ConfigError::UnsupportedConcurrency {
                concurrency: self.data.concurrency,
                options: options.describe(),
            }
            .into());
        }

        if let Some(existing) = ctx.caches.get(&options.name) {
            if existing.options != *options {
                return Err(conflict(&existing.options, options).into());
            }
            return Ok(existing.cache.clone());
        }

        self.register(options)?;

        let store = options
            .key_value_store
            .as_ref()
            .map(create_store)
            .transpose()?;

        let cache = AlternateProtocolsCache::new(
            Arc::clone(&ctx.time_source),
            store,
            options.max_entries as usize,
            options.backoff,
        );
        let handle = CacheHandle::new(cache);
        prepopulate(&handle, options, ctx.time_source.as_ref());

        tracing::debug!(
            cache = %options.name,
            worker = ctx.id,
            max_entries = options.max_entries,
            persistent = options.has_key_value_store(),
            entries = handle.len(),
            "Created alternate protocols cache"
        );

        ctx.caches.insert(
            options.name.clone(),
            CacheWithOptions {
                options: options.clone(),
                cache: handle.clone(),
            },
        );
        Ok(handle)
    }

    /// Record `options` as the definition of its name, or check it against
    /// the definition already recorded.
    fn register(&self, options: &CacheOptions) -> AltSvcResult<()> {
        let mut registered = self
            .registered
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?;
        match registered.get(&options.name) {
            Some(first) if first != options => Err(conflict(first, options).into()),
            Some(_) => Ok(()),
            None => {
                registered.insert(options.name.clone(), options.clone());
                Ok(())
            }
        }
    }

    /// Names of every cache registered so far, sorted.
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .registered
            .lock()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

fn conflict(first: &CacheOptions, second: &CacheOptions) -> ConfigError {
    ConfigError::ConfigurationConflict {
        name: second.name.clone(),
        first: first.describe(),
        second: second.describe(),
    }
}

/// Install statically configured origins that the store did not already supply.
fn prepopulate(cache: &CacheHandle, options: &CacheOptions, clock: &dyn TimeSource) {
    for entry in &options.prepopulated_entries {
        let origin = Origin::new(PREPOPULATED_SCHEME, entry.hostname.as_str(), entry.port);
        if cache.contains(&origin) {
            continue;
        }
        let protocol = AlternateProtocol::new(
            PREPOPULATED_ALPN,
            entry.hostname.as_str(),
            entry.port,
            clock.monotonic_now() + PREPOPULATED_TTL,
        );
        cache.set_alternatives(&origin, vec![protocol]);
    }
}

// ============================================================================
// FACTORY
// ============================================================================

/// Produces the single [`CacheManager`] of a process.
///
/// Owned by the composition root; every component that needs caches is
/// handed the manager obtained from [`CacheManagerFactory::get`].
#[derive(Debug)]
pub struct CacheManagerFactory {
    data: ManagerData,
    manager: OnceCell<Arc<CacheManager>>,
}

impl CacheManagerFactory {
    pub fn new(data: ManagerData) -> Self {
        Self {
            data,
            manager: OnceCell::new(),
        }
    }

    /// The manager, built on first call.
    pub fn get(&self) -> Arc<CacheManager> {
        Arc::clone(
            self.manager
                .get_or_init(|| Arc::new(CacheManager::new(self.data))),
        )
    }
}
