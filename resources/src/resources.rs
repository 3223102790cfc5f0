//! The load coordinator.

use std::any::Any;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::task::{Context, Poll};

use redlilium_core::compute::{LocalPool, Priority, yield_now};

use crate::asset::{AnyAsset, Asset, AssetRequest};
use crate::backend::{Backend, LoadFuture};
use crate::cache::{CacheTable, Completion, EntryStatus, Lookup, PendingLoad, Release};
use crate::config::{CacheConfig, SyncConflictPolicy};
use crate::error::{LoadError, ResourceError};
use crate::handle::{BatchHandle, BatchProgress, BatchResults, LoadHandle, typed};
use crate::key::ResourceKey;
use crate::path::ResourcePath;
use crate::registry::ProviderRegistry;

/// Reference-counted resource cache in front of a set of backends.
///
/// All state lives on the thread that owns the `Resources`. Asynchronous
/// loads run as cooperative tasks that only make progress when the host
/// calls [`tick`](Resources::tick), normally once per frame. Cloning is
/// cheap and shares the same cache.
///
/// Every successful `load`/`load_async` adds one reference to the entry for
/// its `(path, type)` key and must be balanced by one `unload`. Unloaded
/// entries stay cached until [`unload_unused`](Resources::unload_unused)
/// sweeps them, unless evicted right away with
/// [`unload_now`](Resources::unload_now).
///
/// ```
/// use redlilium_resources::{MemoryBackend, Resources};
///
/// let memory = MemoryBackend::new();
/// memory.insert_bytes("greeting", "hello");
///
/// let resources = Resources::new();
/// resources.register("mem", memory);
///
/// let handle = resources.load_async::<String>("mem://greeting").unwrap();
/// resources.run_until_idle();
/// assert_eq!(*handle.try_result().unwrap().unwrap(), "hello");
///
/// resources.unload::<String>("mem://greeting").unwrap();
/// assert_eq!(resources.unload_unused(), 1);
/// ```
#[derive(Clone)]
pub struct Resources {
    inner: Rc<ResourcesInner>,
}

struct ResourcesInner {
    registry: RefCell<ProviderRegistry>,
    cache: RefCell<CacheTable>,
    pool: LocalPool,
    config: CacheConfig,
}

impl Resources {
    /// A cache with only the default in-memory backend registered.
    pub fn new() -> Self {
        Self::with_registry(ProviderRegistry::new(), CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self::with_registry(ProviderRegistry::new(), config)
    }

    pub fn with_registry(registry: ProviderRegistry, config: CacheConfig) -> Self {
        Self {
            inner: Rc::new(ResourcesInner {
                registry: RefCell::new(registry),
                cache: RefCell::new(CacheTable::new()),
                pool: LocalPool::new(),
                config,
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Registers `backend` for `prefix://` paths, returning the one it
    /// replaced. Entries already cached keep their original backend.
    pub fn register(&self, prefix: &str, backend: impl Backend) -> Option<Rc<dyn Backend>> {
        self.inner.registry.borrow_mut().register(prefix, backend)
    }

    pub fn register_shared(&self, prefix: &str, backend: Rc<dyn Backend>) -> Option<Rc<dyn Backend>> {
        self.inner.registry.borrow_mut().register_shared(prefix, backend)
    }

    /// Registers the backend for paths without a prefix.
    pub fn register_default(&self, backend: impl Backend) -> Option<Rc<dyn Backend>> {
        self.inner.registry.borrow_mut().register_default(backend)
    }

    /// Loads synchronously, blocking the calling thread.
    ///
    /// A cache hit adds a reference and returns the cached asset. If the key
    /// is already loading asynchronously, the configured
    /// [`SyncConflictPolicy`] decides between driving the scheduler until
    /// that load resolves and failing with [`LoadError::Busy`].
    pub fn load<T: Asset>(&self, raw: &str) -> Result<Arc<T>, ResourceError> {
        let (path, backend) = self.resolve(raw)?;
        let key = ResourceKey::of::<T>(&path);
        let display = path.to_string();

        loop {
            let lookup = self.inner.cache.borrow().lookup(&key);
            match lookup {
                Lookup::Loaded(asset) => {
                    log::debug!("Cache hit {key}");
                    self.inner.cache.borrow_mut().retain(&key);
                    return typed(&display, Ok(asset));
                }
                Lookup::Orphaned => self.drop_orphan(&key),
                Lookup::Loading(pending) => match self.inner.config.sync_conflict {
                    SyncConflictPolicy::Busy => return typed(&display, Err(LoadError::Busy)),
                    SyncConflictPolicy::Wait => {
                        log::debug!("Waiting for in-flight load of {key}");
                        if !self.wait_for(&pending) {
                            return typed(&display, Err(LoadError::Busy));
                        }
                        if let Some(Err(err)) = pending.result() {
                            return typed(&display, Err(err));
                        }
                    }
                },
                Lookup::Missing => {
                    let pending = PendingLoad::new();
                    {
                        let mut cache = self.inner.cache.borrow_mut();
                        cache.insert_loading(key.clone(), pending.clone(), backend.clone());
                        cache.retain(&key);
                    }
                    log::debug!("Cache miss {key}, loading from {}", backend.name());
                    let result = checked(&key, backend.load(&AssetRequest::new::<T>(path.path())));
                    self.complete(&key, &pending, &backend, result.clone());
                    return typed(&display, result);
                }
            }
        }
    }

    /// Starts an asynchronous load, or joins the one already in flight for
    /// the same key.
    ///
    /// Path and registry errors are returned immediately. Everything else is
    /// reported through the handle.
    pub fn load_async<T: Asset>(&self, raw: &str) -> Result<LoadHandle<T>, ResourceError> {
        let (path, backend) = self.resolve(raw)?;
        let key = ResourceKey::of::<T>(&path);

        loop {
            let lookup = self.inner.cache.borrow().lookup(&key);
            match lookup {
                Lookup::Loaded(asset) => {
                    log::debug!("Cache hit {key}");
                    self.inner.cache.borrow_mut().retain(&key);
                    return Ok(LoadHandle::ready(&path, asset));
                }
                Lookup::Orphaned => self.drop_orphan(&key),
                Lookup::Loading(pending) => {
                    log::debug!("Joining in-flight load of {key}");
                    self.inner.cache.borrow_mut().retain(&key);
                    return Ok(LoadHandle::pending(&path, pending, backend));
                }
                Lookup::Missing => {
                    let pending = self.spawn_load::<T>(&path, key, &backend);
                    return Ok(LoadHandle::pending(&path, pending, backend));
                }
            }
        }
    }

    /// Loads asynchronously and hands the result to `callback` on the
    /// scheduler thread.
    pub fn load_with<T, F>(&self, raw: &str, callback: F) -> Result<(), ResourceError>
    where
        T: Asset,
        F: FnOnce(Result<Arc<T>, ResourceError>) + 'static,
    {
        let handle = self.load_async::<T>(raw)?;
        self.inner.pool.spawn(Priority::High, async move {
            callback(handle.await);
        });
        Ok(())
    }

    /// Loads `paths` one after another at low priority.
    ///
    /// Individual failures are recorded in place and do not stop the batch.
    /// Each successful item holds a reference like a single load does.
    pub fn load_batch<T, I, S>(&self, paths: I) -> BatchHandle<T>
    where
        T: Asset,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let progress = Rc::new(BatchProgress::new(paths.into_iter().map(Into::into).collect()));
        let weak = Rc::downgrade(&self.inner);
        let state = progress.clone();

        let task = self.inner.pool.spawn(Priority::Low, async move {
            let mut results: BatchResults<T> = Vec::with_capacity(state.paths().len());
            for (index, path) in state.paths().iter().enumerate() {
                if index > 0 {
                    yield_now().await;
                }
                let result = match upgrade(&weak) {
                    Some(resources) => match resources.load_async::<T>(path) {
                        Ok(handle) => {
                            drop(resources);
                            handle.await
                        }
                        Err(err) => Err(err),
                    },
                    None => typed(path, Err(LoadError::Abandoned)),
                };
                results.push(result);
                state.advance();
            }
            results
        });

        log::debug!("Started batch of {} resource(s)", progress.paths().len());
        BatchHandle::new(task, progress)
    }

    /// Runs [`load_batch`](Self::load_batch) and calls `callback` once with
    /// all results.
    pub fn load_batch_with<T, I, S, F>(&self, paths: I, callback: F)
    where
        T: Asset,
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(BatchResults<T>) + 'static,
    {
        let batch = self.load_batch::<T, I, S>(paths);
        self.inner.pool.spawn(Priority::Low, async move {
            callback(batch.await);
        });
    }

    pub fn exists(&self, raw: &str) -> Result<bool, ResourceError> {
        let (path, backend) = self.resolve(raw)?;
        Ok(backend.exists(path.path()))
    }

    /// Drops one reference and marks the entry for removal by the next
    /// sweep.
    pub fn unload<T: Asset>(&self, raw: &str) -> Result<(), ResourceError> {
        let key = ResourceKey::of::<T>(&ResourcePath::parse(raw)?);
        self.release(&key, false);
        Ok(())
    }

    /// Drops one reference and evicts the entry at once if nothing else
    /// holds it.
    pub fn unload_now<T: Asset>(&self, raw: &str) -> Result<(), ResourceError> {
        let key = ResourceKey::of::<T>(&ResourcePath::parse(raw)?);
        self.release(&key, true);
        Ok(())
    }

    /// Evicts every loaded entry that is unreferenced and marked for
    /// removal, then lets each backend trim idle state.
    ///
    /// Returns the number of evicted entries.
    pub fn unload_unused(&self) -> usize {
        let candidates = self.inner.cache.borrow().removal_candidates();
        let mut evicted = 0;

        for key in &candidates {
            // Unloading one entry can run backend code that touches others.
            let backend = self.inner.cache.borrow_mut().remove_if_unused(key);
            if let Some(backend) = backend {
                log::debug!("Evicting {key}");
                backend.unload(key.path());
                evicted += 1;
            }
        }

        let backends = self.inner.registry.borrow().backends();
        for backend in backends {
            backend.trim();
        }

        if evicted > 0 {
            log::debug!("Swept {evicted} unused resource(s)");
        }
        evicted
    }

    /// Drops every cache entry and clears every backend.
    ///
    /// Loads still in flight keep running; their results are unloaded when
    /// they arrive.
    pub fn clear(&self) {
        let drained = self.inner.cache.borrow_mut().clear();
        for (key, backend) in &drained {
            backend.unload(key.path());
        }

        let backends = self.inner.registry.borrow().backends();
        for backend in backends {
            backend.clear();
        }
        log::info!("Cleared {} cached resource(s)", drained.len());
    }

    /// Polls every scheduled task once. Returns how many were polled.
    pub fn tick(&self) -> usize {
        self.inner.pool.tick_all()
    }

    /// Ticks until no task is left.
    pub fn run_until_idle(&self) {
        while self.inner.pool.pending_count() > 0 {
            if self.tick() == 0 {
                break;
            }
            std::thread::yield_now();
        }
    }

    /// Number of scheduled tasks that have not finished.
    pub fn pending_tasks(&self) -> usize {
        self.inner.pool.pending_count()
    }

    pub fn ref_count<T: Asset>(&self, raw: &str) -> Option<u32> {
        let key = ResourceKey::of::<T>(&ResourcePath::parse(raw).ok()?);
        self.inner.cache.borrow().ref_count(&key)
    }

    pub fn state<T: Asset>(&self, raw: &str) -> Option<EntryStatus> {
        let key = ResourceKey::of::<T>(&ResourcePath::parse(raw).ok()?);
        self.inner.cache.borrow().get(&key).map(|entry| entry.status())
    }

    pub fn is_marked_for_removal<T: Asset>(&self, raw: &str) -> bool {
        let Ok(path) = ResourcePath::parse(raw) else {
            return false;
        };
        self.inner
            .cache
            .borrow()
            .get(&ResourceKey::of::<T>(&path))
            .is_some_and(|entry| entry.is_marked_for_removal())
    }

    pub fn cached_count(&self) -> usize {
        self.inner.cache.borrow().len()
    }

    fn resolve(&self, raw: &str) -> Result<(ResourcePath, Rc<dyn Backend>), ResourceError> {
        let path = ResourcePath::parse(raw)?;
        let backend = self.inner.registry.borrow().resolve_path(&path)?;
        backend.validate_path(path.path())?;
        Ok((path, backend))
    }

    /// Inserts a loading entry holding the caller's reference and schedules
    /// the backend load.
    fn spawn_load<T: Asset>(
        &self,
        path: &ResourcePath,
        key: ResourceKey,
        backend: &Rc<dyn Backend>,
    ) -> PendingLoad {
        let pending = PendingLoad::new();
        {
            let mut cache = self.inner.cache.borrow_mut();
            cache.insert_loading(key.clone(), pending.clone(), backend.clone());
            cache.retain(&key);
        }
        log::debug!("Cache miss {key}, scheduling load from {}", backend.name());

        let future = backend.load_async(AssetRequest::new::<T>(path.path()));
        let guard = AbandonOnDrop(pending.clone());
        let weak = Rc::downgrade(&self.inner);
        let backend = backend.clone();

        self.inner.pool.spawn(Priority::High, async move {
            let pending = &guard.0;
            let result = CountSteps {
                future,
                pending: pending.clone(),
            }
            .await;
            let result = checked(&key, result);
            match upgrade(&weak) {
                Some(resources) => resources.complete(&key, pending, &backend, result),
                None => pending.resolve(result),
            }
        });

        pending
    }

    /// Records the outcome of a physical load and wakes every waiter.
    fn complete(
        &self,
        key: &ResourceKey,
        pending: &PendingLoad,
        backend: &Rc<dyn Backend>,
        result: Result<AnyAsset, LoadError>,
    ) {
        match &result {
            Ok(asset) => {
                let completion = self.inner.cache.borrow_mut().finish(key, pending, asset.clone());
                match completion {
                    Completion::Stored => log::debug!("Loaded {key}"),
                    Completion::Evicted => {
                        log::debug!("{key} was unloaded while loading, evicting");
                        backend.unload(key.path());
                    }
                    Completion::Detached => {
                        log::debug!("{key} left the cache while loading, unloading");
                        backend.unload(key.path());
                    }
                }
            }
            Err(err) => {
                self.inner.cache.borrow_mut().remove_pending(key, pending);
                log::warn!("Failed to load {key}: {err}");
            }
        }
        pending.resolve(result);
    }

    fn release(&self, key: &ResourceKey, immediate: bool) {
        let outcome = self.inner.cache.borrow_mut().release(key);
        let (remaining, status) = match outcome {
            Release::Missing => {
                log::warn!("Unload of {key}, which is not cached");
                return;
            }
            Release::Underflow { status } => {
                log::error!("Unload of {key} without a matching load; reference count stays at 0");
                (0, status)
            }
            Release::Released { remaining, status } => (remaining, status),
        };

        if immediate && remaining == 0 && status == EntryStatus::Loaded {
            let backend = self.inner.cache.borrow_mut().remove_if_unreferenced(key);
            if let Some(backend) = backend {
                log::debug!("Evicting {key}");
                backend.unload(key.path());
            }
        }
    }

    fn drop_orphan(&self, key: &ResourceKey) {
        log::error!("{key} is loading but its task is gone; loading it again");
        self.inner.cache.borrow_mut().remove(key);
    }

    /// Drives the scheduler until `pending` resolves. Returns `false` if no
    /// scheduled task can resolve it.
    fn wait_for(&self, pending: &PendingLoad) -> bool {
        while !pending.is_resolved() {
            if pending.is_abandoned() || self.inner.pool.tick_all() == 0 {
                return pending.is_resolved();
            }
            std::thread::yield_now();
        }
        true
    }
}

impl Default for Resources {
    fn default() -> Self {
        Self::new()
    }
}

fn upgrade(weak: &Weak<ResourcesInner>) -> Option<Resources> {
    weak.upgrade().map(|inner| Resources { inner })
}

/// Rejects assets whose concrete type differs from the requested one.
fn checked(key: &ResourceKey, result: Result<AnyAsset, LoadError>) -> Result<AnyAsset, LoadError> {
    result.and_then(|asset| {
        let any: &dyn Any = &*asset;
        if any.type_id() == key.type_id() {
            Ok(asset)
        } else {
            Err(LoadError::TypeMismatch {
                expected: key.type_name(),
            })
        }
    })
}

/// Marks a load abandoned if its task is dropped before resolving it.
struct AbandonOnDrop(PendingLoad);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        if !self.0.is_resolved() {
            self.0.abandon();
        }
    }
}

/// Counts how often a backend load suspends.
struct CountSteps {
    future: LoadFuture,
    pending: PendingLoad,
}

impl Future for CountSteps {
    type Output = Result<AnyAsset, LoadError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let poll = self.future.as_mut().poll(cx);
        if poll.is_pending() {
            self.pending.record_step();
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::backends::MemoryBackend;

    /// Memory backend that counts physical loads; async loads suspend once.
    #[derive(Clone, Default)]
    struct Tracked {
        memory: MemoryBackend,
        loads: Rc<Cell<usize>>,
    }

    impl Backend for Tracked {
        fn name(&self) -> &str {
            "tracked"
        }

        fn load(&self, request: &AssetRequest) -> Result<AnyAsset, LoadError> {
            self.loads.set(self.loads.get() + 1);
            self.memory.load(request)
        }

        fn load_async(&self, request: AssetRequest) -> LoadFuture {
            let result = self.load(&request);
            Box::pin(async move {
                yield_now().await;
                result
            })
        }

        fn exists(&self, path: &str) -> bool {
            self.memory.exists(path)
        }

        fn unload(&self, _path: &str) {}

        fn clear(&self) {}
    }

    fn setup() -> (Resources, Tracked) {
        let _ = env_logger::builder().is_test(true).try_init();
        let backend = Tracked::default();
        backend.memory.insert("a", 42i32);
        let resources = Resources::new();
        resources.register("mem", backend.clone());
        (resources, backend)
    }

    /// Leaves `mem://a` as a loading entry whose task was dropped.
    fn orphan(resources: &Resources) {
        let _handle = resources.load_async::<i32>("mem://a").unwrap();
        resources.inner.pool.clear();
        let key = ResourceKey::of::<i32>(&ResourcePath::parse("mem://a").unwrap());
        assert!(matches!(resources.inner.cache.borrow().lookup(&key), Lookup::Orphaned));
    }

    #[test]
    fn sync_load_replaces_orphaned_entry() {
        let (resources, backend) = setup();
        orphan(&resources);
        assert_eq!(backend.loads.get(), 1);

        assert_eq!(*resources.load::<i32>("mem://a").unwrap(), 42);
        assert_eq!(backend.loads.get(), 2);
        assert_eq!(resources.state::<i32>("mem://a"), Some(EntryStatus::Loaded));
        assert_eq!(resources.ref_count::<i32>("mem://a"), Some(1));
    }

    #[test]
    fn async_load_replaces_orphaned_entry() {
        let (resources, backend) = setup();
        orphan(&resources);

        let handle = resources.load_async::<i32>("mem://a").unwrap();
        assert_eq!(resources.state::<i32>("mem://a"), Some(EntryStatus::Loading));
        resources.run_until_idle();

        assert_eq!(*handle.try_result().unwrap().unwrap(), 42);
        assert_eq!(backend.loads.get(), 2);
        assert_eq!(resources.ref_count::<i32>("mem://a"), Some(1));
        assert_eq!(resources.cached_count(), 1);
    }
}
