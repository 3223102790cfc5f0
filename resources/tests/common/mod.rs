#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use redlilium_core::compute::yield_now;
use redlilium_resources::{AnyAsset, Asset, AssetRequest, Backend, LoadError, LoadFuture, MemoryBackend};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
struct Stats {
    loads: Cell<usize>,
    unloads: RefCell<Vec<String>>,
    trims: Cell<usize>,
    clears: Cell<usize>,
    failing: RefCell<HashSet<String>>,
    delay: Cell<u32>,
}

/// Memory-backed backend that records every call.
///
/// Async loads suspend `delay` times before resolving.
#[derive(Clone, Default)]
pub struct CountingBackend {
    memory: MemoryBackend,
    stats: Rc<Stats>,
}

impl CountingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(self, ticks: u32) -> Self {
        self.stats.delay.set(ticks);
        self
    }

    pub fn insert<T: Asset>(&self, path: &str, value: T) {
        self.memory.insert(path, value);
    }

    pub fn insert_bytes(&self, path: &str, bytes: &str) {
        self.memory.insert_bytes(path, bytes);
    }

    pub fn set_failing(&self, path: &str, failing: bool) {
        let mut set = self.stats.failing.borrow_mut();
        if failing {
            set.insert(path.to_string());
        } else {
            set.remove(path);
        }
    }

    pub fn loads(&self) -> usize {
        self.stats.loads.get()
    }

    pub fn unloads(&self) -> Vec<String> {
        self.stats.unloads.borrow().clone()
    }

    pub fn trims(&self) -> usize {
        self.stats.trims.get()
    }

    pub fn clears(&self) -> usize {
        self.stats.clears.get()
    }

    fn start(&self, request: &AssetRequest) -> Result<AnyAsset, LoadError> {
        self.stats.loads.set(self.stats.loads.get() + 1);
        if self.stats.failing.borrow().contains(request.path()) {
            return Err(LoadError::Io(format!("injected failure for {}", request.path())));
        }
        self.memory.load(request)
    }
}

impl Backend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    fn load(&self, request: &AssetRequest) -> Result<AnyAsset, LoadError> {
        self.start(request)
    }

    fn load_async(&self, request: AssetRequest) -> LoadFuture {
        let result = self.start(&request);
        let delay = self.stats.delay.get();
        Box::pin(async move {
            for _ in 0..delay {
                yield_now().await;
            }
            result
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.memory.exists(path)
    }

    fn unload(&self, path: &str) {
        self.stats.unloads.borrow_mut().push(path.to_string());
    }

    fn clear(&self) {
        self.stats.clears.set(self.stats.clears.get() + 1);
    }

    fn trim(&self) {
        self.stats.trims.set(self.stats.trims.get() + 1);
    }
}
