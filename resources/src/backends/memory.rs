use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::asset::{AnyAsset, Asset, AssetRequest};
use crate::backend::{Backend, LoadFuture};
use crate::error::LoadError;

/// In-memory repository of typed values and raw bytes.
///
/// Typed values are returned as-is to requests of the same type. Raw bytes
/// are decoded into whatever type is requested. Cloning shares the
/// repository, so a host can keep a handle for inserting after
/// registration.
///
/// ```
/// use redlilium_resources::{MemoryBackend, Resources};
///
/// let memory = MemoryBackend::new();
/// memory.insert("answer", 42i32);
///
/// let resources = Resources::new();
/// resources.register("mem", memory);
/// assert_eq!(*resources.load::<i32>("mem://answer").unwrap(), 42);
/// ```
#[derive(Clone, Default)]
pub struct MemoryBackend {
    store: Rc<RefCell<MemoryStore>>,
}

#[derive(Default)]
struct MemoryStore {
    values: HashMap<(String, TypeId), AnyAsset>,
    bytes: HashMap<String, Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a typed value under `path`.
    pub fn insert<T: Asset>(&self, path: impl Into<String>, value: T) {
        self.store
            .borrow_mut()
            .values
            .insert((path.into(), TypeId::of::<T>()), Arc::new(value));
    }

    /// Stores raw bytes under `path`, decoded on each physical load.
    pub fn insert_bytes(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.store
            .borrow_mut()
            .bytes
            .insert(path.into(), bytes.into());
    }

    /// Removes every value and byte blob stored under `path`.
    pub fn remove(&self, path: &str) -> bool {
        let mut store = self.store.borrow_mut();
        let before = store.values.len();
        store.values.retain(|(p, _), _| p != path);
        let removed_values = store.values.len() != before;
        store.bytes.remove(path).is_some() || removed_values
    }

    pub fn len(&self) -> usize {
        let store = self.store.borrow();
        store.values.len() + store.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, request: &AssetRequest) -> Result<AnyAsset, LoadError> {
        let store = self.store.borrow();
        let typed_key = (request.path().to_string(), request.type_id());
        if let Some(value) = store.values.get(&typed_key) {
            return Ok(value.clone());
        }
        match store.bytes.get(request.path()) {
            Some(bytes) => request.decode(bytes),
            None => Err(LoadError::NotFound(request.path().to_string())),
        }
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn load(&self, request: &AssetRequest) -> Result<AnyAsset, LoadError> {
        self.lookup(request)
    }

    fn load_async(&self, request: AssetRequest) -> LoadFuture {
        let backend = self.clone();
        Box::pin(async move { backend.lookup(&request) })
    }

    fn exists(&self, path: &str) -> bool {
        let store = self.store.borrow();
        store.bytes.contains_key(path) || store.values.keys().any(|(p, _)| p == path)
    }

    // The repository is source data; loading never copies anything that
    // would need releasing.
    fn unload(&self, path: &str) {
        log::trace!("memory: unload {path}");
    }

    fn clear(&self) {}
}
