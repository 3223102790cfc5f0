//! The cache table: one entry per (prefix, path, type) key.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::asset::AnyAsset;
use crate::backend::Backend;
use crate::error::LoadError;
use crate::key::ResourceKey;

/// Shared completion slot of an in-flight load.
///
/// Every caller that joins the load holds a clone; the scheduler task
/// resolves it once.
#[derive(Clone, Default)]
pub struct PendingLoad {
    slot: Rc<PendingSlot>,
}

#[derive(Default)]
struct PendingSlot {
    result: RefCell<Option<Result<AnyAsset, LoadError>>>,
    steps: Cell<u32>,
    abandoned: Cell<bool>,
}

impl PendingLoad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolved(result: Result<AnyAsset, LoadError>) -> Self {
        let pending = Self::new();
        pending.resolve(result);
        pending
    }

    pub fn resolve(&self, result: Result<AnyAsset, LoadError>) {
        *self.slot.result.borrow_mut() = Some(result);
    }

    pub fn result(&self) -> Option<Result<AnyAsset, LoadError>> {
        self.slot.result.borrow().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.result.borrow().is_some()
    }

    /// Number of times the load suspended.
    pub fn steps(&self) -> u32 {
        self.slot.steps.get()
    }

    pub fn record_step(&self) {
        self.slot.steps.set(self.slot.steps.get().saturating_add(1));
    }

    /// Whether the task driving this load was dropped before resolving it.
    pub fn is_abandoned(&self) -> bool {
        self.slot.abandoned.get() && !self.is_resolved()
    }

    pub fn abandon(&self) {
        self.slot.abandoned.set(true);
    }

    pub fn same(&self, other: &PendingLoad) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot)
    }
}

pub enum EntryState {
    Loading(PendingLoad),
    Loaded(AnyAsset),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Loading,
    Loaded,
}

pub struct CacheEntry {
    state: EntryState,
    backend: Rc<dyn Backend>,
    ref_count: u32,
    marked_for_removal: bool,
}

impl CacheEntry {
    pub fn status(&self) -> EntryStatus {
        match self.state {
            EntryState::Loading(_) => EntryStatus::Loading,
            EntryState::Loaded(_) => EntryStatus::Loaded,
        }
    }

    pub fn state(&self) -> &EntryState {
        &self.state
    }

    /// The backend that serves this entry and must unload it.
    pub fn backend(&self) -> &Rc<dyn Backend> {
        &self.backend
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    pub fn is_marked_for_removal(&self) -> bool {
        self.marked_for_removal
    }

    fn is_unused(&self) -> bool {
        self.ref_count == 0 && self.marked_for_removal && self.status() == EntryStatus::Loaded
    }
}

/// What a lookup found for a key.
pub enum Lookup {
    Missing,
    Loaded(AnyAsset),
    Loading(PendingLoad),
    /// An in-flight entry whose driving task is gone.
    Orphaned,
}

/// Result of releasing one reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Released { remaining: u32, status: EntryStatus },
    /// The count was already zero; it stays zero.
    Underflow { status: EntryStatus },
    Missing,
}

/// What happened when a load completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The entry now holds the asset.
    Stored,
    /// Every holder released the entry while it was loading; it was
    /// removed and the asset must be unloaded.
    Evicted,
    /// The entry was cleared or replaced while loading.
    Detached,
}

#[derive(Default)]
pub struct CacheTable {
    entries: HashMap<ResourceKey, CacheEntry>,
}

impl CacheTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn ref_count(&self, key: &ResourceKey) -> Option<u32> {
        self.entries.get(key).map(CacheEntry::ref_count)
    }

    pub fn lookup(&self, key: &ResourceKey) -> Lookup {
        match self.entries.get(key).map(|entry| &entry.state) {
            None => Lookup::Missing,
            Some(EntryState::Loaded(asset)) => Lookup::Loaded(asset.clone()),
            Some(EntryState::Loading(pending)) if pending.is_abandoned() => Lookup::Orphaned,
            Some(EntryState::Loading(pending)) => Lookup::Loading(pending.clone()),
        }
    }

    /// Inserts an in-flight entry with no references.
    pub fn insert_loading(
        &mut self,
        key: ResourceKey,
        pending: PendingLoad,
        backend: Rc<dyn Backend>,
    ) {
        self.entries.insert(
            key,
            CacheEntry {
                state: EntryState::Loading(pending),
                backend,
                ref_count: 0,
                marked_for_removal: false,
            },
        );
    }

    /// Adds a reference and clears any removal mark.
    pub fn retain(&mut self, key: &ResourceKey) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.ref_count += 1;
                entry.marked_for_removal = false;
                true
            }
            None => false,
        }
    }

    /// Drops a reference and marks the entry for removal.
    pub fn release(&mut self, key: &ResourceKey) -> Release {
        let Some(entry) = self.entries.get_mut(key) else {
            return Release::Missing;
        };
        entry.marked_for_removal = true;
        let status = entry.status();
        if entry.ref_count == 0 {
            return Release::Underflow { status };
        }
        entry.ref_count -= 1;
        Release::Released {
            remaining: entry.ref_count,
            status,
        }
    }

    /// Stores the result of the load driven by `pending`.
    pub fn finish(&mut self, key: &ResourceKey, pending: &PendingLoad, asset: AnyAsset) -> Completion {
        let Some(entry) = self.entries.get_mut(key) else {
            return Completion::Detached;
        };
        match &entry.state {
            EntryState::Loading(current) if current.same(pending) => {}
            _ => return Completion::Detached,
        }
        if entry.ref_count == 0 {
            self.entries.remove(key);
            return Completion::Evicted;
        }
        entry.state = EntryState::Loaded(asset);
        Completion::Stored
    }

    /// Removes the entry if it is still the one driven by `pending`.
    pub fn remove_pending(&mut self, key: &ResourceKey, pending: &PendingLoad) -> bool {
        let matches = matches!(
            self.entries.get(key).map(|entry| &entry.state),
            Some(EntryState::Loading(current)) if current.same(pending)
        );
        if matches {
            self.entries.remove(key);
        }
        matches
    }

    pub fn remove(&mut self, key: &ResourceKey) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    /// Removes a loaded entry with no references, whether or not it is
    /// marked. Returns the backend to unload it from.
    pub fn remove_if_unreferenced(&mut self, key: &ResourceKey) -> Option<Rc<dyn Backend>> {
        let evict = self
            .entries
            .get(key)
            .is_some_and(|entry| entry.ref_count == 0 && entry.status() == EntryStatus::Loaded);
        if !evict {
            return None;
        }
        self.entries.remove(key).map(|entry| entry.backend)
    }

    /// Removes the entry if it is still loaded, marked and unreferenced.
    pub fn remove_if_unused(&mut self, key: &ResourceKey) -> Option<Rc<dyn Backend>> {
        if !self.entries.get(key).is_some_and(CacheEntry::is_unused) {
            return None;
        }
        self.entries.remove(key).map(|entry| entry.backend)
    }

    /// Snapshot of keys eligible for a sweep.
    pub fn removal_candidates(&self) -> Vec<ResourceKey> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_unused())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Removes every entry, returning loaded ones with their backends.
    pub fn clear(&mut self) -> Vec<(ResourceKey, Rc<dyn Backend>)> {
        self.entries
            .drain()
            .filter(|(_, entry)| entry.status() == EntryStatus::Loaded)
            .map(|(key, entry)| (key, entry.backend))
            .collect()
    }
}
