//! Bundle archives with declared dependencies.
//!
//! Paths served by [`ArchiveBackend`] have the form `bundle/asset`. Loading
//! an asset opens its bundle and every bundle it depends on, as declared in
//! a TOML [`Manifest`] read from the same source. Open bundles are
//! reference counted in a [`DependencyGraph`]; the last release of a bundle
//! closes it and releases its dependencies in turn.

mod bundle;
mod graph;
mod manifest;

pub use bundle::{BundleArchive, BundleError};
pub use graph::{BundleNode, DependencyGraph};
pub use manifest::{BundleDecl, Manifest};

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use redlilium_vfs::VfsProvider;

use crate::asset::{AnyAsset, AssetRequest};
use crate::backend::{Backend, LoadFuture};
use crate::error::{LoadError, PathError};
use crate::path::split_node_asset;

/// Name of the permanent graph node standing for the manifest itself.
pub const MANIFEST_NODE: &str = "manifest";

/// Default manifest file name inside an archive source.
pub const DEFAULT_MANIFEST: &str = "manifest.toml";

/// Backend serving assets out of dependency-linked bundles.
///
/// Cloning shares the open bundles, so a host can keep a handle to inspect
/// reference counts or pin bundles after registering the backend.
#[derive(Clone)]
pub struct ArchiveBackend {
    inner: Rc<ArchiveInner>,
}

struct ArchiveInner {
    source: Box<dyn VfsProvider>,
    manifest_path: String,
    manifest: RefCell<Option<Rc<Manifest>>>,
    graph: RefCell<DependencyGraph>,
    /// Successful loads not yet matched by an unload, per asset path.
    holds: RefCell<HashMap<String, u32>>,
    progress: RefCell<HashMap<String, f32>>,
}

impl ArchiveBackend {
    pub fn new(source: impl VfsProvider, manifest_path: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(ArchiveInner {
                source: Box::new(source),
                manifest_path: manifest_path.into(),
                manifest: RefCell::new(None),
                graph: RefCell::new(DependencyGraph::new()),
                holds: RefCell::new(HashMap::new()),
                progress: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// The manifest, read from the source on first use.
    pub fn manifest(&self) -> Result<Rc<Manifest>, LoadError> {
        if let Some(manifest) = self.inner.cached_manifest() {
            return Ok(manifest);
        }
        let bytes = pollster::block_on(self.inner.source.read(&self.inner.manifest_path))
            .map_err(|e| LoadError::Manifest(e.to_string()))?;
        self.inner.install_manifest(&bytes)
    }

    pub fn ref_count(&self, bundle: &str) -> Option<u32> {
        self.inner.graph.borrow().ref_count(bundle)
    }

    pub fn is_open(&self, bundle: &str) -> bool {
        self.inner.graph.borrow().contains(bundle)
    }

    /// Names of open bundles, including the permanent manifest node.
    pub fn open_bundles(&self) -> Vec<String> {
        self.inner.graph.borrow().names()
    }

    /// Opens and retains `bundle` and its dependencies without serving an
    /// asset. Balance with [`release_bundle`](Self::release_bundle).
    pub fn retain_bundle(&self, bundle: &str) -> Result<(), LoadError> {
        self.open_blocking(bundle)?;
        self.inner.graph.borrow_mut().retain(bundle)
    }

    /// Returns the names of bundles that were closed.
    pub fn release_bundle(&self, bundle: &str) -> Vec<String> {
        self.inner.graph.borrow_mut().release(bundle)
    }

    fn open_blocking(&self, bundle: &str) -> Result<(), LoadError> {
        let manifest = self.manifest()?;
        let order = manifest.dependency_order(bundle)?;
        for decl in self.inner.missing(&manifest, &order) {
            let bytes = pollster::block_on(self.inner.source.read(&decl.file_name()));
            self.inner.open_node(bundle, &decl, bytes.map_err(LoadError::from))?;
        }
        Ok(())
    }
}

impl ArchiveInner {
    fn cached_manifest(&self) -> Option<Rc<Manifest>> {
        self.manifest.borrow().clone()
    }

    fn install_manifest(&self, bytes: &[u8]) -> Result<Rc<Manifest>, LoadError> {
        // A concurrent load may have installed it first.
        if let Some(manifest) = self.cached_manifest() {
            return Ok(manifest);
        }
        let text = std::str::from_utf8(bytes).map_err(|e| LoadError::Manifest(e.to_string()))?;
        let manifest = Rc::new(Manifest::from_toml_str(text)?);
        log::info!(
            "Loaded archive manifest {} ({} bundles)",
            self.manifest_path,
            manifest.bundles.len()
        );
        *self.manifest.borrow_mut() = Some(manifest.clone());
        self.graph.borrow_mut().insert_permanent(MANIFEST_NODE);
        Ok(manifest)
    }

    async fn manifest_async(&self) -> Result<Rc<Manifest>, LoadError> {
        if let Some(manifest) = self.cached_manifest() {
            return Ok(manifest);
        }
        let bytes = self
            .source
            .read(&self.manifest_path)
            .await
            .map_err(|e| LoadError::Manifest(e.to_string()))?;
        self.install_manifest(&bytes)
    }

    /// Declarations from `order` whose bundles are not open yet.
    fn missing(&self, manifest: &Manifest, order: &[String]) -> Vec<BundleDecl> {
        let graph = self.graph.borrow();
        order
            .iter()
            .filter(|name| !graph.contains(name))
            .filter_map(|name| manifest.get(name).cloned())
            .collect()
    }

    /// Decodes a bundle read on behalf of `requested` and adds it to the graph.
    fn open_node(
        &self,
        requested: &str,
        decl: &BundleDecl,
        bytes: Result<Vec<u8>, LoadError>,
    ) -> Result<(), LoadError> {
        let wrap = |reason: String| {
            if decl.name == requested {
                LoadError::Bundle {
                    bundle: decl.name.clone(),
                    reason,
                }
            } else {
                LoadError::Dependency {
                    bundle: requested.to_string(),
                    dependency: decl.name.clone(),
                    reason,
                }
            }
        };
        let bytes = match bytes {
            Ok(bytes) => bytes,
            Err(err) if err.is_not_found() && decl.name == requested => {
                return Err(LoadError::NotFound(decl.file_name()));
            }
            Err(err) => return Err(wrap(err.to_string())),
        };
        let archive = BundleArchive::from_bytes(&bytes).map_err(|e| wrap(e.to_string()))?;
        log::debug!(
            "Opened bundle {:?} ({} entries)",
            decl.name,
            archive.len()
        );
        self.graph.borrow_mut().insert(BundleNode::new(
            decl.name.clone(),
            archive,
            decl.dependencies.clone(),
        ));
        Ok(())
    }

    /// Retains the open bundle and decodes one of its entries. The retain
    /// is undone if the entry is missing or fails to decode.
    fn serve(&self, path: &str, request: &AssetRequest) -> Result<AnyAsset, LoadError> {
        let (bundle, asset) = split_node_asset(path).map_err(|e| LoadError::NotFound(e.to_string()))?;
        let archive = {
            let mut graph = self.graph.borrow_mut();
            graph.retain(bundle)?;
            graph.get(bundle).and_then(|node| node.archive().cloned())
        };

        let result = match archive.as_ref().and_then(|archive| archive.get(asset)) {
            Some(bytes) => request.decode(bytes),
            None => Err(LoadError::NotFound(format!("{asset} in bundle {bundle:?}"))),
        };

        match result {
            Ok(loaded) => {
                *self.holds.borrow_mut().entry(path.to_string()).or_insert(0) += 1;
                Ok(loaded)
            }
            Err(err) => {
                self.graph.borrow_mut().release(bundle);
                Err(err)
            }
        }
    }

    async fn load(self: Rc<Self>, request: AssetRequest) -> Result<AnyAsset, LoadError> {
        let path = request.path().to_string();
        let (bundle, _) = split_node_asset(&path).map_err(|e| LoadError::NotFound(e.to_string()))?;
        let manifest = self.manifest_async().await?;
        let order = manifest.dependency_order(bundle)?;

        let needed = self.missing(&manifest, &order).len().max(1);
        let mut opened = 0usize;
        self.progress.borrow_mut().insert(path.clone(), 0.0);

        // A sweep can prune bundles opened by this load before it retains
        // them, so re-check after every round of reads.
        let result = loop {
            let missing = self.missing(&manifest, &order);
            if missing.is_empty() {
                break self.serve(&path, &request);
            }
            let mut failed = None;
            for decl in missing {
                let bytes = self.source.read(&decl.file_name()).await;
                if let Err(err) = self.open_node(bundle, &decl, bytes.map_err(LoadError::from)) {
                    failed = Some(err);
                    break;
                }
                opened += 1;
                let fraction = (opened as f32 / needed as f32).min(0.99);
                self.progress.borrow_mut().insert(path.clone(), fraction);
            }
            if let Some(err) = failed {
                break Err(err);
            }
        };

        self.progress.borrow_mut().remove(&path);
        result
    }
}

impl Backend for ArchiveBackend {
    fn name(&self) -> &str {
        "archive"
    }

    fn validate_path(&self, path: &str) -> Result<(), PathError> {
        split_node_asset(path).map(|_| ())
    }

    fn load(&self, request: &AssetRequest) -> Result<AnyAsset, LoadError> {
        let (bundle, _) =
            split_node_asset(request.path()).map_err(|e| LoadError::NotFound(e.to_string()))?;
        self.open_blocking(bundle)?;
        self.inner.serve(request.path(), request)
    }

    fn load_async(&self, request: AssetRequest) -> LoadFuture {
        Box::pin(self.inner.clone().load(request))
    }

    fn exists(&self, path: &str) -> bool {
        let Ok((bundle, asset)) = split_node_asset(path) else {
            return false;
        };
        let open = self
            .inner
            .graph
            .borrow()
            .get(bundle)
            .and_then(|node| node.archive().cloned());
        if let Some(archive) = open {
            return archive.contains(asset);
        }

        let Ok(manifest) = self.manifest() else {
            return false;
        };
        let Some(decl) = manifest.get(bundle) else {
            return false;
        };
        pollster::block_on(self.inner.source.read(&decl.file_name()))
            .ok()
            .and_then(|bytes| BundleArchive::from_bytes(&bytes).ok())
            .is_some_and(|archive| archive.contains(asset))
    }

    fn unload(&self, path: &str) {
        {
            let mut holds = self.inner.holds.borrow_mut();
            match holds.get_mut(path) {
                Some(count) if *count > 1 => *count -= 1,
                Some(_) => {
                    holds.remove(path);
                }
                None => {
                    log::trace!("archive: nothing held for {path}");
                    return;
                }
            }
        }
        let Ok((bundle, _)) = split_node_asset(path) else {
            return;
        };
        let closed = self.release_bundle(bundle);
        if !closed.is_empty() {
            log::debug!("archive: closed {closed:?}");
        }
    }

    fn clear(&self) {
        self.inner.graph.borrow_mut().clear();
        self.inner.holds.borrow_mut().clear();
        self.inner.progress.borrow_mut().clear();
    }

    fn progress(&self, path: &str) -> Option<f32> {
        self.inner.progress.borrow().get(path).copied()
    }

    fn trim(&self) {
        let pruned = self.inner.graph.borrow_mut().prune_unreferenced();
        if !pruned.is_empty() {
            log::debug!("archive: pruned unreferenced bundles {pruned:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::downcast;
    use redlilium_vfs::MemoryProvider;

    const MANIFEST: &str = r#"
        [[bundle]]
        name = "a"
        dependencies = ["b"]

        [[bundle]]
        name = "b"
        dependencies = ["c"]

        [[bundle]]
        name = "c"

        [[bundle]]
        name = "broken"
        dependencies = ["missing_file"]

        [[bundle]]
        name = "missing_file"
    "#;

    fn source() -> MemoryProvider {
        let source = MemoryProvider::new();
        source.insert(DEFAULT_MANIFEST, MANIFEST.as_bytes().to_vec());
        for (name, entry) in [("a", "31"), ("b", "32"), ("c", "33"), ("broken", "1")] {
            let archive = BundleArchive::new().with_entry("value", entry);
            source.insert(format!("{name}.bundle"), archive.to_bytes().unwrap());
        }
        source
    }

    fn backend() -> ArchiveBackend {
        ArchiveBackend::new(source(), DEFAULT_MANIFEST)
    }

    #[test]
    fn load_opens_dependency_chain() {
        let backend = backend();
        let asset = backend.load(&AssetRequest::new::<u8>("a/value")).unwrap();
        assert_eq!(*downcast::<u8>(asset).unwrap(), 31);

        assert_eq!(backend.ref_count("a"), Some(1));
        assert_eq!(backend.ref_count("b"), Some(1));
        assert_eq!(backend.ref_count("c"), Some(1));
        assert_eq!(backend.ref_count(MANIFEST_NODE), Some(u32::MAX));
    }

    #[test]
    fn unload_closes_chain_and_keeps_manifest() {
        let backend = backend();
        backend.load(&AssetRequest::new::<u8>("a/value")).unwrap();
        backend.unload("a/value");

        assert_eq!(backend.open_bundles(), [MANIFEST_NODE]);
        // Redundant unloads are ignored.
        backend.unload("a/value");
        assert_eq!(backend.open_bundles(), [MANIFEST_NODE]);
    }

    #[test]
    fn missing_entry_releases_its_retain() {
        let backend = backend();
        backend.retain_bundle("c").unwrap();
        let err = backend.load(&AssetRequest::new::<u8>("c/nothing")).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(backend.ref_count("c"), Some(1));
    }

    #[test]
    fn failed_dependency_is_reported_and_trimmed() {
        let backend = backend();
        let err = backend
            .load(&AssetRequest::new::<u8>("broken/value"))
            .unwrap_err();
        assert!(matches!(
            err,
            LoadError::Dependency { ref dependency, .. } if dependency == "missing_file"
        ));
        assert!(!backend.is_open("broken"));

        backend.trim();
        assert_eq!(backend.open_bundles(), [MANIFEST_NODE]);
    }

    #[test]
    fn exists_checks_bundle_contents() {
        let backend = backend();
        assert!(backend.exists("b/value"));
        assert!(!backend.exists("b/other"));
        assert!(!backend.exists("nope/value"));
        assert!(!backend.exists("not-a-node-path"));
        assert!(!backend.is_open("b"));
    }

    #[test]
    fn validate_requires_node_and_asset() {
        let backend = backend();
        assert!(backend.validate_path("a/value").is_ok());
        assert!(backend.validate_path("a").is_err());
        assert!(backend.validate_path("/a/value").is_err());
    }

    #[test]
    fn bad_manifest_is_a_manifest_error() {
        let source = MemoryProvider::new();
        source.insert(DEFAULT_MANIFEST, b"[[bundle]]\nname = 5".to_vec());
        let backend = ArchiveBackend::new(source, DEFAULT_MANIFEST);
        assert!(matches!(
            backend.load(&AssetRequest::new::<u8>("a/value")),
            Err(LoadError::Manifest(_))
        ));
    }
}
