use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::VfsError;
use crate::provider::{VfsFuture, VfsProvider};

type FileMap = Arc<RwLock<HashMap<String, Vec<u8>>>>;

/// Byte source kept entirely in memory.
///
/// Clones share one store, so a test can keep adding files after the
/// provider was moved into a backend.
///
/// ```ignore
/// let files = MemoryProvider::new();
/// files.insert("manifest.toml", manifest.into_bytes());
/// let archive = ArchiveBackend::new(files.clone(), "manifest.toml");
/// files.insert("bundles/ui.bundle", ui_bundle);
/// ```
#[derive(Clone, Default)]
pub struct MemoryProvider {
    files: FileMap,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` under `path`, replacing earlier contents.
    pub fn insert(&self, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.write().insert(path.into(), data.into());
    }

    pub fn remove(&self, path: &str) -> Option<Vec<u8>> {
        self.files.write().remove(path)
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VfsProvider for MemoryProvider {
    fn read(&self, path: &str) -> VfsFuture<Vec<u8>> {
        let found = self.files.read().get(path).cloned();
        let path = path.to_owned();
        Box::pin(async move { found.ok_or(VfsError::NotFound(path)) })
    }

    fn exists(&self, path: &str) -> VfsFuture<bool> {
        let found = self.files.read().contains_key(path);
        Box::pin(async move { Ok(found) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::poll_ready;

    #[test]
    fn read_and_exists() {
        let files = MemoryProvider::new();
        files.insert("ui/theme.toml", "accent = 'red'");

        assert_eq!(poll_ready(files.read("ui/theme.toml")).unwrap(), b"accent = 'red'");
        assert!(poll_ready(files.exists("ui/theme.toml")).unwrap());
        assert!(!poll_ready(files.exists("ui/other.toml")).unwrap());
        assert!(matches!(
            poll_ready(files.read("ui/other.toml")),
            Err(VfsError::NotFound(path)) if path == "ui/other.toml"
        ));
    }

    #[test]
    fn clones_share_one_store() {
        let files = MemoryProvider::new();
        let handed_out = files.clone();
        files.insert("late.bin", vec![1, 2, 3]);

        assert_eq!(handed_out.len(), 1);
        assert_eq!(poll_ready(handed_out.read("late.bin")).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn remove_and_overwrite() {
        let files = MemoryProvider::new();
        files.insert("a", vec![1]);
        files.insert("a", vec![2]);
        assert_eq!(files.remove("a"), Some(vec![2]));
        assert_eq!(files.remove("a"), None);
        assert!(files.is_empty());
    }

    #[test]
    fn contents_are_captured_at_request_time() {
        let files = MemoryProvider::new();
        files.insert("a", vec![1]);
        let pending = files.read("a");
        files.remove("a");
        assert_eq!(poll_ready(pending).unwrap(), vec![1]);
        assert!(files.progress("a").is_none());
    }
}
