use std::path::{Path, PathBuf};

use crate::error::VfsError;
use crate::provider::{VfsFuture, VfsProvider};

/// Reads resource bytes from a directory on disk.
///
/// Provider paths are joined onto the root directory. Reads use blocking
/// `std::fs` calls inside the returned futures, which therefore finish on
/// their first poll. Paths reaching this provider were normalized first, so
/// `..` can not escape the root.
///
/// ```ignore
/// let files = VfsBackend::new("filesystem", FileSystemProvider::new("./assets"));
/// resources.register("file", files);
///
/// // ./assets/shaders/sky.wgsl
/// let source = resources.load::<String>("file://shaders/sky.wgsl")?;
/// ```
pub struct FileSystemProvider {
    root: PathBuf,
}

impl FileSystemProvider {
    /// Provider over `root`. A missing directory is only reported when a
    /// read is attempted.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl VfsProvider for FileSystemProvider {
    fn read(&self, path: &str) -> VfsFuture<Vec<u8>> {
        let full = self.full_path(path);
        let path = path.to_owned();
        Box::pin(async move {
            if full.is_dir() {
                return Err(VfsError::NotFound(format!("{path} is a directory")));
            }
            let bytes = std::fs::read(&full)?;
            log::trace!("Read {} bytes from {}", bytes.len(), full.display());
            Ok(bytes)
        })
    }

    fn exists(&self, path: &str) -> VfsFuture<bool> {
        let full = self.full_path(path);
        Box::pin(async move { Ok(full.is_file()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{poll_ready, scratch_dir};

    #[test]
    fn reads_file_below_root() {
        let dir = scratch_dir("fs_read");
        std::fs::create_dir_all(dir.join("shaders")).unwrap();
        std::fs::write(dir.join("shaders/sky.wgsl"), b"@vertex").unwrap();

        let provider = FileSystemProvider::new(&dir);
        assert_eq!(poll_ready(provider.read("shaders/sky.wgsl")).unwrap(), b"@vertex");
        assert_eq!(provider.root(), dir.as_path());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = scratch_dir("fs_missing");
        let provider = FileSystemProvider::new(&dir);

        let result = poll_ready(provider.read("nope.bin"));
        assert!(matches!(result, Err(VfsError::NotFound(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn directories_are_not_resources() {
        let dir = scratch_dir("fs_dirs");
        std::fs::create_dir_all(dir.join("meshes")).unwrap();
        std::fs::write(dir.join("meshes.txt"), b"").unwrap();

        let provider = FileSystemProvider::new(&dir);
        assert!(poll_ready(provider.exists("meshes.txt")).unwrap());
        assert!(!poll_ready(provider.exists("meshes")).unwrap());
        assert!(!poll_ready(provider.exists("absent")).unwrap());
        assert!(matches!(
            poll_ready(provider.read("meshes")),
            Err(VfsError::NotFound(_))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
