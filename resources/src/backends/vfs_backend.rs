use std::sync::Arc;

use redlilium_vfs::{VfsProvider, path};

use crate::asset::{AnyAsset, AssetRequest};
use crate::backend::{Backend, LoadFuture};
use crate::error::{LoadError, PathError};

/// Serves assets by decoding bytes read from a [`VfsProvider`].
///
/// Used for the filesystem and HTTP backends. Synchronous loads block on
/// the provider future; asynchronous loads suspend on it. Decoded bytes are
/// dropped right away, so there is nothing to release on unload.
pub struct VfsBackend<P: VfsProvider> {
    name: String,
    provider: Arc<P>,
}

impl<P: VfsProvider> VfsBackend<P> {
    pub fn new(name: impl Into<String>, provider: P) -> Self {
        Self {
            name: name.into(),
            provider: Arc::new(provider),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P: VfsProvider> Backend for VfsBackend<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate_path(&self, raw: &str) -> Result<(), PathError> {
        path::normalize(raw)
            .map(|_| ())
            .map_err(|err| PathError::Invalid {
                path: raw.to_string(),
                reason: err.to_string(),
            })
    }

    fn load(&self, request: &AssetRequest) -> Result<AnyAsset, LoadError> {
        let normalized = path::normalize(request.path())?;
        let bytes = pollster::block_on(self.provider.read(&normalized))?;
        log::trace!("{}: read {} bytes from {normalized}", self.name, bytes.len());
        request.decode(&bytes)
    }

    fn load_async(&self, request: AssetRequest) -> LoadFuture {
        let read = match path::normalize(request.path()) {
            Ok(normalized) => self.provider.read(&normalized),
            Err(err) => return Box::pin(std::future::ready(Err::<AnyAsset, LoadError>(err.into()))),
        };
        Box::pin(async move {
            let bytes = read.await?;
            request.decode(&bytes)
        })
    }

    fn exists(&self, raw: &str) -> bool {
        let Ok(normalized) = path::normalize(raw) else {
            return false;
        };
        pollster::block_on(self.provider.exists(&normalized)).unwrap_or(false)
    }

    fn unload(&self, path: &str) {
        log::trace!("{}: unload {path}", self.name);
    }

    fn clear(&self) {}

    fn progress(&self, raw: &str) -> Option<f32> {
        let normalized = path::normalize(raw).ok()?;
        self.provider.progress(&normalized)
    }
}
