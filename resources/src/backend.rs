//! The backend seam: one implementation per source of assets.

use std::future::Future;
use std::pin::Pin;

use crate::asset::{AnyAsset, AssetRequest};
use crate::error::{LoadError, PathError};

/// Future returned by [`Backend::load_async`].
///
/// Runs on the cooperative scheduler thread, so it need not be `Send`.
pub type LoadFuture = Pin<Box<dyn Future<Output = Result<AnyAsset, LoadError>>>>;

/// A source of assets selected by path prefix.
///
/// Backends see only the part of a logical path after `prefix://`. The
/// cache guarantees that a successful `load` or `load_async` is matched by
/// exactly one later `unload` of the same path, once the cache entry is
/// evicted.
pub trait Backend: 'static {
    /// Short name used in log messages.
    fn name(&self) -> &str;

    /// Rejects paths this backend can never serve. Called before any cache
    /// lookup.
    fn validate_path(&self, _path: &str) -> Result<(), PathError> {
        Ok(())
    }

    fn load(&self, request: &AssetRequest) -> Result<AnyAsset, LoadError>;

    /// Starts a load. The returned future is polled by the resource
    /// scheduler; it must suspend rather than block while waiting on I/O.
    fn load_async(&self, request: AssetRequest) -> LoadFuture;

    fn exists(&self, path: &str) -> bool;

    /// Releases whatever the backend holds for a previously loaded path.
    /// Must tolerate redundant calls.
    fn unload(&self, path: &str);

    /// Drops all backend-held state.
    fn clear(&self);

    /// Fraction of an in-flight load, if the backend can measure it.
    fn progress(&self, _path: &str) -> Option<f32> {
        None
    }

    /// Releases idle state. Called at the end of every sweep.
    fn trim(&self) {}
}
