use std::future::Future;
use std::pin::Pin;

use crate::VfsError;

/// A boxed, `Send` future returning a `Result`.
///
/// All [`VfsProvider`] methods return this type. The futures are `Send + 'static`
/// so they can be handed to a worker thread or polled from a cooperative
/// task pool.
pub type VfsFuture<T> = Pin<Box<dyn Future<Output = Result<T, VfsError>> + Send>>;

/// Trait for byte-level resource sources.
///
/// Providers only move bytes; turning bytes into typed assets is the job of
/// the resource backends layered on top. The returned futures do not drive
/// themselves: the caller polls them cooperatively, or with a blocking
/// executor for synchronous loads.
///
/// # Path Contract
///
/// Paths passed to provider methods are already normalized by
/// [`path::normalize`](crate::path::normalize): forward slashes, no
/// leading/trailing slashes, no `..` or `.` segments.
pub trait VfsProvider: Send + Sync + 'static {
    /// Read the entire contents of a file at the given path.
    fn read(&self, path: &str) -> VfsFuture<Vec<u8>>;

    /// Check whether a file exists at the given path.
    fn exists(&self, path: &str) -> VfsFuture<bool>;

    /// Fraction of an in-flight read that has completed, in `0.0..=1.0`.
    ///
    /// Returns `None` when the provider cannot report real progress for the
    /// path (the default), e.g. because the read completes in one step.
    fn progress(&self, _path: &str) -> Option<f32> {
        None
    }
}
