//! Handles returned by asynchronous loads.

use std::cell::Cell;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use redlilium_core::compute::TaskHandle;

use crate::asset::{AnyAsset, Asset, downcast};
use crate::backend::Backend;
use crate::cache::PendingLoad;
use crate::error::{LoadError, ResourceError};
use crate::path::ResourcePath;

/// Upper bound of synthesized progress while a load is still running.
const MAX_PENDING_PROGRESS: f32 = 0.99;

/// Converts a type-erased load result into the caller's type.
pub(crate) fn typed<T: Asset>(
    path: &str,
    result: Result<AnyAsset, LoadError>,
) -> Result<Arc<T>, ResourceError> {
    result
        .and_then(downcast::<T>)
        .map_err(|source| ResourceError::Load {
            path: path.to_string(),
            source,
        })
}

/// Progress estimate for a load that has suspended `steps` times.
fn synthesized_progress(steps: u32) -> f32 {
    let steps = steps.min(i32::MAX as u32) as i32;
    (1.0 - 0.75f32.powi(steps)).min(MAX_PENDING_PROGRESS)
}

/// A single asynchronous load.
///
/// Every caller that joins the same in-flight load gets its own handle over
/// the same result. Awaiting the handle, or polling [`try_result`] each
/// frame, yields the asset once the scheduler has finished the load.
///
/// [`try_result`]: LoadHandle::try_result
pub struct LoadHandle<T: Asset> {
    path: String,
    backend_path: String,
    pending: PendingLoad,
    backend: Option<Rc<dyn Backend>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Asset> LoadHandle<T> {
    pub(crate) fn pending(path: &ResourcePath, pending: PendingLoad, backend: Rc<dyn Backend>) -> Self {
        Self {
            path: path.to_string(),
            backend_path: path.path().to_string(),
            pending,
            backend: Some(backend),
            _marker: PhantomData,
        }
    }

    pub(crate) fn ready(path: &ResourcePath, asset: AnyAsset) -> Self {
        Self {
            path: path.to_string(),
            backend_path: path.path().to_string(),
            pending: PendingLoad::resolved(Ok(asset)),
            backend: None,
            _marker: PhantomData,
        }
    }

    /// The normalized logical path, e.g. `res://a`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_resolved() || self.pending.is_abandoned()
    }

    /// Fraction complete in `0.0..=1.0`.
    ///
    /// Uses the backend's own measurement when it has one. Otherwise the
    /// estimate grows with every suspension of the load and stays below 1.0
    /// until the load has resolved.
    pub fn progress(&self) -> f32 {
        if self.is_done() {
            return 1.0;
        }
        let measured = self
            .backend
            .as_ref()
            .and_then(|backend| backend.progress(&self.backend_path));
        match measured {
            Some(fraction) => fraction.clamp(0.0, MAX_PENDING_PROGRESS),
            None => synthesized_progress(self.pending.steps()),
        }
    }

    /// The result, once the load has resolved.
    pub fn try_result(&self) -> Option<Result<Arc<T>, ResourceError>> {
        if let Some(result) = self.pending.result() {
            return Some(typed(&self.path, result));
        }
        if self.pending.is_abandoned() {
            return Some(typed(&self.path, Err(LoadError::Abandoned)));
        }
        None
    }
}

impl<T: Asset> Future for LoadHandle<T> {
    type Output = Result<Arc<T>, ResourceError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.try_result() {
            Some(result) => Poll::Ready(result),
            None => Poll::Pending,
        }
    }
}

/// Shared counters of a running batch.
pub(crate) struct BatchProgress {
    paths: Vec<String>,
    completed: Cell<usize>,
}

impl BatchProgress {
    pub(crate) fn new(paths: Vec<String>) -> Self {
        Self {
            paths,
            completed: Cell::new(0),
        }
    }

    pub(crate) fn paths(&self) -> &[String] {
        &self.paths
    }

    pub(crate) fn advance(&self) {
        self.completed.set(self.completed.get() + 1);
    }
}

/// Results of a batch, in input order.
pub type BatchResults<T> = Vec<Result<Arc<T>, ResourceError>>;

/// A batch of loads run one after another at low priority.
pub struct BatchHandle<T: Asset> {
    task: TaskHandle<BatchResults<T>>,
    progress: Rc<BatchProgress>,
}

impl<T: Asset> BatchHandle<T> {
    pub(crate) fn new(task: TaskHandle<BatchResults<T>>, progress: Rc<BatchProgress>) -> Self {
        Self { task, progress }
    }

    pub fn len(&self) -> usize {
        self.progress.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.progress.paths.is_empty()
    }

    /// Number of items that have finished, successfully or not.
    pub fn completed(&self) -> usize {
        self.progress.completed.get()
    }

    /// `completed / len`; an empty batch reports 1.0.
    pub fn progress(&self) -> f32 {
        if self.is_empty() {
            return 1.0;
        }
        self.completed() as f32 / self.len() as f32
    }

    pub fn is_done(&self) -> bool {
        self.task.is_finished() || self.task.is_dropped()
    }

    /// Takes the results once the batch has finished.
    pub fn try_results(&self) -> Option<BatchResults<T>> {
        if let Some(results) = self.task.try_recv() {
            return Some(results);
        }
        self.task.is_dropped().then(|| self.abandoned())
    }

    fn abandoned(&self) -> BatchResults<T> {
        self.progress
            .paths
            .iter()
            .map(|path| typed(path, Err(LoadError::Abandoned)))
            .collect()
    }
}

impl<T: Asset> Future for BatchHandle<T> {
    type Output = BatchResults<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.task).poll(cx) {
            Poll::Ready(Some(results)) => Poll::Ready(results),
            Poll::Ready(None) => Poll::Ready(self.abandoned()),
            Poll::Pending => Poll::Pending,
        }
    }
}
