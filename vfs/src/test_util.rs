use std::pin::pin;
use std::task::{Context, Poll, Waker};

use crate::{VfsError, VfsFuture};

/// Polls a provider future once and expects it to be finished.
pub(crate) fn poll_ready<T>(fut: VfsFuture<T>) -> Result<T, VfsError> {
    let mut cx = Context::from_waker(Waker::noop());
    match pin!(fut).poll(&mut cx) {
        Poll::Ready(result) => result,
        Poll::Pending => panic!("provider future was not ready after one poll"),
    }
}

/// Fresh scratch directory under the system temp dir.
#[cfg(all(feature = "filesystem", not(target_arch = "wasm32")))]
pub(crate) fn scratch_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("redlilium_vfs_{}_{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
