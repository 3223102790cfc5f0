use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Yields control back to the executor, allowing other tasks to run.
///
/// The returned future suspends exactly once: the first poll returns
/// `Pending`, the next one completes. On a [`LocalPool`](super::LocalPool)
/// this means the rest of the task runs on the following tick.
///
/// # Example
///
/// ```ignore
/// pool.spawn(Priority::Low, async move {
///     for path in paths {
///         load(path).await;
///         yield_now().await;
///     }
/// });
/// ```
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future returned by [`yield_now`].
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
