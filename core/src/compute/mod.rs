//! Cooperative compute primitives.
//!
//! Everything here is single-threaded: tasks are plain futures stepped by a
//! host-driven [`LocalPool::tick`] call, typically once per frame.
//!
//! - [`Priority`]: Task priority levels (Critical, High, Low)
//! - [`LocalPool`]: Pool of `!Send` tasks polled with a no-op waker
//! - [`TaskHandle`]: Retrieve results from completed tasks
//! - [`YieldNow`]: Cooperative yielding future

mod pool;
mod priority;
mod yield_now;

pub use pool::{LocalPool, TaskHandle};
pub use priority::Priority;
pub use yield_now::{YieldNow, yield_now};

use std::task::{RawWaker, RawWakerVTable, Waker};

/// Creates a no-op waker for manual polling.
///
/// Cooperative executors re-poll every pending task on each tick, so wake
/// notifications carry no information and can be discarded.
pub fn noop_waker() -> Waker {
    fn noop(_: *const ()) {}
    fn clone(p: *const ()) -> RawWaker {
        RawWaker::new(p, &VTABLE)
    }
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
    unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
}
