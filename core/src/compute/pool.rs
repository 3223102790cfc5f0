use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use super::Priority;
use super::noop_waker;

/// Handle to a task spawned on a [`LocalPool`].
///
/// Allows checking completion status and retrieving the result.
///
/// # Example
///
/// ```
/// use redlilium_core::compute::{LocalPool, Priority};
///
/// let pool = LocalPool::new();
/// let handle = pool.spawn(Priority::Low, async { 42 });
///
/// pool.tick();
/// assert_eq!(handle.try_recv(), Some(42));
/// ```
pub struct TaskHandle<T> {
    slot: Rc<TaskSlot<T>>,
}

struct TaskSlot<T> {
    value: RefCell<Option<T>>,
    finished: Cell<bool>,
    dropped: Cell<bool>,
}

impl<T> TaskHandle<T> {
    /// Takes the result if the task has completed.
    ///
    /// Returns `None` while the task is running, if it was dropped, or if
    /// the value was already taken.
    pub fn try_recv(&self) -> Option<T> {
        self.slot.value.borrow_mut().take()
    }

    /// Whether the task ran to completion.
    pub fn is_finished(&self) -> bool {
        self.slot.finished.get()
    }

    /// Whether the task was dropped before it could complete.
    pub fn is_dropped(&self) -> bool {
        self.slot.dropped.get()
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Option<T>;

    /// Returns `Ready(Some(T))` once the task completed, `Ready(None)` if it
    /// was dropped unfinished, `Pending` otherwise.
    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<T>> {
        if let Some(value) = self.slot.value.borrow_mut().take() {
            return Poll::Ready(Some(value));
        }
        if self.slot.dropped.get() || self.slot.finished.get() {
            return Poll::Ready(None);
        }
        Poll::Pending
    }
}

/// Marks the slot as dropped if the owning task never finished.
struct DropGuard<T> {
    slot: Rc<TaskSlot<T>>,
}

impl<T> Drop for DropGuard<T> {
    fn drop(&mut self) {
        if !self.slot.finished.get() {
            self.slot.dropped.set(true);
        }
    }
}

/// A pending task stored in the pool.
struct PendingTask {
    priority: Priority,
    future: Pin<Box<dyn Future<Output = ()>>>,
    /// Insertion order for stable ordering within the same priority.
    id: u64,
    /// Last [`LocalPool::tick_all`] round that polled this task.
    polled_in: u64,
}

/// Single-threaded cooperative task pool.
///
/// Tasks are stored and polled manually via [`tick`](LocalPool::tick) or
/// [`tick_all`](LocalPool::tick_all), which the host calls once per frame.
/// Futures do not need to be `Send`: everything runs on the thread that
/// owns the pool.
///
/// A task is taken out of the pool while it is being polled, so a running
/// task may spawn new work or tick the pool itself without conflicting
/// borrows. Every other task stays in the queue while one is polled, so a
/// nested tick can reach work the outer tick has not got to yet.
///
/// # Example
///
/// ```
/// use redlilium_core::compute::{LocalPool, Priority};
///
/// let pool = LocalPool::new();
/// let handle = pool.spawn(Priority::Low, async { 42u32 });
///
/// while pool.pending_count() > 0 {
///     pool.tick();
/// }
///
/// assert_eq!(handle.try_recv(), Some(42));
/// ```
pub struct LocalPool {
    tasks: RefCell<Vec<PendingTask>>,
    next_id: Cell<u64>,
    running: Cell<usize>,
    round: Cell<u64>,
}

impl LocalPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            tasks: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            running: Cell::new(0),
            round: Cell::new(0),
        }
    }

    /// Spawns a task with the given priority.
    ///
    /// The task is not polled until the next tick.
    pub fn spawn<T, F>(&self, priority: Priority, future: F) -> TaskHandle<T>
    where
        T: 'static,
        F: Future<Output = T> + 'static,
    {
        let slot = Rc::new(TaskSlot {
            value: RefCell::new(None),
            finished: Cell::new(false),
            dropped: Cell::new(false),
        });

        let guard = DropGuard { slot: slot.clone() };
        let wrapped = async move {
            let result = future.await;
            *guard.slot.value.borrow_mut() = Some(result);
            guard.slot.finished.set(true);
        };

        let id = self.next_id.get();
        self.next_id.set(id + 1);

        self.tasks.borrow_mut().push(PendingTask {
            priority,
            future: Box::pin(wrapped),
            id,
            polled_in: 0,
        });

        TaskHandle { slot }
    }

    /// Polls the highest-priority pending task once.
    ///
    /// Returns the number of tasks that were polled (0 or 1).
    /// Completed tasks are removed from the pool.
    pub fn tick(&self) -> usize {
        match self.take_next(|_| true) {
            Some(task) => {
                self.poll_task(task, self.round.get());
                1
            }
            None => 0,
        }
    }

    /// Polls every task that was pending when the call started, once each,
    /// in priority order.
    ///
    /// Tasks spawned while ticking are first polled on the next call. A
    /// nested `tick_all` from inside a task starts a newer round, and tasks
    /// it polls are not polled again by the enclosing round.
    /// Returns the number of tasks that were polled.
    pub fn tick_all(&self) -> usize {
        let round = self.round.get() + 1;
        self.round.set(round);
        let spawned_before = self.next_id.get();

        let mut polled = 0;
        while let Some(task) =
            self.take_next(|task| task.id < spawned_before && task.polled_in < round)
        {
            self.poll_task(task, round);
            polled += 1;
        }
        polled
    }

    /// Returns the number of incomplete tasks, including one being polled.
    pub fn pending_count(&self) -> usize {
        self.tasks.borrow().len() + self.running.get()
    }

    /// Drops every pending task without completing it.
    ///
    /// Handles of dropped tasks report [`TaskHandle::is_dropped`].
    pub fn clear(&self) {
        let dropped = std::mem::take(&mut *self.tasks.borrow_mut());
        if !dropped.is_empty() {
            log::debug!("LocalPool: dropping {} pending task(s)", dropped.len());
        }
        drop(dropped);
    }

    /// Removes the highest-priority task accepted by `eligible`, earliest
    /// spawned first.
    fn take_next(&self, eligible: impl Fn(&PendingTask) -> bool) -> Option<PendingTask> {
        let mut tasks = self.tasks.borrow_mut();
        let best_idx = tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| eligible(task))
            .max_by(|(_, a), (_, b)| a.priority.cmp(&b.priority).then(b.id.cmp(&a.id)))
            .map(|(i, _)| i)?;
        Some(tasks.swap_remove(best_idx))
    }

    fn poll_task(&self, mut task: PendingTask, round: u64) {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        self.running.set(self.running.get() + 1);
        let poll = task.future.as_mut().poll(&mut cx);
        self.running.set(self.running.get() - 1);

        if poll.is_pending() {
            task.polled_in = task.polled_in.max(round);
            self.tasks.borrow_mut().push(task);
        }
    }
}

impl Default for LocalPool {
    fn default() -> Self {
        Self::new()
    }
}
