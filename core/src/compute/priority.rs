/// Priority level for cooperative tasks.
///
/// Higher priority tasks are polled before lower priority tasks when the
/// pool is ticked one task at a time.
///
/// # Ordering
///
/// `Critical > High > Low`. Derives `Ord` so priorities can be compared
/// and sorted directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    /// Background work that may span many frames (batch drivers).
    #[default]
    Low,
    /// Work a caller is actively waiting on (single asset loads).
    High,
    /// Must be stepped before anything else this tick.
    Critical,
}
