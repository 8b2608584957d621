//! Task identifiers and the allocator that hands them out.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of a scheduled task.
///
/// Returned by every registration call and accepted by
/// [`Scheduler::cancel_task`](crate::Scheduler::cancel_task). A periodic
/// task keeps the same id across all of its firings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Returns the raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic task id source with wraparound.
///
/// Ids start at 0 and increase by one per call. Once the ceiling has been
/// issued the next call returns 0 again. The allocator never looks at which
/// ids are still in use; [`Scheduler`](crate::Scheduler) skips ids that are
/// still pending when it registers a task.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
    ceiling: u64,
}

impl IdAllocator {
    /// Creates an allocator spanning the full `u64` range.
    pub fn new() -> Self {
        Self::with_ceiling(u64::MAX)
    }

    /// Creates an allocator that wraps to 0 after issuing `ceiling`.
    ///
    /// With a small ceiling the whole id space can be pending at once. The
    /// scheduler then reuses a live id and logs an error. Two pending tasks
    /// sharing an id are indistinguishable to the id-based calls:
    /// `cancel_task` marks the id once and suppresses whichever of them is
    /// collected first, and the earlier task drops out of the id index, so
    /// it is no longer reported as pending and owner cancellation misses it.
    pub fn with_ceiling(ceiling: u64) -> Self {
        Self {
            next: AtomicU64::new(0),
            ceiling,
        }
    }

    /// Creates an allocator whose first id is `start`.
    ///
    /// Values above `ceiling` are clamped to 0.
    pub fn starting_at(start: u64, ceiling: u64) -> Self {
        let start = if start > ceiling { 0 } else { start };
        Self {
            next: AtomicU64::new(start),
            ceiling,
        }
    }

    /// Allocates the next id.
    pub fn next(&self) -> TaskId {
        let ceiling = self.ceiling;
        let previous = self
            .next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| {
                Some(if id >= ceiling { 0 } else { id + 1 })
            })
            // The closure always returns Some.
            .unwrap_or_else(|id| id);
        TaskId(previous)
    }

    /// The largest id this allocator issues before wrapping.
    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_ids_start_at_zero_and_increment() {
        let ids = IdAllocator::new();
        assert_eq!(ids.next(), TaskId(0));
        assert_eq!(ids.next(), TaskId(1));
        assert_eq!(ids.next(), TaskId(2));
    }

    #[test]
    fn test_wraps_to_zero_after_ceiling() {
        let ids = IdAllocator::with_ceiling(2);
        let issued: Vec<u64> = (0..5).map(|_| ids.next().as_u64()).collect();
        assert_eq!(issued, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn test_full_range_wraps_without_overflow() {
        let ids = IdAllocator::starting_at(u64::MAX, u64::MAX);
        assert_eq!(ids.next(), TaskId(u64::MAX));
        assert_eq!(ids.next(), TaskId(0));
    }

    #[test]
    fn test_start_above_ceiling_is_clamped() {
        let ids = IdAllocator::starting_at(10, 5);
        assert_eq!(ids.next(), TaskId(0));
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        let ids = Arc::new(IdAllocator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..1000).map(|_| ids.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("allocator thread panicked") {
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(seen.len(), 8000);
    }
}
