use serde::{Deserialize, Serialize};

/// Snapshot of scheduler state, taken under the registry lock.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Tick reported by the clock when the snapshot was taken
    pub current_tick: u64,
    /// Tasks registered and not yet collected
    pub pending_tasks: usize,
    /// Pending tasks whose next firing will be suppressed
    pub cancelled_pending: usize,
    /// Distinct ticks that have work waiting
    pub tick_buckets: usize,
    /// Earliest tick with work waiting
    pub next_due_tick: Option<u64>,
    /// Registrations since start (re-arms not included)
    pub total_registered: u64,
    /// Firings handed to the main loop since start
    pub total_fired: u64,
    /// Firings dropped because of cancellation since start
    pub total_suppressed: u64,
}
