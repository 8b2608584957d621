//! The simulation clock the scheduler reads.

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of the current simulation tick.
///
/// Implementations must be monotonically non-decreasing. The scheduler only
/// reads the clock; advancing it is the main loop's job.
pub trait TickSource: Send + Sync {
    fn current_tick(&self) -> u64;
}

/// Atomic tick counter advanced once per heartbeat.
#[derive(Debug, Default)]
pub struct TickCounter {
    tick: AtomicU64,
}

impl TickCounter {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(tick: u64) -> Self {
        Self {
            tick: AtomicU64::new(tick),
        }
    }

    /// Moves the clock forward by exactly one tick and returns the new value.
    pub fn advance(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl TickSource for TickCounter {
    fn current_tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }
}
