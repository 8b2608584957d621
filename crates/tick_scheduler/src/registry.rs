//! Bookkeeping for pending tasks.
//!
//! [`TaskRegistry`] is a plain data structure with no locking of its own.
//! [`Scheduler`](crate::Scheduler) keeps it behind a single mutex so that
//! `by_tick`, `by_id` and `cancelled` always change together.

use crate::id::TaskId;
use crate::task::{ScheduledTask, TaskOwner};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug)]
struct PendingEntry {
    due_tick: u64,
    task: ScheduledTask,
}

/// Pending tasks bucketed by due tick and indexed by id.
///
/// A pending task lives in exactly one tick bucket and in the id index.
/// Cancellation only marks the id; the task is dropped when its bucket is
/// taken.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    by_tick: BTreeMap<u64, Vec<ScheduledTask>>,
    by_id: HashMap<TaskId, PendingEntry>,
    cancelled: HashSet<TaskId>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `task` to the bucket for `due_tick` and indexes it by id.
    pub fn put(&mut self, task: ScheduledTask, due_tick: u64) {
        self.by_tick.entry(due_tick).or_default().push(task.clone());
        self.by_id.insert(task.id(), PendingEntry { due_tick, task });
    }

    /// Removes and returns the bucket for `tick`, in insertion order.
    ///
    /// Returned tasks leave the id index. An index entry that points at a
    /// different tick belongs to a later task sharing the id and is kept.
    /// Returns an empty list when nothing is due.
    pub fn take_due(&mut self, tick: u64) -> Vec<ScheduledTask> {
        let Some(due) = self.by_tick.remove(&tick) else {
            return Vec::new();
        };
        for task in &due {
            if self.due_tick_of(task.id()) == Some(tick) {
                self.by_id.remove(&task.id());
            }
        }
        due
    }

    /// Marks a pending task so its next firing is suppressed.
    ///
    /// Returns `false` (and records nothing) when `id` is not pending.
    pub fn mark_cancelled(&mut self, id: TaskId) -> bool {
        if !self.by_id.contains_key(&id) {
            return false;
        }
        self.cancelled.insert(id);
        true
    }

    /// Marks `id` only if it is pending and registered by `owner`.
    pub fn mark_cancelled_if_owned(&mut self, id: TaskId, owner: &TaskOwner) -> bool {
        match self.by_id.get(&id) {
            Some(entry) if entry.task.owner() == owner => {
                self.cancelled.insert(id);
                true
            }
            _ => false,
        }
    }

    /// Marks every pending task of `owner`. Returns how many ids were newly
    /// marked.
    ///
    /// Linear in the number of pending tasks; there is no owner index.
    pub fn mark_cancelled_for_owner(&mut self, owner: &TaskOwner) -> usize {
        let mut marked = 0;
        for (id, entry) in &self.by_id {
            if entry.task.owner() == owner && self.cancelled.insert(*id) {
                marked += 1;
            }
        }
        marked
    }

    /// Clears the cancellation mark for `id`, returning whether it was set.
    pub fn take_cancelled(&mut self, id: TaskId) -> bool {
        self.cancelled.remove(&id)
    }

    pub fn is_pending(&self, id: TaskId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn is_cancelled(&self, id: TaskId) -> bool {
        self.cancelled.contains(&id)
    }

    /// Tick at which `id` is next due, if pending.
    pub fn due_tick_of(&self, id: TaskId) -> Option<u64> {
        self.by_id.get(&id).map(|entry| entry.due_tick)
    }

    pub fn owner_of(&self, id: TaskId) -> Option<&TaskOwner> {
        self.by_id.get(&id).map(|entry| entry.task.owner())
    }

    pub fn pending_len(&self) -> usize {
        self.by_id.len()
    }

    pub fn bucket_len(&self) -> usize {
        self.by_tick.len()
    }

    pub fn cancelled_len(&self) -> usize {
        self.cancelled.len()
    }

    /// Earliest tick that has a bucket.
    pub fn next_due_tick(&self) -> Option<u64> {
        self.by_tick.keys().next().copied()
    }
}
