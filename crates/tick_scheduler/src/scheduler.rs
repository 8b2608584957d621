//! The scheduler facade used by plugins and the main loop.

use crate::clock::TickSource;
use crate::id::{IdAllocator, TaskId};
use crate::registry::TaskRegistry;
use crate::stats::SchedulerStats;
use crate::task::{DueTasks, ScheduledTask, Task, TaskMode, TaskOwner};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Registry plus running totals, guarded together.
#[derive(Debug, Default)]
struct SchedulerState {
    registry: TaskRegistry,
    total_registered: u64,
    total_fired: u64,
    total_suppressed: u64,
}

/// Tick-synchronized task scheduler.
///
/// Plugins register work to run once, after a delay, or periodically, either
/// on the tick thread (sync) or on the worker pool (async). Once per tick
/// the main loop calls [`collect`](Self::collect) and receives exactly the
/// work due at that tick.
///
/// All registry state sits behind one mutex. Registration, cancellation and
/// collection are each atomic with respect to one another, and `collect`
/// holds the lock from taking the bucket until periodic tasks are re-armed.
/// Task work never runs while the lock is held, so tasks may freely
/// register or cancel other tasks.
pub struct Scheduler {
    clock: Arc<dyn TickSource>,
    ids: IdAllocator,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    /// Creates a scheduler reading ticks from `clock`.
    pub fn new(clock: Arc<dyn TickSource>) -> Self {
        Self::with_id_allocator(clock, IdAllocator::new())
    }

    /// Creates a scheduler with a custom id allocator.
    pub fn with_id_allocator(clock: Arc<dyn TickSource>, ids: IdAllocator) -> Self {
        Self {
            clock,
            ids,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    /// The tick the scheduler currently considers "now".
    pub fn current_tick(&self) -> u64 {
        self.clock.current_tick()
    }

    /// Returns a view of this scheduler bound to `owner`.
    pub fn for_owner(self: &Arc<Self>, owner: impl Into<TaskOwner>) -> OwnerScheduler {
        OwnerScheduler {
            scheduler: Arc::clone(self),
            owner: owner.into(),
        }
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Runs `work` on the tick thread at the next tick.
    pub fn run_task<F>(&self, owner: impl Into<TaskOwner>, work: F) -> TaskId
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.schedule(owner.into(), Arc::new(work), TaskMode::SyncOnce, 0)
    }

    /// Runs `work` on the tick thread `delay` ticks from now.
    ///
    /// A `delay` of zero or less is treated as 1.
    pub fn run_task_later<F>(&self, owner: impl Into<TaskOwner>, work: F, delay: i64) -> TaskId
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.schedule(owner.into(), Arc::new(work), TaskMode::SyncOnce, delay)
    }

    /// Runs `work` on the worker pool at the next tick.
    pub fn run_task_async<F>(&self, owner: impl Into<TaskOwner>, work: F) -> TaskId
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.schedule(owner.into(), Arc::new(work), TaskMode::AsyncOnce, 0)
    }

    /// Runs `work` on the worker pool `delay` ticks from now.
    pub fn run_task_later_async<F>(&self, owner: impl Into<TaskOwner>, work: F, delay: i64) -> TaskId
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.schedule(owner.into(), Arc::new(work), TaskMode::AsyncOnce, delay)
    }

    /// Runs `work` on the tick thread `delay` ticks from now and then every
    /// `period` ticks until cancelled.
    ///
    /// `delay` and `period` values of zero or less are treated as 1.
    pub fn run_task_timer<F>(
        &self,
        owner: impl Into<TaskOwner>,
        work: F,
        delay: i64,
        period: i64,
    ) -> TaskId
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mode = TaskMode::SyncPeriodic {
            period: coerce_ticks(period),
        };
        self.schedule(owner.into(), Arc::new(work), mode, delay)
    }

    /// Periodic counterpart of [`run_task_later_async`](Self::run_task_later_async).
    pub fn run_task_timer_async<F>(
        &self,
        owner: impl Into<TaskOwner>,
        work: F,
        delay: i64,
        period: i64,
    ) -> TaskId
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mode = TaskMode::AsyncPeriodic {
            period: coerce_ticks(period),
        };
        self.schedule(owner.into(), Arc::new(work), mode, delay)
    }

    /// Registers shared work under an explicit mode.
    ///
    /// This is the general form behind the `run_task*` helpers, for callers
    /// holding an `Arc<dyn Task>` rather than a closure. A periodic mode with
    /// a period of 0 is treated as period 1.
    pub fn schedule(&self, owner: TaskOwner, work: Arc<dyn Task>, mode: TaskMode, delay: i64) -> TaskId {
        let mode = normalize_mode(mode);
        let delay = coerce_ticks(delay);

        let mut state = self.state.lock();
        let id = self.allocate_id(&state.registry);
        let due_tick = self.clock.current_tick().saturating_add(delay);

        trace!(
            "Scheduling task {} for {} as {:?} at tick {}",
            id,
            owner,
            mode,
            due_tick
        );

        state
            .registry
            .put(ScheduledTask::new(id, owner, mode, work), due_tick);
        state.total_registered += 1;
        id
    }

    /// Draws ids until one is not still pending.
    ///
    /// Ids are only drawn under the state lock, so consecutive draws are
    /// consecutive ids and `pending + 1` draws always reach a free one
    /// unless the whole id space is pending.
    fn allocate_id(&self, registry: &TaskRegistry) -> TaskId {
        let attempts = registry.pending_len().saturating_add(1);
        let mut id = self.ids.next();
        for _ in 1..attempts {
            if !registry.is_pending(id) {
                return id;
            }
            debug!("Skipping task id {} which is still pending", id);
            id = self.ids.next();
        }
        if registry.is_pending(id) {
            error!(
                "Task id space exhausted ({} pending, ceiling {}); reusing live id {}",
                registry.pending_len(),
                self.ids.ceiling(),
                id
            );
        }
        id
    }

    // ------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------

    /// Suppresses the next pending firing of `id`.
    ///
    /// Idempotent. Returns `false` when `id` is unknown or has already
    /// fired, in which case nothing changes. For periodic tasks only the
    /// next firing is suppressed and the task is not re-armed.
    pub fn cancel_task(&self, id: TaskId) -> bool {
        let marked = self.state.lock().registry.mark_cancelled(id);
        if marked {
            debug!("Task {} marked for cancellation", id);
        } else {
            trace!("Ignoring cancellation of unknown task {}", id);
        }
        marked
    }

    /// Like [`cancel_task`](Self::cancel_task), but only if `id` was
    /// registered by `owner`. The check and the mark happen under one lock.
    pub fn cancel_owned_task(&self, id: TaskId, owner: &TaskOwner) -> bool {
        let marked = self
            .state
            .lock()
            .registry
            .mark_cancelled_if_owned(id, owner);
        if marked {
            debug!("Task {} of {} marked for cancellation", id, owner);
        } else {
            trace!("Ignoring cancellation of task {} not pending for {}", id, owner);
        }
        marked
    }

    /// Suppresses every task currently pending for `owner`.
    ///
    /// Returns how many tasks were newly marked. Used when a plugin is
    /// unloaded.
    pub fn cancel_tasks_for_owner(&self, owner: &TaskOwner) -> usize {
        let marked = self.state.lock().registry.mark_cancelled_for_owner(owner);
        debug!("Marked {} pending task(s) of {} for cancellation", marked, owner);
        marked
    }

    // ------------------------------------------------------------------
    // Collection
    // ------------------------------------------------------------------

    /// Takes the work due at `tick`.
    ///
    /// Cancelled tasks are dropped silently and their cancellation mark is
    /// consumed. Surviving periodic tasks are re-armed at `tick + period`
    /// under the same id before this returns, whatever the caller later does
    /// with them. Both returned lists keep registration order.
    pub fn collect(&self, tick: u64) -> DueTasks {
        let mut state = self.state.lock();
        let due = state.registry.take_due(tick);
        if due.is_empty() {
            return DueTasks::default();
        }

        let mut collected = DueTasks::default();
        for task in due {
            if state.registry.take_cancelled(task.id()) {
                debug!("Dropping cancelled task {} of {} at tick {}", task.id(), task.owner(), tick);
                state.total_suppressed += 1;
                continue;
            }

            state.total_fired += 1;
            match task.mode() {
                TaskMode::SyncOnce => collected.sync_tasks.push(task),
                TaskMode::AsyncOnce => collected.async_tasks.push(task),
                TaskMode::SyncPeriodic { period } => {
                    state.registry.put(task.clone(), tick.saturating_add(period));
                    collected.sync_tasks.push(task);
                }
                TaskMode::AsyncPeriodic { period } => {
                    state.registry.put(task.clone(), tick.saturating_add(period));
                    collected.async_tasks.push(task);
                }
            }
        }

        trace!(
            "Collected {} sync and {} async task(s) at tick {}",
            collected.sync_tasks.len(),
            collected.async_tasks.len(),
            tick
        );
        collected
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Whether `id` is registered and has not yet been collected.
    pub fn is_pending(&self, id: TaskId) -> bool {
        self.state.lock().registry.is_pending(id)
    }

    /// Tick at which `id` will next be collected.
    pub fn due_tick_of(&self, id: TaskId) -> Option<u64> {
        self.state.lock().registry.due_tick_of(id)
    }

    pub fn owner_of(&self, id: TaskId) -> Option<TaskOwner> {
        self.state.lock().registry.owner_of(id).cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().registry.pending_len()
    }

    /// Point-in-time snapshot of the scheduler.
    pub fn stats(&self) -> SchedulerStats {
        let state = self.state.lock();
        SchedulerStats {
            current_tick: self.clock.current_tick(),
            pending_tasks: state.registry.pending_len(),
            cancelled_pending: state.registry.cancelled_len(),
            tick_buckets: state.registry.bucket_len(),
            next_due_tick: state.registry.next_due_tick(),
            total_registered: state.total_registered,
            total_fired: state.total_fired,
            total_suppressed: state.total_suppressed,
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("clock", &"[tick source]")
            .field("ids", &self.ids)
            .field("state", &"[registry]")
            .finish()
    }
}

/// Delays and periods below 1 tick are treated as 1 tick.
fn coerce_ticks(ticks: i64) -> u64 {
    if ticks <= 0 {
        1
    } else {
        ticks as u64
    }
}

fn normalize_mode(mode: TaskMode) -> TaskMode {
    match mode {
        TaskMode::SyncPeriodic { period } => TaskMode::SyncPeriodic {
            period: period.max(1),
        },
        TaskMode::AsyncPeriodic { period } => TaskMode::AsyncPeriodic {
            period: period.max(1),
        },
        TaskMode::SyncOnce | TaskMode::AsyncOnce => mode,
    }
}

/// A [`Scheduler`] bound to one owner.
///
/// Plugins hold one of these instead of the scheduler itself, so every task
/// they register is attributed to them and [`cancel_all`](Self::cancel_all)
/// covers exactly their work.
#[derive(Debug, Clone)]
pub struct OwnerScheduler {
    scheduler: Arc<Scheduler>,
    owner: TaskOwner,
}

impl OwnerScheduler {
    pub fn owner(&self) -> &TaskOwner {
        &self.owner
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn run_task<F>(&self, work: F) -> TaskId
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.scheduler.run_task(self.owner.clone(), work)
    }

    pub fn run_task_later<F>(&self, work: F, delay: i64) -> TaskId
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.scheduler.run_task_later(self.owner.clone(), work, delay)
    }

    pub fn run_task_async<F>(&self, work: F) -> TaskId
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.scheduler.run_task_async(self.owner.clone(), work)
    }

    pub fn run_task_later_async<F>(&self, work: F, delay: i64) -> TaskId
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.scheduler.run_task_later_async(self.owner.clone(), work, delay)
    }

    pub fn run_task_timer<F>(&self, work: F, delay: i64, period: i64) -> TaskId
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.scheduler
            .run_task_timer(self.owner.clone(), work, delay, period)
    }

    pub fn run_task_timer_async<F>(&self, work: F, delay: i64, period: i64) -> TaskId
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.scheduler
            .run_task_timer_async(self.owner.clone(), work, delay, period)
    }

    /// Cancels one task. Ids belonging to other owners are left alone.
    pub fn cancel_task(&self, id: TaskId) -> bool {
        self.scheduler.cancel_owned_task(id, &self.owner)
    }

    /// Cancels every pending task of this owner.
    pub fn cancel_all(&self) -> usize {
        self.scheduler.cancel_tasks_for_owner(&self.owner)
    }
}
