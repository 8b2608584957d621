//! Task records handed between plugins, the scheduler and the main loop.

use crate::id::TaskId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// A unit of work the scheduler can hand to the main loop.
///
/// Failures are reported through the returned `Result`; what happens to
/// them is up to whoever executes the task. Any `Fn() -> anyhow::Result<()>`
/// closure is a `Task`.
pub trait Task: Send + Sync + 'static {
    /// Executes the work once.
    fn run(&self) -> anyhow::Result<()>;
}

impl<F> Task for F
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn run(&self) -> anyhow::Result<()> {
        self()
    }
}

/// Opaque handle identifying who requested a task.
///
/// Two owners are equal when their names are equal, so a plugin that is
/// reloaded under the same name still owns its earlier tasks. Serializes
/// as its bare name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskOwner(Arc<str>);

impl TaskOwner {
    /// Creates an owner handle from a plugin or module name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The owner's name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskOwner {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TaskOwner {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl Serialize for TaskOwner {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for TaskOwner {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(TaskOwner::from)
    }
}

/// How and how often a task fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskMode {
    /// Runs once on the tick thread.
    SyncOnce,
    /// Runs once on the worker pool.
    AsyncOnce,
    /// Runs on the tick thread every `period` ticks.
    SyncPeriodic { period: u64 },
    /// Runs on the worker pool every `period` ticks.
    AsyncPeriodic { period: u64 },
}

impl TaskMode {
    /// Whether the task belongs on the worker pool.
    pub fn is_async(self) -> bool {
        match self {
            TaskMode::AsyncOnce | TaskMode::AsyncPeriodic { .. } => true,
            TaskMode::SyncOnce | TaskMode::SyncPeriodic { .. } => false,
        }
    }

    /// Ticks between firings, for periodic modes.
    pub fn period(self) -> Option<u64> {
        match self {
            TaskMode::SyncPeriodic { period } | TaskMode::AsyncPeriodic { period } => Some(period),
            TaskMode::SyncOnce | TaskMode::AsyncOnce => None,
        }
    }
}

/// A registered task: identity, owner, mode and the work itself.
///
/// Cloning is cheap; the work is shared.
#[derive(Clone)]
pub struct ScheduledTask {
    pub(crate) id: TaskId,
    pub(crate) owner: TaskOwner,
    pub(crate) mode: TaskMode,
    pub(crate) work: Arc<dyn Task>,
}

impl ScheduledTask {
    pub(crate) fn new(id: TaskId, owner: TaskOwner, mode: TaskMode, work: Arc<dyn Task>) -> Self {
        Self {
            id,
            owner,
            mode,
            work,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn owner(&self) -> &TaskOwner {
        &self.owner
    }

    pub fn mode(&self) -> TaskMode {
        self.mode
    }

    /// Executes the task's work. Errors are returned untouched.
    pub fn run(&self) -> anyhow::Result<()> {
        self.work.run()
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("mode", &self.mode)
            .field("work", &"[work]")
            .finish()
    }
}

/// The work surfaced by one [`Scheduler::collect`](crate::Scheduler::collect) call.
///
/// Both lists keep registration order.
#[derive(Debug, Default, Clone)]
pub struct DueTasks {
    /// Tasks to run in-line on the tick thread, in order.
    pub sync_tasks: Vec<ScheduledTask>,
    /// Tasks to submit to the worker pool.
    pub async_tasks: Vec<ScheduledTask>,
}

impl DueTasks {
    pub fn is_empty(&self) -> bool {
        self.sync_tasks.is_empty() && self.async_tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sync_tasks.len() + self.async_tasks.len()
    }

    /// Ids of the sync tasks, in order.
    pub fn sync_ids(&self) -> Vec<TaskId> {
        self.sync_tasks.iter().map(ScheduledTask::id).collect()
    }

    /// Ids of the async tasks, in order.
    pub fn async_ids(&self) -> Vec<TaskId> {
        self.async_tasks.iter().map(ScheduledTask::id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_closure_is_a_task() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let work: Arc<dyn Task> = Arc::new(move || -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let task = ScheduledTask::new(TaskId(7), TaskOwner::new("p"), TaskMode::SyncOnce, work);
        task.run().expect("task should succeed");
        task.clone().run().expect("clone shares the work");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_task_errors_are_returned() {
        let work: Arc<dyn Task> = Arc::new(|| -> anyhow::Result<()> { anyhow::bail!("boom") });
        let task = ScheduledTask::new(TaskId(1), TaskOwner::new("p"), TaskMode::AsyncOnce, work);
        let err = task.run().unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_mode_helpers() {
        assert!(!TaskMode::SyncOnce.is_async());
        assert!(TaskMode::AsyncOnce.is_async());
        assert!(TaskMode::AsyncPeriodic { period: 3 }.is_async());
        assert_eq!(TaskMode::SyncPeriodic { period: 3 }.period(), Some(3));
        assert_eq!(TaskMode::AsyncOnce.period(), None);
    }

    #[test]
    fn test_owner_equality_is_by_name() {
        assert_eq!(TaskOwner::new("chat"), TaskOwner::from("chat".to_string()));
        assert_ne!(TaskOwner::new("chat"), TaskOwner::new("combat"));
        assert_eq!(TaskOwner::new("chat").to_string(), "chat");
    }

    #[test]
    fn test_owner_serializes_as_its_name() {
        let value = toml::Value::try_from(TaskOwner::new("combat")).expect("owner should serialize");
        assert_eq!(value, toml::Value::String("combat".to_string()));

        let owner = TaskOwner::deserialize(value).expect("owner should deserialize");
        assert_eq!(owner, TaskOwner::new("combat"));
    }
}
