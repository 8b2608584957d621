//! The heartbeat: the main loop that drives the simulation clock.
//!
//! Each heartbeat advances the tick counter by one, collects the work due
//! at the new tick from the [`Scheduler`], runs every sync task in-line in
//! registration order and submits every async task to the worker pool.
//!
//! A failing or panicking task is logged and counted; it never stops the
//! loop and never changes the task's registration. A slow sync task delays
//! the rest of the tick and the next heartbeat.

use crate::config::ServerConfig;
use crate::error::ServerError;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tick_scheduler::{ScheduledTask, Scheduler, TickCounter};
use tracing::{debug, error, info, trace, warn};

/// How far behind schedule the loop may fall before it stops trying to
/// catch up and re-bases its pacing on the current time.
const MAX_CATCH_UP_TICKS: u32 = 100;

#[derive(Debug, Default)]
struct HeartbeatCounters {
    ticks: AtomicU64,
    sync_executed: AtomicU64,
    async_dispatched: AtomicU64,
    async_completed: AtomicU64,
    task_failures: AtomicU64,
    task_panics: AtomicU64,
    overruns: AtomicU64,
}

/// Snapshot of heartbeat activity since start.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatStats {
    /// Heartbeats completed
    pub ticks: u64,
    /// Sync tasks run on the tick thread
    pub sync_executed: u64,
    /// Async tasks handed to the worker pool
    pub async_dispatched: u64,
    /// Async tasks that finished running (successfully or not)
    pub async_completed: u64,
    /// Tasks that returned an error
    pub task_failures: u64,
    /// Tasks that panicked
    pub task_panics: u64,
    /// Heartbeats that started late
    pub overruns: u64,
}

/// The tick-driving main loop.
pub struct Heartbeat {
    scheduler: Arc<Scheduler>,
    clock: Arc<TickCounter>,
    workers: rayon::ThreadPool,
    tick_interval: Duration,
    counters: Arc<HeartbeatCounters>,
}

impl Heartbeat {
    /// Creates a heartbeat and its async worker pool.
    pub fn new(
        scheduler: Arc<Scheduler>,
        clock: Arc<TickCounter>,
        config: &ServerConfig,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(config.async_workers)
            .thread_name(|index| format!("async-worker-{index}"))
            .build()
            .map_err(|e| ServerError::Worker(format!("Failed to build async worker pool: {e}")))?;

        Ok(Self {
            scheduler,
            clock,
            workers,
            tick_interval: config.tick_interval(),
            counters: Arc::new(HeartbeatCounters::default()),
        })
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Performs exactly one heartbeat and returns the tick it ran.
    ///
    /// Sync tasks have finished when this returns; async tasks may still be
    /// running on the worker pool.
    pub fn tick_once(&self) -> u64 {
        let tick = self.clock.advance();
        let due = self.scheduler.collect(tick);
        self.counters.ticks.fetch_add(1, Ordering::Relaxed);

        if due.is_empty() {
            return tick;
        }

        trace!(
            "Tick {}: {} sync, {} async task(s) due",
            tick,
            due.sync_tasks.len(),
            due.async_tasks.len()
        );

        for task in &due.sync_tasks {
            self.counters.sync_executed.fetch_add(1, Ordering::Relaxed);
            report(execute(task), &self.counters);
        }

        for task in due.async_tasks {
            self.counters.async_dispatched.fetch_add(1, Ordering::Relaxed);
            let counters = Arc::clone(&self.counters);
            self.workers.spawn(move || {
                report(execute(&task), &counters);
                counters.async_completed.fetch_add(1, Ordering::Relaxed);
            });
        }

        tick
    }

    /// Starts the heartbeat on a dedicated `heartbeat` thread.
    pub fn spawn(self: Arc<Self>) -> Result<HeartbeatHandle, ServerError> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let thread = thread::Builder::new()
            .name("heartbeat".to_string())
            .spawn(move || self.run(&flag))
            .map_err(|e| ServerError::Worker(format!("Failed to spawn heartbeat thread: {e}")))?;

        Ok(HeartbeatHandle {
            running,
            thread: Some(thread),
        })
    }

    /// Runs heartbeats at a fixed rate until `running` is cleared.
    fn run(&self, running: &AtomicBool) {
        info!(
            "🕒 Heartbeat started at tick {} ({:?} per tick)",
            self.scheduler.current_tick(),
            self.tick_interval
        );

        let mut next_beat = Instant::now() + self.tick_interval;
        while running.load(Ordering::Acquire) {
            self.tick_once();

            next_beat += self.tick_interval;
            let now = Instant::now();
            if next_beat > now {
                thread::sleep(next_beat - now);
                continue;
            }

            self.counters.overruns.fetch_add(1, Ordering::Relaxed);
            let behind = now - next_beat;
            if behind > self.tick_interval * MAX_CATCH_UP_TICKS {
                warn!(
                    "⚠️ Heartbeat is {:?} behind schedule; dropping catch-up and continuing from now",
                    behind
                );
                next_beat = now;
            } else {
                debug!("Heartbeat running {:?} behind schedule", behind);
            }
        }

        info!("🛑 Heartbeat stopped at tick {}", self.scheduler.current_tick());
    }

    pub fn stats(&self) -> HeartbeatStats {
        let c = &self.counters;
        HeartbeatStats {
            ticks: c.ticks.load(Ordering::Relaxed),
            sync_executed: c.sync_executed.load(Ordering::Relaxed),
            async_dispatched: c.async_dispatched.load(Ordering::Relaxed),
            async_completed: c.async_completed.load(Ordering::Relaxed),
            task_failures: c.task_failures.load(Ordering::Relaxed),
            task_panics: c.task_panics.load(Ordering::Relaxed),
            overruns: c.overruns.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for Heartbeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heartbeat")
            .field("tick_interval", &self.tick_interval)
            .field("workers", &self.workers.current_num_threads())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Control handle for a running heartbeat thread.
///
/// Dropping the handle asks the loop to stop without waiting for it.
#[derive(Debug)]
pub struct HeartbeatHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HeartbeatHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stops the loop after its current heartbeat and waits for the thread.
    pub fn stop(mut self) -> Result<(), ServerError> {
        self.running.store(false, Ordering::Release);
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|payload| {
                ServerError::Internal(format!(
                    "Heartbeat thread panicked: {}",
                    panic_message(&*payload)
                ))
            }),
            None => Ok(()),
        }
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Runs one task, turning errors and panics into [`ServerError`]s.
pub fn execute(task: &ScheduledTask) -> Result<(), ServerError> {
    match catch_unwind(AssertUnwindSafe(|| task.run())) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ServerError::TaskFailed {
            id: task.id(),
            owner: task.owner().clone(),
            message: format!("{e:#}"),
        }),
        Err(payload) => Err(ServerError::TaskPanicked {
            id: task.id(),
            owner: task.owner().clone(),
            message: panic_message(&*payload),
        }),
    }
}

fn report(result: Result<(), ServerError>, counters: &HeartbeatCounters) {
    match result {
        Ok(()) => {}
        Err(e @ ServerError::TaskPanicked { .. }) => {
            counters.task_panics.fetch_add(1, Ordering::Relaxed);
            error!("❌ {}", e);
        }
        Err(e) => {
            counters.task_failures.fetch_add(1, Ordering::Relaxed);
            warn!("⚠️ {}", e);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::sync::Mutex;
    use tick_scheduler::TaskOwner;

    fn heartbeat(workers: usize) -> (Arc<Scheduler>, Heartbeat) {
        let clock = Arc::new(TickCounter::new());
        let scheduler = Arc::new(Scheduler::new(clock.clone()));
        let config = ServerConfig {
            ticks_per_second: 100.0,
            async_workers: workers,
            starting_tick: 0,
        };
        let heartbeat = Heartbeat::new(scheduler.clone(), clock, &config).expect("heartbeat should build");
        (scheduler, heartbeat)
    }

    #[test]
    fn test_sync_tasks_run_in_registration_order_on_tick_thread() {
        let (scheduler, heartbeat) = heartbeat(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let order = order.clone();
            scheduler.run_task_later(
                "p",
                move || {
                    let name = thread::current().name().map(str::to_string);
                    order.lock().expect("order lock").push((label, name));
                    Ok(())
                },
                2,
            );
        }

        assert_eq!(heartbeat.tick_once(), 1);
        assert!(order.lock().expect("order lock").is_empty());
        assert_eq!(heartbeat.tick_once(), 2);

        let order = order.lock().expect("order lock");
        let labels: Vec<&str> = order.iter().map(|(label, _)| *label).collect();
        assert_eq!(labels, vec!["first", "second", "third"]);
        let this_thread = thread::current().name().map(str::to_string);
        assert!(order.iter().all(|(_, name)| *name == this_thread));
        assert_eq!(heartbeat.stats().sync_executed, 3);
    }

    #[test]
    fn test_async_tasks_run_on_worker_pool() {
        let (scheduler, heartbeat) = heartbeat(2);
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);

        scheduler.run_task_async("p", move || {
            let name = thread::current().name().unwrap_or_default().to_string();
            tx.lock().expect("sender lock").send(name)?;
            Ok(())
        });

        heartbeat.tick_once();
        let worker = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("async task should run");
        assert!(worker.starts_with("async-worker-"), "ran on {}", worker);
        assert_eq!(heartbeat.stats().async_dispatched, 1);
    }

    #[test]
    fn test_failures_and_panics_do_not_stop_the_tick() {
        let (scheduler, heartbeat) = heartbeat(1);
        let ran_after = Arc::new(AtomicUsize::new(0));

        scheduler.run_task("p", || anyhow::bail!("plugin error"));
        scheduler.run_task("p", || panic!("plugin bug"));
        let counter = ran_after.clone();
        scheduler.run_task("p", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        heartbeat.tick_once();

        assert_eq!(ran_after.load(Ordering::SeqCst), 1);
        let stats = heartbeat.stats();
        assert_eq!(stats.task_failures, 1);
        assert_eq!(stats.task_panics, 1);
        assert_eq!(stats.sync_executed, 3);
    }

    #[test]
    fn test_failing_periodic_task_stays_registered() {
        let (scheduler, heartbeat) = heartbeat(1);
        let id = scheduler.run_task_timer("p", || anyhow::bail!("always fails"), 1, 1);

        for _ in 0..3 {
            heartbeat.tick_once();
        }
        assert!(scheduler.is_pending(id));
        assert_eq!(heartbeat.stats().task_failures, 3);
    }

    #[test]
    fn test_execute_reports_owner_and_id() {
        let (scheduler, _heartbeat) = heartbeat(1);
        scheduler.run_task("chat", || anyhow::bail!("bad message"));
        let task = scheduler.collect(1).sync_tasks.remove(0);

        match execute(&task) {
            Err(ServerError::TaskFailed { id, owner, message }) => {
                assert_eq!(id, task.id());
                assert_eq!(owner, TaskOwner::new("chat"));
                assert_eq!(message, "bad message");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_spawned_heartbeat_advances_and_stops() {
        let (scheduler, heartbeat) = heartbeat(1);
        let heartbeat = Arc::new(heartbeat);
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);

        scheduler.run_task_later(
            "p",
            move || {
                let name = thread::current().name().unwrap_or_default().to_string();
                tx.lock().expect("sender lock").send(name)?;
                Ok(())
            },
            3,
        );

        let handle = Arc::clone(&heartbeat).spawn().expect("heartbeat should spawn");
        assert!(handle.is_running());
        let ran_on = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("task should fire once the heartbeat reaches tick 3");
        assert_eq!(ran_on, "heartbeat");

        handle.stop().expect("heartbeat should stop cleanly");
        let ticks = heartbeat.stats().ticks;
        assert!(ticks >= 3);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(heartbeat.stats().ticks, ticks);
    }
}
