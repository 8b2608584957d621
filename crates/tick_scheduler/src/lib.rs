//! # Tick Scheduler
//!
//! Tick-synchronized task scheduling for the game server main loop.
//!
//! Plugins hand the scheduler small units of work to run once, after a
//! delay, or periodically, measured in simulation ticks. Work is either
//! *sync* (run in-line on the tick thread) or *async* (handed to a worker
//! pool). Once per tick the main loop calls [`Scheduler::collect`] and gets
//! back exactly the work due at that tick:
//!
//! ```rust
//! use std::sync::Arc;
//! use tick_scheduler::{Scheduler, TickCounter, TickSource};
//!
//! let clock = Arc::new(TickCounter::new());
//! let scheduler = Scheduler::new(clock.clone());
//!
//! let id = scheduler.run_task_timer("weather", || Ok(()), 5, 20);
//!
//! for _ in 0..5 {
//!     let tick = clock.advance();
//!     let due = scheduler.collect(tick);
//!     for task in &due.sync_tasks {
//!         task.run().ok();
//!     }
//! }
//! assert_eq!(scheduler.due_tick_of(id), Some(25));
//! # assert_eq!(clock.current_tick(), 5);
//! ```
//!
//! ## Guarantees
//!
//! * A task is never collected before its due tick, and delays below one
//!   tick are treated as one tick.
//! * Within one `collect` call, sync and async tasks each keep registration
//!   order.
//! * Cancellation suppresses the next not-yet-collected firing only; a
//!   cancelled periodic task is not re-armed.
//! * Registry updates are serialized through a single lock, so registration
//!   and cancellation from any thread never observe a half-applied collect.
//!
//! Failures raised by task work are never caught here; executing tasks and
//! deciding what a failure means is the main loop's job.

pub mod clock;
pub mod id;
pub mod registry;
pub mod scheduler;
pub mod stats;
pub mod task;

pub use clock::{TickCounter, TickSource};
pub use id::{IdAllocator, TaskId};
pub use registry::TaskRegistry;
pub use scheduler::{OwnerScheduler, Scheduler};
pub use stats::SchedulerStats;
pub use task::{DueTasks, ScheduledTask, Task, TaskMode, TaskOwner};
