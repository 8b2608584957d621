//! # Game Server - Tick Runtime
//!
//! The runtime half of the tick scheduler: it owns the simulation clock and
//! the heartbeat thread that advances it, and executes the work the
//! [`tick_scheduler`] hands back each tick.
//!
//! ## Heartbeat
//!
//! Every heartbeat advances the clock by exactly one tick, asks the
//! scheduler for the tasks due at that tick, runs the sync tasks in-line in
//! registration order and hands the async tasks to a pool of worker threads.
//! The heartbeat runs on a thread named `heartbeat` and the workers on
//! threads named `async-worker-N`, so log lines show which side ran a task.
//!
//! ## Plugin Integration
//!
//! Plugins receive an owner-bound scheduler view and register their work
//! through it:
//!
//! ```no_run
//! use game_server::{GameServer, ServerConfig};
//!
//! # fn main() -> Result<(), game_server::ServerError> {
//! let server = GameServer::new(ServerConfig::default())?;
//! let combat = server.for_plugin("combat");
//! combat.run_task_timer(|| {
//!     // regenerate health
//!     Ok(())
//! }, 20, 20);
//! server.start()?;
//! # Ok(())
//! # }
//! ```
//!
//! When a plugin is unloaded, [`GameServer::unload_owner`] cancels all of
//! its pending tasks.
//!
//! ## Error Handling
//!
//! A task that returns an error or panics is logged and counted in
//! [`HeartbeatStats`]; the heartbeat keeps going and the task's
//! registration is untouched. [`ServerError`] covers configuration and
//! startup failures.

pub use config::ServerConfig;
pub use error::ServerError;
pub use heartbeat::{Heartbeat, HeartbeatHandle, HeartbeatStats};
pub use server::GameServer;

pub mod config;
pub mod error;
pub mod heartbeat;
pub mod server;
