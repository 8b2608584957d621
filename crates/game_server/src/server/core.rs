//! Core game server implementation.
//!
//! `GameServer` owns the simulation clock, the task scheduler and the
//! heartbeat that drives both. Plugins never see the heartbeat; they hold an
//! [`OwnerScheduler`] obtained from [`GameServer::for_plugin`] and register
//! their work through it.

use crate::{
    config::ServerConfig,
    error::ServerError,
    heartbeat::{Heartbeat, HeartbeatHandle, HeartbeatStats},
};
use parking_lot::Mutex;
use std::sync::Arc;
use tick_scheduler::{OwnerScheduler, Scheduler, SchedulerStats, TaskOwner, TickCounter};
use tracing::{info, warn};

/// The core game server structure.
///
/// # Lifecycle
///
/// 1. [`GameServer::new`] validates the configuration and builds the clock,
///    scheduler and async worker pool. Tasks may be registered right away.
/// 2. [`GameServer::start`] spawns the `heartbeat` thread.
/// 3. [`GameServer::shutdown`] stops the heartbeat after its current tick
///    and waits for the thread to exit.
pub struct GameServer {
    /// Server configuration settings
    config: ServerConfig,

    /// The simulation clock, advanced only by the heartbeat
    clock: Arc<TickCounter>,

    /// Task registry shared with plugins
    scheduler: Arc<Scheduler>,

    /// The tick loop and its worker pool
    heartbeat: Arc<Heartbeat>,

    /// Handle of the running heartbeat thread, if started
    running: Mutex<Option<HeartbeatHandle>>,
}

impl GameServer {
    /// Creates a new game server with the specified configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] for an invalid configuration and
    /// [`ServerError::Worker`] if the async worker pool cannot be built.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let clock = Arc::new(TickCounter::starting_at(config.starting_tick));
        let scheduler = Arc::new(Scheduler::new(clock.clone()));
        let heartbeat = Arc::new(Heartbeat::new(scheduler.clone(), clock.clone(), &config)?);

        Ok(Self {
            config,
            clock,
            scheduler,
            heartbeat,
            running: Mutex::new(None),
        })
    }

    /// Starts the heartbeat thread.
    ///
    /// Starting a server that is already running is a no-op.
    pub fn start(&self) -> Result<(), ServerError> {
        let mut running = self.running.lock();
        if running.is_some() {
            warn!("⚠️ Game server already running; ignoring start request");
            return Ok(());
        }

        info!(
            "🚀 Starting game server at tick {} ({} TPS, {} async worker(s))",
            self.scheduler.current_tick(),
            self.config.ticks_per_second,
            self.config.async_workers
        );
        *running = Some(Arc::clone(&self.heartbeat).spawn()?);
        Ok(())
    }

    /// Stops the heartbeat and waits for its thread to exit.
    ///
    /// Async tasks already handed to the worker pool are not awaited.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        let Some(handle) = self.running.lock().take() else {
            return Ok(());
        };

        info!("🛑 Shutting down game server...");
        tokio::task::spawn_blocking(move || handle.stop())
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to join heartbeat: {e}")))??;

        let stats = self.scheduler.stats();
        info!(
            "✅ Game server stopped at tick {} with {} task(s) still pending",
            stats.current_tick, stats.pending_tasks
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(HeartbeatHandle::is_running)
    }

    /// Cancels every pending task registered by `owner`.
    ///
    /// Called when a plugin is unloaded. Returns how many tasks were
    /// cancelled; none of them will fire afterwards.
    pub fn unload_owner(&self, owner: &TaskOwner) -> usize {
        let cancelled = self.scheduler.cancel_tasks_for_owner(owner);
        info!("🔌 Unloaded {}: cancelled {} pending task(s)", owner, cancelled);
        cancelled
    }

    /// Returns a scheduler view bound to the named plugin.
    pub fn for_plugin(&self, name: &str) -> OwnerScheduler {
        self.scheduler.for_owner(name)
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        self.scheduler.clone()
    }

    pub fn clock(&self) -> Arc<TickCounter> {
        self.clock.clone()
    }

    /// Gets the heartbeat, mainly for driving ticks by hand in tests.
    pub fn heartbeat(&self) -> Arc<Heartbeat> {
        self.heartbeat.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn heartbeat_stats(&self) -> HeartbeatStats {
        self.heartbeat.stats()
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }
}

impl std::fmt::Debug for GameServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameServer")
            .field("config", &self.config)
            .field("current_tick", &self.scheduler.current_tick())
            .field("running", &self.is_running())
            .finish()
    }
}
