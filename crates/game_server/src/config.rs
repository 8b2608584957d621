//! Server configuration types and defaults.
//!
//! This module contains the runtime configuration consumed by
//! [`GameServer`](crate::GameServer) and its heartbeat.

use crate::error::ServerError;
use std::time::Duration;

/// Highest tick rate the heartbeat accepts.
pub const MAX_TICKS_PER_SECOND: f64 = 1000.0;

/// Configuration structure for the game server.
///
/// Controls how fast the simulation clock advances and how many worker
/// threads execute async tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Heartbeats per second of wall-clock time
    pub ticks_per_second: f64,

    /// Number of worker threads that run async tasks
    pub async_workers: usize,

    /// Value of the tick counter before the first heartbeat
    pub starting_tick: u64,
}

impl ServerConfig {
    /// Wall-clock time between two heartbeats.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.ticks_per_second)
    }

    /// Checks the configuration for values the heartbeat cannot run with.
    pub fn validate(&self) -> Result<(), ServerError> {
        if !self.ticks_per_second.is_finite()
            || self.ticks_per_second <= 0.0
            || self.ticks_per_second > MAX_TICKS_PER_SECOND
        {
            return Err(ServerError::Config(format!(
                "ticks_per_second must be in (0, {MAX_TICKS_PER_SECOND}], got {}",
                self.ticks_per_second
            )));
        }

        if self.async_workers == 0 {
            return Err(ServerError::Config(
                "async_workers must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: 20.0,
            async_workers: num_cpus::get().max(1),
            starting_tick: 0,
        }
    }
}
