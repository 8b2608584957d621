//! Configuration management for the tick server.
//!
//! This module handles loading, validation, and conversion of server
//! configuration from TOML files and command-line arguments.

use crate::cli::CliArgs;
use game_server::ServerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Log levels accepted by `[logging] level`.
pub const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn default_ticks_per_second() -> f64 {
    20.0
}

fn default_status_interval_ticks() -> u64 {
    1200 // one minute at 20 TPS
}

fn default_async_workers() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Clock settings
    #[serde(default)]
    pub server: ServerSettings,
    /// Task execution settings
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Clock and reporting settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Heartbeats per second
    #[serde(default = "default_ticks_per_second")]
    pub ticks_per_second: f64,
    /// Tick counter value before the first heartbeat
    #[serde(default)]
    pub starting_tick: u64,
    /// Ticks between two status reports (0 to disable)
    #[serde(default = "default_status_interval_ticks")]
    pub status_interval_ticks: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            ticks_per_second: default_ticks_per_second(),
            starting_tick: 0,
            status_interval_ticks: default_status_interval_ticks(),
        }
    }
}

/// Task execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Worker threads that run async tasks
    #[serde(default = "default_async_workers")]
    pub async_workers: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            async_workers: default_async_workers(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at
    /// the specified path and returns the default configuration.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command-line overrides on top of the file settings.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(tps) = args.ticks_per_second {
            self.server.ticks_per_second = tps;
        }
        if let Some(workers) = args.async_workers {
            self.scheduler.async_workers = workers;
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
    }

    /// Converts the application configuration to a game server configuration.
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            ticks_per_second: self.server.ticks_per_second,
            async_workers: self.scheduler.async_workers,
            starting_tick: self.server.starting_tick,
        }
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// Returns an error string describing the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        self.to_server_config()
            .validate()
            .map_err(|e| e.to_string())?;

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {VALID_LOG_LEVELS:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
