//! Main application entry point for the tick server
//!
//! Loads configuration, installs logging, starts the heartbeat and reports
//! scheduler health until a shutdown signal arrives.

mod cli;
mod config;
mod logging;
mod signals;

use cli::CliArgs;
use config::AppConfig;
use game_server::GameServer;
use logging::setup_logging;
use signals::wait_for_shutdown;
use std::sync::Arc;
use tracing::{error, info};

/// Owner name of the server's own housekeeping tasks.
const SERVER_OWNER: &str = "tick_server";

/// Main application struct
pub struct Application {
    config: AppConfig,
    server: Arc<GameServer>,
}

impl Application {
    /// Loads and validates configuration, sets up logging and builds the server.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        // Load configuration first (before logging setup)
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        config.apply_cli_overrides(&args);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {}", e).into());
        }

        setup_logging(&config.logging)?;
        display_banner();

        let server = Arc::new(GameServer::new(config.to_server_config())?);
        info!("📂 Config: {}", args.config_path.display());

        Ok(Self { config, server })
    }

    /// Runs the heartbeat until a shutdown signal is received.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("📋 Configuration Summary:");
        info!("  🕒 Tick rate: {} TPS", self.config.server.ticks_per_second);
        info!("  🔢 Starting tick: {}", self.config.server.starting_tick);
        info!("  ⚙️ Async workers: {}", self.config.scheduler.async_workers);

        let status_interval = self.config.server.status_interval_ticks;
        if status_interval > 0 {
            register_status_report(&self.server, status_interval);
            info!("🔍 Health monitoring active - status every {} ticks", status_interval);
        }

        self.server.start()?;
        info!("✅ Tick Server is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        let signal = wait_for_shutdown().await?;

        info!(
            "🛑 {} received at tick {}, stopping the heartbeat...",
            signal,
            self.server.scheduler().current_tick()
        );
        self.server.unload_owner(&SERVER_OWNER.into());
        self.server.shutdown().await?;

        let stats = self.server.heartbeat_stats();
        info!("📊 Final Statistics:");
        info!("  - Ticks run: {}", stats.ticks);
        info!("  - Sync tasks executed: {}", stats.sync_executed);
        info!("  - Async tasks dispatched: {}", stats.async_dispatched);
        info!(
            "  - Task failures: {} ({} panics)",
            stats.task_failures + stats.task_panics,
            stats.task_panics
        );
        info!("  - Late heartbeats: {}", stats.overruns);
        info!("👋 Tick Server shutdown complete");

        Ok(())
    }
}

/// Registers a sync timer that logs scheduler and heartbeat health.
fn register_status_report(server: &Arc<GameServer>, interval: u64) {
    let period = i64::try_from(interval).unwrap_or(i64::MAX);
    // Weak so the task stored in the scheduler does not keep the server alive.
    let reporter = Arc::downgrade(server);

    server.for_plugin(SERVER_OWNER).run_task_timer(
        move || {
            let Some(server) = reporter.upgrade() else {
                return Ok(());
            };
            let scheduler = server.scheduler_stats();
            let heartbeat = server.heartbeat_stats();
            info!(
                "📊 System Health - tick {} | {} pending ({} cancelled) in {} buckets | {} fired | {} failed | {} late",
                scheduler.current_tick,
                scheduler.pending_tasks,
                scheduler.cancelled_pending,
                scheduler.tick_buckets,
                scheduler.total_fired,
                heartbeat.task_failures + heartbeat.task_panics,
                heartbeat.overruns
            );
            Ok(())
        },
        period,
        period,
    );
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to start application: {:?}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Display startup banner using proper logging
fn display_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("╔══════════════════════════════════════════╗");
    info!("║            🕒 TICK SERVER 🕒             ║");
    info!("║                 v{:<24}║", version);
    info!("║                                          ║");
    info!("║  Tick-Synchronized Task Scheduling       ║");
    info!("║  Sync tasks on the heartbeat thread      ║");
    info!("║  Async tasks on the worker pool          ║");
    info!("╚══════════════════════════════════════════╝");
}
