//! Main entry point for the queue-keeper daemon
//!
//! Loads configuration, connects to the matchmaker over AMQP and mirrors the
//! matchmaker's view of every online player's queue until a shutdown signal
//! arrives.

use anyhow::Result;
use clap::Parser;
use queue_keeper::config::{validate_config, AppConfig};
use queue_keeper::service::{AppState, QueueKeeperService};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// queue-keeper - player-facing queue sessions for a remote matchmaker
#[derive(Parser)]
#[command(
    name = "queue-keeper",
    version,
    about = "Keeps per-player queue sessions in sync with a remote matchmaker",
    long_about = "queue-keeper consumes matchmaker events from an AMQP topic exchange, caches the \
                 tickets and pending matches that concern its online players, and keeps a queue \
                 session with reminders and a countdown for each of them."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    #[arg(long, value_name = "URL", help = "Override AMQP connection URL")]
    amqp_url: Option<String>,

    #[arg(long, value_name = "PORT", help = "Override HTTP server port")]
    http_port: Option<u16>,

    /// Game mode definitions
    #[arg(long, value_name = "FILE", help = "Path to game mode definitions (TOML)")]
    game_modes: Option<PathBuf>,

    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Run without a broker
    #[arg(
        long,
        help = "Run with an in-memory matchmaker; events are accepted on POST /events"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

fn display_startup_banner(config: &AppConfig, dry_run: bool) {
    info!("🚀 queue-keeper {}", queue_keeper::VERSION);
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   HTTP port: {}", config.service.http_port);
    if dry_run {
        info!("   AMQP: disabled (dry run)");
    } else {
        info!("   AMQP: {}", config.amqp.url);
        info!("   Events exchange: {}", config.amqp.events_exchange);
        info!("   RPC queue: {}", config.amqp.rpc_queue);
    }
    match &config.sessions.game_modes_path {
        Some(path) => info!("   Game modes: {}", path.display()),
        None => info!("   Game modes: none configured"),
    }
    info!(
        "   Reminders every {}s, countdown {}s",
        config.sessions.reminder_interval_seconds, config.sessions.countdown_seconds
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load configuration and apply CLI overrides
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(amqp_url) = &args.amqp_url {
        config.amqp.url = amqp_url.clone();
    }

    if let Some(http_port) = args.http_port {
        config.service.http_port = http_port;
    }

    if let Some(game_modes) = &args.game_modes {
        config.sessions.game_modes_path = Some(game_modes.clone());
    }

    validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    display_startup_banner(&config, args.dry_run);

    info!("Initializing service components...");
    let app_state = match AppState::new(config.clone(), args.dry_run).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    let mut service = QueueKeeperService::new(app_state);
    if let Err(e) = service.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("✅ queue-keeper is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("🛑 Shutdown signal received, beginning graceful shutdown...");

    match tokio::time::timeout(config.shutdown_timeout(), service.shutdown()).await {
        Ok(Ok(())) => info!("✅ Graceful shutdown completed successfully"),
        Ok(Err(e)) => error!("Shutdown failed: {}", e),
        Err(_) => warn!("⚠️  Shutdown timeout exceeded, forcing exit"),
    }

    info!("🛑 queue-keeper stopped");
    Ok(())
}
