//! Main entry point for the scrimmage matchmaking service
//!
//! Loads configuration, initializes logging, runs the service until a
//! shutdown signal arrives and then shuts it down within the configured
//! timeout.

use anyhow::Result;
use clap::Parser;
use scrimmage::config::{validate_config, AppConfig};
use scrimmage::service::{AppState, HealthCheck, HealthStatus};
use std::path::PathBuf;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// Scrimmage - queues, balanced teams and ratings for community game nights
#[derive(Parser)]
#[command(
    name = "scrimmage",
    version,
    about = "Queue-to-match lifecycle service for community game nights",
    long_about = "Scrimmage keeps per-channel matchmaking queues, balances full queues into two \
                 teams, walks an organizer through review, map choice and outcome reporting, \
                 and keeps per-game ratings and match history. The chat front end talks to it \
                 over AMQP."
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

    /// Perform health check and exit
    #[arg(long, help = "Perform a health check and exit with status code")]
    health_check: bool,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// AMQP URL override
    #[arg(long, value_name = "URL", help = "Override AMQP connection URL")]
    amqp_url: Option<String>,

    /// Metrics port override
    #[arg(long, value_name = "PORT", help = "Override metrics and health server port")]
    metrics_port: Option<u16>,

    /// Queue state file override
    #[arg(
        long,
        value_name = "FILE",
        help = "Persist queue membership to this JSON file"
    )]
    queue_state: Option<PathBuf>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Run without a broker
    #[arg(
        long,
        help = "Run without connecting to AMQP; outbound events are only logged"
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

    if let Some(metrics_port) = args.metrics_port {
        config.service.health_port = metrics_port;
    }

    if let Some(queue_state) = &args.queue_state {
        config.matchmaking.queue_state_path = Some(queue_state.clone());
    }

    validate_config(&config)?;
    Ok(config)
}

/// Build the service, check it once and report
async fn perform_health_check(config: AppConfig, dry_run: bool) -> Result<()> {
    info!("Performing health check...");

    let mut app_state = if dry_run {
        AppState::without_broker(config).await?
    } else {
        AppState::new(config).await?
    };
    app_state.start().await?;

    let result = HealthCheck::check(&app_state.monitor()).await;
    app_state.shutdown().await?;

    match result {
        Ok(health) => {
            println!("Health Check: {}", health.status);
            for check in &health.checks {
                match &check.message {
                    Some(message) => println!("  {}: {} ({})", check.name, check.status, message),
                    None => println!("  {}: {}", check.name, check.status),
                }
            }
            println!("  Queues: {}", health.stats.queues);
            println!("  Players Waiting: {}", health.stats.players_waiting);

            if health.status == HealthStatus::Unhealthy {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            std::process::exit(1);
        }
    }
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
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
    info!("Scrimmage matchmaking service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Health port: {}", config.service.health_port);
    if dry_run {
        info!("   AMQP: disabled (dry run)");
    } else {
        info!("   AMQP: {}", config.amqp.url);
    }
    info!("   Games: {}", config.games.len());
    for queue in &config.queues {
        info!(
            "   Queue {}: {} ({} players)",
            queue.channel_id, queue.title, queue.capacity
        );
    }
    match &config.matchmaking.queue_state_path {
        Some(path) => info!("   Queue state: {}", path.display()),
        None => info!("   Queue state: in memory"),
    }
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

    if args.health_check {
        return perform_health_check(config, args.dry_run).await;
    }

    display_startup_banner(&config, args.dry_run);

    let app_state = if args.dry_run {
        AppState::without_broker(config.clone()).await
    } else {
        AppState::new(config.clone()).await
    };
    let mut app_state = match app_state {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("Scrimmage is running, press Ctrl+C to shut down");
    wait_for_shutdown_signal().await;
    info!("Shutdown signal received, beginning graceful shutdown...");

    match tokio::time::timeout(config.shutdown_timeout(), app_state.shutdown()).await {
        Ok(Ok(())) => info!("Graceful shutdown completed"),
        Ok(Err(e)) => error!("Shutdown failed: {}", e),
        Err(_) => warn!(
            "Shutdown timeout of {:?} exceeded, forcing exit",
            config.shutdown_timeout()
        ),
    }

    // Let the last log lines flush
    tokio::time::sleep(Duration::from_millis(50)).await;
    info!("Scrimmage stopped");
    Ok(())
}
