//! App monitor daemon
//!
//! Watches monitor nodes and scheduled instances, and keeps the number of
//! instances of each monitored application at its declared count.

use appmon_daemon::{
    DaemonConfig, DaemonError, DaemonResult, Leadership, MemoryStore, RunLoop,
    StoreInstanceController,
};
use appmon_types::{MonitorName, MonitorSpec};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// App monitor daemon CLI
#[derive(Parser)]
#[command(name = "appmond")]
#[command(about = "Keeps scheduled instance counts at their monitor targets", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "APPMON_CONFIG")]
    config: Option<String>,

    /// Run without taking the election lock
    #[arg(long, env = "APPMON_NO_LOCK")]
    no_lock: bool,

    /// Log level
    #[arg(long, env = "APPMON_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "APPMON_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if cli.no_lock {
        config.leadership.no_lock = true;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    config.validate()?;

    let store = seed_store(&config)?;
    let controller = StoreInstanceController::new(store.clone(), config.store.clone())
        .with_unknown(config.development.unknown.iter().map(MonitorName::new));

    let leadership = config.leadership.mode();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        monitors = %config.store.monitors,
        scheduled = %config.store.scheduled,
        lock = matches!(leadership, Leadership::Elect),
        "Starting app monitor"
    );

    RunLoop::new(
        Arc::new(store),
        Arc::new(controller),
        config.store.clone(),
        config.reconciler.clone(),
        leadership,
    )
    .run_until(shutdown_signal())
    .await
}

/// Build the in-process store with its containers and configured monitors
fn seed_store(config: &DaemonConfig) -> DaemonResult<MemoryStore> {
    let store = MemoryStore::new();
    store.ensure_path(&config.store.scheduled)?;
    store.ensure_path(&config.store.monitors)?;

    for (name, count) in &config.development.monitors {
        store.create(
            &config.store.monitor(name),
            MonitorSpec::new(*count).to_payload(),
        )?;
    }

    Ok(store)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
