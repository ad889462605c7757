//! Subswitch - Entry Point
//!
//! Starts the refresh service, health monitor and API server with graceful
//! shutdown support.

use std::process::ExitCode;
use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use subswitch::api::ApiServer;
use subswitch::config::{Config, LogConfig};
use subswitch::engine::{ClashEngine, EngineAdapter};
use subswitch::proxy::{
    ConnectivityProber, Controller, ControllerPolicy, HealthMonitor, HealthMonitorConfig,
    HealthMonitorHandle,
};
use subswitch::services::{RefreshConfig, RefreshHandle, RefreshService};
use subswitch::subscription::HttpSubscription;

/// Exit status for configuration errors
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing(&LogConfig::from_env());

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_fatal() => {
            error!("Configuration error: {}", e);
            ExitCode::from(EXIT_CONFIG)
        }
        Err(e) => {
            error!("Subswitch failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> subswitch::Result<()> {
    info!("Starting Subswitch");

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");

    let source = Arc::new(HttpSubscription::new(&config.subscription)?);
    let prober = Arc::new(ConnectivityProber::new(&config.engine.proxy_url())?);
    let engine = Arc::new(ClashEngine::new(config.engine.clone())?);

    let policy = ControllerPolicy {
        blacklist_ttl: config.schedule.blacklist_ttl,
        ..ControllerPolicy::default()
    };
    let controller = Arc::new(Controller::new(
        source,
        prober,
        engine.clone(),
        config.check_url.clone(),
        policy,
    ));

    // Start refresh service (runs the startup cycle)
    let (refresh_handle, refresh_shutdown) = RefreshHandle::new();
    let refresh_service = RefreshService::new(
        controller.clone(),
        RefreshConfig {
            refresh_interval: config.schedule.refresh_interval,
            retry_interval: config.schedule.retry_interval,
        },
    );
    let refresh_task = tokio::spawn(async move {
        refresh_service.run(refresh_shutdown).await;
    });

    // Start health monitor
    let (health_handle, health_shutdown) = HealthMonitorHandle::new();
    let health_monitor = HealthMonitor::new(
        controller.clone(),
        HealthMonitorConfig {
            check_interval: config.schedule.monitor_interval,
        },
    );
    let health_task = tokio::spawn(async move {
        health_monitor.run(health_shutdown).await;
    });

    // Start API server
    let (api_shutdown_tx, api_shutdown) = tokio::sync::watch::channel(false);
    let api_server = ApiServer::new(config.api.clone(), controller.clone());
    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run(api_shutdown).await {
            error!("API server error: {}", e);
        }
    });

    info!("Services started - API: {}", config.api_addr());

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    refresh_handle.shutdown();
    health_handle.shutdown();
    let _ = api_shutdown_tx.send(true);

    let _ = tokio::join!(refresh_task, health_task, api_task);

    engine.shutdown().await;

    info!("Subswitch stopped");
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("subswitch={},tower_http=info", log.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if log.is_json() {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
