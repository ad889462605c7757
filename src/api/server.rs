//! API server using Axum

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use tokio::sync::watch;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::ApiServerConfig;
use crate::error::{Result, SubswitchError};
use crate::proxy::Controller;

use super::routes;

/// Upper bound on handling a single API request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(controller: Arc<Controller>) -> Self {
        Self {
            controller,
            started_at: Instant::now(),
        }
    }
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, controller: Arc<Controller>) -> Self {
        Self {
            config,
            state: AppState::new(controller),
        }
    }

    /// Build the router
    pub fn build_router(&self) -> Router {
        routes::create_router(self.state.clone())
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| {
                SubswitchError::InvalidConfig(format!(
                    "invalid API address {}:{}: {}",
                    self.config.host, self.config.port, e
                ))
            })?;

        let router = self.build_router();
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("API server listening on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| SubswitchError::Internal(e.to_string()))?;

        info!("API server shut down");
        Ok(())
    }
}
