//! Connectivity probes
//!
//! `probe_endpoint` checks that a candidate accepts TCP connections before it
//! is activated. `probe_through_active_proxy` checks that the engine actually
//! tunnels traffic once a candidate is active. Neither ever returns an error.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::error::{Result, SubswitchError};

/// Timeout for the bare TCP reachability check
pub const ENDPOINT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Timeout for the request routed through the engine
pub const TUNNEL_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait Prober: Send + Sync {
    /// Whether `host:port` accepts a TCP connection
    async fn probe_endpoint(&self, host: &str, port: &str) -> bool;

    /// Whether `target_url` answers when requested through the engine
    async fn probe_through_active_proxy(&self, target_url: &str) -> bool;
}

/// Prober backed by real sockets and the engine's local HTTP listener
pub struct ConnectivityProber {
    tunnel_client: reqwest::Client,
    endpoint_timeout: Duration,
}

impl ConnectivityProber {
    pub fn new(engine_proxy_url: &str) -> Result<Self> {
        let proxy = reqwest::Proxy::all(engine_proxy_url).map_err(|e| {
            SubswitchError::InvalidConfig(format!("invalid engine proxy URL: {}", e))
        })?;

        // No pooling: a restarted engine must never be probed over a stale socket.
        let tunnel_client = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(TUNNEL_PROBE_TIMEOUT)
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self {
            tunnel_client,
            endpoint_timeout: ENDPOINT_PROBE_TIMEOUT,
        })
    }

    async fn fetch_status(&self, target_url: &str) -> anyhow::Result<reqwest::StatusCode> {
        let response = self.tunnel_client.get(target_url).send().await?;
        Ok(response.status())
    }
}

#[async_trait]
impl Prober for ConnectivityProber {
    #[instrument(skip(self))]
    async fn probe_endpoint(&self, host: &str, port: &str) -> bool {
        let Ok(port) = port.parse::<u16>() else {
            debug!("Endpoint {}:{} has an invalid port", host, port);
            return false;
        };

        match timeout(self.endpoint_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => {
                debug!("Endpoint {}:{} is reachable", host, port);
                true
            }
            Ok(Err(e)) => {
                debug!("Endpoint {}:{} is unreachable: {}", host, port, e);
                false
            }
            Err(_) => {
                debug!("Endpoint {}:{} timed out", host, port);
                false
            }
        }
    }

    #[instrument(skip(self))]
    async fn probe_through_active_proxy(&self, target_url: &str) -> bool {
        match self.fetch_status(target_url).await {
            Ok(status) if status.as_u16() >= 200 => {
                debug!("Tunnel check got {} from {}", status, target_url);
                true
            }
            Ok(status) => {
                warn!("Tunnel check got unexpected {} from {}", status, target_url);
                false
            }
            Err(e) => {
                warn!("Tunnel check to {} failed: {}", target_url, e);
                false
            }
        }
    }
}
