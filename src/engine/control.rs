//! Engine control API client

use std::time::Duration;

use serde_json::json;
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument};

use crate::error::{Result, SubswitchError};

/// Per-request timeout for control calls
const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between readiness polls
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Proxy group switched in global mode
const GLOBAL_GROUP: &str = "GLOBAL";

pub struct ControlClient {
    base_url: String,
    secret: Option<String>,
    client: reqwest::Client,
}

impl ControlClient {
    pub fn new(base_url: impl Into<String>, secret: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CONTROL_TIMEOUT)
            .no_proxy()
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret,
            client,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.secret {
            Some(secret) => request.bearer_auth(secret),
            None => request,
        }
    }

    /// Poll the control API until it answers, or fail after `timeout`
    #[instrument(skip(self))]
    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.request(reqwest::Method::GET, "/version").send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!("Engine control API is ready");
                    return Ok(());
                }
                Ok(resp) => debug!("Engine control API answered {}", resp.status()),
                Err(e) => debug!("Engine control API not ready: {}", e),
            }

            if Instant::now() + READY_POLL_INTERVAL > deadline {
                return Err(SubswitchError::EngineUnavailable(format!(
                    "control API at {} not ready after {}s",
                    self.base_url,
                    timeout.as_secs()
                )));
            }
            sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Make `name` the active upstream of the global group
    #[instrument(skip(self))]
    pub async fn select_proxy(&self, name: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::PUT, &format!("/proxies/{}", GLOBAL_GROUP))
            .json(&json!({ "name": name }))
            .send()
            .await
            .map_err(|e| {
                SubswitchError::EngineUnavailable(format!("control request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SubswitchError::EngineControl {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
