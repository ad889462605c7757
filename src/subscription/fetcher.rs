//! HTTP subscription fetcher

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::SubscriptionSource;
use crate::config::SubscriptionConfig;
use crate::error::{Result, SubswitchError};

/// Request timeout for the subscription download
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Redirect hops followed before giving up
const MAX_REDIRECTS: usize = 20;

/// Downloads the subscription payload over HTTP(S)
pub struct HttpSubscription {
    url: String,
    client: reqwest::Client,
}

impl HttpSubscription {
    pub fn new(config: &SubscriptionConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS));

        builder = match &config.forward_proxy {
            Some(forward) => {
                let proxy = reqwest::Proxy::all(forward.proxy_url()).map_err(|e| {
                    SubswitchError::InvalidConfig(format!("SUB_PROXY rejected: {}", e))
                })?;
                builder.proxy(proxy)
            }
            // Only SUB_PROXY may route the fetch; ignore ambient proxy variables.
            None => builder.no_proxy(),
        };

        Ok(Self {
            url: config.url.clone(),
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl SubscriptionSource for HttpSubscription {
    #[instrument(skip(self))]
    async fn fetch(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| SubswitchError::SubscriptionFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubswitchError::SubscriptionFetch(format!(
                "subscription responded with {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SubswitchError::SubscriptionFetch(e.to_string()))?;

        debug!("Fetched subscription payload ({} bytes)", body.len());
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ForwardProxyConfig, ForwardProxyProtocol};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 2048];
            let _ = stream.read(&mut buf).await.unwrap();
            let response = format!(
                "{}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        });

        format!("http://{}/sub", addr)
    }

    #[tokio::test]
    async fn fetch_returns_body() {
        let url = serve_once("HTTP/1.1 200 OK", "c3M6Ly9hYmM=").await;
        let source = HttpSubscription::new(&SubscriptionConfig {
            url,
            forward_proxy: None,
        })
        .unwrap();

        assert_eq!(source.fetch().await.unwrap(), "c3M6Ly9hYmM=");
    }

    #[tokio::test]
    async fn fetch_rejects_error_status() {
        let url = serve_once("HTTP/1.1 503 Service Unavailable", "").await;
        let source = HttpSubscription::new(&SubscriptionConfig {
            url,
            forward_proxy: None,
        })
        .unwrap();

        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, SubswitchError::SubscriptionFetch(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn fetch_reports_unreachable_source() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = HttpSubscription::new(&SubscriptionConfig {
            url: format!("http://{}/sub", addr),
            forward_proxy: None,
        })
        .unwrap();

        assert!(matches!(
            source.fetch().await,
            Err(SubswitchError::SubscriptionFetch(_))
        ));
    }

    #[test]
    fn accepts_forward_proxy() {
        let config = SubscriptionConfig {
            url: "https://sub.example/".to_string(),
            forward_proxy: Some(ForwardProxyConfig {
                protocol: ForwardProxyProtocol::Http,
                host: "127.0.0.1".to_string(),
                port: 3128,
                username: None,
                password: None,
            }),
        };
        assert!(HttpSubscription::new(&config).is_ok());
    }
}
