use crate::error::{Result, SubswitchError};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default end-to-end verification target
pub const DEFAULT_CHECK_URL: &str = "https://www.google.com";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Subscription source configuration
    pub subscription: SubscriptionConfig,
    /// URL fetched through the engine to verify a server
    pub check_url: String,
    /// Re-trigger/status API configuration
    pub api: ApiServerConfig,
    /// Proxy engine configuration
    pub engine: EngineConfig,
    /// Timers and blacklist lifetime
    pub schedule: ScheduleConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Subscription URL (required)
    pub url: String,
    /// Optional forwarding proxy used only for fetching the subscription
    pub forward_proxy: Option<ForwardProxyConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardProxyProtocol {
    Http,
    Https,
    Socks5,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardProxyConfig {
    pub protocol: ForwardProxyProtocol,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ForwardProxyConfig {
    /// Render as a proxy URL understood by the HTTP client
    pub fn proxy_url(&self) -> String {
        let scheme = match self.protocol {
            ForwardProxyProtocol::Http => "http",
            ForwardProxyProtocol::Https => "https",
            // Resolve names on the proxy side.
            ForwardProxyProtocol::Socks5 => "socks5h",
        };

        let auth = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!(
                "{}:{}@",
                urlencoding::encode(user),
                urlencoding::encode(pass)
            ),
            (Some(user), None) => format!("{}@", urlencoding::encode(user)),
            _ => String::new(),
        };

        format!(
            "{}://{}{}",
            scheme,
            auth,
            format_authority(&self.host, self.port)
        )
    }
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port for the API server (default: 8080)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Engine executable (default: clash)
    pub binary: PathBuf,
    /// Engine data directory, passed as `-d` (default: /root/.config/clash)
    pub data_dir: PathBuf,
    /// GeoIP database copied into the data directory when missing there
    pub mmdb_source: PathBuf,
    /// Port of the engine's local HTTP proxy listener (default: 7890)
    pub proxy_port: u16,
    /// Control API address (default: 127.0.0.1:9090)
    pub controller: String,
    /// Optional control API secret
    pub secret: Option<String>,
    /// How long to wait for the control API after (re)starting the engine
    pub startup_timeout: Duration,
    /// Pause after selecting the upstream before traffic is assumed to flow
    pub settle_delay: Duration,
}

impl EngineConfig {
    /// Location of the engine's declarative configuration
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.yaml")
    }

    /// Base URL of the control API
    pub fn controller_url(&self) -> String {
        format!("http://{}", self.controller)
    }

    /// Proxy URL of the engine's local listener
    pub fn proxy_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.proxy_port)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("clash"),
            data_dir: PathBuf::from("/root/.config/clash"),
            mmdb_source: PathBuf::from("./Country.mmdb"),
            proxy_port: 7890,
            controller: "127.0.0.1:9090".to_string(),
            secret: None,
            startup_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Interval between scheduled full refreshes (default: 1 day)
    pub refresh_interval: Duration,
    /// Delay before retrying after a failed cycle (default: 60s)
    pub retry_interval: Duration,
    /// Interval between health checks of the active server (default: 30 min)
    pub monitor_interval: Duration,
    /// How long a failed server stays blacklisted (default: 1 hour)
    pub blacklist_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl LogConfig {
    /// Load logging configuration; never fails so tracing can start first
    pub fn from_env() -> Self {
        Self {
            level: get_env_or("LOG_LEVEL", "info"),
            format: get_env_or("LOG_FORMAT", "pretty"),
        }
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            subscription: SubscriptionConfig {
                url: parse_subscription_url()?,
                forward_proxy: parse_forward_proxy()?,
            },
            check_url: parse_check_url()?,
            api: ApiServerConfig {
                port: parse_port("API_PORT", "8080")?,
                host: get_env_or("API_HOST", "0.0.0.0"),
            },
            engine: EngineConfig {
                binary: PathBuf::from(get_env_or("ENGINE_BIN", "clash")),
                data_dir: PathBuf::from(get_env_or("ENGINE_DIR", "/root/.config/clash")),
                mmdb_source: PathBuf::from(get_env_or("ENGINE_MMDB", "./Country.mmdb")),
                proxy_port: parse_port("ENGINE_PROXY_PORT", "7890")?,
                controller: get_env_or("ENGINE_CONTROLLER", "127.0.0.1:9090"),
                secret: env::var("ENGINE_SECRET").ok().filter(|s| !s.is_empty()),
                ..EngineConfig::default()
            },
            schedule: ScheduleConfig {
                refresh_interval: parse_secs("REFRESH_INTERVAL_SECS", "86400")?,
                retry_interval: parse_secs("RETRY_INTERVAL_SECS", "60")?,
                monitor_interval: parse_secs("MONITOR_INTERVAL_SECS", "1800")?,
                blacklist_ttl: parse_secs("BLACKLIST_TTL_SECS", "3600")?,
            },
            log: LogConfig::from_env(),
        })
    }

    /// Get the API server address
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

fn parse_subscription_url() -> Result<String> {
    let raw = env::var("SUB_URL").unwrap_or_default();
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SubswitchError::MissingEnvVar("SUB_URL".into()));
    }

    let url = Url::parse(raw)
        .map_err(|e| SubswitchError::InvalidConfig(format!("SUB_URL must be a valid URL: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SubswitchError::InvalidConfig(format!(
            "SUB_URL has unsupported scheme: {}",
            url.scheme()
        )));
    }

    Ok(raw.to_string())
}

fn parse_check_url() -> Result<String> {
    let raw = get_env_or("CHECK_URL", DEFAULT_CHECK_URL);
    Url::parse(raw.trim()).map_err(|e| {
        SubswitchError::InvalidConfig(format!("CHECK_URL must be a valid URL: {}", e))
    })?;
    Ok(raw.trim().to_string())
}

fn parse_forward_proxy() -> Result<Option<ForwardProxyConfig>> {
    let raw = env::var("SUB_PROXY").unwrap_or_default();
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let url = Url::parse(raw).map_err(|e| {
        SubswitchError::InvalidConfig(format!("SUB_PROXY must be a valid URL: {}", e))
    })?;

    if url.fragment().is_some() || url.query().is_some() {
        return Err(SubswitchError::InvalidConfig(
            "SUB_PROXY must not include query/fragment".into(),
        ));
    }
    if !(url.path().is_empty() || url.path() == "/") {
        return Err(SubswitchError::InvalidConfig(
            "SUB_PROXY must not include a path".into(),
        ));
    }

    let protocol = match url.scheme().to_lowercase().as_str() {
        "http" => ForwardProxyProtocol::Http,
        "https" => ForwardProxyProtocol::Https,
        "socks5" | "socks5h" => ForwardProxyProtocol::Socks5,
        other => {
            return Err(SubswitchError::InvalidConfig(format!(
                "SUB_PROXY has unsupported scheme: {}",
                other
            )))
        }
    };

    let host = url
        .host_str()
        .ok_or_else(|| SubswitchError::InvalidConfig("SUB_PROXY must include a host".into()))?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    let port = match url.port() {
        Some(p) => p,
        None => match protocol {
            ForwardProxyProtocol::Http => 80,
            ForwardProxyProtocol::Https => 443,
            ForwardProxyProtocol::Socks5 => 1080,
        },
    };

    let username = if url.username().is_empty() {
        None
    } else {
        Some(decode_userinfo(url.username()))
    };
    let password = match (&username, url.password()) {
        (None, _) => None,
        (Some(_), Some(p)) => Some(decode_userinfo(p)),
        (Some(_), None) => None,
    };

    Ok(Some(ForwardProxyConfig {
        protocol,
        host: host.to_string(),
        port,
        username,
        password,
    }))
}

fn decode_userinfo(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn parse_port(key: &str, default: &str) -> Result<u16> {
    get_env_or(key, default)
        .parse()
        .map_err(|_| SubswitchError::InvalidConfig(format!("{} must be a valid port number", key)))
}

/// Upper bound for any interval or TTL setting (10 years)
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn parse_secs(key: &str, default: &str) -> Result<Duration> {
    let secs: u64 = get_env_or(key, default).parse().map_err(|_| {
        SubswitchError::InvalidConfig(format!("{} must be a number of seconds", key))
    })?;
    if secs == 0 {
        return Err(SubswitchError::InvalidConfig(format!(
            "{} must be greater than zero",
            key
        )));
    }
    if secs > MAX_DURATION_SECS {
        return Err(SubswitchError::InvalidConfig(format!(
            "{} must be at most {} seconds",
            key, MAX_DURATION_SECS
        )));
    }
    Ok(Duration::from_secs(secs))
}

fn format_authority(host: &str, port: u16) -> String {
    if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
