//! Configuration for modelhub-deploy.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{HubError, HubResult};

const ENV_PREFIX: &str = "MODELHUB_";

/// Top-level configuration for the deployment service.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct HubConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Caller authentication.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Simulated provisioning behaviour.
    #[serde(default)]
    pub provisioning: ProvisioningConfig,

    /// Background health monitor.
    #[serde(default)]
    pub health: HealthConfig,

    /// Event log paging.
    #[serde(default)]
    pub logs: LogsConfig,
}

impl HubConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `modelhub.toml` in the current directory (if present)
    /// 3. Environment variables with `MODELHUB_` prefix
    pub fn load() -> HubResult<Self> {
        Self::from_file("modelhub.toml")
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> HubResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| HubError::Config(e.to_string()))
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8000)
}

const fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_database_url() -> String {
    "postgres://localhost/modelhub".to_owned()
}

const fn default_max_connections() -> u32 {
    10
}

const fn default_min_connections() -> u32 {
    1
}

const fn default_connect_timeout_secs() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Bearer token validation.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret shared with the token issuer.
    #[serde(default = "default_auth_secret")]
    pub secret: String,

    /// Required `iss` claim, if any.
    #[serde(default)]
    pub issuer: Option<String>,
}

fn default_auth_secret() -> String {
    "your-secret-key-here".to_owned()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: default_auth_secret(),
            issuer: None,
        }
    }
}

/// Simulated provisioning behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningConfig {
    /// Simulated container build and rollout time in milliseconds.
    #[serde(default = "default_container_delay_ms")]
    pub container_delay_ms: u64,

    /// Simulated serverless function deploy time in milliseconds.
    #[serde(default = "default_serverless_delay_ms")]
    pub serverless_delay_ms: u64,

    /// Simulated dedicated endpoint deploy time in milliseconds.
    #[serde(default = "default_endpoint_delay_ms")]
    pub endpoint_delay_ms: u64,

    /// Domain that endpoint URLs are built on.
    #[serde(default = "default_base_domain")]
    pub base_domain: String,
}

const fn default_container_delay_ms() -> u64 {
    2000
}

const fn default_serverless_delay_ms() -> u64 {
    1000
}

const fn default_endpoint_delay_ms() -> u64 {
    3000
}

fn default_base_domain() -> String {
    "modelhub.com".to_owned()
}

impl ProvisioningConfig {
    /// Config with every delay set to `delay`, for tests and local runs.
    #[must_use]
    pub fn uniform(delay: Duration) -> Self {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Self {
            container_delay_ms: ms,
            serverless_delay_ms: ms,
            endpoint_delay_ms: ms,
            base_domain: default_base_domain(),
        }
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            container_delay_ms: default_container_delay_ms(),
            serverless_delay_ms: default_serverless_delay_ms(),
            endpoint_delay_ms: default_endpoint_delay_ms(),
            base_domain: default_base_domain(),
        }
    }
}

/// Background health monitor.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Whether the monitor runs.
    #[serde(default = "default_health_enabled")]
    pub enabled: bool,

    /// Seconds between sweeps.
    #[serde(default = "default_health_interval_secs")]
    pub interval_secs: u64,
}

const fn default_health_enabled() -> bool {
    true
}

const fn default_health_interval_secs() -> u64 {
    30
}

impl HealthConfig {
    /// Sweep interval, never shorter than one second.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        if self.interval_secs == 0 {
            Duration::from_secs(1)
        } else {
            Duration::from_secs(self.interval_secs)
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_health_enabled(),
            interval_secs: default_health_interval_secs(),
        }
    }
}

/// Event log paging.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LogsConfig {
    /// Events returned when no limit is given.
    #[serde(default = "default_logs_limit")]
    pub default_limit: u32,

    /// Largest accepted limit.
    #[serde(default = "default_logs_max_limit")]
    pub max_limit: u32,
}

const fn default_logs_limit() -> u32 {
    100
}

const fn default_logs_max_limit() -> u32 {
    1000
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            default_limit: default_logs_limit(),
            max_limit: default_logs_max_limit(),
        }
    }
}
