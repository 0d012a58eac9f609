use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SERVICE_NAME: &str = "LocalDrop";
pub const DEFAULT_SERVICE_TYPE: &str = "_http._tcp.local.";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub discovery: DiscoveryConfig,
    /// Directory receiving uploaded files
    pub storage_dir: PathBuf,
    /// Maximum request body size in bytes
    pub max_upload_size: u64,
    /// Files offered to peers at startup
    pub share_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_host: IpAddr,
    pub port: u16,
    /// Upper bound on handling a single request, body included
    pub request_timeout: Duration,
    /// Address announced to peers instead of the detected one
    pub advertise_ip: Option<IpAddr>,
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    /// mDNS instance name
    pub service_name: String,
    pub service_type: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            request_timeout: Duration::from_secs(120),
            advertise_ip: None,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            service_type: DEFAULT_SERVICE_TYPE.to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            discovery: DiscoveryConfig::default(),
            storage_dir: PathBuf::from("./received"),
            max_upload_size: 50 * 1024 * 1024, // 50MB
            share_paths: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(|name| std::env::var(name).ok())
    }

    /// Load configuration from `lookup`, which maps a variable name to its
    /// value when set.
    pub fn load_from<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let bind_host = parse_var(&lookup, "BIND_HOST", "an IP address")?
            .unwrap_or(defaults.server.bind_host);
        let port = parse_var(&lookup, "PORT", "a valid port")?.unwrap_or(DEFAULT_PORT);
        let request_timeout = parse_var(&lookup, "REQUEST_TIMEOUT_SECS", "a number of seconds")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.server.request_timeout);
        let advertise_ip = parse_var(&lookup, "ADVERTISE_IP", "an IP address")?;

        let storage_dir = lookup("STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage_dir);

        let max_upload_size = parse_var(&lookup, "MAX_UPLOAD_SIZE", "a size in bytes")?
            .unwrap_or(defaults.max_upload_size);

        let discovery_enabled = lookup("DISCOVERY_ENABLED")
            .map(|v| !(v == "false" || v == "0"))
            .unwrap_or(true);

        let service_name =
            lookup("SERVICE_NAME").unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());

        let share_paths: Vec<PathBuf> = lookup("SHARE_PATHS")
            .map(|p| {
                p.split(',')
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();

        let config = Config {
            server: ServerConfig {
                bind_host,
                port,
                request_timeout,
                advertise_ip,
            },
            discovery: DiscoveryConfig {
                enabled: discovery_enabled,
                service_name,
                ..defaults.discovery
            },
            storage_dir,
            max_upload_size,
            share_paths,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "REQUEST_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.discovery.enabled && self.discovery.service_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "SERVICE_NAME cannot be empty when discovery is enabled".to_string(),
            ));
        }

        if self.server.port == 0 {
            tracing::warn!("PORT is 0, the listener will use an ephemeral port");
        }

        Ok(())
    }

    /// Socket address the listener binds to.
    pub fn bind_address(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.server.bind_host, self.server.port)
    }
}

/// Parse an optional variable, rejecting values that do not parse.
fn parse_var<F, T>(lookup: &F, name: &str, expected: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(name)
        .map(|value| {
            value.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("{name} '{value}' is not {expected}"))
            })
        })
        .transpose()
}
