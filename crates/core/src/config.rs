//! Configuration types shared across crates.

use crate::error::{Error, Result};
use crate::target::{Scheme, split_host_port, split_scheme};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Registry store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RegistryConfig {
    /// SQLite database. `:memory:` gives a throwaway in-process registry.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Maximum connections in the pool (always 1 for `:memory:`).
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

fn default_max_connections() -> u32 {
    // SQLite allows one writer; a single connection avoids "database is locked".
    1
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/registry.db"),
            max_connections: default_max_connections(),
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Self::Sqlite {
                max_connections, ..
            } if *max_connections == 0 => {
                Err("registry.max_connections must be at least 1".to_string())
            }
            Self::Sqlite { .. } => Ok(()),
        }
    }
}

/// Credential-indirection proxy configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// URL of this server's proxy endpoint as the scraper reaches it.
    #[serde(default = "default_proxy_address")]
    pub address: String,
    /// Upstream request timeout in seconds.
    #[serde(default = "default_proxy_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_proxy_address() -> String {
    "http://127.0.0.1:8080/v1/proxy".to_string()
}

fn default_proxy_timeout_secs() -> u64 {
    30
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            address: default_proxy_address(),
            timeout_secs: default_proxy_timeout_secs(),
        }
    }
}

/// Normalized proxy location, as advertised in discovery responses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub scheme: Scheme,
    /// Always `host:port`.
    pub host: String,
    /// Always starts with `/`.
    pub path: String,
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Parse `address` into scheme, `host:port` and path.
    ///
    /// A missing scheme means http, a missing port means the scheme default
    /// and a missing path means `/`. An empty address means `localhost`.
    pub fn endpoint(&self) -> Result<ProxyEndpoint> {
        let raw = match self.address.trim() {
            "" => "localhost",
            other => other,
        };
        let (scheme, rest) = split_scheme(raw)?;
        let scheme = scheme.unwrap_or_default();

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], rest[idx..].to_string()),
            None => (rest, "/".to_string()),
        };
        if authority.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "proxy.address '{}' has no host",
                self.address
            )));
        }

        let host = match split_host_port(authority) {
            Some((host, port)) => {
                let port: u16 = port.parse().map_err(|_| {
                    Error::InvalidConfig(format!("proxy.address port '{port}' is out of range"))
                })?;
                if port == 0 {
                    return Err(Error::InvalidConfig(
                        "proxy.address port must not be 0".to_string(),
                    ));
                }
                format!("{host}:{port}")
            }
            None if authority.contains(':') => {
                return Err(Error::InvalidConfig(format!(
                    "proxy.address '{}' has a malformed host:port",
                    self.address
                )));
            }
            None => format!("{authority}:{}", scheme.default_port()),
        };

        Ok(ProxyEndpoint { scheme, host, path })
    }
}

/// Management API authentication.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// SHA256 hex of the management bearer token (64 characters).
    /// Generate with: `echo -n "your-secret-token" | sha256sum`
    /// When unset the management routes are open.
    #[serde(default)]
    pub token_hash: Option<String>,
}

impl AdminConfig {
    /// **For testing only.** SHA256 of "test-admin-token".
    pub fn for_testing() -> Self {
        Self {
            token_hash: Some(
                "17d6bfe05d1b1fb7bc499f8e3f639c7b3eda4c40f321eef8887a0c04c89a99c5".to_string(),
            ),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        match self.token_hash.as_deref() {
            None => Ok(()),
            Some(hash) if hash.len() == 64 && hash.bytes().all(|b| b.is_ascii_hexdigit()) => {
                Ok(())
            }
            Some(_) => Err("admin.token_hash must be 64 hex characters (SHA256)".to_string()),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

impl AppConfig {
    /// **For testing only.** In-memory registry and open management routes.
    pub fn for_testing() -> Self {
        Self {
            registry: RegistryConfig::Sqlite {
                path: PathBuf::from(":memory:"),
                max_connections: 1,
            },
            ..Self::default()
        }
    }

    /// Reject configurations the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        self.registry.validate().map_err(Error::InvalidConfig)?;
        self.admin.validate().map_err(Error::InvalidConfig)?;
        if self.proxy.timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "proxy.timeout_secs must be greater than 0".to_string(),
            ));
        }
        self.proxy.endpoint()?;
        Ok(())
    }
}
