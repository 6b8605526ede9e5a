//! Server Configuration
//!
//! Loaded from environment variables with development defaults. Parsing goes
//! through a lookup function so it can be exercised without touching the
//! process environment.

use herald_core::{ConfigError, UserId, DEFAULT_CACHE_TTL_SECS};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Which snapshot cache backend to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackendKind {
    Memory,
    Lmdb { path: PathBuf, max_size_mb: usize },
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Bind host.
    pub bind_host: String,

    /// Bind port.
    pub port: u16,

    /// Snapshot cache TTL.
    pub cache_ttl: Duration,

    /// Snapshot cache backend.
    pub cache_backend: CacheBackendKind,

    /// Allowed CORS origins. Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Users that receive fan-out ("send to all") notifications.
    pub recipients: Vec<UserId>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 5000,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            cache_backend: CacheBackendKind::Memory,
            cors_origins: Vec::new(),
            recipients: Vec::new(),
        }
    }
}

fn invalid(field: &str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn comma_list(value: Option<String>) -> Vec<String> {
    value
        .map(|s| {
            s.split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

impl ServerConfig {
    /// Create ServerConfig from environment variables.
    ///
    /// Environment variables:
    /// - `HERALD_API_BIND`: Bind host (default: 0.0.0.0)
    /// - `PORT` / `HERALD_API_PORT`: Bind port (default: 5000)
    /// - `HERALD_CACHE_TTL_SECS`: Snapshot cache TTL, must be > 0 (default: 3600)
    /// - `HERALD_CACHE_BACKEND`: `memory` or `lmdb` (default: memory)
    /// - `HERALD_CACHE_PATH`: LMDB directory (default: ./data/cache)
    /// - `HERALD_CACHE_MAX_SIZE_MB`: LMDB map size (default: 64)
    /// - `HERALD_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `HERALD_RECIPIENTS`: Comma-separated user ids for fan-out notifications
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_host = lookup("HERALD_API_BIND").unwrap_or(defaults.bind_host);

        let port = match lookup("PORT").or_else(|| lookup("HERALD_API_PORT")) {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| invalid("PORT", &raw, "must be a port number"))?,
            None => defaults.port,
        };

        let cache_ttl = match lookup("HERALD_CACHE_TTL_SECS") {
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|_| {
                    invalid("HERALD_CACHE_TTL_SECS", &raw, "must be a whole number of seconds")
                })?;
                Duration::from_secs(secs)
            }
            None => defaults.cache_ttl,
        };

        let cache_backend = match lookup("HERALD_CACHE_BACKEND").as_deref() {
            None | Some("memory") => CacheBackendKind::Memory,
            Some("lmdb") => {
                let path = lookup("HERALD_CACHE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./data/cache"));
                let max_size_mb = match lookup("HERALD_CACHE_MAX_SIZE_MB") {
                    Some(raw) => raw.parse::<usize>().map_err(|_| {
                        invalid("HERALD_CACHE_MAX_SIZE_MB", &raw, "must be a whole number")
                    })?,
                    None => 64,
                };
                CacheBackendKind::Lmdb { path, max_size_mb }
            }
            Some(other) => {
                return Err(invalid(
                    "HERALD_CACHE_BACKEND",
                    other,
                    "expected 'memory' or 'lmdb'",
                ))
            }
        };

        let cors_origins = comma_list(lookup("HERALD_CORS_ORIGINS"));

        let recipients = comma_list(lookup("HERALD_RECIPIENTS"))
            .into_iter()
            .map(|raw| {
                raw.parse::<UserId>()
                    .map_err(|e| invalid("HERALD_RECIPIENTS", &raw, e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let config = Self {
            bind_host,
            port,
            cache_ttl,
            cache_backend,
            cors_origins,
            recipients,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_ttl.is_zero() {
            return Err(invalid("HERALD_CACHE_TTL_SECS", "0", "must be > 0"));
        }
        if let CacheBackendKind::Lmdb { max_size_mb, .. } = &self.cache_backend {
            if *max_size_mb == 0 {
                return Err(invalid("HERALD_CACHE_MAX_SIZE_MB", "0", "must be > 0"));
            }
        }
        if self.bind_host.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "HERALD_API_BIND".to_string(),
            });
        }
        Ok(())
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| invalid("HERALD_API_BIND", &addr, e.to_string()))
    }
}
