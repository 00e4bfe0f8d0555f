//! Configuration loading and representation.
//!
//! Everything comes from environment variables; [`ServerConfig::from_lookup`]
//! takes any lookup function so tests do not touch the process environment.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use routeforge_auth::StaticTokenResolver;
use routeforge_observability::LogFormat;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MODULES_DIR: &str = "modules";
pub const DEFAULT_FIRST_PARTY_VENDOR: &str = "routeforge";
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {var}='{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub modules_dir: PathBuf,
    /// Vendor whose modules are mounted without a vendor prefix.
    pub first_party_vendor: String,
    /// Postgres when set; in-memory storage otherwise.
    pub database_url: Option<String>,
    pub body_limit_bytes: usize,
    pub tokens: StaticTokenResolver,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            modules_dir: PathBuf::from(DEFAULT_MODULES_DIR),
            first_party_vendor: DEFAULT_FIRST_PARTY_VENDOR.to_string(),
            database_url: None,
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
            tokens: StaticTokenResolver::new(),
            log_format: LogFormat::Json,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let bind_raw = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse::<SocketAddr>()
            .map_err(|e| invalid("BIND_ADDR", &bind_raw, e))?;

        let body_limit_bytes = match get("BODY_LIMIT_BYTES") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|e| invalid("BODY_LIMIT_BYTES", &raw, e))?,
            None => DEFAULT_BODY_LIMIT_BYTES,
        };

        let tokens = match get("API_TOKENS") {
            // The token table is secret; keep it out of the error.
            Some(raw) => StaticTokenResolver::parse(&raw).map_err(|_| {
                invalid("API_TOKENS", "<redacted>", "expected token=principal[:role|role],...")
            })?,
            None => StaticTokenResolver::new(),
        };

        let log_format = match get("LOG_FORMAT") {
            Some(raw) => raw
                .parse::<LogFormat>()
                .map_err(|e| invalid("LOG_FORMAT", &raw, e))?,
            None => LogFormat::Json,
        };

        Ok(Self {
            bind_addr,
            modules_dir: PathBuf::from(
                get("MODULES_DIR").unwrap_or_else(|| DEFAULT_MODULES_DIR.to_string()),
            ),
            first_party_vendor: get("FIRST_PARTY_VENDOR")
                .unwrap_or_else(|| DEFAULT_FIRST_PARTY_VENDOR.to_string()),
            database_url: get("DATABASE_URL"),
            body_limit_bytes,
            tokens,
            log_format,
        })
    }
}

fn invalid(var: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.modules_dir, PathBuf::from("modules"));
        assert_eq!(config.first_party_vendor, "routeforge");
        assert_eq!(config.database_url, None);
        assert_eq!(config.body_limit_bytes, DEFAULT_BODY_LIMIT_BYTES);
        assert!(config.tokens.is_empty());
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn reads_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("MODULES_DIR", "/srv/modules"),
            ("FIRST_PARTY_VENDOR", "acme"),
            ("DATABASE_URL", "postgres://localhost/routeforge"),
            ("BODY_LIMIT_BYTES", "1024"),
            ("API_TOKENS", "t1=alice:admin,t2=bob"),
            ("LOG_FORMAT", "pretty"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.first_party_vendor, "acme");
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/routeforge"));
        assert_eq!(config.body_limit_bytes, 1024);
        assert_eq!(config.tokens.len(), 2);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[("DATABASE_URL", "  ")])).unwrap();
        assert_eq!(config.database_url, None);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = ServerConfig::from_lookup(lookup(&[("BODY_LIMIT_BYTES", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "BODY_LIMIT_BYTES", .. }));

        let err = ServerConfig::from_lookup(lookup(&[("API_TOKENS", "nonsense")])).unwrap_err();
        assert!(!err.to_string().contains("nonsense"));

        assert!(ServerConfig::from_lookup(lookup(&[("BIND_ADDR", "nowhere")])).is_err());
    }
}
