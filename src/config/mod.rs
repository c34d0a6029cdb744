//! Configuration module for the waiver backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::merge::UnresolvedPolicy;

/// A configuration variable that is present but malformed.
#[derive(Debug)]
pub struct ConfigError {
    pub var: &'static str,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}: {}", self.var, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key guarding the HTTP API
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// What to do with placeholders that have no override and no default
    pub unresolved_policy: UnresolvedPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("WAIVER_API_PSK").ok().filter(|k| !k.is_empty());

        let db_path = env::var("WAIVER_DB_PATH")
            .unwrap_or_else(|_| "./data/waivers.sqlite".to_string())
            .into();

        let bind_addr = env::var("WAIVER_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|e| ConfigError {
                var: "WAIVER_BIND_ADDR",
                message: format!("{}", e),
            })?;

        let log_level = env::var("WAIVER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let unresolved_policy = match env::var("WAIVER_UNRESOLVED_MERGE_FIELDS") {
            Ok(raw) => UnresolvedPolicy::parse(&raw).ok_or_else(|| ConfigError {
                var: "WAIVER_UNRESOLVED_MERGE_FIELDS",
                message: format!("expected verbatim, blank or reject, got {:?}", raw),
            })?,
            Err(_) => UnresolvedPolicy::default(),
        };

        Ok(Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            unresolved_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Both cases share one test so they never race on the process environment.
    #[test]
    fn test_config_from_env() {
        env::remove_var("WAIVER_API_PSK");
        env::remove_var("WAIVER_DB_PATH");
        env::remove_var("WAIVER_BIND_ADDR");
        env::remove_var("WAIVER_LOG_LEVEL");
        env::remove_var("WAIVER_UNRESOLVED_MERGE_FIELDS");

        let config = Config::from_env().unwrap();

        assert!(config.api_psk.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/waivers.sqlite"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.unresolved_policy, UnresolvedPolicy::LeaveVerbatim);

        env::set_var("WAIVER_UNRESOLVED_MERGE_FIELDS", "shout");
        let err = Config::from_env().unwrap_err();
        assert_eq!(err.var, "WAIVER_UNRESOLVED_MERGE_FIELDS");

        env::set_var("WAIVER_UNRESOLVED_MERGE_FIELDS", "reject");
        let config = Config::from_env().unwrap();
        assert_eq!(config.unresolved_policy, UnresolvedPolicy::Reject);

        env::remove_var("WAIVER_UNRESOLVED_MERGE_FIELDS");
    }
}
