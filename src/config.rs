use crate::error::{AppError, Result};
use crate::tools::toolset::{Credentials, ToolSetConfig};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Service configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
    /// JSON file of compiled tool definitions to serve.
    pub tools_path: Option<PathBuf>,
    pub credentials: Option<Credentials>,
    pub account_id: Option<String>,
    pub base_url: Option<String>,
    /// Similarity-search endpoint. Without it search is always local.
    pub discovery_url: Option<String>,
    pub rpc_url: Option<String>,
    pub discovery_timeout_ms: u64,
    pub http_timeout_ms: u64,
    pub fallback_to_local: bool,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// `TOOLMESH_ACCESS_TOKEN` takes precedence over `TOOLMESH_API_KEY` when
    /// both are set.
    pub fn from_env() -> Result<Self> {
        let credentials = match (var("TOOLMESH_ACCESS_TOKEN"), var("TOOLMESH_API_KEY")) {
            (Some(token), _) => Some(Credentials::Bearer { token }),
            (None, Some(api_key)) => Some(Credentials::Basic { api_key }),
            (None, None) => None,
        };

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse("PORT", 8080)?,
            shutdown_timeout_secs: parse("SHUTDOWN_TIMEOUT", 30)?,
            tools_path: var("TOOLS_PATH").map(PathBuf::from),
            credentials,
            account_id: var("TOOLMESH_ACCOUNT_ID"),
            base_url: var("TOOLMESH_BASE_URL"),
            discovery_url: var("DISCOVERY_URL"),
            rpc_url: var("RPC_URL"),
            discovery_timeout_ms: parse("DISCOVERY_TIMEOUT_MS", 10_000)?,
            http_timeout_ms: parse("HTTP_TIMEOUT_MS", 60_000)?,
            fallback_to_local: parse_bool("FALLBACK_TO_LOCAL", true)?,
        })
    }

    pub fn toolset_config(&self) -> ToolSetConfig {
        ToolSetConfig {
            credentials: self.credentials.clone(),
            account_id: self.account_id.clone(),
            base_url: self.base_url.clone(),
            rpc_endpoint: self.rpc_url.clone(),
            discovery_url: self.discovery_url.clone(),
            discovery_timeout: Duration::from_millis(self.discovery_timeout_ms),
            http_timeout: Duration::from_millis(self.http_timeout_ms),
            fallback_to_local: self.fallback_to_local,
            ..ToolSetConfig::default()
        }
    }
}

/// Unset and blank variables are treated alike.
fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{}='{}': {}", name, raw, e))),
        None => Ok(default),
    }
}

fn parse_bool(name: &str, default: bool) -> Result<bool> {
    match var(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(AppError::Config(format!("{}='{}' is not a boolean", name, v))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Distinct variable names per test: the process environment is shared
    // across test threads.
    #[test]
    fn test_parse_uses_default_when_unset() {
        assert_eq!(parse("TOOLMESH_TEST_UNSET_PORT", 8080u16).unwrap(), 8080);
    }

    #[test]
    fn test_parse_rejects_invalid_number() {
        env::set_var("TOOLMESH_TEST_BAD_PORT", "eighty");
        assert!(matches!(
            parse::<u16>("TOOLMESH_TEST_BAD_PORT", 8080),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_parse_bool_variants() {
        env::set_var("TOOLMESH_TEST_FLAG_OFF", "Off");
        assert!(!parse_bool("TOOLMESH_TEST_FLAG_OFF", true).unwrap());
        env::set_var("TOOLMESH_TEST_FLAG_BAD", "maybe");
        assert!(parse_bool("TOOLMESH_TEST_FLAG_BAD", true).is_err());
        assert!(parse_bool("TOOLMESH_TEST_FLAG_UNSET", true).unwrap());
    }

    #[test]
    fn test_toolset_config_carries_timeouts() {
        let config = Config {
            host: "127.0.0.1".into(),
            port: 0,
            shutdown_timeout_secs: 1,
            tools_path: None,
            credentials: Some(Credentials::Basic {
                api_key: "k".into(),
            }),
            account_id: Some("acc".into()),
            base_url: None,
            discovery_url: None,
            rpc_url: None,
            discovery_timeout_ms: 250,
            http_timeout_ms: 1_000,
            fallback_to_local: false,
        };
        let toolset = config.toolset_config();
        assert_eq!(toolset.discovery_timeout, Duration::from_millis(250));
        assert!(!toolset.fallback_to_local);
        assert!(toolset.validate().is_ok());
    }
}
