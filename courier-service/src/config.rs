//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence
//! (highest to lowest):
//! 1. Environment variables (prefix: COURIER_)
//! 2. Current working directory: ./courier.toml
//! 3. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,

    /// Proxy executor limits
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Script sandbox limits
    #[serde(default)]
    pub script: ScriptConfig,

    /// Collection runner limits
    #[serde(default)]
    pub runner: RunnerConfig,

    /// History recording limits
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Limits applied by the HTTP proxy executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Lower clamp for the per-request timeout in milliseconds
    #[serde(default = "default_min_timeout_ms")]
    pub min_timeout_ms: u64,

    /// Timeout applied when the caller does not supply one
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Upper clamp for the per-request timeout in milliseconds
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,

    /// Maximum redirect hops followed before returning the last 3xx
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Response body capture cap in bytes
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,

    /// User-Agent appended when the caller did not set one
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Limits applied by the script sandbox
///
/// The two timeouts are deliberately distinct: pre-request scripts run before
/// any wire time is spent and get the shorter budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Wall-clock budget for pre-request scripts in milliseconds
    #[serde(default = "default_pre_request_timeout_ms")]
    pub pre_request_timeout_ms: u64,

    /// Wall-clock budget for post-response scripts in milliseconds
    #[serde(default = "default_post_response_timeout_ms")]
    pub post_response_timeout_ms: u64,

    /// Operation budget per script evaluation
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,
}

/// Limits applied by the collection runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Maximum iterations per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Maximum inter-request delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Age in seconds after which a persisted RUNNING run with no live
    /// registry entry is considered orphaned by the startup sweep
    #[serde(default = "default_orphan_threshold_secs")]
    pub orphan_threshold_secs: u64,
}

/// Limits applied by the history recorder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Cap on request/response bodies stored in a history entry, in bytes
    #[serde(default = "default_max_stored_body_bytes")]
    pub max_stored_body_bytes: usize,
}

fn default_service_name() -> String {
    "courier".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_min_timeout_ms() -> u64 {
    1_000
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_timeout_ms() -> u64 {
    300_000
}

fn default_max_redirects() -> usize {
    10
}

fn default_max_response_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_user_agent() -> String {
    "CodeOps-Courier/1.0".to_string()
}

fn default_pre_request_timeout_ms() -> u64 {
    5_000
}

fn default_post_response_timeout_ms() -> u64 {
    10_000
}

fn default_max_operations() -> u64 {
    1_000_000
}

fn default_max_iterations() -> u32 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_orphan_threshold_secs() -> u64 {
    3_600
}

fn default_max_stored_body_bytes() -> usize {
    1024 * 1024
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            port: default_port(),
            log_level: default_log_level(),
            environment: default_environment(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            min_timeout_ms: default_min_timeout_ms(),
            default_timeout_ms: default_timeout_ms(),
            max_timeout_ms: default_max_timeout_ms(),
            max_redirects: default_max_redirects(),
            max_response_bytes: default_max_response_bytes(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            pre_request_timeout_ms: default_pre_request_timeout_ms(),
            post_response_timeout_ms: default_post_response_timeout_ms(),
            max_operations: default_max_operations(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_delay_ms: default_max_delay_ms(),
            orphan_threshold_secs: default_orphan_threshold_secs(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_stored_body_bytes: default_max_stored_body_bytes(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            proxy: ProxyConfig::default(),
            script: ScriptConfig::default(),
            runner: RunnerConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Clamp a caller-supplied timeout into the configured window
    pub fn clamp_timeout(&self, requested_ms: Option<u64>) -> Duration {
        let ms = requested_ms
            .unwrap_or(self.default_timeout_ms)
            .clamp(self.min_timeout_ms, self.max_timeout_ms);
        Duration::from_millis(ms)
    }
}

impl Config {
    /// Load configuration from ./courier.toml and the environment
    pub fn load() -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("courier.toml"))
            .merge(Env::prefixed("COURIER_").split("_"))
            .extract()?;

        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// Bypasses the working-directory convention. Useful for testing or
    /// non-standard deployments.
    pub fn load_from(path: &str) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("COURIER_").split("_"))
            .extract()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_limits() {
        let config = Config::default();
        assert_eq!(config.proxy.min_timeout_ms, 1_000);
        assert_eq!(config.proxy.default_timeout_ms, 30_000);
        assert_eq!(config.proxy.max_timeout_ms, 300_000);
        assert_eq!(config.proxy.max_redirects, 10);
        assert_eq!(config.proxy.max_response_bytes, 10 * 1024 * 1024);
        assert_eq!(config.proxy.user_agent, "CodeOps-Courier/1.0");
        assert_eq!(config.script.pre_request_timeout_ms, 5_000);
        assert_eq!(config.script.post_response_timeout_ms, 10_000);
        assert_eq!(config.runner.max_iterations, 1_000);
        assert_eq!(config.runner.max_delay_ms, 60_000);
        assert_eq!(config.history.max_stored_body_bytes, 1024 * 1024);
    }

    #[test]
    fn test_clamp_timeout_boundaries() {
        let proxy = ProxyConfig::default();
        assert_eq!(proxy.clamp_timeout(Some(999)), Duration::from_millis(1_000));
        assert_eq!(
            proxy.clamp_timeout(Some(300_001)),
            Duration::from_millis(300_000)
        );
        assert_eq!(proxy.clamp_timeout(None), Duration::from_millis(30_000));
        assert_eq!(
            proxy.clamp_timeout(Some(5_000)),
            Duration::from_millis(5_000)
        );
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[service]\nname = \"courier-test\"\nport = 9999\n\n[script]\npre_request_timeout_ms = 250"
        )
        .unwrap();

        let config = Config::load_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.service.name, "courier-test");
        assert_eq!(config.service.port, 9999);
        assert_eq!(config.script.pre_request_timeout_ms, 250);
        // Untouched sections keep their defaults
        assert_eq!(config.script.post_response_timeout_ms, 10_000);
        assert_eq!(config.proxy.max_redirects, 10);
    }
}
