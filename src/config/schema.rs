//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the manager.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the HAProxy manager.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ManagerConfig {
    /// Listener configuration for the JSON-RPC endpoint.
    pub listener: ListenerConfig,

    /// Timeout configuration for incoming requests.
    pub timeouts: TimeoutConfig,

    /// How the managed HAProxy process is controlled.
    pub haproxy: HaproxyConfig,

    /// Rendering settings for the generated configuration.
    pub render: RenderConfig,

    /// Registry behaviour (apply mode, persistence).
    pub registry: RegistryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:34015").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:34015".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Timeout configuration for RPC requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    ///
    /// Must exceed the worst-case apply (reload + health wait + rollback).
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 120 }
    }
}

/// Control surface of the external HAProxy process.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HaproxyConfig {
    /// Configuration file HAProxy reads from.
    pub config_path: PathBuf,

    /// Syntax check command. `{config}` is replaced by the candidate file.
    pub check_command: Vec<String>,

    /// Reload command. `{config}` is replaced by `config_path`.
    pub reload_command: Vec<String>,

    /// HTTP health probe (e.g. an HAProxy `monitor-uri`).
    pub health_url: Option<String>,

    /// While this file exists, applies are refused.
    pub lock_path: Option<PathBuf>,

    /// Upper bound for the syntax check and reload commands.
    pub reload_timeout_secs: u64,

    /// Upper bound for the proxy to report healthy after a reload.
    pub health_timeout_secs: u64,

    /// Timeout of a single health probe request in milliseconds.
    pub probe_timeout_ms: u64,

    /// Base delay between health probes in milliseconds.
    pub probe_interval_ms: u64,

    /// Permit the first apply without a verified last-known-good config.
    pub allow_unverified_bootstrap: bool,
}

impl Default for HaproxyConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("/usr/local/etc/haproxy/haproxy.cfg"),
            check_command: vec![
                "haproxy".to_string(),
                "-c".to_string(),
                "-f".to_string(),
                "{config}".to_string(),
            ],
            reload_command: vec!["/usr/bin/reload.sh".to_string()],
            health_url: None,
            lock_path: None,
            reload_timeout_secs: 10,
            health_timeout_secs: 10,
            probe_timeout_ms: 1000,
            probe_interval_ms: 200,
            allow_unverified_bootstrap: false,
        }
    }
}

/// Rendering settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Name of the generated frontend section.
    pub frontend_name: String,

    /// Bind line of the generated frontend.
    pub bind: String,

    /// Backend host for entries that do not name one.
    pub backend_host: String,

    /// Health check interval written on each server line.
    pub check_inter_ms: u64,

    /// File holding the `global`/`defaults` sections.
    pub preamble_path: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frontend_name: "http-in".to_string(),
            bind: "*:80".to_string(),
            backend_host: "127.0.0.1".to_string(),
            check_inter_ms: 10_000,
            preamble_path: None,
        }
    }
}

/// When registry mutations reach the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApplyMode {
    /// Render and apply after every mutating call.
    #[default]
    Auto,
    /// Only stage changes until an explicit `Generate`.
    Staged,
}

/// Registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RegistryConfig {
    /// Apply policy for `Add`/`Remove`.
    pub apply_mode: ApplyMode,

    /// Where the registry is persisted between restarts.
    pub state_path: Option<PathBuf>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
