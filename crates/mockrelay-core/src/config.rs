//! Configuration consumed by the dispatch core

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upstream proxy the outbound client tunnels through, when configured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamProxyConfig {
    /// Proxy host
    pub host: String,
    /// Proxy port
    pub port: u16,
    /// Optional basic-auth username
    pub username: Option<String>,
    /// Optional basic-auth password
    pub password: Option<String>,
}

impl UpstreamProxyConfig {
    /// Create a proxy configuration without credentials
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    /// Set basic-auth credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Proxy URL in the form the outbound client expects
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Core dispatcher configuration.
///
/// Immutable after construction; shared across all in-flight requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Answer CORS preflight requests aimed at the management API surface
    pub enable_cors_for_api: bool,
    /// Answer CORS preflight requests for any unmatched request
    pub enable_cors_for_all_responses: bool,
    /// Path prefix identifying the management API surface
    pub api_path_prefix: String,
    /// Timeout for explicit proxy forwards, in milliseconds
    pub socket_connection_timeout_ms: u64,
    /// Maximum number of audit entries kept in memory
    pub max_audit_entries: usize,
    /// Optional upstream proxy for all outbound requests
    pub upstream_proxy: Option<UpstreamProxyConfig>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            enable_cors_for_api: false,
            enable_cors_for_all_responses: false,
            api_path_prefix: "/mockrelay".to_string(),
            socket_connection_timeout_ms: 10_000,
            max_audit_entries: 1000, // keep last 1000 requests by default
            upstream_proxy: None,
        }
    }
}

impl CoreConfig {
    /// Timeout for explicit proxy forwards
    pub fn socket_connection_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_connection_timeout_ms)
    }
}
