use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Shape of the plain response envelope the paginator applies when no
/// total-count signal is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeMode {
    /// Wrap the payload as `{"data": <payload>}`.
    Wrapped,
    /// Pass the payload through unchanged.
    Raw,
}

/// A single URL rewrite rule, applied before routing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RewriteRuleConfig {
    /// Path pattern: literal segments, `:name` captures, trailing `*`.
    pub pattern: String,

    /// Replacement template: literal segments, `:name`, `$1` for the `*` rest.
    pub replacement: String,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path to the JSON document backing all collections
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Directory uploaded files are written to and served from
    #[serde(default = "default_content_root")]
    pub content_root: String,

    /// Public path prefix uploaded files are served under
    #[serde(default = "default_cdn_public_path")]
    pub cdn_public_path: String,

    /// Plain envelope shape for non-paginated responses
    #[serde(default = "default_envelope")]
    pub envelope: EnvelopeMode,

    /// Honor a `callback` query parameter by emitting a JSONP body
    #[serde(default = "default_true")]
    pub jsonp: bool,

    /// Page size assumed by the paginator when `pageSize` is absent
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,

    /// URL rewrite rules, evaluated in order, first match wins
    #[serde(default = "default_rewrites")]
    pub rewrites: Vec<RewriteRuleConfig>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum request body size in MB
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Metrics endpoint enabled
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            db_path: default_db_path(),
            content_root: default_content_root(),
            cdn_public_path: default_cdn_public_path(),
            envelope: default_envelope(),
            jsonp: default_true(),
            default_page_size: default_page_size(),
            rewrites: default_rewrites(),
            timeout_secs: default_timeout_secs(),
            max_body_size_mb: default_max_body_size_mb(),
            enable_cors: default_true(),
            log_level: default_log_level(),
            metrics_enabled: default_true(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables and config files
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let builder = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::with_name("jsonmock").required(false))
            // Override with environment variables
            .add_source(config::Environment::with_prefix("JSONMOCK").separator("__"));

        let mut config: ServerConfig = builder.build()?.try_deserialize()?;

        // The bare PORT variable wins, matching how the service is deployed
        if let Ok(port) = std::env::var("PORT") {
            config.port = port
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT is not a valid port number: {port}"))?;
        }

        Ok(config)
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get max body size in bytes
    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9090
}

fn default_db_path() -> String {
    "db.json".to_string()
}

fn default_content_root() -> String {
    "/tmp/uploads".to_string()
}

fn default_cdn_public_path() -> String {
    "/cdn".to_string()
}

fn default_envelope() -> EnvelopeMode {
    EnvelopeMode::Wrapped
}

fn default_page_size() -> u64 {
    100
}

fn default_rewrites() -> Vec<RewriteRuleConfig> {
    vec![
        RewriteRuleConfig {
            pattern: "/api/*".to_string(),
            replacement: "/$1".to_string(),
        },
        RewriteRuleConfig {
            pattern: "/blog/:resource/:id/show".to_string(),
            replacement: "/:resource/:id".to_string(),
        },
    ]
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_body_size_mb() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.db_path, "db.json");
        assert_eq!(cfg.cdn_public_path, "/cdn");
        assert_eq!(cfg.envelope, EnvelopeMode::Wrapped);
        assert_eq!(cfg.default_page_size, 100);
        assert_eq!(cfg.rewrites.len(), 2);
        assert!(cfg.jsonp);
        assert!(cfg.enable_cors);
        assert!(cfg.metrics_enabled);
    }

    #[test]
    fn test_socket_addr() {
        let cfg = ServerConfig::default();
        let addr = cfg.socket_addr().unwrap();
        assert_eq!(addr.port(), 9090);
    }

    #[test]
    fn test_default_rewrites_order() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.rewrites[0].pattern, "/api/*");
        assert_eq!(cfg.rewrites[1].pattern, "/blog/:resource/:id/show");
    }
}
