//! Configuration for Mailwave

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// SMTP relay configuration
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Tracking configuration
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Delivery dispatcher configuration
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            bind_address: default_bind_address(),
        }
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection URL
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// SMTP relay configuration for outbound delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay host
    #[serde(default = "default_smtp_host")]
    pub host: String,

    /// Relay port
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Username for relay authentication
    pub username: Option<String>,

    /// Password for relay authentication
    pub password: Option<String>,

    /// Use STARTTLS
    #[serde(default = "default_use_starttls")]
    pub use_starttls: bool,

    /// Connection timeout in seconds
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
            use_starttls: default_use_starttls(),
            timeout_secs: default_smtp_timeout(),
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_use_starttls() -> bool {
    true
}

fn default_smtp_timeout() -> u64 {
    30
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

/// Tracking endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Tracking listener port (public, unauthenticated)
    #[serde(default = "default_tracking_port")]
    pub port: u16,

    /// Public base URL embedded into outgoing emails,
    /// e.g. "https://track.example.com"
    #[serde(default = "default_tracking_base_url")]
    pub base_url: String,

    /// Where to send a click whose tracking id cannot be resolved
    #[serde(default = "default_fallback_url")]
    pub fallback_url: String,

    /// Secret used to sign unsubscribe tokens
    #[serde(default = "default_unsubscribe_secret")]
    pub unsubscribe_secret: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            port: default_tracking_port(),
            base_url: default_tracking_base_url(),
            fallback_url: default_fallback_url(),
            unsubscribe_secret: default_unsubscribe_secret(),
        }
    }
}

fn default_tracking_port() -> u16 {
    8081
}

fn default_tracking_base_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_fallback_url() -> String {
    "https://example.com".to_string()
}

fn default_unsubscribe_secret() -> String {
    "change-me".to_string()
}

/// Delivery dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Dispatcher tick interval in seconds
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// Jobs claimed per tick
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Concurrent sends per tick
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Attempts before a job is abandoned
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    /// Lease duration in seconds; an expired lease is reclaimed
    #[serde(default = "default_lease_secs")]
    pub lease_secs: i64,

    /// Scheduler tick interval in seconds
    #[serde(default = "default_scheduler_tick_secs")]
    pub scheduler_tick_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            lease_secs: default_lease_secs(),
            scheduler_tick_secs: default_scheduler_tick_secs(),
        }
    }
}

fn default_tick_secs() -> u64 {
    5
}

fn default_batch_size() -> i64 {
    50
}

fn default_concurrency() -> usize {
    10
}

fn default_max_attempts() -> i32 {
    5
}

fn default_lease_secs() -> i64 {
    300
}

fn default_scheduler_tick_secs() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/mailwave/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let server = ServerConfig::default();
        assert_eq!(server.hostname, "localhost");
        assert_eq!(server.bind_address, "0.0.0.0");

        let delivery = DeliveryConfig::default();
        assert_eq!(delivery.batch_size, 50);
        assert_eq!(delivery.max_attempts, 5);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
hostname = "mail.example.com"

[database]
url = "postgres://localhost/mailwave"

[smtp]
host = "smtp.example.com"
port = 2525

[tracking]
base_url = "https://track.example.com"

[delivery]
batch_size = 100
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.hostname, "mail.example.com");
        assert_eq!(config.database.url, "postgres://localhost/mailwave");
        assert_eq!(config.smtp.port, 2525);
        assert_eq!(config.tracking.base_url, "https://track.example.com");
        assert_eq!(config.delivery.batch_size, 100);
        // defaults fill the rest
        assert_eq!(config.delivery.max_attempts, 5);
        assert_eq!(config.api.port, 8080);
    }
}
