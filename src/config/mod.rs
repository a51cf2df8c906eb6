//! Configuration management for user-service
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::auth::password::parse_cost;

/// Prefix of every environment variable read by [`Config::from_env`]
pub const ENV_PREFIX: &str = "USER_SERVICE_";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Token signing configuration
    #[serde(default)]
    pub jwt: JwtConfig,

    /// Credential hashing configuration
    #[serde(default)]
    pub security: SecurityConfig,

    /// Per-client request throttling
    #[serde(default)]
    pub rate_limit: RequestRateLimitConfig,

    /// Audit logging configuration
    #[serde(default)]
    pub audit: AuditConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// OpenTelemetry configuration
    #[serde(default)]
    pub otel: OtelConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // First, expand environment variables in the YAML string
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from environment variables with prefix USER_SERVICE_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // Server config from env
        if let Some(host) = env_var("SERVER_HOST") {
            config.server.host = host;
        }
        if let Some(port) = env_var("SERVER_PORT") {
            config.server.port = parse_env("SERVER_PORT", &port)?;
        }
        if let Some(timeout) = env_var("SERVER_REQUEST_TIMEOUT_SECS") {
            config.server.request_timeout_secs =
                parse_env("SERVER_REQUEST_TIMEOUT_SECS", &timeout)?;
        }

        // JWT config from env
        if let Some(secret) = env_var("JWT_SECRET") {
            config.jwt.secret = secret;
        }
        if let Some(hours) = env_var("JWT_EXPIRATION_HOURS") {
            config.jwt.expiration_hours = parse_env("JWT_EXPIRATION_HOURS", &hours)?;
        }
        if let Some(issuer) = env_var("JWT_ISSUER") {
            config.jwt.issuer = issuer;
        }
        if let Some(audience) = env_var("JWT_AUDIENCE") {
            config.jwt.audience = audience;
        }

        // Never fails startup: bad values fall back to the algorithm default
        if let Some(cost) = env_var("HASH_COST") {
            config.security.hash_cost = Some(parse_cost(Some(&cost)));
        }

        // Rate limit config from env
        if let Some(enabled) = env_var("RATE_LIMIT_ENABLED") {
            config.rate_limit.enabled = enabled.parse().unwrap_or(true);
        }
        if let Some(max) = env_var("RATE_LIMIT_MAX_REQUESTS") {
            config.rate_limit.max_requests = parse_env("RATE_LIMIT_MAX_REQUESTS", &max)?;
        }
        if let Some(window) = env_var("RATE_LIMIT_WINDOW_SECS") {
            config.rate_limit.window_secs = parse_env("RATE_LIMIT_WINDOW_SECS", &window)?;
        }
        if let Some(interval) = env_var("RATE_LIMIT_SWEEP_INTERVAL_SECS") {
            config.rate_limit.sweep_interval_secs =
                parse_env("RATE_LIMIT_SWEEP_INTERVAL_SECS", &interval)?;
        }

        // Audit retry config from env
        if let Some(attempts) = env_var("AUDIT_MAX_ATTEMPTS") {
            config.audit.max_attempts = parse_env("AUDIT_MAX_ATTEMPTS", &attempts)?;
        }
        if let Some(delay) = env_var("AUDIT_RETRY_DELAY_MS") {
            config.audit.retry_delay_ms = parse_env("AUDIT_RETRY_DELAY_MS", &delay)?;
        }

        // Database config from env
        if let Some(path) = env_var("DATABASE_PATH") {
            config.database.path = path;
        }

        // OTEL config from env
        if let Some(enabled) = env_var("OTEL_ENABLED") {
            config.otel.enabled = enabled.parse().unwrap_or(false);
        }
        if let Some(endpoint) = env_var("OTEL_ENDPOINT") {
            config.otel.endpoint = Some(endpoint);
        }

        // Logging config from env
        if let Some(level) = env_var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = env_var("LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Check startup preconditions
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("jwt.secret".to_string()));
        }
        if self.jwt.expiration_hours == 0 {
            return Err(ConfigError::InvalidValue(
                "jwt.expiration_hours must be greater than 0".to_string(),
            ));
        }
        if self.rate_limit.enabled && self.rate_limit.max_requests == 0 {
            return Err(ConfigError::InvalidValue(
                "rate_limit.max_requests must be greater than 0".to_string(),
            ));
        }
        if self.audit.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "audit.max_attempts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, name)).ok()
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Parse(format!("Invalid value for {}{}", ENV_PREFIX, name)))
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request deadline in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

/// Token signing configuration
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct JwtConfig {
    /// Symmetric signing secret (required)
    #[serde(default)]
    pub secret: String,

    /// Token lifetime in hours
    #[serde(default = "default_expiration_hours")]
    pub expiration_hours: u64,

    /// Expected issuer; empty disables the check
    #[serde(default)]
    pub issuer: String,

    /// Expected audience; empty disables the check
    #[serde(default)]
    pub audience: String,
}

impl JwtConfig {
    /// Create a config with the given secret and defaults elsewhere
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Self::default()
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    pub fn with_expiration_hours(mut self, hours: u64) -> Self {
        self.expiration_hours = hours;
        self
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            expiration_hours: default_expiration_hours(),
            issuer: String::new(),
            audience: String::new(),
        }
    }
}

// Keep the secret out of logs
impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("expiration_hours", &self.expiration_hours)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

fn default_expiration_hours() -> u64 {
    24
}

/// Credential hashing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SecurityConfig {
    /// Argon2 time cost; None uses the algorithm default
    #[serde(default, deserialize_with = "deserialize_hash_cost")]
    pub hash_cost: Option<u32>,
}

// Any scalar is accepted; values that are not a usable cost resolve to the
// default instead of failing the whole config.
fn deserialize_hash_cost<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Option::<serde_yaml::Value>::deserialize(deserializer)? {
        None | Some(serde_yaml::Value::Null) => return Ok(None),
        Some(serde_yaml::Value::String(s)) => s,
        Some(serde_yaml::Value::Number(n)) => n.to_string(),
        Some(serde_yaml::Value::Bool(b)) => b.to_string(),
        Some(_) => String::new(),
    };
    Ok(Some(parse_cost(Some(&raw))))
}

/// Per-client request throttling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestRateLimitConfig {
    /// Whether the limiter is installed in the request pipeline
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,

    /// Requests allowed per client within one window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How often idle client entries are evicted, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl RequestRateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for RequestRateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_max_requests() -> u32 {
    60
}

fn default_window_secs() -> u64 {
    60
}

fn default_sweep_interval() -> u64 {
    300
}

/// Audit logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditConfig {
    /// Total attempts per event, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl AuditConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    100
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "/data/db/user-service.db".to_string()
}

/// OpenTelemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtelConfig {
    /// Whether OpenTelemetry is enabled
    #[serde(default)]
    pub enabled: bool,

    /// OTLP endpoint URL
    pub endpoint: Option<String>,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            service_name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "user-service".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format ("json" or "pretty")
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
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
