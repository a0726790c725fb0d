//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file when present).

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app: AppSettings,
    pub gateway: ServerConfig,
    pub database: Option<DatabaseConfig>,
    pub redis: Option<RedisConfig>,
    pub jwt: JwtConfig,
    pub session: SessionConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_events_channel")]
    pub events_channel: String,
}

/// JWT configuration
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry: i64,
}

/// Gateway session timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long a closed session may still be resumed
    pub resume_window: Duration,
    /// Interval advertised to clients in Hello
    pub heartbeat_interval: Duration,
    /// Inbound silence after which a session is closed
    pub heartbeat_timeout: Duration,
    /// Period of the expired-session sweep
    pub sweep_interval: Duration,
    /// Budget for sessions to flush and close on shutdown
    pub shutdown_timeout: Duration,
    /// Attempts for a presence write before giving up on conflicts
    pub presence_retry_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resume_window: Duration::from_secs(default_resume_window_secs()),
            heartbeat_interval: Duration::from_millis(default_heartbeat_interval_ms()),
            heartbeat_timeout: Duration::from_millis(default_heartbeat_timeout_ms()),
            sweep_interval: Duration::from_secs(default_sweep_interval_secs()),
            shutdown_timeout: Duration::from_secs(default_shutdown_timeout_secs()),
            presence_retry_attempts: default_presence_retry_attempts(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "chat-gateway".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn default_redis_max_connections() -> u32 {
    10
}

fn default_events_channel() -> String {
    "gateway:events".to_string()
}

fn default_access_token_expiry() -> i64 {
    900 // 15 minutes
}

fn default_resume_window_secs() -> u64 {
    86400 // 24 hours
}

fn default_heartbeat_interval_ms() -> u64 {
    45_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    90_000
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

fn default_presence_retry_attempts() -> u32 {
    5
}

/// Read an optional variable, failing only when it is present but unparsable
fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        Err(_) => Ok(None),
    }
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or
    /// a present variable cannot be parsed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let env = match env::var("APP_ENV") {
            Ok(raw) => Environment::parse(&raw).ok_or(ConfigError::InvalidValue("APP_ENV", raw))?,
            Err(_) => default_env(),
        };

        let database = match env::var("DATABASE_URL") {
            Ok(url) => Some(DatabaseConfig {
                url,
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS")?
                    .unwrap_or_else(default_max_connections),
                min_connections: parse_var("DATABASE_MIN_CONNECTIONS")?
                    .unwrap_or_else(default_min_connections),
            }),
            Err(_) => None,
        };

        let redis = match env::var("REDIS_URL") {
            Ok(url) => Some(RedisConfig {
                url,
                max_connections: parse_var("REDIS_MAX_CONNECTIONS")?
                    .unwrap_or_else(default_redis_max_connections),
                events_channel: env::var("REDIS_EVENTS_CHANNEL")
                    .unwrap_or_else(|_| default_events_channel()),
            }),
            Err(_) => None,
        };

        let session = SessionConfig {
            resume_window: Duration::from_secs(
                parse_var("GATEWAY_RESUME_WINDOW_SECS")?.unwrap_or_else(default_resume_window_secs),
            ),
            heartbeat_interval: Duration::from_millis(
                parse_var("GATEWAY_HEARTBEAT_INTERVAL_MS")?
                    .unwrap_or_else(default_heartbeat_interval_ms),
            ),
            heartbeat_timeout: Duration::from_millis(
                parse_var("GATEWAY_HEARTBEAT_TIMEOUT_MS")?
                    .unwrap_or_else(default_heartbeat_timeout_ms),
            ),
            sweep_interval: Duration::from_secs(
                parse_var("GATEWAY_SWEEP_INTERVAL_SECS")?
                    .unwrap_or_else(default_sweep_interval_secs),
            ),
            shutdown_timeout: Duration::from_secs(
                parse_var("GATEWAY_SHUTDOWN_TIMEOUT_SECS")?
                    .unwrap_or_else(default_shutdown_timeout_secs),
            ),
            presence_retry_attempts: parse_var("GATEWAY_PRESENCE_RETRY_ATTEMPTS")?
                .unwrap_or_else(default_presence_retry_attempts),
        };
        session.validate()?;

        Ok(Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env,
            },
            gateway: ServerConfig {
                host: env::var("GATEWAY_HOST").unwrap_or_else(|_| default_host()),
                port: parse_var("GATEWAY_PORT")?.ok_or(ConfigError::MissingVar("GATEWAY_PORT"))?,
            },
            database,
            redis,
            jwt: JwtConfig {
                secret: required_var("JWT_SECRET")?,
                access_token_expiry: parse_var("JWT_ACCESS_TOKEN_EXPIRY")?
                    .unwrap_or_else(default_access_token_expiry),
            },
            session,
        })
    }
}

impl SessionConfig {
    /// Reject timing combinations that would close healthy clients
    ///
    /// # Errors
    /// Returns an error if the heartbeat timeout does not exceed the interval
    /// or the retry budget is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_timeout <= self.heartbeat_interval {
            return Err(ConfigError::InvalidValue(
                "GATEWAY_HEARTBEAT_TIMEOUT_MS",
                format!(
                    "{}ms must exceed heartbeat interval {}ms",
                    self.heartbeat_timeout.as_millis(),
                    self.heartbeat_interval.as_millis()
                ),
            ));
        }
        if self.presence_retry_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "GATEWAY_PRESENCE_RETRY_ATTEMPTS",
                "0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
