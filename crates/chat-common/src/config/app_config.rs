//! Application configuration structs
//!
//! Loads configuration from environment variables (a `.env` file is honoured).

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub jwt: JwtConfig,
    pub store: StoreConfig,
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

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
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

/// Gateway protocol tuning
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// URL handed out by `GET /api/v{6,7}/gateway`
    pub public_url: String,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Slack on top of the interval before a silent client is dropped
    #[serde(default = "default_heartbeat_grace_ms")]
    pub heartbeat_grace_ms: u64,
    /// How long a closed session stays resumable
    #[serde(default = "default_resume_window_secs")]
    pub resume_window_secs: u64,
    /// Dispatches retained per session for replay on resume
    #[serde(default = "default_replay_buffer_size")]
    pub replay_buffer_size: usize,
    /// Frames queued per session before it counts as a slow consumer
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Name reported in the `_trace` lists of HELLO and READY
    #[serde(default = "default_trace_name")]
    pub trace_name: String,
}

impl GatewayConfig {
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Time allowed between heartbeats before closing with 4009
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms + self.heartbeat_grace_ms)
    }

    #[must_use]
    pub fn resume_window(&self) -> Duration {
        Duration::from_secs(self.resume_window_secs)
    }

    /// Defaults with the given advertised URL; handy for tests
    #[must_use]
    pub fn with_public_url(public_url: impl Into<String>) -> Self {
        Self {
            public_url: public_url.into(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_grace_ms: default_heartbeat_grace_ms(),
            resume_window_secs: default_resume_window_secs(),
            replay_buffer_size: default_replay_buffer_size(),
            outbound_buffer: default_outbound_buffer(),
            trace_name: default_trace_name(),
        }
    }
}

/// JWT configuration
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// HMAC secret shared with the token issuer
    pub secret: String,
}

/// In-memory store configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// JSON document loaded into the store at start-up
    #[serde(default)]
    pub seed_path: Option<PathBuf>,
}

// Default value functions
fn default_app_name() -> String {
    "chat-gateway".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    45_000
}

fn default_heartbeat_grace_ms() -> u64 {
    45_000
}

fn default_resume_window_secs() -> u64 {
    120
}

fn default_replay_buffer_size() -> usize {
    1000
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_trace_name() -> String {
    "gateway-prd-main".to_string()
}

/// Read an optional variable, failing on values that do not parse
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

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let server = ServerConfig {
            host: env::var("GATEWAY_HOST").unwrap_or_else(|_| default_host()),
            port: parse_var("GATEWAY_PORT")?.ok_or(ConfigError::MissingVar("GATEWAY_PORT"))?,
        };
        let public_url = env::var("GATEWAY_PUBLIC_URL")
            .unwrap_or_else(|_| format!("ws://{}", server.address()));

        Ok(Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env: env::var("APP_ENV")
                    .ok()
                    .and_then(|s| Environment::parse(&s))
                    .unwrap_or_default(),
            },
            server,
            gateway: GatewayConfig {
                public_url,
                heartbeat_interval_ms: parse_var("GATEWAY_HEARTBEAT_INTERVAL_MS")?
                    .unwrap_or_else(default_heartbeat_interval_ms),
                heartbeat_grace_ms: parse_var("GATEWAY_HEARTBEAT_GRACE_MS")?
                    .unwrap_or_else(default_heartbeat_grace_ms),
                resume_window_secs: parse_var("GATEWAY_RESUME_WINDOW_SECS")?
                    .unwrap_or_else(default_resume_window_secs),
                replay_buffer_size: parse_var("GATEWAY_REPLAY_BUFFER")?
                    .unwrap_or_else(default_replay_buffer_size),
                outbound_buffer: parse_var("GATEWAY_OUTBOUND_BUFFER")?
                    .unwrap_or_else(default_outbound_buffer),
                trace_name: env::var("GATEWAY_TRACE_NAME").unwrap_or_else(|_| default_trace_name()),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET").map_err(|_| ConfigError::MissingVar("JWT_SECRET"))?,
            },
            store: StoreConfig {
                seed_path: env::var("STORE_SEED_PATH").ok().map(PathBuf::from),
            },
        })
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
