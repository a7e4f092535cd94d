//! Realtime client configuration

use std::env;
use std::time::Duration;

use crate::websocket::room::RoomPolicy;

/// Default Socket.IO namespace customer connections live in
pub const DEFAULT_NAMESPACE: &str = "/customer";

/// Client configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Backend
    pub api_url: String,
    pub namespace: String,

    // Authentication
    pub session_token: Option<String>,
    pub api_key: Option<String>,

    // Timeouts
    pub http_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub join_timeout_ms: u64,

    // Rooms
    pub room_policy: RoomPolicy,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let session_token = non_empty_var("SESSION_TOKEN");

        Ok(Self {
            api_url: env::var("API_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            namespace: {
                let namespace =
                    env::var("WS_NAMESPACE").unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());
                if !namespace.starts_with('/') {
                    return Err(ConfigError::Invalid(
                        "WS_NAMESPACE",
                        "must start with '/'".to_string(),
                    ));
                }
                namespace
            },

            // The backend accepts the session token as API key unless told otherwise
            api_key: non_empty_var("API_KEY").or_else(|| session_token.clone()),
            session_token,

            http_timeout_ms: parse_var("HTTP_TIMEOUT_MS", 30_000)?,
            connect_timeout_ms: parse_var("WS_CONNECT_TIMEOUT_MS", 10_000)?,
            join_timeout_ms: parse_var("WS_JOIN_TIMEOUT_MS", 5_000)?,

            room_policy: match env::var("WS_ROOM_POLICY") {
                Ok(value) => value
                    .parse()
                    .map_err(|_| ConfigError::Invalid("WS_ROOM_POLICY", value))?,
                Err(_) => RoomPolicy::default(),
            },
        })
    }

    /// Settings for the event channel
    pub fn channel(&self) -> ChannelConfig {
        ChannelConfig {
            url: self.api_url.clone(),
            namespace: self.namespace.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            join_timeout: Duration::from_millis(self.join_timeout_ms),
            room_policy: self.room_policy,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

/// Settings consumed by [`crate::EventChannel`]
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Origin of the backend (`http(s)://host:port`)
    pub url: String,
    pub namespace: String,
    pub connect_timeout: Duration,
    pub join_timeout: Duration,
    pub room_policy: RoomPolicy,
}

impl ChannelConfig {
    /// Defaults for the given backend origin
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            connect_timeout: Duration::from_secs(10),
            join_timeout: Duration::from_secs(5),
            room_policy: RoomPolicy::default(),
        }
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_room_policy(mut self, policy: RoomPolicy) -> Self {
        self.room_policy = policy;
        self
    }

    /// WebSocket endpoint of the Engine.IO transport
    pub fn socket_url(&self) -> String {
        let origin = if let Some(rest) = self.url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.url.clone()
        };
        format!("{origin}/socket.io/?EIO=4&transport=websocket")
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid(key, value)),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
