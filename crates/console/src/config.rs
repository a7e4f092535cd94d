//! Console configuration

use std::env;

use dispatch_realtime::{Config, ConfigError};

/// Default number of events kept in memory
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub realtime: Config,
    pub service_request_id: Option<String>,
    pub history_limit: usize,
    pub log_json: bool,
}

impl ConsoleConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let history_limit = match env::var("EVENT_HISTORY_LIMIT") {
            Ok(value) => match value.parse::<usize>() {
                Ok(limit) if limit > 0 => limit,
                _ => return Err(ConfigError::Invalid("EVENT_HISTORY_LIMIT", value)),
            },
            Err(_) => DEFAULT_HISTORY_LIMIT,
        };

        Ok(Self {
            realtime: Config::from_env()?,
            service_request_id: env::var("SERVICE_REQUEST_ID")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            history_limit,
            log_json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }

    /// The service request to watch; a CLI argument wins over the environment
    pub fn resolve_service_request(&self, arg: Option<String>) -> Result<String, ConfigError> {
        arg.filter(|v| !v.trim().is_empty())
            .or_else(|| self.service_request_id.clone())
            .ok_or(ConfigError::Missing("SERVICE_REQUEST_ID"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn cleanup_config() {
        for var in [
            "EVENT_HISTORY_LIMIT",
            "SERVICE_REQUEST_ID",
            "LOG_FORMAT",
            "WS_NAMESPACE",
            "WS_ROOM_POLICY",
            "WS_JOIN_TIMEOUT_MS",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial(env)]
    fn test_defaults() {
        cleanup_config();

        let config = ConsoleConfig::from_env().unwrap();
        assert_eq!(config.history_limit, 100);
        assert_eq!(config.service_request_id, None);
        assert!(!config.log_json);
    }

    #[test]
    #[serial(env)]
    fn test_history_limit_must_be_positive() {
        cleanup_config();

        env::set_var("EVENT_HISTORY_LIMIT", "0");
        assert!(matches!(
            ConsoleConfig::from_env(),
            Err(ConfigError::Invalid("EVENT_HISTORY_LIMIT", _))
        ));

        env::set_var("EVENT_HISTORY_LIMIT", "25");
        assert_eq!(ConsoleConfig::from_env().unwrap().history_limit, 25);

        cleanup_config();
    }

    #[test]
    #[serial(env)]
    fn test_service_request_resolution() {
        cleanup_config();
        env::set_var("SERVICE_REQUEST_ID", "sr-env");
        env::set_var("LOG_FORMAT", "JSON");

        let config = ConsoleConfig::from_env().unwrap();
        assert!(config.log_json);
        assert_eq!(config.resolve_service_request(None).unwrap(), "sr-env");
        assert_eq!(
            config.resolve_service_request(Some("sr-arg".into())).unwrap(),
            "sr-arg"
        );

        env::remove_var("SERVICE_REQUEST_ID");
        let config = ConsoleConfig::from_env().unwrap();
        assert!(matches!(
            config.resolve_service_request(None),
            Err(ConfigError::Missing("SERVICE_REQUEST_ID"))
        ));

        cleanup_config();
    }
}
