//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "voicebridge.toml",
    "./config/config.toml",
    "/etc/voicebridge/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        self.apply_env_overrides(&mut config);
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("VOICEBRIDGE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        for path in CONFIG_PATHS {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&self, config: &mut AppConfig) {
        // Consumer
        if let Ok(val) = env::var("VOICEBRIDGE_AMQP_URL") {
            config.consumer.url = val;
        }
        if let Ok(val) = env::var("VOICEBRIDGE_AMQP_EXCHANGE") {
            config.consumer.exchange = val;
        }
        if let Ok(val) = env::var("VOICEBRIDGE_AMQP_QUEUE") {
            config.consumer.queue_name = val;
        }
        if let Ok(val) = env::var("VOICEBRIDGE_AMQP_ROUTING_KEY") {
            config.consumer.routing_key = val;
        }
        if let Ok(val) = env::var("VOICEBRIDGE_AMQP_DURABLE") {
            config.consumer.durable = val.parse().unwrap_or(true);
        }
        if let Ok(val) = env::var("VOICEBRIDGE_AMQP_AUTO_DELETE") {
            config.consumer.auto_delete = val.parse().unwrap_or(false);
        }
        if let Ok(val) = env::var("VOICEBRIDGE_AMQP_PREFETCH") {
            if let Ok(prefetch) = val.parse() {
                config.consumer.prefetch_count = prefetch;
            }
        }
        if let Ok(val) = env::var("VOICEBRIDGE_RECONNECT_INTERVAL") {
            if let Ok(interval) = val.parse() {
                config.consumer.reconnect_interval_secs = interval;
            }
        }
        if let Ok(val) = env::var("VOICEBRIDGE_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(attempts) = val.parse() {
                config.consumer.max_reconnect_attempts = attempts;
            }
        }
        if let Ok(val) = env::var("VOICEBRIDGE_CONSUMER_ENABLED") {
            config.consumer.enabled = val.parse().unwrap_or(true);
        }

        // Agent
        if let Ok(val) = env::var("VOICEBRIDGE_AGENT_URL") {
            config.agent.base_url = val;
        }
        if let Ok(val) = env::var("VOICEBRIDGE_AGENT_TIMEOUT") {
            if let Ok(timeout) = val.parse() {
                config.agent.request_timeout_secs = timeout;
            }
        }

        // HTTP
        if let Ok(val) = env::var("VOICEBRIDGE_HTTP_HOST") {
            config.http.host = val;
        }
        if let Ok(val) = env::var("VOICEBRIDGE_HTTP_PORT") {
            if let Ok(port) = val.parse() {
                config.http.port = port;
            }
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
