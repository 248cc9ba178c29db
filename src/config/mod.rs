use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allow_any_origin: bool,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    pub max_age: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebSocketConfig {
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
    /// Largest frame accepted from a client, in bytes. Envelopes carry
    /// images and audio as data URLs, so this has to be roomy.
    pub max_frame_size: usize,
}

impl WebSocketConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    /// Display name used when a client registers without one.
    pub default_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub websocket: WebSocketConfig,
    pub registry: RegistryConfig,
}

const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

fn defaults(environment: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("environment", environment)?
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 3000)?
        .set_default("server.workers", num_cpus::get() as i64)?
        .set_default("cors.enabled", true)?
        .set_default("cors.allow_any_origin", true)?
        .set_default("cors.allowed_origins", Vec::<String>::new())?
        .set_default("cors.max_age", 3600)?
        .set_default("websocket.heartbeat_interval_secs", 30)?
        .set_default("websocket.client_timeout_secs", 40)?
        .set_default("websocket.max_frame_size", DEFAULT_MAX_FRAME_SIZE as i64)?
        .set_default("registry.default_name", "Anonymous")
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = defaults("development")?
            // Add in settings from the config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))

            // Add in settings from environment variables (with prefix "APP_")
            // E.g., `APP_SERVER__PORT=5001` would set `Settings.server.port`
            .add_source(
                Environment::with_prefix("app")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
            )
            // A bare PORT wins, as most hosting platforms only set that one
            .set_override_option("server.port", env::var("PORT").ok())?
            .build()?;

        s.try_deserialize()
    }

    #[cfg(test)]
    pub fn new_for_test() -> Result<Self, ConfigError> {
        defaults("test")?
            .set_override("server.port", 0)?
            .set_override("server.workers", 1)?
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn cleanup_env() {
        env::remove_var("APP_SERVER__PORT");
        env::remove_var("APP_SERVER__WORKERS");
        env::remove_var("APP_REGISTRY__DEFAULT_NAME");
        env::remove_var("APP_WEBSOCKET__CLIENT_TIMEOUT_SECS");
        env::remove_var("APP_WEBSOCKET__MAX_FRAME_SIZE");
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::new_for_test().expect("Failed to load settings");
        assert_eq!(settings.environment, "test");
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 0);
        assert_eq!(settings.server.workers, 1);
        assert!(settings.cors.enabled);
        assert!(settings.cors.allowed_origins.is_empty());
        assert_eq!(settings.registry.default_name, "Anonymous");
        assert_eq!(settings.websocket.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(settings.websocket.client_timeout(), Duration::from_secs(40));
        assert_eq!(settings.websocket.max_frame_size, 16 * 1024 * 1024);
    }

    // Kept in a single test so the process-wide environment is not raced by
    // other tests in this module.
    #[test]
    fn test_environment_override() {
        cleanup_env();

        env::set_var("APP_SERVER__PORT", "9000");
        env::set_var("APP_SERVER__WORKERS", "2");
        env::set_var("APP_REGISTRY__DEFAULT_NAME", "Guest");
        env::set_var("APP_WEBSOCKET__CLIENT_TIMEOUT_SECS", "90");
        env::set_var("APP_WEBSOCKET__MAX_FRAME_SIZE", "1048576");

        let config = defaults("test")
            .unwrap()
            .add_source(
                Environment::with_prefix("app")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()
            .expect("Failed to build config")
            .try_deserialize::<Settings>()
            .expect("Failed to deserialize settings");

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.workers, 2);
        assert_eq!(config.registry.default_name, "Guest");
        assert_eq!(config.websocket.client_timeout_secs, 90);
        assert_eq!(config.websocket.max_frame_size, 1048576);

        // Settings::new reads the same single-underscore prefix.
        let settings = Settings::new().expect("Failed to load settings");
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.registry.default_name, "Guest");

        env::set_var("APP_SERVER__PORT", "invalid");

        let result = defaults("test")
            .unwrap()
            .add_source(
                Environment::with_prefix("app")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()
            .and_then(|config| config.try_deserialize::<Settings>());

        assert!(result.is_err(), "Expected error for invalid port");

        cleanup_env();
    }
}
