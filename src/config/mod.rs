// Configuration module entry point
// Layered settings for the demo binary; the engine itself only takes a bind address

mod types;

pub use types::{Config, LoggingConfig, ServerConfig};

impl Config {
    /// Load configuration from the given file path (extension optional)
    ///
    /// Sources, lowest precedence first: built-in defaults, the file if it
    /// exists, then `GEE_`-prefixed environment variables such as `GEE_SERVER__PORT`.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 9999)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "combined")?
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("GEE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// `host:port` string handed to `Engine::run`
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
