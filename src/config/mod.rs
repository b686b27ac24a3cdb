// Configuration module entry point
// Layered configuration: built-in defaults, optional TOML file, environment

mod state;
mod types;

use std::net::SocketAddr;

// Re-export public types
pub use state::AppState;
pub use types::{
    Config, HttpConfig, LoggingConfig, PerformanceConfig, ServerConfig, StorageConfig,
};

/// Config file looked up when none is given, without extension
pub const DEFAULT_CONFIG_FILE: &str = "collector";

/// Prefix of environment overrides, e.g. `COLLECTOR_SERVER__PORT=9000`
const ENV_PREFIX: &str = "COLLECTOR";

type Builder = config::ConfigBuilder<config::builder::DefaultState>;

impl Config {
    /// Load configuration from the default file if present
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::build(config::File::with_name(DEFAULT_CONFIG_FILE).required(false))
    }

    /// Load configuration from specified file path, which must exist
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        Self::build(config::File::with_name(config_path))
    }

    /// Parse configuration from TOML text layered over the defaults
    pub fn from_toml(text: &str) -> Result<Self, config::ConfigError> {
        with_defaults(config::Config::builder())?
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Built-in defaults only
    pub fn defaults() -> Result<Self, config::ConfigError> {
        with_defaults(config::Config::builder())?
            .build()?
            .try_deserialize()
    }

    fn build(file: impl config::Source + Send + Sync + 'static) -> Result<Self, config::ConfigError> {
        with_defaults(config::Config::builder())?
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("storage.allowed_extensions"),
            )
            .build()?
            .try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}

fn with_defaults(builder: Builder) -> Result<Builder, config::ConfigError> {
    builder
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("logging.level", "info")?
        .set_default("logging.access_log", true)?
        .set_default("logging.access_log_format", "combined")?
        .set_default("logging.access_log_file", "application.log")?
        .set_default("logging.max_file_size", 10_485_760)? // 10MB
        .set_default("logging.max_backups", 1)?
        .set_default("performance.keep_alive_timeout", 75)?
        .set_default("performance.read_timeout", 30)?
        .set_default("performance.write_timeout", 30)?
        .set_default("performance.shutdown_timeout", 10)?
        .set_default("http.server_name", "measurement-collector")?
        .set_default("http.max_body_size", 10_485_760)? // 10MB
        .set_default("http.max_header_size", 16_384)?
        .set_default("storage.static_dir", "web")?
        .set_default("storage.upload_dir", "data")?
        .set_default("storage.upload_field", "measurements")?
        .set_default("storage.allowed_extensions", vec!["gz"])
}
