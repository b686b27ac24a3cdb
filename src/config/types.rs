// Configuration types module
// Defines all configuration-related data structures

use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub http: HttpConfig,
    pub storage: StorageConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Runtime worker threads, defaults to the number of cores
    #[serde(default)]
    pub workers: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common or json)
    pub access_log_format: String,
    /// Access log file path (stdout if unset or empty)
    #[serde(default)]
    pub access_log_file: Option<PathBuf>,
    /// Error log file path (stderr if unset or empty)
    #[serde(default)]
    pub error_log_file: Option<PathBuf>,
    /// Size in bytes at which a log file is rotated, 0 disables rotation
    pub max_file_size: u64,
    /// Rotated files kept next to the active one
    pub max_backups: usize,
}

/// Performance configuration, timeouts in seconds (0 disables)
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
    #[serde(default)]
    pub max_connections: Option<usize>,
    pub shutdown_timeout: u64,
}

/// HTTP configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub server_name: String,
    pub max_body_size: u64,
    pub max_header_size: usize,
}

/// Static pages and upload storage
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub static_dir: PathBuf,
    pub upload_dir: PathBuf,
    /// Multipart field carrying the measurement file
    pub upload_field: String,
    pub allowed_extensions: Vec<String>,
}
