//! Logger module
//!
//! Provides logging utilities for the collector including:
//! - Server lifecycle logging
//! - Access logging with multiple formats
//! - Leveled error, warning, info and debug messages
//! - Size-rotated log files

mod format;
pub mod writer;

pub use format::AccessLogEntry;
pub use writer::LogLevel;

use crate::config::Config;
use std::net::SocketAddr;
use std::time::Duration;

/// Initialize the logger with configuration
///
/// Should be called once at application startup.
pub fn init(config: &Config) -> std::io::Result<()> {
    writer::init(&config.logging)
}

/// Whether messages at `level` are written
///
/// Before `init` the threshold is `info`.
pub fn enabled(level: LogLevel) -> bool {
    level <= writer::get().map_or(LogLevel::Info, writer::LogWriter::level)
}

/// Write a server log line
fn write_log(level: LogLevel, message: &str) {
    if !enabled(level) {
        return;
    }
    let line = format!(
        "[{}] [{level}] {message}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    match writer::get() {
        Some(w) => w.write_error(&line),
        None if level <= LogLevel::Warn => eprintln!("{line}"),
        None => println!("{line}"),
    }
}

/// Write to access log specifically
fn write_access(message: &str) {
    match writer::get() {
        Some(w) => w.write_access(message),
        None => println!("{message}"),
    }
}

pub fn log_server_start(addr: &SocketAddr, config: &Config) {
    log_info("======================================");
    log_info("Measurement collector started");
    log_info(&format!("Listening on: http://{addr}"));
    log_info(&format!("Log level: {}", config.logging.level));
    if let Some(workers) = config.server.workers {
        log_info(&format!("Worker threads: {workers}"));
    }
    if let Some(max) = config.performance.max_connections {
        log_info(&format!("Max connections: {max}"));
    }
    log_info(&format!(
        "Static pages: {}",
        config.storage.static_dir.display()
    ));
    log_info(&format!(
        "Upload directory: {}",
        config.storage.upload_dir.display()
    ));
    if let Some(ref path) = config.logging.access_log_file {
        log_info(&format!("Access log: {}", path.display()));
    }
    if let Some(ref path) = config.logging.error_log_file {
        log_info(&format!("Error log: {}", path.display()));
    }
    log_info("======================================");
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    log_debug(&format!("[Connection] Accepted from: {peer_addr}"));
}

pub fn log_connection_error(peer_addr: &SocketAddr, err: &impl std::fmt::Display) {
    log_warning(&format!("[Connection] {peer_addr}: {err}"));
}

pub fn log_error(message: &str) {
    write_log(LogLevel::Error, message);
}

pub fn log_warning(message: &str) {
    write_log(LogLevel::Warn, message);
}

pub fn log_info(message: &str) {
    write_log(LogLevel::Info, message);
}

pub fn log_debug(message: &str) {
    write_log(LogLevel::Debug, message);
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    write_access(&entry.format(format));
}

pub fn log_shutdown_started(active_connections: usize) {
    log_info(&format!(
        "[Shutdown] Signal received, no longer accepting. Active connections: {active_connections}"
    ));
}

pub fn log_shutdown_complete(remaining: usize, waited: Duration) {
    if remaining == 0 {
        log_info(&format!(
            "[Shutdown] All connections closed after {}ms",
            waited.as_millis()
        ));
    } else {
        log_warning(&format!(
            "[Shutdown] Timed out after {}s with {remaining} connection(s) still open",
            waited.as_secs()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_threshold_is_info() {
        // Unit tests never call init
        assert!(enabled(LogLevel::Error));
        assert!(enabled(LogLevel::Info));
        assert!(!enabled(LogLevel::Debug));
    }
}
