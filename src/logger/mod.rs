//! Logger module
//!
//! Logging utilities for the engine:
//! - Server lifecycle and route registration lines
//! - Per-request access logging in several formats
//! - Error and warning lines
//! - File-based logging support

mod format;
pub mod writer;

pub use format::{AccessFormat, AccessLogEntry};
pub use writer::Level;

use std::net::SocketAddr;

use crate::config::Config;

/// Initialize the logger from configuration
///
/// Should be called once at application startup.
pub fn init(config: &Config) -> std::io::Result<()> {
    let access_format = if config.logging.access_log {
        let format = config
            .logging
            .access_log_format
            .parse::<AccessFormat>()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        Some(format)
    } else {
        None
    };

    writer::init(
        Level::parse(&config.logging.level),
        config.logging.access_log_file.as_deref(),
        config.logging.error_log_file.as_deref(),
        access_format,
    )
}

fn write(level: Level, message: &str) {
    match writer::get() {
        Some(w) => w.write(level, message),
        None if level == Level::Info => println!("{message}"),
        None => eprintln!("{message}"),
    }
}

pub fn log_server_start(addr: &SocketAddr, routes: usize) {
    write(Level::Info, "======================================");
    write(Level::Info, "gee engine started");
    write(Level::Info, &format!("Listening on: http://{addr}"));
    write(Level::Info, &format!("Registered routes: {routes}"));
    write(Level::Info, "======================================");
}

pub fn log_route_registered(method: &str, pattern: &str) {
    write(Level::Info, &format!("[Route] {method:>4} - {pattern}"));
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    write(Level::Error, &format!("[ERROR] Failed to serve connection: {err:?}"));
}

pub fn log_accept_error(err: &std::io::Error) {
    write(Level::Error, &format!("[ERROR] Failed to accept connection: {err}"));
}

pub fn log_error(message: &str) {
    write(Level::Error, &format!("[ERROR] {message}"));
}

pub fn log_warning(message: &str) {
    write(Level::Warn, &format!("[WARN] {message}"));
}

/// Format configured for access logging, if enabled
#[must_use]
pub fn access_format() -> Option<AccessFormat> {
    writer::get().and_then(writer::LogWriter::access_format)
}

pub fn log_access(entry: &AccessLogEntry, format: AccessFormat) {
    if let Some(w) = writer::get() {
        w.write_access(&entry.format(format));
    }
}
