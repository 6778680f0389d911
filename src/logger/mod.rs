//! Logger module
//!
//! Provides logging utilities for the server including:
//! - Level filtering (error, warn, info, debug)
//! - Server lifecycle logging
//! - Access logging for dispatched requests
//! - Optional file output next to the console

mod format;
pub mod writer;

pub use format::{format_line, AccessLogEntry, Level, ParseLevelError};

use crate::config::Config;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};

/// Log file setting value that triggers automatic location discovery
pub const AUTO_LOG_FILE: &str = "auto";

static MAX_LEVEL: AtomicU8 = AtomicU8::new(Level::Warn.as_u8());

/// Initialize the logger with configuration
///
/// Should be called once at application startup. Returns the path of the
/// log file in use, if any.
pub fn init(config: &Config) -> std::io::Result<Option<PathBuf>> {
    set_level(config.log_level());

    let log_writer = match config.logging.log_file.as_deref() {
        None => writer::LogWriter::console(),
        Some(AUTO_LOG_FILE) => {
            let found = writer::first_writable(&writer::auto_log_candidates());
            if found.file_path().is_none() {
                println!("Unable to create a log file, using console output only.");
            }
            found
        }
        Some(path) => writer::LogWriter::with_file(path.as_ref())?,
    };
    let path = log_writer.file_path().map(PathBuf::from);
    writer::install(log_writer)?;
    Ok(path)
}

pub fn set_level(level: Level) {
    MAX_LEVEL.store(level.as_u8(), Ordering::Relaxed);
}

/// Most verbose level currently written
pub fn level() -> Level {
    Level::from_u8(MAX_LEVEL.load(Ordering::Relaxed))
}

pub fn enabled(level: Level) -> bool {
    passes(level, self::level())
}

/// Whether a line at `level` is written when `max` is the configured level
const fn passes(level: Level, max: Level) -> bool {
    level.as_u8() <= max.as_u8()
}

fn write(level: Level, message: &str) {
    if !enabled(level) {
        return;
    }
    let line = format_line(&chrono::Local::now(), level, message);
    match writer::get() {
        Some(w) => w.write(level, &line),
        None => writer::LogWriter::console().write(level, &line),
    }
}

pub fn log_error(message: &str) {
    write(Level::Error, message);
}

pub fn log_warning(message: &str) {
    write(Level::Warn, message);
}

pub fn log_info(message: &str) {
    write(Level::Info, message);
}

pub fn log_debug(message: &str) {
    write(Level::Debug, message);
}

pub fn log_server_start(addr: &SocketAddr, config: &Config, log_file: Option<&PathBuf>) {
    log_info(&format!("Streaming server starting on {addr}"));
    log_info(&format!("Log level: {}", config.log_level()));
    if let Some(workers) = config.server.workers {
        log_info(&format!("Worker threads: {workers}"));
    }
    if let Some(path) = log_file {
        log_info(&format!("Log file: {}", path.display()));
    }
    log_info(&format!(
        "Max body size: {} bytes, stream timeout: {}s",
        config.http.max_body_size, config.performance.stream_timeout
    ));
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    log_debug(&format!("[Connection] Accepted from: {peer_addr}"));
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    log_debug(&format!("[Connection] Failed to serve connection: {err:?}"));
}

/// Log one dispatched request
pub fn log_access(entry: &AccessLogEntry) {
    log_info(&entry.format());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        assert!(passes(Level::Info, Level::Debug));
        assert!(passes(Level::Debug, Level::Debug));

        assert!(passes(Level::Error, Level::Error));
        assert!(!passes(Level::Warn, Level::Error));
        assert!(!passes(Level::Debug, Level::Error));

        assert!(passes(Level::Warn, Level::Warn));
        assert!(!passes(Level::Info, Level::Warn));
    }
}
