//! Log writer module
//!
//! Thread-safe log output to the console plus an optional log file.
//! Errors and warnings go to stderr, everything else to stdout.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};

use super::format::Level;

/// Global log writer instance
static LOG_WRITER: OnceLock<LogWriter> = OnceLock::new();

/// File name used when the log file location is discovered automatically
pub const AUTO_LOG_FILE_NAME: &str = "sse-dispatch.log";

/// Thread-safe log writer
pub struct LogWriter {
    file: Option<(PathBuf, Mutex<File>)>,
}

impl LogWriter {
    /// Writer that only prints to the console
    pub const fn console() -> Self {
        Self { file: None }
    }

    /// Writer that also appends to the file at `path`
    pub fn with_file(path: &Path) -> io::Result<Self> {
        let file = open_log_file(path)?;
        Ok(Self {
            file: Some((path.to_path_buf(), Mutex::new(file))),
        })
    }

    /// Path of the log file, if one is open
    pub fn file_path(&self) -> Option<&Path> {
        self.file.as_ref().map(|(path, _)| path.as_path())
    }

    pub fn write(&self, level: Level, line: &str) {
        match level {
            Level::Error | Level::Warn => eprintln!("{line}"),
            Level::Info | Level::Debug => println!("{line}"),
        }
        if let Some((_, file)) = &self.file {
            let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = writeln!(file, "{line}");
        }
    }
}

/// Open or create a log file for appending
fn open_log_file(path: &Path) -> io::Result<File> {
    // Create parent directories if they don't exist
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    OpenOptions::new().create(true).append(true).open(path)
}

/// Candidate locations tried in order when the log file is set to `auto`
pub fn auto_log_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(AUTO_LOG_FILE_NAME)];
    if let Some(home) = std::env::var_os("HOME") {
        candidates.push(Path::new(&home).join(AUTO_LOG_FILE_NAME));
    }
    candidates.push(std::env::temp_dir().join(AUTO_LOG_FILE_NAME));
    candidates
}

/// Open the first candidate that can be opened, or fall back to console only
pub fn first_writable(candidates: &[PathBuf]) -> LogWriter {
    candidates
        .iter()
        .find_map(|path| LogWriter::with_file(path).ok())
        .unwrap_or_else(LogWriter::console)
}

/// Install the global log writer
///
/// Should be called once at application startup.
pub fn install(writer: LogWriter) -> io::Result<()> {
    LOG_WRITER.set(writer).map_err(|_| {
        io::Error::new(
            io::ErrorKind::AlreadyExists,
            "Log writer already initialized",
        )
    })
}

/// Get the global log writer, if one has been installed
pub fn get() -> Option<&'static LogWriter> {
    LOG_WRITER.get()
}
