//! Log line format module
//!
//! Every line written by the logger has the shape
//! `<timestamp> - <LEVEL> - <message>`. Access lines put a
//! common-log style request summary in the message part.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use chrono::{DateTime, Local};

/// Severity of a log line, ordered from most to least severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

impl Level {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARNING",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }

    pub(crate) const fn as_u8(self) -> u8 {
        match self {
            Self::Error => 0,
            Self::Warn => 1,
            Self::Info => 2,
            Self::Debug => 3,
        }
    }

    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Error,
            1 => Self::Warn,
            2 => Self::Info,
            _ => Self::Debug,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a level name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level '{0}' (expected error, warn, info or debug)")]
pub struct ParseLevelError(String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

/// Render a single log line
pub fn format_line(time: &DateTime<Local>, level: Level, message: &str) -> String {
    format!(
        "{} - {} - {message}",
        time.format("%Y-%m-%d %H:%M:%S%.3f"),
        level.as_str()
    )
}

/// Summary of one dispatched request
#[derive(Debug, Clone)]
pub struct AccessLogEntry {
    pub remote_addr: Option<SocketAddr>,
    pub method: String,
    pub path: String,
    pub status: u16,
    /// Whether the reply was an SSE stream rather than a buffered body
    pub streaming: bool,
}

impl AccessLogEntry {
    /// `$remote_addr "$method $path" $status [stream]`
    pub fn format(&self) -> String {
        let remote = self
            .remote_addr
            .map_or_else(|| "-".to_string(), |addr| addr.to_string());
        let kind = if self.streaming { " stream" } else { "" };
        format!(
            "{remote} \"{} {}\" {}{kind}",
            self.method, self.path, self.status
        )
    }
}
