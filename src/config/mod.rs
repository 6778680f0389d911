// Configuration module entry point
// Layers the config file, environment variables and command-line overrides

mod cli;
mod types;

use std::net::SocketAddr;

use crate::logger::Level;

// Re-export public types
pub use cli::Args;
pub use types::{Config, HttpConfig, LoggingConfig, PerformanceConfig, ServerConfig};

/// Config file looked up when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "config";

/// Prefix of environment overrides, e.g. `SSE_SERVER__PORT=6000`
pub const ENV_PREFIX: &str = "SSE";

impl Config {
    /// Load configuration for the given command line
    pub fn load(args: &Args) -> Result<Self, ::config::ConfigError> {
        let mut config = Self::load_from(&args.config)?;
        config.apply_args(args);
        Ok(config)
    }

    /// Load configuration from specified file path (without extension)
    pub fn load_from(config_path: &str) -> Result<Self, ::config::ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(config_path).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 5001)?
            .set_default("logging.level", "warn")?
            .set_default("http.max_body_size", 10_000_000)?
            .set_default("performance.stream_timeout", 1800)?
            .build()?;

        settings.try_deserialize()
    }

    /// Command-line values win over every other layer
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = &args.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if args.debug {
            "debug".clone_into(&mut self.logging.level);
        }
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }

    /// Configured log level, `warn` when the value is not recognised
    pub fn log_level(&self) -> Level {
        self.logging.level.parse().unwrap_or(Level::Warn)
    }

    pub fn debug_enabled(&self) -> bool {
        matches!(self.log_level(), Level::Debug)
    }
}
