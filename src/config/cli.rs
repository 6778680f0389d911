// Command-line arguments
// Overrides applied on top of the file and environment layers

use clap::Parser;

/// HTTP server with route dispatch and Server-Sent Events streaming
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "sse-dispatch", version, about)]
pub struct Args {
    /// Configuration file path (without extension)
    #[arg(long, default_value = super::DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Host address
    #[arg(long)]
    pub host: Option<String>,

    /// Port number
    #[arg(long)]
    pub port: Option<u16>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}
