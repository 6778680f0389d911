// Server module entry point
// Listener creation, the accept loop and per-connection tasks

pub mod connection;
pub mod listener;
pub mod signal;

// Rust 不允许 loop 作为模块名（关键字），改用 server_loop
#[path = "loop.rs"]
pub mod server_loop;

use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, PerformanceConfig};
use crate::handler::Dispatcher;
use crate::routing::{RouteError, RouteTable};

// Re-export commonly used items
pub use listener::create_listener;
pub use server_loop::start_server_loop;
pub use signal::start_signal_handler;

/// Startup failures; each one ends the process with a non-zero status
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] ::config::ConfigError),
    #[error("{0}")]
    Address(String),
    #[error("Invalid route table: {0}")]
    Routes(#[from] RouteError),
    #[error("Port {port} already in use")]
    PortInUse { port: u16 },
    #[error("Failed to start server: {0}")]
    Bind(#[source] std::io::Error),
}

/// State shared by every connection task
#[derive(Debug)]
pub struct ServerContext {
    pub dispatcher: Arc<Dispatcher>,
    pub stream_timeout: Duration,
    pub max_connections: Option<u64>,
    pub active_connections: AtomicUsize,
}

impl ServerContext {
    /// Shared state; the stream timeout becomes the dispatcher's idle ceiling
    pub fn new(dispatcher: Dispatcher, performance: &PerformanceConfig) -> Self {
        let stream_timeout = Duration::from_secs(performance.stream_timeout);
        Self {
            dispatcher: Arc::new(dispatcher.with_stream_timeout(stream_timeout)),
            stream_timeout,
            max_connections: performance.max_connections,
            active_connections: AtomicUsize::new(0),
        }
    }

    /// Dispatcher over `routes` with the configured body limit
    pub fn from_config(routes: RouteTable, config: &Config) -> Self {
        let dispatcher = Dispatcher::new(routes).with_max_body_size(config.http.max_body_size);
        Self::new(dispatcher, &config.performance)
    }
}

/// Bind the listening socket, mapping failures to startup errors
pub fn bind(addr: SocketAddr) -> Result<tokio::net::TcpListener, ServerError> {
    create_listener(addr).map_err(|e| {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            ServerError::PortInUse { port: addr.port() }
        } else {
            ServerError::Bind(e)
        }
    })
}
