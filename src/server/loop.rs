// Server loop module
// Accepts connections until shutdown is requested

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Notify;

use super::connection::accept_connection;
use super::ServerContext;
use crate::logger;

/// Accept connections until `shutdown` is notified.
///
/// Accept errors are logged and the loop keeps going; no single connection
/// can stop the server.
pub async fn start_server_loop(listener: TcpListener, ctx: Arc<ServerContext>, shutdown: Arc<Notify>) {
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &ctx);
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            () = shutdown.notified() => {
                logger::log_info("Shutdown requested");
                break;
            }
        }
    }

    // Dropping the listener stops new accepts; open connections finish on their own tasks
    drop(listener);
}
