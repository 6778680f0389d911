// Connection handling module
// Accepts a single TCP connection and serves it on its own task

use std::convert::Infallible;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};

use super::ServerContext;
use crate::http::PeerAddr;
use crate::logger;

/// Accept a connection, checking the connection limit.
///
/// Returns `false` when the connection was refused.
pub fn accept_connection(
    stream: tokio::net::TcpStream,
    peer_addr: std::net::SocketAddr,
    ctx: &Arc<ServerContext>,
) -> bool {
    // Increment counter first, then check limit (prevents race condition)
    let prev_count = ctx.active_connections.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = ctx.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            // Exceeded limit: rollback counter and reject
            ctx.active_connections.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection rejected."
            ));
            drop(stream);
            return false;
        }
    }

    logger::log_connection_accepted(&peer_addr);
    handle_connection(stream, peer_addr, Arc::clone(ctx));
    true
}

/// Serve one connection in a spawned task.
///
/// Waiting for a request head is bounded by the stream timeout; open streams
/// enforce the same value as their idle ceiling. The connection counter is
/// decremented when the task ends.
fn handle_connection(
    stream: tokio::net::TcpStream,
    peer_addr: std::net::SocketAddr,
    ctx: Arc<ServerContext>,
) {
    tokio::spawn(async move {
        let io = TokioIo::new(stream);

        let dispatcher = Arc::clone(&ctx.dispatcher);
        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .header_read_timeout(ctx.stream_timeout);
        let conn = builder.serve_connection(
            io,
            service_fn(move |mut req| {
                req.extensions_mut().insert(PeerAddr(peer_addr));
                let dispatcher = Arc::clone(&dispatcher);
                async move { Ok::<_, Infallible>(dispatcher.dispatch(req).await) }
            }),
        );

        if let Err(err) = conn.await {
            logger::log_connection_error(&err);
        }

        ctx.active_connections.fetch_sub(1, Ordering::SeqCst);
    });
}
