//! Request dispatch module
//!
//! Drives one request through body reading, route resolution, the handler
//! and finalisation. Every request ends in exactly one terminal action:
//! a single buffered reply, or one stream lifecycle.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::{Body, Bytes};
use hyper::{Request, Response};
use tokio::task::JoinError;

use super::{Call, Handler, HandlerError, HandlerResult};
use crate::http::{self, ReplyBody, RequestHead, StreamWriter, DEFAULT_MAX_BODY_SIZE};
use crate::logger::{self, AccessLogEntry};
use crate::routing::RouteTable;

/// Routes requests to handlers and finalises their connections
#[derive(Debug)]
pub struct Dispatcher {
    routes: Arc<RouteTable>,
    max_body_size: u64,
    stream_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(routes: RouteTable) -> Self {
        Self {
            routes: Arc::new(routes),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            stream_timeout: None,
        }
    }

    #[must_use]
    pub const fn with_max_body_size(mut self, max_body_size: u64) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Idle ceiling handed to every stream this dispatcher opens
    #[must_use]
    pub const fn with_stream_timeout(mut self, stream_timeout: Duration) -> Self {
        self.stream_timeout = Some(stream_timeout);
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Handle one request and produce its response head
    ///
    /// For a streaming handler the returned response carries the open
    /// event stream, while the handler keeps writing on its own task.
    pub async fn dispatch<B>(&self, req: Request<B>) -> Response<ReplyBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Display,
    {
        let (parts, body) = req.into_parts();

        let body =
            match http::read_body(&parts.method, &parts.headers, body, self.max_body_size).await {
                Ok(body) => body,
                Err(err) => {
                    logger::log_error(&format!(
                        "Rejected {} {}: {err}",
                        parts.method,
                        parts.uri.path()
                    ));
                    return http::error_response(err.status(), err.message());
                }
            };

        let head = RequestHead::from_parts(&parts);
        let (handler, params) = self.routes.resolve(head.method.as_str(), &head.path);
        let mut entry = AccessLogEntry {
            remote_addr: head.remote_addr,
            method: head.method.to_string(),
            path: head.path.clone(),
            status: 0,
            streaming: false,
        };

        let (stream, pending) = StreamWriter::with_idle_timeout(self.stream_timeout);
        let call = Call {
            request: head,
            stream: stream.clone(),
            body,
            params,
        };
        tokio::spawn(run_handler(handler, call, stream));

        let response = pending.await.unwrap_or_else(|_| {
            logger::log_error("Handler task ended without a response");
            http::internal_error_response()
        });
        entry.status = response.status().as_u16();
        entry.streaming = response.body().is_stream();
        logger::log_access(&entry);
        response
    }
}

/// Run the handler on its own task, then finalise the connection
async fn run_handler(handler: Arc<dyn Handler>, call: Call, stream: StreamWriter) {
    let outcome = tokio::spawn(async move { handler.call(call).await }).await;
    finalize(outcome, &stream);
    // Cleanup runs on every path; a no-op unless a stream is still open
    stream.end().await;
}

fn finalize(outcome: Result<HandlerResult, JoinError>, stream: &StreamWriter) {
    match outcome {
        Ok(Ok(Some(reply))) => {
            if !stream.respond(reply.into_response()) {
                logger::log_debug("Handler reply dropped: the stream already answered");
            }
        }
        Ok(Ok(None)) => {
            if !stream.is_committed() {
                logger::log_warning("Handler returned no reply and opened no stream");
                stream.respond(http::internal_error_response());
            }
        }
        Ok(Err(err)) if err.is_disconnect() => {
            logger::log_debug(&format!("Stream ended early: {err}"));
        }
        Ok(Err(err)) => fail(stream, &err),
        Err(err) => fail(stream, &HandlerError::internal(format!("handler panicked: {err}"))),
    }
}

/// A fault becomes a 500 unless the stream already owns the connection
fn fail(stream: &StreamWriter, err: &HandlerError) {
    logger::log_error(&format!("Handler error: {err}"));
    if !stream.is_streaming() {
        stream.respond(http::internal_error_response());
    }
}
