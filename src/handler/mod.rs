//! Request handler module
//!
//! Defines the handler contract, the dispatcher that drives a request
//! through reading, routing, the handler and finalisation, and the
//! demonstration handlers shipped with the server.
//!
//! A handler is any `Fn(Call) -> impl Future<Output = HandlerResult>`.
//! It either returns a [`Reply`] to be sent as the single buffered
//! response, or opens the stream on [`Call::stream`] and returns
//! `Ok(None)` once it is done writing.

pub mod demo;
pub mod dispatch;

pub use dispatch::Dispatcher;

use std::future::Future;
use std::pin::Pin;

use hyper::{Response, StatusCode};
use serde_json::{json, Value};

use crate::http::{self, ReplyBody, RequestHead, StreamError, StreamWriter};
use crate::logger;

/// Everything a handler is given for one request
#[derive(Debug)]
pub struct Call {
    pub request: RequestHead,
    pub stream: StreamWriter,
    pub body: Option<String>,
    /// Captured path parameters, in pattern order
    pub params: Vec<String>,
}

/// A buffered reply: status plus a JSON value
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

impl Reply {
    pub fn new(status: StatusCode, body: impl Into<Value>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Value>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    /// `{"error": message}` with the given status
    pub fn error(status: StatusCode, message: &str) -> Self {
        Self::new(status, json!({ "error": message }))
    }

    pub fn into_response(self) -> Response<ReplyBody> {
        http::build_reply(self.status, &self.body)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The peer went away or stopped reading while a frame was being written
    pub const fn is_disconnect(&self) -> bool {
        match self {
            Self::Stream(err) => err.is_disconnect(),
            Self::Internal(_) => false,
        }
    }
}

/// `Some(reply)` for a buffered response, `None` when the handler streamed
pub type HandlerResult = Result<Option<Reply>, HandlerError>;

pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// A request handler stored in the route table
pub trait Handler: Send + Sync + 'static {
    fn call(&self, call: Call) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(Call) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, call: Call) -> HandlerFuture {
        Box::pin(self(call))
    }
}

/// Fallback for requests no route matches
pub async fn not_found(call: Call) -> HandlerResult {
    logger::log_debug(&format!(
        "Handling not_found for {} {}",
        call.request.method, call.request.path
    ));
    Ok(Some(Reply::error(StatusCode::NOT_FOUND, "Route not found")))
}
