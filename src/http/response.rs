//! HTTP response building module
//!
//! Provides the response body type shared by buffered and streaming replies,
//! and builders for buffered JSON replies and the fixed error responses.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use http_body_util::Full;
use hyper::body::{Body, Bytes, Frame, SizeHint};
use hyper::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde_json::{json, Value};

use super::sse::EventStream;

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const TEXT_CONTENT_TYPE: &str = "text/plain";

/// Body of every response the server produces
#[derive(Debug)]
pub enum ReplyBody {
    /// Buffered reply written in one piece
    Full(Full<Bytes>),
    /// Server-Sent Events fed by a `StreamWriter`
    Stream(EventStream),
}

impl ReplyBody {
    pub fn empty() -> Self {
        Self::Full(Full::new(Bytes::new()))
    }

    pub const fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}

impl Body for ReplyBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Full(body) => Pin::new(body).poll_frame(cx),
            Self::Stream(stream) => Pin::new(stream).poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Full(body) => body.is_end_stream(),
            Self::Stream(stream) => stream.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            Self::Full(body) => body.size_hint(),
            Self::Stream(stream) => stream.size_hint(),
        }
    }
}

/// Objects and arrays are sent as JSON, everything else as text
pub const fn is_structured(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

/// Compact JSON for structured values, the literal text otherwise
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Build the single buffered reply of a connection
pub fn build_reply(status: StatusCode, value: &Value) -> Response<ReplyBody> {
    let content_type = if is_structured(value) {
        JSON_CONTENT_TYPE
    } else {
        TEXT_CONTENT_TYPE
    };
    let data = Bytes::from(render_value(value));

    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_LENGTH, data.len())
        .header(CONNECTION, "close")
        .body(ReplyBody::Full(Full::new(data)))
        .unwrap_or_else(|e| {
            log_build_error(status, &e);
            Response::new(ReplyBody::empty())
        })
}

/// Build a `{"error": message}` reply
pub fn error_response(status: StatusCode, message: &str) -> Response<ReplyBody> {
    build_reply(status, &json!({ "error": message }))
}

/// Build 500 Internal Server Error response
pub fn internal_error_response() -> Response<ReplyBody> {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

/// Log response build error
fn log_build_error(status: StatusCode, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}
