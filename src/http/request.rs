//! Request reader module
//!
//! Pulls the request line, headers and a size-bounded body out of an
//! inbound request. The declared `Content-Length` is checked against the
//! configured maximum before a single body byte is read.

use std::fmt::Display;
use std::net::SocketAddr;
use std::num::IntErrorKind;

use http_body_util::BodyExt;
use hyper::body::{Body, Bytes};
use hyper::header::CONTENT_LENGTH;
use hyper::http::request::Parts;
use hyper::{HeaderMap, Method, StatusCode};

/// Default limit on the declared body length, in bytes
pub const DEFAULT_MAX_BODY_SIZE: u64 = 10_000_000;

/// Peer address of the connection, stored in the request extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr(pub SocketAddr);

/// Reasons a request body cannot be handed to a handler
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    #[error("declared body of {declared} bytes exceeds the {max} byte limit")]
    TooLarge { declared: u64, max: u64 },
    #[error("invalid Content-Length value '{0}'")]
    InvalidContentLength(String),
    #[error("request body is not valid UTF-8")]
    InvalidEncoding,
    #[error("failed to read request body: {0}")]
    Body(String),
}

impl ReadError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::InvalidContentLength(_) | Self::InvalidEncoding | Self::Body(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }

    /// Message sent to the client in the `error` field
    pub const fn message(&self) -> &'static str {
        match self {
            Self::TooLarge { .. } => "Request too large",
            Self::InvalidContentLength(_) => "Invalid Content-Length",
            Self::InvalidEncoding => "Invalid encoding",
            Self::Body(_) => "Bad request",
        }
    }
}

/// Request line and headers, as seen by handlers
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
}

impl RequestHead {
    pub fn from_parts(parts: &Parts) -> Self {
        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(ToString::to_string),
            headers: parts.headers.clone(),
            remote_addr: parts.extensions.get::<PeerAddr>().map(|peer| peer.0),
        }
    }

    /// Header value by case-insensitive name, if it is valid text
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Only these methods get their body read
pub fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Declared body length; a missing header or a negative value means no body
///
/// Over a socket hyper answers a non-numeric `Content-Length` with its own
/// bare 400 before dispatch, so `InvalidContentLength` is only produced for
/// requests handed to the dispatcher directly.
pub fn content_length(headers: &HeaderMap) -> Result<u64, ReadError> {
    let Some(value) = headers.get(CONTENT_LENGTH) else {
        return Ok(0);
    };
    let text = value.to_str().map_err(|_| {
        ReadError::InvalidContentLength(String::from_utf8_lossy(value.as_bytes()).into_owned())
    })?;

    match text.trim().parse::<i64>() {
        Ok(length) => Ok(u64::try_from(length).unwrap_or(0)),
        Err(e) => match e.kind() {
            // Too big to represent is still a valid number, just over any limit
            IntErrorKind::PosOverflow => Ok(u64::MAX),
            IntErrorKind::NegOverflow => Ok(0),
            _ => Err(ReadError::InvalidContentLength(text.to_string())),
        },
    }
}

/// Read the body of a request, bounded by `max_body_size`
///
/// Returns `Ok(None)` for methods that carry no body and for an absent or
/// non-positive `Content-Length`.
pub async fn read_body<B>(
    method: &Method,
    headers: &HeaderMap,
    body: B,
    max_body_size: u64,
) -> Result<Option<String>, ReadError>
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    if !carries_body(method) {
        return Ok(None);
    }

    let declared = content_length(headers)?;
    if declared > max_body_size {
        return Err(ReadError::TooLarge {
            declared,
            max: max_body_size,
        });
    }
    if declared == 0 {
        return Ok(None);
    }

    let bytes = read_bounded(body, declared).await?;
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|_| ReadError::InvalidEncoding)
}

/// Read at most `limit` bytes; a body that ends early yields what arrived
async fn read_bounded<B>(body: B, limit: u64) -> Result<Vec<u8>, ReadError>
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    let mut body = std::pin::pin!(body);
    let mut buf = Vec::with_capacity(limit.min(64 * 1024));

    while buf.len() < limit {
        match body.frame().await {
            Some(Ok(frame)) => {
                if let Ok(data) = frame.into_data() {
                    let take = data.len().min(limit - buf.len());
                    buf.extend_from_slice(&data[..take]);
                }
            }
            Some(Err(e)) => return Err(ReadError::Body(e.to_string())),
            None => break,
        }
    }
    Ok(buf)
}
