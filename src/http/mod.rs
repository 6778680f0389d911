//! HTTP protocol layer module
//!
//! Request reading, buffered replies and the Server-Sent Events writer,
//! decoupled from routing and handler logic.

pub mod request;
pub mod response;
pub mod sse;

// Re-export commonly used types
pub use request::{read_body, PeerAddr, ReadError, RequestHead, DEFAULT_MAX_BODY_SIZE};
pub use response::{build_reply, error_response, internal_error_response, ReplyBody};
pub use sse::{Event, EventStream, PendingResponse, StreamError, StreamWriter};
