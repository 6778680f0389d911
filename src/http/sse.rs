//! Server-Sent Events stream writer
//!
//! A handler that wants to push incremental output instead of one buffered
//! reply opens the stream with [`StreamWriter::start`], sends frames with
//! [`StreamWriter::write_chunk`] or [`StreamWriter::write_event`], and
//! closes it with [`StreamWriter::end`].
//!
//! # Frame format
//!
//! ```text
//! id: <id>\n          (only when an id is set)
//! event: <type>\n     (only when the type is non-empty)
//! data: <payload>\n   (one line per payload line)
//! \n
//! ```
//!
//! Objects and arrays are encoded as compact JSON, other values as their
//! literal text.
//!
//! # Lifecycle
//!
//! `idle -> streaming -> closed`. The response head is handed to the
//! connection on `start`; a reply sent by the dispatcher claims the same
//! slot, so at most one of the two can ever reach the client.
//!
//! # Idle ceiling
//!
//! A writer built with [`StreamWriter::with_idle_timeout`] bounds the gap
//! between frames on both sides of the channel. A handler that stays silent
//! past the ceiling gets its stream closed with the `complete` frame; a
//! client that stops draining makes the pending write fail with
//! [`StreamError::TimedOut`]. A stream that keeps sending is never cut off.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use hyper::body::{Body, Bytes, Frame};
use hyper::header::{HeaderValue, CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Sleep};

use super::response::{render_value, ReplyBody};
use crate::logger;

pub const DEFAULT_CONTENT_TYPE: &str = "text/event-stream; charset=utf-8";
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// Frame written by [`StreamWriter::end`]
pub const COMPLETE_FRAME: &str = "event: complete\ndata: {}\n\n";

/// Frames queued between the handler and the connection
const FRAME_BUFFER: usize = 16;

/// Receiving side of the response slot bound to a [`StreamWriter`]
pub type PendingResponse = oneshot::Receiver<Response<ReplyBody>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("Stream not started")]
    NotStarted,
    #[error("Stream already started")]
    AlreadyStarted,
    #[error("Stream already closed")]
    Closed,
    #[error("Client disconnected")]
    Disconnected,
    #[error("Client stopped reading for longer than the idle timeout")]
    TimedOut,
    #[error("Invalid stream head: {0}")]
    InvalidHead(String),
}

impl StreamError {
    /// The peer is gone or no longer reading
    pub const fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected | Self::TimedOut)
    }
}

/// A single SSE frame
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    data: Value,
    event_type: String,
    id: Option<String>,
}

impl Event {
    /// Event of type `message` without an id
    pub fn new(data: impl Into<Value>) -> Self {
        Self {
            data: data.into(),
            event_type: DEFAULT_EVENT_TYPE.to_string(),
            id: None,
        }
    }

    /// Set the event type; an empty type omits the `event:` line
    #[must_use]
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Encode as wire text, terminated by the blank line
    pub fn encode(&self) -> String {
        let mut frame = String::new();
        if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
            frame.push_str("id: ");
            frame.push_str(id);
            frame.push('\n');
        }
        if !self.event_type.is_empty() {
            frame.push_str("event: ");
            frame.push_str(&self.event_type);
            frame.push('\n');
        }
        // A raw newline would end the field early, so each line gets its own `data:`
        for line in render_value(&self.data).split('\n') {
            frame.push_str("data: ");
            frame.push_str(line);
            frame.push('\n');
        }
        frame.push('\n');
        frame
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Streaming,
    Closed,
}

#[derive(Debug)]
struct StreamState {
    phase: Phase,
    slot: Option<oneshot::Sender<Response<ReplyBody>>>,
    frames: Option<mpsc::Sender<Bytes>>,
    idle_timeout: Option<Duration>,
}

/// Per-request handle to the streaming side of a connection
///
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct StreamWriter {
    state: Arc<Mutex<StreamState>>,
}

impl StreamWriter {
    /// Create an idle writer bound to a fresh response slot
    pub fn new() -> (Self, PendingResponse) {
        Self::with_idle_timeout(None)
    }

    /// Like [`StreamWriter::new`], with a ceiling on the gap between frames
    pub fn with_idle_timeout(idle_timeout: Option<Duration>) -> (Self, PendingResponse) {
        let (slot, pending) = oneshot::channel();
        let writer = Self {
            state: Arc::new(Mutex::new(StreamState {
                phase: Phase::Idle,
                slot: Some(slot),
                frames: None,
                idle_timeout,
            })),
        };
        (writer, pending)
    }

    fn lock(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().phase == Phase::Streaming
    }

    /// Whether the response slot has been used, by a stream or a reply
    pub fn is_committed(&self) -> bool {
        self.lock().slot.is_none()
    }

    /// Open the stream with status 200 and `text/event-stream`
    pub fn start(&self) -> Result<(), StreamError> {
        self.start_with(StatusCode::OK, DEFAULT_CONTENT_TYPE)
    }

    pub fn start_with(&self, status: StatusCode, content_type: &str) -> Result<(), StreamError> {
        let content_type = HeaderValue::from_str(content_type)
            .map_err(|e| StreamError::InvalidHead(e.to_string()))?;

        let mut state = self.lock();
        if state.phase != Phase::Idle {
            return Err(StreamError::AlreadyStarted);
        }
        let Some(slot) = state.slot.take() else {
            return Err(StreamError::AlreadyStarted);
        };

        let (frames, receiver) = mpsc::channel(FRAME_BUFFER);
        let response = Response::builder()
            .status(status)
            .header(CONTENT_TYPE, content_type)
            .header(CACHE_CONTROL, "no-cache")
            .header(CONNECTION, "keep-alive")
            .body(ReplyBody::Stream(EventStream::new(receiver, state.idle_timeout)))
            .map_err(|e| StreamError::InvalidHead(e.to_string()))?;

        if slot.send(response).is_err() {
            state.phase = Phase::Closed;
            logger::log_debug("Client disconnected before the stream started");
            return Err(StreamError::Disconnected);
        }
        state.phase = Phase::Streaming;
        state.frames = Some(frames);
        Ok(())
    }

    /// Send `data` as a `message` event
    pub async fn write_chunk(&self, data: impl Into<Value>) -> Result<(), StreamError> {
        self.write_event(&Event::new(data)).await
    }

    /// Send one frame, handing it to the connection immediately
    pub async fn write_event(&self, event: &Event) -> Result<(), StreamError> {
        let (frames, idle_timeout) = {
            let state = self.lock();
            match state.phase {
                Phase::Idle => return Err(StreamError::NotStarted),
                Phase::Closed => return Err(StreamError::Closed),
                Phase::Streaming => (state.frames.clone(), state.idle_timeout),
            }
        };
        let Some(frames) = frames else {
            return Err(StreamError::Closed);
        };

        let result = send_frame(&frames, Bytes::from(event.encode()), idle_timeout).await;
        if let Err(err) = &result {
            self.close();
            logger::log_debug(&format!("Stream closed during streaming: {err}"));
        }
        result
    }

    /// Write the `complete` frame and close the stream
    ///
    /// No-op unless streaming. A client that is already gone is ignored.
    pub async fn end(&self) {
        let (frames, idle_timeout) = {
            let mut state = self.lock();
            if state.phase != Phase::Streaming {
                return;
            }
            state.phase = Phase::Closed;
            (state.frames.take(), state.idle_timeout)
        };
        let Some(frames) = frames else {
            return;
        };

        let complete = Bytes::from_static(COMPLETE_FRAME.as_bytes());
        if let Err(err) = send_frame(&frames, complete, idle_timeout).await {
            logger::log_debug(&format!("Stream termination skipped: {err}"));
        }
    }

    /// Send a buffered reply through the response slot
    ///
    /// Returns `false` without sending when the slot was already used.
    pub(crate) fn respond(&self, response: Response<ReplyBody>) -> bool {
        let mut state = self.lock();
        if state.phase != Phase::Idle {
            return false;
        }
        let Some(slot) = state.slot.take() else {
            return false;
        };
        state.phase = Phase::Closed;
        slot.send(response).is_ok()
    }

    fn close(&self) {
        let mut state = self.lock();
        state.phase = Phase::Closed;
        state.frames = None;
    }
}

/// Queue one frame, waiting at most `idle_timeout` for the client to make room
async fn send_frame(
    frames: &mpsc::Sender<Bytes>,
    frame: Bytes,
    idle_timeout: Option<Duration>,
) -> Result<(), StreamError> {
    let sent = match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, frames.send(frame))
            .await
            .map_err(|_| StreamError::TimedOut)?,
        None => frames.send(frame).await,
    };
    sent.map_err(|_| StreamError::Disconnected)
}

/// Deadline reset on every frame handed to the connection
#[derive(Debug)]
struct IdleTimer {
    limit: Duration,
    sleep: Pin<Box<Sleep>>,
}

/// Response body draining the frames queued by a [`StreamWriter`]
///
/// Ends once the writer has closed the stream, or with a `complete` frame
/// when no frame arrived within the idle ceiling. Dropping it is how a
/// vanished client shows up on the writer side.
#[derive(Debug)]
pub struct EventStream {
    frames: mpsc::Receiver<Bytes>,
    idle: Option<IdleTimer>,
    expired: bool,
}

impl EventStream {
    fn new(frames: mpsc::Receiver<Bytes>, idle_timeout: Option<Duration>) -> Self {
        let idle = idle_timeout.map(|limit| IdleTimer {
            limit,
            sleep: Box::pin(tokio::time::sleep(limit)),
        });
        Self {
            frames,
            idle,
            expired: false,
        }
    }
}

impl Body for EventStream {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.expired {
            return Poll::Ready(None);
        }

        if let Poll::Ready(frame) = this.frames.poll_recv(cx) {
            if let Some(idle) = &mut this.idle {
                idle.sleep.as_mut().reset(Instant::now() + idle.limit);
            }
            return Poll::Ready(frame.map(|data| Ok(Frame::data(data))));
        }

        if let Some(idle) = &mut this.idle {
            if idle.sleep.as_mut().poll(cx).is_ready() {
                logger::log_warning(&format!("Stream idle for {:?}, closing", idle.limit));
                this.expired = true;
                // Later writes fail as a disconnect
                this.frames.close();
                return Poll::Ready(Some(Ok(Frame::data(Bytes::from_static(
                    COMPLETE_FRAME.as_bytes(),
                )))));
            }
        }
        Poll::Pending
    }

    fn is_end_stream(&self) -> bool {
        self.expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::json;

    async fn collect(response: Response<ReplyBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_event_encoding() {
        assert_eq!(
            Event::new(json!({"n": 1})).encode(),
            "event: message\ndata: {\"n\":1}\n\n"
        );
        assert_eq!(
            Event::new("tick").event_type("progress").id("7").encode(),
            "id: 7\nevent: progress\ndata: tick\n\n"
        );
        assert_eq!(Event::new(3.5).event_type("").encode(), "data: 3.5\n\n");
        assert_eq!(Event::new("x").id("").encode(), "event: message\ndata: x\n\n");
    }

    #[test]
    fn test_multiline_payload_splits_data_lines() {
        assert_eq!(
            Event::new("line one\nline two").encode(),
            "event: message\ndata: line one\ndata: line two\n\n"
        );
    }

    #[tokio::test]
    async fn test_write_before_start_fails() {
        let (writer, _pending) = StreamWriter::new();
        assert_eq!(
            writer.write_chunk("early").await,
            Err(StreamError::NotStarted)
        );
        assert!(!writer.is_streaming());
    }

    #[tokio::test]
    async fn test_start_sends_stream_head() {
        let (writer, pending) = StreamWriter::new();
        writer.start().unwrap();
        assert!(writer.is_streaming());
        assert!(writer.is_committed());

        let response = pending.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], DEFAULT_CONTENT_TYPE);
        assert_eq!(response.headers()[CACHE_CONTROL], "no-cache");
        assert_eq!(response.headers()[CONNECTION], "keep-alive");
        assert!(response.body().is_stream());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let (writer, _pending) = StreamWriter::new();
        writer.start().unwrap();
        assert_eq!(writer.start(), Err(StreamError::AlreadyStarted));
    }

    #[tokio::test]
    async fn test_full_stream_lifecycle() {
        let (writer, pending) = StreamWriter::new();
        writer.start().unwrap();
        let response = pending.await.unwrap();

        let producer = tokio::spawn(async move {
            writer.write_chunk(json!({"n": 1})).await.unwrap();
            writer.end().await;
            assert!(!writer.is_streaming());
            assert_eq!(writer.write_chunk("late").await, Err(StreamError::Closed));
        });

        assert_eq!(
            collect(response).await,
            "event: message\ndata: {\"n\":1}\n\nevent: complete\ndata: {}\n\n"
        );
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn test_end_is_idempotent() {
        let (writer, pending) = StreamWriter::new();
        writer.start().unwrap();
        let response = pending.await.unwrap();

        writer.end().await;
        writer.end().await;
        drop(writer);

        assert_eq!(collect(response).await, COMPLETE_FRAME);
    }

    #[tokio::test]
    async fn test_end_without_start_is_noop() {
        let (writer, pending) = StreamWriter::new();
        writer.end().await;
        assert!(!writer.is_committed());
        drop(writer);
        assert!(pending.await.is_err());
    }

    #[tokio::test]
    async fn test_disconnect_closes_stream() {
        let (writer, pending) = StreamWriter::new();
        writer.start().unwrap();
        drop(pending.await.unwrap());

        assert_eq!(
            writer.write_chunk("nobody listening").await,
            Err(StreamError::Disconnected)
        );
        assert!(!writer.is_streaming());
        // Ending after a disconnect writes nothing and does not fail
        writer.end().await;
    }

    #[tokio::test]
    async fn test_start_after_client_gone() {
        let (writer, pending) = StreamWriter::new();
        drop(pending);
        assert_eq!(writer.start(), Err(StreamError::Disconnected));
        assert!(!writer.is_streaming());
    }

    #[tokio::test]
    async fn test_reply_claims_slot() {
        let (writer, pending) = StreamWriter::new();
        assert!(writer.respond(Response::new(ReplyBody::empty())));
        assert_eq!(writer.start(), Err(StreamError::AlreadyStarted));
        assert!(!writer.respond(Response::new(ReplyBody::empty())));
        assert!(!pending.await.unwrap().body().is_stream());
    }

    #[tokio::test]
    async fn test_active_stream_outlives_idle_ceiling() {
        let (writer, pending) = StreamWriter::with_idle_timeout(Some(Duration::from_millis(300)));
        writer.start().unwrap();
        let response = pending.await.unwrap();

        // Six frames 100ms apart keep the stream open well past the ceiling
        let producer = tokio::spawn(async move {
            for n in 0..6 {
                tokio::time::sleep(Duration::from_millis(100)).await;
                writer.write_chunk(json!({ "n": n })).await.unwrap();
            }
            writer.end().await;
        });

        let text = collect(response).await;
        assert_eq!(text.matches("event: message").count(), 6, "{text}");
        assert!(text.ends_with(COMPLETE_FRAME));
        assert_eq!(text.matches("event: complete").count(), 1);
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_stream_closed_after_ceiling() {
        let (writer, pending) = StreamWriter::with_idle_timeout(Some(Duration::from_millis(100)));
        writer.start().unwrap();
        writer.write_chunk("first").await.unwrap();
        let response = pending.await.unwrap();

        assert_eq!(
            collect(response).await,
            format!("event: message\ndata: first\n\n{COMPLETE_FRAME}")
        );
        assert_eq!(
            writer.write_chunk("too late").await,
            Err(StreamError::Disconnected)
        );
        assert!(!writer.is_streaming());
    }

    #[tokio::test]
    async fn test_stalled_client_times_out_write() {
        let (writer, pending) = StreamWriter::with_idle_timeout(Some(Duration::from_millis(100)));
        writer.start().unwrap();
        // Held but never polled, like a client that stopped reading
        let _response = pending.await.unwrap();

        for _ in 0..FRAME_BUFFER {
            writer.write_chunk("queued").await.unwrap();
        }
        let err = writer.write_chunk("blocked").await.unwrap_err();
        assert_eq!(err, StreamError::TimedOut);
        assert!(err.is_disconnect());
        assert!(!writer.is_streaming());
    }

    #[tokio::test]
    async fn test_reply_refused_once_streaming() {
        let (writer, _pending) = StreamWriter::new();
        writer.start().unwrap();
        assert!(!writer.respond(Response::new(ReplyBody::empty())));
        assert!(writer.is_streaming());
    }
}
