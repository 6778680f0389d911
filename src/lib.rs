//! HTTP request server with ordered pattern routing and Server-Sent Events.
//!
//! A request is read with a bounded body, resolved against a [`RouteTable`],
//! and handed to a handler that either returns one JSON reply or streams
//! events through a [`StreamWriter`]. The [`Dispatcher`] makes sure every
//! connection ends with exactly one of the two.

pub mod config;
pub mod handler;
pub mod http;
pub mod logger;
pub mod routing;
pub mod server;

pub use handler::{Call, Dispatcher, Handler, HandlerError, HandlerResult, Reply};
pub use http::{Event, StreamError, StreamWriter};
pub use routing::RouteTable;
