//! Routing module
//!
//! Ordered route table resolving a (method, path) pair to a handler and
//! its captured path parameters.

mod table;

pub use table::{Route, RouteError, RouteTable};
