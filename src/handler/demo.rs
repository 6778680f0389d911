//! Demonstration handlers
//!
//! The routes the server binary ships with: a greeting, a JSON echo of the
//! `variable` field, and a countdown streamed as Server-Sent Events.

use std::time::Duration;

use hyper::StatusCode;
use serde_json::{json, Value};

use super::{Call, HandlerResult, Reply};
use crate::http::Event;
use crate::logger;
use crate::routing::{RouteError, RouteTable};

/// Largest countdown the streaming demo accepts
pub const MAX_COUNTDOWN: u64 = 100;

const COUNTDOWN_INTERVAL: Duration = Duration::from_millis(200);

/// Route table served by the binary
pub fn default_routes() -> Result<RouteTable, RouteError> {
    let mut routes = RouteTable::new();
    routes
        .add_route("POST", r"^/hello$", hello)?
        .add_route("POST", r"^/send$", send_and_get_data)?
        .add_route("GET", r"^/countdown/(\d+)$", countdown)?;
    Ok(routes)
}

pub async fn hello(_call: Call) -> HandlerResult {
    logger::log_debug("Handling hello");
    Ok(Some(Reply::ok(json!({ "message": "Hello from rust API" }))))
}

/// Echo the `variable` field of a JSON body
pub async fn send_and_get_data(call: Call) -> HandlerResult {
    logger::log_debug(&format!(
        "Handling send_and_get_data with body: {:?}",
        call.body
    ));

    let Some(body) = call.body.as_deref() else {
        logger::log_error("No request body provided");
        return Ok(Some(Reply::error(
            StatusCode::BAD_REQUEST,
            "No request body provided",
        )));
    };

    let data: Value = match serde_json::from_str(body) {
        Ok(data) => data,
        Err(e) => {
            logger::log_error(&format!("Invalid JSON format in request body: {e}"));
            return Ok(Some(Reply::error(
                StatusCode::BAD_REQUEST,
                "Invalid JSON format in request body",
            )));
        }
    };

    let variable = data
        .get("variable")
        .cloned()
        .unwrap_or_else(|| Value::from("default_value"));
    Ok(Some(Reply::ok(json!({ "variable": variable }))))
}

/// Stream `n` tick events counting down to zero
pub async fn countdown(call: Call) -> HandlerResult {
    let from = match call.params.first().map(|n| n.parse::<u64>()) {
        Some(Ok(n)) if n <= MAX_COUNTDOWN => n,
        _ => {
            return Ok(Some(Reply::error(
                StatusCode::BAD_REQUEST,
                "Countdown must be between 0 and 100",
            )))
        }
    };

    call.stream.start()?;
    for (id, remaining) in (1..=from).rev().enumerate() {
        if id > 0 {
            tokio::time::sleep(COUNTDOWN_INTERVAL).await;
        }
        let event = Event::new(json!({ "remaining": remaining }))
            .event_type("tick")
            .id((id + 1).to_string());
        call.stream.write_event(&event).await?;
    }
    call.stream.end().await;
    Ok(None)
}
