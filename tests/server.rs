//! Accept loop tests over real TCP connections

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;

use sse_dispatch::config::PerformanceConfig;
use sse_dispatch::handler::demo;
use sse_dispatch::server::{self, ServerContext};
use sse_dispatch::{Call, Dispatcher, HandlerResult};

struct TestServer {
    addr: SocketAddr,
    shutdown: Arc<Notify>,
    task: tokio::task::JoinHandle<()>,
}

async fn spawn_server(stream_timeout: u64, max_connections: Option<u64>) -> TestServer {
    let mut routes = demo::default_routes().unwrap();
    routes
        .add_route("GET", r"^/explode$", |call: Call| async move {
            call.stream.start()?;
            call.stream.write_chunk("about to fail").await?;
            if call.params.is_empty() {
                panic!("streaming handler fault");
            }
            let result: HandlerResult = Ok(None);
            result
        })
        .unwrap();

    let listener = server::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = listener.local_addr().unwrap();
    let performance = PerformanceConfig {
        stream_timeout,
        max_connections,
    };
    let ctx = Arc::new(ServerContext::new(Dispatcher::new(routes), &performance));
    let shutdown = Arc::new(Notify::new());
    let task = tokio::spawn(server::start_server_loop(
        listener,
        ctx,
        Arc::clone(&shutdown),
    ));

    TestServer {
        addr,
        shutdown,
        task,
    }
}

/// Send a raw request and read until the server closes the connection
async fn roundtrip(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut buf = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut buf))
        .await
        .expect("server did not close the connection")
        .unwrap();
    String::from_utf8(buf).unwrap()
}

fn post(path: &str, body: &str) -> String {
    format!(
        "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
}

fn get(path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn serves_json_reply_and_closes() {
    let server = spawn_server(30, None).await;

    let response = roundtrip(server.addr, &post("/send", r#"{"variable":"x"}"#)).await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.to_ascii_lowercase().contains("content-type: application/json"));
    assert!(response.ends_with(r#"{"variable":"x"}"#), "{response}");

    server.shutdown.notify_one();
    server.task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn streams_events_over_the_wire() {
    let server = spawn_server(30, None).await;

    let response = roundtrip(server.addr, &get("/countdown/2")).await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response
        .to_ascii_lowercase()
        .contains("content-type: text/event-stream; charset=utf-8"));
    assert!(response.contains("id: 1\nevent: tick\ndata: {\"remaining\":2}\n\n"));
    assert!(response.contains("id: 2\nevent: tick\ndata: {\"remaining\":1}\n\n"));
    assert!(response.contains("event: complete\ndata: {}\n\n"));

    server.shutdown.notify_one();
    server.task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn active_stream_runs_past_the_idle_ceiling() {
    // Ticks every 200ms for about 1.8s against a 1s ceiling
    let server = spawn_server(1, None).await;

    let response = roundtrip(server.addr, &get("/countdown/10")).await;
    assert_eq!(response.matches("event: tick").count(), 10, "{response}");
    assert!(response.contains("id: 10\nevent: tick\ndata: {\"remaining\":1}\n\n"));
    assert!(response.contains("event: complete\ndata: {}\n\n"), "{response}");

    server.shutdown.notify_one();
    server.task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn faulting_stream_does_not_affect_other_connections() {
    let server = spawn_server(30, None).await;

    let explode_request = get("/explode");
    let hello_request = post("/hello", "");
    let (faulted, healthy) = tokio::join!(
        roundtrip(server.addr, &explode_request),
        roundtrip(server.addr, &hello_request),
    );

    assert!(faulted.contains("data: about to fail\n\n"), "{faulted}");
    assert!(faulted.contains("event: complete\ndata: {}\n\n"), "{faulted}");
    assert!(healthy.starts_with("HTTP/1.1 200 OK\r\n"), "{healthy}");
    assert!(healthy.contains("Hello from rust API"));

    // The server is still accepting afterwards
    let response = roundtrip(server.addr, &get("/missing")).await;
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"), "{response}");
    assert!(response.ends_with(r#"{"error":"Route not found"}"#));

    server.shutdown.notify_one();
    server.task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversized_declared_body_gets_413() {
    let server = spawn_server(30, None).await;

    // Declares far more than it sends; the server must answer without waiting for it
    let raw = "POST /send HTTP/1.1\r\nHost: localhost\r\nContent-Length: 20000000\r\n\r\n{}";
    let response = roundtrip(server.addr, raw).await;
    assert!(
        response.starts_with("HTTP/1.1 413 Payload Too Large\r\n"),
        "{response}"
    );
    assert!(response.ends_with(r#"{"error":"Request too large"}"#));

    server.shutdown.notify_one();
    server.task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn over_limit_connections_are_dropped() {
    let server = spawn_server(30, Some(0)).await;

    // The socket is closed without a reply; a reset is as good as EOF here
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let _ = stream.write_all(get("/missing").as_bytes()).await;
    let mut buf = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut buf))
        .await
        .expect("server did not close the connection");
    assert!(read.is_err() || buf.is_empty(), "{buf:?}");

    server.shutdown.notify_one();
    server.task.await.unwrap();
}
