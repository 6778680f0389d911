use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Notify;

use sse_dispatch::config::{Args, Config};
use sse_dispatch::handler::demo;
use sse_dispatch::logger;
use sse_dispatch::server::{self, ServerContext, ServerError};

fn main() -> ExitCode {
    let args = Args::parse();

    let cfg = match Config::load(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            logger::log_error(&ServerError::from(e).to_string());
            return ExitCode::FAILURE;
        }
    };

    let log_file = match logger::init(&cfg) {
        Ok(path) => path,
        Err(e) => {
            logger::log_error(&format!("Failed to open log file: {e}"));
            None
        }
    };
    if cfg.debug_enabled() {
        logger::log_debug("Debug mode enabled");
    }

    // 创建 Tokio 运行时，根据 workers 配置设置线程数
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = match runtime_builder.build() {
        Ok(runtime) => runtime,
        Err(e) => {
            logger::log_error(&format!("Failed to start runtime: {e}"));
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(async_main(cfg, log_file)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            logger::log_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

async fn async_main(
    cfg: Config,
    log_file: Option<std::path::PathBuf>,
) -> Result<(), ServerError> {
    let addr = cfg.get_socket_addr().map_err(ServerError::Address)?;
    let routes = demo::default_routes()?;
    let listener = server::bind(addr)?;

    logger::log_server_start(&addr, &cfg, log_file.as_ref());
    for route in routes.routes() {
        logger::log_debug(&format!("Route registered: {route:?}"));
    }

    let shutdown = Arc::new(Notify::new());
    server::start_signal_handler(Arc::clone(&shutdown));

    let ctx = Arc::new(ServerContext::from_config(routes, &cfg));
    server::start_server_loop(listener, ctx, shutdown).await;

    logger::log_info("Server stopped");
    Ok(())
}
