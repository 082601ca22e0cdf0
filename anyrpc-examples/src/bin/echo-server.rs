//! Echo server
//!
//! One `POST /rpc` route, three handlers:
//! - `anyrpc.example.v1.EchoRequest` (typed): echoes the message back
//! - `anyrpc.example.v1.SleepRequest` (typed): blocks a worker, honouring cancellation
//! - `anyrpc.example.v1.RawEcho` (raw): returns the payload bytes untouched
//!
//! Run with: cargo run --bin echo-server
//! Then: cargo run --bin echo-client

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyrpc_axum::prelude::*;
use anyrpc_examples::{
    EchoRequest, EchoResponse, RAW_ECHO_TYPE_URL, SleepRequest, SleepResponse, server_addr,
};
use tokio::signal;
use tracing_subscriber::{EnvFilter, fmt};

const SLEEP_STEP: Duration = Duration::from_millis(10);

fn sleep(req: SleepRequest, cx: &CallContext) -> Result<SleepResponse, HandlerError> {
    let target = Duration::from_millis(req.millis);
    let started = Instant::now();
    while started.elapsed() < target {
        if cx.is_cancelled() {
            return Err(HandlerError::new(Code::Canceled, "sleep interrupted"));
        }
        std::thread::sleep(SLEEP_STEP.min(target - started.elapsed().min(target)));
    }
    Ok(SleepResponse {
        slept_millis: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let handled = Arc::new(AtomicU64::new(0));
    let echo = move |req: EchoRequest, _: &CallContext| -> Result<EchoResponse, HandlerError> {
        let handled = handled.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(EchoResponse {
            message: req.message,
            handled,
        })
    };

    let (app, dispatcher) = RpcServiceBuilder::new()
        .message::<EchoRequest, EchoResponse, _>(echo)
        .message::<SleepRequest, SleepResponse, _>(sleep)
        .route(RAW_ECHO_TYPE_URL, |env, _| Ok(env.payload().clone()))
        .max_queued(1024)
        .handler_timeout(Duration::from_secs(2))
        .build_with_dispatcher();

    let addr = server_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, handlers = ?dispatcher.registry(), "echo server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    dispatcher.shutdown();
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
    tracing::info!("shutdown signal received, draining connections");
}
