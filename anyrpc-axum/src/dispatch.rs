//! The dispatcher.
//!
//! One request flows through here as:
//!
//! ```text
//! request body ──pipe_body──▶ bridge ──▶ [worker] read_envelope
//!                                                  │
//!                                     registry.find(type_url)
//!                                                  │
//!                                           handler.execute
//!                                                  │
//!                            response sink ◀── bytes | RpcError ──▶ failure sink
//! ```
//!
//! Everything to the right of the bridge runs as a single task on the
//! [`WorkerPool`]; the async side only moves body chunks and waits.

use std::sync::Arc;

use anyrpc_core::{Code, read_envelope};
use bytes::Bytes;
use http_body::Body;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bridge::{self, BridgeReader};
use crate::config::DispatchConfig;
use crate::error::{BoxError, RpcError};
use crate::handler::CallContext;
use crate::pool::WorkerPool;
use crate::registry::HandlerRegistry;
use crate::sink::{FailureSink, ResponseSink};

/// Routes request envelopes to registered handlers. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    registry: HandlerRegistry,
    pool: WorkerPool,
    config: DispatchConfig,
}

impl Dispatcher {
    /// Create a dispatcher with its own worker pool.
    pub fn new(registry: HandlerRegistry, config: DispatchConfig) -> Self {
        tracing::debug!(
            target: "anyrpc_axum",
            handlers = registry.len(),
            max_workers = config.pool.max_workers,
            "dispatcher created"
        );
        Self {
            inner: Arc::new(Inner {
                pool: WorkerPool::new(config.pool),
                registry,
                config,
            }),
        }
    }

    /// The registered handlers.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    /// The configuration this dispatcher was built with.
    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    /// The worker pool requests execute on.
    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// Decode one envelope from `body`, run the first handler that accepts
    /// it, and return the handler's output.
    ///
    /// Dropping the returned future cancels the call: a request still
    /// waiting for a worker never runs, and a running handler sees
    /// [`CallContext::is_cancelled`] turn true.
    pub async fn dispatch<B>(&self, body: B) -> Result<Bytes, RpcError>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError> + Send,
    {
        let cancellation = CancellationToken::new();
        // Fires when the call ends for any reason, including the caller
        // dropping this future.
        let _cancel_on_exit = cancellation.clone().drop_guard();

        let result = match self.inner.config.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.run(body, &cancellation)).await {
                Ok(result) => result,
                Err(_) => Err(RpcError::execution(
                    Code::DeadlineExceeded,
                    format!("request did not complete within {limit:?}"),
                )),
            },
            None => self.run(body, &cancellation).await,
        };

        match &result {
            Ok(output) => {
                tracing::trace!(target: "anyrpc_axum", bytes = output.len(), "request completed");
            }
            Err(err @ RpcError::Handler(_)) => {
                tracing::debug!(target: "anyrpc_axum", code = %err.code(), error = %err, "handler failed");
            }
            Err(err) if err.is_client_error() => {
                tracing::warn!(target: "anyrpc_axum", code = %err.code(), error = %err, "rejected request");
            }
            Err(err) => {
                tracing::error!(target: "anyrpc_axum", code = %err.code(), error = %err, "request execution failed");
            }
        }
        result
    }

    async fn run<B>(&self, body: B, cancellation: &CancellationToken) -> Result<Bytes, RpcError>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError> + Send,
    {
        let (writer, reader) = bridge::channel(self.inner.config.bridge_capacity);
        let registry = self.inner.registry.clone();
        let config = self.inner.config;
        let cx = CallContext::new(cancellation.clone());

        let job = move || execute(reader, &registry, &config, &cx);
        let ((), result) = tokio::join!(bridge::pipe_body(body, writer), self.inner.pool.run(job));
        result?
    }

    /// Dispatch `body` in the background and report the outcome to exactly
    /// one of `response` or `failure`.
    ///
    /// Returns immediately. Must be called from within a tokio runtime.
    pub fn handle<B, R, F>(&self, body: B, response: R, failure: F) -> JoinHandle<()>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError> + Send,
        R: ResponseSink,
        F: FailureSink,
    {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            match dispatcher.dispatch(body).await {
                Ok(output) => response.end(output),
                Err(err) => failure.report_failure(err),
            }
        })
    }

    /// Stop accepting requests. Requests already executing finish; queued
    /// and later requests fail with `Unavailable`.
    pub fn shutdown(&self) {
        self.inner.pool.shutdown();
    }
}

/// The blocking half of a call. Runs on a worker thread.
fn execute(
    reader: BridgeReader,
    registry: &HandlerRegistry,
    config: &DispatchConfig,
    cx: &CallContext,
) -> Result<Bytes, RpcError> {
    let envelope = read_envelope(reader, config.limits)?;

    if cx.is_cancelled() {
        return Err(RpcError::execution(
            Code::Canceled,
            "request cancelled before dispatch",
        ));
    }

    let Some(handler) = registry.find(envelope.type_url()) else {
        return Err(RpcError::NoHandlerFound {
            type_url: envelope.type_url().to_owned(),
        });
    };

    tracing::debug!(
        target: "anyrpc_axum",
        handler = handler.name(),
        type_url = envelope.type_url(),
        payload_bytes = envelope.payload().len(),
        "dispatching request"
    );
    Ok(handler.execute(&envelope, cx)?)
}
