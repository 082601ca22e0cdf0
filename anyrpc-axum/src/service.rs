//! Mounting the dispatcher on an axum router.
//!
//! [`RpcServiceBuilder`] collects handlers and settings, then produces a
//! [`Router`] with a single `POST` route that feeds each request body to a
//! [`Dispatcher`].
//!
//! ```rust,no_run
//! use anyrpc_axum::RpcServiceBuilder;
//! use bytes::Bytes;
//!
//! # async fn run() -> std::io::Result<()> {
//! let app = RpcServiceBuilder::new()
//!     .route("acme.v1.Ping", |_, _| Ok(Bytes::from_static(b"pong")))
//!     .max_workers(8)
//!     .build();
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await
//! # }
//! ```

use std::time::Duration;

use anyrpc_core::{Envelope, HandlerError, MessageLimits, check_declared_length};
use axum::{
    Router,
    extract::{Request, State},
    routing::post,
};
use bytes::Bytes;
use http::{HeaderMap, header};
use prost::{Message, Name};

use crate::config::DispatchConfig;
use crate::dispatch::Dispatcher;
use crate::error::RpcError;
use crate::handler::{CallContext, RpcHandler};
use crate::registry::{HandlerRegistry, HandlerRegistryBuilder};
use crate::response::RpcResponse;

/// Default route the dispatcher is mounted on.
pub const DEFAULT_PATH: &str = "/rpc";

/// Builder for an axum [`Router`] serving registered handlers.
///
/// Handlers are consulted in the order they are added; the first one that
/// accepts a request's type url handles it.
pub struct RpcServiceBuilder {
    registry: HandlerRegistryBuilder,
    config: DispatchConfig,
    path: String,
}

impl Default for RpcServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcServiceBuilder {
    /// Creates a new builder with no handlers and default settings.
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::builder(),
            config: DispatchConfig::default(),
            path: DEFAULT_PATH.to_owned(),
        }
    }

    /// Register any [`RpcHandler`].
    pub fn handler<H: RpcHandler>(mut self, handler: H) -> Self {
        self.registry = self.registry.handler(handler);
        self
    }

    /// Register a handler for exactly one type url.
    pub fn route<F>(mut self, type_url: impl Into<String>, executor: F) -> Self
    where
        F: Fn(&Envelope, &CallContext) -> Result<Bytes, HandlerError> + Send + Sync + 'static,
    {
        self.registry = self.registry.route(type_url, executor);
        self
    }

    /// Register a handler with an arbitrary type url matcher.
    pub fn matching<M, F>(mut self, matcher: M, executor: F) -> Self
    where
        M: Fn(&str) -> bool + Send + Sync + 'static,
        F: Fn(&Envelope, &CallContext) -> Result<Bytes, HandlerError> + Send + Sync + 'static,
    {
        self.registry = self.registry.matching(matcher, executor);
        self
    }

    /// Register a typed handler for a prost request/response pair.
    ///
    /// Matches on the type name only; the type url's domain is ignored.
    /// See [`HandlerEntry::message`](crate::HandlerEntry::message).
    pub fn message<Req, Resp, F>(mut self, handler: F) -> Self
    where
        Req: Message + Name + Default + 'static,
        Resp: Message + 'static,
        F: Fn(Req, &CallContext) -> Result<Resp, HandlerError> + Send + Sync + 'static,
    {
        self.registry = self.registry.message::<Req, Resp, F>(handler);
        self
    }

    /// Set custom message size limits.
    ///
    /// Default is 4 MB.
    pub fn message_limits(mut self, limits: MessageLimits) -> Self {
        self.config.limits = limits;
        self
    }

    /// Number of requests allowed to execute at once.
    ///
    /// Default is the machine's available parallelism.
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.config.pool.max_workers = max_workers;
        self
    }

    /// Number of requests allowed to wait for a worker before new ones are
    /// rejected with `ResourceExhausted`.
    ///
    /// Unbounded by default.
    pub fn max_queued(mut self, max_queued: usize) -> Self {
        self.config.pool.max_queued = Some(max_queued);
        self
    }

    /// Body chunks buffered per request ahead of the decoder.
    pub fn bridge_capacity(mut self, capacity: usize) -> Self {
        self.config.bridge_capacity = capacity;
        self
    }

    /// Fail requests that take longer than `timeout` with
    /// `DeadlineExceeded`.
    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.config.handler_timeout = Some(timeout);
        self
    }

    /// Route to mount on. Default is `/rpc`.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Build just the dispatcher, for mounting on another transport.
    pub fn build_dispatcher(self) -> Dispatcher {
        Dispatcher::new(self.registry.build(), self.config)
    }

    /// Build the router.
    pub fn build(self) -> Router {
        self.build_with_dispatcher().0
    }

    /// Build the router and keep a handle on its dispatcher, e.g. to call
    /// [`Dispatcher::shutdown`] when the server stops.
    pub fn build_with_dispatcher(self) -> (Router, Dispatcher) {
        let path = self.path.clone();
        let dispatcher = self.build_dispatcher();
        let router = Router::new()
            .route(&path, post(endpoint))
            .with_state(dispatcher.clone());
        (router, dispatcher)
    }
}

async fn endpoint(
    State(dispatcher): State<Dispatcher>,
    request: Request,
) -> Result<RpcResponse, RpcError> {
    if let Some(length) = declared_length(request.headers()) {
        check_declared_length(length, dispatcher.config().limits)?;
    }
    let output = dispatcher.dispatch(request.into_body()).await?;
    Ok(RpcResponse(output))
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}
