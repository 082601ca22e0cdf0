//! # anyrpc-axum
//!
//! Dispatch self-describing protobuf envelopes to registered handlers.
//!
//! A request body carries one `google.protobuf.Any`: a type url plus opaque
//! payload bytes. The dispatcher decodes it on a worker thread, hands it to
//! the first registered handler that accepts the type url, and returns the
//! handler's bytes verbatim as the response body.
//!
//! ## Features
//!
//! - **Off the I/O path:** decoding and handlers run on a bounded worker pool
//!   while the request body streams in through a push-to-pull [`bridge`].
//! - **First match wins:** handlers are matched in registration order by exact
//!   type url, by predicate, or by prost message type.
//! - **Precise failures:** every failed request ends in exactly one
//!   [`RpcError`] which maps to an HTTP status and a JSON body.
//! - **Axum-native:** [`RpcServiceBuilder`] produces a plain [`axum::Router`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use anyrpc_axum::prelude::*;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let (app, dispatcher) = RpcServiceBuilder::new()
//!     .message::<prost_types::Duration, prost_types::Duration, _>(|d, _cx| Ok(d))
//!     .build_with_dispatcher();
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! dispatcher.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod pool;
pub mod registry;
pub mod response;
pub mod service;
pub mod sink;

pub use config::DispatchConfig;
pub use dispatch::Dispatcher;
pub use error::{HandlerPanic, RpcError};
pub use handler::{CallContext, HandlerEntry, RpcHandler};
pub use registry::{HandlerRegistry, HandlerRegistryBuilder};
pub use response::{PROTOBUF_CONTENT_TYPE, RpcResponse};
pub use service::RpcServiceBuilder;
pub use sink::{FailureSink, ResponseSink};

// Re-export several crates
pub use anyrpc_core;
pub use prost;

pub mod prelude {
    //! A prelude for `anyrpc-axum` providing the most common types.
    pub use crate::dispatch::Dispatcher;
    pub use crate::error::RpcError;
    pub use crate::handler::{CallContext, RpcHandler};
    pub use crate::response::RpcResponse;
    pub use crate::service::RpcServiceBuilder;
    pub use anyrpc_core::{Code, Envelope, HandlerError, MessageLimits};
}
