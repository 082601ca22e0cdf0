//! Where a dispatch result goes.
//!
//! [`Dispatcher::handle`](crate::Dispatcher::handle) reports each request
//! through exactly one of two sinks. Both are consumed by the call, so
//! neither can fire twice.

use bytes::Bytes;

use crate::error::RpcError;

/// Receives the complete response body of a successful request.
pub trait ResponseSink: Send + 'static {
    /// Write `body` and end the response.
    fn end(self, body: Bytes);
}

/// Receives the failure of a failed request.
pub trait FailureSink: Send + 'static {
    /// Report `error` to the caller.
    fn report_failure(self, error: RpcError);
}

impl<F> ResponseSink for F
where
    F: FnOnce(Bytes) + Send + 'static,
{
    fn end(self, body: Bytes) {
        self(body)
    }
}

impl<F> FailureSink for F
where
    F: FnOnce(RpcError) + Send + 'static,
{
    fn report_failure(self, error: RpcError) {
        self(error)
    }
}
