//! Response types.
use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;

/// Content type of successful responses.
pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

/// A successful response: the handler's output, written verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcResponse(pub Bytes);

impl RpcResponse {
    /// Extract the response body.
    pub fn into_inner(self) -> Bytes {
        self.0
    }
}

impl From<Bytes> for RpcResponse {
    fn from(body: Bytes) -> Self {
        RpcResponse(body)
    }
}

impl IntoResponse for RpcResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.0));
        *response.status_mut() = StatusCode::OK;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(PROTOBUF_CONTENT_TYPE),
        );
        response
    }
}
