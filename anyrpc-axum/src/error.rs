//! Dispatch failures and their HTTP rendering.
//!
//! Every failed request ends in exactly one [`RpcError`]. The variant says
//! *where* it failed (decoding, lookup, the handler, or the machinery
//! around the handler); [`RpcError::code`] says how it is reported.

use std::io;

use anyrpc_core::{Code, DecodeError, EnvelopeError, HandlerError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::pool::PoolError;

/// Type-erased error, as used by `http_body` and `tower`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a request failed.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The request body is not a valid envelope.
    #[error("failed to decode request envelope: {0}")]
    Decode(#[source] DecodeError),

    /// No registered handler accepts the envelope's type url.
    #[error("did not find inbound handler for {type_url}")]
    NoHandlerFound { type_url: String },

    /// The handler ran and reported a domain failure.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// Something other than the handler's own logic failed: the transport
    /// broke, the pool refused the work, the handler panicked or ran out of
    /// time.
    #[error("{message}")]
    Execution {
        code: Code,
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

/// A handler panicked. Kept as the source of the resulting [`RpcError`].
#[derive(Debug, thiserror::Error)]
#[error("handler panicked: {message}")]
pub struct HandlerPanic {
    message: String,
}

impl HandlerPanic {
    /// The panic payload, if it was a string.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl RpcError {
    /// An execution failure with no underlying cause.
    pub fn execution(code: Code, message: impl Into<String>) -> Self {
        RpcError::Execution {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// An execution failure wrapping `source`.
    pub fn execution_with_source(
        code: Code,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        RpcError::Execution {
            code,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The code this failure is reported with.
    pub fn code(&self) -> Code {
        match self {
            RpcError::Decode(err) => err.code(),
            RpcError::NoHandlerFound { .. } => Code::Unimplemented,
            RpcError::Handler(err) => err.code(),
            RpcError::Execution { code, .. } => *code,
        }
    }

    /// Whether the caller is at fault: a bad envelope or an unknown type.
    pub fn is_client_error(&self) -> bool {
        matches!(self, RpcError::Decode(_) | RpcError::NoHandlerFound { .. })
    }

    /// Whether the failure came from the machinery around the handler.
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, RpcError::Execution { .. })
    }

    /// HTTP status for this failure.
    pub fn http_status(&self) -> StatusCode {
        http_status_code(self.code())
    }
}

impl From<DecodeError> for RpcError {
    fn from(err: DecodeError) -> Self {
        RpcError::Decode(err)
    }
}

impl From<EnvelopeError> for RpcError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Decode(err) => RpcError::Decode(err),
            EnvelopeError::Io(err) => io_failure(err),
        }
    }
}

impl From<PoolError> for RpcError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Saturated { .. } => {
                RpcError::execution_with_source(Code::ResourceExhausted, "worker pool saturated", err)
            }
            PoolError::ShutDown => {
                RpcError::execution_with_source(Code::Unavailable, "worker pool is shut down", err)
            }
            PoolError::Join(join) if join.is_panic() => {
                let panic = HandlerPanic {
                    message: panic_message(join.into_panic()),
                };
                RpcError::execution_with_source(Code::Internal, panic.to_string(), panic)
            }
            PoolError::Join(join) => {
                RpcError::execution_with_source(Code::Canceled, "worker task was cancelled", join)
            }
        }
    }
}

fn io_failure(err: io::Error) -> RpcError {
    RpcError::execution_with_source(Code::Internal, "I/O error while reading request", err)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Convert a code to an HTTP status code.
pub fn http_status_code(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::Canceled => StatusCode::REQUEST_TIMEOUT,
        Code::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::DeadlineExceeded => StatusCode::REQUEST_TIMEOUT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists => StatusCode::CONFLICT,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::FailedPrecondition => StatusCode::BAD_REQUEST,
        Code::Aborted => StatusCode::CONFLICT,
        Code::OutOfRange => StatusCode::BAD_REQUEST,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
    }
}

/// JSON body of an error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: Code,
    pub message: String,
}

impl From<&RpcError> for ErrorBody {
    fn from(err: &RpcError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        (self.http_status(), Json(ErrorBody::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::error::Error as _;

    #[test]
    fn test_codes() {
        assert_eq!(
            RpcError::from(DecodeError::MissingTypeUrl).code(),
            Code::InvalidArgument
        );
        assert_eq!(
            RpcError::from(DecodeError::TooLarge { limit: 1 }).code(),
            Code::ResourceExhausted
        );
        assert_eq!(
            RpcError::NoHandlerFound {
                type_url: "x".into()
            }
            .code(),
            Code::Unimplemented
        );
        assert_eq!(
            RpcError::from(HandlerError::not_found("gone")).code(),
            Code::NotFound
        );
    }

    #[test]
    fn test_client_error_classification() {
        assert!(RpcError::from(DecodeError::MissingTypeUrl).is_client_error());
        assert!(
            RpcError::NoHandlerFound {
                type_url: "x".into()
            }
            .is_client_error()
        );
        assert!(!RpcError::from(HandlerError::internal("boom")).is_client_error());
        assert!(!RpcError::execution(Code::Internal, "boom").is_client_error());
    }

    #[test]
    fn test_io_error_keeps_source() {
        let io = io::Error::new(io::ErrorKind::ConnectionReset, "peer reset");
        let err = RpcError::from(EnvelopeError::Io(io));

        assert!(err.is_execution_failure());
        assert_eq!(err.code(), Code::Internal);
        let source = err.source().unwrap();
        let io = source.downcast_ref::<io::Error>().unwrap();
        assert_eq!(io.kind(), io::ErrorKind::ConnectionReset);
    }

    #[test]
    fn test_handler_error_passes_through() {
        let err = RpcError::from(HandlerError::failed_precondition("account frozen"));
        assert_eq!(err.to_string(), "failed_precondition: account frozen");
        assert_eq!(err.http_status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_no_handler_message_carries_type_url() {
        let err = RpcError::NoHandlerFound {
            type_url: "type.googleapis.com/acme.Unknown".into(),
        };
        assert_eq!(
            err.to_string(),
            "did not find inbound handler for type.googleapis.com/acme.Unknown"
        );
    }

    #[test]
    fn test_pool_errors() {
        let err = RpcError::from(PoolError::ShutDown);
        assert_eq!(err.code(), Code::Unavailable);
        assert_eq!(err.http_status(), StatusCode::SERVICE_UNAVAILABLE);

        let err = RpcError::from(PoolError::Saturated { queued: 3 });
        assert_eq!(err.code(), Code::ResourceExhausted);
    }

    #[tokio::test]
    async fn test_panic_is_kept_as_source() {
        let join = tokio::task::spawn_blocking(|| panic!("ledger corrupted"))
            .await
            .unwrap_err();
        let err = RpcError::from(PoolError::Join(join));

        assert!(err.is_execution_failure());
        assert_eq!(err.code(), Code::Internal);
        assert_eq!(err.to_string(), "handler panicked: ledger corrupted");
        let panic = err.source().unwrap().downcast_ref::<HandlerPanic>().unwrap();
        assert_eq!(panic.message(), "ledger corrupted");
    }

    #[tokio::test]
    async fn test_into_response() {
        let response = RpcError::NoHandlerFound {
            type_url: "acme.Unknown".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "unimplemented");
        assert_eq!(
            json["message"],
            "did not find inbound handler for acme.Unknown"
        );
    }
}
