//! Protocol codes and error types.
//!
//! - [`Code`]: status codes used to classify every failure
//! - [`DecodeError`]: the request envelope could not be decoded
//! - [`EnvelopeError`]: reading an envelope from a byte source failed
//! - [`HandlerError`]: domain failure raised by a handler

use std::fmt;
use std::io;

use serde::Serialize;

/// RPC status codes.
///
/// The set mirrors the codes used by gRPC and Connect so that failures map
/// cleanly onto HTTP status codes at the transport edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    Ok = 0,
    Canceled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Get the string representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out_of_range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data_loss",
            Code::Unauthenticated => "unauthenticated",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The request bytes do not form a valid envelope.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The bytes are not a well-formed protobuf `Any`: truncated input, a
    /// length prefix pointing past the end of the data, bad wire types.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] prost::DecodeError),

    /// The envelope decoded but carries no type url.
    #[error("envelope has no type url")]
    MissingTypeUrl,

    /// The request body is larger than the configured message limit.
    #[error("envelope exceeds maximum allowed size of {limit} bytes")]
    TooLarge { limit: usize },

    /// [`Envelope::unpack`](crate::Envelope::unpack) was asked for a message
    /// type the envelope does not carry.
    #[error("envelope carries {actual}, expected {expected}")]
    UnexpectedType { expected: String, actual: String },
}

impl DecodeError {
    /// The code a decode failure is reported with.
    pub fn code(&self) -> Code {
        match self {
            DecodeError::TooLarge { .. } => Code::ResourceExhausted,
            _ => Code::InvalidArgument,
        }
    }
}

/// Reading an envelope from a byte source failed.
///
/// I/O failures are kept apart from decode failures: the first means the
/// transport broke, the second means the client sent bad bytes.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("I/O error while reading envelope: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A domain failure raised by a handler.
///
/// The dispatcher never rewrites these: the code and message reach the
/// caller exactly as the handler produced them.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct HandlerError {
    code: Code,
    message: String,
}

impl HandlerError {
    /// Create a new error with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// Create a not found error.
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(Code::NotFound, message)
    }

    /// Create a failed precondition error.
    pub fn failed_precondition<S: Into<String>>(message: S) -> Self {
        Self::new(Code::FailedPrecondition, message)
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }

    /// Get the error code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}
