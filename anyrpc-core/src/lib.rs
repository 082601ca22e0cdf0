//! Core protocol types for anyrpc.
//!
//! This crate holds the transport-agnostic pieces shared by the server
//! runtime (`anyrpc-axum`) and by clients that build requests by hand.
//!
//! ## Contents
//!
//! - [`Envelope`]: the request envelope (type url + opaque payload)
//! - [`read_envelope`]: reading an envelope from a blocking byte source
//! - [`MessageLimits`]: request size limits
//! - [`Code`], [`DecodeError`], [`EnvelopeError`], [`HandlerError`]: protocol codes and error types

mod codec;
mod envelope;
mod error;
mod limits;

pub use codec::*;
pub use envelope::*;
pub use error::*;
pub use limits::*;
