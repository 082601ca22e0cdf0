//! The request envelope.
//!
//! On the wire an envelope is a protobuf `google.protobuf.Any`:
//!
//! ```text
//! field 1: type_url (string)   e.g. "type.googleapis.com/acme.v1.Ping"
//! field 2: value    (bytes)    the payload, opaque to the dispatcher
//! ```
//!
//! Both fields are length-delimited, so a body that was cut short always
//! leaves a length prefix pointing past the end of the data and fails to
//! decode.

use bytes::Bytes;
use prost::{Message, Name};

use crate::error::DecodeError;

/// Wire representation of `google.protobuf.Any`, with a zero-copy payload.
#[derive(Clone, PartialEq, Message)]
struct AnyProto {
    #[prost(string, tag = "1")]
    type_url: String,
    #[prost(bytes = "bytes", tag = "2")]
    value: Bytes,
}

/// A decoded request: a type url naming the contract plus an opaque payload.
///
/// The type url is never empty. Envelopes are immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    type_url: String,
    payload: Bytes,
}

impl Envelope {
    /// Build an envelope from a type url and payload.
    ///
    /// # Errors
    /// Returns [`DecodeError::MissingTypeUrl`] if `type_url` is empty.
    pub fn new(type_url: impl Into<String>, payload: impl Into<Bytes>) -> Result<Self, DecodeError> {
        let type_url = type_url.into();
        if type_url.is_empty() {
            return Err(DecodeError::MissingTypeUrl);
        }
        Ok(Self {
            type_url,
            payload: payload.into(),
        })
    }

    /// Wrap a protobuf message, using its fully-qualified type url.
    pub fn pack<M: Message + Name>(message: &M) -> Self {
        Self {
            type_url: M::type_url(),
            payload: Bytes::from(message.encode_to_vec()),
        }
    }

    /// Decode an envelope from its wire bytes.
    pub fn decode(buf: Bytes) -> Result<Self, DecodeError> {
        let AnyProto { type_url, value } = AnyProto::decode(buf)?;
        Self::new(type_url, value)
    }

    /// Encode the envelope to its wire bytes.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        AnyProto {
            type_url: self.type_url.clone(),
            value: self.payload.clone(),
        }
        .encode_to_vec()
    }

    /// The full type url, e.g. `type.googleapis.com/acme.v1.Ping`.
    pub fn type_url(&self) -> &str {
        &self.type_url
    }

    /// The type name: everything after the last `/` of the type url.
    ///
    /// For a type url without a `/` this is the whole url.
    pub fn type_name(&self) -> &str {
        type_name_of(&self.type_url)
    }

    /// The opaque payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the envelope, returning its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Decode the payload as `M`.
    ///
    /// # Errors
    /// [`DecodeError::UnexpectedType`] if the envelope's type name is not
    /// `M`'s full name, [`DecodeError::Malformed`] if the payload does not
    /// decode.
    pub fn unpack<M: Message + Name + Default>(&self) -> Result<M, DecodeError> {
        let expected = M::full_name();
        if self.type_name() != expected {
            return Err(DecodeError::UnexpectedType {
                expected,
                actual: self.type_url.clone(),
            });
        }
        Ok(M::decode(self.payload.clone())?)
    }
}

/// Everything after the last `/` of a type url.
pub fn type_name_of(type_url: &str) -> &str {
    match type_url.rfind('/') {
        Some(idx) => &type_url[idx + 1..],
        None => type_url,
    }
}

impl TryFrom<prost_types::Any> for Envelope {
    type Error = DecodeError;

    fn try_from(any: prost_types::Any) -> Result<Self, Self::Error> {
        Self::new(any.type_url, any.value)
    }
}

impl From<Envelope> for prost_types::Any {
    fn from(envelope: Envelope) -> Self {
        prost_types::Any {
            type_url: envelope.type_url,
            value: envelope.payload.to_vec(),
        }
    }
}
