//! Envelope codec.
//!
//! Requests are framed, responses are not: the decoder reads one envelope
//! from a blocking byte source, while the response body is the handler's
//! output written verbatim.

use std::io::Read;

use bytes::Bytes;

use crate::envelope::Envelope;
use crate::error::{DecodeError, EnvelopeError};
use crate::limits::MessageLimits;

/// Read one envelope from `source`, consuming it to end-of-stream.
///
/// At most `limits.max_message_size() + 1` bytes are pulled from the
/// source; a body over the limit is rejected without reading the rest.
///
/// # Errors
/// - [`EnvelopeError::Io`] if the source fails (e.g. the transport was reset)
/// - [`EnvelopeError::Decode`] if the bytes are not a valid envelope
pub fn read_envelope<R: Read>(source: R, limits: MessageLimits) -> Result<Envelope, EnvelopeError> {
    let body = read_body(source, limits)?;
    Ok(Envelope::decode(body)?)
}

fn read_body<R: Read>(source: R, limits: MessageLimits) -> Result<Bytes, EnvelopeError> {
    let mut buf = Vec::new();
    match limits.max_message_size() {
        Some(limit) => {
            let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
            source.take(cap).read_to_end(&mut buf)?;
            limits.check_size(buf.len())?;
        }
        None => {
            let mut source = source;
            source.read_to_end(&mut buf)?;
        }
    }
    Ok(Bytes::from(buf))
}

/// Check that an advertised body length fits the limit.
///
/// Lets the transport reject an oversized request from its `Content-Length`
/// before any of the body is read.
pub fn check_declared_length(length: u64, limits: MessageLimits) -> Result<(), DecodeError> {
    match usize::try_from(length) {
        Ok(length) => limits.check_size(length),
        Err(_) => match limits.max_message_size() {
            Some(limit) => Err(DecodeError::TooLarge { limit }),
            None => Ok(()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    /// Yields `data` in small pieces, then fails.
    struct ResetAfter {
        data: Cursor<Vec<u8>>,
    }

    impl Read for ResetAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(3);
            let n = self.data.read(&mut buf[..len])?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
            }
            Ok(n)
        }
    }

    fn wire(type_url: &str, payload: &[u8]) -> Vec<u8> {
        Envelope::new(type_url, payload.to_vec())
            .unwrap()
            .encode_to_vec()
    }

    #[test]
    fn test_read_envelope_from_reader() {
        let bytes = wire("acme.Ping", b"hello");
        let envelope = read_envelope(Cursor::new(bytes), MessageLimits::default()).unwrap();

        assert_eq!(envelope.type_url(), "acme.Ping");
        assert_eq!(envelope.payload().as_ref(), b"hello");
    }

    #[test]
    fn test_short_stream_is_decode_error() {
        let mut bytes = wire("acme.Ping", b"hello");
        bytes.truncate(bytes.len() - 2);
        let err = read_envelope(Cursor::new(bytes), MessageLimits::default()).unwrap_err();

        assert!(matches!(err, EnvelopeError::Decode(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_broken_source_is_io_error() {
        let bytes = wire("acme.Ping", b"hello");
        let source = ResetAfter {
            data: Cursor::new(bytes[..6].to_vec()),
        };
        let err = read_envelope(source, MessageLimits::default()).unwrap_err();

        match err {
            EnvelopeError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("expected I/O error, got {other:?}"),
        }
    }

    #[test]
    fn test_oversized_body_rejected() {
        let bytes = wire("acme.Blob", &[0u8; 256]);
        let err = read_envelope(Cursor::new(bytes), MessageLimits::new(64)).unwrap_err();

        assert!(matches!(
            err,
            EnvelopeError::Decode(DecodeError::TooLarge { limit: 64 })
        ));
    }

    #[test]
    fn test_body_at_limit_accepted() {
        let bytes = wire("acme.Blob", &[1u8; 32]);
        let limits = MessageLimits::new(bytes.len());
        assert!(read_envelope(Cursor::new(bytes), limits).is_ok());
    }

    #[test]
    fn test_check_declared_length() {
        let limits = MessageLimits::new(100);
        assert!(check_declared_length(100, limits).is_ok());
        assert!(check_declared_length(101, limits).is_err());
        assert!(check_declared_length(u64::MAX, MessageLimits::unlimited()).is_ok());
    }
}
