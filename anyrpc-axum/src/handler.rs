//! Handlers: a capability test plus an executor.
//!
//! Anything implementing [`RpcHandler`] can be registered. Most handlers are
//! built from closures through [`HandlerEntry`], or from a prost message pair
//! through [`HandlerEntry::message`].

use std::borrow::Cow;
use std::marker::PhantomData;

use anyrpc_core::{Envelope, HandlerError};
use bytes::Bytes;
use prost::{Message, Name};
use tokio_util::sync::CancellationToken;

/// Per-call state handed to a handler alongside the envelope.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancellation: CancellationToken,
}

impl CallContext {
    /// A context that is cancelled when `cancellation` is.
    pub fn new(cancellation: CancellationToken) -> Self {
        Self { cancellation }
    }

    /// Whether the caller has gone away or the call timed out.
    ///
    /// Long-running handlers should poll this and bail out early; the
    /// result of a cancelled call is discarded anyway.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// The underlying token, for handlers that want to wait on it.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// A registered request handler.
///
/// Handlers run on worker threads and may block. They are shared by all
/// concurrent requests and must not rely on per-call mutable state.
pub trait RpcHandler: Send + Sync + 'static {
    /// Whether this handler accepts envelopes of `type_url`.
    fn accepts(&self, type_url: &str) -> bool;

    /// Process an accepted envelope, returning the raw response body.
    fn execute(&self, envelope: &Envelope, cx: &CallContext) -> Result<Bytes, HandlerError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

type Matcher = Box<dyn Fn(&str) -> bool + Send + Sync>;
type Executor = Box<dyn Fn(&Envelope, &CallContext) -> Result<Bytes, HandlerError> + Send + Sync>;

/// A handler assembled from a matcher closure and an executor closure.
pub struct HandlerEntry {
    name: Cow<'static, str>,
    matcher: Matcher,
    executor: Executor,
}

impl HandlerEntry {
    /// Pair an arbitrary matcher with an executor.
    pub fn new<M, F>(name: impl Into<Cow<'static, str>>, matcher: M, executor: F) -> Self
    where
        M: Fn(&str) -> bool + Send + Sync + 'static,
        F: Fn(&Envelope, &CallContext) -> Result<Bytes, HandlerError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            matcher: Box::new(matcher),
            executor: Box::new(executor),
        }
    }

    /// Accept exactly one type url.
    pub fn exact<F>(type_url: impl Into<String>, executor: F) -> Self
    where
        F: Fn(&Envelope, &CallContext) -> Result<Bytes, HandlerError> + Send + Sync + 'static,
    {
        let type_url = type_url.into();
        let name = type_url.clone();
        Self::new(name, move |candidate| candidate == type_url, executor)
    }

    /// A typed handler for a prost request/response pair.
    ///
    /// Accepts any envelope whose type name (the part after the last `/`)
    /// is `Req`'s full protobuf name, so both `type.googleapis.com/pkg.Req`
    /// and a bare `pkg.Req` match. A payload that does not decode as `Req`
    /// fails the call with `InvalidArgument`.
    ///
    /// The domain before the last `/` is ignored, so
    /// `other.example/pkg.Req` is accepted too. Use [`HandlerEntry::exact`]
    /// to accept a single full type url.
    pub fn message<Req, Resp, F>(handler: F) -> Self
    where
        Req: Message + Name + Default + 'static,
        Resp: Message + 'static,
        F: Fn(Req, &CallContext) -> Result<Resp, HandlerError> + Send + Sync + 'static,
    {
        let typed = TypedHandler::<Req, Resp, F> {
            handler,
            full_name: Req::full_name(),
            _types: PhantomData,
        };
        let full_name = typed.full_name.clone();
        Self::new(
            Req::full_name(),
            move |type_url| anyrpc_core::type_name_of(type_url) == full_name,
            move |envelope, cx| typed.call(envelope, cx),
        )
    }
}

impl std::fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HandlerEntry").field(&self.name).finish()
    }
}

impl RpcHandler for HandlerEntry {
    fn accepts(&self, type_url: &str) -> bool {
        (self.matcher)(type_url)
    }

    fn execute(&self, envelope: &Envelope, cx: &CallContext) -> Result<Bytes, HandlerError> {
        (self.executor)(envelope, cx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct TypedHandler<Req, Resp, F> {
    handler: F,
    full_name: String,
    _types: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp, F> TypedHandler<Req, Resp, F>
where
    Req: Message + Default,
    Resp: Message,
    F: Fn(Req, &CallContext) -> Result<Resp, HandlerError>,
{
    fn call(&self, envelope: &Envelope, cx: &CallContext) -> Result<Bytes, HandlerError> {
        let request = Req::decode(envelope.payload().clone()).map_err(|e| {
            HandlerError::invalid_argument(format!(
                "failed to decode {} payload: {e}",
                self.full_name
            ))
        })?;
        let response = (self.handler)(request, cx)?;
        Ok(Bytes::from(response.encode_to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyrpc_core::Code;

    fn envelope(type_url: &str, payload: &'static [u8]) -> Envelope {
        Envelope::new(type_url, payload).unwrap()
    }

    #[test]
    fn test_exact_entry() {
        let entry = HandlerEntry::exact("acme.Ping", |env, _| Ok(env.payload().clone()));

        assert!(entry.accepts("acme.Ping"));
        assert!(!entry.accepts("acme.Pong"));
        assert_eq!(entry.name(), "acme.Ping");

        let out = entry
            .execute(&envelope("acme.Ping", b"abc"), &CallContext::default())
            .unwrap();
        assert_eq!(out.as_ref(), b"abc");
    }

    #[test]
    fn test_predicate_entry() {
        let entry = HandlerEntry::new(
            "acme.*",
            |type_url| type_url.starts_with("acme."),
            |_, _| Ok(Bytes::from_static(b"ok")),
        );
        assert!(entry.accepts("acme.Anything"));
        assert!(!entry.accepts("other.Thing"));
    }

    #[test]
    fn test_typed_entry_roundtrip() {
        let entry = HandlerEntry::message::<prost_types::Duration, prost_types::Duration, _>(
            |mut d, _| {
                d.seconds *= 2;
                Ok(d)
            },
        );

        assert!(entry.accepts("type.googleapis.com/google.protobuf.Duration"));
        assert!(entry.accepts("google.protobuf.Duration"));
        assert!(!entry.accepts("type.googleapis.com/google.protobuf.Timestamp"));

        let request = Envelope::pack(&prost_types::Duration {
            seconds: 21,
            nanos: 0,
        });
        let out = entry.execute(&request, &CallContext::default()).unwrap();
        let response = prost_types::Duration::decode(out).unwrap();
        assert_eq!(response.seconds, 42);
    }

    #[test]
    fn test_typed_entry_ignores_domain() {
        let entry = HandlerEntry::message::<prost_types::Duration, prost_types::Duration, _>(
            |d, _| Ok(d),
        );
        assert!(entry.accepts("other.example/google.protobuf.Duration"));
        assert!(entry.accepts("a/b/google.protobuf.Duration"));

        let exact = HandlerEntry::exact(
            "type.googleapis.com/google.protobuf.Duration",
            |env, _| Ok(env.payload().clone()),
        );
        assert!(!exact.accepts("other.example/google.protobuf.Duration"));
    }

    #[test]
    fn test_typed_entry_rejects_bad_payload() {
        let entry = HandlerEntry::message::<prost_types::Duration, prost_types::Duration, _>(
            |d, _| Ok(d),
        );
        let bad = envelope("google.protobuf.Duration", b"\x08");
        let err = entry.execute(&bad, &CallContext::default()).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[test]
    fn test_call_context_cancellation() {
        let token = CancellationToken::new();
        let cx = CallContext::new(token.clone());
        assert!(!cx.is_cancelled());
        token.cancel();
        assert!(cx.is_cancelled());
    }
}
