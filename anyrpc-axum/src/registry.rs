//! The handler registry.
//!
//! An ordered, fixed set of handlers assembled once at startup. Lookup walks
//! the handlers in registration order and returns the first one whose
//! capability test accepts the type url. Later handlers are never consulted
//! once one matches, even if they would also accept.

use std::sync::Arc;

use anyrpc_core::{Envelope, HandlerError};
use bytes::Bytes;
use prost::{Message, Name};

use crate::handler::{CallContext, HandlerEntry, RpcHandler};

/// Immutable, ordered set of handlers. Cheap to clone.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<[Arc<dyn RpcHandler>]>,
}

impl HandlerRegistry {
    /// Start assembling a registry.
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// The first handler accepting `type_url`, in registration order.
    pub fn find(&self, type_url: &str) -> Option<&dyn RpcHandler> {
        self.handlers
            .iter()
            .find(|handler| handler.accepts(type_url))
            .map(|handler| handler.as_ref())
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Handler names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(|handler| handler.name())
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Builder for [`HandlerRegistry`]. Registration order is lookup order.
///
/// ```rust
/// use anyrpc_axum::registry::HandlerRegistry;
/// use bytes::Bytes;
///
/// let registry = HandlerRegistry::builder()
///     .route("acme.v1.Ping", |_, _| Ok(Bytes::from_static(b"pong")))
///     .matching(|type_url| type_url.starts_with("acme."), |env, _| Ok(env.payload().clone()))
///     .build();
///
/// assert_eq!(registry.len(), 2);
/// assert_eq!(registry.find("acme.v1.Ping").unwrap().name(), "acme.v1.Ping");
/// ```
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: Vec<Arc<dyn RpcHandler>>,
}

impl HandlerRegistryBuilder {
    /// Register any [`RpcHandler`].
    pub fn handler<H: RpcHandler>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Register a handler for exactly one type url.
    pub fn route<F>(self, type_url: impl Into<String>, executor: F) -> Self
    where
        F: Fn(&Envelope, &CallContext) -> Result<Bytes, HandlerError> + Send + Sync + 'static,
    {
        self.handler(HandlerEntry::exact(type_url, executor))
    }

    /// Register a handler with an arbitrary matcher.
    pub fn matching<M, F>(self, matcher: M, executor: F) -> Self
    where
        M: Fn(&str) -> bool + Send + Sync + 'static,
        F: Fn(&Envelope, &CallContext) -> Result<Bytes, HandlerError> + Send + Sync + 'static,
    {
        let name = format!("matcher#{}", self.handlers.len());
        self.handler(HandlerEntry::new(name, matcher, executor))
    }

    /// Register a typed handler for a prost request/response pair.
    ///
    /// Matches on the type name only; the type url's domain is ignored.
    /// See [`HandlerEntry::message`].
    pub fn message<Req, Resp, F>(self, handler: F) -> Self
    where
        Req: Message + Name + Default + 'static,
        Resp: Message + 'static,
        F: Fn(Req, &CallContext) -> Result<Resp, HandlerError> + Send + Sync + 'static,
    {
        self.handler(HandlerEntry::message::<Req, Resp, F>(handler))
    }

    /// Freeze the registry.
    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(out: &'static [u8]) -> impl Fn(&Envelope, &CallContext) -> Result<Bytes, HandlerError> {
        move |_: &Envelope, _: &CallContext| Ok(Bytes::from_static(out))
    }

    #[test]
    fn test_first_match_wins() {
        let registry = HandlerRegistry::builder()
            .route("X", constant(b"first"))
            .route("X", constant(b"second"))
            .build();

        let handler = registry.find("X").unwrap();
        let env = Envelope::new("X", Bytes::new()).unwrap();
        let out = handler.execute(&env, &CallContext::default()).unwrap();
        assert_eq!(out.as_ref(), b"first");
    }

    #[test]
    fn test_registration_order_beats_specificity() {
        let registry = HandlerRegistry::builder()
            .matching(|_| true, constant(b"catch-all"))
            .route("acme.Ping", constant(b"specific"))
            .build();

        let handler = registry.find("acme.Ping").unwrap();
        assert_eq!(handler.name(), "matcher#0");
    }

    #[test]
    fn test_no_match() {
        let registry = HandlerRegistry::builder()
            .route("acme.Ping", constant(b"pong"))
            .build();
        assert!(registry.find("acme.Unknown").is_none());
        assert!(HandlerRegistry::default().find("acme.Ping").is_none());
    }

    #[test]
    fn test_names_in_order() {
        let registry = HandlerRegistry::builder()
            .route("a", constant(b""))
            .route("b", constant(b""))
            .build();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(!registry.is_empty());
    }
}
