//! Dispatcher configuration - server-wide static settings.
//!
//! Set once at startup, shared by every request.

use std::time::Duration;

use anyrpc_core::MessageLimits;

use crate::bridge::DEFAULT_BRIDGE_CAPACITY;
use crate::pool::PoolConfig;

/// Server-wide configuration for the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Request size limits
    pub limits: MessageLimits,
    /// Worker pool sizing
    pub pool: PoolConfig,
    /// Chunks buffered between the request body and the decoder
    pub bridge_capacity: usize,
    /// Upper bound on decode plus handler execution (optional)
    pub handler_timeout: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            limits: MessageLimits::default(),
            pool: PoolConfig::default(),
            bridge_capacity: DEFAULT_BRIDGE_CAPACITY,
            handler_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.limits, MessageLimits::default());
        assert_eq!(config.bridge_capacity, DEFAULT_BRIDGE_CAPACITY);
        assert!(config.pool.max_workers >= 1);
        assert_eq!(config.pool.max_queued, None);
        assert_eq!(config.handler_timeout, None);
    }
}
