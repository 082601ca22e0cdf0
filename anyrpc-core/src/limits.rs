//! Request size limits.
//!
//! The envelope decoder buffers the whole request before decoding, so an
//! upper bound on the body size is the only thing standing between a client
//! and the server's memory. The default of 4 MB matches gRPC's default
//! receive limit.

use crate::error::DecodeError;

/// Default maximum message size (4 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Configuration for request size limits.
///
/// ```rust
/// use anyrpc_core::MessageLimits;
///
/// let limits = MessageLimits::default();
/// assert_eq!(limits.max_message_size(), Some(4 * 1024 * 1024));
///
/// let limits = MessageLimits::new(64 * 1024);
/// assert!(limits.check_size(64 * 1024 + 1).is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageLimits {
    max_message_size: Option<usize>,
}

impl Default for MessageLimits {
    fn default() -> Self {
        Self {
            max_message_size: Some(DEFAULT_MAX_MESSAGE_SIZE),
        }
    }
}

impl MessageLimits {
    /// Limit request bodies to `max_message_size` bytes.
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size: Some(max_message_size),
        }
    }

    /// No limit. Only for trusted peers.
    pub fn unlimited() -> Self {
        Self {
            max_message_size: None,
        }
    }

    /// Returns the maximum message size, or `None` if unlimited.
    pub fn max_message_size(&self) -> Option<usize> {
        self.max_message_size
    }

    /// Check a body size against the limit.
    pub fn check_size(&self, size: usize) -> Result<(), DecodeError> {
        match self.max_message_size {
            Some(limit) if size > limit => Err(DecodeError::TooLarge { limit }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_size_boundaries() {
        let limits = MessageLimits::new(1024);
        assert!(limits.check_size(0).is_ok());
        assert!(limits.check_size(1024).is_ok());
        assert!(matches!(
            limits.check_size(1025),
            Err(DecodeError::TooLarge { limit: 1024 })
        ));
    }

    #[test]
    fn test_unlimited() {
        let limits = MessageLimits::unlimited();
        assert_eq!(limits.max_message_size(), None);
        assert!(limits.check_size(usize::MAX).is_ok());
    }
}
