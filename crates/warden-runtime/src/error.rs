//! Runtime errors.

use thiserror::Error;
use warden_data::StoreError;
use warden_types::{ErrorCode, InvalidIdentifier};

/// Errors surfaced by cache operations and engine lookups.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing store failed; nothing was applied.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An identifier did not parse for its subject type.
    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidIdentifier),

    /// The API was used in a state that does not allow the operation.
    #[error("illegal state: {0}")]
    IllegalState(String),
}

impl CacheError {
    /// Creates an illegal state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }
}

impl ErrorCode for CacheError {
    fn code(&self) -> &'static str {
        match self {
            Self::Store(_) => "CACHE_STORE",
            Self::InvalidIdentifier(_) => "CACHE_INVALID_IDENTIFIER",
            Self::IllegalState(_) => "CACHE_ILLEGAL_STATE",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_recoverable(),
            Self::InvalidIdentifier(_) | Self::IllegalState(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_types::assert_error_codes;

    #[test]
    fn error_codes() {
        assert_error_codes(
            &[
                CacheError::from(StoreError::backend("disk")),
                CacheError::from(InvalidIdentifier::new("user", "??")),
                CacheError::illegal_state("closed"),
            ],
            "CACHE_",
        );
    }

    #[test]
    fn recoverability_follows_store() {
        assert!(CacheError::from(StoreError::unavailable("later")).is_recoverable());
        assert!(!CacheError::from(StoreError::backend("broken")).is_recoverable());
        assert!(!CacheError::illegal_state("closed").is_recoverable());
    }

    #[test]
    fn store_message_passes_through() {
        let err = CacheError::from(StoreError::backend("disk full"));
        assert!(err.to_string().contains("disk full"));
    }
}
