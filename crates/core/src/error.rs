//! Error types shared across the pipeline.
//!
//! Provider failures are non-fatal and degrade the run; persistence failures
//! are fatal to it.

use thiserror::Error;

/// Failure of a single source adapter fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Request or fetch deadline exceeded.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimit {
        /// Seconds to wait before retry.
        retry_after_secs: u64,
    },

    /// Provider answered with a non-success status.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Response body or reason.
        message: String,
    },

    /// Payload could not be decoded into the expected shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl ProviderError {
    /// Creates an API error from status code and message.
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// Creates a rate limit error.
    pub fn rate_limit(retry_after_secs: u64) -> Self {
        Self::RateLimit { retry_after_secs }
    }

    /// Creates a malformed payload error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload(message.into())
    }

    /// Returns true if the fetch may succeed when attempted again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimit { .. } => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            Self::MalformedPayload(_) => false,
        }
    }

    /// Returns the delay the provider asked for, if any.
    #[must_use]
    pub fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedPayload(err.to_string())
    }
}

/// Failure at the snapshot store boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    /// Storage backend failed.
    #[error("database error: {0}")]
    Database(String),

    /// Snapshot could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Stored data violates the snapshot schema.
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),
}

impl PersistenceError {
    /// Wraps any backend error.
    pub fn database(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }

    /// Creates a corrupt-data error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt(message.into())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for adapter operations.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Result type alias for snapshot store operations.
pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Error Construction Tests ====================

    #[test]
    fn test_api_error_construction() {
        let err = ProviderError::api(502, "bad gateway");
        assert!(matches!(
            err,
            ProviderError::Api {
                status_code: 502,
                ..
            }
        ));
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("bad gateway"));
    }

    #[test]
    fn test_rate_limit_error_construction() {
        let err = ProviderError::rate_limit(30);
        assert_eq!(err.retry_delay_secs(), Some(30));
        assert!(err.to_string().contains("30"));
    }

    // ==================== Retry Classification Tests ====================

    #[test]
    fn test_retryable_errors() {
        assert!(ProviderError::Network("reset".into()).is_retryable());
        assert!(ProviderError::Timeout("30s".into()).is_retryable());
        assert!(ProviderError::rate_limit(5).is_retryable());
        assert!(ProviderError::api(503, "unavailable").is_retryable());
    }

    #[test]
    fn test_non_retryable_errors() {
        assert!(!ProviderError::api(404, "not found").is_retryable());
        assert!(!ProviderError::malformed("missing field").is_retryable());
        assert_eq!(ProviderError::api(500, "x").retry_delay_secs(), None);
    }

    #[test]
    fn test_json_error_maps_to_malformed() {
        let err = serde_json::from_str::<u32>("\"nope\"").unwrap_err();
        assert!(matches!(
            ProviderError::from(err),
            ProviderError::MalformedPayload(_)
        ));
    }

    #[test]
    fn test_persistence_error_display() {
        let err = PersistenceError::database("connection refused");
        assert_eq!(err.to_string(), "database error: connection refused");
        let err = PersistenceError::corrupt("unknown state");
        assert!(err.to_string().contains("unknown state"));
    }
}
