//! Error types shared across providers and the scan pipeline.

use std::time::Duration;
use thiserror::Error;

/// Errors a [`TradeSource`](crate::TradeSource) can report.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Upstream returned 429.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds the provider asked us to wait.
        retry_after_secs: u64,
    },

    /// Request timed out.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Connection or transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Response body or reason.
        message: String,
    },

    /// Response body could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The provider cannot serve this symbol.
    #[error("unsupported symbol: {0}")]
    Unsupported(String),

    /// Client-side misconfiguration surfaced at request time.
    #[error("configuration error: {0}")]
    Configuration(String),
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
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Returns true for failures worth retrying with backoff.
    ///
    /// Rate limits are not included; they get a full cooldown instead.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }

    /// Delay the provider asked for, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(Duration::from_secs(*retry_after_secs)),
            _ => None,
        }
    }
}

/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Classification Tests ====================

    #[test]
    fn test_rate_limit_is_not_transient() {
        let err = ProviderError::rate_limited(60);
        assert!(err.is_rate_limit());
        assert!(!err.is_transient());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_network_and_timeout_are_transient() {
        assert!(ProviderError::Network("reset".to_string()).is_transient());
        assert!(ProviderError::Timeout("30s".to_string()).is_transient());
    }

    #[test]
    fn test_server_error_is_transient() {
        assert!(ProviderError::api(503, "unavailable").is_transient());
        assert!(!ProviderError::api(404, "not found").is_transient());
    }

    #[test]
    fn test_malformed_is_permanent() {
        let err = ProviderError::Malformed("expected object".to_string());
        assert!(!err.is_transient());
        assert!(err.retry_after().is_none());
    }

    // ==================== Display Tests ====================

    #[test]
    fn test_display() {
        assert!(ProviderError::api(422, "bad symbol")
            .to_string()
            .contains("422"));
        assert!(ProviderError::rate_limited(30).to_string().contains("30"));
        assert!(ProviderError::Unsupported("BRK-A".to_string())
            .to_string()
            .contains("BRK-A"));
    }
}
