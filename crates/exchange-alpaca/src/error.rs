//! Error types for the Alpaca market data integration.

use thiserror::Error;
use whale_watch_core::ProviderError;

/// Errors that can occur when talking to Alpaca.
#[derive(Debug, Error)]
pub enum AlpacaError {
    /// Missing or invalid credentials/settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// API request failed.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error message from API.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimit {
        /// Seconds to wait before retry.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Request timeout.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Symbol Alpaca does not serve.
    #[error("unsupported symbol: {0}")]
    UnsupportedSymbol(String),
}

impl AlpacaError {
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

    /// Returns true if the error indicates the request should be retried later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimit { .. } => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AlpacaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else if err.is_decode() {
            Self::Serialization(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AlpacaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<AlpacaError> for ProviderError {
    fn from(err: AlpacaError) -> Self {
        match err {
            AlpacaError::RateLimit { retry_after_secs } => Self::rate_limited(retry_after_secs),
            AlpacaError::Timeout(msg) => Self::Timeout(msg),
            AlpacaError::Network(msg) => Self::Network(msg),
            AlpacaError::Api {
                status_code,
                message,
            } => Self::api(status_code, message),
            AlpacaError::Serialization(msg) => Self::Malformed(msg),
            AlpacaError::UnsupportedSymbol(symbol) => Self::Unsupported(symbol),
            AlpacaError::Configuration(msg) => Self::Configuration(msg),
        }
    }
}

/// Result type alias for Alpaca operations.
pub type Result<T> = std::result::Result<T, AlpacaError>;

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Transient Tests ====================

    #[test]
    fn test_server_error_is_transient() {
        assert!(AlpacaError::api(502, "bad gateway").is_transient());
        assert!(!AlpacaError::api(403, "forbidden").is_transient());
    }

    #[test]
    fn test_configuration_is_not_transient() {
        assert!(!AlpacaError::Configuration("missing key".to_string()).is_transient());
    }

    // ==================== Conversion Tests ====================

    #[test]
    fn test_rate_limit_maps_to_provider_rate_limit() {
        let err: ProviderError = AlpacaError::rate_limit(60).into();
        assert!(err.is_rate_limit());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_serialization_maps_to_malformed() {
        let err: ProviderError = AlpacaError::Serialization("eof".to_string()).into();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[test]
    fn test_timeout_maps_to_transient() {
        let err: ProviderError = AlpacaError::Timeout("30s".to_string()).into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_display() {
        let err = AlpacaError::api(422, "invalid symbol");
        assert!(err.to_string().contains("422"));
        assert!(err.to_string().contains("invalid symbol"));
    }
}
