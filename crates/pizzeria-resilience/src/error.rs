//! Error types for outbound calls and the response cache tier.

/// Outcome of a failed call to the LLM provider.
///
/// The retry loop branches on [`ProviderError::is_recoverable`]; every
/// variant is classified explicitly so adding one forces a decision.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("Request timeout")]
    Timeout,

    #[error("Connection reset: {0}")]
    ConnectionReset(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Provider overloaded")]
    Overloaded,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Authentication failed")]
    Unauthorized,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Provider misconfigured: {0}")]
    Configuration(String),

    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },
}

impl ProviderError {
    /// Whether another attempt may succeed without changing the request.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Timeout | Self::ConnectionReset(_) | Self::RateLimited | Self::Overloaded => {
                true
            }
            Self::BadRequest(_)
            | Self::Unauthorized
            | Self::MalformedResponse(_)
            | Self::Configuration(_)
            | Self::Upstream { .. } => false,
        }
    }

    /// Stable label used for the error-type metric.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionReset(_) => "connection_reset",
            Self::RateLimited => "rate_limited",
            Self::Overloaded => "overloaded",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Configuration(_) => "configuration",
            Self::Upstream { .. } => "upstream",
        }
    }
}

/// Failure of the backing cache tier.
///
/// Never surfaces past [`crate::ResponseCache`]; it only reaches logs and
/// metrics.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("Cache tier unavailable: {0}")]
    Unavailable(String),

    #[error("Cache backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_recoverable() {
        for err in [
            ProviderError::Timeout,
            ProviderError::ConnectionReset("reset by peer".to_string()),
            ProviderError::RateLimited,
            ProviderError::Overloaded,
        ] {
            assert!(err.is_recoverable(), "{err} should be recoverable");
        }
    }

    #[test]
    fn test_request_errors_are_not_recoverable() {
        for err in [
            ProviderError::BadRequest("max_tokens too large".to_string()),
            ProviderError::Unauthorized,
            ProviderError::MalformedResponse("tool_use block".to_string()),
            ProviderError::Configuration("missing key".to_string()),
            ProviderError::Upstream {
                status: 500,
                message: "internal".to_string(),
            },
        ] {
            assert!(!err.is_recoverable(), "{err} should not be recoverable");
        }
    }

    #[test]
    fn test_error_type_labels() {
        assert_eq!(ProviderError::Timeout.error_type(), "timeout");
        assert_eq!(ProviderError::RateLimited.error_type(), "rate_limited");
        assert_eq!(ProviderError::Unauthorized.error_type(), "unauthorized");
    }
}
