//! Error types for the provider layer.

use std::time::Duration;

use thiserror::Error;

use crate::ProviderKind;

/// Errors that can occur while submitting a document to a hosted model.
///
/// Every variant is either transient (worth retrying after a pause) or
/// permanent; see [`ProviderError::is_transient`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The provider rejected the credentials.
    #[error("{provider} rejected the credentials: {message}")]
    Auth {
        provider: ProviderKind,
        message: String,
    },

    /// Connection, TLS or I/O failure before a response was received.
    #[error("transport failure talking to {provider}: {message}")]
    Transport {
        provider: ProviderKind,
        message: String,
    },

    /// Rate limit or quota exhaustion reported by the provider.
    #[error("{provider} rate limit or quota exceeded: {message}")]
    RateLimited {
        provider: ProviderKind,
        retry_after: Option<Duration>,
        message: String,
    },

    /// The model identifier is unknown or not available to these credentials.
    #[error("{provider} does not recognize model `{model}`: {message}")]
    UnknownModel {
        provider: ProviderKind,
        model: String,
        message: String,
    },

    /// The request did not complete in time.
    #[error("{provider} did not answer within {timeout:?}")]
    Timeout {
        provider: ProviderKind,
        timeout: Duration,
    },

    /// Server-side failure (5xx other than gateway timeout).
    #[error("{provider} is unavailable ({status}): {message}")]
    Unavailable {
        provider: ProviderKind,
        status: u16,
        message: String,
    },

    /// The provider answered, but with no usable text.
    #[error("{provider} returned an empty response{}", reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default())]
    EmptyResponse {
        provider: ProviderKind,
        reason: Option<String>,
    },

    /// The provider refused the request as malformed.
    #[error("{provider} rejected the request: {message}")]
    InvalidRequest {
        provider: ProviderKind,
        message: String,
    },

    /// The response body could not be decoded.
    #[error("failed to decode {provider} response: {message}")]
    Decode {
        provider: ProviderKind,
        message: String,
    },
}

impl ProviderError {
    /// Whether the failure may succeed if the same request is sent again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Transport { .. }
                | ProviderError::RateLimited { .. }
                | ProviderError::Timeout { .. }
                | ProviderError::Unavailable { .. }
        )
    }

    /// Whether the provider rejected the credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, ProviderError::Auth { .. })
    }

    /// Server-suggested wait before retrying, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// The provider that produced the error.
    pub fn provider(&self) -> ProviderKind {
        match self {
            ProviderError::Auth { provider, .. }
            | ProviderError::Transport { provider, .. }
            | ProviderError::RateLimited { provider, .. }
            | ProviderError::UnknownModel { provider, .. }
            | ProviderError::Timeout { provider, .. }
            | ProviderError::Unavailable { provider, .. }
            | ProviderError::EmptyResponse { provider, .. }
            | ProviderError::InvalidRequest { provider, .. }
            | ProviderError::Decode { provider, .. } => *provider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let provider = ProviderKind::OpenAi;

        assert!(ProviderError::Timeout { provider, timeout: Duration::from_secs(1) }.is_transient());
        assert!(ProviderError::RateLimited { provider, retry_after: None, message: String::new() }.is_transient());
        assert!(ProviderError::Transport { provider, message: String::new() }.is_transient());
        assert!(!ProviderError::Auth { provider, message: String::new() }.is_transient());
        assert!(!ProviderError::EmptyResponse { provider, reason: None }.is_transient());
        assert!(
            !ProviderError::UnknownModel {
                provider,
                model: "x".to_string(),
                message: String::new()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_empty_response_message() {
        let err = ProviderError::EmptyResponse {
            provider: ProviderKind::Gemini,
            reason: Some("SAFETY".to_string()),
        };
        assert_eq!(err.to_string(), "Gemini returned an empty response (SAFETY)");
    }
}
