//! Error types for the access key sweeper

use thiserror::Error;

/// Errors returned by an [`IdentityProvider`](crate::provider::IdentityProvider)
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Credentials for the provider API are not configured
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// The request never produced a response (connect, timeout, TLS)
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider rejected the request
    #[error("{code} (HTTP {status}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// The provider answered with something we could not parse
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Request signing failed
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Provider configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ProviderError {
    /// Shorthand for an API-level rejection
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::Api {
            status,
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Errors that abort a whole sweep
#[derive(Debug, Error)]
pub enum SweepError {
    /// The account list could not be read, so there is nothing to sweep
    #[error("Failed to list accounts: {0}")]
    AccountEnumeration(#[source] ProviderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ProviderError::api(404, "NoSuchEntity", "The user with name bob cannot be found.");
        assert_eq!(
            err.to_string(),
            "NoSuchEntity (HTTP 404): The user with name bob cannot be found."
        );
    }

    #[test]
    fn test_sweep_error_keeps_source() {
        let err = SweepError::AccountEnumeration(ProviderError::api(403, "AccessDenied", "denied"));
        assert!(err.to_string().starts_with("Failed to list accounts"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
