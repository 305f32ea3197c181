//! Error types for the client authentication flow.
//!
//! Every stage of the pipeline (key identifier derivation, assertion
//! signing, token exchange, registration and resource fetch) reports
//! failures through [`AuthError`]. There is no local recovery: errors are
//! propagated to the outermost caller, which decides how to report them.

/// Errors that can occur while authenticating a client against a FHIR server.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A JWK or PEM document is malformed or missing required members.
    #[error("Invalid key format: {message}")]
    InvalidKeyFormat {
        /// Description of why the key could not be used.
        message: String,
    },

    /// The private key does not fit the signing algorithm, or signing failed.
    #[error("Signing error: {message}")]
    SigningError {
        /// Description of the signing failure.
        message: String,
    },

    /// A client assertion failed verification.
    #[error("Invalid assertion: {message}")]
    InvalidAssertion {
        /// Description of the verification failure.
        message: String,
    },

    /// The system clock could not provide a usable timestamp.
    #[error("Clock error: {message}")]
    ClockError {
        /// Description of the clock failure.
        message: String,
    },

    /// The token endpoint answered with a non-success status.
    #[error("Token request failed (HTTP {status}): {body}")]
    TokenRequestFailed {
        /// HTTP status code returned by the token endpoint.
        status: u16,
        /// Raw response body, kept for diagnosis.
        body: String,
    },

    /// A response did not contain the expected JSON members.
    #[error("Malformed response: {message}")]
    MalformedResponse {
        /// Description of what was missing or unparseable.
        message: String,
    },

    /// The registration endpoint answered with a non-success status.
    #[error("Registration failed (HTTP {status}): {body}")]
    RegistrationFailed {
        /// HTTP status code returned by the registration endpoint.
        status: u16,
        /// Raw response body, kept for diagnosis.
        body: String,
    },

    /// The FHIR resource endpoint answered with a non-success status.
    #[error("Resource request failed (HTTP {status}): {body}")]
    ResourceRequestFailed {
        /// HTTP status code returned by the resource endpoint.
        status: u16,
        /// Response body or extracted OperationOutcome diagnostics.
        body: String,
    },

    /// A transport-level failure (connection refused, timeout, TLS).
    #[error("Network error: {message}")]
    NetworkError {
        /// Description of the transport failure.
        message: String,
    },

    /// Reading or writing persisted material failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The configuration is invalid or incomplete.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidKeyFormat` error.
    #[must_use]
    pub fn invalid_key_format(message: impl Into<String>) -> Self {
        Self::InvalidKeyFormat {
            message: message.into(),
        }
    }

    /// Creates a new `SigningError`.
    #[must_use]
    pub fn signing(message: impl Into<String>) -> Self {
        Self::SigningError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidAssertion` error.
    #[must_use]
    pub fn invalid_assertion(message: impl Into<String>) -> Self {
        Self::InvalidAssertion {
            message: message.into(),
        }
    }

    /// Creates a new `ClockError`.
    #[must_use]
    pub fn clock(message: impl Into<String>) -> Self {
        Self::ClockError {
            message: message.into(),
        }
    }

    /// Creates a new `TokenRequestFailed` error.
    #[must_use]
    pub fn token_request_failed(status: u16, body: impl Into<String>) -> Self {
        Self::TokenRequestFailed {
            status,
            body: body.into(),
        }
    }

    /// Creates a new `MalformedResponse` error.
    #[must_use]
    pub fn malformed_response(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Creates a new `RegistrationFailed` error.
    #[must_use]
    pub fn registration_failed(status: u16, body: impl Into<String>) -> Self {
        Self::RegistrationFailed {
            status,
            body: body.into(),
        }
    }

    /// Creates a new `ResourceRequestFailed` error.
    #[must_use]
    pub fn resource_request_failed(status: u16, body: impl Into<String>) -> Self {
        Self::ResourceRequestFailed {
            status,
            body: body.into(),
        }
    }

    /// Creates a new `NetworkError`.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns the HTTP status carried by the error, if any.
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::TokenRequestFailed { status, .. }
            | Self::RegistrationFailed { status, .. }
            | Self::ResourceRequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if the error is caused by bad key material.
    #[must_use]
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidKeyFormat { .. } | Self::SigningError { .. }
        )
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::network(err.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(err: std::io::Error) -> Self {
        Self::storage(err.to_string())
    }
}
