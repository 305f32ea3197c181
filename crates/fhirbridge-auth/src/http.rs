//! Shared HTTP client construction.

use crate::AuthResult;
use crate::config::HttpConfig;
use crate::error::AuthError;

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("fhirbridge/", env!("CARGO_PKG_VERSION"));

/// Builds the HTTP client used for registration, token and resource calls.
///
/// `accept_invalid_certs` only takes effect in debug builds; release builds
/// log a warning and keep certificate verification on.
pub fn build_http_client(config: &HttpConfig) -> AuthResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(config.timeout)
        .user_agent(USER_AGENT);

    if config.accept_invalid_certs {
        if cfg!(debug_assertions) {
            tracing::warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        } else {
            tracing::warn!("http.accept_invalid_certs is ignored in release builds");
        }
    }

    builder
        .build()
        .map_err(|e| AuthError::configuration(format!("Failed to create HTTP client: {e}")))
}
