//! OAuth 2.0 client credentials token exchange.
//!
//! [`TokenExchanger::exchange`] posts a signed client assertion to the token
//! endpoint and returns the issued access token. Every call is a fresh
//! network round trip: nothing is cached and nothing is retried.

use std::fmt;

use serde_json::Value;
use time::{Duration, OffsetDateTime};
use url::Url;

use crate::AuthResult;
use crate::assertion::{CLIENT_ASSERTION_TYPE, ClientAssertion};
use crate::error::AuthError;

/// Bearer credential returned by the token endpoint.
#[derive(Clone)]
pub struct AccessToken {
    token: String,
    token_type: Option<String>,
    expires_in: Option<u64>,
    scope: Option<String>,
    received_at: OffsetDateTime,
}

impl AccessToken {
    /// Creates a token with no server metadata.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            token_type: None,
            expires_in: None,
            scope: None,
            received_at: OffsetDateTime::now_utc(),
        }
    }

    /// Parses a token endpoint response body.
    ///
    /// # Errors
    /// Returns `MalformedResponse` if the body is not JSON or has no string
    /// `access_token` member.
    pub fn from_response_body(body: &str) -> AuthResult<Self> {
        let json: Value = serde_json::from_str(body).map_err(|e| {
            AuthError::malformed_response(format!("Token response is not JSON: {e}"))
        })?;

        let token = json
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::malformed_response("Token response has no access_token"))?;

        Ok(Self {
            token: token.to_string(),
            token_type: json
                .get("token_type")
                .and_then(Value::as_str)
                .map(String::from),
            expires_in: json.get("expires_in").and_then(Value::as_u64),
            scope: json.get("scope").and_then(Value::as_str).map(String::from),
            received_at: OffsetDateTime::now_utc(),
        })
    }

    /// Returns the raw bearer token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Returns the token type reported by the server (usually "Bearer").
    #[must_use]
    pub fn token_type(&self) -> Option<&str> {
        self.token_type.as_deref()
    }

    /// Returns the lifetime in seconds reported by the server.
    #[must_use]
    pub fn expires_in(&self) -> Option<u64> {
        self.expires_in
    }

    /// Returns the granted scope reported by the server.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Returns when the token expires, if the server reported a lifetime.
    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        let secs = i64::try_from(self.expires_in?).ok()?;
        self.received_at.checked_add(Duration::seconds(secs))
    }

    /// Returns a shortened form of the token safe for display.
    #[must_use]
    pub fn preview(&self) -> String {
        let token = &self.token;
        if token.len() > 20 && token.is_ascii() {
            format!("{}...{}", &token[..8], &token[token.len() - 8..])
        } else {
            "*".repeat(token.len().min(8))
        }
    }
}

impl PartialEq<&str> for AccessToken {
    fn eq(&self, other: &&str) -> bool {
        self.token == *other
    }
}

impl PartialEq<str> for AccessToken {
    fn eq(&self, other: &str) -> bool {
        self.token == other
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &self.preview())
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Performs the client credentials grant against a token endpoint.
#[derive(Debug, Clone)]
pub struct TokenExchanger {
    http: reqwest::Client,
    scope: String,
}

impl TokenExchanger {
    /// Creates an exchanger requesting `scope` (space-delimited).
    #[must_use]
    pub fn new(http: reqwest::Client, scope: impl Into<String>) -> Self {
        Self {
            http,
            scope: scope.into(),
        }
    }

    /// Returns the requested scope.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Exchanges a signed client assertion for an access token.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The endpoint cannot be reached (`NetworkError`)
    /// - The endpoint answers with a non-success status (`TokenRequestFailed`)
    /// - The response has no `access_token` (`MalformedResponse`)
    pub async fn exchange(
        &self,
        token_endpoint: &Url,
        client_assertion: &ClientAssertion,
    ) -> AuthResult<AccessToken> {
        let params = [
            ("grant_type", "client_credentials"),
            ("scope", self.scope.as_str()),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", client_assertion.as_str()),
        ];

        tracing::debug!(
            endpoint = %token_endpoint,
            jti = %client_assertion.claims().jti,
            scope = %self.scope,
            "Requesting access token with client assertion"
        );

        let response = self
            .http
            .post(token_endpoint.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Token request to {} failed: {}", token_endpoint, e);
                AuthError::from(e)
            })?;

        read_token_response(response).await
    }

    /// Performs the client credentials grant with `client_secret_basic`.
    ///
    /// Used for clients registered with a shared secret instead of a JWKS.
    pub async fn exchange_with_secret(
        &self,
        token_endpoint: &Url,
        client_id: &str,
        client_secret: &str,
    ) -> AuthResult<AccessToken> {
        let params = [
            ("grant_type", "client_credentials"),
            ("scope", self.scope.as_str()),
        ];

        tracing::debug!(
            endpoint = %token_endpoint,
            client_id,
            "Requesting access token with client secret"
        );

        let response = self
            .http
            .post(token_endpoint.clone())
            .basic_auth(client_id, Some(client_secret))
            .form(&params)
            .send()
            .await?;

        read_token_response(response).await
    }

    /// Performs the client credentials grant with `client_secret_post`.
    pub async fn exchange_with_secret_post(
        &self,
        token_endpoint: &Url,
        client_id: &str,
        client_secret: &str,
    ) -> AuthResult<AccessToken> {
        let params = [
            ("grant_type", "client_credentials"),
            ("scope", self.scope.as_str()),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];

        tracing::debug!(
            endpoint = %token_endpoint,
            client_id,
            "Requesting access token with client secret in form body"
        );

        let response = self
            .http
            .post(token_endpoint.clone())
            .form(&params)
            .send()
            .await?;

        read_token_response(response).await
    }
}

async fn read_token_response(response: reqwest::Response) -> AuthResult<AccessToken> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), "Token endpoint rejected the request");
        return Err(AuthError::token_request_failed(status.as_u16(), body));
    }

    let token = AccessToken::from_response_body(&body)?;
    tracing::info!(
        token_type = token.token_type().unwrap_or("unknown"),
        expires_in = token.expires_in(),
        "Access token obtained"
    );
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_response() {
        let token = AccessToken::from_response_body(
            r#"{"access_token":"tok-xyz","token_type":"Bearer","expires_in":3600,"scope":"system/Patient.read"}"#,
        )
        .unwrap();
        assert_eq!(token, "tok-xyz");
        assert_eq!(token.token_type(), Some("Bearer"));
        assert_eq!(token.expires_in(), Some(3600));
        assert_eq!(token.scope(), Some("system/Patient.read"));
        assert!(token.expires_at().is_some());
    }

    #[test]
    fn test_parse_minimal_response() {
        let token = AccessToken::from_response_body(r#"{"access_token":"tok"}"#).unwrap();
        assert_eq!(token.as_str(), "tok");
        assert_eq!(token.expires_at(), None);
    }

    #[test]
    fn test_missing_access_token_is_malformed() {
        let err = AccessToken::from_response_body(r#"{"token_type":"Bearer"}"#).unwrap_err();
        assert!(matches!(err, AuthError::MalformedResponse { .. }));

        let err = AccessToken::from_response_body(r#"{"access_token":42}"#).unwrap_err();
        assert!(matches!(err, AuthError::MalformedResponse { .. }));

        let err = AccessToken::from_response_body("<html>oops</html>").unwrap_err();
        assert!(matches!(err, AuthError::MalformedResponse { .. }));
    }

    #[test]
    fn test_preview_hides_token() {
        let token = AccessToken::new("abcdefgh-0123456789-ijklmnop");
        assert_eq!(token.preview(), "abcdefgh...ijklmnop");
        assert!(!format!("{token:?}").contains("0123456789"));

        let short = AccessToken::new("tok");
        assert_eq!(short.preview(), "***");
    }
}
