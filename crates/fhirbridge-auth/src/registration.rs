//! Dynamic client registration (RFC 7591).
//!
//! A client registers once, sending its metadata (and, for
//! `private_key_jwt`, its public JWKS). The returned `client_id` is
//! persisted and read by every later signing step.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::AuthResult;
use crate::config::ClientSettings;
use crate::error::AuthError;
use crate::jwk::KeySet;

/// How the client authenticates at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    /// Signed JWT assertion (RFC 7523).
    #[default]
    PrivateKeyJwt,
    /// Shared secret in the HTTP Basic header.
    ClientSecretBasic,
    /// Shared secret in the form body.
    ClientSecretPost,
}

impl TokenEndpointAuthMethod {
    /// Returns the RFC 7591 name of the method.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrivateKeyJwt => "private_key_jwt",
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
        }
    }
}

impl fmt::Display for TokenEndpointAuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenEndpointAuthMethod {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "private_key_jwt" => Ok(Self::PrivateKeyJwt),
            "client_secret_basic" => Ok(Self::ClientSecretBasic),
            "client_secret_post" => Ok(Self::ClientSecretPost),
            other => Err(AuthError::configuration(format!(
                "Unsupported token endpoint auth method: '{other}'"
            ))),
        }
    }
}

/// Client metadata sent to the registration endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMetadata {
    /// Application type ("private" for confidential clients on OpenEMR).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_type: Option<String>,

    /// Human-readable client name.
    pub client_name: String,

    /// Redirect URIs for authorization code flows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uris: Option<Vec<String>>,

    /// Post-logout redirect URIs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_logout_redirect_uris: Option<Vec<String>>,

    /// Third-party initiated login URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiate_login_url: Option<String>,

    /// Token endpoint authentication method.
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,

    /// Contact e-mail addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Vec<String>>,

    /// Space-delimited scopes the client may request.
    pub scope: String,

    /// Public keys for `private_key_jwt`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks: Option<KeySet>,
}

impl ClientMetadata {
    /// Creates minimal metadata.
    #[must_use]
    pub fn new(
        client_name: impl Into<String>,
        method: TokenEndpointAuthMethod,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            application_type: None,
            client_name: client_name.into(),
            redirect_uris: None,
            post_logout_redirect_uris: None,
            initiate_login_url: None,
            token_endpoint_auth_method: method,
            contacts: None,
            scope: scope.into(),
            jwks: None,
        }
    }

    /// Builds metadata from configured client settings.
    ///
    /// # Errors
    /// Returns a `Configuration` error if `method` is `private_key_jwt`
    /// and no key set is supplied.
    pub fn from_settings(
        settings: &ClientSettings,
        method: TokenEndpointAuthMethod,
        jwks: Option<KeySet>,
    ) -> AuthResult<Self> {
        if method == TokenEndpointAuthMethod::PrivateKeyJwt && jwks.is_none() {
            return Err(AuthError::configuration(
                "private_key_jwt registration requires a JWKS",
            ));
        }

        let non_empty = |v: &Vec<String>| (!v.is_empty()).then(|| v.clone());

        Ok(Self {
            application_type: settings.application_type.clone(),
            client_name: settings.client_name.clone(),
            redirect_uris: non_empty(&settings.redirect_uris),
            post_logout_redirect_uris: non_empty(&settings.post_logout_redirect_uris),
            initiate_login_url: settings.initiate_login_url.clone(),
            token_endpoint_auth_method: method,
            contacts: non_empty(&settings.contacts),
            scope: settings.scope.clone(),
            jwks,
        })
    }

    /// Attaches a JWKS.
    #[must_use]
    pub fn with_jwks(mut self, jwks: KeySet) -> Self {
        self.jwks = Some(jwks);
        self
    }

    /// Sets the redirect URIs.
    #[must_use]
    pub fn with_redirect_uris(mut self, uris: Vec<String>) -> Self {
        self.redirect_uris = Some(uris);
        self
    }
}

/// Registration record returned by the authorization server.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientRegistration {
    /// Opaque client identifier issued by the server.
    pub client_id: String,

    /// Shared secret, for secret-based auth methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Registered client name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    /// Registered auth method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,

    /// Registered scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// All other members returned by the server.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClientRegistration {
    /// Parses a registration record.
    ///
    /// # Errors
    /// Returns `MalformedResponse` if the document is not JSON or has no
    /// non-empty `client_id`.
    pub fn from_json(bytes: &[u8]) -> AuthResult<Self> {
        let registration: Self = serde_json::from_slice(bytes).map_err(|e| {
            AuthError::malformed_response(format!("Invalid registration record: {e}"))
        })?;
        if registration.client_id.is_empty() {
            return Err(AuthError::malformed_response(
                "Registration record has an empty client_id",
            ));
        }
        Ok(registration)
    }
}

impl fmt::Debug for ClientRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistration")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("client_name", &self.client_name)
            .field("token_endpoint_auth_method", &self.token_endpoint_auth_method)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// A successful registration with the exact server response.
#[derive(Debug, Clone)]
pub struct Registered {
    /// Parsed record.
    pub registration: ClientRegistration,
    /// Raw response body as returned by the server.
    pub raw: Vec<u8>,
}

/// Registers a client with the authorization server.
///
/// # Errors
///
/// Returns an error if:
/// - The endpoint cannot be reached (`NetworkError`)
/// - The endpoint answers with a non-success status (`RegistrationFailed`)
/// - The response has no `client_id` (`MalformedResponse`)
pub async fn register(
    http: &reqwest::Client,
    registration_endpoint: &Url,
    metadata: &ClientMetadata,
) -> AuthResult<Registered> {
    tracing::debug!(
        endpoint = %registration_endpoint,
        client_name = %metadata.client_name,
        method = %metadata.token_endpoint_auth_method,
        "Registering client"
    );

    let response = http
        .post(registration_endpoint.clone())
        .json(metadata)
        .send()
        .await?;

    let status = response.status();
    let raw = response.bytes().await?.to_vec();

    if !status.is_success() {
        let body = String::from_utf8_lossy(&raw).into_owned();
        tracing::warn!(status = status.as_u16(), "Client registration rejected");
        return Err(AuthError::registration_failed(status.as_u16(), body));
    }

    let registration = ClientRegistration::from_json(&raw)?;
    tracing::info!(client_id = %registration.client_id, "Client registered");

    Ok(Registered { registration, raw })
}
