//! End-to-end client authentication: load material, sign, exchange, fetch.
//!
//! Every call loads material from the store and signs a fresh assertion.
//! Nothing is cached between calls, so each token request carries a new
//! `jti`.

use serde_json::Value;

use crate::AuthResult;
use crate::assertion::{ClientAssertion, build_assertion};
use crate::config::FhirBridgeConfig;
use crate::error::AuthError;
use crate::fhir::FhirClient;
use crate::http::build_http_client;
use crate::jwk::{Jwk, KeySet};
use crate::keys::PrivateKey;
use crate::registration::{ClientRegistration, TokenEndpointAuthMethod};
use crate::store::{KeyValueStore, keys, load_required};
use crate::token::{AccessToken, TokenExchanger};

/// Persisted material needed to sign client assertions.
#[derive(Debug, Clone)]
pub struct ClientMaterial {
    /// Signing key.
    pub private_key: PrivateKey,
    /// Published key set; the first key matches `private_key`.
    pub jwks: KeySet,
    /// Server-issued registration record.
    pub registration: ClientRegistration,
}

impl ClientMaterial {
    /// Loads the private key, JWKS and registration record.
    ///
    /// # Errors
    /// Returns a `Storage` error naming the first missing entry, or the
    /// parse error of the first malformed one.
    pub async fn load<S>(store: &S) -> AuthResult<Self>
    where
        S: KeyValueStore + ?Sized,
    {
        let pem = load_required(store, keys::PRIVATE_KEY).await?;
        let pem = String::from_utf8(pem).map_err(|_| {
            AuthError::invalid_key_format(format!("{} is not UTF-8", keys::PRIVATE_KEY))
        })?;
        let private_key = PrivateKey::from_pem(&pem)?;

        let jwks = KeySet::from_json(&load_required(store, keys::JWKS).await?)?;
        let registration =
            ClientRegistration::from_json(&load_required(store, keys::REGISTRATION).await?)?;

        Ok(Self {
            private_key,
            jwks,
            registration,
        })
    }

    /// Returns the active public key.
    pub fn active_key(&self) -> AuthResult<&Jwk> {
        self.jwks.active_key()
    }

    /// Returns the key identifier derived from the active public key.
    pub fn kid(&self) -> AuthResult<String> {
        self.active_key()?.resolved_kid()
    }

    /// Returns the registered client identifier.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.registration.client_id
    }
}

/// Runs the JWT-bearer client authentication flow against a FHIR server.
#[derive(Debug)]
pub struct ClientAssertionAuthenticator<S> {
    config: FhirBridgeConfig,
    store: S,
    http: reqwest::Client,
}

impl<S: KeyValueStore> ClientAssertionAuthenticator<S> {
    /// Creates an authenticator with an HTTP client built from `config.http`.
    pub fn new(config: FhirBridgeConfig, store: S) -> AuthResult<Self> {
        let http = build_http_client(&config.http)?;
        Ok(Self::with_http_client(config, store, http))
    }

    /// Creates an authenticator with a caller-supplied HTTP client.
    #[must_use]
    pub fn with_http_client(config: FhirBridgeConfig, store: S, http: reqwest::Client) -> Self {
        Self {
            config,
            store,
            http,
        }
    }

    /// Returns the configuration this authenticator was built with.
    #[must_use]
    pub fn config(&self) -> &FhirBridgeConfig {
        &self.config
    }

    /// Returns the backing store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the HTTP client shared by token and resource requests.
    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Loads persisted client material.
    pub async fn load_material(&self) -> AuthResult<ClientMaterial> {
        ClientMaterial::load(&self.store).await
    }

    /// Signs a fresh client assertion for the configured token endpoint.
    pub async fn assertion(&self) -> AuthResult<ClientAssertion> {
        let material = self.load_material().await?;
        self.sign(&material)
    }

    fn sign(&self, material: &ClientMaterial) -> AuthResult<ClientAssertion> {
        let audience = self.config.endpoints.token_url()?;
        let kid = material.kid()?;
        build_assertion(
            material.client_id(),
            audience.as_str(),
            &material.private_key,
            &kid,
            self.config.client.algorithm,
        )
    }

    /// Obtains an access token.
    ///
    /// Clients registered with a secret-based method and holding a secret
    /// authenticate with it; all others sign a client assertion.
    pub async fn access_token(&self) -> AuthResult<AccessToken> {
        let token_url = self.config.endpoints.token_url()?;
        let exchanger = TokenExchanger::new(self.http.clone(), self.config.client.scope.clone());

        let registration =
            ClientRegistration::from_json(&load_required(&self.store, keys::REGISTRATION).await?)?;
        let method = registration
            .token_endpoint_auth_method
            .as_deref()
            .and_then(|m| m.parse::<TokenEndpointAuthMethod>().ok())
            .unwrap_or_default();
        if let Some(secret) = registration.client_secret.as_deref() {
            let client_id = registration.client_id.as_str();
            match method {
                TokenEndpointAuthMethod::ClientSecretBasic => {
                    return exchanger
                        .exchange_with_secret(&token_url, client_id, secret)
                        .await;
                }
                TokenEndpointAuthMethod::ClientSecretPost => {
                    return exchanger
                        .exchange_with_secret_post(&token_url, client_id, secret)
                        .await;
                }
                TokenEndpointAuthMethod::PrivateKeyJwt => {}
            }
        }

        let material = self.load_material().await?;
        let assertion = self.sign(&material)?;
        exchanger.exchange(&token_url, &assertion).await
    }

    /// Runs the full flow and searches `resource_type`.
    pub async fn fetch(
        &self,
        resource_type: &str,
        params: &[(String, String)],
    ) -> AuthResult<Value> {
        let token = self.access_token().await?;
        self.fhir_client()?
            .search(resource_type, params, &token)
            .await
    }

    /// Runs the full flow and reads a single resource.
    pub async fn read(&self, resource_type: &str, id: &str) -> AuthResult<Value> {
        let token = self.access_token().await?;
        self.fhir_client()?.read(resource_type, id, &token).await
    }

    fn fhir_client(&self) -> AuthResult<FhirClient> {
        let base = self.config.endpoints.fhir_base_url()?;
        Ok(FhirClient::new(self.http.clone(), &base))
    }
}
