//! One-time client setup: key generation, JWKS publication, registration.

use crate::AuthResult;
use crate::config::FhirBridgeConfig;
use crate::error::AuthError;
use crate::jwk::KeySet;
use crate::keys::{GeneratedKeyPair, SigningAlgorithm, generate_for};
use crate::registration::{ClientMetadata, Registered, TokenEndpointAuthMethod, register};
use crate::store::{KeyValueStore, keys, load_required};

/// Generates a key pair for `algorithm` and stores both PEMs.
///
/// # Errors
/// Returns a `Storage` error if a private key already exists and `force`
/// is not set.
pub async fn generate_keys<S>(
    store: &S,
    algorithm: SigningAlgorithm,
    rsa_bits: usize,
    force: bool,
) -> AuthResult<GeneratedKeyPair>
where
    S: KeyValueStore + ?Sized,
{
    if !force && store.exists(keys::PRIVATE_KEY).await? {
        return Err(AuthError::storage(format!(
            "{} already exists; refusing to overwrite",
            keys::PRIVATE_KEY
        )));
    }

    let pair = generate_for(algorithm, rsa_bits)?;
    store
        .save(keys::PRIVATE_KEY, pair.private_pem.as_bytes())
        .await?;
    store.save(keys::PUBLIC_KEY, pair.public_pem.as_bytes()).await?;

    tracing::info!(kind = %pair.kind, %algorithm, "Generated signing key pair");
    Ok(pair)
}

/// Builds the JWKS from the stored public key and stores it.
pub async fn publish_jwks<S>(store: &S) -> AuthResult<KeySet>
where
    S: KeyValueStore + ?Sized,
{
    let pem = load_required(store, keys::PUBLIC_KEY).await?;
    let pem = String::from_utf8(pem).map_err(|_| {
        AuthError::invalid_key_format(format!("{} is not UTF-8", keys::PUBLIC_KEY))
    })?;

    let jwks = KeySet::from_public_pem(&pem)?;
    store.save(keys::JWKS, &jwks.to_json_pretty()?).await?;

    if let Some(kid) = jwks.active_key()?.kid.as_deref() {
        tracing::info!(kid, "Published JWKS");
    }
    Ok(jwks)
}

/// Returns the stored JWKS, publishing it first if only the public key exists.
pub async fn load_or_publish_jwks<S>(store: &S) -> AuthResult<KeySet>
where
    S: KeyValueStore + ?Sized,
{
    match store.load(keys::JWKS).await? {
        Some(bytes) => KeySet::from_json(&bytes),
        None => publish_jwks(store).await,
    }
}

/// Registers the client and stores the raw server response.
///
/// `private_key_jwt` and `client_secret_post` registrations carry the JWKS;
/// `client_secret_basic` registrations carry none.
pub async fn register_client<S>(
    http: &reqwest::Client,
    config: &FhirBridgeConfig,
    store: &S,
    method: TokenEndpointAuthMethod,
) -> AuthResult<Registered>
where
    S: KeyValueStore + ?Sized,
{
    let jwks = match method {
        TokenEndpointAuthMethod::ClientSecretBasic => None,
        TokenEndpointAuthMethod::PrivateKeyJwt | TokenEndpointAuthMethod::ClientSecretPost => {
            Some(load_or_publish_jwks(store).await?)
        }
    };

    let metadata = ClientMetadata::from_settings(&config.client, method, jwks)?;
    let endpoint = config.endpoints.registration_url()?;
    let registered = register(http, &endpoint, &metadata).await?;

    store.save(keys::REGISTRATION, &registered.raw).await?;
    Ok(registered)
}
