//! JWT client assertions for `private_key_jwt` client authentication.
//!
//! Builds assertions per RFC 7523 for the OAuth 2.0 client credentials
//! grant:
//!
//! - `iss` and `sub`: the client_id
//! - `aud`: the token endpoint URL
//! - `jti`: a fresh UUID for every assertion
//! - `iat`: issue time
//! - `exp`: `iat` + [`ASSERTION_LIFETIME_SECS`]
//!
//! The `kid` of the signing key goes into the JOSE header so the
//! authorization server can pick the matching key from the registered JWKS.
//! Assertions are single use; build a new one for every token request.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Header, Validation, decode, decode_header, encode};
use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::AuthError;
use crate::jwk::Jwk;
use crate::keys::{PrivateKey, SigningAlgorithm};

/// Lifetime of a client assertion in seconds.
pub const ASSERTION_LIFETIME_SECS: i64 = 600;

/// `client_assertion_type` value for JWT bearer assertions.
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// JWT claims for client assertions per RFC 7523.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAssertionClaims {
    /// Issuer - the client_id.
    pub iss: String,

    /// Subject - the client_id.
    pub sub: String,

    /// Audience - the token endpoint URL.
    pub aud: String,

    /// JWT ID, unique per assertion.
    pub jti: String,

    /// Issued at time as Unix timestamp.
    pub iat: i64,

    /// Expiration time as Unix timestamp.
    pub exp: i64,
}

impl ClientAssertionClaims {
    /// Creates claims issued at `issued_at` with a fresh `jti`.
    #[must_use]
    pub fn new(client_id: &str, audience: &str, issued_at: i64) -> Self {
        Self {
            iss: client_id.to_string(),
            sub: client_id.to_string(),
            aud: audience.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
        }
    }
}

/// A signed client assertion.
#[derive(Clone)]
pub struct ClientAssertion {
    token: String,
    kid: String,
    algorithm: SigningAlgorithm,
    claims: ClientAssertionClaims,
}

impl ClientAssertion {
    /// Returns the compact JWT.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Returns the claims that were signed.
    #[must_use]
    pub fn claims(&self) -> &ClientAssertionClaims {
        &self.claims
    }

    /// Returns the `kid` placed in the header.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Returns the signing algorithm.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Consumes the assertion, returning the compact JWT.
    #[must_use]
    pub fn into_string(self) -> String {
        self.token
    }
}

impl fmt::Debug for ClientAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientAssertion")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("claims", &self.claims)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ClientAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

/// Builds and signs a client assertion issued now.
///
/// # Errors
///
/// Returns an error if:
/// - The system clock is before the Unix epoch (`ClockError`)
/// - The private key does not fit `algorithm` (`SigningError`)
pub fn build_assertion(
    client_id: &str,
    audience: &str,
    private_key: &PrivateKey,
    kid: &str,
    algorithm: SigningAlgorithm,
) -> AuthResult<ClientAssertion> {
    let issued_at = unix_now()?;
    build_assertion_at(client_id, audience, private_key, kid, algorithm, issued_at)
}

/// Builds and signs a client assertion issued at `issued_at`.
pub fn build_assertion_at(
    client_id: &str,
    audience: &str,
    private_key: &PrivateKey,
    kid: &str,
    algorithm: SigningAlgorithm,
    issued_at: i64,
) -> AuthResult<ClientAssertion> {
    if client_id.is_empty() {
        return Err(AuthError::configuration("client_id cannot be empty"));
    }

    let encoding_key = private_key.encoding_key(algorithm)?;
    let claims = ClientAssertionClaims::new(client_id, audience, issued_at);

    let mut header = Header::new(algorithm.to_jwt_algorithm());
    header.kid = Some(kid.to_string());

    let token = encode(&header, &claims, &encoding_key)
        .map_err(|e| AuthError::signing(e.to_string()))?;

    tracing::debug!(
        client_id,
        kid,
        alg = %algorithm,
        jti = %claims.jti,
        exp = claims.exp,
        "Built client assertion"
    );

    Ok(ClientAssertion {
        token,
        kid: kid.to_string(),
        algorithm,
        claims,
    })
}

/// Verifies a client assertion against a public JWK.
///
/// Checks the signature, `iss == sub == expected_client_id`, `aud`,
/// expiry, and that the lifetime does not exceed [`ASSERTION_LIFETIME_SECS`].
/// When the header carries a `kid` it must match the key's derived `kid`.
///
/// # Errors
/// Returns `InvalidAssertion` on any verification failure and
/// `InvalidKeyFormat` if the JWK is unusable.
pub fn verify_assertion(
    assertion: &str,
    jwk: &Jwk,
    expected_client_id: &str,
    audience: &str,
) -> AuthResult<ClientAssertionClaims> {
    let header = decode_header(assertion)
        .map_err(|e| AuthError::invalid_assertion(format!("Invalid JWT header: {e}")))?;

    let algorithm = SigningAlgorithm::from_jwt_algorithm(header.alg).ok_or_else(|| {
        AuthError::invalid_assertion(format!("Unsupported JWT algorithm: {:?}", header.alg))
    })?;
    if jwk.kind() != Some(algorithm.key_kind()) {
        return Err(AuthError::invalid_assertion(format!(
            "Algorithm {algorithm} does not match {} key",
            jwk.kty
        )));
    }

    if let Some(kid) = header.kid.as_deref() {
        let expected_kid = jwk.resolved_kid()?;
        if kid != expected_kid {
            return Err(AuthError::invalid_assertion(format!(
                "Assertion kid '{kid}' does not match key '{expected_kid}'"
            )));
        }
    }

    let mut validation = Validation::new(algorithm.to_jwt_algorithm());
    validation.set_audience(&[audience]);
    validation.set_issuer(&[expected_client_id]);
    validation.sub = Some(expected_client_id.to_string());
    validation.set_required_spec_claims(&["exp", "iss", "sub", "aud"]);

    let claims = decode::<ClientAssertionClaims>(assertion, &jwk.decoding_key()?, &validation)
        .map_err(|e| {
            tracing::debug!("Client assertion verification failed: {}", e);
            AuthError::invalid_assertion(e.to_string())
        })?
        .claims;

    if claims.exp - claims.iat > ASSERTION_LIFETIME_SECS {
        return Err(AuthError::invalid_assertion(format!(
            "Assertion lifetime exceeds {ASSERTION_LIFETIME_SECS} seconds"
        )));
    }

    Ok(claims)
}

fn unix_now() -> AuthResult<i64> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AuthError::clock(format!("System time is before the Unix epoch: {e}")))?;
    i64::try_from(elapsed.as_secs())
        .map_err(|_| AuthError::clock("System time is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwk::KeySet;
    use crate::keys::{generate_ec, generate_rsa};

    const CLIENT_ID: &str = "abc123";
    const TOKEN_URL: &str = "https://example.test/token";

    fn rsa_material() -> (PrivateKey, Jwk) {
        let pair = generate_rsa(2048).unwrap();
        let key = PrivateKey::from_pem(&pair.private_pem).unwrap();
        let set = KeySet::from_public_pem(&pair.public_pem).unwrap();
        (key, set.keys[0].clone())
    }

    #[test]
    fn test_claims_expiry_window() {
        let claims = ClientAssertionClaims::new(CLIENT_ID, TOKEN_URL, 1_700_000_000);
        assert_eq!(claims.iss, CLIENT_ID);
        assert_eq!(claims.sub, CLIENT_ID);
        assert_eq!(claims.aud, TOKEN_URL);
        assert_eq!(claims.exp - claims.iat, 600);
    }

    #[test]
    fn test_assertions_have_distinct_jti() {
        let (key, jwk) = rsa_material();
        let kid = jwk.kid.clone().unwrap();

        let first = build_assertion(CLIENT_ID, TOKEN_URL, &key, &kid, SigningAlgorithm::RS384)
            .unwrap();
        let second = build_assertion(CLIENT_ID, TOKEN_URL, &key, &kid, SigningAlgorithm::RS384)
            .unwrap();

        assert_ne!(first.claims().jti, second.claims().jti);
        assert_ne!(first.as_str(), second.as_str());
    }

    #[test]
    fn test_expiry_invariant_holds_for_built_assertion() {
        let (key, jwk) = rsa_material();
        let kid = jwk.kid.clone().unwrap();
        let assertion =
            build_assertion(CLIENT_ID, TOKEN_URL, &key, &kid, SigningAlgorithm::RS384).unwrap();
        let claims = assertion.claims();
        assert_eq!(claims.exp - claims.iat, ASSERTION_LIFETIME_SECS);
    }

    #[test]
    fn test_rs384_round_trip_verifies() {
        let (key, jwk) = rsa_material();
        let kid = jwk.kid.clone().unwrap();
        let assertion =
            build_assertion(CLIENT_ID, TOKEN_URL, &key, &kid, SigningAlgorithm::RS384).unwrap();

        let header = decode_header(assertion.as_str()).unwrap();
        assert_eq!(header.kid.as_deref(), Some(kid.as_str()));
        assert_eq!(header.alg, jsonwebtoken::Algorithm::RS384);

        let claims = verify_assertion(assertion.as_str(), &jwk, CLIENT_ID, TOKEN_URL).unwrap();
        assert_eq!(claims.iss, CLIENT_ID);
        assert_eq!(claims.sub, CLIENT_ID);
        assert_eq!(claims.aud, TOKEN_URL);
        assert_eq!(&claims, assertion.claims());
    }

    #[test]
    fn test_rs256_round_trip_verifies() {
        let (key, jwk) = rsa_material();
        let kid = jwk.kid.clone().unwrap();
        let assertion =
            build_assertion(CLIENT_ID, TOKEN_URL, &key, &kid, SigningAlgorithm::RS256).unwrap();
        assert!(verify_assertion(assertion.as_str(), &jwk, CLIENT_ID, TOKEN_URL).is_ok());
    }

    #[test]
    fn test_es384_round_trip_verifies() {
        let pair = generate_ec().unwrap();
        let key = PrivateKey::from_pem(&pair.private_pem).unwrap();
        let jwk = KeySet::from_public_pem(&pair.public_pem).unwrap().keys[0].clone();
        let kid = jwk.kid.clone().unwrap();

        let assertion =
            build_assertion(CLIENT_ID, TOKEN_URL, &key, &kid, SigningAlgorithm::ES384).unwrap();
        assert!(verify_assertion(assertion.as_str(), &jwk, CLIENT_ID, TOKEN_URL).is_ok());
    }

    #[test]
    fn test_verify_rejects_wrong_audience_and_client() {
        let (key, jwk) = rsa_material();
        let kid = jwk.kid.clone().unwrap();
        let assertion =
            build_assertion(CLIENT_ID, TOKEN_URL, &key, &kid, SigningAlgorithm::RS384).unwrap();

        let err = verify_assertion(assertion.as_str(), &jwk, CLIENT_ID, "https://other.test/token")
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidAssertion { .. }));

        let err = verify_assertion(assertion.as_str(), &jwk, "someone-else", TOKEN_URL)
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidAssertion { .. }));
    }

    #[test]
    fn test_verify_rejects_other_key() {
        let (key, jwk) = rsa_material();
        let (_, other_jwk) = rsa_material();
        let assertion = build_assertion(
            CLIENT_ID,
            TOKEN_URL,
            &key,
            jwk.kid.as_deref().unwrap(),
            SigningAlgorithm::RS384,
        )
        .unwrap();

        let err = verify_assertion(assertion.as_str(), &other_jwk, CLIENT_ID, TOKEN_URL)
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidAssertion { .. }));
    }

    #[test]
    fn test_verify_rejects_expired_assertion() {
        let (key, jwk) = rsa_material();
        let kid = jwk.kid.clone().unwrap();
        let assertion = build_assertion_at(
            CLIENT_ID,
            TOKEN_URL,
            &key,
            &kid,
            SigningAlgorithm::RS384,
            1_000_000_000,
        )
        .unwrap();

        let err = verify_assertion(assertion.as_str(), &jwk, CLIENT_ID, TOKEN_URL).unwrap_err();
        assert!(matches!(err, AuthError::InvalidAssertion { .. }));
    }

    #[test]
    fn test_ec_key_with_rsa_algorithm_is_signing_error() {
        let pair = generate_ec().unwrap();
        let key = PrivateKey::from_pem(&pair.private_pem).unwrap();
        let err = build_assertion(CLIENT_ID, TOKEN_URL, &key, "kid", SigningAlgorithm::RS384)
            .unwrap_err();
        assert!(matches!(err, AuthError::SigningError { .. }));
    }

    #[test]
    fn test_empty_client_id_rejected() {
        let (key, _) = rsa_material();
        assert!(build_assertion("", TOKEN_URL, &key, "kid", SigningAlgorithm::RS384).is_err());
    }

    #[test]
    fn test_debug_does_not_print_token() {
        let (key, jwk) = rsa_material();
        let assertion = build_assertion(
            CLIENT_ID,
            TOKEN_URL,
            &key,
            jwk.kid.as_deref().unwrap(),
            SigningAlgorithm::RS384,
        )
        .unwrap();
        let debug = format!("{assertion:?}");
        assert!(!debug.contains(assertion.as_str()));
        assert_eq!(assertion.to_string(), assertion.as_str());
    }
}
