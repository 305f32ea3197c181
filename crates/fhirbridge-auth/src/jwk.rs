//! JSON Web Keys and content-derived key identifiers.
//!
//! A `kid` is the unpadded base64url SHA-256 digest of the JWK's compact
//! JSON serialization with the `kid` member removed. Keys built here
//! serialize in the declaration order of [`Jwk`]. Keys parsed from a JWKS
//! document are hashed over every member in document order, including
//! members [`Jwk`] does not model, so a set written by another producer
//! keeps its published identifiers.
//!
//! Identifiers are never trusted from storage: [`Jwk::resolved_kid`] always
//! recomputes and only warns when a persisted value has drifted.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::DecodingKey;
use p384::ecdsa::VerifyingKey as EcVerifyingKey;
use p384::pkcs8::DecodePublicKey as EcDecodePublicKey;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::AuthResult;
use crate::error::AuthError;
use crate::keys::KeyKind;

/// Length of a derived key identifier (base64url of a 32-byte digest).
pub const KID_LENGTH: usize = 43;

/// Computes the content-derived key identifier of a public JWK.
///
/// # Errors
/// Returns `InvalidKeyFormat` if required members for the key type are
/// missing or the key cannot be serialized.
pub fn derive_kid(jwk: &Jwk) -> AuthResult<String> {
    jwk.check_members()?;

    let current = match serde_json::to_value(Jwk {
        kid: None,
        ..jwk.clone()
    }) {
        Ok(Value::Object(members)) => members,
        Ok(_) => return Err(AuthError::invalid_key_format("JWK is not a JSON object")),
        Err(e) => {
            return Err(AuthError::invalid_key_format(format!(
                "Cannot serialize JWK: {e}"
            )));
        }
    };

    // Parsed keys keep their document order; members added since parsing go last.
    let mut canonical = Map::new();
    if let Some(source) = &jwk.source {
        for name in source.keys() {
            if let Some(value) = current.get(name) {
                canonical.insert(name.clone(), value.clone());
            }
        }
    }
    for (name, value) in current {
        if !canonical.contains_key(&name) {
            canonical.insert(name, value);
        }
    }

    let bytes = serde_json::to_vec(&canonical)
        .map_err(|e| AuthError::invalid_key_format(format!("Cannot serialize JWK: {e}")))?;

    Ok(URL_SAFE_NO_PAD.encode(Sha256::digest(&bytes)))
}

/// JSON Web Key (public part only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC").
    pub kty: String,

    // RSA-specific fields
    /// RSA modulus (base64url encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    // EC-specific fields
    /// EC curve name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    /// Key use ("sig" for signing).
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,

    /// Algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Key ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Members not modelled above (`key_ops`, `x5c`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,

    /// All members in document order, for keys read from a JWKS.
    #[serde(skip)]
    source: Option<Map<String, Value>>,
}

impl PartialEq for Jwk {
    fn eq(&self, other: &Self) -> bool {
        self.kty == other.kty
            && self.n == other.n
            && self.e == other.e
            && self.crv == other.crv
            && self.x == other.x
            && self.y == other.y
            && self.use_ == other.use_
            && self.alg == other.alg
            && self.kid == other.kid
            && self.extra == other.extra
    }
}

impl Eq for Jwk {}

impl Jwk {
    /// Builds a signing JWK from a PEM-encoded public key.
    ///
    /// Accepts SPKI ("PUBLIC KEY") RSA or P-384 keys and PKCS#1
    /// ("RSA PUBLIC KEY") RSA keys. The result has `use = "sig"` and no `kid`.
    ///
    /// # Errors
    /// Returns `InvalidKeyFormat` if the PEM is not a supported public key.
    pub fn from_public_pem(pem: &str) -> AuthResult<Self> {
        let rsa_key = RsaPublicKey::from_public_key_pem(pem)
            .ok()
            .or_else(|| RsaPublicKey::from_pkcs1_pem(pem).ok());
        if let Some(key) = rsa_key {
            return Ok(Self {
                kty: "RSA".to_string(),
                n: Some(URL_SAFE_NO_PAD.encode(key.n().to_bytes_be())),
                e: Some(URL_SAFE_NO_PAD.encode(key.e().to_bytes_be())),
                crv: None,
                x: None,
                y: None,
                use_: Some("sig".to_string()),
                alg: None,
                kid: None,
                extra: Map::new(),
                source: None,
            });
        }

        let ec_key = <EcVerifyingKey as EcDecodePublicKey>::from_public_key_pem(pem).map_err(|_| {
            AuthError::invalid_key_format("PEM is not an RSA or P-384 public key")
        })?;
        let point = ec_key.to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| AuthError::invalid_key_format("Missing x coordinate"))?;
        let y = point
            .y()
            .ok_or_else(|| AuthError::invalid_key_format("Missing y coordinate"))?;

        Ok(Self {
            kty: "EC".to_string(),
            n: None,
            e: None,
            crv: Some("P-384".to_string()),
            x: Some(URL_SAFE_NO_PAD.encode(x.as_slice())),
            y: Some(URL_SAFE_NO_PAD.encode(y.as_slice())),
            use_: Some("sig".to_string()),
            alg: None,
            kid: None,
            extra: Map::new(),
            source: None,
        })
    }

    /// Parses a JWK object, remembering its members in document order.
    ///
    /// # Errors
    /// Returns `InvalidKeyFormat` if the value is not a JWK object.
    pub fn from_value(value: &Value) -> AuthResult<Self> {
        let members = value
            .as_object()
            .ok_or_else(|| AuthError::invalid_key_format("JWK is not a JSON object"))?;
        let mut jwk: Self = serde_json::from_value(value.clone())
            .map_err(|e| AuthError::invalid_key_format(format!("Invalid JWK: {e}")))?;
        jwk.source = Some(members.clone());
        Ok(jwk)
    }

    /// Returns the key family, if `kty` is supported.
    #[must_use]
    pub fn kind(&self) -> Option<KeyKind> {
        match self.kty.as_str() {
            "RSA" => Some(KeyKind::Rsa),
            "EC" => Some(KeyKind::Ec),
            _ => None,
        }
    }

    /// Returns a copy with `kid` set to the derived identifier.
    ///
    /// # Errors
    /// Returns `InvalidKeyFormat` if the key is incomplete.
    pub fn with_derived_kid(mut self) -> AuthResult<Self> {
        self.kid = Some(derive_kid(&self)?);
        Ok(self)
    }

    /// Recomputes the key identifier from the key material.
    ///
    /// A persisted `kid` that differs from the recomputed value is ignored.
    pub fn resolved_kid(&self) -> AuthResult<String> {
        let derived = derive_kid(self)?;
        if let Some(stored) = self.kid.as_deref()
            && stored != derived
        {
            tracing::warn!(
                stored_kid = stored,
                derived_kid = %derived,
                "Persisted kid does not match key material; using derived kid"
            );
        }
        Ok(derived)
    }

    /// Builds a verification key for signatures made by this key.
    ///
    /// # Errors
    /// Returns `InvalidKeyFormat` if the key is incomplete or unsupported.
    pub fn decoding_key(&self) -> AuthResult<DecodingKey> {
        self.check_members()?;
        match self.kind() {
            Some(KeyKind::Rsa) => DecodingKey::from_rsa_components(
                self.n.as_deref().unwrap_or_default(),
                self.e.as_deref().unwrap_or_default(),
            ),
            Some(KeyKind::Ec) => DecodingKey::from_ec_components(
                self.x.as_deref().unwrap_or_default(),
                self.y.as_deref().unwrap_or_default(),
            ),
            None => {
                return Err(AuthError::invalid_key_format(format!(
                    "Unsupported key type: {}",
                    self.kty
                )));
            }
        }
        .map_err(|e| AuthError::invalid_key_format(e.to_string()))
    }

    fn check_members(&self) -> AuthResult<()> {
        let missing = |member: &str| {
            AuthError::invalid_key_format(format!(
                "{} JWK is missing the '{member}' member",
                self.kty
            ))
        };

        match self.kty.as_str() {
            "" => Err(AuthError::invalid_key_format("JWK is missing 'kty'")),
            "RSA" => {
                if self.n.as_deref().is_none_or(str::is_empty) {
                    return Err(missing("n"));
                }
                if self.e.as_deref().is_none_or(str::is_empty) {
                    return Err(missing("e"));
                }
                Ok(())
            }
            "EC" => {
                if self.crv.as_deref().is_none_or(str::is_empty) {
                    return Err(missing("crv"));
                }
                if self.x.as_deref().is_none_or(str::is_empty) {
                    return Err(missing("x"));
                }
                if self.y.as_deref().is_none_or(str::is_empty) {
                    return Err(missing("y"));
                }
                Ok(())
            }
            other => Err(AuthError::invalid_key_format(format!(
                "Unsupported key type: {other}"
            ))),
        }
    }
}

/// JSON Web Key Set. The first key is the active signing key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct KeySet {
    /// The keys in this set.
    pub keys: Vec<Jwk>,
}

impl TryFrom<Value> for KeySet {
    type Error = AuthError;

    fn try_from(value: Value) -> AuthResult<Self> {
        let keys = value
            .get("keys")
            .and_then(Value::as_array)
            .ok_or_else(|| AuthError::invalid_key_format("JWKS has no \"keys\" array"))?
            .iter()
            .map(Jwk::from_value)
            .collect::<AuthResult<Vec<_>>>()?;
        Ok(Self { keys })
    }
}

impl KeySet {
    /// Creates a set holding a single key.
    #[must_use]
    pub fn single(key: Jwk) -> Self {
        Self { keys: vec![key] }
    }

    /// Builds a one-key set from a public key PEM with a derived `kid`.
    pub fn from_public_pem(pem: &str) -> AuthResult<Self> {
        let jwk = Jwk::from_public_pem(pem)?.with_derived_kid()?;
        Ok(Self::single(jwk))
    }

    /// Parses a JWKS document.
    ///
    /// # Errors
    /// Returns `InvalidKeyFormat` if the document is not `{"keys": [...]}`.
    pub fn from_json(bytes: &[u8]) -> AuthResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| AuthError::invalid_key_format(format!("Invalid JWKS document: {e}")))
    }

    /// Serializes the set as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> AuthResult<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| AuthError::invalid_key_format(format!("Cannot serialize JWKS: {e}")))
    }

    /// Returns the active signing key.
    ///
    /// # Errors
    /// Returns `InvalidKeyFormat` if the set is empty.
    pub fn active_key(&self) -> AuthResult<&Jwk> {
        self.keys
            .first()
            .ok_or_else(|| AuthError::invalid_key_format("JWKS contains no keys"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsa_jwk() -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            n: Some("0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4".to_string()),
            e: Some("AQAB".to_string()),
            crv: None,
            x: None,
            y: None,
            use_: Some("sig".to_string()),
            alg: None,
            kid: None,
            extra: Map::new(),
            source: None,
        }
    }

    #[test]
    fn test_derive_kid_is_deterministic() {
        let jwk = rsa_jwk();
        let first = derive_kid(&jwk).unwrap();
        let second = derive_kid(&jwk).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), KID_LENGTH);
        assert!(!first.contains('='));
        assert!(!first.contains('+'));
        assert!(!first.contains('/'));
    }

    #[test]
    fn test_derive_kid_matches_manual_digest() {
        let jwk = rsa_jwk();
        let expected_json = r#"{"kty":"RSA","n":"0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4","e":"AQAB","use":"sig"}"#;
        assert_eq!(serde_json::to_string(&jwk).unwrap(), expected_json);

        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(expected_json.as_bytes()));
        assert_eq!(derive_kid(&jwk).unwrap(), expected);
    }

    #[test]
    fn test_derive_kid_ignores_existing_kid() {
        let jwk = rsa_jwk();
        let with_kid = Jwk {
            kid: Some("some-label".to_string()),
            ..jwk.clone()
        };
        assert_eq!(derive_kid(&jwk).unwrap(), derive_kid(&with_kid).unwrap());
    }

    #[test]
    fn test_derive_kid_changes_with_key_material() {
        let jwk = rsa_jwk();
        let other = Jwk {
            e: Some("AQAC".to_string()),
            ..jwk.clone()
        };
        assert_ne!(derive_kid(&jwk).unwrap(), derive_kid(&other).unwrap());
    }

    #[test]
    fn test_derive_kid_rejects_incomplete_keys() {
        let missing_n = Jwk {
            n: None,
            ..rsa_jwk()
        };
        assert!(matches!(
            derive_kid(&missing_n),
            Err(AuthError::InvalidKeyFormat { .. })
        ));

        let missing_kty = Jwk {
            kty: String::new(),
            ..rsa_jwk()
        };
        assert!(derive_kid(&missing_kty).is_err());

        let ec_without_curve = Jwk {
            kty: "EC".to_string(),
            n: None,
            e: None,
            x: Some("x".to_string()),
            y: Some("y".to_string()),
            ..rsa_jwk()
        };
        assert!(derive_kid(&ec_without_curve).is_err());
    }

    #[test]
    fn test_resolved_kid_prefers_key_material() {
        let jwk = Jwk {
            kid: Some("stale".to_string()),
            ..rsa_jwk()
        };
        assert_eq!(jwk.resolved_kid().unwrap(), derive_kid(&rsa_jwk()).unwrap());
    }

    #[test]
    fn test_from_public_pem_rsa() {
        let pair = crate::keys::generate_rsa(2048).unwrap();
        let jwk = Jwk::from_public_pem(&pair.public_pem).unwrap();
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.e.as_deref(), Some("AQAB"));
        assert_eq!(jwk.use_.as_deref(), Some("sig"));
        assert!(jwk.kid.is_none());
        assert!(jwk.decoding_key().is_ok());
    }

    #[test]
    fn test_from_public_pem_ec() {
        let pair = crate::keys::generate_ec().unwrap();
        let jwk = Jwk::from_public_pem(&pair.public_pem).unwrap();
        assert_eq!(jwk.kty, "EC");
        assert_eq!(jwk.crv.as_deref(), Some("P-384"));
        assert!(jwk.x.is_some());
        assert!(jwk.y.is_some());
        assert_eq!(jwk.kind(), Some(KeyKind::Ec));
    }

    #[test]
    fn test_from_public_pem_rejects_garbage() {
        assert!(matches!(
            Jwk::from_public_pem("not a key"),
            Err(AuthError::InvalidKeyFormat { .. })
        ));
    }

    #[test]
    fn test_key_set_json_shape() {
        let set = KeySet::single(rsa_jwk().with_derived_kid().unwrap());
        let json: serde_json::Value =
            serde_json::from_slice(&set.to_json_pretty().unwrap()).unwrap();
        let key = &json["keys"][0];
        assert_eq!(key["kty"], "RSA");
        assert_eq!(key["use"], "sig");
        assert_eq!(key["kid"].as_str().unwrap().len(), KID_LENGTH);
    }

    #[test]
    fn test_key_set_round_trip_preserves_kid() {
        let set = KeySet::single(rsa_jwk().with_derived_kid().unwrap());
        let parsed = KeySet::from_json(&set.to_json_pretty().unwrap()).unwrap();
        let active = parsed.active_key().unwrap();
        assert_eq!(active.resolved_kid().unwrap(), active.kid.clone().unwrap());
    }

    #[test]
    fn test_empty_key_set_has_no_active_key() {
        assert!(KeySet::default().active_key().is_err());
        assert!(KeySet::from_json(br#"{"nokeys": []}"#).is_err());
    }

    #[test]
    fn test_loaded_kid_follows_document_member_order() {
        let members = r#"{"kty":"RSA","alg":"RS384","e":"AQAB","n":"0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4","use":"sig","key_ops":["verify"]}"#;
        let kid = URL_SAFE_NO_PAD.encode(Sha256::digest(members.as_bytes()));
        let document = format!(
            r#"{{"keys":[{},"kid":"{kid}"}}]}}"#,
            &members[..members.len() - 1]
        );

        let set = KeySet::from_json(document.as_bytes()).unwrap();
        let key = set.active_key().unwrap();
        assert_eq!(key.kid.as_deref(), Some(kid.as_str()));
        assert_eq!(key.resolved_kid().unwrap(), kid);
        assert_eq!(key.extra["key_ops"], serde_json::json!(["verify"]));
        assert_ne!(kid, derive_kid(&rsa_jwk()).unwrap());
    }

    #[test]
    fn test_loaded_key_equals_built_key() {
        let built = rsa_jwk().with_derived_kid().unwrap();
        let set = KeySet::single(built.clone());
        let loaded = KeySet::from_json(&set.to_json_pretty().unwrap()).unwrap();
        assert_eq!(loaded.keys[0], built);
        assert_eq!(loaded.keys[0].resolved_kid().unwrap(), built.kid.unwrap());
    }
}
