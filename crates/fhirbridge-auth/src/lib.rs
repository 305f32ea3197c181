//! # fhirbridge-auth
//!
//! Machine-to-machine authentication against a FHIR server using the
//! OAuth 2.0 client credentials grant with JWT-bearer client assertions
//! (RFC 7523, `private_key_jwt`).
//!
//! This crate provides:
//! - Deterministic key identifiers derived from public key material
//! - Short-lived signed client assertions (RS256, RS384, ES384)
//! - Token exchange against the authorization server
//! - Dynamic client registration (RFC 7591)
//! - Key generation and JWKS publication
//! - A bearer-authorized FHIR read/search client
//!
//! ## Overview
//!
//! The flow is linear: load the private key, JWKS and registration record;
//! derive the `kid`; sign an assertion whose audience is the token endpoint;
//! exchange it for an access token; call the FHIR API with that token.
//! [`ClientAssertionAuthenticator`] runs the whole flow, and every stage is
//! also usable on its own.
//!
//! ## Modules
//!
//! - [`jwk`] - JWK types and `kid` derivation
//! - [`keys`] - Private keys, algorithms and key generation
//! - [`assertion`] - Client assertion signing and verification
//! - [`token`] - Token exchange
//! - [`registration`] - Dynamic client registration
//! - [`fhir`] - FHIR resource client
//! - [`store`] - Persistence for keys and registration records
//! - [`bootstrap`] - Key generation, JWKS publication and registration
//! - [`pipeline`] - The end-to-end authenticator
//! - [`config`] - Layered configuration

pub mod assertion;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod fhir;
pub mod http;
pub mod jwk;
pub mod keys;
pub mod pipeline;
pub mod registration;
pub mod store;
pub mod token;

pub use assertion::{
    ASSERTION_LIFETIME_SECS, CLIENT_ASSERTION_TYPE, ClientAssertion, ClientAssertionClaims,
    build_assertion, build_assertion_at, verify_assertion,
};
pub use config::{ConfigError, FhirBridgeConfig};
pub use error::AuthError;
pub use fhir::FhirClient;
pub use jwk::{Jwk, KID_LENGTH, KeySet, derive_kid};
pub use keys::{GeneratedKeyPair, KeyKind, PrivateKey, SigningAlgorithm, generate_ec, generate_rsa};
pub use pipeline::{ClientAssertionAuthenticator, ClientMaterial};
pub use registration::{
    ClientMetadata, ClientRegistration, Registered, TokenEndpointAuthMethod, register,
};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use token::{AccessToken, TokenExchanger};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;
