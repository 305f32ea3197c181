use fhirbridge_auth::bootstrap::{generate_keys, publish_jwks, register_client};
use fhirbridge_auth::store::keys;
use fhirbridge_auth::{
    AuthError, FhirBridgeConfig, KeyValueStore, MemoryStore, SigningAlgorithm,
    TokenEndpointAuthMethod,
};
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> FhirBridgeConfig {
    let mut config = FhirBridgeConfig::default();
    config.endpoints.registration_url = format!("{}/oauth2/default/registration", server.uri());
    config.endpoints.token_url = format!("{}/oauth2/default/token", server.uri());
    config
}

#[tokio::test]
async fn private_key_jwt_registration_sends_jwks_and_persists_raw_response() {
    let server = MockServer::start().await;
    let response = r#"{"client_id":"abc123","client_name":"fhirbridge","token_endpoint_auth_method":"private_key_jwt","registration_client_uri":"https://emr/reg/abc123"}"#;
    Mock::given(method("POST"))
        .and(path("/oauth2/default/registration"))
        .respond_with(ResponseTemplate::new(201).set_body_string(response))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    generate_keys(&store, SigningAlgorithm::RS384, 2048, false)
        .await
        .unwrap();
    let jwks = publish_jwks(&store).await.unwrap();

    let config = config_for(&server);
    let registered = register_client(
        &reqwest::Client::new(),
        &config,
        &store,
        TokenEndpointAuthMethod::PrivateKeyJwt,
    )
    .await
    .unwrap();

    assert_eq!(registered.registration.client_id, "abc123");
    assert_eq!(
        registered.registration.extra["registration_client_uri"],
        "https://emr/reg/abc123"
    );
    assert_eq!(
        store.load(keys::REGISTRATION).await.unwrap().unwrap(),
        response.as_bytes()
    );

    let requests = server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["token_endpoint_auth_method"], "private_key_jwt");
    assert_eq!(sent["application_type"], "private");
    assert_eq!(sent["scope"], config.client.scope);
    assert_eq!(
        sent["jwks"]["keys"][0]["kid"],
        jwks.active_key().unwrap().kid.clone().unwrap()
    );
}

#[tokio::test]
async fn client_secret_basic_registration_omits_jwks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/default/registration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "client_id": "basic-client",
            "client_secret": "s3cret"
        })))
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let registered = register_client(
        &reqwest::Client::new(),
        &config_for(&server),
        &store,
        TokenEndpointAuthMethod::ClientSecretBasic,
    )
    .await
    .unwrap();
    assert_eq!(registered.registration.client_secret.as_deref(), Some("s3cret"));

    let requests = server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(sent.get("jwks").is_none());
    assert_eq!(sent["token_endpoint_auth_method"], "client_secret_basic");
}

#[tokio::test]
async fn rejected_registration_is_not_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/default/registration"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_string(r#"{"error":"invalid_client_metadata"}"#),
        )
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    generate_keys(&store, SigningAlgorithm::ES384, 2048, false)
        .await
        .unwrap();

    let err = register_client(
        &reqwest::Client::new(),
        &config_for(&server),
        &store,
        TokenEndpointAuthMethod::PrivateKeyJwt,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AuthError::RegistrationFailed { status: 400, .. }));
    assert!(!store.exists(keys::REGISTRATION).await.unwrap());
    // JWKS was published on the way
    assert!(store.exists(keys::JWKS).await.unwrap());
}

#[tokio::test]
async fn registration_without_client_id_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let err = register_client(
        &reqwest::Client::new(),
        &config_for(&server),
        &MemoryStore::new(),
        TokenEndpointAuthMethod::ClientSecretBasic,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AuthError::MalformedResponse { .. }));
}
