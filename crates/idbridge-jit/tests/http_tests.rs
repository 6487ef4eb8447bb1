//! HTTP-level tests for the JIT handler, wired against a mock source
//! directory.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use rsa::pkcs8::EncodePrivateKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use idbridge_graph::TenantEndpoints;
use idbridge_jit::{
    build_validator, encrypt_envelope, router, JitConfig, JitPipeline, PrivateKeyCache,
    ValidatorConfig,
};
use idbridge_store::{InlineSecretStore, SecretStore};

const SOURCE_TENANT: &str = "source-tenant";

struct TestHarness {
    app: axum::Router,
    public_key: RsaPublicKey,
    _source: MockServer,
}

/// Builds the full stack: mock source tenant, real validator, real key
/// cache, router.
async fn harness(password_grant_status: u16) -> TestHarness {
    let source = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{SOURCE_TENANT}/oauth2/v2.0/token")))
        .and(body_string_contains("grant_type=password"))
        .respond_with(
            ResponseTemplate::new(password_grant_status)
                .set_body_json(json!({ "access_token": "t", "expires_in": 3600 })),
        )
        .mount(&source)
        .await;

    let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
    let public_key = RsaPublicKey::from(&key);
    let pem = key.to_pkcs8_pem(rsa::pkcs8::LineEnding::LF).unwrap().to_string();
    let store: Arc<dyn SecretStore> =
        Arc::new(InlineSecretStore::new().with_secret("jit-key", pem));

    let endpoints = TenantEndpoints {
        login_base: source.uri(),
        graph_base: source.uri(),
        tenant: SOURCE_TENANT.to_string(),
    };
    let validator = build_validator(
        &ValidatorConfig {
            client_id: "jit-client".to_string(),
            test_mode: false,
            production: true,
        },
        endpoints,
    )
    .unwrap();

    let pipeline = JitPipeline::new(
        JitConfig::new("source.onmicrosoft.com"),
        PrivateKeyCache::new(store, "jit-key"),
        validator,
    );

    TestHarness {
        app: router(Arc::new(pipeline)),
        public_key,
        _source: source,
    }
}

fn event_with_envelope(envelope: &str) -> Value {
    json!({
        "type": "onPasswordSubmit",
        "data": {
            "authenticationContext": {
                "correlationId": "corr-1",
                "user": {
                    "id": "user-1",
                    "userPrincipalName": "alice@target.onmicrosoft.com"
                }
            },
            "encryptedPasswordContext": envelope
        }
    })
}

async fn post_event(app: axum::Router, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::post("/")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_liveness() {
    let harness = harness(200).await;
    let response = harness
        .app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_valid_envelope_migrates_and_echoes_nonce() {
    let harness = harness(200).await;
    let envelope =
        encrypt_envelope(&harness.public_key, "Str0ng!Password", Some("nonce-42")).unwrap();

    let (status, body) = post_event(harness.app, event_with_envelope(&envelope)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["actions"][0]["type"], "MigratePassword");
    assert_eq!(body["data"]["nonce"], "nonce-42");
}

#[tokio::test]
async fn test_wrong_source_password_blocks() {
    let harness = harness(400).await;
    let envelope = encrypt_envelope(&harness.public_key, "Str0ng!Password", None).unwrap();

    let (status, body) = post_event(harness.app, event_with_envelope(&envelope)).await;
    assert_eq!(status, StatusCode::OK, "failures still answer 200");
    assert_eq!(body["data"]["actions"][0]["type"], "Block");
    assert!(body["data"]["actions"][0]["message"].is_string());
}

#[tokio::test]
async fn test_garbage_envelope_blocks() {
    let harness = harness(200).await;
    let (status, body) = post_event(harness.app, event_with_envelope("not-an-envelope")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["actions"][0]["type"], "Block");
}

#[tokio::test]
async fn test_plaintext_test_path() {
    let harness = harness(200).await;
    let body = json!({
        "type": "onPasswordSubmit",
        "data": {
            "authenticationContext": {
                "correlationId": "corr-2",
                "user": {
                    "id": "user-1",
                    "userPrincipalName": "alice@target.onmicrosoft.com"
                }
            },
            "passwordContext": { "userPassword": "Str0ng!Password", "nonce": "n1" }
        }
    });

    let (status, body) = post_event(harness.app, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["actions"][0]["type"], "MigratePassword");
    assert_eq!(body["data"]["nonce"], "n1");
}

#[tokio::test]
async fn test_missing_user_blocks() {
    let harness = harness(200).await;
    let body = json!({
        "type": "onPasswordSubmit",
        "data": {
            "authenticationContext": { "user": {} },
            "passwordContext": { "userPassword": "Str0ng!Password" }
        }
    });

    let (status, body) = post_event(harness.app, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["actions"][0]["type"], "Block");
}

#[tokio::test]
async fn test_unparseable_body_blocks() {
    let harness = harness(200).await;
    let response = harness
        .app
        .oneshot(
            Request::post("/")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"]["actions"][0]["type"], "Block");
}
