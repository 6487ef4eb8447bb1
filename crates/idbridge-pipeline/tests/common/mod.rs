//! Common test utilities for idbridge-pipeline integration tests.

use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use idbridge_graph::{
    CredentialConfig, CredentialPool, GraphClient, RetryPolicy, TenantEndpoints,
};
use idbridge_store::InlineSecretStore;

pub const TEST_TENANT: &str = "test-tenant";

/// Test data factory for directory users.
pub fn create_test_user(id: &str, prefix: &str) -> Value {
    json!({
        "id": id,
        "userPrincipalName": format!("{prefix}@source.onmicrosoft.com"),
        "displayName": format!("Test User {prefix}"),
        "givenName": "Test",
        "surname": "User",
        "mail": format!("{prefix}@example.com"),
        "accountEnabled": true,
        "identities": [
            {
                "signInType": "emailAddress",
                "issuer": "source.onmicrosoft.com",
                "issuerAssignedId": format!("{prefix}@example.com")
            }
        ]
    })
}

/// Wraps items in an OData response format.
pub fn create_odata_response(items: Vec<Value>, next_link: Option<&str>) -> Value {
    let mut response = json!({ "value": items });
    if let Some(link) = next_link {
        response["@odata.nextLink"] = json!(link);
    }
    response
}

/// Mock directory server with token endpoint and client wiring.
pub struct MockDirectoryServer {
    pub server: MockServer,
}

impl MockDirectoryServer {
    /// Starts a mock server with the token endpoint mounted.
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/{TEST_TENANT}/oauth2/v2.0/token")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "mock-access-token",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;
        Self { server }
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    fn endpoints(&self) -> TenantEndpoints {
        TenantEndpoints {
            login_base: self.url(),
            graph_base: self.url(),
            tenant: TEST_TENANT.to_string(),
        }
    }

    /// Builds a client over this server with the testing retry policy.
    pub async fn client(&self) -> Arc<GraphClient> {
        let store = InlineSecretStore::new().with_secret("secret-0", "value-0");
        let configs = vec![CredentialConfig {
            client_id: "client-0".to_string(),
            secret_name: "secret-0".to_string(),
        }];
        let pool = CredentialPool::new(&store, &configs, self.endpoints())
            .await
            .expect("pool construction");
        Arc::new(
            GraphClient::with_policy(Arc::new(pool), self.endpoints(), RetryPolicy::for_testing())
                .expect("client construction"),
        )
    }

    /// Mounts a users list endpoint returning a single fixed page.
    pub async fn mock_users_single_page(&self, users: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path("/v1.0/users"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(create_odata_response(users, None)),
            )
            .mount(&self.server)
            .await;
    }

    /// Mounts a `$batch` endpoint answering every sub-request with 201,
    /// echoing the submitted sub-request ids.
    pub async fn mock_batch_all_created(&self) {
        Mock::given(method("POST"))
            .and(path("/v1.0/$batch"))
            .respond_with(|request: &wiremock::Request| {
                let envelope: Value = serde_json::from_slice(&request.body).unwrap();
                let responses: Vec<Value> = envelope["requests"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|r| json!({ "id": r["id"], "status": 201, "body": { "id": "tgt" } }))
                    .collect();
                ResponseTemplate::new(200).set_body_json(json!({ "responses": responses }))
            })
            .mount(&self.server)
            .await;
    }

    /// Mounts a `$batch` endpoint with a fixed response envelope.
    pub async fn mock_batch(&self, responses: Vec<Value>) {
        Mock::given(method("POST"))
            .and(path("/v1.0/$batch"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "responses": responses })),
            )
            .mount(&self.server)
            .await;
    }
}
