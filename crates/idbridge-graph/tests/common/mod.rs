//! Common test utilities for idbridge-graph integration tests.

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

/// Creates an OData error response body.
pub fn create_odata_error(code: &str, message: &str) -> Value {
    json!({
        "error": {
            "code": code,
            "message": message
        }
    })
}

/// Creates a mock OAuth token response.
pub fn create_token_response(access_token: &str, expires_in: u64) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in
    })
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
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(create_token_response("mock-access-token", 3600)),
            )
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
    pub async fn client(&self) -> GraphClient {
        self.client_with_credentials(1).await
    }

    /// Builds a client whose pool holds `n` credentials.
    pub async fn client_with_credentials(&self, n: usize) -> GraphClient {
        let mut store = InlineSecretStore::new();
        let mut configs = Vec::new();
        for i in 0..n {
            store = store.with_secret(format!("secret-{i}"), format!("value-{i}"));
            configs.push(CredentialConfig {
                client_id: format!("client-{i}"),
                secret_name: format!("secret-{i}"),
            });
        }

        let pool = CredentialPool::new(&store, &configs, self.endpoints())
            .await
            .expect("pool construction");

        GraphClient::with_policy(Arc::new(pool), self.endpoints(), RetryPolicy::for_testing())
            .expect("client construction")
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

    /// Mounts paginated user endpoints chained by skiptoken.
    ///
    /// Continuation pages carry specific query matchers and are mounted
    /// first so the unqualified first-page mock does not shadow them.
    pub async fn mock_users_paginated(&self, users: Vec<Value>, page_size: usize) {
        if users.is_empty() {
            self.mock_users_single_page(Vec::new()).await;
            return;
        }
        let pages: Vec<Vec<Value>> = users.chunks(page_size).map(<[Value]>::to_vec).collect();
        let total_pages = pages.len();

        for (i, page) in pages.iter().enumerate().skip(1) {
            let next_link = (i < total_pages - 1)
                .then(|| format!("{}/v1.0/users?$skiptoken=page{}", self.url(), i + 1));
            let response = create_odata_response(page.clone(), next_link.as_deref());

            Mock::given(method("GET"))
                .and(path("/v1.0/users"))
                .and(wiremock::matchers::query_param("$skiptoken", format!("page{i}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(response))
                .mount(&self.server)
                .await;
        }

        let next_link =
            (total_pages > 1).then(|| format!("{}/v1.0/users?$skiptoken=page1", self.url()));
        let response = create_odata_response(pages[0].clone(), next_link.as_deref());
        Mock::given(method("GET"))
            .and(path("/v1.0/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response))
            .mount(&self.server)
            .await;
    }

    /// Mounts a `$batch` endpoint with a fixed response envelope.
    pub async fn mock_batch(&self, responses: Vec<Value>) {
        Mock::given(method("POST"))
            .and(path("/v1.0/$batch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "responses": responses })))
            .mount(&self.server)
            .await;
    }
}

/// Generates a sequence of test users.
pub fn generate_test_users(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| create_test_user(&format!("user-{i}"), &format!("user{i}")))
        .collect()
}
