//! Cursor-based pagination tests.

mod common;

use common::{generate_test_users, MockDirectoryServer};
use idbridge_graph::PageRequest;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_single_page_has_no_continuation_token() {
    let server = MockDirectoryServer::start().await;
    server.mock_users_paginated(generate_test_users(3), 10).await;

    let client = server.client().await;
    let page = client
        .list_users(&PageRequest { page_size: 10, ..Default::default() }, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(page.users.len(), 3);
    assert!(page.next_page_token.is_none());
}

#[tokio::test]
async fn test_caller_loops_until_token_exhausted() {
    let server = MockDirectoryServer::start().await;
    server.mock_users_paginated(generate_test_users(25), 10).await;

    let client = server.client().await;
    let cancel = CancellationToken::new();

    let mut all_users = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0;

    loop {
        let page = client
            .list_users(
                &PageRequest {
                    page_size: 10,
                    page_token: token.take(),
                    ..Default::default()
                },
                &cancel,
            )
            .await
            .unwrap();
        pages += 1;
        all_users.extend(page.users);
        match page.next_page_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    assert_eq!(pages, 3);
    assert_eq!(all_users.len(), 25);
    // Records arrive in page order with ids intact.
    assert_eq!(all_users[0].id.as_deref(), Some("user-0"));
    assert_eq!(all_users[24].id.as_deref(), Some("user-24"));
}

#[tokio::test]
async fn test_select_and_filter_are_sent() {
    let server = MockDirectoryServer::start().await;

    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .and(wiremock::matchers::path("/v1.0/users"))
        .and(wiremock::matchers::query_param("$top", "5"))
        .and(wiremock::matchers::query_param(
            "$select",
            "id,userPrincipalName,mail",
        ))
        .respond_with(
            wiremock::ResponseTemplate::new(200)
                .set_body_json(common::create_odata_response(Vec::new(), None)),
        )
        .expect(1)
        .mount(&server.server)
        .await;

    let client = server.client().await;
    let page = client
        .list_users(
            &PageRequest {
                page_size: 5,
                select_fields: vec![
                    "id".into(),
                    "userPrincipalName".into(),
                    "mail".into(),
                ],
                ..Default::default()
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(page.users.is_empty());
}
