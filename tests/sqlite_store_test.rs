// ABOUTME: End-to-end flows over the SQLite stores
// ABOUTME: Verifies that clients, consents, and refresh tokens survive reopening the database
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{authorize_request, browser, refresh_request, TestServer};
use gatekeeper_oidc::{
    config::DatabaseUrl, oauth2_server::AuthorizeOutcome, stores::create_stores,
};
use tempfile::TempDir;

#[tokio::test]
async fn test_authorization_code_flow_on_sqlite() {
    let dir = TempDir::new().unwrap();
    let database = DatabaseUrl::SQLite {
        path: dir.path().join("gatekeeper.db"),
    };
    let server = TestServer::with_stores(
        common::test_config(),
        create_stores(&database).await.unwrap(),
    );
    let client = server.register_web_client().await;
    server.register_user().await;

    let request = authorize_request(&client.client_id, "openid email");
    let (code, session) = server.obtain_code(&request).await;
    let tokens = server.redeem(&client, &code, None).await;
    assert!(tokens.id_token.is_some());

    let replay = server
        .engine
        .token(common::code_request(&client, &code, None), None)
        .await
        .unwrap_err();
    assert_eq!(replay.error, "invalid_grant");

    assert!(matches!(
        server
            .engine
            .authorize(&request, Some(&session.session_id), &browser())
            .await
            .unwrap(),
        AuthorizeOutcome::CodeIssued { .. }
    ));

    let userinfo = server.engine.userinfo(&tokens.access_token).await.unwrap();
    assert_eq!(userinfo["email"], common::EMAIL);
}

#[tokio::test]
async fn test_state_survives_reopening_the_database() {
    let dir = TempDir::new().unwrap();
    let database = DatabaseUrl::SQLite {
        path: dir.path().join("nested").join("gatekeeper.db"),
    };

    let (client, refresh_token, session_id) = {
        let server = TestServer::with_stores(
            common::test_config(),
            create_stores(&database).await.unwrap(),
        );
        let client = server.register_web_client().await;
        server.register_user().await;
        let (code, session) = server
            .obtain_code(&authorize_request(&client.client_id, "openid"))
            .await;
        let tokens = server.redeem(&client, &code, None).await;
        (client, tokens.refresh_token.unwrap(), session.session_id)
    };

    let reopened = TestServer::with_stores(
        common::test_config(),
        create_stores(&database).await.unwrap(),
    );
    assert!(reopened
        .engine
        .clients()
        .get_client(&client.client_id)
        .await
        .unwrap()
        .is_some());
    assert!(reopened
        .engine
        .current_session(&session_id)
        .await
        .unwrap()
        .is_some());

    let rotated = reopened
        .engine
        .token(refresh_request(&client, &refresh_token, None), None)
        .await
        .unwrap();
    assert!(rotated.refresh_token.is_some());

    let replay = reopened
        .engine
        .token(refresh_request(&client, &refresh_token, None), None)
        .await
        .unwrap_err();
    assert_eq!(replay.error, "invalid_grant");
}

#[tokio::test]
async fn test_in_memory_sqlite_backend() {
    let server = TestServer::with_stores(
        common::test_config(),
        create_stores(&DatabaseUrl::SQLiteMemory).await.unwrap(),
    );
    let client = server.register_web_client().await;
    let user = server.register_user().await;
    let (code, _) = server
        .obtain_code(&authorize_request(&client.client_id, "openid profile"))
        .await;
    server.redeem(&client, &code, None).await;

    let authorizations = server.engine.list_authorizations(user.id).await.unwrap();
    assert_eq!(authorizations.len(), 1);
    assert_eq!(authorizations[0].scopes, vec!["openid", "profile"]);
}
