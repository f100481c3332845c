// ABOUTME: Token endpoint grant tests beyond code redemption
// ABOUTME: Refresh rotation and replay, revocation, client credentials, token exchange, UserInfo
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::Duration;
use common::{authorize_request, refresh_request, sorted_scopes, TestServer};
use gatekeeper_core::constants::{grant_types, token_types};
use gatekeeper_oidc::{
    config::RefreshTokenPolicy,
    oauth2_server::{BasicCredentials, ClientRegistrationResponse, RevocationRequest, TokenRequest},
    tokens::TokenKind,
};

async fn tokens_for(
    server: &TestServer,
    client: &ClientRegistrationResponse,
    scope: &str,
) -> gatekeeper_oidc::oauth2_server::TokenResponse {
    let (code, _) = server
        .obtain_code(&authorize_request(&client.client_id, scope))
        .await;
    server.redeem(client, &code, None).await
}

fn exchange_request(
    client: &ClientRegistrationResponse,
    subject_token: &str,
    audience: &str,
) -> TokenRequest {
    TokenRequest {
        grant_type: grant_types::TOKEN_EXCHANGE.to_owned(),
        client_id: Some(client.client_id.clone()),
        client_secret: Some(client.client_secret.clone()),
        subject_token: Some(subject_token.to_owned()),
        subject_token_type: Some(token_types::ACCESS_TOKEN.to_owned()),
        audience: Some(audience.to_owned()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_refresh_rotates_and_keeps_original_scope() {
    let server = TestServer::new(common::test_config());
    let client = server.register_web_client().await;
    server.register_user().await;
    let issued = tokens_for(&server, &client, "openid profile email").await;
    let first = issued.refresh_token.unwrap();

    let narrowed = server
        .engine
        .token(refresh_request(&client, &first, Some("openid email")), None)
        .await
        .unwrap();
    assert_eq!(narrowed.scope, "openid email");
    assert!(narrowed.id_token.is_none());
    let second = narrowed.refresh_token.unwrap();
    assert_ne!(first, second);

    let claims = server
        .engine
        .codec()
        .verify(&second, TokenKind::Refresh, Some(&client.client_id))
        .unwrap();
    assert_eq!(
        sorted_scopes(claims.scope.as_deref().unwrap()),
        sorted_scopes("openid profile email")
    );

    let full = server
        .engine
        .token(refresh_request(&client, &second, None), None)
        .await
        .unwrap();
    assert_eq!(sorted_scopes(&full.scope), sorted_scopes("openid profile email"));
}

#[tokio::test]
async fn test_rejected_widening_keeps_refresh_token_usable() {
    let server = TestServer::new(common::test_config());
    let client = server.register_web_client().await;
    server.register_user().await;
    let issued = tokens_for(&server, &client, "openid").await;
    let refresh_token = issued.refresh_token.unwrap();

    let err = server
        .engine
        .token(
            refresh_request(&client, &refresh_token, Some("openid email")),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_scope");

    // The rejected request did not spend the token
    let retried = server
        .engine
        .token(refresh_request(&client, &refresh_token, None), None)
        .await
        .unwrap();
    assert_eq!(retried.scope, "openid");
    assert!(retried.refresh_token.is_some());
}

#[tokio::test]
async fn test_refresh_replay_revokes_the_whole_family() {
    let server = TestServer::new(common::test_config());
    let client = server.register_web_client().await;
    server.register_user().await;
    let issued = tokens_for(&server, &client, "openid").await;
    let first = issued.refresh_token.unwrap();

    let rotated = server
        .engine
        .token(refresh_request(&client, &first, None), None)
        .await
        .unwrap()
        .refresh_token
        .unwrap();

    let replay = server
        .engine
        .token(refresh_request(&client, &first, None), None)
        .await
        .unwrap_err();
    assert_eq!(replay.error, "invalid_grant");

    let after = server
        .engine
        .token(refresh_request(&client, &rotated, None), None)
        .await
        .unwrap_err();
    assert_eq!(after.error, "invalid_grant");
}

#[tokio::test]
async fn test_refresh_token_expires() {
    let server = TestServer::new(common::test_config());
    let client = server.register_web_client().await;
    server.register_user().await;
    let issued = tokens_for(&server, &client, "openid").await;

    server.clock.advance(Duration::days(31));
    let err = server
        .engine
        .token(
            refresh_request(&client, &issued.refresh_token.unwrap(), None),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
    assert_eq!(err.error_description.as_deref(), Some("Refresh token expired"));
}

#[tokio::test]
async fn test_refresh_token_bound_to_client() {
    let server = TestServer::new(common::test_config());
    let client = server.register_web_client().await;
    let other = server.register_web_client().await;
    server.register_user().await;
    let issued = tokens_for(&server, &client, "openid").await;

    let err = server
        .engine
        .token(
            refresh_request(&other, &issued.refresh_token.unwrap(), None),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
}

#[tokio::test]
async fn test_offline_access_policy_gates_refresh_tokens() {
    let mut config = common::test_config();
    config.refresh_token_policy = RefreshTokenPolicy::OfflineAccess;
    let server = TestServer::new(config);
    let client = server.register_web_client().await;
    server.register_user().await;

    let online = tokens_for(&server, &client, "openid").await;
    assert!(online.refresh_token.is_none());

    let offline = tokens_for(&server, &client, "openid offline_access").await;
    assert!(offline.refresh_token.is_some());
}

#[tokio::test]
async fn test_revoke_refresh_token() {
    let server = TestServer::new(common::test_config());
    let client = server.register_web_client().await;
    server.register_user().await;
    let issued = tokens_for(&server, &client, "openid").await;
    let refresh = issued.refresh_token.unwrap();

    server
        .engine
        .revoke_token(
            RevocationRequest {
                token: refresh.clone(),
                token_type_hint: Some("refresh_token".to_owned()),
                client_id: Some(client.client_id.clone()),
                client_secret: Some(client.client_secret.clone()),
            },
            None,
        )
        .await
        .unwrap();

    let err = server
        .engine
        .token(refresh_request(&client, &refresh, None), None)
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
}

#[tokio::test]
async fn test_revoke_access_token_is_accepted_without_effect() {
    let server = TestServer::new(common::test_config());
    let client = server.register_web_client().await;
    server.register_user().await;
    let issued = tokens_for(&server, &client, "openid").await;

    server
        .engine
        .revoke_token(
            RevocationRequest {
                token: issued.access_token.clone(),
                token_type_hint: None,
                client_id: None,
                client_secret: None,
            },
            Some(BasicCredentials {
                client_id: client.client_id.clone(),
                client_secret: client.client_secret.clone(),
            }),
        )
        .await
        .unwrap();
    assert!(server.engine.userinfo(&issued.access_token).await.is_ok());

    let err = server
        .engine
        .revoke_token(
            RevocationRequest {
                token: issued.access_token,
                client_id: Some(client.client_id.clone()),
                client_secret: Some("wrong".to_owned()),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_client");
}

#[tokio::test]
async fn test_revoke_authorization_withdraws_consent_and_refresh_tokens() {
    let server = TestServer::new(common::test_config());
    let client = server.register_web_client().await;
    let user = server.register_user().await;
    let issued = tokens_for(&server, &client, "openid email").await;

    let authorizations = server.engine.list_authorizations(user.id).await.unwrap();
    assert_eq!(authorizations.len(), 1);
    assert_eq!(authorizations[0].client_id, client.client_id);

    server
        .engine
        .revoke_authorization(user.id, &client.client_id)
        .await
        .unwrap();
    assert!(server
        .engine
        .list_authorizations(user.id)
        .await
        .unwrap()
        .is_empty());

    let err = server
        .engine
        .token(
            refresh_request(&client, &issued.refresh_token.unwrap(), None),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");

    assert!(server
        .engine
        .revoke_authorization(user.id, &client.client_id)
        .await
        .is_err());
}

#[tokio::test]
async fn test_client_credentials_grant() {
    let mut config = common::test_config();
    config.extra_scopes = vec!["reports:read".to_owned()];
    let server = TestServer::new(config);
    let client = server
        .register_client(&[grant_types::CLIENT_CREDENTIALS])
        .await;

    let request = TokenRequest {
        grant_type: grant_types::CLIENT_CREDENTIALS.to_owned(),
        scope: Some("reports:read".to_owned()),
        ..Default::default()
    };
    let basic = BasicCredentials {
        client_id: client.client_id.clone(),
        client_secret: client.client_secret.clone(),
    };
    let response = server
        .engine
        .token(request.clone(), Some(basic.clone()))
        .await
        .unwrap();
    assert_eq!(response.scope, "reports:read");
    assert!(response.refresh_token.is_none());
    assert!(response.id_token.is_none());

    let claims = server
        .engine
        .codec()
        .verify(&response.access_token, TokenKind::Access, Some(&client.client_id))
        .unwrap();
    assert_eq!(claims.sub, format!("client:{}", client.client_id));

    let err = server
        .engine
        .userinfo(&response.access_token)
        .await
        .unwrap_err();
    assert_eq!(err.error, "insufficient_scope");

    let identity = TokenRequest {
        scope: Some("openid".to_owned()),
        ..request
    };
    let err = server
        .engine
        .token(identity, Some(basic))
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_scope");
}

#[tokio::test]
async fn test_grant_not_registered_for_client() {
    let server = TestServer::new(common::test_config());
    let client = server.register_web_client().await;

    let err = server
        .engine
        .token(
            TokenRequest {
                grant_type: grant_types::CLIENT_CREDENTIALS.to_owned(),
                client_id: Some(client.client_id.clone()),
                client_secret: Some(client.client_secret.clone()),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "unauthorized_client");

    let err = server
        .engine
        .token(
            TokenRequest {
                grant_type: "password".to_owned(),
                client_id: Some(client.client_id.clone()),
                client_secret: Some(client.client_secret.clone()),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "unsupported_grant_type");
}

#[tokio::test]
async fn test_basic_and_form_credentials_are_exclusive() {
    let server = TestServer::new(common::test_config());
    let client = server.register_web_client().await;
    let basic = BasicCredentials {
        client_id: client.client_id.clone(),
        client_secret: client.client_secret.clone(),
    };

    let both = TokenRequest {
        grant_type: grant_types::REFRESH_TOKEN.to_owned(),
        client_secret: Some(client.client_secret.clone()),
        refresh_token: Some("x".to_owned()),
        ..Default::default()
    };
    let err = server
        .engine
        .token(both, Some(basic.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_request");

    let missing = TokenRequest {
        grant_type: grant_types::REFRESH_TOKEN.to_owned(),
        client_id: Some(client.client_id.clone()),
        ..Default::default()
    };
    let err = server.engine.token(missing, None).await.unwrap_err();
    assert_eq!(err.error, "invalid_client");
}

#[tokio::test]
async fn test_token_exchange_delegates_to_audience() {
    let server = TestServer::new(common::test_config());
    let frontend = server
        .register_client(&[grant_types::AUTHORIZATION_CODE, grant_types::TOKEN_EXCHANGE])
        .await;
    let backend = server.register_web_client().await;
    let user = server.register_user().await;
    let issued = tokens_for(&server, &frontend, "openid email").await;

    let response = server
        .engine
        .token(
            exchange_request(&frontend, &issued.access_token, &backend.client_id),
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        response.issued_token_type.as_deref(),
        Some(token_types::ACCESS_TOKEN)
    );
    assert_eq!(sorted_scopes(&response.scope), sorted_scopes("openid email"));

    let claims = server
        .engine
        .codec()
        .verify(&response.access_token, TokenKind::Access, Some(&backend.client_id))
        .unwrap();
    assert_eq!(claims.sub, user.id.to_string());
    assert_eq!(claims.act.unwrap().sub, frontend.client_id);
}

#[tokio::test]
async fn test_token_exchange_encrypted_variant() {
    let server = TestServer::new(common::test_config());
    let frontend = server
        .register_client(&[grant_types::AUTHORIZATION_CODE, grant_types::TOKEN_EXCHANGE])
        .await;
    let backend = server.register_web_client().await;
    server.register_user().await;
    let issued = tokens_for(&server, &frontend, "openid email").await;

    let mut request = exchange_request(&frontend, &issued.access_token, &backend.client_id);
    request.requested_token_type = Some(token_types::ENCRYPTED_JWT.to_owned());
    let response = server.engine.token(request, None).await.unwrap();
    assert_eq!(
        response.issued_token_type.as_deref(),
        Some(token_types::ENCRYPTED_JWT)
    );
    assert_eq!(response.access_token.split('.').count(), 5);
    assert!(server
        .engine
        .codec()
        .verify(&response.access_token, TokenKind::Access, None)
        .is_err());

    let claims = server
        .engine
        .codec()
        .verify_any(&response.access_token, TokenKind::Access, Some(&backend.client_id))
        .unwrap();
    assert_eq!(claims.act.unwrap().sub, frontend.client_id);

    let userinfo = server.engine.userinfo(&response.access_token).await.unwrap();
    assert_eq!(userinfo["email"], common::EMAIL);
}

#[tokio::test]
async fn test_token_exchange_rejections() {
    let server = TestServer::new(common::test_config());
    let frontend = server
        .register_client(&[grant_types::AUTHORIZATION_CODE, grant_types::TOKEN_EXCHANGE])
        .await;
    let backend = server.register_web_client().await;
    server.register_user().await;
    let issued = tokens_for(&server, &frontend, "openid").await;

    let err = server
        .engine
        .token(
            exchange_request(&frontend, &issued.access_token, "no-such-client"),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_target");

    let mut wider = exchange_request(&frontend, &issued.access_token, &backend.client_id);
    wider.scope = Some("openid email".to_owned());
    let err = server.engine.token(wider, None).await.unwrap_err();
    assert_eq!(err.error, "invalid_scope");

    let mut untyped = exchange_request(&frontend, &issued.access_token, &backend.client_id);
    untyped.subject_token_type = None;
    let err = server.engine.token(untyped, None).await.unwrap_err();
    assert_eq!(err.error, "invalid_request");

    let err = server
        .engine
        .token(
            exchange_request(&frontend, "not-a-token", &backend.client_id),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
}

#[tokio::test]
async fn test_token_exchange_lifetime_capped_by_subject() {
    let server = TestServer::new(common::test_config());
    let frontend = server
        .register_client(&[grant_types::AUTHORIZATION_CODE, grant_types::TOKEN_EXCHANGE])
        .await;
    let backend = server.register_web_client().await;
    server.register_user().await;
    let issued = tokens_for(&server, &frontend, "openid").await;

    server.clock.advance(Duration::seconds(issued.expires_in - 600));
    let response = server
        .engine
        .token(
            exchange_request(&frontend, &issued.access_token, &backend.client_id),
            None,
        )
        .await
        .unwrap();
    assert_eq!(response.expires_in, 600);
}

#[tokio::test]
async fn test_userinfo_releases_granted_claims_only() {
    let server = TestServer::new(common::test_config());
    let client = server.register_web_client().await;
    let user = server.register_user().await;
    let issued = tokens_for(&server, &client, "openid email").await;

    let claims = server.engine.userinfo(&issued.access_token).await.unwrap();
    let mut keys: Vec<&str> = claims.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["email", "email_verified", "sub"]);
    assert_eq!(claims["sub"], user.id.to_string());

    let no_openid = server
        .engine
        .token(
            refresh_request(&client, &issued.refresh_token.unwrap(), Some("email")),
            None,
        )
        .await
        .unwrap();
    let err = server
        .engine
        .userinfo(&no_openid.access_token)
        .await
        .unwrap_err();
    assert_eq!(err.error, "insufficient_scope");

    server.clock.advance(Duration::hours(2));
    let err = server
        .engine
        .userinfo(&issued.access_token)
        .await
        .unwrap_err();
    assert_ne!(err.error, "insufficient_scope");
}
