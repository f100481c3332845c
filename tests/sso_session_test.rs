// ABOUTME: Single sign-on session tests for silent authorization, prompt handling, and logout
// ABOUTME: Covers both fingerprint policies, session expiry, and rotation on login
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::Duration;
use common::{
    authorize_request, browser, query_param, TestServer, EMAIL, PASSWORD, POST_LOGOUT_URI,
};
use gatekeeper_core::models::Fingerprint;
use gatekeeper_oidc::{
    config::FingerprintPolicy,
    oauth2_server::{AuthorizeOutcome, FlowError},
};

fn other_device() -> Fingerprint {
    Fingerprint::new(
        Some("203.0.113.99".to_owned()),
        Some("curl/8.5.0".to_owned()),
    )
}

#[tokio::test]
async fn test_live_session_with_consent_skips_login() {
    let server = TestServer::new(common::test_config());
    let client = server.register_web_client().await;
    server.register_user().await;
    let request = authorize_request(&client.client_id, "openid profile");
    let (_, session) = server.login_and_consent(&request).await;

    let outcome = server
        .engine
        .authorize(&request, Some(&session.session_id), &browser())
        .await
        .unwrap();
    let AuthorizeOutcome::CodeIssued { redirect } = outcome else {
        panic!("Expected a silent code, got {outcome:?}");
    };
    assert!(query_param(&redirect, "code").is_some());
}

#[tokio::test]
async fn test_live_session_asks_consent_for_new_scopes_only() {
    let server = TestServer::new(common::test_config());
    let client = server.register_web_client().await;
    server.register_user().await;
    let (_, session) = server
        .login_and_consent(&authorize_request(&client.client_id, "openid profile"))
        .await;

    let wider = authorize_request(&client.client_id, "openid profile email");
    let AuthorizeOutcome::Consent(prompt) = server
        .engine
        .authorize(&wider, Some(&session.session_id), &browser())
        .await
        .unwrap()
    else {
        panic!("Expected consent");
    };
    let names: Vec<_> = prompt.scopes.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["openid", "profile", "email"]);

    let narrower = authorize_request(&client.client_id, "openid");
    assert!(matches!(
        server
            .engine
            .authorize(&narrower, Some(&session.session_id), &browser())
            .await
            .unwrap(),
        AuthorizeOutcome::CodeIssued { .. }
    ));
}

#[tokio::test]
async fn test_prompt_none_fails_instead_of_showing_ui() {
    let server = TestServer::new(common::test_config());
    let client = server.register_web_client().await;
    server.register_user().await;

    let mut request = authorize_request(&client.client_id, "openid");
    request.prompt = Some("none".to_owned());
    let Err(FlowError::Redirect { redirect }) =
        server.engine.authorize(&request, None, &browser()).await
    else {
        panic!("Expected an error redirect");
    };
    assert_eq!(query_param(&redirect, "error").as_deref(), Some("login_required"));
    assert_eq!(query_param(&redirect, "state").as_deref(), Some("xyz-state"));

    let (_, session) = server
        .login_and_consent(&authorize_request(&client.client_id, "openid"))
        .await;
    let mut wider = authorize_request(&client.client_id, "openid email");
    wider.prompt = Some("none".to_owned());
    let Err(FlowError::Redirect { redirect }) = server
        .engine
        .authorize(&wider, Some(&session.session_id), &browser())
        .await
    else {
        panic!("Expected an error redirect");
    };
    assert_eq!(query_param(&redirect, "error").as_deref(), Some("consent_required"));

    request.prompt = Some("none".to_owned());
    assert!(matches!(
        server
            .engine
            .authorize(&request, Some(&session.session_id), &browser())
            .await
            .unwrap(),
        AuthorizeOutcome::CodeIssued { .. }
    ));
}

#[tokio::test]
async fn test_prompt_login_and_consent_force_ui() {
    let server = TestServer::new(common::test_config());
    let client = server.register_web_client().await;
    server.register_user().await;
    let (_, session) = server
        .login_and_consent(&authorize_request(&client.client_id, "openid"))
        .await;

    let mut request = authorize_request(&client.client_id, "openid");
    request.prompt = Some("consent".to_owned());
    assert!(matches!(
        server
            .engine
            .authorize(&request, Some(&session.session_id), &browser())
            .await
            .unwrap(),
        AuthorizeOutcome::Consent(_)
    ));

    request.prompt = Some("login".to_owned());
    let AuthorizeOutcome::Login { flow_id } = server
        .engine
        .authorize(&request, Some(&session.session_id), &browser())
        .await
        .unwrap()
    else {
        panic!("Expected login");
    };

    let login = server
        .engine
        .authenticate(
            &flow_id,
            EMAIL,
            PASSWORD,
            &browser(),
            Some(&session.session_id),
        )
        .await
        .unwrap();
    assert_ne!(login.sso_session.session_id, session.session_id);
    assert!(matches!(login.outcome, AuthorizeOutcome::CodeIssued { .. }));
    assert!(server
        .engine
        .current_session(&session.session_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_fingerprint_mismatch_is_only_logged_by_default() {
    let server = TestServer::new(common::test_config());
    let client = server.register_web_client().await;
    server.register_user().await;
    let request = authorize_request(&client.client_id, "openid");
    let (_, session) = server.login_and_consent(&request).await;

    assert!(matches!(
        server
            .engine
            .authorize(&request, Some(&session.session_id), &other_device())
            .await
            .unwrap(),
        AuthorizeOutcome::CodeIssued { .. }
    ));
}

#[tokio::test]
async fn test_fingerprint_mismatch_forces_reauth_when_configured() {
    let mut config = common::test_config();
    config.fingerprint_policy = FingerprintPolicy::ForceReauth;
    let server = TestServer::new(config);
    let client = server.register_web_client().await;
    server.register_user().await;
    let request = authorize_request(&client.client_id, "openid");
    let (_, session) = server.login_and_consent(&request).await;

    assert!(matches!(
        server
            .engine
            .authorize(&request, Some(&session.session_id), &other_device())
            .await
            .unwrap(),
        AuthorizeOutcome::Login { .. }
    ));
    assert!(matches!(
        server
            .engine
            .authorize(&request, Some(&session.session_id), &browser())
            .await
            .unwrap(),
        AuthorizeOutcome::CodeIssued { .. }
    ));
}

#[tokio::test]
async fn test_expired_session_requires_login() {
    let server = TestServer::new(common::test_config());
    let client = server.register_web_client().await;
    server.register_user().await;
    let request = authorize_request(&client.client_id, "openid");
    let (_, session) = server.login_and_consent(&request).await;

    server.clock.advance(Duration::days(8));
    assert!(matches!(
        server
            .engine
            .authorize(&request, Some(&session.session_id), &browser())
            .await
            .unwrap(),
        AuthorizeOutcome::Login { .. }
    ));
}

#[tokio::test]
async fn test_logout_ends_session_and_redirects_to_registered_uri() {
    let server = TestServer::new(common::test_config());
    let client = server.register_web_client().await;
    server.register_user().await;
    let (_, session) = server
        .login_and_consent(&authorize_request(&client.client_id, "openid"))
        .await;

    let redirect = server
        .engine
        .logout(
            Some(&session.session_id),
            Some(&client.client_id),
            Some(POST_LOGOUT_URI),
            Some("bye"),
        )
        .await
        .unwrap()
        .unwrap();
    assert!(redirect.starts_with(POST_LOGOUT_URI));
    assert_eq!(query_param(&redirect, "state").as_deref(), Some("bye"));
    assert!(server
        .engine
        .current_session(&session.session_id)
        .await
        .unwrap()
        .is_none());

    let unregistered = server
        .engine
        .logout(
            None,
            Some(&client.client_id),
            Some("https://attacker.example/landing"),
            None,
        )
        .await
        .unwrap();
    assert!(unregistered.is_none());
}

#[tokio::test]
async fn test_account_session_management() {
    let server = TestServer::new(common::test_config());
    let client = server.register_web_client().await;
    let user = server.register_user().await;
    let request = authorize_request(&client.client_id, "openid");
    let (_, first) = server.login_and_consent(&request).await;
    let (_, second) = server.login_and_consent(&request).await;

    let sessions = server.engine.list_sessions(user.id).await.unwrap();
    assert_eq!(sessions.len(), 2);

    let intruder = server.register_user_with_email("mallory@example.test").await;
    assert!(server
        .engine
        .revoke_session(intruder.id, &first.handle)
        .await
        .is_err());

    server
        .engine
        .revoke_session(user.id, &first.handle)
        .await
        .unwrap();
    let remaining = server.engine.list_sessions(user.id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].handle, second.handle);
}
