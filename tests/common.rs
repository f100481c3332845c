// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides an engine over memory stores with a mock clock, plus client, user, and login helpers
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
//! Shared test utilities for `gatekeeper_oidc`
//!
//! This module provides common test setup functions to reduce duplication
//! across integration tests.

use std::sync::{Arc, Once, OnceLock};

use chrono::{TimeZone, Utc};
use gatekeeper_core::constants::grant_types;
use gatekeeper_core::models::{Fingerprint, SsoSession, User};
use gatekeeper_oidc::{
    config::{CookieConfig, OAuth2ServerConfig},
    jwks::{JwksManager, RsaKeyPair},
    oauth2_server::{
        AuthorizationEngine, AuthorizeOutcome, AuthorizeRequest, ClientRegistrationRequest,
        ClientRegistrationResponse, TokenRequest, TokenResponse, UserRegistrationRequest,
    },
    resources::ServerResources,
    scopes::parse_scope,
    stores::Stores,
    utils::clock::MockClock,
};

pub const ISSUER: &str = "https://auth.example.test";
pub const REDIRECT_URI: &str = "https://app.example.test/callback";
pub const POST_LOGOUT_URI: &str = "https://app.example.test/signed-out";
pub const EMAIL: &str = "alice@example.test";
pub const PASSWORD: &str = "correct horse battery";

static INIT_LOGGER: Once = Once::new();
static SIGNING_KEY_PEM: OnceLock<String> = OnceLock::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// One RSA key per test process; generation is slow in debug builds
pub fn signing_key() -> RsaKeyPair {
    let pem = SIGNING_KEY_PEM.get_or_init(|| {
        let key = RsaKeyPair::generate_with_key_size(2048).unwrap();
        key.export_private_key_pem().unwrap().to_string()
    });
    RsaKeyPair::import_private_key_pem(pem).unwrap()
}

/// Default protocol configuration for the test issuer
pub fn test_config() -> OAuth2ServerConfig {
    OAuth2ServerConfig::for_issuer(ISSUER)
}

/// Engine, clock, and stores of one isolated server
pub struct TestServer {
    pub engine: Arc<AuthorizationEngine>,
    pub resources: Arc<ServerResources>,
    pub clock: Arc<MockClock>,
    pub stores: Stores,
}

impl TestServer {
    /// Server over in-memory stores
    pub fn new(config: OAuth2ServerConfig) -> Self {
        Self::with_stores(config, Stores::in_memory())
    }

    /// Server over the given stores
    pub fn with_stores(config: OAuth2ServerConfig, stores: Stores) -> Self {
        init_test_logging();
        let clock = Arc::new(MockClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        ));
        let scopes = ServerResources::scope_registry(&config);
        let keys = Arc::new(JwksManager::with_active_key(signing_key()));
        let engine = Arc::new(
            AuthorizationEngine::new(
                Arc::new(config),
                stores.clone(),
                scopes,
                keys,
                clock.clone(),
            )
            .unwrap(),
        );
        let resources = Arc::new(ServerResources::new(
            engine.clone(),
            CookieConfig { secure: true },
        ));
        Self {
            engine,
            resources,
            clock,
            stores,
        }
    }

    /// The full application router
    pub fn router(&self) -> axum::Router {
        gatekeeper_oidc::routes::router(self.resources.clone())
    }

    /// Register a client with the given grants
    pub async fn register_client(&self, grants: &[&str]) -> ClientRegistrationResponse {
        self.engine
            .clients()
            .register_client(ClientRegistrationRequest {
                redirect_uris: vec![REDIRECT_URI.to_owned()],
                post_logout_redirect_uris: vec![POST_LOGOUT_URI.to_owned()],
                client_name: Some("Example App".to_owned()),
                grant_types: Some(grants.iter().map(|g| (*g).to_owned()).collect()),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    /// Register a client for the code and refresh grants
    pub async fn register_web_client(&self) -> ClientRegistrationResponse {
        self.register_client(&[grant_types::AUTHORIZATION_CODE, grant_types::REFRESH_TOKEN])
            .await
    }

    /// Register the standard test user
    pub async fn register_user(&self) -> User {
        self.register_user_with_email(EMAIL).await
    }

    /// Register a user with a fully populated profile
    pub async fn register_user_with_email(&self, email: &str) -> User {
        self.engine
            .accounts()
            .register_user(UserRegistrationRequest {
                email: email.to_owned(),
                password: PASSWORD.to_owned(),
                display_name: Some("Alice Example".to_owned()),
                given_name: Some("Alice".to_owned()),
                family_name: Some("Example".to_owned()),
                phone_number: Some("+15550100".to_owned()),
            })
            .await
            .unwrap()
    }

    /// Run authorize, login, and consent; returns the redirect with the code
    /// and the SSO session created by the login
    pub async fn login_and_consent(
        &self,
        request: &AuthorizeRequest,
    ) -> (String, SsoSession) {
        let fingerprint = browser();
        let outcome = self
            .engine
            .authorize(request, None, &fingerprint)
            .await
            .unwrap();
        let AuthorizeOutcome::Login { flow_id } = outcome else {
            panic!("Expected login for a fresh browser, got {outcome:?}");
        };

        let login = self
            .engine
            .authenticate(&flow_id, EMAIL, PASSWORD, &fingerprint, None)
            .await
            .unwrap();
        let redirect = match login.outcome {
            AuthorizeOutcome::Consent(prompt) => {
                let approved: Vec<String> = prompt.scopes.into_iter().map(|s| s.name).collect();
                self.engine
                    .grant_consent(&prompt.flow_id, &approved)
                    .await
                    .unwrap()
            }
            AuthorizeOutcome::CodeIssued { redirect } => redirect,
            AuthorizeOutcome::Login { .. } => panic!("Login did not complete"),
        };
        (redirect, login.sso_session)
    }

    /// Authorization code for `request`, through a full browser login
    pub async fn obtain_code(&self, request: &AuthorizeRequest) -> (String, SsoSession) {
        let (redirect, session) = self.login_and_consent(request).await;
        (query_param(&redirect, "code").unwrap(), session)
    }

    /// Redeem a code for tokens
    pub async fn redeem(
        &self,
        client: &ClientRegistrationResponse,
        code: &str,
        verifier: Option<&str>,
    ) -> TokenResponse {
        self.engine
            .token(code_request(client, code, verifier), None)
            .await
            .unwrap()
    }
}

/// Fingerprint of the test browser
pub fn browser() -> Fingerprint {
    Fingerprint::new(
        Some("198.51.100.23".to_owned()),
        Some("Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0".to_owned()),
    )
}

/// Authorization request for `client_id` asking for `scope`
pub fn authorize_request(client_id: &str, scope: &str) -> AuthorizeRequest {
    AuthorizeRequest {
        response_type: "code".to_owned(),
        client_id: client_id.to_owned(),
        redirect_uri: REDIRECT_URI.to_owned(),
        scope: Some(scope.to_owned()),
        state: Some("xyz-state".to_owned()),
        nonce: Some("n-0S6_WzA2Mj".to_owned()),
        ..Default::default()
    }
}

/// Token request redeeming `code` with form credentials
pub fn code_request(
    client: &ClientRegistrationResponse,
    code: &str,
    verifier: Option<&str>,
) -> TokenRequest {
    TokenRequest {
        grant_type: grant_types::AUTHORIZATION_CODE.to_owned(),
        code: Some(code.to_owned()),
        redirect_uri: Some(REDIRECT_URI.to_owned()),
        client_id: Some(client.client_id.clone()),
        client_secret: Some(client.client_secret.clone()),
        code_verifier: verifier.map(str::to_owned),
        ..Default::default()
    }
}

/// Token request using a refresh token
pub fn refresh_request(
    client: &ClientRegistrationResponse,
    refresh_token: &str,
    scope: Option<&str>,
) -> TokenRequest {
    TokenRequest {
        grant_type: grant_types::REFRESH_TOKEN.to_owned(),
        refresh_token: Some(refresh_token.to_owned()),
        client_id: Some(client.client_id.clone()),
        client_secret: Some(client.client_secret.clone()),
        scope: scope.map(str::to_owned),
        ..Default::default()
    }
}

/// Query parameter of an absolute URL
pub fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Scope string as a sorted list
pub fn sorted_scopes(scope: &str) -> Vec<String> {
    let mut scopes = parse_scope(scope);
    scopes.sort();
    scopes
}
