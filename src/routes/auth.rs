// ABOUTME: Browser flow route handlers for login, consent, logout, and user registration
// ABOUTME: Manages the SSO session cookie and hands the browser back to the authorization flow
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Authentication routes
//!
//! The login and consent pages live outside the server; they post back here
//! with the `flow_id` they were given.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use gatekeeper_core::constants::endpoints;
use gatekeeper_core::errors::AppError;
use serde::Deserialize;
use serde_json::json;

use super::{error_page, flow_error_response, found, page_url};
use crate::oauth2_server::{
    AuthorizeOutcome, FlowError, OAuth2Error, UserRegistrationRequest, UserRegistrationResponse,
};
use crate::resources::ServerResources;
use crate::scopes::parse_scope;
use crate::security::cookies::{clear_sso_cookie, set_sso_cookie, sso_session_id};
use crate::security::headers::request_fingerprint;

/// Login form posted by the login page
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    /// Flow session being resumed
    pub flow_id: String,
    /// Login email
    pub email: String,
    /// Plaintext password
    pub password: String,
}

/// Flow session reference
#[derive(Debug, Deserialize)]
pub struct FlowQuery {
    /// Flow session being resumed
    pub flow_id: String,
}

/// Consent decision posted by the consent page
#[derive(Debug, Deserialize)]
pub struct ConsentForm {
    /// Flow session being resumed
    pub flow_id: String,
    /// `approve` or `deny`
    pub decision: String,
    /// Approved subset of the requested scopes; all of them when absent
    pub scope: Option<String>,
}

/// RP-initiated logout parameters
#[derive(Debug, Default, Deserialize)]
pub struct LogoutParams {
    /// Client asking for the logout
    pub client_id: Option<String>,
    /// Registered post-logout redirect URI
    pub post_logout_redirect_uri: Option<String>,
    /// Echoed back on the redirect
    pub state: Option<String>,
}

/// Authentication routes implementation
pub struct AuthRoutes;

impl AuthRoutes {
    /// Create all browser flow routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(endpoints::LOGIN, post(Self::handle_login))
            .route(
                endpoints::CONSENT,
                get(Self::handle_consent_prompt).post(Self::handle_consent_decision),
            )
            .route(
                endpoints::LOGOUT,
                get(Self::handle_logout_query).post(Self::handle_logout_form),
            )
            .route(endpoints::USER_REGISTER, post(Self::handle_register))
            .with_state(resources)
    }

    /// Where the browser goes after a successful step
    fn next_step(resources: &ServerResources, outcome: AuthorizeOutcome) -> Response {
        let oauth = resources.oauth();
        match outcome {
            AuthorizeOutcome::CodeIssued { redirect } => found(&redirect),
            AuthorizeOutcome::Login { flow_id } => {
                found(&page_url(&oauth.login_page_url, &flow_id, &[]))
            }
            AuthorizeOutcome::Consent(prompt) => {
                found(&page_url(&oauth.consent_page_url, &prompt.flow_id, &[]))
            }
        }
    }

    fn flow_error(resources: &ServerResources, err: FlowError) -> Response {
        flow_error_response(err, &resources.oauth().login_page_url)
    }

    /// Handle login form submission (POST /auth/login)
    async fn handle_login(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Form(form): Form<LoginForm>,
    ) -> Response {
        let fingerprint = request_fingerprint(&headers);
        let existing = sso_session_id(&headers);
        match resources
            .engine
            .authenticate(
                &form.flow_id,
                &form.email,
                &form.password,
                &fingerprint,
                existing.as_deref(),
            )
            .await
        {
            Ok(login) => {
                let mut response = Self::next_step(&resources, login.outcome);
                set_sso_cookie(
                    response.headers_mut(),
                    &login.sso_session.session_id,
                    resources.oauth().sso_session_ttl.num_seconds(),
                    resources.cookies.secure,
                );
                response
            }
            Err(err) => Self::flow_error(&resources, err),
        }
    }

    /// Consent page data (GET /auth/consent?flow_id=...)
    async fn handle_consent_prompt(
        State(resources): State<Arc<ServerResources>>,
        Query(query): Query<FlowQuery>,
    ) -> Response {
        match resources.engine.pending_consent(&query.flow_id).await {
            Ok(prompt) => Json(prompt).into_response(),
            Err(err) => Self::flow_error(&resources, err),
        }
    }

    /// Consent decision (POST /auth/consent)
    async fn handle_consent_decision(
        State(resources): State<Arc<ServerResources>>,
        Form(form): Form<ConsentForm>,
    ) -> Response {
        let result = match form.decision.as_str() {
            "approve" => Self::approve(&resources, &form).await,
            "deny" => resources.engine.deny_consent(&form.flow_id).await,
            other => {
                return error_page(&OAuth2Error::invalid_request(&format!(
                    "Unknown consent decision: {other}"
                )))
            }
        };
        match result {
            Ok(redirect) => found(&redirect),
            Err(err) => Self::flow_error(&resources, err),
        }
    }

    async fn approve(resources: &ServerResources, form: &ConsentForm) -> Result<String, FlowError> {
        let approved = match form.scope.as_deref() {
            Some(scope) => parse_scope(scope),
            None => resources
                .engine
                .pending_consent(&form.flow_id)
                .await?
                .scopes
                .into_iter()
                .map(|scope| scope.name)
                .collect(),
        };
        resources
            .engine
            .grant_consent(&form.flow_id, &approved)
            .await
    }

    /// Logout via query string (GET /auth/logout)
    async fn handle_logout_query(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(params): Query<LogoutParams>,
    ) -> Response {
        Self::logout(&resources, &headers, params).await
    }

    /// Logout via form (POST /auth/logout)
    async fn handle_logout_form(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Form(params): Form<LogoutParams>,
    ) -> Response {
        Self::logout(&resources, &headers, params).await
    }

    async fn logout(
        resources: &ServerResources,
        headers: &HeaderMap,
        params: LogoutParams,
    ) -> Response {
        let session = sso_session_id(headers);
        let mut response = match resources
            .engine
            .logout(
                session.as_deref(),
                params.client_id.as_deref(),
                params.post_logout_redirect_uri.as_deref(),
                params.state.as_deref(),
            )
            .await
        {
            Ok(Some(redirect)) => found(&redirect),
            Ok(None) => Json(json!({ "status": "logged_out" })).into_response(),
            Err(err) => err.into_response(),
        };
        clear_sso_cookie(response.headers_mut(), resources.cookies.secure);
        response
    }

    /// Handle user registration (POST /auth/register)
    async fn handle_register(
        State(resources): State<Arc<ServerResources>>,
        Json(request): Json<UserRegistrationRequest>,
    ) -> Result<Response, AppError> {
        let user = resources.engine.accounts().register_user(request).await?;
        let body = UserRegistrationResponse {
            user_id: user.id.to_string(),
            email: user.email,
        };
        Ok((StatusCode::CREATED, Json(body)).into_response())
    }
}
