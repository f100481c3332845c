// ABOUTME: Account self-service route handlers for SSO sessions and client authorizations
// ABOUTME: Lists and revokes a user's signed-in sessions and consented clients via the SSO cookie
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Account routes
//!
//! Every handler authenticates through the SSO session cookie.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use gatekeeper_core::constants::endpoints;
use gatekeeper_core::errors::AppError;
use gatekeeper_core::models::SsoSession;
use serde_json::json;

use crate::resources::ServerResources;
use crate::security::cookies::{clear_sso_cookie, sso_session_id};

/// Account routes implementation
pub struct AccountRoutes;

impl AccountRoutes {
    /// Create all account self-service routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        let session_path = format!("{}/:session_id", endpoints::ACCOUNT_SESSIONS);
        let authorization_path = format!("{}/:client_id", endpoints::ACCOUNT_AUTHORIZATIONS);
        Router::new()
            .route(endpoints::ACCOUNT_SESSIONS, get(Self::handle_list_sessions))
            .route(&session_path, delete(Self::handle_revoke_session))
            .route(
                endpoints::ACCOUNT_AUTHORIZATIONS,
                get(Self::handle_list_authorizations),
            )
            .route(&authorization_path, delete(Self::handle_revoke_authorization))
            .with_state(resources)
    }

    /// Resolve the caller's SSO session from the cookie
    async fn authenticate(
        headers: &HeaderMap,
        resources: &ServerResources,
    ) -> Result<SsoSession, AppError> {
        let session_id = sso_session_id(headers).ok_or_else(AppError::auth_required)?;
        resources
            .engine
            .current_session(&session_id)
            .await?
            .ok_or_else(AppError::auth_required)
    }

    /// List signed-in sessions (GET /account/sessions)
    async fn handle_list_sessions(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        let current = Self::authenticate(&headers, &resources).await?;
        let sessions = resources.engine.list_sessions(current.user_id).await?;
        Ok(Json(json!({
            "current": current.handle,
            "sessions": sessions,
        }))
        .into_response())
    }

    /// Sign out one session (DELETE /account/sessions/:session_id)
    async fn handle_revoke_session(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(handle): Path<String>,
    ) -> Result<Response, AppError> {
        let current = Self::authenticate(&headers, &resources).await?;
        resources
            .engine
            .revoke_session(current.user_id, &handle)
            .await?;

        let mut response = StatusCode::NO_CONTENT.into_response();
        if handle == current.handle {
            clear_sso_cookie(response.headers_mut(), resources.cookies.secure);
        }
        Ok(response)
    }

    /// List consented clients (GET /account/authorizations)
    async fn handle_list_authorizations(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        let current = Self::authenticate(&headers, &resources).await?;
        let authorizations = resources
            .engine
            .list_authorizations(current.user_id)
            .await?;
        Ok(Json(json!({ "authorizations": authorizations })).into_response())
    }

    /// Revoke a client's consent and refresh tokens (DELETE /account/authorizations/:client_id)
    async fn handle_revoke_authorization(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(client_id): Path<String>,
    ) -> Result<Response, AppError> {
        let current = Self::authenticate(&headers, &resources).await?;
        resources
            .engine
            .revoke_authorization(current.user_id, &client_id)
            .await?;
        Ok(StatusCode::NO_CONTENT.into_response())
    }
}
