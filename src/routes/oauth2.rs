// ABOUTME: OAuth 2.0 server route handlers for RFC-compliant authorization server endpoints
// ABOUTME: Authorize, token, userinfo, revocation, and dynamic client registration
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! OAuth 2.0 server routes for authorization server functionality

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use gatekeeper_core::constants::endpoints;

use super::{error_page, flow_error_response, found, page_url};
use crate::oauth2_server::{
    AuthorizeOutcome, AuthorizeRequest, BasicCredentials, ClientRegistrationRequest, OAuth2Error,
    RevocationRequest, TokenRequest,
};
use crate::resources::ServerResources;
use crate::security::cookies::sso_session_id;
use crate::security::headers::{
    basic_credentials, bearer_token, has_basic_scheme, request_fingerprint,
};

/// `OAuth2` routes implementation
pub struct OAuth2Routes;

impl OAuth2Routes {
    /// Create all `OAuth2` protocol routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(endpoints::AUTHORIZE, get(Self::handle_authorize))
            .route(endpoints::TOKEN, post(Self::handle_token))
            .route(
                endpoints::USERINFO,
                get(Self::handle_userinfo).post(Self::handle_userinfo),
            )
            .route(endpoints::REVOKE, post(Self::handle_revoke))
            .route(endpoints::REGISTER, post(Self::handle_register))
            .with_state(resources)
    }

    /// Client credentials from the Basic header
    ///
    /// A Basic header that does not decode fails client authentication outright.
    fn client_credentials(headers: &HeaderMap) -> Result<Option<BasicCredentials>, OAuth2Error> {
        match basic_credentials(headers) {
            Some(credentials) => Ok(Some(credentials)),
            None if has_basic_scheme(headers) => Err(OAuth2Error::invalid_client()),
            None => Ok(None),
        }
    }

    /// Handle authorization request (GET /oauth/authorize)
    async fn handle_authorize(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        query: Result<Query<AuthorizeRequest>, QueryRejection>,
    ) -> Response {
        let Ok(Query(request)) = query else {
            return error_page(&OAuth2Error::invalid_request(
                "Malformed authorization request",
            ));
        };
        let oauth = resources.oauth();
        let sso_session = sso_session_id(&headers);
        let fingerprint = request_fingerprint(&headers);

        match resources
            .engine
            .authorize(&request, sso_session.as_deref(), &fingerprint)
            .await
        {
            Ok(AuthorizeOutcome::CodeIssued { redirect }) => found(&redirect),
            Ok(AuthorizeOutcome::Login { flow_id }) => {
                found(&page_url(&oauth.login_page_url, &flow_id, &[]))
            }
            Ok(AuthorizeOutcome::Consent(prompt)) => {
                found(&page_url(&oauth.consent_page_url, &prompt.flow_id, &[]))
            }
            Err(err) => flow_error_response(err, &oauth.login_page_url),
        }
    }

    /// Handle token request (POST /oauth/token)
    async fn handle_token(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        form: Result<Form<TokenRequest>, FormRejection>,
    ) -> Result<Response, OAuth2Error> {
        let Form(request) =
            form.map_err(|e| OAuth2Error::invalid_request(&format!("Malformed token request: {e}")))?;
        let basic = Self::client_credentials(&headers)?;

        let token = resources.engine.token(request, basic).await?;
        let mut response = Json(token).into_response();
        let response_headers = response.headers_mut();
        response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response_headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        Ok(response)
    }

    /// Handle UserInfo request (GET or POST /oauth/userinfo)
    async fn handle_userinfo(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, OAuth2Error> {
        let token = bearer_token(&headers)
            .ok_or_else(|| OAuth2Error::invalid_token("Missing bearer token"))?;
        let claims = resources.engine.userinfo(token).await?;
        Ok(Json(claims).into_response())
    }

    /// Handle token revocation (POST /oauth/revoke, RFC 7009)
    async fn handle_revoke(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        form: Result<Form<RevocationRequest>, FormRejection>,
    ) -> Result<Response, OAuth2Error> {
        let Form(request) = form
            .map_err(|e| OAuth2Error::invalid_request(&format!("Malformed revocation request: {e}")))?;
        let basic = Self::client_credentials(&headers)?;
        resources.engine.revoke_token(request, basic).await?;
        Ok(StatusCode::OK.into_response())
    }

    /// Handle dynamic client registration (POST /oauth/register, RFC 7591)
    async fn handle_register(
        State(resources): State<Arc<ServerResources>>,
        body: Result<Json<ClientRegistrationRequest>, JsonRejection>,
    ) -> Result<Response, OAuth2Error> {
        let Json(request) = body.map_err(|e| {
            OAuth2Error::invalid_client_metadata(&format!("Malformed registration request: {e}"))
        })?;
        let registered = resources.engine.clients().register_client(request).await?;
        Ok((StatusCode::CREATED, Json(registered)).into_response())
    }
}
