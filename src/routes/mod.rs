// ABOUTME: HTTP route assembly for the authorization server
// ABOUTME: Merges protocol, browser-flow, account, discovery, and health routers under request tracing
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Routes Module
//!
//! Each domain contributes a `XRoutes::routes(resources)` router; [`router`]
//! merges them into the application served by the binary and the tests.

use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::oauth2_server::{FlowError, OAuth2Error};
use crate::resources::ServerResources;
use crate::utils::html::render_error_page;

/// Account self-service routes
pub mod account;
/// Login, consent, logout, and user registration routes
pub mod auth;
/// Health check routes
pub mod health;
/// OAuth 2.0 protocol endpoints
pub mod oauth2;
/// Discovery document and JWKS
pub mod well_known;

pub use account::AccountRoutes;
pub use auth::AuthRoutes;
pub use health::HealthRoutes;
pub use oauth2::OAuth2Routes;
pub use well_known::WellKnownRoutes;

/// The complete application router
pub fn router(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .merge(OAuth2Routes::routes(resources.clone()))
        .merge(AuthRoutes::routes(resources.clone()))
        .merge(AccountRoutes::routes(resources.clone()))
        .merge(WellKnownRoutes::routes(resources))
        .merge(HealthRoutes::routes())
        .layer(TraceLayer::new_for_http())
}

/// `302 Found` to the given location
pub(crate) fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_owned())]).into_response()
}

/// External UI page URL carrying the flow id and optional extra parameters
pub(crate) fn page_url(base: &str, flow_id: &str, extra: &[(&str, &str)]) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    let mut url = format!("{base}{separator}flow_id={}", urlencoding::encode(flow_id));
    for (key, value) in extra {
        url.push('&');
        url.push_str(key);
        url.push('=');
        url.push_str(&urlencoding::encode(value));
    }
    url
}

/// Escaped HTML error page with the protocol error's status
pub(crate) fn error_page(err: &OAuth2Error) -> Response {
    (
        err.status(),
        Html(render_error_page(&err.error, err.description())),
    )
        .into_response()
}

/// Browser response for a failed flow step
pub(crate) fn flow_error_response(err: FlowError, login_page_url: &str) -> Response {
    match err {
        FlowError::Render(err) => error_page(&err),
        FlowError::Redirect { redirect } => found(&redirect),
        FlowError::InvalidCredentials { flow_id } => found(&page_url(
            login_page_url,
            &flow_id,
            &[("error", "invalid_credentials")],
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url_encodes_parameters() {
        assert_eq!(page_url("/login", "a b", &[]), "/login?flow_id=a%20b");
        assert_eq!(
            page_url("https://ui.example/login?lang=en", "f1", &[("error", "invalid_credentials")]),
            "https://ui.example/login?lang=en&flow_id=f1&error=invalid_credentials"
        );
    }

    #[test]
    fn test_render_error_is_html_with_status() {
        let response = flow_error_response(
            FlowError::Render(OAuth2Error::invalid_request("<bad>")),
            "/login",
        );
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().starts_with("text/html"));
    }

    #[test]
    fn test_invalid_credentials_return_to_login() {
        let response = flow_error_response(
            FlowError::InvalidCredentials {
                flow_id: "f1".to_owned(),
            },
            "/login",
        );
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/login?flow_id=f1&error=invalid_credentials"
        );
    }
}
