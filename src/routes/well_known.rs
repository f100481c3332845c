// ABOUTME: Well-known discovery route handlers for OpenID Provider metadata and signing keys
// ABOUTME: Serves /.well-known/openid-configuration and /.well-known/jwks.json
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use gatekeeper_core::constants::endpoints;

use crate::resources::ServerResources;

/// Discovery routes implementation
pub struct WellKnownRoutes;

impl WellKnownRoutes {
    /// Create discovery and JWKS routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(endpoints::DISCOVERY, get(Self::handle_discovery))
            .route(endpoints::JWKS, get(Self::handle_jwks))
            .with_state(resources)
    }

    async fn handle_discovery(State(resources): State<Arc<ServerResources>>) -> Json<serde_json::Value> {
        Json(resources.engine.discovery_document())
    }

    async fn handle_jwks(State(resources): State<Arc<ServerResources>>) -> Response {
        let mut response = Json(resources.engine.jwks()).into_response();
        response.headers_mut().insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=3600"),
        );
        response
    }
}
