// ABOUTME: Health check route handlers for service monitoring and status endpoints
// ABOUTME: Provides the liveness endpoint used by load balancers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Health check routes for service monitoring

/// Health routes implementation
pub struct HealthRoutes;

impl HealthRoutes {
    /// Create all health check routes
    pub fn routes() -> axum::Router {
        use axum::{routing::get, Json, Router};
        use gatekeeper_core::constants::endpoints;

        async fn health_handler() -> Json<serde_json::Value> {
            Json(serde_json::json!({
                "status": "healthy",
                "service": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }))
        }

        Router::new().route(endpoints::HEALTH_CHECK, get(health_handler))
    }
}
