// ABOUTME: Startup wiring tests from environment variables to a serving router
// ABOUTME: Covers issuer and backend selection plus signing key persistence across restarts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;
mod helpers;

use std::env;
use std::sync::Arc;

use gatekeeper_oidc::{
    config::{DatabaseUrl, ServerConfig},
    jwks::{JwksManager, KeyProvider},
    resources::ServerResources,
    routes,
    stores::create_stores,
    utils::clock::SystemClock,
};
use helpers::axum_test::AxumTestRequest;
use serde_json::Value;
use serial_test::serial;
use tempfile::TempDir;

const VARS: [&str; 4] = [
    "OAUTH2_ISSUER_URL",
    "DATABASE_URL",
    "SIGNING_KEY_PATH",
    "EXTRA_SCOPES",
];

fn clear_vars() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[tokio::test]
#[serial]
async fn test_environment_drives_served_metadata() {
    common::init_test_logging();
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("gk.db");
    let key_path = dir.path().join("keys").join("signing.pem");
    env::set_var("OAUTH2_ISSUER_URL", "https://login.example.test");
    env::set_var("DATABASE_URL", format!("sqlite:{}", db_path.display()));
    env::set_var("SIGNING_KEY_PATH", key_path.display().to_string());
    env::set_var("EXTRA_SCOPES", "reports:read");

    let config = ServerConfig::from_env().unwrap();
    clear_vars();
    assert_eq!(config.database, DatabaseUrl::SQLite { path: db_path.clone() });
    assert_eq!(config.keys.signing_key_path, key_path);

    let keys = JwksManager::load_or_generate(&config.keys.signing_key_path, config.keys.rsa_key_bits)
        .unwrap();
    let kid = keys.active_key().unwrap().kid.clone();
    let stores = create_stores(&config.database).await.unwrap();
    let resources = ServerResources::from_config(
        &config,
        stores,
        Arc::new(keys),
        Arc::new(SystemClock),
    )
    .unwrap();
    let app = routes::router(Arc::new(resources));

    let response = AxumTestRequest::get("/.well-known/openid-configuration")
        .send(app.clone())
        .await;
    assert_eq!(response.status(), 200);
    let discovery: Value = response.json();
    assert_eq!(discovery["issuer"], "https://login.example.test");
    assert_eq!(
        discovery["token_endpoint"],
        "https://login.example.test/oauth/token"
    );
    assert!(discovery["scopes_supported"]
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s == "reports:read"));

    let jwks: Value = AxumTestRequest::get("/.well-known/jwks.json")
        .send(app)
        .await
        .json();
    assert_eq!(jwks["keys"][0]["kid"], kid.as_str());
    assert!(db_path.exists());
    assert!(key_path.exists());

    let reloaded = JwksManager::load_or_generate(&key_path, 2048).unwrap();
    assert_eq!(reloaded.active_key().unwrap().kid, kid);
}

#[test]
#[serial]
fn test_unsupported_database_url_fails_startup() {
    clear_vars();
    env::set_var("DATABASE_URL", "postgres://db.internal/gatekeeper");
    let result = ServerConfig::from_env();
    clear_vars();
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_default_configuration_summary() {
    clear_vars();
    let config = ServerConfig::from_env().unwrap();
    assert!(config.database.is_memory());

    let summary = config.summary();
    assert!(summary.contains("Issuer: http://localhost:"));
    assert!(summary.contains("Database: memory"));
}
