// ABOUTME: Server binary for the Gatekeeper OAuth 2.0 / OpenID Connect provider
// ABOUTME: Loads configuration and keys, opens the stores, and serves HTTP until interrupted
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Gatekeeper OIDC Server Binary
//!
//! Reads configuration from the environment, loads or generates the signing
//! key, and serves the authorization server with graceful shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gatekeeper_oidc::{
    config::ServerConfig,
    jwks::JwksManager,
    logging,
    resources::ServerResources,
    routes,
    stores::{factory::create_stores, sweeper::ExpirySweeper},
    utils::clock::SystemClock,
};
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "gatekeeper-oidc")]
#[command(about = "Gatekeeper - OAuth 2.0 authorization server and OpenID Connect provider")]
pub struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_from_env()?;

    // Load configuration from environment
    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }
    config.validate()?;
    info!("{}", config.summary());

    // Refuse to start without signing keys
    let keys = JwksManager::load_or_generate(&config.keys.signing_key_path, config.keys.rsa_key_bits)
        .context("Signing key unavailable")?;

    let stores = create_stores(&config.database).await?;
    let clock = Arc::new(SystemClock);
    let resources = Arc::new(ServerResources::from_config(
        &config,
        stores.clone(),
        Arc::new(keys),
        clock.clone(),
    )?);

    let sweeper = ExpirySweeper::new(stores, clock, config.sweep_interval).spawn();

    let app = routes::router(resources);
    let listener = TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("Cannot bind port {}", config.http_port))?;
    info!(
        port = config.http_port,
        issuer = %config.oauth.issuer_url,
        "Authorization server listening"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.shutdown().await;

    if let Err(e) = served {
        error!("Server error: {e}");
        return Err(e.into());
    }
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
