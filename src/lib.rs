// ABOUTME: Main library entry point for the Gatekeeper OAuth 2.0 / OpenID Connect provider
// ABOUTME: Exposes the Authorization Engine, its stores, token codec, and HTTP routes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

// Crate-level attributes:
// - deny(unsafe_code): Zero-tolerance unsafe policy
#![deny(unsafe_code)]

//! # Gatekeeper OIDC
//!
//! An OAuth 2.0 authorization server and OpenID Connect provider.
//!
//! ## Features
//!
//! - **Authorization code flow** with PKCE (S256), `state`, `nonce`, and `prompt`
//! - **Single sign-on**: a browser SSO session skips the login page, bound to a
//!   client fingerprint
//! - **Consent memory**: approved scopes are remembered per user and client
//! - **Refresh tokens** with rotation and replay detection
//! - **Client credentials** and **token exchange** (RFC 8693), optionally
//!   producing encrypted (JWE) tokens
//! - **Pluggable storage**: in-memory or `SQLite` backends behind store traits
//!
//! ## Quick Start
//!
//! 1. Set `OAUTH2_ISSUER_URL` and `DATABASE_URL`
//! 2. Run `gatekeeper-oidc --http-port 8081`
//! 3. Register a client with `POST /oauth/register`

// ── Public API ──────────────────────────────────────────────────────────

/// Environment and protocol configuration
pub mod config;

/// Signing key management and JWKS publication
pub mod jwks;

/// Structured logging and security event helpers
pub mod logging;

/// Authorization server: engine, grants, registration, accounts
pub mod oauth2_server;

/// Shared resource container handed to every route
pub mod resources;

/// HTTP routes
pub mod routes;

/// Scope catalog and scope-set helpers
pub mod scopes;

/// Cookie and header security utilities
pub mod security;

/// Persistence traits and their backends
pub mod stores;

/// JWT and JWE minting and verification
pub mod tokens;

/// Clock injection and HTML rendering helpers
pub mod utils;
