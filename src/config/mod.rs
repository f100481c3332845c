// ABOUTME: Configuration management module for centralized server settings and parameters
// ABOUTME: Environment-only loading of ports, persistence, key material, and protocol policy
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Configuration module for Gatekeeper OIDC
//!
//! - **Environment**: Server configuration from environment variables
//! - **OAuth**: Token lifetimes and policy switches consumed by the authorization engine

/// Environment and server configuration
pub mod environment;
/// Authorization server protocol configuration
pub mod oauth;

pub use environment::{CookieConfig, DatabaseUrl, Environment, KeyConfig, ServerConfig};
pub use oauth::{FingerprintPolicy, OAuth2ServerConfig, RefreshTokenPolicy};
