// ABOUTME: Centralized resource container shared by every HTTP route
// ABOUTME: Wires the scope catalog, stores, key material, and clock into the Authorization Engine
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Server Resources Module
//!
//! Built once at startup and shared behind an `Arc`; handlers never construct
//! managers of their own.

use std::sync::Arc;

use gatekeeper_core::errors::AppResult;

use crate::config::{CookieConfig, OAuth2ServerConfig, ServerConfig};
use crate::jwks::KeyProvider;
use crate::oauth2_server::AuthorizationEngine;
use crate::scopes::{ScopeDefinition, ScopeRegistry};
use crate::stores::Stores;
use crate::utils::clock::Clock;

/// Centralized resource container for dependency injection
#[derive(Clone)]
pub struct ServerResources {
    /// Authorization Engine serving every protocol endpoint
    pub engine: Arc<AuthorizationEngine>,
    /// SSO cookie attributes
    pub cookies: CookieConfig,
}

impl ServerResources {
    /// Resources over an already assembled engine
    #[must_use]
    pub const fn new(engine: Arc<AuthorizationEngine>, cookies: CookieConfig) -> Self {
        Self { engine, cookies }
    }

    /// Assemble the engine from loaded configuration
    ///
    /// # Errors
    /// Returns error if the engine cannot be initialized
    pub fn from_config(
        config: &ServerConfig,
        stores: Stores,
        keys: Arc<dyn KeyProvider>,
        clock: Arc<dyn Clock>,
    ) -> AppResult<Self> {
        let scopes = Self::scope_registry(&config.oauth);
        let engine =
            AuthorizationEngine::new(Arc::new(config.oauth.clone()), stores, scopes, keys, clock)?;
        Ok(Self::new(Arc::new(engine), config.cookies))
    }

    /// Standard OIDC scopes plus the configured client-level scopes
    #[must_use]
    pub fn scope_registry(oauth: &OAuth2ServerConfig) -> Arc<ScopeRegistry> {
        let mut registry = ScopeRegistry::with_standard_scopes();
        for name in &oauth.extra_scopes {
            if registry.get(name).is_none() {
                registry.register(ScopeDefinition::new(name, name, &[]));
            }
        }
        Arc::new(registry)
    }

    /// Protocol configuration
    #[must_use]
    pub fn oauth(&self) -> &OAuth2ServerConfig {
        self.engine.config()
    }
}
