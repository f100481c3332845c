// ABOUTME: Registered OAuth 2.0 client application record
// ABOUTME: Exact-match redirect URI checks and grant/scope allow-lists
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored OAuth 2.0 Client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Client {
    /// OAuth 2.0 client identifier
    pub client_id: String,
    /// Argon2 hash of the client secret
    #[serde(skip_serializing)]
    pub client_secret_hash: String,
    /// Registered redirect URIs for authorization code flow
    pub redirect_uris: Vec<String>,
    /// Redirect URIs accepted after logout
    pub post_logout_redirect_uris: Vec<String>,
    /// Allowed OAuth 2.0 grant types
    pub grant_types: Vec<String>,
    /// Allowed OAuth 2.0 response types
    pub response_types: Vec<String>,
    /// Human-readable client name
    pub client_name: Option<String>,
    /// Client's home page URL
    pub client_uri: Option<String>,
    /// Space-separated list of allowed scopes, `None` means any registered scope
    pub scope: Option<String>,
    /// When this client was created
    pub created_at: DateTime<Utc>,
    /// Optional expiration time for the client registration
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuth2Client {
    /// Exact string comparison against the registered redirect URIs
    #[must_use]
    pub fn has_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }

    /// Exact string comparison against the registered post-logout URIs
    #[must_use]
    pub fn has_post_logout_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.post_logout_redirect_uris
            .iter()
            .any(|uri| uri == redirect_uri)
    }

    /// Whether the client registered the given grant type
    #[must_use]
    pub fn allows_grant(&self, grant_type: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant_type)
    }

    /// Whether the client may request `scope`
    #[must_use]
    pub fn allows_scope(&self, scope: &str) -> bool {
        self.scope
            .as_deref()
            .is_none_or(|allowed| allowed.split_whitespace().any(|s| s == scope))
    }

    /// Registration expiry check
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}
