// ABOUTME: Single-use authorization code record
// ABOUTME: Binds client, user, redirect URI, scope, nonce, and PKCE challenge
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// OAuth 2.0 Authorization Code
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    /// The authorization code value (`{random}_{session_id}`)
    pub code: String,
    /// Client ID that requested this code
    pub client_id: String,
    /// User who authorized the code
    pub user_id: Uuid,
    /// Redirect URI that must match during token exchange
    pub redirect_uri: String,
    /// Space-separated list of granted scopes
    pub scope: String,
    /// OIDC nonce echoed into the ID token
    pub nonce: Option<String>,
    /// PKCE code challenge (RFC 7636)
    pub code_challenge: Option<String>,
    /// PKCE code challenge method
    pub code_challenge_method: Option<String>,
    /// When the user authenticated
    pub auth_time: DateTime<Utc>,
    /// SSO session the code was issued under
    pub sso_session_id: Option<String>,
    /// When this code was issued
    pub created_at: DateTime<Utc>,
    /// When this authorization code expires
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationCode {
    /// A code is usable strictly before `expires_at`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
