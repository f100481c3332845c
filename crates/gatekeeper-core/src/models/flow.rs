// ABOUTME: Transient authorize-request context awaiting login or consent
// ABOUTME: Mutated once when the user authenticates, deleted on code issuance
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// OAuth flow session
#[derive(Debug, Clone)]
pub struct FlowSession {
    /// High-entropy session identifier
    pub session_id: String,
    /// Requesting client
    pub client_id: String,
    /// Verified redirect URI
    pub redirect_uri: String,
    /// Space-separated requested scopes
    pub scope: String,
    /// Client `state` echoed on redirect
    pub state: Option<String>,
    /// Requested response type
    pub response_type: String,
    /// OIDC nonce
    pub nonce: Option<String>,
    /// PKCE code challenge
    pub code_challenge: Option<String>,
    /// PKCE code challenge method
    pub code_challenge_method: Option<String>,
    /// `prompt=consent` was requested
    pub force_consent: bool,
    /// Set once the user has authenticated
    pub authenticated: bool,
    /// Authenticated user
    pub user_id: Option<Uuid>,
    /// When the user authenticated
    pub auth_time: Option<DateTime<Utc>>,
    /// SSO session backing the authentication
    pub sso_session_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Expiry time
    pub expires_at: DateTime<Utc>,
}

impl FlowSession {
    /// A flow is usable strictly before `expires_at`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Requested scopes as a list
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        self.scope.split_whitespace().map(str::to_owned).collect()
    }
}
