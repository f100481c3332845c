// ABOUTME: JWT claim set used for access, refresh, and ID tokens
// ABOUTME: Includes the RFC 8693 actor chain and flattened user claims for ID tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use gatekeeper_core::constants::token_use;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Token shape, carried in the `token_use` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bearer access token
    Access,
    /// Refresh token
    Refresh,
    /// OIDC ID token
    Id,
}

impl TokenKind {
    /// Claim value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => token_use::ACCESS,
            Self::Refresh => token_use::REFRESH,
            Self::Id => token_use::ID,
        }
    }
}

/// RFC 8693 `act` claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Acting party (the client that performed the exchange)
    pub sub: String,
    /// Earlier actor when a delegated token is exchanged again
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub act: Option<Box<Actor>>,
}

/// Claims of every token minted by this server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuer
    pub iss: String,
    /// Subject: user id, or `client:{client_id}` for client credentials
    pub sub: String,
    /// Audience
    pub aud: String,
    /// Expiry (Unix seconds)
    pub exp: i64,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Unique token id
    pub jti: String,
    /// `access`, `refresh` or `id`
    pub token_use: String,
    /// Granted scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Client the token was issued to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// OIDC nonce (ID tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Time of user authentication (ID tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,
    /// Delegation chain (exchanged tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub act: Option<Actor>,
    /// Scope-filtered user claims (ID tokens)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    /// Granted scopes as a list
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// Whether the claims carry the given shape
    #[must_use]
    pub fn is_kind(&self, kind: TokenKind) -> bool {
        self.token_use == kind.as_str()
    }
}
