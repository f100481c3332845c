// ABOUTME: Tracking record for an issued refresh token
// ABOUTME: Presence of the jti is what makes a refresh token redeemable
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Live refresh token
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    /// `jti` claim of the refresh token
    pub jti: String,
    /// Owning user
    pub user_id: Uuid,
    /// Client the token was issued to
    pub client_id: String,
    /// Space-separated scopes of the original grant
    pub scope: String,
    /// Issue time
    pub issued_at: DateTime<Utc>,
    /// Expiry time
    pub expires_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    /// A record is usable strictly before `expires_at`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
