// ABOUTME: Long-lived browser session independent of any one client
// ABOUTME: Usable for silent authorization only while authenticated and unexpired
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Fingerprint;

/// SSO session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoSession {
    /// Opaque, high-entropy identifier carried in the cookie
    #[serde(skip_serializing)]
    pub session_id: String,
    /// Public handle used by the account endpoints
    pub handle: String,
    /// Owning user
    pub user_id: Uuid,
    /// Whether the user completed authentication
    pub authenticated: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last validated use
    pub last_activity: DateTime<Utc>,
    /// Expiry time
    pub expires_at: DateTime<Utc>,
    /// Fingerprint recorded at creation
    pub fingerprint: Fingerprint,
}

impl SsoSession {
    /// `authenticated && now < expires_at`
    #[must_use]
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.authenticated && now < self.expires_at
    }

    /// Expiry alone, for sweeping
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
