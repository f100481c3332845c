// ABOUTME: Registered end-user identity with password verifier and OIDC claims
// ABOUTME: Read-only to the authorization engine after registration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// End user
#[derive(Debug, Clone)]
pub struct User {
    /// Opaque user identifier, the `sub` claim
    pub id: Uuid,
    /// Unique email address
    pub email: String,
    /// Whether the email address was verified
    pub email_verified: bool,
    /// Bcrypt password verifier
    pub password_hash: String,
    /// Display name, the `name` claim
    pub display_name: Option<String>,
    /// `given_name` claim
    pub given_name: Option<String>,
    /// `family_name` claim
    pub family_name: Option<String>,
    /// `picture` claim
    pub picture: Option<String>,
    /// `phone_number` claim
    pub phone_number: Option<String>,
    /// `phone_number_verified` claim
    pub phone_number_verified: bool,
    /// Formatted postal address
    pub address: Option<String>,
    /// Registration time
    pub created_at: DateTime<Utc>,
    /// Last profile change
    pub updated_at: DateTime<Utc>,
}
