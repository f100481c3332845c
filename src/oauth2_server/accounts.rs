// ABOUTME: End-user registration and password verification with bcrypt
// ABOUTME: Login failures for unknown users and wrong passwords cost the same work
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use gatekeeper_core::constants::limits::MIN_PASSWORD_LENGTH;
use gatekeeper_core::errors::{AppError, AppResult};
use gatekeeper_core::models::User;
use tracing::warn;
use uuid::Uuid;

use super::models::UserRegistrationRequest;
use crate::stores::UserStore;
use crate::utils::clock::Clock;

/// Cost used for new verifiers; low in debug builds so tests stay fast
const fn bcrypt_cost() -> u32 {
    if cfg!(debug_assertions) {
        4
    } else {
        bcrypt::DEFAULT_COST
    }
}

/// User account registration and credential checks
#[derive(Clone)]
pub struct AccountManager {
    users: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    /// Verified against when the email is unknown
    dummy_hash: Arc<str>,
}

impl AccountManager {
    /// Manager over `users`
    ///
    /// # Errors
    /// Returns error if the placeholder verifier cannot be computed
    pub fn new(users: Arc<dyn UserStore>, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let dummy_hash = bcrypt::hash(Uuid::new_v4().to_string(), bcrypt_cost())
            .map_err(|e| AppError::internal(format!("Failed to hash password: {e}")))?;
        Ok(Self {
            users,
            clock,
            dummy_hash: dummy_hash.into(),
        })
    }

    /// Create a user with a bcrypt password verifier
    ///
    /// # Errors
    /// Returns `InvalidInput` for a malformed email or short password and
    /// `ResourceAlreadyExists` if the email is taken
    pub async fn register_user(&self, request: UserRegistrationRequest) -> AppResult<User> {
        let email = request.email.trim().to_owned();
        if !Self::is_plausible_email(&email) {
            return Err(AppError::invalid_input("Invalid email address"));
        }
        if request.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AppError::invalid_input(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        let password = request.password;
        let password_hash =
            tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt_cost()))
                .await
                .map_err(|e| AppError::internal(format!("Password hashing task failed: {e}")))?
                .map_err(|e| AppError::internal(format!("Failed to hash password: {e}")))?;

        let now = self.clock.now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            email_verified: false,
            password_hash,
            display_name: request.display_name,
            given_name: request.given_name,
            family_name: request.family_name,
            picture: None,
            phone_number: request.phone_number,
            phone_number_verified: false,
            address: None,
            created_at: now,
            updated_at: now,
        };
        self.users.create_user(&user).await?;
        Ok(user)
    }

    /// Check an email/password pair
    ///
    /// Returns `None` for both unknown emails and wrong passwords.
    ///
    /// # Errors
    /// Returns error only if the user store is unavailable
    pub async fn verify_credentials(&self, email: &str, password: &str) -> AppResult<Option<User>> {
        let user = self.users.get_user_by_email(email.trim()).await?;
        let hash = user
            .as_ref()
            .map_or_else(|| self.dummy_hash.to_string(), |u| u.password_hash.clone());

        let verified = verify_password(password, &hash).await;
        match user {
            Some(user) if verified => Ok(Some(user)),
            _ => {
                warn!("Password login failed");
                Ok(None)
            }
        }
    }

    /// Look up a user by id
    ///
    /// # Errors
    /// Returns error if the user store is unavailable
    pub async fn get_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        self.users.get_user(user_id).await
    }

    fn is_plausible_email(email: &str) -> bool {
        email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }) && !email.chars().any(char::is_whitespace)
    }
}

/// Verify password against hash using bcrypt with `spawn_blocking`
async fn verify_password(password: &str, hash: &str) -> bool {
    let password = password.to_owned();
    let hash = hash.to_owned();

    tokio::task::spawn_blocking(move || bcrypt::verify(&password, &hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}
