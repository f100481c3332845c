// ABOUTME: Persistence interfaces for clients, users, codes, flows, SSO sessions, consents, refresh tokens
// ABOUTME: Async traits with in-memory and SQLite implementations behind a shared bundle
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Stores
//!
//! Every operation on a single record is atomic with respect to concurrent
//! callers. Lookups that take `now` never return a record whose expiry has
//! passed, whether or not the sweeper has run yet.

/// Store construction from a database URL
pub mod factory;
/// `DashMap`-backed implementation
pub mod memory;
/// `sqlx` SQLite implementation
pub mod sqlite;
/// Periodic removal of expired records
pub mod sweeper;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatekeeper_core::errors::AppResult;
use gatekeeper_core::models::{
    AuthorizationCode, FlowSession, OAuth2Client, RefreshTokenRecord, SsoSession, User,
    UserConsent,
};
use uuid::Uuid;

pub use factory::create_stores;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use sweeper::ExpirySweeper;

/// Registered OAuth clients
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Persist a new client
    ///
    /// # Errors
    /// Returns `ResourceAlreadyExists` if the `client_id` is taken
    async fn create_client(&self, client: &OAuth2Client) -> AppResult<()>;

    /// Look up a client by id
    async fn get_client(&self, client_id: &str) -> AppResult<Option<OAuth2Client>>;
}

/// End-user accounts
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Persist a new user; emails are unique case-insensitively
    ///
    /// # Errors
    /// Returns `ResourceAlreadyExists` if the email is registered
    async fn create_user(&self, user: &User) -> AppResult<()>;

    /// Look up a user by id
    async fn get_user(&self, user_id: Uuid) -> AppResult<Option<User>>;

    /// Look up a user by email
    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>>;
}

/// Single-use authorization codes
#[async_trait]
pub trait AuthorizationCodeStore: Send + Sync {
    /// Persist a freshly issued code
    async fn store_code(&self, code: &AuthorizationCode) -> AppResult<()>;

    /// Remove and return the code in one step. Of any number of concurrent
    /// callers presenting the same code, at most one receives `Some`.
    async fn consume_code(&self, code: &str) -> AppResult<Option<AuthorizationCode>>;

    /// Drop codes whose expiry is at or before `now`
    async fn delete_expired_codes(&self, now: DateTime<Utc>) -> AppResult<u64>;
}

/// Transient login/consent state between `/authorize` and code issuance
#[async_trait]
pub trait FlowSessionStore: Send + Sync {
    /// Persist a new flow session
    async fn create_flow(&self, flow: &FlowSession) -> AppResult<()>;

    /// Look up a live flow session
    async fn find_flow(&self, session_id: &str, now: DateTime<Utc>)
        -> AppResult<Option<FlowSession>>;

    /// Record the authenticated user; returns false if the flow is gone
    async fn mark_flow_authenticated(
        &self,
        session_id: &str,
        user_id: Uuid,
        auth_time: DateTime<Utc>,
        sso_session_id: &str,
    ) -> AppResult<bool>;

    /// Remove a flow session; returns whether it existed
    async fn delete_flow(&self, session_id: &str) -> AppResult<bool>;

    /// Drop flows whose expiry is at or before `now`
    async fn delete_expired_flows(&self, now: DateTime<Utc>) -> AppResult<u64>;
}

/// Browser single sign-on sessions
#[async_trait]
pub trait SsoSessionStore: Send + Sync {
    /// Persist a new SSO session
    async fn create_session(&self, session: &SsoSession) -> AppResult<()>;

    /// Look up an unexpired session by its cookie value
    async fn find_session(&self, session_id: &str, now: DateTime<Utc>)
        -> AppResult<Option<SsoSession>>;

    /// Advance `last_activity`; never moves it backwards
    async fn touch_session(&self, session_id: &str, now: DateTime<Utc>) -> AppResult<()>;

    /// Remove a session; returns whether it existed
    async fn delete_session(&self, session_id: &str) -> AppResult<bool>;

    /// Unexpired sessions for a user, oldest first
    async fn find_sessions_by_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<SsoSession>>;

    /// Drop sessions whose expiry is at or before `now`
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> AppResult<u64>;
}

/// Per (user, client) scope grants
#[async_trait]
pub trait ConsentStore: Send + Sync {
    /// Atomically add `consent.scopes` to the pair's live grant and return the stored record.
    ///
    /// A grant that has lapsed at `consent.granted_at` contributes nothing; timestamps and
    /// expiry are always taken from `consent`.
    async fn widen_consent(&self, consent: &UserConsent) -> AppResult<UserConsent>;

    /// Look up the grant for a pair, expired or not
    async fn find_consent(&self, user_id: Uuid, client_id: &str) -> AppResult<Option<UserConsent>>;

    /// Remove the grant for a pair; returns whether it existed
    async fn revoke_consent(&self, user_id: Uuid, client_id: &str) -> AppResult<bool>;

    /// All grants held by a user, ordered by client id
    async fn list_consents(&self, user_id: Uuid) -> AppResult<Vec<UserConsent>>;

    /// True iff an unexpired grant covers every requested scope
    async fn has_sufficient_consent(
        &self,
        user_id: Uuid,
        client_id: &str,
        requested: &[String],
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        Ok(self
            .find_consent(user_id, client_id)
            .await?
            .is_some_and(|consent| consent.is_sufficient(requested, now)))
    }
}

/// Live refresh token identifiers
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Track a newly minted refresh token
    async fn store_refresh_token(&self, record: &RefreshTokenRecord) -> AppResult<()>;

    /// Remove and return the record in one step; at most one caller wins
    async fn consume_refresh_token(&self, jti: &str) -> AppResult<Option<RefreshTokenRecord>>;

    /// Forget every refresh token a client holds for a user
    async fn delete_refresh_tokens_for(&self, user_id: Uuid, client_id: &str) -> AppResult<u64>;

    /// Drop records whose expiry is at or before `now`
    async fn delete_expired_refresh_tokens(&self, now: DateTime<Utc>) -> AppResult<u64>;
}

/// Every store the authorization engine needs
#[derive(Clone)]
pub struct Stores {
    /// Registered clients
    pub clients: Arc<dyn ClientStore>,
    /// User accounts
    pub users: Arc<dyn UserStore>,
    /// Authorization codes
    pub codes: Arc<dyn AuthorizationCodeStore>,
    /// Flow sessions
    pub flows: Arc<dyn FlowSessionStore>,
    /// SSO sessions
    pub sso_sessions: Arc<dyn SsoSessionStore>,
    /// Consent grants
    pub consents: Arc<dyn ConsentStore>,
    /// Refresh token identifiers
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
}

impl Stores {
    /// Use one backend for every store
    #[must_use]
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ClientStore
            + UserStore
            + AuthorizationCodeStore
            + FlowSessionStore
            + SsoSessionStore
            + ConsentStore
            + RefreshTokenStore
            + 'static,
    {
        Self {
            clients: backend.clone(),
            users: backend.clone(),
            codes: backend.clone(),
            flows: backend.clone(),
            sso_sessions: backend.clone(),
            consents: backend.clone(),
            refresh_tokens: backend,
        }
    }

    /// Fresh in-memory stores
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::new()))
    }
}
