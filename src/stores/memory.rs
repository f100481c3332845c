// ABOUTME: In-memory implementation of every store trait on top of DashMap
// ABOUTME: Default backend for development and tests; contents are lost on restart
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::hash::Hash;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use gatekeeper_core::errors::{AppError, AppResult};
use gatekeeper_core::models::{
    AuthorizationCode, FlowSession, OAuth2Client, RefreshTokenRecord, SsoSession, User,
    UserConsent,
};
use uuid::Uuid;

use super::{
    AuthorizationCodeStore, ClientStore, ConsentStore, FlowSessionStore, RefreshTokenStore,
    SsoSessionStore, UserStore,
};

/// Process-local store
#[derive(Default)]
pub struct MemoryStore {
    clients: DashMap<String, OAuth2Client>,
    users: DashMap<Uuid, User>,
    users_by_email: DashMap<String, Uuid>,
    codes: DashMap<String, AuthorizationCode>,
    flows: DashMap<String, FlowSession>,
    sso_sessions: DashMap<String, SsoSession>,
    consents: DashMap<(Uuid, String), UserConsent>,
    refresh_tokens: DashMap<String, RefreshTokenRecord>,
}

impl MemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Remove entries matching `stale`, re-checking under the shard lock so a
/// concurrent writer is never clobbered
fn remove_where<K, V, F>(map: &DashMap<K, V>, stale: F) -> u64
where
    K: Eq + Hash + Clone,
    F: Fn(&V) -> bool,
{
    let candidates: Vec<K> = map
        .iter()
        .filter(|entry| stale(entry.value()))
        .map(|entry| entry.key().clone())
        .collect();

    let mut removed = 0;
    for key in candidates {
        if map.remove_if(&key, |_, value| stale(value)).is_some() {
            removed += 1;
        }
    }
    removed
}

#[async_trait]
impl ClientStore for MemoryStore {
    async fn create_client(&self, client: &OAuth2Client) -> AppResult<()> {
        match self.clients.entry(client.client_id.clone()) {
            Entry::Occupied(_) => Err(AppError::already_exists(format!(
                "Client {}",
                client.client_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(client.clone());
                Ok(())
            }
        }
    }

    async fn get_client(&self, client_id: &str) -> AppResult<Option<OAuth2Client>> {
        Ok(self.clients.get(client_id).map(|c| c.value().clone()))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: &User) -> AppResult<()> {
        match self.users_by_email.entry(user.email.to_lowercase()) {
            Entry::Occupied(_) => Err(AppError::already_exists("A user with this email")),
            Entry::Vacant(slot) => {
                self.users.insert(user.id, user.clone());
                slot.insert(user.id);
                Ok(())
            }
        }
    }

    async fn get_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.get(&user_id).map(|u| u.value().clone()))
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let Some(user_id) = self
            .users_by_email
            .get(&email.to_lowercase())
            .map(|id| *id.value())
        else {
            return Ok(None);
        };
        self.get_user(user_id).await
    }
}

#[async_trait]
impl AuthorizationCodeStore for MemoryStore {
    async fn store_code(&self, code: &AuthorizationCode) -> AppResult<()> {
        self.codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn consume_code(&self, code: &str) -> AppResult<Option<AuthorizationCode>> {
        Ok(self.codes.remove(code).map(|(_, record)| record))
    }

    async fn delete_expired_codes(&self, now: DateTime<Utc>) -> AppResult<u64> {
        Ok(remove_where(&self.codes, |c| c.is_expired(now)))
    }
}

#[async_trait]
impl FlowSessionStore for MemoryStore {
    async fn create_flow(&self, flow: &FlowSession) -> AppResult<()> {
        self.flows.insert(flow.session_id.clone(), flow.clone());
        Ok(())
    }

    async fn find_flow(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<FlowSession>> {
        Ok(self
            .flows
            .get(session_id)
            .filter(|flow| !flow.is_expired(now))
            .map(|flow| flow.value().clone()))
    }

    async fn mark_flow_authenticated(
        &self,
        session_id: &str,
        user_id: Uuid,
        auth_time: DateTime<Utc>,
        sso_session_id: &str,
    ) -> AppResult<bool> {
        let Some(mut flow) = self.flows.get_mut(session_id) else {
            return Ok(false);
        };
        flow.authenticated = true;
        flow.user_id = Some(user_id);
        flow.auth_time = Some(auth_time);
        flow.sso_session_id = Some(sso_session_id.to_owned());
        drop(flow);
        Ok(true)
    }

    async fn delete_flow(&self, session_id: &str) -> AppResult<bool> {
        Ok(self.flows.remove(session_id).is_some())
    }

    async fn delete_expired_flows(&self, now: DateTime<Utc>) -> AppResult<u64> {
        Ok(remove_where(&self.flows, |f| f.is_expired(now)))
    }
}

#[async_trait]
impl SsoSessionStore for MemoryStore {
    async fn create_session(&self, session: &SsoSession) -> AppResult<()> {
        self.sso_sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn find_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SsoSession>> {
        Ok(self
            .sso_sessions
            .get(session_id)
            .filter(|session| !session.is_expired(now))
            .map(|session| session.value().clone()))
    }

    async fn touch_session(&self, session_id: &str, now: DateTime<Utc>) -> AppResult<()> {
        if let Some(mut session) = self.sso_sessions.get_mut(session_id) {
            if now > session.last_activity {
                session.last_activity = now;
            }
        }
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> AppResult<bool> {
        Ok(self.sso_sessions.remove(session_id).is_some())
    }

    async fn find_sessions_by_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<SsoSession>> {
        let mut sessions: Vec<SsoSession> = self
            .sso_sessions
            .iter()
            .filter(|s| s.user_id == user_id && !s.is_expired(now))
            .map(|s| s.value().clone())
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> AppResult<u64> {
        Ok(remove_where(&self.sso_sessions, |s| s.is_expired(now)))
    }
}

#[async_trait]
impl ConsentStore for MemoryStore {
    async fn widen_consent(&self, consent: &UserConsent) -> AppResult<UserConsent> {
        // The entry lock serializes this against revoke_consent for the same pair
        let stored = match self
            .consents
            .entry((consent.user_id, consent.client_id.clone()))
        {
            Entry::Occupied(mut occupied) => {
                let widened = occupied.get().widened_by(consent);
                occupied.insert(widened.clone());
                widened
            }
            Entry::Vacant(vacant) => vacant.insert(consent.clone()).value().clone(),
        };
        Ok(stored)
    }

    async fn find_consent(&self, user_id: Uuid, client_id: &str) -> AppResult<Option<UserConsent>> {
        Ok(self
            .consents
            .get(&(user_id, client_id.to_owned()))
            .map(|c| c.value().clone()))
    }

    async fn revoke_consent(&self, user_id: Uuid, client_id: &str) -> AppResult<bool> {
        Ok(self
            .consents
            .remove(&(user_id, client_id.to_owned()))
            .is_some())
    }

    async fn list_consents(&self, user_id: Uuid) -> AppResult<Vec<UserConsent>> {
        let mut consents: Vec<UserConsent> = self
            .consents
            .iter()
            .filter(|c| c.key().0 == user_id)
            .map(|c| c.value().clone())
            .collect();
        consents.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        Ok(consents)
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn store_refresh_token(&self, record: &RefreshTokenRecord) -> AppResult<()> {
        self.refresh_tokens
            .insert(record.jti.clone(), record.clone());
        Ok(())
    }

    async fn consume_refresh_token(&self, jti: &str) -> AppResult<Option<RefreshTokenRecord>> {
        Ok(self.refresh_tokens.remove(jti).map(|(_, record)| record))
    }

    async fn delete_refresh_tokens_for(&self, user_id: Uuid, client_id: &str) -> AppResult<u64> {
        Ok(remove_where(&self.refresh_tokens, |r| {
            r.user_id == user_id && r.client_id == client_id
        }))
    }

    async fn delete_expired_refresh_tokens(&self, now: DateTime<Utc>) -> AppResult<u64> {
        Ok(remove_where(&self.refresh_tokens, |r| r.is_expired(now)))
    }
}
