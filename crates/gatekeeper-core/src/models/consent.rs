// ABOUTME: Durable per-(user, client) scope grant
// ABOUTME: Subset check decides whether a new request is already covered
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's consent for one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConsent {
    /// Consenting user
    pub user_id: Uuid,
    /// Client the scopes were granted to
    pub client_id: String,
    /// Granted scope names
    pub scopes: Vec<String>,
    /// When the grant was last written
    pub granted_at: DateTime<Utc>,
    /// Optional expiry of the grant
    pub expires_at: Option<DateTime<Utc>>,
}

impl UserConsent {
    /// Consent with no expiry never lapses
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// True when every requested scope is in the granted set
    #[must_use]
    pub fn covers<S: AsRef<str>>(&self, requested: &[S]) -> bool {
        requested
            .iter()
            .all(|scope| self.scopes.iter().any(|granted| granted == scope.as_ref()))
    }

    /// Unexpired and covering `requested`
    #[must_use]
    pub fn is_sufficient<S: AsRef<str>>(&self, requested: &[S], now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && self.covers(requested)
    }

    /// This grant widened by `grant`, which supplies timestamps and expiry.
    /// A grant that has lapsed by `grant.granted_at` contributes no scopes.
    #[must_use]
    pub fn widened_by(&self, grant: &Self) -> Self {
        let mut scopes = if self.is_expired(grant.granted_at) {
            Vec::new()
        } else {
            self.scopes.clone()
        };
        for scope in &grant.scopes {
            if !scopes.contains(scope) {
                scopes.push(scope.clone());
            }
        }
        Self {
            scopes,
            ..grant.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn consent(scopes: &[&str], expires_at: Option<DateTime<Utc>>) -> UserConsent {
        UserConsent {
            user_id: Uuid::new_v4(),
            client_id: "client".to_owned(),
            scopes: scopes.iter().map(|s| (*s).to_owned()).collect(),
            granted_at: Utc::now(),
            expires_at,
        }
    }

    #[test]
    fn test_subset_is_sufficient() {
        let now = Utc::now();
        let grant = consent(&["openid", "email"], None);
        assert!(grant.is_sufficient(&["openid"], now));
        assert!(grant.is_sufficient(&["email", "openid"], now));
        assert!(!grant.is_sufficient(&["phone"], now));
        assert!(!grant.is_sufficient(&["openid", "phone"], now));
    }

    #[test]
    fn test_expired_consent_is_insufficient() {
        let now = Utc::now();
        let grant = consent(&["openid"], Some(now - Duration::seconds(1)));
        assert!(!grant.is_sufficient(&["openid"], now));
    }

    #[test]
    fn test_widening_keeps_live_scopes_only() {
        let now = Utc::now();
        let live = consent(&["openid", "email"], None);
        let grant = consent(&["profile", "openid"], None);
        assert_eq!(live.widened_by(&grant).scopes, vec!["openid", "email", "profile"]);

        let lapsed = consent(&["openid", "email"], Some(now - Duration::seconds(1)));
        let widened = lapsed.widened_by(&consent(&["profile"], None));
        assert_eq!(widened.scopes, vec!["profile"]);
        assert_eq!(widened.expires_at, None);
    }
}
