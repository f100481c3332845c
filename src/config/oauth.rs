// ABOUTME: Authorization server protocol configuration and policy switches
// ABOUTME: Token lifetimes, fingerprint and refresh policies, external UI locations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::str::FromStr;

use chrono::Duration;
use gatekeeper_core::constants::ttl;
use serde::{Deserialize, Serialize};

/// What to do when an SSO session is presented with a different fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintPolicy {
    /// Record a security event and keep using the session
    #[default]
    LogOnly,
    /// Treat the session as absent so the user authenticates again
    ForceReauth,
}

impl FromStr for FingerprintPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "log_only" | "log-only" | "log" => Ok(Self::LogOnly),
            "force_reauth" | "force-reauth" | "reauth" => Ok(Self::ForceReauth),
            other => Err(format!("unknown fingerprint policy: {other}")),
        }
    }
}

/// When the token endpoint issues refresh tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTokenPolicy {
    /// Every authorization code grant receives a refresh token
    #[default]
    Always,
    /// Only grants carrying the `offline_access` scope receive one
    OfflineAccess,
}

impl FromStr for RefreshTokenPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "offline_access" | "offline-access" => Ok(Self::OfflineAccess),
            other => Err(format!("unknown refresh token policy: {other}")),
        }
    }
}

/// OAuth 2.0 authorization server configuration
#[derive(Debug, Clone)]
pub struct OAuth2ServerConfig {
    /// `iss` claim and discovery base URL, without trailing slash
    pub issuer_url: String,
    /// Access and ID token lifetime
    pub access_token_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_token_ttl: Duration,
    /// Authorization code lifetime
    pub auth_code_ttl: Duration,
    /// OAuth flow session lifetime
    pub flow_session_ttl: Duration,
    /// SSO session lifetime
    pub sso_session_ttl: Duration,
    /// Consent lifetime, `None` means consents never expire
    pub consent_ttl: Option<Duration>,
    /// SSO fingerprint mismatch handling
    pub fingerprint_policy: FingerprintPolicy,
    /// Refresh token issuance policy
    pub refresh_token_policy: RefreshTokenPolicy,
    /// External login page, receives `flow_id`
    pub login_page_url: String,
    /// External consent page, receives `flow_id`
    pub consent_page_url: String,
    /// Additional client-level scopes registered at startup
    pub extra_scopes: Vec<String>,
}

impl OAuth2ServerConfig {
    /// Configuration with default lifetimes and policies for `issuer_url`
    #[must_use]
    pub fn for_issuer(issuer_url: &str) -> Self {
        Self {
            issuer_url: issuer_url.trim_end_matches('/').to_owned(),
            access_token_ttl: Duration::seconds(ttl::ACCESS_TOKEN_SECS),
            refresh_token_ttl: Duration::days(ttl::REFRESH_TOKEN_DAYS),
            auth_code_ttl: Duration::seconds(ttl::AUTH_CODE_SECS),
            flow_session_ttl: Duration::seconds(ttl::FLOW_SESSION_SECS),
            sso_session_ttl: Duration::days(ttl::SSO_SESSION_DAYS),
            consent_ttl: Some(Duration::days(ttl::CONSENT_DAYS)),
            fingerprint_policy: FingerprintPolicy::default(),
            refresh_token_policy: RefreshTokenPolicy::default(),
            login_page_url: "/login".to_owned(),
            consent_page_url: "/consent".to_owned(),
            extra_scopes: Vec::new(),
        }
    }

    /// Absolute URL of an endpoint path on this issuer
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.issuer_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "force_reauth".parse::<FingerprintPolicy>(),
            Ok(FingerprintPolicy::ForceReauth)
        );
        assert_eq!(
            "LOG_ONLY".parse::<FingerprintPolicy>(),
            Ok(FingerprintPolicy::LogOnly)
        );
        assert!("strict".parse::<FingerprintPolicy>().is_err());
        assert_eq!(
            "offline_access".parse::<RefreshTokenPolicy>(),
            Ok(RefreshTokenPolicy::OfflineAccess)
        );
    }

    #[test]
    fn test_issuer_trailing_slash_is_trimmed() {
        let config = OAuth2ServerConfig::for_issuer("https://id.example.com/");
        assert_eq!(config.issuer_url, "https://id.example.com");
        assert_eq!(
            config.endpoint("/oauth/token"),
            "https://id.example.com/oauth/token"
        );
    }
}
