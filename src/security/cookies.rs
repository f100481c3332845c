// ABOUTME: Secure cookie utilities for the SSO session cookie
// ABOUTME: Builds Set-Cookie values with HttpOnly, SameSite, Secure, Max-Age and parses Cookie headers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use axum::http::{header, HeaderMap, HeaderValue};
use gatekeeper_core::constants::cookies::SSO_SESSION;
use tracing::warn;

/// `SameSite` attribute values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    /// Only same-site requests
    Strict,
    /// Same-site requests and top-level navigations
    Lax,
}

impl SameSite {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
        }
    }
}

/// Cookie attributes
#[derive(Debug, Clone)]
pub struct SecureCookieConfig {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Lifetime in seconds; 0 expires the cookie immediately
    pub max_age_secs: i64,
    /// Hide from scripts
    pub http_only: bool,
    /// Send over HTTPS only
    pub secure: bool,
    /// Cross-site policy
    pub same_site: SameSite,
}

impl SecureCookieConfig {
    /// HttpOnly, Secure, `SameSite=Lax`, `Path=/`
    #[must_use]
    pub const fn new(name: String, value: String, max_age_secs: i64) -> Self {
        Self {
            name,
            value,
            max_age_secs,
            http_only: true,
            secure: true,
            same_site: SameSite::Lax,
        }
    }

    /// Toggle the `Secure` attribute
    #[must_use]
    pub const fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Render as a `Set-Cookie` value
    #[must_use]
    pub fn build(&self) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; SameSite={}",
            self.name,
            self.value,
            self.max_age_secs,
            self.same_site.as_str()
        );
        if self.http_only {
            cookie.push_str("; HttpOnly");
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    fn append_to(&self, headers: &mut HeaderMap) {
        match HeaderValue::from_str(&self.build()) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, cookie = %self.name, "Cookie value is not a valid header"),
        }
    }
}

/// Set the SSO session cookie
pub fn set_sso_cookie(headers: &mut HeaderMap, session_id: &str, max_age_secs: i64, secure: bool) {
    SecureCookieConfig::new(SSO_SESSION.to_owned(), session_id.to_owned(), max_age_secs)
        .with_secure(secure)
        .append_to(headers);
}

/// Expire the SSO session cookie
pub fn clear_sso_cookie(headers: &mut HeaderMap, secure: bool) {
    SecureCookieConfig::new(SSO_SESSION.to_owned(), String::new(), 0)
        .with_secure(secure)
        .append_to(headers);
}

/// Value of the named cookie from the `Cookie` request headers
#[must_use]
pub fn get_cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_owned())
        .filter(|value| !value.is_empty())
}

/// SSO session id carried by the request, if any
#[must_use]
pub fn sso_session_id(headers: &HeaderMap) -> Option<String> {
    get_cookie_value(headers, SSO_SESSION)
}
