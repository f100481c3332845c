// ABOUTME: Request header parsing for client authentication, bearer tokens, and fingerprints
// ABOUTME: HTTP Basic (RFC 6749 section 2.3.1), Bearer (RFC 6750), X-Forwarded-For and User-Agent
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose, Engine as _};
use gatekeeper_core::models::Fingerprint;

use crate::oauth2_server::BasicCredentials;

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

/// Decode `Authorization: Basic` client credentials
///
/// Both halves are form-urlencoded before base64 encoding per RFC 6749.
/// Returns `None` when the header is absent, uses another scheme, or is malformed.
#[must_use]
pub fn basic_credentials(headers: &HeaderMap) -> Option<BasicCredentials> {
    let encoded = authorization(headers)?.strip_prefix("Basic ")?;
    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some(BasicCredentials {
        client_id: urlencoding::decode(id).ok()?.into_owned(),
        client_secret: urlencoding::decode(secret).ok()?.into_owned(),
    })
}

/// Whether the request carried an `Authorization: Basic` header at all
#[must_use]
pub fn has_basic_scheme(headers: &HeaderMap) -> bool {
    authorization(headers).is_some_and(|value| value.starts_with("Basic "))
}

/// Token from `Authorization: Bearer`
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    authorization(headers)?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Client IP and user agent as seen by the server
///
/// The first `X-Forwarded-For` hop wins, then `X-Real-IP`.
#[must_use]
pub fn request_fingerprint(headers: &HeaderMap) -> Fingerprint {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };
    let ip_address = header_str("x-forwarded-for")
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .or_else(|| header_str("x-real-ip"))
        .map(str::to_owned);
    let user_agent = header_str(header::USER_AGENT.as_str()).map(str::to_owned);
    Fingerprint::new(ip_address, user_agent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_credentials_are_url_decoded() {
        let mut headers = HeaderMap::new();
        let encoded = general_purpose::STANDARD.encode("my%20client:s%3Acret");
        headers.insert(
            header::AUTHORIZATION,
            format!("Basic {encoded}").parse().unwrap(),
        );
        let credentials = basic_credentials(&headers).unwrap();
        assert_eq!(credentials.client_id, "my client");
        assert_eq!(credentials.client_secret, "s:cret");
        assert!(has_basic_scheme(&headers));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_malformed_basic_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic !!!".parse().unwrap());
        assert!(basic_credentials(&headers).is_none());
        assert!(has_basic_scheme(&headers));
    }

    #[test]
    fn test_fingerprint_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "10.0.0.9".parse().unwrap());
        headers.insert(header::USER_AGENT, "Firefox".parse().unwrap());
        let fingerprint = request_fingerprint(&headers);
        assert_eq!(fingerprint.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(fingerprint.user_agent.as_deref(), Some("Firefox"));

        assert_eq!(request_fingerprint(&HeaderMap::new()), Fingerprint::default());
    }
}
