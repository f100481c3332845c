// ABOUTME: Protocol constants grouped by domain for the authorization server
// ABOUTME: TTL defaults, grant type identifiers, token types, and cookie names
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Constants module
//!
//! Pure data constants. Runtime overrides live in the main crate's configuration.

/// Default lifetimes
pub mod ttl {
    /// Access and ID token lifetime in seconds
    pub const ACCESS_TOKEN_SECS: i64 = 3600;
    /// Refresh token lifetime in days
    pub const REFRESH_TOKEN_DAYS: i64 = 30;
    /// Authorization code lifetime in seconds
    pub const AUTH_CODE_SECS: i64 = 600;
    /// OAuth flow session lifetime in seconds
    pub const FLOW_SESSION_SECS: i64 = 600;
    /// SSO session lifetime in days
    pub const SSO_SESSION_DAYS: i64 = 7;
    /// Consent lifetime in days
    pub const CONSENT_DAYS: i64 = 180;
    /// Expiry sweeper interval in seconds
    pub const SWEEP_INTERVAL_SECS: u64 = 60;
    /// Tolerated clock skew for `iat` checks, in seconds
    pub const IAT_SKEW_SECS: i64 = 60;
}

/// OAuth 2.0 grant type identifiers
pub mod grant_types {
    /// RFC 6749 authorization code grant
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
    /// RFC 6749 refresh token grant
    pub const REFRESH_TOKEN: &str = "refresh_token";
    /// RFC 6749 client credentials grant
    pub const CLIENT_CREDENTIALS: &str = "client_credentials";
    /// RFC 8693 token exchange grant
    pub const TOKEN_EXCHANGE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";

    /// All grant types the server can perform
    pub const SUPPORTED: [&str; 4] = [
        AUTHORIZATION_CODE,
        REFRESH_TOKEN,
        CLIENT_CREDENTIALS,
        TOKEN_EXCHANGE,
    ];
}

/// RFC 8693 token type identifiers
pub mod token_types {
    /// Signed access token
    pub const ACCESS_TOKEN: &str = "urn:ietf:params:oauth:token-type:access_token";
    /// Generic JWT
    pub const JWT: &str = "urn:ietf:params:oauth:token-type:jwt";
    /// Nested signed-then-encrypted JWT
    pub const ENCRYPTED_JWT: &str = "urn:gatekeeper:params:oauth:token-type:encrypted-jwt";
}

/// Values of the `token_use` claim
pub mod token_use {
    /// Access token
    pub const ACCESS: &str = "access";
    /// Refresh token
    pub const REFRESH: &str = "refresh";
    /// OIDC ID token
    pub const ID: &str = "id";
}

/// Scope names with protocol meaning
pub mod scopes {
    /// OIDC marker scope
    pub const OPENID: &str = "openid";
    /// Profile claims
    pub const PROFILE: &str = "profile";
    /// Email claims
    pub const EMAIL: &str = "email";
    /// Phone claims
    pub const PHONE: &str = "phone";
    /// Postal address claim
    pub const ADDRESS: &str = "address";
    /// Requests a refresh token
    pub const OFFLINE_ACCESS: &str = "offline_access";
}

/// Cookie names
pub mod cookies {
    /// HTTP-only SSO session cookie
    pub const SSO_SESSION: &str = "gk_sso";
}

/// Route paths
pub mod endpoints {
    /// Authorization endpoint
    pub const AUTHORIZE: &str = "/oauth/authorize";
    /// Token endpoint
    pub const TOKEN: &str = "/oauth/token";
    /// UserInfo endpoint
    pub const USERINFO: &str = "/oauth/userinfo";
    /// Revocation endpoint
    pub const REVOKE: &str = "/oauth/revoke";
    /// Dynamic client registration endpoint
    pub const REGISTER: &str = "/oauth/register";
    /// Password login form target
    pub const LOGIN: &str = "/auth/login";
    /// Consent form target
    pub const CONSENT: &str = "/auth/consent";
    /// User registration
    pub const USER_REGISTER: &str = "/auth/register";
    /// End session endpoint
    pub const LOGOUT: &str = "/auth/logout";
    /// Active SSO sessions of the signed-in user
    pub const ACCOUNT_SESSIONS: &str = "/account/sessions";
    /// Client authorizations of the signed-in user
    pub const ACCOUNT_AUTHORIZATIONS: &str = "/account/authorizations";
    /// JWKS document
    pub const JWKS: &str = "/.well-known/jwks.json";
    /// Discovery document
    pub const DISCOVERY: &str = "/.well-known/openid-configuration";
    /// Health check endpoint
    pub const HEALTH_CHECK: &str = "/health";
}

/// Network ports
pub mod ports {
    /// Default HTTP port
    pub const DEFAULT_HTTP_PORT: u16 = 8081;
}

/// Limits
pub mod limits {
    /// Minimum PKCE verifier length (RFC 7636)
    pub const PKCE_VERIFIER_MIN: usize = 43;
    /// Maximum PKCE verifier length (RFC 7636)
    pub const PKCE_VERIFIER_MAX: usize = 128;
    /// Random bytes in an authorization code
    pub const CODE_RANDOM_BYTES: usize = 32;
    /// Random bytes in a session identifier
    pub const SESSION_ID_BYTES: usize = 32;
    /// Minimum password length at registration
    pub const MIN_PASSWORD_LENGTH: usize = 8;
    /// Default RSA modulus size for generated keys
    pub const DEFAULT_RSA_KEY_BITS: usize = 2048;
}
