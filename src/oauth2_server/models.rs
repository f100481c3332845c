// ABOUTME: OAuth 2.0 / OIDC protocol request, response, and error structures
// ABOUTME: Implements RFC 6749, RFC 7591, RFC 7009, and RFC 8693 wire shapes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use gatekeeper_core::errors::AppError;
use serde::{Deserialize, Serialize};

use crate::tokens::TokenError;

const RFC6749_AUTHZ_ERRORS: &str = "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1";
const RFC6749_TOKEN_ERRORS: &str = "https://datatracker.ietf.org/doc/html/rfc6749#section-5.2";
const RFC6750_ERRORS: &str = "https://datatracker.ietf.org/doc/html/rfc6750#section-3.1";

/// OAuth 2.0 Client Registration Request (RFC 7591)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientRegistrationRequest {
    /// Redirect URIs for authorization code flow
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    /// Where the client may send the browser after logout
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,
    /// Optional client name for display
    pub client_name: Option<String>,
    /// Optional client URI for information
    pub client_uri: Option<String>,
    /// Grant types the client can use
    pub grant_types: Option<Vec<String>>,
    /// Response types the client can use
    pub response_types: Option<Vec<String>>,
    /// Scopes the client can request
    pub scope: Option<String>,
}

/// OAuth 2.0 Client Registration Response (RFC 7591)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistrationResponse {
    /// Unique client identifier
    pub client_id: String,
    /// Client secret, shown once
    pub client_secret: String,
    /// Registration time
    pub client_id_issued_at: i64,
    /// When the client secret expires (0 = never)
    pub client_secret_expires_at: i64,
    /// Redirect URIs registered for this client
    pub redirect_uris: Vec<String>,
    /// Post-logout redirect URIs registered for this client
    pub post_logout_redirect_uris: Vec<String>,
    /// Grant types allowed for this client
    pub grant_types: Vec<String>,
    /// Response types allowed for this client
    pub response_types: Vec<String>,
    /// Client name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Client URI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_uri: Option<String>,
    /// Scopes this client can request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// OIDC `prompt` parameter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Prompt {
    /// Never show UI; fail instead
    pub none: bool,
    /// Force re-authentication
    pub login: bool,
    /// Force the consent page
    pub consent: bool,
}

impl Prompt {
    /// Parse the space-delimited `prompt` value
    ///
    /// # Errors
    /// Returns `invalid_request` for unknown values or `none` combined with others
    pub fn parse(raw: Option<&str>) -> Result<Self, OAuth2Error> {
        let mut prompt = Self::default();
        let mut count = 0;
        for value in raw.unwrap_or_default().split_whitespace() {
            count += 1;
            match value {
                "none" => prompt.none = true,
                "login" => prompt.login = true,
                "consent" => prompt.consent = true,
                other => {
                    return Err(OAuth2Error::invalid_request(&format!(
                        "Unsupported prompt value: {other}"
                    )))
                }
            }
        }
        if prompt.none && count > 1 {
            return Err(OAuth2Error::invalid_request(
                "prompt=none cannot be combined with other values",
            ));
        }
        Ok(prompt)
    }
}

/// OAuth 2.0 Authorization Request
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthorizeRequest {
    /// Response type (only `code`)
    #[serde(default)]
    pub response_type: String,
    /// Client identifier
    #[serde(default)]
    pub client_id: String,
    /// Redirect URI for response
    #[serde(default)]
    pub redirect_uri: String,
    /// Requested scopes
    pub scope: Option<String>,
    /// State parameter for CSRF protection
    pub state: Option<String>,
    /// OIDC nonce echoed in the ID token
    pub nonce: Option<String>,
    /// PKCE code challenge (RFC 7636)
    pub code_challenge: Option<String>,
    /// PKCE code challenge method (only `S256`)
    pub code_challenge_method: Option<String>,
    /// OIDC prompt
    pub prompt: Option<String>,
}

/// OAuth 2.0 Token Request
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TokenRequest {
    /// Grant type
    #[serde(default)]
    pub grant_type: String,
    /// Authorization code (`authorization_code`)
    pub code: Option<String>,
    /// Redirect URI (`authorization_code`, must match the authorize request)
    pub redirect_uri: Option<String>,
    /// Client ID when not using HTTP Basic
    pub client_id: Option<String>,
    /// Client secret when not using HTTP Basic
    pub client_secret: Option<String>,
    /// Requested scopes
    pub scope: Option<String>,
    /// Refresh token (`refresh_token`)
    pub refresh_token: Option<String>,
    /// PKCE code verifier (`authorization_code`)
    pub code_verifier: Option<String>,
    /// Token being exchanged (`token-exchange`)
    pub subject_token: Option<String>,
    /// Type of `subject_token`
    pub subject_token_type: Option<String>,
    /// Desired type of the issued token
    pub requested_token_type: Option<String>,
    /// Target client for the exchanged token
    pub audience: Option<String>,
}

/// OAuth 2.0 Token Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token (JWT, or JWE for the encrypted exchange variant)
    pub access_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: i64,
    /// Scopes granted
    pub scope: String,
    /// Refresh token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// OIDC ID token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// RFC 8693 issued token type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_token_type: Option<String>,
}

/// Token revocation request (RFC 7009)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RevocationRequest {
    /// Token to revoke
    #[serde(default)]
    pub token: String,
    /// `access_token` or `refresh_token`
    pub token_type_hint: Option<String>,
    /// Client ID when not using HTTP Basic
    pub client_id: Option<String>,
    /// Client secret when not using HTTP Basic
    pub client_secret: Option<String>,
}

/// User registration request
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserRegistrationRequest {
    /// Login email
    pub email: String,
    /// Plaintext password
    pub password: String,
    /// Display name
    pub display_name: Option<String>,
    /// Given name
    pub given_name: Option<String>,
    /// Family name
    pub family_name: Option<String>,
    /// Phone number
    pub phone_number: Option<String>,
}

/// User registration response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRegistrationResponse {
    /// New user's subject identifier
    pub user_id: String,
    /// Registered email
    pub email: String,
}

/// OAuth 2.0 Error Response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2Error {
    /// Error code
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// URI for error information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl OAuth2Error {
    fn build(error: &str, description: &str, uri: Option<&str>) -> Self {
        Self {
            error: error.to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: uri.map(str::to_owned),
        }
    }

    /// Create an `invalid_request` error
    #[must_use]
    pub fn invalid_request(description: &str) -> Self {
        Self::build("invalid_request", description, Some(RFC6749_AUTHZ_ERRORS))
    }

    /// Create an `invalid_client` error
    #[must_use]
    pub fn invalid_client() -> Self {
        Self::build(
            "invalid_client",
            "Client authentication failed",
            Some(RFC6749_TOKEN_ERRORS),
        )
    }

    /// Create an `invalid_grant` error
    #[must_use]
    pub fn invalid_grant(description: &str) -> Self {
        Self::build("invalid_grant", description, Some(RFC6749_TOKEN_ERRORS))
    }

    /// Create an `unauthorized_client` error
    #[must_use]
    pub fn unauthorized_client(description: &str) -> Self {
        Self::build("unauthorized_client", description, Some(RFC6749_AUTHZ_ERRORS))
    }

    /// Create an `unsupported_grant_type` error
    #[must_use]
    pub fn unsupported_grant_type() -> Self {
        Self::build(
            "unsupported_grant_type",
            "Grant type not supported",
            Some(RFC6749_TOKEN_ERRORS),
        )
    }

    /// Create an `unsupported_response_type` error
    #[must_use]
    pub fn unsupported_response_type() -> Self {
        Self::build(
            "unsupported_response_type",
            "Only the 'code' response_type is supported",
            Some(RFC6749_AUTHZ_ERRORS),
        )
    }

    /// Create an `invalid_scope` error
    #[must_use]
    pub fn invalid_scope(description: &str) -> Self {
        Self::build("invalid_scope", description, Some(RFC6749_AUTHZ_ERRORS))
    }

    /// Create an `invalid_redirect_uri` registration error (RFC 7591)
    #[must_use]
    pub fn invalid_redirect_uri(description: &str) -> Self {
        Self::build("invalid_redirect_uri", description, None)
    }

    /// Create an `invalid_client_metadata` registration error (RFC 7591)
    #[must_use]
    pub fn invalid_client_metadata(description: &str) -> Self {
        Self::build("invalid_client_metadata", description, None)
    }

    /// Create an `access_denied` error
    #[must_use]
    pub fn access_denied(description: &str) -> Self {
        Self::build("access_denied", description, Some(RFC6749_AUTHZ_ERRORS))
    }

    /// Create a `login_required` error (OIDC `prompt=none`)
    #[must_use]
    pub fn login_required() -> Self {
        Self::build("login_required", "End-user authentication is required", None)
    }

    /// Create a `consent_required` error (OIDC `prompt=none`)
    #[must_use]
    pub fn consent_required() -> Self {
        Self::build("consent_required", "End-user consent is required", None)
    }

    /// Create an `invalid_token` error
    #[must_use]
    pub fn invalid_token(description: &str) -> Self {
        Self::build("invalid_token", description, Some(RFC6750_ERRORS))
    }

    /// Create a `token_expired` error
    #[must_use]
    pub fn token_expired() -> Self {
        Self::build("token_expired", "The token has expired", Some(RFC6750_ERRORS))
    }

    /// Create an `insufficient_scope` error (RFC 6750)
    #[must_use]
    pub fn insufficient_scope(description: &str) -> Self {
        Self::build("insufficient_scope", description, Some(RFC6750_ERRORS))
    }

    /// Create an `invalid_target` error (RFC 8693)
    #[must_use]
    pub fn invalid_target(description: &str) -> Self {
        Self::build("invalid_target", description, None)
    }

    /// Create a `server_error`; the description never carries internal detail
    #[must_use]
    pub fn server_error() -> Self {
        Self::build(
            "server_error",
            "The server encountered an unexpected condition",
            None,
        )
    }

    /// HTTP status for this error code
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.error.as_str() {
            "invalid_client" | "invalid_token" | "token_expired" => StatusCode::UNAUTHORIZED,
            "access_denied" | "insufficient_scope" => StatusCode::FORBIDDEN,
            "server_error" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Human-readable description or the code itself
    #[must_use]
    pub fn description(&self) -> &str {
        self.error_description.as_deref().unwrap_or(&self.error)
    }
}

impl std::fmt::Display for OAuth2Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.description())
    }
}

impl From<TokenError> for OAuth2Error {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired { .. } => Self::token_expired(),
            other => Self::invalid_token(&other.to_string()),
        }
    }
}

impl From<AppError> for OAuth2Error {
    fn from(err: AppError) -> Self {
        if err.code.is_infrastructure() {
            tracing::error!(error = %err, "Infrastructure failure during OAuth flow");
            Self::server_error()
        } else {
            Self::invalid_request(&err.message)
        }
    }
}

impl IntoResponse for OAuth2Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let challenge = match self.error.as_str() {
            "invalid_client" => Some("Basic realm=\"gatekeeper\"".to_owned()),
            "invalid_token" | "token_expired" | "insufficient_scope" => {
                Some(format!("Bearer error=\"{}\"", self.error))
            }
            _ => None,
        };
        let mut response = (status, Json(self)).into_response();
        if let Some(value) = challenge.and_then(|v| HeaderValue::from_str(&v).ok()) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, value);
        }
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }
}
