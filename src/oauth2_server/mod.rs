// ABOUTME: OAuth 2.0 / OpenID Connect authorization server
// ABOUTME: Client registration, user accounts, PKCE, the Authorization Engine and its token grants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

/// End-user registration and password verification
pub mod accounts;
/// RFC 7591 dynamic client registration implementation
pub mod client_registration;
/// Authorize, login, consent, logout, and account self-service
pub mod endpoints;
/// Token endpoint grants, UserInfo, and revocation
pub mod grants;
/// OAuth 2.0 data models and types
pub mod models;
/// RFC 7636 proof key for code exchange
pub mod pkce;

pub use accounts::AccountManager;
pub use client_registration::ClientRegistrationManager;
pub use endpoints::{
    AuthorizationEngine, AuthorizeOutcome, ConsentPrompt, FlowError, LoginResult,
    ScopeDescription,
};
pub use grants::BasicCredentials;
pub use models::{
    AuthorizeRequest, ClientRegistrationRequest, ClientRegistrationResponse, OAuth2Error, Prompt,
    RevocationRequest, TokenRequest, TokenResponse, UserRegistrationRequest,
    UserRegistrationResponse,
};
