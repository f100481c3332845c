// ABOUTME: Authorization Engine driving authorize, login, consent, logout, and account self-service
// ABOUTME: Composes the stores, scope registry, and token codec into the OIDC authorization state machine
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use gatekeeper_core::constants::{endpoints, grant_types, limits};
use gatekeeper_core::errors::{AppError, AppResult};
use gatekeeper_core::models::{
    AuthorizationCode, Fingerprint, FlowSession, OAuth2Client, SsoSession, User, UserConsent,
};
use ring::rand::{SecureRandom, SystemRandom};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::accounts::AccountManager;
use super::client_registration::ClientRegistrationManager;
use super::models::{AuthorizeRequest, OAuth2Error, Prompt};
use super::pkce;
use crate::config::{FingerprintPolicy, OAuth2ServerConfig};
use crate::jwks::{JsonWebKeySet, KeyProvider};
use crate::logging::{AppLogger, SecuritySeverity};
use crate::scopes::{is_subset, join_scopes, parse_scope, ScopeRegistry};
use crate::stores::Stores;
use crate::tokens::TokenCodec;
use crate::utils::clock::Clock;

/// A scope as shown on the consent page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeDescription {
    /// Scope name
    pub name: String,
    /// Human-readable description
    pub description: String,
}

/// What the consent UI needs to ask the user
#[derive(Debug, Clone, Serialize)]
pub struct ConsentPrompt {
    /// Flow session to resume with
    pub flow_id: String,
    /// Requesting client
    pub client_id: String,
    /// Display name of the requesting client
    pub client_name: Option<String>,
    /// Requested scopes
    pub scopes: Vec<ScopeDescription>,
}

/// Result of an authorization step that did not fail
#[derive(Debug, Clone)]
pub enum AuthorizeOutcome {
    /// Code minted; send the browser to the client
    CodeIssued {
        /// Client redirect URI with `code` and `state`
        redirect: String,
    },
    /// Login page must be shown
    Login {
        /// Flow session to resume with
        flow_id: String,
    },
    /// Consent page must be shown
    Consent(ConsentPrompt),
}

/// Failures of the browser-facing steps
#[derive(Debug, Error)]
pub enum FlowError {
    /// Email or password did not verify; the flow stays open
    #[error("Invalid email or password")]
    InvalidCredentials {
        /// Flow session to retry with
        flow_id: String,
    },
    /// The redirect target cannot be trusted; show an error page
    #[error("{0}")]
    Render(OAuth2Error),
    /// Error delivered to the client's verified redirect URI
    #[error("Authorization error redirected to client")]
    Redirect {
        /// Client redirect URI with `error` and `state`
        redirect: String,
    },
}

impl From<OAuth2Error> for FlowError {
    fn from(err: OAuth2Error) -> Self {
        Self::Render(err)
    }
}

impl From<AppError> for FlowError {
    fn from(err: AppError) -> Self {
        Self::Render(OAuth2Error::from(err))
    }
}

/// Successful password login
#[derive(Debug, Clone)]
pub struct LoginResult {
    /// Where the flow goes next
    pub outcome: AuthorizeOutcome,
    /// SSO session to place in the browser cookie
    pub sso_session: SsoSession,
}

/// Everything bound into a new authorization code
struct CodeBinding<'a> {
    client_id: &'a str,
    user_id: Uuid,
    redirect_uri: &'a str,
    scope: &'a str,
    state: Option<&'a str>,
    nonce: Option<&'a str>,
    code_challenge: Option<&'a str>,
    code_challenge_method: Option<&'a str>,
    auth_time: DateTime<Utc>,
    sso_session: &'a SsoSession,
}

impl<'a> CodeBinding<'a> {
    fn from_flow(flow: &'a FlowSession, user_id: Uuid, sso_session: &'a SsoSession) -> Self {
        Self {
            client_id: &flow.client_id,
            user_id,
            redirect_uri: &flow.redirect_uri,
            scope: &flow.scope,
            state: flow.state.as_deref(),
            nonce: flow.nonce.as_deref(),
            code_challenge: flow.code_challenge.as_deref(),
            code_challenge_method: flow.code_challenge_method.as_deref(),
            auth_time: flow.auth_time.unwrap_or(sso_session.created_at),
            sso_session,
        }
    }
}

/// `OAuth` 2.0 / OIDC Authorization Engine
#[derive(Clone)]
pub struct AuthorizationEngine {
    pub(super) config: Arc<OAuth2ServerConfig>,
    pub(super) stores: Stores,
    pub(super) scopes: Arc<ScopeRegistry>,
    pub(super) codec: Arc<TokenCodec>,
    pub(super) keys: Arc<dyn KeyProvider>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) clients: ClientRegistrationManager,
    pub(super) accounts: AccountManager,
}

impl AuthorizationEngine {
    /// Assemble the engine over injected stores, keys, and clock
    ///
    /// # Errors
    /// Returns error if the account manager cannot be initialized
    pub fn new(
        config: Arc<OAuth2ServerConfig>,
        stores: Stores,
        scopes: Arc<ScopeRegistry>,
        keys: Arc<dyn KeyProvider>,
        clock: Arc<dyn Clock>,
    ) -> AppResult<Self> {
        let codec = Arc::new(TokenCodec::new(
            keys.clone(),
            clock.clone(),
            config.issuer_url.clone(),
        ));
        let clients =
            ClientRegistrationManager::new(stores.clients.clone(), scopes.clone(), clock.clone());
        let accounts = AccountManager::new(stores.users.clone(), clock.clone())?;
        Ok(Self {
            config,
            stores,
            scopes,
            codec,
            keys,
            clock,
            clients,
            accounts,
        })
    }

    /// Protocol configuration
    #[must_use]
    pub fn config(&self) -> &OAuth2ServerConfig {
        &self.config
    }

    /// Backing stores
    #[must_use]
    pub const fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Token codec
    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Scope registry
    #[must_use]
    pub fn scopes(&self) -> &ScopeRegistry {
        &self.scopes
    }

    /// Client registration
    #[must_use]
    pub const fn clients(&self) -> &ClientRegistrationManager {
        &self.clients
    }

    /// User accounts
    #[must_use]
    pub const fn accounts(&self) -> &AccountManager {
        &self.accounts
    }

    /// Handle authorization request (GET /oauth/authorize)
    ///
    /// Client and redirect URI failures are rendered, never redirected. Every
    /// later failure goes back to the verified redirect URI.
    ///
    /// # Errors
    /// Returns [`FlowError::Render`] or [`FlowError::Redirect`]
    pub async fn authorize(
        &self,
        request: &AuthorizeRequest,
        sso_session_id: Option<&str>,
        fingerprint: &Fingerprint,
    ) -> Result<AuthorizeOutcome, FlowError> {
        let client = self.verified_client(request).await?;
        let state = request.state.as_deref();
        let fail = |err: OAuth2Error| redirect_error(&request.redirect_uri, &err, state);

        if request.response_type != "code" {
            return Err(fail(OAuth2Error::unsupported_response_type()));
        }
        if !client.allows_grant(grant_types::AUTHORIZATION_CODE) {
            return Err(fail(OAuth2Error::unauthorized_client(
                "Client is not registered for the authorization_code grant",
            )));
        }
        let prompt = Prompt::parse(request.prompt.as_deref()).map_err(fail)?;
        let scopes = self
            .validate_requested_scopes(&client, request.scope.as_deref())
            .map_err(fail)?;
        match (&request.code_challenge, &request.code_challenge_method) {
            (Some(challenge), method) => {
                pkce::validate_challenge(challenge, method.as_deref()).map_err(fail)?;
            }
            (None, Some(_)) => {
                return Err(fail(OAuth2Error::invalid_request(
                    "code_challenge_method without code_challenge",
                )));
            }
            (None, None) => {}
        }

        let now = self.clock.now();
        let scope = join_scopes(&scopes);
        let sso_session = if prompt.login {
            None
        } else {
            self.usable_sso_session(sso_session_id, fingerprint).await?
        };

        let Some(sso_session) = sso_session else {
            if prompt.none {
                AppLogger::log_oauth_event(&client.client_id, "authorize_login_required", false, None);
                return Err(fail(OAuth2Error::login_required()));
            }
            let flow = self.new_flow(request, &scope, prompt, None).await?;
            debug!(client_id = %client.client_id, "Authorization requires login");
            return Ok(AuthorizeOutcome::Login {
                flow_id: flow.session_id,
            });
        };

        self.stores
            .sso_sessions
            .touch_session(&sso_session.session_id, now)
            .await?;
        let user_id = sso_session.user_id;
        let user_id_str = user_id.to_string();

        let consented = self
            .stores
            .consents
            .has_sufficient_consent(user_id, &client.client_id, &scopes, now)
            .await?;
        if consented && !prompt.consent {
            let redirect = self
                .issue_code(&CodeBinding {
                    client_id: &client.client_id,
                    user_id,
                    redirect_uri: &request.redirect_uri,
                    scope: &scope,
                    state,
                    nonce: request.nonce.as_deref(),
                    code_challenge: request.code_challenge.as_deref(),
                    code_challenge_method: request.code_challenge_method.as_deref(),
                    auth_time: sso_session.created_at,
                    sso_session: &sso_session,
                })
                .await
                .map_err(fail)?;
            AppLogger::log_oauth_event(&client.client_id, "authorize_silent", true, Some(&user_id_str));
            return Ok(AuthorizeOutcome::CodeIssued { redirect });
        }
        if prompt.none {
            AppLogger::log_oauth_event(
                &client.client_id,
                "authorize_consent_required",
                false,
                Some(&user_id_str),
            );
            return Err(fail(OAuth2Error::consent_required()));
        }

        let flow = self
            .new_flow(request, &scope, prompt, Some(&sso_session))
            .await?;
        Ok(AuthorizeOutcome::Consent(
            self.consent_prompt(&flow, &client),
        ))
    }

    /// Resume a flow with a password login (POST /auth/login)
    ///
    /// Any SSO session presented by the browser is replaced by a fresh one.
    ///
    /// # Errors
    /// Returns [`FlowError::InvalidCredentials`] for a bad email/password pair,
    /// [`FlowError::Render`] for an unknown or expired flow
    pub async fn authenticate(
        &self,
        flow_id: &str,
        email: &str,
        password: &str,
        fingerprint: &Fingerprint,
        existing_sso_session_id: Option<&str>,
    ) -> Result<LoginResult, FlowError> {
        let now = self.clock.now();
        let flow = self.find_flow(flow_id, now).await?;

        let Some(user) = self.accounts.verify_credentials(email, password).await? else {
            AppLogger::log_auth_event("unknown", "password_login", false, Some(&flow.client_id));
            return Err(FlowError::InvalidCredentials {
                flow_id: flow.session_id,
            });
        };
        let user_id_str = user.id.to_string();

        if let Some(previous) = existing_sso_session_id {
            self.stores.sso_sessions.delete_session(previous).await?;
        }
        let sso_session = self.create_sso_session(&user, fingerprint).await?;
        AppLogger::log_auth_event(&user_id_str, "password_login", true, Some(&flow.client_id));

        if !self
            .stores
            .flows
            .mark_flow_authenticated(&flow.session_id, user.id, now, &sso_session.session_id)
            .await?
        {
            return Err(FlowError::Render(OAuth2Error::invalid_request(
                "Login session expired",
            )));
        }

        let consented = self
            .stores
            .consents
            .has_sufficient_consent(user.id, &flow.client_id, &flow.scopes(), now)
            .await?;
        let outcome = if consented && !flow.force_consent {
            let mut flow = flow;
            flow.auth_time = Some(now);
            let redirect = self.complete_flow(&flow, user.id, &sso_session).await?;
            AuthorizeOutcome::CodeIssued { redirect }
        } else {
            let client = self
                .clients
                .get_client(&flow.client_id)
                .await?
                .ok_or_else(|| OAuth2Error::invalid_request("Client no longer registered"))?;
            AuthorizeOutcome::Consent(self.consent_prompt(&flow, &client))
        };
        Ok(LoginResult {
            outcome,
            sso_session,
        })
    }

    /// Record consent and issue the code (POST /auth/consent, approve)
    ///
    /// The stored grant is widened to the union of any live grant and the
    /// newly approved scopes. The code carries the approved scopes only.
    ///
    /// # Errors
    /// Returns [`FlowError::Render`] for an unknown or unauthenticated flow and
    /// [`FlowError::Redirect`] for an empty or out-of-request approval
    pub async fn grant_consent(
        &self,
        flow_id: &str,
        approved: &[String],
    ) -> Result<String, FlowError> {
        let now = self.clock.now();
        let flow = self.find_flow(flow_id, now).await?;
        let (user_id, sso_session_id) = Self::authenticated_parts(&flow)?;
        let state = flow.state.as_deref();

        if approved.is_empty() {
            self.stores.flows.delete_flow(&flow.session_id).await?;
            return Err(redirect_error(
                &flow.redirect_uri,
                &OAuth2Error::access_denied("No scopes were approved"),
                state,
            ));
        }
        if !is_subset(approved, &flow.scopes()) {
            return Err(redirect_error(
                &flow.redirect_uri,
                &OAuth2Error::invalid_scope("Approved scopes exceed the request"),
                state,
            ));
        }

        let sso_session = self
            .stores
            .sso_sessions
            .find_session(sso_session_id, now)
            .await?
            .filter(|s| s.is_valid(now) && s.user_id == user_id)
            .ok_or_else(|| OAuth2Error::invalid_request("Sign-in session ended"))?;

        self.stores
            .consents
            .widen_consent(&UserConsent {
                user_id,
                client_id: flow.client_id.clone(),
                scopes: approved.to_vec(),
                granted_at: now,
                expires_at: self.config.consent_ttl.map(|ttl| now + ttl),
            })
            .await?;
        AppLogger::log_oauth_event(
            &flow.client_id,
            "consent_granted",
            true,
            Some(&user_id.to_string()),
        );

        let mut flow = flow;
        flow.scope = join_scopes(approved);
        self.complete_flow(&flow, user_id, &sso_session).await
    }

    /// Abandon the flow and tell the client (POST /auth/consent, deny)
    ///
    /// # Errors
    /// Returns [`FlowError::Render`] if the flow is unknown or expired
    pub async fn deny_consent(&self, flow_id: &str) -> Result<String, FlowError> {
        let flow = self.find_flow(flow_id, self.clock.now()).await?;
        self.stores.flows.delete_flow(&flow.session_id).await?;
        AppLogger::log_oauth_event(
            &flow.client_id,
            "consent_denied",
            false,
            flow.user_id.map(|u| u.to_string()).as_deref(),
        );
        let err = OAuth2Error::access_denied("The user denied the request");
        match redirect_error(&flow.redirect_uri, &err, flow.state.as_deref()) {
            FlowError::Redirect { redirect } => Ok(redirect),
            other => Err(other),
        }
    }

    /// Scopes and client details for a pending flow, for consent UIs that
    /// load the prompt by flow id
    ///
    /// # Errors
    /// Returns [`FlowError::Render`] for an unknown, expired, or unauthenticated flow
    pub async fn pending_consent(&self, flow_id: &str) -> Result<ConsentPrompt, FlowError> {
        let flow = self.find_flow(flow_id, self.clock.now()).await?;
        Self::authenticated_parts(&flow)?;
        let client = self
            .clients
            .get_client(&flow.client_id)
            .await?
            .ok_or_else(|| OAuth2Error::invalid_request("Client no longer registered"))?;
        Ok(self.consent_prompt(&flow, &client))
    }

    /// End the SSO session (POST /auth/logout)
    ///
    /// Returns the post-logout redirect only when it is registered for the
    /// named client.
    ///
    /// # Errors
    /// Returns `server_error` if the session store is unavailable
    pub async fn logout(
        &self,
        sso_session_id: Option<&str>,
        client_id: Option<&str>,
        post_logout_redirect_uri: Option<&str>,
        state: Option<&str>,
    ) -> Result<Option<String>, OAuth2Error> {
        if let Some(session_id) = sso_session_id {
            let now = self.clock.now();
            if let Some(session) = self.stores.sso_sessions.find_session(session_id, now).await? {
                AppLogger::log_auth_event(&session.user_id.to_string(), "logout", true, None);
            }
            self.stores.sso_sessions.delete_session(session_id).await?;
        }

        let Some(uri) = post_logout_redirect_uri else {
            return Ok(None);
        };
        let registered = match client_id {
            Some(client_id) => self
                .clients
                .get_client(client_id)
                .await?
                .is_some_and(|c| c.has_post_logout_redirect_uri(uri)),
            None => false,
        };
        if !registered {
            AppLogger::log_security_event(
                "post_logout_redirect_rejected",
                SecuritySeverity::Medium,
                &format!("Unregistered post_logout_redirect_uri: {uri}"),
                None,
            );
            return Ok(None);
        }

        let mut params = Vec::new();
        if let Some(state) = state {
            params.push(("state", state));
        }
        Ok(Some(append_query(uri, &params)?))
    }

    /// The signed-in user behind an SSO cookie, if the session is usable
    ///
    /// # Errors
    /// Returns error if the session store is unavailable
    pub async fn current_session(&self, sso_session_id: &str) -> AppResult<Option<SsoSession>> {
        let now = self.clock.now();
        let session = self
            .stores
            .sso_sessions
            .find_session(sso_session_id, now)
            .await?
            .filter(|s| s.is_valid(now));
        if let Some(session) = &session {
            self.stores
                .sso_sessions
                .touch_session(&session.session_id, now)
                .await?;
        }
        Ok(session)
    }

    /// Live SSO sessions of a user, oldest first
    ///
    /// # Errors
    /// Returns error if the session store is unavailable
    pub async fn list_sessions(&self, user_id: Uuid) -> AppResult<Vec<SsoSession>> {
        self.stores
            .sso_sessions
            .find_sessions_by_user(user_id, self.clock.now())
            .await
    }

    /// Sign out one session by its public handle
    ///
    /// # Errors
    /// Returns `ResourceNotFound` when the handle does not name a session of `user_id`
    pub async fn revoke_session(&self, user_id: Uuid, handle: &str) -> AppResult<()> {
        let owned = self
            .list_sessions(user_id)
            .await?
            .into_iter()
            .find(|s| s.handle == handle);
        let Some(session) = owned else {
            AppLogger::log_security_event(
                "session_revoke_not_owned",
                SecuritySeverity::Medium,
                &format!("Session handle {handle} is not owned by the requesting user"),
                Some(&user_id.to_string()),
            );
            return Err(AppError::not_found("Session"));
        };
        self.stores
            .sso_sessions
            .delete_session(&session.session_id)
            .await?;
        AppLogger::log_auth_event(&user_id.to_string(), "session_revoked", true, Some(handle));
        Ok(())
    }

    /// Consents the user has granted, ordered by client
    ///
    /// # Errors
    /// Returns error if the consent store is unavailable
    pub async fn list_authorizations(&self, user_id: Uuid) -> AppResult<Vec<UserConsent>> {
        self.stores.consents.list_consents(user_id).await
    }

    /// Withdraw a client's consent and every refresh token it holds for the user
    ///
    /// # Errors
    /// Returns `ResourceNotFound` if the user never authorized the client
    pub async fn revoke_authorization(&self, user_id: Uuid, client_id: &str) -> AppResult<()> {
        let revoked = self.stores.consents.revoke_consent(user_id, client_id).await?;
        let dropped = self
            .stores
            .refresh_tokens
            .delete_refresh_tokens_for(user_id, client_id)
            .await?;
        if !revoked && dropped == 0 {
            return Err(AppError::not_found("Authorization"));
        }
        AppLogger::log_oauth_event(
            client_id,
            "authorization_revoked",
            true,
            Some(&user_id.to_string()),
        );
        debug!(client_id, refresh_tokens = dropped, "Revoked client authorization");
        Ok(())
    }

    /// Key Material Provider's public keys
    #[must_use]
    pub fn jwks(&self) -> JsonWebKeySet {
        self.keys.public_key_set()
    }

    /// OpenID Provider metadata
    #[must_use]
    pub fn discovery_document(&self) -> Value {
        let config = &self.config;
        json!({
            "issuer": config.issuer_url,
            "authorization_endpoint": config.endpoint(endpoints::AUTHORIZE),
            "token_endpoint": config.endpoint(endpoints::TOKEN),
            "userinfo_endpoint": config.endpoint(endpoints::USERINFO),
            "revocation_endpoint": config.endpoint(endpoints::REVOKE),
            "registration_endpoint": config.endpoint(endpoints::REGISTER),
            "end_session_endpoint": config.endpoint(endpoints::LOGOUT),
            "jwks_uri": config.endpoint(endpoints::JWKS),
            "scopes_supported": self.scopes.names(),
            "claims_supported": self.scopes.all_claims(),
            "response_types_supported": ["code"],
            "response_modes_supported": ["query"],
            "grant_types_supported": grant_types::SUPPORTED,
            "subject_types_supported": ["public"],
            "id_token_signing_alg_values_supported": ["RS256"],
            "token_endpoint_auth_methods_supported": ["client_secret_basic", "client_secret_post"],
            "revocation_endpoint_auth_methods_supported": ["client_secret_basic", "client_secret_post"],
            "code_challenge_methods_supported": [pkce::S256],
            "prompt_values_supported": ["none", "login", "consent"],
        })
    }

    /// Create an authenticated SSO session for `user`
    ///
    /// # Errors
    /// Returns error if the RNG fails or the session cannot be stored
    pub async fn create_sso_session(
        &self,
        user: &User,
        fingerprint: &Fingerprint,
    ) -> AppResult<SsoSession> {
        let now = self.clock.now();
        let session = SsoSession {
            session_id: generate_random_string(limits::SESSION_ID_BYTES)?,
            handle: Uuid::new_v4().simple().to_string(),
            user_id: user.id,
            authenticated: true,
            created_at: now,
            last_activity: now,
            expires_at: now + self.config.sso_session_ttl,
            fingerprint: fingerprint.clone(),
        };
        self.stores.sso_sessions.create_session(&session).await?;
        Ok(session)
    }

    async fn verified_client(&self, request: &AuthorizeRequest) -> Result<OAuth2Client, FlowError> {
        if request.client_id.is_empty() || request.redirect_uri.is_empty() {
            return Err(FlowError::Render(OAuth2Error::invalid_request(
                "client_id and redirect_uri are required",
            )));
        }
        let Some(client) = self.clients.get_client(&request.client_id).await? else {
            warn!(client_id = %request.client_id, "Authorization request for unknown client");
            return Err(FlowError::Render(OAuth2Error::invalid_request(
                "Unknown client_id",
            )));
        };
        if client.is_expired(self.clock.now()) {
            return Err(FlowError::Render(OAuth2Error::invalid_request(
                "Client registration has expired",
            )));
        }
        if !client.has_redirect_uri(&request.redirect_uri) {
            AppLogger::log_security_event(
                "redirect_uri_mismatch",
                SecuritySeverity::High,
                &format!(
                    "client_id={} presented unregistered redirect_uri={}",
                    client.client_id, request.redirect_uri
                ),
                None,
            );
            return Err(FlowError::Render(OAuth2Error::invalid_redirect_uri(
                "redirect_uri is not registered for this client",
            )));
        }
        Ok(client)
    }

    /// Requested scopes, or the registry defaults when none were requested
    fn validate_requested_scopes(
        &self,
        client: &OAuth2Client,
        raw: Option<&str>,
    ) -> Result<Vec<String>, OAuth2Error> {
        let mut scopes = parse_scope(raw.unwrap_or_default());
        if scopes.is_empty() {
            scopes = self.scopes.default_scopes();
        }
        let unknown = self.scopes.unknown_scopes(&scopes);
        if !unknown.is_empty() {
            return Err(OAuth2Error::invalid_scope(&format!(
                "Unknown scope: {}",
                unknown.join(" ")
            )));
        }
        if let Some(denied) = scopes.iter().find(|s| !client.allows_scope(s)) {
            return Err(OAuth2Error::invalid_scope(&format!(
                "Client may not request scope: {denied}"
            )));
        }
        Ok(scopes)
    }

    /// A valid SSO session that also passes the fingerprint policy
    async fn usable_sso_session(
        &self,
        sso_session_id: Option<&str>,
        fingerprint: &Fingerprint,
    ) -> AppResult<Option<SsoSession>> {
        let Some(session_id) = sso_session_id else {
            return Ok(None);
        };
        let now = self.clock.now();
        let Some(session) = self
            .stores
            .sso_sessions
            .find_session(session_id, now)
            .await?
            .filter(|s| s.is_valid(now))
        else {
            return Ok(None);
        };

        if !session.fingerprint.matches(fingerprint) {
            AppLogger::log_security_event(
                "sso_fingerprint_mismatch",
                SecuritySeverity::Low,
                &format!(
                    "session {} presented from ip={:?} ua={:?}",
                    session.handle, fingerprint.ip_address, fingerprint.user_agent
                ),
                Some(&session.user_id.to_string()),
            );
            if self.config.fingerprint_policy == FingerprintPolicy::ForceReauth {
                return Ok(None);
            }
        }
        Ok(Some(session))
    }

    async fn new_flow(
        &self,
        request: &AuthorizeRequest,
        scope: &str,
        prompt: Prompt,
        authenticated_by: Option<&SsoSession>,
    ) -> AppResult<FlowSession> {
        let now = self.clock.now();
        let flow = FlowSession {
            session_id: generate_random_string(limits::SESSION_ID_BYTES)?,
            client_id: request.client_id.clone(),
            redirect_uri: request.redirect_uri.clone(),
            scope: scope.to_owned(),
            state: request.state.clone(),
            response_type: request.response_type.clone(),
            nonce: request.nonce.clone(),
            code_challenge: request.code_challenge.clone(),
            code_challenge_method: request.code_challenge_method.clone(),
            force_consent: prompt.consent,
            authenticated: authenticated_by.is_some(),
            user_id: authenticated_by.map(|s| s.user_id),
            auth_time: authenticated_by.map(|s| s.created_at),
            sso_session_id: authenticated_by.map(|s| s.session_id.clone()),
            created_at: now,
            expires_at: now + self.config.flow_session_ttl,
        };
        self.stores.flows.create_flow(&flow).await?;
        Ok(flow)
    }

    async fn find_flow(&self, flow_id: &str, now: DateTime<Utc>) -> Result<FlowSession, FlowError> {
        self.stores
            .flows
            .find_flow(flow_id, now)
            .await?
            .ok_or_else(|| {
                FlowError::Render(OAuth2Error::invalid_request(
                    "Unknown or expired authorization session",
                ))
            })
    }

    fn authenticated_parts(flow: &FlowSession) -> Result<(Uuid, &str), FlowError> {
        match (flow.authenticated, flow.user_id, flow.sso_session_id.as_deref()) {
            (true, Some(user_id), Some(sso_session_id)) => Ok((user_id, sso_session_id)),
            _ => Err(FlowError::Render(OAuth2Error::invalid_request(
                "Authorization session is not authenticated",
            ))),
        }
    }

    fn consent_prompt(&self, flow: &FlowSession, client: &OAuth2Client) -> ConsentPrompt {
        ConsentPrompt {
            flow_id: flow.session_id.clone(),
            client_id: client.client_id.clone(),
            client_name: client.client_name.clone(),
            scopes: flow
                .scopes()
                .into_iter()
                .map(|name| ScopeDescription {
                    description: self
                        .scopes
                        .get(&name)
                        .map_or_else(|| name.clone(), |d| d.description.clone()),
                    name,
                })
                .collect(),
        }
    }

    /// Issue the code for an authenticated flow, then drop the flow
    async fn complete_flow(
        &self,
        flow: &FlowSession,
        user_id: Uuid,
        sso_session: &SsoSession,
    ) -> Result<String, FlowError> {
        let redirect = self
            .issue_code(&CodeBinding::from_flow(flow, user_id, sso_session))
            .await
            .map_err(|e| redirect_error(&flow.redirect_uri, &e, flow.state.as_deref()))?;
        self.stores.flows.delete_flow(&flow.session_id).await?;
        AppLogger::log_oauth_event(&flow.client_id, "code_issued", true, Some(&user_id.to_string()));
        Ok(redirect)
    }

    /// Store a fresh code and build the client redirect
    async fn issue_code(&self, binding: &CodeBinding<'_>) -> Result<String, OAuth2Error> {
        let now = self.clock.now();
        let code = format!(
            "{}_{}",
            generate_random_string(limits::CODE_RANDOM_BYTES)?,
            binding.sso_session.handle
        );
        self.stores
            .codes
            .store_code(&AuthorizationCode {
                code: code.clone(),
                client_id: binding.client_id.to_owned(),
                user_id: binding.user_id,
                redirect_uri: binding.redirect_uri.to_owned(),
                scope: binding.scope.to_owned(),
                nonce: binding.nonce.map(str::to_owned),
                code_challenge: binding.code_challenge.map(str::to_owned),
                code_challenge_method: binding.code_challenge_method.map(str::to_owned),
                auth_time: binding.auth_time,
                sso_session_id: Some(binding.sso_session.session_id.clone()),
                created_at: now,
                expires_at: now + self.config.auth_code_ttl,
            })
            .await?;

        let mut params = vec![("code", code.as_str())];
        if let Some(state) = binding.state {
            params.push(("state", state));
        }
        append_query(binding.redirect_uri, &params)
    }
}

/// Add query parameters to an absolute URI
fn append_query(uri: &str, params: &[(&str, &str)]) -> Result<String, OAuth2Error> {
    let mut url = url::Url::parse(uri).map_err(|e| {
        error!(error = %e, uri, "Registered redirect URI does not parse");
        OAuth2Error::server_error()
    })?;
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params);
    }
    Ok(url.into())
}

/// Error redirect to a verified URI, or a rendered error if it cannot be built
fn redirect_error(redirect_uri: &str, err: &OAuth2Error, state: Option<&str>) -> FlowError {
    let mut params = vec![("error", err.error.as_str())];
    if let Some(description) = &err.error_description {
        params.push(("error_description", description.as_str()));
    }
    if let Some(state) = state {
        params.push(("state", state));
    }
    match append_query(redirect_uri, &params) {
        Ok(redirect) => FlowError::Redirect { redirect },
        Err(render) => FlowError::Render(render),
    }
}

/// URL-safe random string from `length` bytes of system randomness
///
/// # Errors
/// Returns an error if system RNG fails - this is a critical security failure
/// and the server cannot operate securely without working RNG
pub fn generate_random_string(length: usize) -> AppResult<String> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; length];

    rng.fill(&mut bytes).map_err(|e| {
        error!(
            "CRITICAL: SystemRandom failed - cannot generate secure random bytes: {}",
            e
        );
        AppError::internal("System RNG failure - server cannot operate securely")
    })?;

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(&bytes))
}
