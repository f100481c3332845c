// ABOUTME: Token endpoint grants, UserInfo, and RFC 7009 revocation for the Authorization Engine
// ABOUTME: Code redemption, refresh rotation with replay detection, client credentials, token exchange
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use chrono::Duration;
use gatekeeper_core::constants::{grant_types, scopes, token_types};
use gatekeeper_core::models::{OAuth2Client, RefreshTokenRecord, User};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::endpoints::AuthorizationEngine;
use super::models::{OAuth2Error, RevocationRequest, TokenRequest, TokenResponse};
use super::pkce;
use crate::config::RefreshTokenPolicy;
use crate::logging::{AppLogger, SecuritySeverity};
use crate::scopes::{is_subset, join_scopes, parse_scope};
use crate::tokens::{AccessTokenRequest, Actor, TokenError, TokenKind};

/// Credentials decoded from an `Authorization: Basic` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    /// Client identifier
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
}

impl AuthorizationEngine {
    /// Handle token request (POST /oauth/token)
    ///
    /// # Errors
    /// Returns the RFC 6749 error for the failed check; infrastructure
    /// failures surface as `server_error`
    pub async fn token(
        &self,
        request: TokenRequest,
        basic: Option<BasicCredentials>,
    ) -> Result<TokenResponse, OAuth2Error> {
        let client = self
            .authenticate_client(
                request.client_id.as_deref(),
                request.client_secret.as_deref(),
                basic,
            )
            .await?;

        let grant_type = request.grant_type.clone();
        let grant_type = grant_type.as_str();
        if !grant_types::SUPPORTED.contains(&grant_type) {
            return Err(OAuth2Error::unsupported_grant_type());
        }
        if !client.allows_grant(grant_type) {
            AppLogger::log_oauth_event(&client.client_id, grant_type, false, None);
            return Err(OAuth2Error::unauthorized_client(&format!(
                "Client is not registered for the {grant_type} grant"
            )));
        }

        let response = match grant_type {
            grant_types::AUTHORIZATION_CODE => {
                self.handle_authorization_code_grant(&client, request).await
            }
            grant_types::REFRESH_TOKEN => self.handle_refresh_token_grant(&client, request).await,
            grant_types::CLIENT_CREDENTIALS => {
                self.handle_client_credentials_grant(&client, &request)
            }
            grant_types::TOKEN_EXCHANGE => self.handle_token_exchange_grant(&client, request).await,
            _ => Err(OAuth2Error::unsupported_grant_type()),
        };
        AppLogger::log_oauth_event(&client.client_id, grant_type, response.is_ok(), None);
        response
    }

    /// Handle UserInfo request (GET /oauth/userinfo)
    ///
    /// # Errors
    /// Returns `invalid_token` / `token_expired` for a bad bearer token and
    /// `insufficient_scope` when the token lacks `openid`
    pub async fn userinfo(&self, bearer_token: &str) -> Result<Map<String, Value>, OAuth2Error> {
        let claims = self
            .codec
            .verify_any(bearer_token, TokenKind::Access, None)?;
        let granted = claims.scopes();
        if !granted.iter().any(|s| s == scopes::OPENID) {
            return Err(OAuth2Error::insufficient_scope(
                "The access token does not carry the openid scope",
            ));
        }
        let user = self
            .user_for_subject(&claims.sub)
            .await?
            .ok_or_else(|| OAuth2Error::invalid_token("Token subject is not a user"))?;
        Ok(self.user_claims(&user, &granted))
    }

    /// Handle revocation request (POST /oauth/revoke, RFC 7009)
    ///
    /// Refresh tokens issued to the caller are deleted. Access tokens and
    /// tokens this server does not recognise are accepted without effect.
    ///
    /// # Errors
    /// Returns `invalid_client` if the caller does not authenticate
    pub async fn revoke_token(
        &self,
        request: RevocationRequest,
        basic: Option<BasicCredentials>,
    ) -> Result<(), OAuth2Error> {
        let client = self
            .authenticate_client(
                request.client_id.as_deref(),
                request.client_secret.as_deref(),
                basic,
            )
            .await?;
        if request.token.is_empty() {
            return Err(OAuth2Error::invalid_request("Missing token"));
        }

        match self
            .codec
            .verify(&request.token, TokenKind::Refresh, Some(&client.client_id))
        {
            Ok(claims) => {
                let consumed = self
                    .stores
                    .refresh_tokens
                    .consume_refresh_token(&claims.jti)
                    .await?;
                AppLogger::log_oauth_event(
                    &client.client_id,
                    "refresh_token_revoked",
                    consumed.is_some(),
                    Some(&claims.sub),
                );
            }
            Err(e) => {
                tracing::debug!(client_id = %client.client_id, reason = %e, "Revocation of non-refresh token is a no-op");
            }
        }
        Ok(())
    }

    /// Validate client credentials from either Basic auth or the form body
    async fn authenticate_client(
        &self,
        form_id: Option<&str>,
        form_secret: Option<&str>,
        basic: Option<BasicCredentials>,
    ) -> Result<OAuth2Client, OAuth2Error> {
        let (client_id, client_secret) = match basic {
            Some(basic) => {
                if form_secret.is_some() {
                    return Err(OAuth2Error::invalid_request(
                        "Use only one client authentication method",
                    ));
                }
                if form_id.is_some_and(|id| id != basic.client_id) {
                    return Err(OAuth2Error::invalid_request(
                        "client_id does not match the Authorization header",
                    ));
                }
                (basic.client_id, basic.client_secret)
            }
            None => match (form_id, form_secret) {
                (Some(id), Some(secret)) => (id.to_owned(), secret.to_owned()),
                _ => return Err(OAuth2Error::invalid_client()),
            },
        };
        self.clients.validate_client(&client_id, &client_secret).await
    }

    /// Handle authorization code grant
    async fn handle_authorization_code_grant(
        &self,
        client: &OAuth2Client,
        request: TokenRequest,
    ) -> Result<TokenResponse, OAuth2Error> {
        let code = request
            .code
            .ok_or_else(|| OAuth2Error::invalid_request("Missing authorization code"))?;
        let redirect_uri = request
            .redirect_uri
            .ok_or_else(|| OAuth2Error::invalid_request("Missing redirect_uri"))?;

        // Removal is the redemption; whatever fails below, the code stays burnt
        let Some(auth_code) = self.stores.codes.consume_code(&code).await? else {
            AppLogger::log_security_event(
                "authorization_code_reuse",
                SecuritySeverity::High,
                &format!("Unknown or already redeemed code presented by {}", client.client_id),
                None,
            );
            return Err(OAuth2Error::invalid_grant(
                "Invalid or already used authorization code",
            ));
        };
        let user_id = auth_code.user_id.to_string();

        if auth_code.client_id != client.client_id {
            AppLogger::log_security_event(
                "authorization_code_client_mismatch",
                SecuritySeverity::High,
                &format!(
                    "Code issued to {} redeemed by {}",
                    auth_code.client_id, client.client_id
                ),
                Some(&user_id),
            );
            return Err(OAuth2Error::invalid_grant("Authorization code was not issued to this client"));
        }
        if auth_code.redirect_uri != redirect_uri {
            AppLogger::log_security_event(
                "redirect_uri_mismatch",
                SecuritySeverity::High,
                &format!("Code redeemed with different redirect_uri by {}", client.client_id),
                Some(&user_id),
            );
            return Err(OAuth2Error::invalid_grant("redirect_uri does not match"));
        }
        if auth_code.is_expired(self.clock.now()) {
            return Err(OAuth2Error::invalid_grant("Authorization code expired"));
        }
        if let Err(e) = pkce::verify(
            auth_code.code_challenge.as_deref(),
            auth_code.code_challenge_method.as_deref(),
            request.code_verifier.as_deref(),
        ) {
            AppLogger::log_security_event(
                "pkce_verification_failed",
                SecuritySeverity::High,
                e.description(),
                Some(&user_id),
            );
            return Err(e);
        }

        let user = self
            .accounts
            .get_user(auth_code.user_id)
            .await?
            .ok_or_else(|| OAuth2Error::invalid_grant("User no longer exists"))?;
        let granted = parse_scope(&auth_code.scope);

        let mut response = self.mint_user_tokens(client, &user, &granted, true).await?;
        if granted.iter().any(|s| s == scopes::OPENID) {
            let mut id_claims = self.user_claims(&user, &granted);
            id_claims.remove("sub");
            let id_token = self.codec.mint_id_token(
                &user_id,
                &client.client_id,
                auth_code.nonce.as_deref(),
                auth_code.auth_time.timestamp(),
                id_claims,
                self.config.access_token_ttl,
            )?;
            response.id_token = Some(id_token.token);
        }
        Ok(response)
    }

    /// Handle refresh token grant with rotation
    async fn handle_refresh_token_grant(
        &self,
        client: &OAuth2Client,
        request: TokenRequest,
    ) -> Result<TokenResponse, OAuth2Error> {
        let refresh_token = request
            .refresh_token
            .ok_or_else(|| OAuth2Error::invalid_request("Missing refresh_token"))?;

        let claims = self
            .codec
            .verify(&refresh_token, TokenKind::Refresh, Some(&client.client_id))
            .map_err(|e| match e {
                TokenError::Expired { .. } => OAuth2Error::invalid_grant("Refresh token expired"),
                other => OAuth2Error::invalid_grant(&format!("Invalid refresh token: {other}")),
            })?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| OAuth2Error::invalid_grant("Refresh token subject is not a user"))?;

        // Request checks run before the record is consumed so a malformed
        // request never spends the token or reads as a replay
        let now = self.clock.now();
        let original = claims.scopes();
        let requested = match request.scope.as_deref().map(parse_scope) {
            Some(requested) if !requested.is_empty() => {
                if !is_subset(&requested, &original) {
                    return Err(OAuth2Error::invalid_scope(
                        "Requested scope exceeds the original grant",
                    ));
                }
                requested
            }
            _ => original.clone(),
        };

        if !self
            .stores
            .consents
            .has_sufficient_consent(user_id, &client.client_id, &requested, now)
            .await?
        {
            return Err(OAuth2Error::invalid_grant("Authorization has been revoked"));
        }
        let user = self
            .accounts
            .get_user(user_id)
            .await?
            .ok_or_else(|| OAuth2Error::invalid_grant("User no longer exists"))?;

        let Some(record) = self
            .stores
            .refresh_tokens
            .consume_refresh_token(&claims.jti)
            .await?
        else {
            // A validly signed token whose record is gone was already rotated or revoked
            let dropped = self
                .stores
                .refresh_tokens
                .delete_refresh_tokens_for(user_id, &client.client_id)
                .await?;
            AppLogger::log_security_event(
                "refresh_token_replay",
                SecuritySeverity::High,
                &format!(
                    "Replayed refresh token for {}; revoked {dropped} live tokens",
                    client.client_id
                ),
                Some(&claims.sub),
            );
            return Err(OAuth2Error::invalid_grant("Refresh token has been revoked"));
        };

        if record.client_id != client.client_id || record.user_id != user_id {
            return Err(OAuth2Error::invalid_grant("Refresh token was not issued to this client"));
        }
        if record.is_expired(now) {
            return Err(OAuth2Error::invalid_grant("Refresh token expired"));
        }

        let mut response = self.mint_user_tokens(client, &user, &requested, false).await?;
        let rotated = self.mint_refresh(client, &user, &original).await?;
        response.refresh_token = Some(rotated);
        Ok(response)
    }

    /// Handle client credentials grant
    fn handle_client_credentials_grant(
        &self,
        client: &OAuth2Client,
        request: &TokenRequest,
    ) -> Result<TokenResponse, OAuth2Error> {
        let requested = parse_scope(request.scope.as_deref().unwrap_or_default());
        let unknown = self.scopes.unknown_scopes(&requested);
        if !unknown.is_empty() {
            return Err(OAuth2Error::invalid_scope(&format!(
                "Unknown scope: {}",
                unknown.join(" ")
            )));
        }
        if let Some(identity) = requested.iter().find(|s| self.scopes.is_identity_scope(s)) {
            return Err(OAuth2Error::invalid_scope(&format!(
                "Scope {identity} requires a user"
            )));
        }
        if let Some(denied) = requested.iter().find(|s| !client.allows_scope(s)) {
            return Err(OAuth2Error::invalid_scope(&format!(
                "Client may not request scope: {denied}"
            )));
        }

        let scope = join_scopes(&requested);
        let subject = format!("client:{}", client.client_id);
        let access = self.codec.mint_access_token(AccessTokenRequest {
            subject: &subject,
            audience: &client.client_id,
            client_id: &client.client_id,
            scope: &scope,
            ttl: self.config.access_token_ttl,
            actor: None,
        })?;
        Ok(TokenResponse {
            access_token: access.token,
            token_type: "Bearer".to_owned(),
            expires_in: self.config.access_token_ttl.num_seconds(),
            scope,
            refresh_token: None,
            id_token: None,
            issued_token_type: None,
        })
    }

    /// Handle RFC 8693 token exchange (delegation)
    async fn handle_token_exchange_grant(
        &self,
        client: &OAuth2Client,
        request: TokenRequest,
    ) -> Result<TokenResponse, OAuth2Error> {
        let subject_token = request
            .subject_token
            .ok_or_else(|| OAuth2Error::invalid_request("Missing subject_token"))?;
        match request.subject_token_type.as_deref() {
            Some(token_types::ACCESS_TOKEN | token_types::JWT) => {}
            Some(_) => {
                return Err(OAuth2Error::invalid_request("Unsupported subject_token_type"));
            }
            None => return Err(OAuth2Error::invalid_request("Missing subject_token_type")),
        }
        let encrypt = match request.requested_token_type.as_deref() {
            None | Some(token_types::ACCESS_TOKEN | token_types::JWT) => false,
            Some(token_types::ENCRYPTED_JWT) => true,
            Some(_) => {
                return Err(OAuth2Error::invalid_request(
                    "Unsupported requested_token_type",
                ));
            }
        };

        let subject = self
            .codec
            .verify_any(&subject_token, TokenKind::Access, Some(&client.client_id))
            .map_err(|e| {
                AppLogger::log_security_event(
                    "token_exchange_subject_rejected",
                    SecuritySeverity::Medium,
                    &format!("{} presented an unusable subject_token: {e}", client.client_id),
                    None,
                );
                OAuth2Error::invalid_grant(&format!("Invalid subject_token: {e}"))
            })?;
        let user = self
            .user_for_subject(&subject.sub)
            .await?
            .ok_or_else(|| OAuth2Error::invalid_grant("subject_token does not identify a user"))?;

        let audience = match request.audience {
            Some(audience) if audience != client.client_id => {
                if self.clients.get_client(&audience).await?.is_none() {
                    return Err(OAuth2Error::invalid_target("Unknown audience"));
                }
                audience
            }
            _ => client.client_id.clone(),
        };

        let available = subject.scopes();
        let requested = match request.scope.as_deref().map(parse_scope) {
            Some(requested) if !requested.is_empty() => {
                if !is_subset(&requested, &available) {
                    return Err(OAuth2Error::invalid_scope(
                        "Requested scope exceeds the subject token",
                    ));
                }
                requested
            }
            _ => available,
        };

        let remaining = subject.exp - self.clock.unix_now();
        let ttl = self
            .config
            .access_token_ttl
            .min(Duration::seconds(remaining));
        if ttl <= Duration::zero() {
            return Err(OAuth2Error::invalid_grant("subject_token expired"));
        }

        let scope = join_scopes(&requested);
        let user_id = user.id.to_string();
        let minted = self.codec.mint_access_token(AccessTokenRequest {
            subject: &user_id,
            audience: &audience,
            client_id: &client.client_id,
            scope: &scope,
            ttl,
            actor: Some(Actor {
                sub: client.client_id.clone(),
                act: subject.act.map(Box::new),
            }),
        })?;

        let (access_token, issued_token_type) = if encrypt {
            (self.codec.encrypt(&minted.token)?, token_types::ENCRYPTED_JWT)
        } else {
            (minted.token, token_types::ACCESS_TOKEN)
        };
        AppLogger::log_oauth_event(&client.client_id, "token_exchanged", true, Some(&user_id));

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_owned(),
            expires_in: ttl.num_seconds(),
            scope,
            refresh_token: None,
            id_token: None,
            issued_token_type: Some(issued_token_type.to_owned()),
        })
    }

    /// Access token for `user`, plus a refresh token when policy allows
    async fn mint_user_tokens(
        &self,
        client: &OAuth2Client,
        user: &User,
        granted: &[String],
        with_refresh: bool,
    ) -> Result<TokenResponse, OAuth2Error> {
        let scope = join_scopes(granted);
        let user_id = user.id.to_string();
        let access = self.codec.mint_access_token(AccessTokenRequest {
            subject: &user_id,
            audience: &client.client_id,
            client_id: &client.client_id,
            scope: &scope,
            ttl: self.config.access_token_ttl,
            actor: None,
        })?;

        let wants_refresh = match self.config.refresh_token_policy {
            RefreshTokenPolicy::Always => true,
            RefreshTokenPolicy::OfflineAccess => {
                granted.iter().any(|s| s == scopes::OFFLINE_ACCESS)
            }
        };
        let refresh_token =
            if with_refresh && wants_refresh && client.allows_grant(grant_types::REFRESH_TOKEN) {
                Some(self.mint_refresh(client, user, granted).await?)
            } else {
                None
            };

        Ok(TokenResponse {
            access_token: access.token,
            token_type: "Bearer".to_owned(),
            expires_in: self.config.access_token_ttl.num_seconds(),
            scope,
            refresh_token,
            id_token: None,
            issued_token_type: None,
        })
    }

    /// Mint a refresh token and record its `jti`
    async fn mint_refresh(
        &self,
        client: &OAuth2Client,
        user: &User,
        granted: &[String],
    ) -> Result<String, OAuth2Error> {
        let scope = join_scopes(granted);
        let minted = self.codec.mint_refresh_token(
            &user.id.to_string(),
            &client.client_id,
            &scope,
            self.config.refresh_token_ttl,
        )?;
        let issued_at = self.clock.now();
        self.stores
            .refresh_tokens
            .store_refresh_token(&RefreshTokenRecord {
                jti: minted.claims.jti.clone(),
                user_id: user.id,
                client_id: client.client_id.clone(),
                scope,
                issued_at,
                expires_at: issued_at + self.config.refresh_token_ttl,
            })
            .await?;
        Ok(minted.token)
    }

    async fn user_for_subject(&self, subject: &str) -> Result<Option<User>, OAuth2Error> {
        let Ok(user_id) = Uuid::parse_str(subject) else {
            return Ok(None);
        };
        Ok(self.accounts.get_user(user_id).await?)
    }

    /// Claims of `user` released by `granted`; absent values are omitted
    pub(super) fn user_claims(&self, user: &User, granted: &[String]) -> Map<String, Value> {
        let mut claims = Map::new();
        for claim in self.scopes.claims_for_scopes(granted) {
            let value = match claim.as_str() {
                "sub" => Some(json!(user.id.to_string())),
                "name" => user.display_name.as_ref().map(|v| json!(v)),
                "given_name" => user.given_name.as_ref().map(|v| json!(v)),
                "family_name" => user.family_name.as_ref().map(|v| json!(v)),
                "picture" => user.picture.as_ref().map(|v| json!(v)),
                "updated_at" => Some(json!(user.updated_at.timestamp())),
                "email" => Some(json!(user.email)),
                "email_verified" => Some(json!(user.email_verified)),
                "phone_number" => user.phone_number.as_ref().map(|v| json!(v)),
                "phone_number_verified" => user
                    .phone_number
                    .as_ref()
                    .map(|_| json!(user.phone_number_verified)),
                "address" => user
                    .address
                    .as_ref()
                    .map(|formatted| json!({ "formatted": formatted })),
                _ => None,
            };
            if let Some(value) = value {
                claims.insert(claim, value);
            }
        }
        claims
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::config::OAuth2ServerConfig;
    use crate::jwks::{JwksManager, RsaKeyPair};
    use crate::scopes::ScopeRegistry;
    use crate::stores::Stores;
    use crate::utils::clock::SystemClock;

    fn engine() -> AuthorizationEngine {
        let keys = JwksManager::with_active_key(RsaKeyPair::generate_with_key_size(2048).unwrap());
        AuthorizationEngine::new(
            Arc::new(OAuth2ServerConfig::for_issuer("https://id.test")),
            Stores::in_memory(),
            Arc::new(ScopeRegistry::with_standard_scopes()),
            Arc::new(keys),
            Arc::new(SystemClock),
        )
        .unwrap()
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_owned(),
            email_verified: true,
            password_hash: "x".to_owned(),
            display_name: Some("Ada".to_owned()),
            given_name: None,
            family_name: None,
            picture: None,
            phone_number: Some("+100".to_owned()),
            phone_number_verified: false,
            address: Some("1 Loop Rd".to_owned()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn scopes(raw: &str) -> Vec<String> {
        parse_scope(raw)
    }

    #[test]
    fn test_user_claims_follow_granted_scopes() {
        let engine = engine();
        let user = user();

        let claims = engine.user_claims(&user, &scopes("openid email"));
        let mut keys: Vec<&str> = claims.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["email", "email_verified", "sub"]);

        let claims = engine.user_claims(&user, &scopes("openid profile address"));
        assert_eq!(claims["name"], "Ada");
        assert!(!claims.contains_key("given_name"));
        assert_eq!(claims["address"]["formatted"], "1 Loop Rd");
        assert!(!claims.contains_key("phone_number"));
    }

    #[tokio::test]
    async fn test_client_must_authenticate_once() {
        let engine = engine();
        let basic = BasicCredentials {
            client_id: "a".to_owned(),
            client_secret: "b".to_owned(),
        };
        let err = engine
            .authenticate_client(Some("other"), None, Some(basic.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.error, "invalid_request");

        let err = engine
            .authenticate_client(None, Some("b"), Some(basic))
            .await
            .unwrap_err();
        assert_eq!(err.error, "invalid_request");

        let err = engine
            .authenticate_client(Some("a"), None, None)
            .await
            .unwrap_err();
        assert_eq!(err.error, "invalid_client");
    }
}
