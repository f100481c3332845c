// ABOUTME: Mints and verifies access, refresh, and ID tokens against the Key Material Provider
// ABOUTME: Expiry and issued-at checks use the injected clock; shape sniffing is routing only
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use chrono::Duration;
use gatekeeper_core::constants::ttl;
use gatekeeper_core::errors::AppResult;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::claims::{Actor, TokenClaims, TokenKind};
use super::{jwe, TokenError};
use crate::jwks::KeyProvider;
use crate::utils::clock::Clock;

/// Structural hint derived from the segment count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenShape {
    /// Three segments (JWS)
    Signed,
    /// Five segments (JWE)
    Encrypted,
    /// Anything else
    Unknown,
}

/// Classify a token by segment count. Never a substitute for verification.
#[must_use]
pub fn sniff_shape(token: &str) -> TokenShape {
    match token.split('.').count() {
        3 => TokenShape::Signed,
        5 => TokenShape::Encrypted,
        _ => TokenShape::Unknown,
    }
}

/// A freshly minted token together with its claims
#[derive(Debug, Clone)]
pub struct MintedToken {
    /// Compact serialization
    pub token: String,
    /// Claims inside the token
    pub claims: TokenClaims,
}

/// Parameters for an access token
#[derive(Debug, Clone)]
pub struct AccessTokenRequest<'a> {
    /// Subject
    pub subject: &'a str,
    /// Audience
    pub audience: &'a str,
    /// Client the token is issued to
    pub client_id: &'a str,
    /// Space-separated scopes
    pub scope: &'a str,
    /// Lifetime
    pub ttl: Duration,
    /// Delegation chain for exchanged tokens
    pub actor: Option<Actor>,
}

/// Token Codec
pub struct TokenCodec {
    keys: Arc<dyn KeyProvider>,
    clock: Arc<dyn Clock>,
    issuer: String,
}

impl TokenCodec {
    /// Codec issuing tokens as `issuer`
    pub fn new(
        keys: Arc<dyn KeyProvider>,
        clock: Arc<dyn Clock>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            keys,
            clock,
            issuer: issuer.into(),
        }
    }

    /// Issuer placed in `iss`
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    fn base_claims(
        &self,
        kind: TokenKind,
        subject: &str,
        audience: &str,
        ttl: Duration,
    ) -> TokenClaims {
        let now = self.clock.unix_now();
        TokenClaims {
            iss: self.issuer.clone(),
            sub: subject.to_owned(),
            aud: audience.to_owned(),
            exp: now + ttl.num_seconds(),
            iat: now,
            jti: Uuid::new_v4().to_string(),
            token_use: kind.as_str().to_owned(),
            scope: None,
            client_id: None,
            nonce: None,
            auth_time: None,
            act: None,
            extra: Map::new(),
        }
    }

    /// Sign arbitrary claims with the active key
    ///
    /// # Errors
    /// Returns error if the key provider cannot sign
    pub fn sign(&self, claims: TokenClaims) -> AppResult<MintedToken> {
        let token = self.keys.sign(&serde_json::to_value(&claims)?)?;
        Ok(MintedToken { token, claims })
    }

    /// Mint a signed access token
    ///
    /// # Errors
    /// Returns error if signing fails
    pub fn mint_access_token(&self, request: AccessTokenRequest<'_>) -> AppResult<MintedToken> {
        let mut claims =
            self.base_claims(TokenKind::Access, request.subject, request.audience, request.ttl);
        claims.scope = Some(request.scope.to_owned());
        claims.client_id = Some(request.client_id.to_owned());
        claims.act = request.actor;
        self.sign(claims)
    }

    /// Mint a refresh token; its `jti` is what the refresh store tracks
    ///
    /// # Errors
    /// Returns error if signing fails
    pub fn mint_refresh_token(
        &self,
        subject: &str,
        client_id: &str,
        scope: &str,
        ttl: Duration,
    ) -> AppResult<MintedToken> {
        let mut claims = self.base_claims(TokenKind::Refresh, subject, client_id, ttl);
        claims.scope = Some(scope.to_owned());
        claims.client_id = Some(client_id.to_owned());
        self.sign(claims)
    }

    /// Mint an OIDC ID token carrying scope-filtered user claims
    ///
    /// # Errors
    /// Returns error if signing fails
    pub fn mint_id_token(
        &self,
        subject: &str,
        client_id: &str,
        nonce: Option<&str>,
        auth_time: i64,
        user_claims: Map<String, Value>,
        ttl: Duration,
    ) -> AppResult<MintedToken> {
        let mut claims = self.base_claims(TokenKind::Id, subject, client_id, ttl);
        claims.nonce = nonce.map(str::to_owned);
        claims.auth_time = Some(auth_time);
        claims.extra = user_claims;
        self.sign(claims)
    }

    /// Wrap a signed token in the encrypted variant, addressed to this server's key
    ///
    /// # Errors
    /// Returns error if no active key exists or encryption fails
    pub fn encrypt(&self, signed_jwt: &str) -> AppResult<String> {
        let key = self.keys.active_key()?;
        jwe::encrypt(signed_jwt, &key)
    }

    /// Verify a signed token: signature, issuer, type, audience, expiry, issued-at
    ///
    /// # Errors
    /// Returns the first failed check as a [`TokenError`]
    pub fn verify(
        &self,
        token: &str,
        kind: TokenKind,
        audience: Option<&str>,
    ) -> Result<TokenClaims, TokenError> {
        let header = decode_header(token).map_err(|_| TokenError::Malformed)?;
        if header.alg != Algorithm::RS256 {
            return Err(TokenError::InvalidSignature);
        }
        let kid = header.kid.ok_or(TokenError::InvalidSignature)?;
        let key = self.keys.key(&kid).ok_or(TokenError::InvalidSignature)?;

        // Only the signature is checked here; claim checks below use the injected clock
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let claims = decode::<TokenClaims>(token, key.decoding_key(), &validation)
            .map_err(|e| convert_jwt_error(e.kind()))?
            .claims;

        self.check_claims(&claims, kind, audience)?;
        Ok(claims)
    }

    /// Verify a token of either shape. Encrypted tokens are opened and the
    /// nested signed token is then verified in full.
    ///
    /// # Errors
    /// Returns the first failed check as a [`TokenError`]
    pub fn verify_any(
        &self,
        token: &str,
        kind: TokenKind,
        audience: Option<&str>,
    ) -> Result<TokenClaims, TokenError> {
        match sniff_shape(token) {
            TokenShape::Signed => self.verify(token, kind, audience),
            TokenShape::Encrypted => {
                let nested = jwe::decrypt(token, self.keys.as_ref())?;
                self.verify(&nested, kind, audience)
            }
            TokenShape::Unknown => Err(TokenError::Malformed),
        }
    }

    fn check_claims(
        &self,
        claims: &TokenClaims,
        kind: TokenKind,
        audience: Option<&str>,
    ) -> Result<(), TokenError> {
        if claims.iss != self.issuer {
            return Err(TokenError::InvalidIssuer);
        }
        if !claims.is_kind(kind) {
            return Err(TokenError::WrongTokenType);
        }
        if audience.is_some_and(|expected| claims.aud != expected) {
            return Err(TokenError::InvalidAudience);
        }

        let now = self.clock.unix_now();
        // Strict: no skew allowance on expiry
        if claims.exp <= now {
            return Err(TokenError::Expired {
                expired_at: claims.exp,
            });
        }
        if claims.iat > now + ttl::IAT_SKEW_SECS {
            return Err(TokenError::IssuedInFuture);
        }
        Ok(())
    }
}

fn convert_jwt_error(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
        _ => TokenError::Malformed,
    }
}
