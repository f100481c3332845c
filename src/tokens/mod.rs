// ABOUTME: Token Codec for access, refresh, and ID tokens plus the encrypted variant
// ABOUTME: Typed verification errors mapped onto OAuth invalid_token / token_expired
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Token Codec
//!
//! Tokens are RS256 JWTs signed by the [`KeyProvider`](crate::jwks::KeyProvider).
//! Exchanged tokens may additionally be wrapped in a compact JWE addressed to
//! the server's own key. The server never stores access or ID tokens.

/// Claim set shared by every token shape
pub mod claims;
/// Minting and verification
pub mod codec;
/// Compact JWE (`RSA-OAEP-256` + `A256GCM`)
pub mod jwe;

pub use claims::{Actor, TokenClaims, TokenKind};
pub use codec::{sniff_shape, AccessTokenRequest, MintedToken, TokenCodec, TokenShape};

use thiserror::Error;

/// Why an inbound token was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Not a structurally valid token
    #[error("Token is malformed")]
    Malformed,
    /// Signature did not verify or names an unknown key
    #[error("Token signature is invalid")]
    InvalidSignature,
    /// `exp` is not after the verification time
    #[error("Token expired at {expired_at}")]
    Expired {
        /// `exp` claim of the rejected token
        expired_at: i64,
    },
    /// `aud` does not name the expected party
    #[error("Token audience mismatch")]
    InvalidAudience,
    /// `iss` is not this server
    #[error("Token issuer mismatch")]
    InvalidIssuer,
    /// A refresh token was presented as an access token or vice versa
    #[error("Unexpected token type")]
    WrongTokenType,
    /// `iat` lies beyond the tolerated clock skew
    #[error("Token issued in the future")]
    IssuedInFuture,
    /// The encrypted variant could not be opened
    #[error("Token could not be decrypted")]
    Decryption,
}

impl TokenError {
    /// OAuth error code reported to callers
    #[must_use]
    pub const fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::Expired { .. } => "token_expired",
            _ => "invalid_token",
        }
    }
}
