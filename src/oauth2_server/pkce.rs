// ABOUTME: Proof Key for Code Exchange (RFC 7636) challenge validation and verifier checks
// ABOUTME: Only the S256 method is accepted; comparison is constant time
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use gatekeeper_core::constants::limits::{PKCE_VERIFIER_MAX, PKCE_VERIFIER_MIN};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::models::OAuth2Error;

/// The only supported challenge method
pub const S256: &str = "S256";

/// `BASE64URL(SHA256(verifier))`
#[must_use]
pub fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}

/// Check a challenge presented at `/oauth/authorize`
///
/// # Errors
/// Returns `invalid_request` for a non-S256 method or a malformed challenge
pub fn validate_challenge(challenge: &str, method: Option<&str>) -> Result<(), OAuth2Error> {
    if method.unwrap_or(S256) != S256 {
        return Err(OAuth2Error::invalid_request(
            "code_challenge_method must be 'S256'",
        ));
    }
    if !(PKCE_VERIFIER_MIN..=PKCE_VERIFIER_MAX).contains(&challenge.len())
        || !challenge.chars().all(is_unreserved)
    {
        return Err(OAuth2Error::invalid_request(
            "code_challenge must be 43-128 unreserved characters",
        ));
    }
    Ok(())
}

/// Check a token request against the challenge bound to the code
///
/// # Errors
/// Returns `invalid_grant` when a required verifier is missing, malformed, or
/// does not hash to the stored challenge, and when a verifier is sent for a
/// code issued without a challenge
pub fn verify(
    stored_challenge: Option<&str>,
    stored_method: Option<&str>,
    verifier: Option<&str>,
) -> Result<(), OAuth2Error> {
    let Some(challenge) = stored_challenge else {
        if verifier.is_some() {
            return Err(OAuth2Error::invalid_grant(
                "code_verifier provided but no code_challenge was issued",
            ));
        }
        return Ok(());
    };

    let verifier =
        verifier.ok_or_else(|| OAuth2Error::invalid_grant("code_verifier is required (PKCE)"))?;
    if !(PKCE_VERIFIER_MIN..=PKCE_VERIFIER_MAX).contains(&verifier.len())
        || !verifier.chars().all(is_unreserved)
    {
        return Err(OAuth2Error::invalid_grant("Malformed code_verifier"));
    }
    if stored_method.unwrap_or(S256) != S256 {
        return Err(OAuth2Error::invalid_grant(
            "Only S256 code_challenge_method is supported",
        ));
    }

    let computed = s256_challenge(verifier);
    if computed.as_bytes().ct_eq(challenge.as_bytes()).into() {
        Ok(())
    } else {
        Err(OAuth2Error::invalid_grant("Invalid code_verifier"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

    #[test]
    fn test_rfc7636_appendix_b_vector() {
        assert_eq!(
            s256_challenge(VERIFIER),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_only_matching_verifier_passes() {
        let challenge = s256_challenge(VERIFIER);
        assert!(verify(Some(&challenge), Some("S256"), Some(VERIFIER)).is_ok());

        let other = "x".repeat(43);
        let err = verify(Some(&challenge), Some("S256"), Some(&other)).unwrap_err();
        assert_eq!(err.error, "invalid_grant");
        assert!(verify(Some(&challenge), None, None).is_err());
        assert!(verify(None, None, Some(VERIFIER)).is_err());
        assert!(verify(None, None, None).is_ok());
    }

    #[test]
    fn test_challenge_validation() {
        let challenge = s256_challenge(VERIFIER);
        assert!(validate_challenge(&challenge, None).is_ok());
        assert!(validate_challenge(&challenge, Some("plain")).is_err());
        assert!(validate_challenge("short", Some("S256")).is_err());
    }
}
