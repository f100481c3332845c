// ABOUTME: Compact JWE encryption for the confidential token-exchange variant
// ABOUTME: RSA-OAEP-256 key wrapping with A256GCM content encryption, nested signed JWT
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Compact serialization: `header.encrypted_key.iv.ciphertext.tag`, with the
//! ASCII of the encoded header as additional authenticated data (RFC 7516 §5.1).

use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use gatekeeper_core::errors::{AppError, AppResult};
use rsa::Oaep;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::TokenError;
use crate::jwks::{KeyProvider, RsaKeyPair};

const ALG: &str = "RSA-OAEP-256";
const ENC: &str = "A256GCM";
const TAG_LEN: usize = 16;
const IV_LEN: usize = 12;
const CEK_LEN: usize = 32;

#[derive(Debug, Serialize, Deserialize)]
struct JweHeader {
    alg: String,
    enc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cty: Option<String>,
}

/// Encrypt a signed JWT to `recipient`
///
/// # Errors
/// Returns error if key wrapping or content encryption fails
pub fn encrypt(signed_jwt: &str, recipient: &RsaKeyPair) -> AppResult<String> {
    let header = JweHeader {
        alg: ALG.to_owned(),
        enc: ENC.to_owned(),
        kid: Some(recipient.kid.clone()),
        cty: Some("JWT".to_owned()),
    };
    let encoded_header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);

    let cek = Aes256Gcm::generate_key(&mut OsRng);
    let iv = Aes256Gcm::generate_nonce(&mut OsRng);

    let encrypted_key = recipient
        .public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), cek.as_slice())
        .map_err(|e| AppError::internal(format!("JWE key wrapping failed: {e}")))?;

    let cipher = Aes256Gcm::new(&cek);
    let sealed = cipher
        .encrypt(
            &iv,
            Payload {
                msg: signed_jwt.as_bytes(),
                aad: encoded_header.as_bytes(),
            },
        )
        .map_err(|e| AppError::internal(format!("JWE content encryption failed: {e}")))?;
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    Ok(format!(
        "{encoded_header}.{}.{}.{}.{}",
        URL_SAFE_NO_PAD.encode(encrypted_key),
        URL_SAFE_NO_PAD.encode(iv),
        URL_SAFE_NO_PAD.encode(ciphertext),
        URL_SAFE_NO_PAD.encode(tag)
    ))
}

/// Decrypt a compact JWE addressed to one of `keys`, returning the nested JWT
///
/// # Errors
/// Returns `Malformed` for structural problems and `Decryption` when the
/// content cannot be authenticated
pub fn decrypt(token: &str, keys: &dyn KeyProvider) -> Result<String, TokenError> {
    let parts: Vec<&str> = token.split('.').collect();
    let &[encoded_header, encrypted_key, iv, ciphertext, tag] = parts.as_slice() else {
        return Err(TokenError::Malformed);
    };

    let decode = |part: &str| URL_SAFE_NO_PAD.decode(part).map_err(|_| TokenError::Malformed);
    let header: JweHeader =
        serde_json::from_slice(&decode(encoded_header)?).map_err(|_| TokenError::Malformed)?;
    if header.alg != ALG || header.enc != ENC {
        return Err(TokenError::Decryption);
    }

    let key = match header.kid.as_deref() {
        Some(kid) => keys.key(kid).ok_or(TokenError::Decryption)?,
        None => keys.active_key().map_err(|_| TokenError::Decryption)?,
    };

    let cek = key
        .private_key
        .decrypt(Oaep::new::<Sha256>(), &decode(encrypted_key)?)
        .map_err(|_| TokenError::Decryption)?;
    if cek.len() != CEK_LEN {
        return Err(TokenError::Decryption);
    }
    let iv = decode(iv)?;
    if iv.len() != IV_LEN {
        return Err(TokenError::Malformed);
    }

    let mut sealed = decode(ciphertext)?;
    sealed.extend_from_slice(&decode(tag)?);

    let cipher = Aes256Gcm::new_from_slice(&cek).map_err(|_| TokenError::Decryption)?;
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &sealed,
                aad: encoded_header.as_bytes(),
            },
        )
        .map_err(|_| TokenError::Decryption)?;

    String::from_utf8(plaintext).map_err(|_| TokenError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwks::JwksManager;

    fn manager() -> JwksManager {
        JwksManager::with_active_key(RsaKeyPair::generate_with_key_size(2048).unwrap())
    }

    #[test]
    fn test_encrypt_decrypt() {
        let keys = manager();
        let active = keys.active_key().unwrap();
        let jwe = encrypt("a.b.c", &active).unwrap();
        assert_eq!(jwe.split('.').count(), 5);
        assert!(!jwe.contains("a.b.c"));
        assert_eq!(decrypt(&jwe, &keys).unwrap(), "a.b.c");
    }

    #[test]
    fn test_tampered_header_fails_authentication() {
        let keys = manager();
        let jwe = encrypt("a.b.c", &keys.active_key().unwrap()).unwrap();
        let mut parts: Vec<String> = jwe.split('.').map(str::to_owned).collect();
        let header = format!(
            r#"{{"alg":"RSA-OAEP-256","enc":"A256GCM","kid":"{}","cty":"txt"}}"#,
            keys.active_key().unwrap().kid
        );
        parts[0] = URL_SAFE_NO_PAD.encode(header);
        assert_eq!(decrypt(&parts.join("."), &keys), Err(TokenError::Decryption));
    }

    #[test]
    fn test_foreign_key_cannot_decrypt() {
        let ours = manager();
        let theirs = manager();
        let jwe = encrypt("a.b.c", &theirs.active_key().unwrap()).unwrap();
        assert_eq!(decrypt(&jwe, &ours), Err(TokenError::Decryption));
        assert_eq!(decrypt("a.b.c", &ours), Err(TokenError::Malformed));
    }
}
