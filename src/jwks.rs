// ABOUTME: Key Material Provider holding the RSA keypair used for token signing and encryption
// ABOUTME: kid-indexed key set, PEM persistence across restarts, and JWKS publication
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! JWKS (JSON Web Key Set) Management
//!
//! This module provides:
//! - RSA key pair generation and PKCS#8 PEM persistence
//! - JWKS JSON format for public key distribution
//! - A `KeyProvider` seam indexed by `kid`, so additional keys can be added
//!   for rotation without changing how tokens are signed or verified
//!
//! ## Security Model
//!
//! - Private keys never leave the server
//! - Public keys distributed via `/.well-known/jwks.json`
//! - A missing or unreadable key file is a startup failure, never a degraded mode

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use gatekeeper_core::errors::{AppError, AppResult};
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use rsa::{
    pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding},
    traits::PublicKeyParts,
    RsaPrivateKey, RsaPublicKey,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use zeroize::Zeroizing;

/// JWK (JSON Web Key) representation for JWKS endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type (always "RSA" for RS256)
    pub kty: String,
    /// Public key use (always "sig" for signature)
    #[serde(rename = "use")]
    pub key_use: String,
    /// Key ID for rotation tracking
    pub kid: String,
    /// Algorithm (RS256)
    pub alg: String,
    /// RSA modulus (base64url encoded)
    pub n: String,
    /// RSA exponent (base64url encoded)
    pub e: String,
}

/// JWKS (JSON Web Key Set) container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    /// Array of public keys
    pub keys: Vec<JsonWebKey>,
}

/// RSA key pair with metadata and prepared `jsonwebtoken` keys
pub struct RsaKeyPair {
    /// Unique key identifier
    pub kid: String,
    /// Private key for signing and JWE key unwrapping
    pub private_key: RsaPrivateKey,
    /// Public key for verification and JWE key wrapping
    pub public_key: RsaPublicKey,
    /// Key creation (or load) timestamp
    pub created_at: DateTime<Utc>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaKeyPair")
            .field("kid", &self.kid)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl RsaKeyPair {
    /// Wrap a private key, deriving the public half and a stable `kid`
    ///
    /// # Errors
    /// Returns error if the key cannot be encoded for `jsonwebtoken`
    pub fn from_private_key(private_key: RsaPrivateKey) -> AppResult<Self> {
        let public_key = RsaPublicKey::from(&private_key);

        let private_pem = Zeroizing::new(
            private_key
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| AppError::key_material(format!("PEM export failed: {e}")))?
                .to_string(),
        );
        let public_der = public_key
            .to_public_key_der()
            .map_err(|e| AppError::key_material(format!("DER export failed: {e}")))?;
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AppError::key_material(format!("PEM export failed: {e}")))?;

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| AppError::key_material(format!("Invalid signing key: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| AppError::key_material(format!("Invalid verification key: {e}")))?;

        // First 16 hex chars of the SPKI digest: stable for the same key across restarts
        let kid = hex::encode(Sha256::digest(public_der.as_bytes()))[..16].to_owned();

        Ok(Self {
            kid,
            private_key,
            public_key,
            created_at: Utc::now(),
            encoding_key,
            decoding_key,
        })
    }

    /// Generate RSA key pair with configurable key size
    ///
    /// # Errors
    /// Returns error if key generation fails
    pub fn generate_with_key_size(key_size_bits: usize) -> AppResult<Self> {
        let mut rng = rand::rngs::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, key_size_bits)
            .map_err(|e| AppError::key_material(format!("RSA key generation failed: {e}")))?;
        Self::from_private_key(private_key)
    }

    /// Import private key from PEM
    ///
    /// # Errors
    /// Returns error if PEM parsing fails
    pub fn import_private_key_pem(pem: &str) -> AppResult<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| AppError::key_material(format!("Failed to parse private key PEM: {e}")))?;
        Self::from_private_key(private_key)
    }

    /// Export private key as PEM
    ///
    /// # Errors
    /// Returns error if PEM encoding fails
    pub fn export_private_key_pem(&self) -> AppResult<Zeroizing<String>> {
        self.private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| Zeroizing::new(pem.to_string()))
            .map_err(|e| AppError::key_material(format!("Failed to export private key: {e}")))
    }

    /// Convert public key to JWK format
    #[must_use]
    pub fn to_jwk(&self) -> JsonWebKey {
        JsonWebKey {
            kty: "RSA".to_owned(),
            key_use: "sig".to_owned(),
            kid: self.kid.clone(),
            alg: "RS256".to_owned(),
            n: URL_SAFE_NO_PAD.encode(self.public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(self.public_key.e().to_bytes_be()),
        }
    }

    /// Prepared key for RS256 signing
    #[must_use]
    pub const fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// Prepared key for RS256 verification
    #[must_use]
    pub const fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// Source of signing, verification and encryption keys
///
/// Implementations index keys by `kid`. Callers sign with the active key and
/// verify with whichever key a token names.
pub trait KeyProvider: Send + Sync {
    /// Key currently used for signing and encryption
    ///
    /// # Errors
    /// Returns error if no active key is available
    fn active_key(&self) -> AppResult<Arc<RsaKeyPair>>;

    /// Key with the given `kid`, active or retained
    fn key(&self, kid: &str) -> Option<Arc<RsaKeyPair>>;

    /// Public keys for distribution
    fn public_key_set(&self) -> JsonWebKeySet;

    /// Sign a claims object as an RS256 JWT carrying the active `kid`
    ///
    /// # Errors
    /// Returns error if no active key exists or encoding fails
    fn sign(&self, claims: &Value) -> AppResult<String> {
        let key = self.active_key()?;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.kid.clone());
        encode(&header, claims, key.encoding_key())
            .map_err(|e| AppError::key_material(format!("Failed to sign JWT: {e}")))
    }
}

/// In-process JWKS manager
pub struct JwksManager {
    /// All keys (active and historical)
    keys: HashMap<String, Arc<RsaKeyPair>>,
    /// Currently active key ID for signing
    active_key_id: Option<String>,
}

impl JwksManager {
    /// Create an empty JWKS manager
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys: HashMap::new(),
            active_key_id: None,
        }
    }

    /// Manager with a single active key
    #[must_use]
    pub fn with_active_key(key: RsaKeyPair) -> Self {
        let mut manager = Self::new();
        manager.register(key, true);
        manager
    }

    /// Register a key, optionally making it the active signing key
    pub fn register(&mut self, key: RsaKeyPair, active: bool) {
        let kid = key.kid.clone();
        if active {
            self.active_key_id = Some(kid.clone());
        }
        self.keys.insert(kid, Arc::new(key));
    }

    /// Load the signing key from `path`, generating and persisting one when absent
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be parsed, or if a new key
    /// cannot be generated or written
    pub fn load_or_generate(path: &Path, key_size_bits: usize) -> AppResult<Self> {
        if path.exists() {
            let pem = Zeroizing::new(fs::read_to_string(path).map_err(|e| {
                AppError::key_material(format!("Cannot read {}: {e}", path.display()))
            })?);
            let key = RsaKeyPair::import_private_key_pem(&pem)?;
            info!(kid = %key.kid, path = %path.display(), "Loaded signing key");
            return Ok(Self::with_active_key(key));
        }

        warn!(path = %path.display(), bits = key_size_bits, "No signing key found, generating");
        let key = RsaKeyPair::generate_with_key_size(key_size_bits)?;
        write_private_key(path, &key.export_private_key_pem()?)?;
        info!(kid = %key.kid, path = %path.display(), "Generated and saved signing key");
        Ok(Self::with_active_key(key))
    }
}

impl Default for JwksManager {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyProvider for JwksManager {
    fn active_key(&self) -> AppResult<Arc<RsaKeyPair>> {
        let kid = self
            .active_key_id
            .as_ref()
            .ok_or_else(|| AppError::key_material("No active signing key"))?;
        self.keys
            .get(kid)
            .cloned()
            .ok_or_else(|| AppError::key_material(format!("Active key not found: {kid}")))
    }

    fn key(&self, kid: &str) -> Option<Arc<RsaKeyPair>> {
        self.keys.get(kid).cloned()
    }

    fn public_key_set(&self) -> JsonWebKeySet {
        let mut keys: Vec<JsonWebKey> = self.keys.values().map(|k| k.to_jwk()).collect();
        keys.sort_by(|a, b| a.kid.cmp(&b.kid));
        JsonWebKeySet { keys }
    }
}

fn write_private_key(path: &Path, pem: &str) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::key_material(format!("Cannot create {}: {e}", parent.display()))
        })?;
    }
    fs::write(path, pem)
        .map_err(|e| AppError::key_material(format!("Cannot write {}: {e}", path.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| {
            AppError::key_material(format!("Cannot restrict {}: {e}", path.display()))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{decode, decode_header, Validation};
    use serde_json::json;

    use super::*;

    #[test]
    fn test_key_persists_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("signing_key.pem");

        let first = JwksManager::load_or_generate(&path, 2048).unwrap();
        assert!(path.exists());
        let second = JwksManager::load_or_generate(&path, 2048).unwrap();

        assert_eq!(
            first.active_key().unwrap().kid,
            second.active_key().unwrap().kid
        );
        assert_eq!(first.public_key_set(), second.public_key_set());
    }

    #[test]
    fn test_corrupt_key_file_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signing_key.pem");
        fs::write(&path, "not a key").unwrap();
        assert!(JwksManager::load_or_generate(&path, 2048).is_err());
    }

    #[test]
    fn test_sign_carries_kid_and_verifies() {
        let manager =
            JwksManager::with_active_key(RsaKeyPair::generate_with_key_size(2048).unwrap());
        let token = manager.sign(&json!({"sub": "u1", "exp": 4_102_444_800_i64})).unwrap();

        let kid = decode_header(&token).unwrap().kid.unwrap();
        let key = manager.key(&kid).unwrap();
        let mut validation = Validation::new(Algorithm::RS256);
        validation.required_spec_claims.clear();
        let data = decode::<Value>(&token, key.decoding_key(), &validation).unwrap();
        assert_eq!(data.claims["sub"], "u1");

        let jwks = manager.public_key_set();
        assert_eq!(jwks.keys.len(), 1);
        assert_eq!(jwks.keys[0].kid, kid);
        assert_eq!(jwks.keys[0].alg, "RS256");
    }
}
