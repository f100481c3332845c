// ABOUTME: OAuth 2.0 dynamic client registration (RFC 7591) and client authentication
// ABOUTME: Argon2id-hashed secrets, strict redirect URI rules, declared grant and scope limits
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose, Engine as _};
use gatekeeper_core::constants::grant_types;
use gatekeeper_core::errors::{AppError, AppResult, ErrorCode};
use gatekeeper_core::models::OAuth2Client;
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::models::{ClientRegistrationRequest, ClientRegistrationResponse, OAuth2Error};
use crate::scopes::{parse_scope, ScopeRegistry};
use crate::stores::ClientStore;
use crate::utils::clock::Clock;

/// OAuth 2.0 Client Registration Manager
#[derive(Clone)]
pub struct ClientRegistrationManager {
    clients: Arc<dyn ClientStore>,
    scopes: Arc<ScopeRegistry>,
    clock: Arc<dyn Clock>,
}

impl ClientRegistrationManager {
    /// Creates a new client registration manager
    #[must_use]
    pub fn new(
        clients: Arc<dyn ClientStore>,
        scopes: Arc<ScopeRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            clients,
            scopes,
            clock,
        }
    }

    /// Register a new OAuth 2.0 client (RFC 7591)
    ///
    /// # Errors
    /// Returns `invalid_redirect_uri` / `invalid_client_metadata` for bad
    /// metadata and `server_error` if the client cannot be stored
    pub async fn register_client(
        &self,
        request: ClientRegistrationRequest,
    ) -> Result<ClientRegistrationResponse, OAuth2Error> {
        self.validate_registration_request(&request)?;

        let client_id = Self::generate_client_id();
        let client_secret = Self::generate_client_secret()?;
        let client_secret_hash = Self::hash_client_secret(&client_secret)?;

        // Only authorization_code (+ refresh) unless the client asks for more
        let grant_types = request.grant_types.unwrap_or_else(|| {
            vec![
                grant_types::AUTHORIZATION_CODE.to_owned(),
                grant_types::REFRESH_TOKEN.to_owned(),
            ]
        });
        let response_types = request
            .response_types
            .unwrap_or_else(|| vec!["code".to_owned()]);

        let created_at = self.clock.now();
        let client = OAuth2Client {
            client_id: client_id.clone(),
            client_secret_hash,
            redirect_uris: request.redirect_uris,
            post_logout_redirect_uris: request.post_logout_redirect_uris,
            grant_types,
            response_types,
            client_name: request.client_name,
            client_uri: request.client_uri,
            scope: request.scope,
            created_at,
            expires_at: None,
        };

        self.clients.create_client(&client).await.map_err(|e| {
            error!(error = %e, client_id = %client_id, "Failed to store OAuth2 client registration");
            OAuth2Error::server_error()
        })?;
        info!(client_id = %client_id, "Registered OAuth2 client");

        Ok(ClientRegistrationResponse {
            client_id,
            client_secret,
            client_id_issued_at: created_at.timestamp(),
            client_secret_expires_at: 0,
            redirect_uris: client.redirect_uris,
            post_logout_redirect_uris: client.post_logout_redirect_uris,
            grant_types: client.grant_types,
            response_types: client.response_types,
            client_name: client.client_name,
            client_uri: client.client_uri,
            scope: client.scope,
        })
    }

    /// Validate client credentials
    ///
    /// Unknown clients, wrong secrets, and expired clients all yield the same
    /// `invalid_client`.
    ///
    /// # Errors
    /// Returns `invalid_client` on any authentication failure, `server_error`
    /// if the store is unavailable
    pub async fn validate_client(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<OAuth2Client, OAuth2Error> {
        debug!("Validating OAuth client: {}", client_id);

        let Some(client) = self.clients.get_client(client_id).await? else {
            warn!("OAuth client {} not found", client_id);
            return Err(OAuth2Error::invalid_client());
        };

        Self::verify_client_secret(client_id, client_secret, &client.client_secret_hash).await?;

        if client.is_expired(self.clock.now()) {
            warn!("OAuth client {} has expired", client_id);
            return Err(OAuth2Error::invalid_client());
        }

        debug!("OAuth client {} validated successfully", client_id);
        Ok(client)
    }

    /// Get client by `client_id`
    ///
    /// # Errors
    /// Returns error if the store is unavailable
    pub async fn get_client(&self, client_id: &str) -> AppResult<Option<OAuth2Client>> {
        self.clients.get_client(client_id).await
    }

    /// Verify client secret using Argon2 off the async executor
    async fn verify_client_secret(
        client_id: &str,
        client_secret: &str,
        client_secret_hash: &str,
    ) -> Result<(), OAuth2Error> {
        let secret = client_secret.to_owned();
        let hash = client_secret_hash.to_owned();
        let verified = tokio::task::spawn_blocking(move || {
            PasswordHash::new(&hash).is_ok_and(|parsed| {
                Argon2::default()
                    .verify_password(secret.as_bytes(), &parsed)
                    .is_ok()
            })
        })
        .await
        .unwrap_or(false);

        if verified {
            Ok(())
        } else {
            warn!("OAuth client {} secret validation failed", client_id);
            Err(OAuth2Error::invalid_client())
        }
    }

    fn validate_registration_request(
        &self,
        request: &ClientRegistrationRequest,
    ) -> Result<(), OAuth2Error> {
        if request.redirect_uris.is_empty() {
            return Err(OAuth2Error::invalid_redirect_uri(
                "At least one redirect_uri is required",
            ));
        }
        for uri in request
            .redirect_uris
            .iter()
            .chain(&request.post_logout_redirect_uris)
        {
            if !Self::is_valid_redirect_uri(uri) {
                return Err(OAuth2Error::invalid_redirect_uri(&format!(
                    "Invalid redirect_uri: {uri}"
                )));
            }
        }

        if let Some(requested) = &request.grant_types {
            if let Some(unsupported) = requested
                .iter()
                .find(|g| !grant_types::SUPPORTED.contains(&g.as_str()))
            {
                return Err(OAuth2Error::invalid_client_metadata(&format!(
                    "Unsupported grant_type: {unsupported}"
                )));
            }
        }

        if let Some(response_types) = &request.response_types {
            if response_types.iter().any(|r| r != "code") {
                return Err(OAuth2Error::invalid_client_metadata(
                    "Only the 'code' response_type is supported",
                ));
            }
        }

        if let Some(scope) = &request.scope {
            let unknown = self.scopes.unknown_scopes(&parse_scope(scope));
            if !unknown.is_empty() {
                return Err(OAuth2Error::invalid_client_metadata(&format!(
                    "Unknown scope: {}",
                    unknown.join(" ")
                )));
            }
        }

        Ok(())
    }

    /// Absolute, fragment-free, wildcard-free; https or loopback http
    fn is_valid_redirect_uri(uri: &str) -> bool {
        if uri.trim().is_empty() || uri.contains('#') || uri.contains('*') {
            warn!("Rejected redirect_uri: {}", uri);
            return false;
        }

        let Ok(parsed) = url::Url::parse(uri) else {
            warn!("Rejected malformed redirect_uri: {}", uri);
            return false;
        };

        let is_loopback = matches!(
            parsed.host_str(),
            Some("localhost" | "127.0.0.1" | "[::1]")
        );
        match parsed.scheme() {
            "https" => true,
            "http" if is_loopback => true,
            _ => {
                warn!(
                    "Rejected redirect_uri with non-HTTPS scheme for non-loopback host: {}",
                    uri
                );
                false
            }
        }
    }

    fn generate_client_id() -> String {
        format!("gk_client_{}", Uuid::new_v4().simple())
    }

    /// Generate a client secret from the system RNG
    ///
    /// # Errors
    /// Returns `server_error` if the system RNG fails
    pub fn generate_client_secret() -> Result<String, OAuth2Error> {
        let rng = SystemRandom::new();
        let mut secret = [0u8; 32];
        rng.fill(&mut secret).map_err(|e| {
            error!(error = ?e, "System RNG failure - cannot generate client secret");
            OAuth2Error::server_error()
        })?;
        Ok(general_purpose::URL_SAFE_NO_PAD.encode(secret))
    }

    /// Hash a client secret for storage using Argon2id with a random salt
    ///
    /// # Errors
    /// Returns `server_error` if hashing fails
    pub fn hash_client_secret(secret: &str) -> Result<String, OAuth2Error> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| {
                OAuth2Error::from(AppError::new(
                    ErrorCode::InternalError,
                    format!("Argon2 password hashing failed: {e}"),
                ))
            })
    }
}
