// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Handles environment variables, deployment modes, and runtime configuration parsing
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Environment-based configuration management for production deployment

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use gatekeeper_core::constants::{limits, ports, ttl};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::oauth::{FingerprintPolicy, OAuth2ServerConfig, RefreshTokenPolicy};

/// Environment type for security and other configurations
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development
    #[default]
    Development,
    /// Production deployment
    Production,
    /// Automated tests
    Testing,
}

impl Environment {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Check if this is a production environment
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// Type-safe persistence backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseUrl {
    /// Process-local maps, lost on restart
    Memory,
    /// SQLite database with file path
    SQLite {
        /// Database file
        path: PathBuf,
    },
    /// In-memory SQLite
    SQLiteMemory,
}

impl DatabaseUrl {
    /// Parse from string with validation
    ///
    /// # Errors
    ///
    /// Returns an error for unsupported schemes
    pub fn parse_url(s: &str) -> Result<Self> {
        if s == "memory" {
            return Ok(Self::Memory);
        }
        match s.strip_prefix("sqlite:") {
            Some(":memory:") => Ok(Self::SQLiteMemory),
            Some(path) if !path.is_empty() => Ok(Self::SQLite {
                path: PathBuf::from(path.trim_start_matches("//")),
            }),
            _ => Err(anyhow!("Unsupported DATABASE_URL: {s}")),
        }
    }

    /// Convert to connection string
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        match self {
            Self::Memory => "memory".to_owned(),
            Self::SQLite { path } => format!("sqlite:{}", path.display()),
            Self::SQLiteMemory => "sqlite::memory:".to_owned(),
        }
    }

    /// Check if this is the in-process map backend
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

impl Default for DatabaseUrl {
    fn default() -> Self {
        Self::Memory
    }
}

impl fmt::Display for DatabaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_connection_string())
    }
}

/// Signing key material location
#[derive(Debug, Clone)]
pub struct KeyConfig {
    /// PKCS#8 PEM file, generated when missing
    pub signing_key_path: PathBuf,
    /// Modulus size for generated keys
    pub rsa_key_bits: usize,
}

/// SSO cookie attributes
#[derive(Debug, Clone, Copy)]
pub struct CookieConfig {
    /// Emit the `Secure` attribute
    pub secure: bool,
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP API port
    pub http_port: u16,
    /// Deployment environment
    pub environment: Environment,
    /// Persistence backend
    pub database: DatabaseUrl,
    /// Key material
    pub keys: KeyConfig,
    /// Protocol settings
    pub oauth: OAuth2ServerConfig,
    /// Cookie attributes
    pub cookies: CookieConfig,
    /// Expiry sweeper tick
    pub sweep_interval: StdDuration,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is present but malformed
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        let http_port: u16 = parse_env("HTTP_PORT", ports::DEFAULT_HTTP_PORT)?;
        let environment =
            Environment::from_str_or_default(&env_var_or("ENVIRONMENT", "development"));
        let issuer_url = env_var_or("OAUTH2_ISSUER_URL", &format!("http://localhost:{http_port}"));

        let mut oauth = OAuth2ServerConfig::for_issuer(&issuer_url);
        oauth.access_token_ttl = env_seconds("ACCESS_TOKEN_TTL_SECS", ttl::ACCESS_TOKEN_SECS)?;
        oauth.refresh_token_ttl = env_days("REFRESH_TOKEN_TTL_DAYS", ttl::REFRESH_TOKEN_DAYS)?;
        oauth.auth_code_ttl = env_seconds("AUTH_CODE_TTL_SECS", ttl::AUTH_CODE_SECS)?;
        oauth.flow_session_ttl = env_seconds("FLOW_SESSION_TTL_SECS", ttl::FLOW_SESSION_SECS)?;
        oauth.sso_session_ttl = env_days("SSO_SESSION_TTL_DAYS", ttl::SSO_SESSION_DAYS)?;
        oauth.consent_ttl = match env_days("CONSENT_TTL_DAYS", ttl::CONSENT_DAYS)? {
            days if days == Duration::zero() => None,
            days => Some(days),
        };
        oauth.fingerprint_policy = parse_policy::<FingerprintPolicy>("SSO_FINGERPRINT_POLICY")?;
        oauth.refresh_token_policy = parse_policy::<RefreshTokenPolicy>("REFRESH_TOKEN_POLICY")?;
        oauth.login_page_url = env_var_or("LOGIN_PAGE_URL", "/login");
        oauth.consent_page_url = env_var_or("CONSENT_PAGE_URL", "/consent");
        oauth.extra_scopes = parse_list(&env_var_or("EXTRA_SCOPES", ""));

        let config = Self {
            http_port,
            environment,
            database: DatabaseUrl::parse_url(&env_var_or("DATABASE_URL", "memory"))?,
            keys: KeyConfig {
                signing_key_path: PathBuf::from(env_var_or(
                    "SIGNING_KEY_PATH",
                    "./data/signing_key.pem",
                )),
                rsa_key_bits: parse_env("RSA_KEY_SIZE", limits::DEFAULT_RSA_KEY_BITS)?,
            },
            oauth,
            cookies: CookieConfig {
                secure: parse_env("COOKIE_SECURE", environment.is_production())?,
            },
            sweep_interval: StdDuration::from_secs(parse_env(
                "SWEEP_INTERVAL_SECS",
                ttl::SWEEP_INTERVAL_SECS,
            )?),
        };

        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error for values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.keys.rsa_key_bits < 2048 {
            return Err(anyhow!("RSA_KEY_SIZE must be at least 2048"));
        }
        if self.oauth.access_token_ttl <= Duration::zero()
            || self.oauth.auth_code_ttl <= Duration::zero()
            || self.oauth.flow_session_ttl <= Duration::zero()
        {
            return Err(anyhow!("Token and session lifetimes must be positive"));
        }
        if self.sweep_interval.is_zero() {
            return Err(anyhow!("SWEEP_INTERVAL_SECS must be positive"));
        }
        if self.environment.is_production() {
            if !self.cookies.secure {
                warn!("COOKIE_SECURE is disabled in production");
            }
            if self.oauth.issuer_url.starts_with("http://") {
                warn!("Issuer URL is not HTTPS in production: {}", self.oauth.issuer_url);
            }
        }
        Ok(())
    }

    /// Get a summary of the configuration for logging (without secrets)
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Gatekeeper OIDC Configuration:\n\
             - HTTP Port: {}\n\
             - Environment: {}\n\
             - Issuer: {}\n\
             - Database: {}\n\
             - Signing Key: {}\n\
             - Fingerprint Policy: {:?}\n\
             - Refresh Token Policy: {:?}",
            self.http_port,
            self.environment,
            self.oauth.issuer_url,
            self.database,
            self.keys.signing_key_path.display(),
            self.oauth.fingerprint_policy,
            self.oauth.refresh_token_policy,
        )
    }
}

/// Get environment variable or default value
fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Lifetime in whole seconds
fn env_seconds(key: &str, default: i64) -> Result<Duration> {
    let secs = parse_env(key, default)?;
    representable(key, secs, Duration::try_seconds(secs))
}

/// Lifetime in whole days
fn env_days(key: &str, default: i64) -> Result<Duration> {
    let days = parse_env(key, default)?;
    representable(key, days, Duration::try_days(days))
}

/// Reject lifetimes that overflow `chrono` or push an expiry off the calendar
fn representable(key: &str, raw: i64, lifetime: Option<Duration>) -> Result<Duration> {
    lifetime
        .filter(|ttl| Utc::now().checked_add_signed(*ttl).is_some())
        .ok_or_else(|| anyhow!("{key} is out of range: {raw}"))
}

/// Parse an environment variable, falling back to `default` when unset
fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key} value: {raw}")),
        Err(_) => Ok(default),
    }
}

fn parse_policy<T>(key: &str) -> Result<T>
where
    T: FromStr<Err = String> + Default,
{
    env::var(key).map_or_else(
        |_| Ok(T::default()),
        |raw| raw.parse().map_err(|e| anyhow!("{key}: {e}")),
    )
}

/// Parse comma-separated values
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}
