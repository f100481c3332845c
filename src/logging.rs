// ABOUTME: Logging configuration and structured logging setup for observability and debugging
// ABOUTME: Configures log levels, formatters, and structured auth/OAuth/security event helpers
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Production-ready logging configuration with structured output

use std::env;
use std::io;

use anyhow::Result;
use tracing::{info, warn, Level};
use tracing_subscriber::{
    filter::Directive,
    fmt::{self, format::FmtSpan},
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Service name reported in startup logs
const SERVICE_NAME: &str = "gatekeeper-oidc";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Include source file and line numbers
    pub include_location: bool,
    /// Emit span open/close events
    pub include_spans: bool,
    /// Deployment environment, reported at startup
    pub environment: String,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// `JSON` lines for log shippers
    Json,
    /// Multi-field human format
    Pretty,
    /// Single-line human format
    Compact,
}

impl LogFormat {
    /// Parse the `LOG_FORMAT` value, defaulting to pretty
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("json") => Self::Json,
            Some("compact") => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
            include_location: false,
            include_spans: false,
            environment: "development".into(),
        }
    }
}

type FilteredRegistry = Layered<EnvFilter, Registry>;

impl LoggingConfig {
    /// Create logging configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());
        let is_production = environment == "production";
        // Production defaults to JSON with locations; both can be overridden
        let format = env::var("LOG_FORMAT").ok();
        let format = match format.as_deref() {
            None if is_production => LogFormat::Json,
            other => LogFormat::parse(other),
        };

        Self {
            level: env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
            format,
            include_location: is_production || env::var("LOG_INCLUDE_LOCATION").is_ok(),
            include_spans: env::var("LOG_INCLUDE_SPANS").is_ok(),
            environment,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let directive = |raw: &str, fallback: Level| -> Directive {
            raw.parse().unwrap_or_else(|_| fallback.into())
        };

        EnvFilter::new(&self.level)
            // Dependency noise stays capped whatever RUST_LOG says
            .add_directive(directive("hyper=warn", Level::WARN))
            .add_directive(directive("sqlx::query=warn", Level::WARN))
            .add_directive(directive("tower_http=info", Level::INFO))
    }

    fn output_layer(&self) -> Box<dyn Layer<FilteredRegistry> + Send + Sync> {
        let span_events = if self.include_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let layer = fmt::layer()
            .with_file(self.include_location)
            .with_line_number(self.include_location)
            .with_span_events(span_events)
            .with_writer(io::stdout);

        match self.format {
            LogFormat::Json => layer.json().boxed(),
            LogFormat::Pretty => layer.boxed(),
            LogFormat::Compact => layer.compact().with_target(false).boxed(),
        }
    }

    /// Initialize the global tracing subscriber
    ///
    /// # Errors
    ///
    /// Returns an error if a global subscriber was already installed
    pub fn init(&self) -> Result<()> {
        tracing_subscriber::registry()
            .with(self.env_filter())
            .with(self.output_layer())
            .try_init()?;

        info!(
            service.name = SERVICE_NAME,
            service.version = env!("CARGO_PKG_VERSION"),
            environment = %self.environment,
            log.level = %self.level,
            log.format = ?self.format,
            "Gatekeeper OIDC starting up"
        );
        Ok(())
    }
}

/// Initialize logging from environment
///
/// # Errors
///
/// Returns an error if logging initialization fails
pub fn init_from_env() -> Result<()> {
    LoggingConfig::from_env().init()
}

/// Severity attached to security events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecuritySeverity {
    /// Expected in normal traffic, worth recording
    Low,
    /// Possible misuse
    Medium,
    /// Likely attack or invariant violation
    High,
}

impl SecuritySeverity {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Application-specific logging utilities
pub struct AppLogger;

impl AppLogger {
    /// Log user authentication events
    pub fn log_auth_event(user_id: &str, event: &str, success: bool, details: Option<&str>) {
        info!(
            user.id = %user_id,
            auth.event = %event,
            auth.success = %success,
            auth.details = details.unwrap_or(""),
            "Authentication event"
        );
    }

    /// Log `OAuth` protocol events
    pub fn log_oauth_event(client_id: &str, event: &str, success: bool, user_id: Option<&str>) {
        info!(
            oauth.client_id = %client_id,
            oauth.event = %event,
            oauth.success = %success,
            user.id = user_id.unwrap_or("none"),
            "OAuth event"
        );
    }

    /// Log security events
    pub fn log_security_event(
        event_type: &str,
        severity: SecuritySeverity,
        details: &str,
        user_id: Option<&str>,
    ) {
        warn!(
            security.event = %event_type,
            security.severity = %severity.as_str(),
            security.details = %details,
            user.id = user_id.unwrap_or("unknown"),
            "Security event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("compact")), LogFormat::Compact);
        assert_eq!(LogFormat::parse(Some("pretty")), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(None), LogFormat::Pretty);
    }

    #[test]
    fn test_defaults_are_quiet_and_human_readable() {
        let config = LoggingConfig::default();
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(!config.include_location);
        assert!(!config.include_spans);
    }
}
