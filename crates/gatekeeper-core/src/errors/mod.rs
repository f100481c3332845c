// ABOUTME: Unified error type with standard error codes and HTTP status mapping
// ABOUTME: Shared by stores, the authorization engine, and the HTTP layer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Unified Error Handling
//!
//! `AppError` is the infrastructure-facing error of the server. OAuth protocol
//! failures are modelled separately (`OAuth2Error` in the main crate) so that a
//! persistence outage is never reported to a client as a credential problem.

use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Standard error codes used throughout the application
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Authentication & Authorization (1000-1999)
    /// Authentication is required
    #[serde(rename = "AUTH_REQUIRED")]
    AuthRequired = 1000,
    /// Credentials are invalid
    #[serde(rename = "AUTH_INVALID")]
    AuthInvalid = 1001,
    /// Credentials have expired
    #[serde(rename = "AUTH_EXPIRED")]
    AuthExpired = 1002,
    /// Credentials are malformed
    #[serde(rename = "AUTH_MALFORMED")]
    AuthMalformed = 1003,
    /// Caller does not own the resource
    #[serde(rename = "PERMISSION_DENIED")]
    PermissionDenied = 1004,

    // Validation (3000-3999)
    /// Input failed validation
    #[serde(rename = "INVALID_INPUT")]
    InvalidInput = 3000,
    /// Required field missing
    #[serde(rename = "MISSING_REQUIRED_FIELD")]
    MissingRequiredField = 3001,

    // Resource Management (4000-4999)
    /// Resource does not exist
    #[serde(rename = "RESOURCE_NOT_FOUND")]
    ResourceNotFound = 4000,
    /// Resource already exists
    #[serde(rename = "RESOURCE_ALREADY_EXISTS")]
    ResourceAlreadyExists = 4001,

    // Configuration (6000-6999)
    /// Configuration is invalid
    #[serde(rename = "CONFIG_INVALID")]
    ConfigInvalid = 6002,

    // Internal Errors (9000-9999)
    /// Unexpected internal failure
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError = 9000,
    /// Persistence layer failure
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError = 9001,
    /// Key material could not be loaded or used
    #[serde(rename = "KEY_MATERIAL_ERROR")]
    KeyMaterialError = 9002,
    /// Data could not be serialized or deserialized
    #[serde(rename = "SERIALIZATION_ERROR")]
    SerializationError = 9003,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidInput | Self::MissingRequiredField => 400,
            Self::AuthRequired | Self::AuthInvalid | Self::AuthExpired | Self::AuthMalformed => 401,
            Self::PermissionDenied => 403,
            Self::ResourceNotFound => 404,
            Self::ResourceAlreadyExists => 409,
            Self::ConfigInvalid
            | Self::InternalError
            | Self::DatabaseError
            | Self::KeyMaterialError
            | Self::SerializationError => 500,
        }
    }

    /// Get a user-friendly description of this error
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::AuthRequired => "Authentication is required to access this resource",
            Self::AuthInvalid => "The provided authentication credentials are invalid",
            Self::AuthExpired => "The authentication credentials have expired",
            Self::AuthMalformed => "The authentication credentials are malformed",
            Self::PermissionDenied => "You do not have permission to perform this action",
            Self::InvalidInput => "The provided input is invalid",
            Self::MissingRequiredField => "A required field is missing from the request",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::ResourceAlreadyExists => "A resource with this identifier already exists",
            Self::ConfigInvalid => "Configuration is invalid",
            Self::InternalError => "An internal server error occurred",
            Self::DatabaseError => "Database operation failed",
            Self::KeyMaterialError => "Signing key material is unavailable",
            Self::SerializationError => "Data serialization/deserialization failed",
        }
    }

    /// Whether this code describes an infrastructure failure rather than a caller mistake
    #[must_use]
    pub const fn is_infrastructure(self) -> bool {
        self.http_status() >= 500
    }
}

/// Additional context that can be attached to errors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Request ID for tracing
    pub request_id: Option<String>,
    /// User ID if available
    pub user_id: Option<Uuid>,
    /// Resource ID if applicable
    pub resource_id: Option<String>,
}

/// Unified error type for the application
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Additional context
    pub context: ErrorContext,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add a user ID to the error context
    #[must_use]
    pub const fn with_user_id(mut self, user_id: Uuid) -> Self {
        self.context.user_id = Some(user_id);
        self
    }

    /// Add a resource ID to the error context
    #[must_use]
    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.context.resource_id = Some(resource_id.into());
        self
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Authentication required
    #[must_use]
    pub fn auth_required() -> Self {
        Self::new(ErrorCode::AuthRequired, "Authentication required")
    }

    /// Invalid authentication
    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthInvalid, message)
    }

    /// Caller does not own the resource
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    /// Resource not found
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Resource already exists
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceAlreadyExists, message)
    }

    /// Invalid input
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Key material error
    pub fn key_material(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::KeyMaterialError, message)
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalid, message)
    }

    /// Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SerializationError, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// HTTP error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error payload
    pub error: ErrorResponseDetails,
}

/// Error payload of an [`ErrorResponse`]
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponseDetails {
    /// Stable error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Request ID, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        // Infrastructure details stay in the logs
        let message = if error.code.is_infrastructure() {
            error.code.description().to_owned()
        } else {
            error.message.clone()
        };
        Self {
            error: ErrorResponseDetails {
                code: error.code,
                message,
                request_id: error.context.request_id.clone(),
            },
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization(error.to_string()).with_source(error)
    }
}

#[cfg(feature = "database-errors")]
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        Self::database(error.to_string()).with_source(error)
    }
}

#[cfg(feature = "http-response")]
mod http_response {
    use axum::response::{IntoResponse, Response};
    use axum::Json;
    use http::StatusCode;

    use super::{AppError, ErrorResponse};

    impl IntoResponse for AppError {
        fn into_response(self) -> Response {
            let status = StatusCode::from_u16(self.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if self.code.is_infrastructure() {
                tracing::error!(code = ?self.code, error = %self, "Request failed with infrastructure error");
            }
            (status, Json(ErrorResponse::from(&self))).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::AuthRequired.http_status(), 401);
        assert_eq!(ErrorCode::PermissionDenied.http_status(), 403);
        assert_eq!(ErrorCode::ResourceNotFound.http_status(), 404);
        assert_eq!(ErrorCode::DatabaseError.http_status(), 500);
    }

    #[test]
    fn test_infrastructure_message_is_not_leaked() {
        let error = AppError::database("connection refused at 10.0.0.3:5432");
        let response = ErrorResponse::from(&error);
        assert_eq!(response.error.message, "Database operation failed");

        let error = AppError::invalid_input("email is required");
        let response = ErrorResponse::from(&error);
        assert_eq!(response.error.message, "email is required");
    }

    #[test]
    fn test_app_error_context() {
        let user_id = Uuid::new_v4();
        let error = AppError::permission_denied("not yours")
            .with_user_id(user_id)
            .with_resource_id("session-1");
        assert_eq!(error.context.user_id, Some(user_id));
        assert_eq!(error.context.resource_id.as_deref(), Some("session-1"));
    }
}
