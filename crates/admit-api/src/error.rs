//! # API Error Types
//!
//! [`AppError`] implements `axum::response::IntoResponse` and maps the
//! domain errors of `admit-state` and the lifecycle service onto HTTP
//! status codes.
//!
//! Two body shapes are produced:
//!
//! - `{"error": "<message>"}` for precondition, permission, conflict and
//!   not-found failures;
//! - `{"<field>": ["<message>", ...]}` for field-level validation.
//!
//! Permission failures always render the generic `Permission denied`
//! message, and 5xx details are logged but never returned.

use admit_core::FieldErrors;
use admit_state::{ApplicationError, CatalogError, DocumentError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::lifecycle::LifecycleError;

/// Generic message for every 403 response.
pub const PERMISSION_DENIED: &str = "Permission denied";

/// JSON body for non-field errors.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("{0}")]
    NotFound(String),

    /// Precondition or business-rule failure (400, `{error}` body).
    #[error("{0}")]
    Validation(String),

    /// Field-keyed validation failure (400, field map body).
    #[error("{}", .0.joined())]
    Fields(FieldErrors),

    /// Request body could not be parsed (400).
    #[error("{0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("{0}")]
    Unauthorized(String),

    /// Insufficient permissions (403). The detail is logged only.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Conflict with current resource state (409).
    #[error("{0}")]
    Conflict(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and a short machine-readable label.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::Fields(_) => (StatusCode::BAD_REQUEST, "FIELD_ERRORS"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::Forbidden(detail.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::Forbidden(detail) => tracing::info!(detail = %detail, "permission denied"),
            Self::Fields(fields) => {
                tracing::debug!(code, errors = %fields.joined(), "field validation failed")
            }
            _ => {}
        }

        if let Self::Fields(fields) = self {
            return (status, Json(fields)).into_response();
        }

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::Forbidden(_) => PERMISSION_DENIED.to_string(),
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<ApplicationError> for AppError {
    fn from(err: ApplicationError) -> Self {
        match err {
            ApplicationError::RoleNotPermitted { .. }
            | ApplicationError::NotOwner
            | ApplicationError::NotEditable { .. } => Self::Forbidden(err.to_string()),
            ApplicationError::Invalid(fields) => Self::Fields(fields),
            ApplicationError::DocumentNotFound(_) => Self::NotFound("Document not found".into()),
            ApplicationError::Incomplete { ref missing } => {
                tracing::info!(missing = %missing.join("; "), "submission refused");
                Self::Validation(err.to_string())
            }
            ApplicationError::AlreadySubmitted
            | ApplicationError::InvalidTransition { .. }
            | ApplicationError::TerminalState { .. }
            | ApplicationError::SameStatus { .. }
            | ApplicationError::UnknownStatus(_)
            | ApplicationError::Document(_) => Self::Validation(err.to_string()),
        }
    }
}

impl From<DocumentError> for AppError {
    fn from(err: DocumentError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Invalid(fields) => Self::Fields(fields),
            CatalogError::DuplicateDepartmentCode(_)
            | CatalogError::DuplicateProgramCode(_)
            | CatalogError::DepartmentInUse { .. } => Self::Conflict(err.to_string()),
            CatalogError::DepartmentNotFound(_) => Self::NotFound("Department not found".into()),
            CatalogError::ProgramNotFound(_) => Self::NotFound("Program not found".into()),
            CatalogError::RequirementNotFound(_) => {
                Self::NotFound("Document requirement not found".into())
            }
        }
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::ApplicationNotFound => Self::NotFound(err.to_string()),
            LifecycleError::DocumentNotFound => Self::NotFound(err.to_string()),
            LifecycleError::AlreadyApplied | LifecycleError::ProgramInUse => {
                Self::Conflict(err.to_string())
            }
            LifecycleError::Invalid(fields) => Self::Fields(fields),
            LifecycleError::Application(e) => e.into(),
            LifecycleError::Catalog(e) => e.into(),
            LifecycleError::Storage(_) | LifecycleError::Database(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}
