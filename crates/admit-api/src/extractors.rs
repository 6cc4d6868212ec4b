//! # Request Extraction & Validation
//!
//! JSON bodies are taken as `Result<Json<T>, JsonRejection>` so that
//! malformed input is rendered through [`AppError`] instead of axum's
//! plain-text rejection. Field rules are checked by the domain types, which
//! report failures per field.

use std::str::FromStr;

use admit_core::FieldErrors;
use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::error::AppError;

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
///
/// ```ignore
/// async fn handler(body: Result<Json<T>, JsonRejection>) -> Result<..., AppError> {
///     let req = extract_json(body)?;
/// }
/// ```
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result.map(|Json(v)| v).map_err(|err| {
        tracing::debug!(error = %err.body_text(), "rejected request body");
        AppError::BadRequest(err.body_text())
    })
}

/// Parse a required text field (multipart part or query value) into an id
/// or enum, reporting problems under `field`.
pub fn required_field<T: FromStr>(
    field: &str,
    raw: Option<&str>,
    invalid: &str,
) -> Result<T, FieldErrors> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| FieldErrors::single(field, "This field is required."))?;
    raw.parse().map_err(|_| FieldErrors::single(field, invalid))
}
