//! # Document API
//!
//! Multipart upload of one file per document requirement, and staff
//! verification. The upload route carries its own body limit
//! (`ADMIT_MAX_UPLOAD_BYTES`); per-requirement size and format rules are
//! enforced by the lifecycle.

use admit_core::{ApplicationId, DocumentId, FieldErrors, RequirementId};
use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_json, required_field};
use crate::state::AppState;
use crate::views::DocumentView;

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyDocumentRequest {
    pub verified: bool,
    #[serde(default)]
    pub notes: String,
}

/// Multipart form for `POST /api/documents/upload`.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// Application ID.
    application: String,
    /// Document requirement ID.
    document_type: String,
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/api/documents/upload",
            post(upload_document).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/documents/:id/verify", post(verify_document))
        .route("/api/documents/:id/file", get(download_document))
}

/// Text parts and the file part of an upload, as received.
#[derive(Debug, Default)]
struct UploadParts {
    application: Option<String>,
    document_type: Option<String>,
    file: Option<(String, Vec<u8>)>,
}

impl UploadParts {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut parts = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("application") => parts.application = Some(text(field).await?),
                Some("document_type") => parts.document_type = Some(text(field).await?),
                Some("file") => {
                    let filename = field.file_name().unwrap_or_default().to_string();
                    let bytes = field.bytes().await.map_err(multipart_error)?;
                    parts.file = Some((filename, bytes.to_vec()));
                }
                other => tracing::debug!(field = ?other, "ignoring multipart field"),
            }
        }
        Ok(parts)
    }

    /// Parse every part, collecting all field errors.
    fn resolve(self) -> Result<(ApplicationId, RequirementId, String, Vec<u8>), FieldErrors> {
        let mut errors = FieldErrors::new();
        let application = required_field::<ApplicationId>(
            "application",
            self.application.as_deref(),
            "Invalid application",
        )
        .map_err(|e| errors.merge(e))
        .ok();
        let requirement = required_field::<RequirementId>(
            "document_type",
            self.document_type.as_deref(),
            "Invalid document type selected",
        )
        .map_err(|e| errors.merge(e))
        .ok();
        let file = match self.file {
            Some((name, _)) if name.trim().is_empty() => {
                errors.add("file", "No file was submitted.");
                None
            }
            Some(file) => Some(file),
            None => {
                errors.add("file", "No file was submitted.");
                None
            }
        };
        match (application, requirement, file) {
            (Some(a), Some(r), Some((name, bytes))) if errors.is_empty() => Ok((a, r, name, bytes)),
            _ => Err(errors),
        }
    }
}

async fn text(field: Field<'_>) -> Result<String, AppError> {
    field.text().await.map_err(multipart_error)
}

fn multipart_error(err: MultipartError) -> AppError {
    tracing::debug!(error = %err.body_text(), "rejected multipart body");
    AppError::BadRequest(err.body_text())
}

/// POST /api/documents/upload — Upload or replace the document for one requirement.
#[utoipa::path(
    post,
    path = "/api/documents/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Document stored", body = DocumentView),
        (status = 400, description = "Size, format or state violation", body = crate::error::ErrorBody),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Application not found", body = crate::error::ErrorBody),
    ),
    tag = "documents"
)]
async fn upload_document(
    State(state): State<AppState>,
    caller: CallerIdentity,
    multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentView>), AppError> {
    let parts = UploadParts::read(multipart).await?;
    let (application_id, requirement_id, filename, bytes) =
        parts.resolve().map_err(AppError::Fields)?;
    let document = state
        .lifecycle
        .upload_document(
            &caller.actor(),
            application_id,
            requirement_id,
            &filename,
            &bytes,
        )
        .await?;
    let view = DocumentView::build(&document, &state.lifecycle.catalog());
    Ok((StatusCode::CREATED, Json(view)))
}

/// POST /api/documents/:id/verify — Record staff verification.
#[utoipa::path(
    post,
    path = "/api/documents/{id}/verify",
    params(("id" = Uuid, Path, description = "Document ID")),
    request_body = VerifyDocumentRequest,
    responses(
        (status = 200, description = "Verification recorded", body = DocumentView),
        (status = 403, description = "Caller is not staff", body = crate::error::ErrorBody),
        (status = 404, description = "Document not found", body = crate::error::ErrorBody),
    ),
    tag = "documents"
)]
async fn verify_document(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<VerifyDocumentRequest>, JsonRejection>,
) -> Result<Json<DocumentView>, AppError> {
    let req = extract_json(body)?;
    let document = state
        .lifecycle
        .verify_document(
            &caller.actor(),
            DocumentId::from_uuid(id),
            req.verified,
            req.notes,
        )
        .await?;
    Ok(Json(DocumentView::build(
        &document,
        &state.lifecycle.catalog(),
    )))
}

/// GET /api/documents/:id/file — Stored bytes of a document.
#[utoipa::path(
    get,
    path = "/api/documents/{id}/file",
    params(("id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 200, description = "File content", body = String, content_type = "application/octet-stream"),
        (status = 404, description = "Document not found or not visible", body = crate::error::ErrorBody),
    ),
    tag = "documents"
)]
async fn download_document(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (document, bytes) = state
        .lifecycle
        .read_document(&caller.actor(), DocumentId::from_uuid(id))
        .await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        document.original_filename.replace(['"', '\\', '\r', '\n'], "_")
    );
    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(&document.stored_path).to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

fn content_type_for(path: &str) -> &'static str {
    let extension = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
    match extension {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}
