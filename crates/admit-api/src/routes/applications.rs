//! # Application API
//!
//! Draft creation and editing by applicants, submission through the
//! completeness gate, staff status changes and withdrawal. Applicants only
//! ever see their own applications; anything else is reported as 404.

use admit_state::{ApplicationForm, ApplicationStatus};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use admit_core::{ApplicationId, ProgramId};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_json, required_field};
use crate::state::AppState;
use crate::views::{ApplicationSummary, ApplicationView};

/// Create body: `program_id` plus the application form fields at top level.
#[derive(Debug, Deserialize)]
pub struct CreateApplicationRequest {
    #[serde(default)]
    pub program_id: Option<String>,
    #[serde(flatten)]
    pub form: ApplicationForm,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusChangeRequest {
    /// Target status, e.g. `under_review`.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct WithdrawRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HasAppliedResponse {
    pub has_applied: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Only applications in this status.
    pub status: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/applications", get(list_applications))
        .route("/api/applications/create", post(create_application))
        .route(
            "/api/applications/has-applied/:program_id",
            get(has_applied),
        )
        .route(
            "/api/applications/:id",
            get(get_application).put(update_application),
        )
        .route("/api/applications/:id/submit", patch(submit_application))
        .route("/api/applications/:id/status", post(change_status))
        .route("/api/applications/:id/withdraw", post(withdraw_application))
}

/// POST /api/applications/create — Create a draft application.
#[utoipa::path(
    post,
    path = "/api/applications/create",
    request_body = CreateApplicationRequest,
    responses(
        (status = 201, description = "Draft created", body = ApplicationView),
        (status = 400, description = "Field errors keyed by field name"),
        (status = 403, description = "Caller is not an applicant", body = crate::error::ErrorBody),
        (status = 409, description = "Already applied to this program", body = crate::error::ErrorBody),
    ),
    tag = "applications"
)]
async fn create_application(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateApplicationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApplicationView>), AppError> {
    let req = extract_json(body)?;
    let app = state
        .lifecycle
        .create(&caller.actor(), req.program_id.as_deref(), req.form)
        .await?;
    let view = ApplicationView::build(&app, &state.lifecycle.catalog(), caller.role);
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/applications — Applications visible to the caller, newest first.
#[utoipa::path(
    get,
    path = "/api/applications",
    params(ListQuery),
    responses(
        (status = 200, description = "Application summaries", body = Vec<ApplicationSummary>),
        (status = 400, description = "Unknown status filter", body = crate::error::ErrorBody),
    ),
    tag = "applications"
)]
async fn list_applications(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ApplicationSummary>>, AppError> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<ApplicationStatus>()?),
    };
    let apps = state.lifecycle.list(&caller.actor()).await;
    let catalog = state.lifecycle.catalog();
    let summaries = apps
        .iter()
        .filter(|app| status.map_or(true, |s| app.status == s))
        .map(|app| ApplicationSummary::build(app, &catalog))
        .collect();
    Ok(Json(summaries))
}

/// GET /api/applications/:id — Application detail.
#[utoipa::path(
    get,
    path = "/api/applications/{id}",
    params(("id" = Uuid, Path, description = "Application ID")),
    responses(
        (status = 200, description = "Application found", body = ApplicationView),
        (status = 404, description = "Not found or not visible", body = crate::error::ErrorBody),
    ),
    tag = "applications"
)]
async fn get_application(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ApplicationView>, AppError> {
    let app = state
        .lifecycle
        .get(&caller.actor(), ApplicationId::from_uuid(id))
        .await?;
    Ok(Json(ApplicationView::build(
        &app,
        &state.lifecycle.catalog(),
        caller.role,
    )))
}

/// PUT /api/applications/:id — Replace the form fields of a draft.
#[utoipa::path(
    put,
    path = "/api/applications/{id}",
    params(("id" = Uuid, Path, description = "Application ID")),
    request_body = ApplicationForm,
    responses(
        (status = 200, description = "Application updated", body = ApplicationView),
        (status = 400, description = "Field errors keyed by field name"),
        (status = 403, description = "Not the owner or no longer a draft", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "applications"
)]
async fn update_application(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ApplicationForm>, JsonRejection>,
) -> Result<Json<ApplicationView>, AppError> {
    let form = extract_json(body)?;
    let app = state
        .lifecycle
        .update(&caller.actor(), ApplicationId::from_uuid(id), form)
        .await?;
    Ok(Json(ApplicationView::build(
        &app,
        &state.lifecycle.catalog(),
        caller.role,
    )))
}

/// PATCH /api/applications/:id/submit — Submit a complete draft.
#[utoipa::path(
    patch,
    path = "/api/applications/{id}/submit",
    params(("id" = Uuid, Path, description = "Application ID")),
    responses(
        (status = 200, description = "Application submitted", body = ApplicationView),
        (status = 400, description = "Already submitted or documents missing", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "applications"
)]
async fn submit_application(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ApplicationView>, AppError> {
    let app = state
        .lifecycle
        .submit(&caller.actor(), ApplicationId::from_uuid(id))
        .await?;
    Ok(Json(ApplicationView::build(
        &app,
        &state.lifecycle.catalog(),
        caller.role,
    )))
}

/// POST /api/applications/:id/status — Staff status change.
#[utoipa::path(
    post,
    path = "/api/applications/{id}/status",
    params(("id" = Uuid, Path, description = "Application ID")),
    request_body = StatusChangeRequest,
    responses(
        (status = 200, description = "Status changed", body = ApplicationView),
        (status = 400, description = "Unknown status or transition not allowed", body = crate::error::ErrorBody),
        (status = 403, description = "Caller is not staff", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "applications"
)]
async fn change_status(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<StatusChangeRequest>, JsonRejection>,
) -> Result<Json<ApplicationView>, AppError> {
    if !caller.role.is_staff() {
        return Err(AppError::forbidden(format!(
            "role '{}' cannot change application status",
            caller.role
        )));
    }
    let req = extract_json(body)?;
    let app = state
        .lifecycle
        .change_status(
            &caller.actor(),
            ApplicationId::from_uuid(id),
            &req.status,
            &req.reason,
        )
        .await?;
    Ok(Json(ApplicationView::build(
        &app,
        &state.lifecycle.catalog(),
        caller.role,
    )))
}

/// POST /api/applications/:id/withdraw — Applicant withdrawal.
#[utoipa::path(
    post,
    path = "/api/applications/{id}/withdraw",
    params(("id" = Uuid, Path, description = "Application ID")),
    request_body = WithdrawRequest,
    responses(
        (status = 200, description = "Application withdrawn", body = ApplicationView),
        (status = 400, description = "Already in a terminal state", body = crate::error::ErrorBody),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "applications"
)]
async fn withdraw_application(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Option<Json<WithdrawRequest>>,
) -> Result<Json<ApplicationView>, AppError> {
    let reason = body.map(|Json(req)| req.reason).unwrap_or_default();
    let app = state
        .lifecycle
        .withdraw(&caller.actor(), ApplicationId::from_uuid(id), &reason)
        .await?;
    Ok(Json(ApplicationView::build(
        &app,
        &state.lifecycle.catalog(),
        caller.role,
    )))
}

/// GET /api/applications/has-applied/:program_id
#[utoipa::path(
    get,
    path = "/api/applications/has-applied/{program_id}",
    params(("program_id" = Uuid, Path, description = "Program ID")),
    responses(
        (status = 200, description = "Whether the caller already applied", body = HasAppliedResponse),
    ),
    tag = "applications"
)]
async fn has_applied(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(program_id): Path<String>,
) -> Result<Json<HasAppliedResponse>, AppError> {
    let program_id: ProgramId = required_field("program_id", Some(&program_id), "Invalid program")
        .map_err(AppError::Fields)?;
    Ok(Json(HasAppliedResponse {
        has_applied: state.lifecycle.has_applied(&caller.actor(), program_id),
    }))
}
