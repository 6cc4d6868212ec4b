//! # Program Catalog API
//!
//! Public reads of departments, programs and their document requirements;
//! admin-only writes and department statistics. Deleting a requirement
//! retires it so that documents already uploaded against it stay
//! resolvable. A department can only be deleted once no program belongs
//! to it.

use admit_core::{DepartmentId, ProgramId, RequirementId, Timestamp};
use admit_state::{DepartmentDraft, Program, ProgramDraft, ProgramFilter, RequirementDraft};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use uuid::Uuid;

use crate::auth::{require_admin, CallerIdentity};
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::state::AppState;
use crate::views::{DepartmentStatisticsView, DepartmentView, ProgramView, RequirementView};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/departments", get(list_departments).post(create_department))
        .route("/api/departments/statistics", get(department_statistics))
        .route(
            "/api/departments/:id",
            put(update_department).delete(delete_department),
        )
        .route("/api/programs", get(list_programs).post(create_program))
        .route(
            "/api/programs/:id",
            get(get_program).put(update_program).delete(delete_program),
        )
        .route(
            "/api/programs/:id/documents",
            get(list_requirements).post(create_requirement),
        )
        .route(
            "/api/programs/documents/:id",
            put(update_requirement).delete(retire_requirement),
        )
}

fn program_view(state: &AppState, program: &Program, with_requirements: bool) -> ProgramView {
    let occupied = state.lifecycle.occupied_seats(&program.id);
    ProgramView::build(
        program,
        &state.lifecycle.catalog(),
        occupied,
        Timestamp::now(),
        with_requirements,
    )
}

// ── Departments ─────────────────────────────────────────────────────────────

/// GET /api/departments — All departments.
#[utoipa::path(
    get,
    path = "/api/departments",
    responses((status = 200, description = "Departments", body = Vec<DepartmentView>)),
    tag = "catalog"
)]
async fn list_departments(State(state): State<AppState>) -> Json<Vec<DepartmentView>> {
    let catalog = state.lifecycle.catalog();
    Json(catalog.departments().into_iter().map(DepartmentView::from).collect())
}

/// POST /api/departments — Create a department (admin).
#[utoipa::path(
    post,
    path = "/api/departments",
    request_body = DepartmentDraft,
    responses(
        (status = 201, description = "Department created", body = DepartmentView),
        (status = 400, description = "Field errors keyed by field name"),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 409, description = "Duplicate department code", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
async fn create_department(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<DepartmentDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<DepartmentView>), AppError> {
    require_admin(&caller)?;
    let draft = extract_json(body)?;
    let department = state.lifecycle.create_department(draft).await?;
    Ok((StatusCode::CREATED, Json(DepartmentView::from(&department))))
}

/// PUT /api/departments/:id — Replace a department's fields (admin).
#[utoipa::path(
    put,
    path = "/api/departments/{id}",
    params(("id" = Uuid, Path, description = "Department ID")),
    request_body = DepartmentDraft,
    responses(
        (status = 200, description = "Department updated", body = DepartmentView),
        (status = 400, description = "Field errors keyed by field name"),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 404, description = "Department not found", body = crate::error::ErrorBody),
        (status = 409, description = "Duplicate department code", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
async fn update_department(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<DepartmentDraft>, JsonRejection>,
) -> Result<Json<DepartmentView>, AppError> {
    require_admin(&caller)?;
    let draft = extract_json(body)?;
    let department = state
        .lifecycle
        .update_department(DepartmentId::from_uuid(id), draft)
        .await?;
    Ok(Json(DepartmentView::from(&department)))
}

/// DELETE /api/departments/:id — Delete a department without programs (admin).
#[utoipa::path(
    delete,
    path = "/api/departments/{id}",
    params(("id" = Uuid, Path, description = "Department ID")),
    responses(
        (status = 204, description = "Department deleted"),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 404, description = "Department not found", body = crate::error::ErrorBody),
        (status = 409, description = "Programs belong to the department", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
async fn delete_department(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_admin(&caller)?;
    state
        .lifecycle
        .delete_department(DepartmentId::from_uuid(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/departments/statistics — Program counts per department (admin).
#[utoipa::path(
    get,
    path = "/api/departments/statistics",
    responses(
        (status = 200, description = "Per-department program counts", body = Vec<DepartmentStatisticsView>),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
async fn department_statistics(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Vec<DepartmentStatisticsView>>, AppError> {
    require_admin(&caller)?;
    let catalog = state.lifecycle.catalog();
    Ok(Json(
        catalog
            .department_statistics()
            .iter()
            .map(DepartmentStatisticsView::from)
            .collect(),
    ))
}

// ── Programs ────────────────────────────────────────────────────────────────

/// GET /api/programs — Active programs, optionally filtered.
#[utoipa::path(
    get,
    path = "/api/programs",
    params(
        ("program_type" = Option<String>, Query, description = "undergraduate, postgraduate, diploma or certificate"),
        ("department" = Option<Uuid>, Query, description = "Department ID"),
        ("search" = Option<String>, Query, description = "Case-insensitive text search"),
    ),
    responses(
        (status = 200, description = "Active programs", body = Vec<ProgramView>),
        (status = 400, description = "Malformed filter", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
async fn list_programs(
    State(state): State<AppState>,
    filter: Result<Query<ProgramFilter>, QueryRejection>,
) -> Result<Json<Vec<ProgramView>>, AppError> {
    let Query(filter) = filter.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let now = Timestamp::now();
    let catalog = state.lifecycle.catalog();
    let programs = catalog
        .active_programs(&filter)
        .into_iter()
        .map(|p| {
            ProgramView::build(
                p,
                &catalog,
                state.lifecycle.occupied_seats(&p.id),
                now,
                false,
            )
        })
        .collect();
    Ok(Json(programs))
}

/// GET /api/programs/:id — Program detail with its document requirements.
#[utoipa::path(
    get,
    path = "/api/programs/{id}",
    params(("id" = Uuid, Path, description = "Program ID")),
    responses(
        (status = 200, description = "Program found", body = ProgramView),
        (status = 404, description = "Program not found", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
async fn get_program(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProgramView>, AppError> {
    let program = state
        .lifecycle
        .catalog()
        .program(&ProgramId::from_uuid(id))
        .cloned()
        .ok_or_else(|| AppError::not_found("Program not found"))?;
    Ok(Json(program_view(&state, &program, true)))
}

/// POST /api/programs — Create a program (admin).
#[utoipa::path(
    post,
    path = "/api/programs",
    request_body = ProgramDraft,
    responses(
        (status = 201, description = "Program created", body = ProgramView),
        (status = 400, description = "Field errors keyed by field name"),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 409, description = "Duplicate program code", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
async fn create_program(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<ProgramDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<ProgramView>), AppError> {
    require_admin(&caller)?;
    let draft = extract_json(body)?;
    let program = state.lifecycle.create_program(draft).await?;
    Ok((StatusCode::CREATED, Json(program_view(&state, &program, true))))
}

/// PUT /api/programs/:id — Replace a program's fields (admin).
#[utoipa::path(
    put,
    path = "/api/programs/{id}",
    params(("id" = Uuid, Path, description = "Program ID")),
    request_body = ProgramDraft,
    responses(
        (status = 200, description = "Program updated", body = ProgramView),
        (status = 400, description = "Field errors keyed by field name"),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 404, description = "Program not found", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
async fn update_program(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ProgramDraft>, JsonRejection>,
) -> Result<Json<ProgramView>, AppError> {
    require_admin(&caller)?;
    let draft = extract_json(body)?;
    let program = state
        .lifecycle
        .update_program(ProgramId::from_uuid(id), draft)
        .await?;
    Ok(Json(program_view(&state, &program, true)))
}

/// DELETE /api/programs/:id — Delete a program nobody has applied to (admin).
#[utoipa::path(
    delete,
    path = "/api/programs/{id}",
    params(("id" = Uuid, Path, description = "Program ID")),
    responses(
        (status = 204, description = "Program deleted"),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 404, description = "Program not found", body = crate::error::ErrorBody),
        (status = 409, description = "Applications reference the program", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
async fn delete_program(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_admin(&caller)?;
    state
        .lifecycle
        .delete_program(ProgramId::from_uuid(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Document requirements ───────────────────────────────────────────────────

/// GET /api/programs/:id/documents — Active requirements of a program.
#[utoipa::path(
    get,
    path = "/api/programs/{id}/documents",
    params(("id" = Uuid, Path, description = "Program ID")),
    responses(
        (status = 200, description = "Document requirements", body = Vec<RequirementView>),
        (status = 404, description = "Program not found", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
async fn list_requirements(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RequirementView>>, AppError> {
    let id = ProgramId::from_uuid(id);
    let catalog = state.lifecycle.catalog();
    if catalog.program(&id).is_none() {
        return Err(AppError::not_found("Program not found"));
    }
    Ok(Json(
        catalog
            .requirements_for(&id)
            .into_iter()
            .map(RequirementView::from)
            .collect(),
    ))
}

/// POST /api/programs/:id/documents — Add a document requirement (admin).
#[utoipa::path(
    post,
    path = "/api/programs/{id}/documents",
    params(("id" = Uuid, Path, description = "Program ID")),
    request_body = RequirementDraft,
    responses(
        (status = 201, description = "Requirement created", body = RequirementView),
        (status = 400, description = "Field errors keyed by field name"),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 404, description = "Program not found", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
async fn create_requirement(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<RequirementDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<RequirementView>), AppError> {
    require_admin(&caller)?;
    let draft = extract_json(body)?;
    let requirement = state
        .lifecycle
        .add_requirement(ProgramId::from_uuid(id), draft)
        .await?;
    Ok((StatusCode::CREATED, Json(RequirementView::from(&requirement))))
}

/// PUT /api/programs/documents/:id — Replace a requirement's fields (admin).
#[utoipa::path(
    put,
    path = "/api/programs/documents/{id}",
    params(("id" = Uuid, Path, description = "Requirement ID")),
    request_body = RequirementDraft,
    responses(
        (status = 200, description = "Requirement updated", body = RequirementView),
        (status = 400, description = "Field errors keyed by field name"),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 404, description = "Requirement not found", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
async fn update_requirement(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<RequirementDraft>, JsonRejection>,
) -> Result<Json<RequirementView>, AppError> {
    require_admin(&caller)?;
    let draft = extract_json(body)?;
    let requirement = state
        .lifecycle
        .update_requirement(RequirementId::from_uuid(id), draft)
        .await?;
    Ok(Json(RequirementView::from(&requirement)))
}

/// DELETE /api/programs/documents/:id — Retire a requirement (admin).
#[utoipa::path(
    delete,
    path = "/api/programs/documents/{id}",
    params(("id" = Uuid, Path, description = "Requirement ID")),
    responses(
        (status = 204, description = "Requirement retired"),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 404, description = "Requirement not found", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
async fn retire_requirement(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_admin(&caller)?;
    state
        .lifecycle
        .retire_requirement(RequirementId::from_uuid(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
