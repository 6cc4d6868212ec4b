//! # Response Views
//!
//! JSON shapes returned by the API. Domain types live in `admit-state`
//! without any HTTP or OpenAPI concerns; these views flatten ids to UUIDs,
//! timestamps to RFC 3339 and join in catalog names.

use admit_core::{Role, Timestamp};
use admit_state::{
    Application, ApplicationFields, Catalog, Department, DepartmentStatistics, Document,
    DocumentRequirement, Program, StatusHistoryEntry,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// One uploaded document.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DocumentView {
    pub id: Uuid,
    pub application_id: Uuid,
    /// Document requirement the file satisfies.
    pub document_type: Uuid,
    pub document_type_name: String,
    /// Path relative to the upload root.
    pub file: String,
    pub original_filename: String,
    pub file_size: u64,
    pub sha256: String,
    pub uploaded_at: DateTime<Utc>,
    pub verified: bool,
    pub verification_notes: String,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl DocumentView {
    pub fn build(document: &Document, catalog: &Catalog) -> Self {
        Self {
            id: *document.id.as_uuid(),
            application_id: *document.application_id.as_uuid(),
            document_type: *document.requirement_id.as_uuid(),
            document_type_name: catalog
                .requirement(&document.requirement_id)
                .map(|r| r.document_name.clone())
                .unwrap_or_default(),
            file: document.stored_path.clone(),
            original_filename: document.original_filename.clone(),
            file_size: document.file_size,
            sha256: document.sha256.clone(),
            uploaded_at: utc(document.uploaded_at),
            verified: document.verified,
            verification_notes: document.verification_notes.clone(),
            verified_by: document.verified_by.map(|u| *u.as_uuid()),
            verified_at: document.verified_at.map(utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatusHistoryView {
    pub previous_status: String,
    pub new_status: String,
    pub changed_by: Uuid,
    pub change_reason: String,
    pub changed_at: DateTime<Utc>,
}

impl From<&StatusHistoryEntry> for StatusHistoryView {
    fn from(entry: &StatusHistoryEntry) -> Self {
        Self {
            previous_status: entry.previous_status.to_string(),
            new_status: entry.new_status.to_string(),
            changed_by: *entry.changed_by.as_uuid(),
            change_reason: entry.change_reason.clone(),
            changed_at: utc(entry.changed_at),
        }
    }
}

/// Full application detail.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApplicationView {
    pub id: Uuid,
    pub application_number: String,
    pub applicant_id: Uuid,
    pub program_id: Uuid,
    pub program_name: String,
    pub program_code: String,
    /// Applicant-supplied personal, academic and statement fields.
    #[schema(value_type = Object)]
    pub fields: ApplicationFields,
    pub status: String,
    pub is_complete: bool,
    pub documents: Vec<DocumentView>,
    /// Oldest first.
    pub status_history: Vec<StatusHistoryView>,
    /// Statuses the caller could move this application to next.
    pub valid_transitions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
    pub review_notes: String,
}

impl ApplicationView {
    pub fn build(app: &Application, catalog: &Catalog, role: Role) -> Self {
        let program = catalog.program(&app.program_id);
        Self {
            id: *app.id.as_uuid(),
            application_number: app.application_number.as_str().to_string(),
            applicant_id: *app.applicant_id.as_uuid(),
            program_id: *app.program_id.as_uuid(),
            program_name: program.map(|p| p.name.clone()).unwrap_or_default(),
            program_code: program.map(|p| p.code.clone()).unwrap_or_default(),
            fields: app.fields.clone(),
            status: app.status.to_string(),
            is_complete: app.is_complete,
            documents: app
                .documents
                .iter()
                .map(|d| DocumentView::build(d, catalog))
                .collect(),
            status_history: app.history.iter().map(StatusHistoryView::from).collect(),
            valid_transitions: app
                .valid_transitions(role)
                .into_iter()
                .map(|s| s.to_string())
                .collect(),
            created_at: utc(app.created_at),
            updated_at: utc(app.updated_at),
            submitted_at: app.submitted_at.map(utc),
            reviewed_by: app.reviewed_by.map(|u| *u.as_uuid()),
            review_notes: app.review_notes.clone(),
        }
    }
}

/// List entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApplicationSummary {
    pub id: Uuid,
    pub application_number: String,
    pub applicant_id: Uuid,
    pub program_id: Uuid,
    pub program_name: String,
    pub status: String,
    pub is_complete: bool,
    pub document_count: usize,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl ApplicationSummary {
    pub fn build(app: &Application, catalog: &Catalog) -> Self {
        Self {
            id: *app.id.as_uuid(),
            application_number: app.application_number.as_str().to_string(),
            applicant_id: *app.applicant_id.as_uuid(),
            program_id: *app.program_id.as_uuid(),
            program_name: catalog
                .program(&app.program_id)
                .map(|p| p.name.clone())
                .unwrap_or_default(),
            status: app.status.to_string(),
            is_complete: app.is_complete,
            document_count: app.documents.len(),
            created_at: utc(app.created_at),
            submitted_at: app.submitted_at.map(utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RequirementView {
    pub id: Uuid,
    pub program_id: Uuid,
    pub document_name: String,
    pub description: String,
    pub is_mandatory: bool,
    pub max_file_size_mb: u32,
    /// Comma-separated extensions, e.g. `jpeg,jpg,pdf,png`.
    pub allowed_formats: String,
}

impl From<&DocumentRequirement> for RequirementView {
    fn from(r: &DocumentRequirement) -> Self {
        Self {
            id: *r.id.as_uuid(),
            program_id: *r.program_id.as_uuid(),
            document_name: r.document_name.clone(),
            description: r.description.clone(),
            is_mandatory: r.is_mandatory,
            max_file_size_mb: r.max_file_size_mb,
            allowed_formats: r.allowed_formats.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DepartmentView {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub description: String,
    pub head_of_department: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Department> for DepartmentView {
    fn from(d: &Department) -> Self {
        Self {
            id: *d.id.as_uuid(),
            name: d.name.clone(),
            code: d.code.clone(),
            description: d.description.clone(),
            head_of_department: d.head_of_department.clone(),
            created_at: utc(d.created_at),
        }
    }
}

/// Program counts for one department.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DepartmentStatisticsView {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub total_programs: usize,
    pub active_programs: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&DepartmentStatistics<'_>> for DepartmentStatisticsView {
    fn from(s: &DepartmentStatistics<'_>) -> Self {
        Self {
            id: *s.department.id.as_uuid(),
            name: s.department.name.clone(),
            code: s.department.code.clone(),
            total_programs: s.total_programs,
            active_programs: s.active_programs,
            created_at: utc(s.department.created_at),
        }
    }
}

/// Program listing and detail.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProgramView {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub department_id: Uuid,
    pub department_name: String,
    pub program_type: String,
    pub duration_years: u32,
    pub duration_semesters: u32,
    pub description: String,
    pub intake_capacity: u32,
    /// Decimal with two places, e.g. `"85000.00"`.
    pub fees_per_semester: String,
    pub application_fee: String,
    pub min_percentage: f64,
    pub eligibility_criteria: String,
    pub application_start_date: DateTime<Utc>,
    pub application_end_date: DateTime<Utc>,
    pub status: String,
    pub is_application_open: bool,
    pub available_seats: u32,
    /// Present on detail responses only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_requirements: Option<Vec<RequirementView>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProgramView {
    /// `occupied` is the number of seat-holding applications.
    pub fn build(
        program: &Program,
        catalog: &Catalog,
        occupied: usize,
        now: Timestamp,
        with_requirements: bool,
    ) -> Self {
        Self {
            id: *program.id.as_uuid(),
            name: program.name.clone(),
            code: program.code.clone(),
            department_id: *program.department_id.as_uuid(),
            department_name: catalog
                .department(&program.department_id)
                .map(|d| d.name.clone())
                .unwrap_or_default(),
            program_type: program.program_type.as_str().to_string(),
            duration_years: program.duration_years,
            duration_semesters: program.duration_semesters,
            description: program.description.clone(),
            intake_capacity: program.intake_capacity,
            fees_per_semester: program.fees_per_semester.to_string(),
            application_fee: program.application_fee.to_string(),
            min_percentage: program.min_percentage,
            eligibility_criteria: program.eligibility_criteria.clone(),
            application_start_date: utc(program.application_start_date),
            application_end_date: utc(program.application_end_date),
            status: program.status.as_str().to_string(),
            is_application_open: program.is_application_open(now),
            available_seats: program.available_seats(occupied),
            document_requirements: with_requirements.then(|| {
                catalog
                    .requirements_for(&program.id)
                    .into_iter()
                    .map(RequirementView::from)
                    .collect()
            }),
            created_at: utc(program.created_at),
            updated_at: utc(program.updated_at),
        }
    }
}

fn utc(t: Timestamp) -> DateTime<Utc> {
    *t.as_datetime()
}
