//! Catalog persistence: `departments`, `programs`, `document_requirements`.
//!
//! Amounts are `NUMERIC(10, 2)`; they are bound as text cast to numeric and
//! read back as text so no floating point is involved.

use admit_core::{ApplicationId, DepartmentId, ProgramId, RequirementId, Timestamp};
use admit_state::{
    AllowedFormats, Amount, Catalog, Department, DocumentRequirement, Program, ProgramStatus,
    ProgramType,
};
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::{from_db_int, to_db_int};

pub async fn insert_department(pool: &PgPool, department: &Department) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO departments (id, name, code, description, head_of_department, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(department.id.as_uuid())
    .bind(&department.name)
    .bind(&department.code)
    .bind(&department.description)
    .bind(&department.head_of_department)
    .bind(department.created_at.as_datetime())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update_department(
    pool: &PgPool,
    department: &Department,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE departments SET name = $1, code = $2, description = $3, head_of_department = $4
         WHERE id = $5",
    )
    .bind(&department.name)
    .bind(&department.code)
    .bind(&department.description)
    .bind(&department.head_of_department)
    .bind(department.id.as_uuid())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_department(pool: &PgPool, id: DepartmentId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM departments WHERE id = $1")
        .bind(id.as_uuid())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn insert_program(pool: &PgPool, program: &Program) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO programs (id, name, code, department_id, program_type, duration_years,
             duration_semesters, description, intake_capacity, fees_per_semester,
             application_fee, min_percentage, eligibility_criteria, application_start_date,
             application_end_date, status, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10::numeric, $11::numeric, $12, $13,
             $14, $15, $16, $17, $18)",
    )
    .bind(program.id.as_uuid())
    .bind(&program.name)
    .bind(&program.code)
    .bind(program.department_id.as_uuid())
    .bind(program.program_type.as_str())
    .bind(to_db_int(program.duration_years))
    .bind(to_db_int(program.duration_semesters))
    .bind(&program.description)
    .bind(to_db_int(program.intake_capacity))
    .bind(program.fees_per_semester.as_str())
    .bind(program.application_fee.as_str())
    .bind(program.min_percentage)
    .bind(&program.eligibility_criteria)
    .bind(program.application_start_date.as_datetime())
    .bind(program.application_end_date.as_datetime())
    .bind(program.status.as_str())
    .bind(program.created_at.as_datetime())
    .bind(program.updated_at.as_datetime())
    .execute(pool)
    .await?;
    Ok(())
}

/// Full replace of a program's editable columns.
pub async fn update_program(pool: &PgPool, program: &Program) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE programs SET name = $1, code = $2, department_id = $3, program_type = $4,
             duration_years = $5, duration_semesters = $6, description = $7,
             intake_capacity = $8, fees_per_semester = $9::numeric,
             application_fee = $10::numeric, min_percentage = $11,
             eligibility_criteria = $12, application_start_date = $13,
             application_end_date = $14, status = $15, updated_at = $16
         WHERE id = $17",
    )
    .bind(&program.name)
    .bind(&program.code)
    .bind(program.department_id.as_uuid())
    .bind(program.program_type.as_str())
    .bind(to_db_int(program.duration_years))
    .bind(to_db_int(program.duration_semesters))
    .bind(&program.description)
    .bind(to_db_int(program.intake_capacity))
    .bind(program.fees_per_semester.as_str())
    .bind(program.application_fee.as_str())
    .bind(program.min_percentage)
    .bind(&program.eligibility_criteria)
    .bind(program.application_start_date.as_datetime())
    .bind(program.application_end_date.as_datetime())
    .bind(program.status.as_str())
    .bind(program.updated_at.as_datetime())
    .bind(program.id.as_uuid())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete a program; its requirements go with it (`ON DELETE CASCADE`).
pub async fn delete_program(pool: &PgPool, id: ProgramId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM programs WHERE id = $1")
        .bind(id.as_uuid())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// How a requirement row reaches the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementWrite {
    Insert,
    Update,
}

/// Write one requirement row together with the recomputed completeness
/// flags of the applications it affects, in a single transaction.
pub async fn save_requirement(
    pool: &PgPool,
    requirement: &DocumentRequirement,
    write: RequirementWrite,
    completeness: &[(ApplicationId, bool)],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    match write {
        RequirementWrite::Insert => insert_requirement(&mut *tx, requirement).await?,
        RequirementWrite::Update => {
            if !update_requirement(&mut *tx, requirement).await? {
                return Err(sqlx::Error::RowNotFound);
            }
        }
    }
    for (id, is_complete) in completeness {
        super::applications::update_completeness(&mut *tx, *id, *is_complete).await?;
    }
    tx.commit().await
}

async fn insert_requirement<'e>(
    executor: impl PgExecutor<'e>,
    requirement: &DocumentRequirement,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO document_requirements (id, program_id, document_name, description,
             is_mandatory, max_file_size_mb, allowed_formats, retired_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(requirement.id.as_uuid())
    .bind(requirement.program_id.as_uuid())
    .bind(&requirement.document_name)
    .bind(&requirement.description)
    .bind(requirement.is_mandatory)
    .bind(to_db_int(requirement.max_file_size_mb))
    .bind(requirement.allowed_formats.to_string())
    .bind(requirement.retired_at.map(|t| *t.as_datetime()))
    .execute(executor)
    .await?;
    Ok(())
}

/// Write back editable columns and `retired_at`.
async fn update_requirement<'e>(
    executor: impl PgExecutor<'e>,
    requirement: &DocumentRequirement,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE document_requirements SET document_name = $1, description = $2,
             is_mandatory = $3, max_file_size_mb = $4, allowed_formats = $5, retired_at = $6
         WHERE id = $7",
    )
    .bind(&requirement.document_name)
    .bind(&requirement.description)
    .bind(requirement.is_mandatory)
    .bind(to_db_int(requirement.max_file_size_mb))
    .bind(requirement.allowed_formats.to_string())
    .bind(requirement.retired_at.map(|t| *t.as_datetime()))
    .bind(requirement.id.as_uuid())
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Load the whole catalog on startup. Rows that no longer decode are
/// skipped with an error log.
pub async fn load(pool: &PgPool) -> Result<Catalog, sqlx::Error> {
    let departments = sqlx::query_as::<_, DepartmentRow>(
        "SELECT id, name, code, description, head_of_department, created_at
         FROM departments ORDER BY name",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(DepartmentRow::into_record)
    .collect();

    let programs = sqlx::query_as::<_, ProgramRow>(
        "SELECT id, name, code, department_id, program_type, duration_years,
             duration_semesters, description, intake_capacity,
             fees_per_semester::text AS fees_per_semester,
             application_fee::text AS application_fee, min_percentage,
             eligibility_criteria, application_start_date, application_end_date, status,
             created_at, updated_at
         FROM programs ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .filter_map(ProgramRow::into_record)
    .collect();

    let requirements = sqlx::query_as::<_, RequirementRow>(
        "SELECT id, program_id, document_name, description, is_mandatory, max_file_size_mb,
             allowed_formats, retired_at
         FROM document_requirements",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .filter_map(RequirementRow::into_record)
    .collect();

    Ok(Catalog::from_parts(departments, programs, requirements))
}

#[derive(sqlx::FromRow)]
struct DepartmentRow {
    id: Uuid,
    name: String,
    code: String,
    description: String,
    head_of_department: String,
    created_at: DateTime<Utc>,
}

impl DepartmentRow {
    fn into_record(self) -> Department {
        Department {
            id: DepartmentId::from_uuid(self.id),
            name: self.name,
            code: self.code,
            description: self.description,
            head_of_department: self.head_of_department,
            created_at: Timestamp::from_utc(self.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProgramRow {
    id: Uuid,
    name: String,
    code: String,
    department_id: Uuid,
    program_type: String,
    duration_years: i64,
    duration_semesters: i64,
    description: String,
    intake_capacity: i64,
    fees_per_semester: String,
    application_fee: String,
    min_percentage: f64,
    eligibility_criteria: String,
    application_start_date: DateTime<Utc>,
    application_end_date: DateTime<Utc>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProgramRow {
    fn into_record(self) -> Option<Program> {
        let id = self.id;
        let decoded = (|| -> Result<Program, String> {
            Ok(Program {
                id: ProgramId::from_uuid(self.id),
                name: self.name,
                code: self.code,
                department_id: DepartmentId::from_uuid(self.department_id),
                program_type: self.program_type.parse::<ProgramType>()?,
                duration_years: from_db_int(self.duration_years)
                    .ok_or("duration_years out of range")?,
                duration_semesters: from_db_int(self.duration_semesters)
                    .ok_or("duration_semesters out of range")?,
                description: self.description,
                intake_capacity: from_db_int(self.intake_capacity)
                    .ok_or("intake_capacity out of range")?,
                fees_per_semester: Amount::parse(&self.fees_per_semester)?,
                application_fee: Amount::parse(&self.application_fee)?,
                min_percentage: self.min_percentage,
                eligibility_criteria: self.eligibility_criteria,
                application_start_date: Timestamp::from_utc(self.application_start_date),
                application_end_date: Timestamp::from_utc(self.application_end_date),
                status: self.status.parse::<ProgramStatus>()?,
                created_at: Timestamp::from_utc(self.created_at),
                updated_at: Timestamp::from_utc(self.updated_at),
            })
        })();
        decoded
            .map_err(|e| tracing::error!(program_id = %id, error = %e, "skipping undecodable program row"))
            .ok()
    }
}

#[derive(sqlx::FromRow)]
struct RequirementRow {
    id: Uuid,
    program_id: Uuid,
    document_name: String,
    description: String,
    is_mandatory: bool,
    max_file_size_mb: i64,
    allowed_formats: String,
    retired_at: Option<DateTime<Utc>>,
}

impl RequirementRow {
    fn into_record(self) -> Option<DocumentRequirement> {
        let id = self.id;
        let decoded = (|| -> Result<DocumentRequirement, String> {
            Ok(DocumentRequirement {
                id: RequirementId::from_uuid(self.id),
                program_id: ProgramId::from_uuid(self.program_id),
                document_name: self.document_name,
                description: self.description,
                is_mandatory: self.is_mandatory,
                max_file_size_mb: from_db_int(self.max_file_size_mb)
                    .ok_or("max_file_size_mb out of range")?,
                allowed_formats: AllowedFormats::parse(&self.allowed_formats)?,
                retired_at: self.retired_at.map(Timestamp::from_utc),
            })
        })();
        decoded
            .map_err(|e| tracing::error!(requirement_id = %id, error = %e, "skipping undecodable requirement row"))
            .ok()
    }
}
