//! Application persistence: `applications`, `application_documents`,
//! `application_status_history`.
//!
//! Applicant-supplied fields are stored as one JSONB column. A status
//! change and its history row are written in a single transaction, as is a
//! document upsert together with the recomputed completeness flag.

use std::collections::HashMap;

use admit_core::{
    ApplicationId, ApplicationNumber, DocumentId, ProgramId, RequirementId, Timestamp, UserId,
};
use admit_state::{
    Application, ApplicationFields, ApplicationStatus, Document, DocumentSet, StatusHistoryEntry,
};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

pub async fn insert(pool: &PgPool, app: &Application) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO applications (id, application_number, applicant_id, program_id, fields,
             status, is_complete, created_at, updated_at, submitted_at, reviewed_by, review_notes)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(app.id.as_uuid())
    .bind(app.application_number.as_str())
    .bind(app.applicant_id.as_uuid())
    .bind(app.program_id.as_uuid())
    .bind(Json(&app.fields))
    .bind(app.status.as_str())
    .bind(app.is_complete)
    .bind(app.created_at.as_datetime())
    .bind(app.updated_at.as_datetime())
    .bind(app.submitted_at.map(|t| *t.as_datetime()))
    .bind(app.reviewed_by.map(|u| *u.as_uuid()))
    .bind(&app.review_notes)
    .execute(pool)
    .await?;
    Ok(())
}

/// Write back the applicant-supplied fields.
pub async fn update_fields(pool: &PgPool, app: &Application) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE applications SET fields = $1, updated_at = $2 WHERE id = $3")
        .bind(Json(&app.fields))
        .bind(app.updated_at.as_datetime())
        .bind(app.id.as_uuid())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn update_completeness<'e>(
    executor: impl PgExecutor<'e>,
    id: ApplicationId,
    is_complete: bool,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE applications SET is_complete = $1 WHERE id = $2")
        .bind(is_complete)
        .bind(id.as_uuid())
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Persist a status change and its history entry atomically.
pub async fn record_transition(
    pool: &PgPool,
    app: &Application,
    entry: &StatusHistoryEntry,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE applications SET status = $1, is_complete = $2, submitted_at = $3,
             reviewed_by = $4, review_notes = $5, updated_at = $6
         WHERE id = $7",
    )
    .bind(app.status.as_str())
    .bind(app.is_complete)
    .bind(app.submitted_at.map(|t| *t.as_datetime()))
    .bind(app.reviewed_by.map(|u| *u.as_uuid()))
    .bind(&app.review_notes)
    .bind(app.updated_at.as_datetime())
    .bind(app.id.as_uuid())
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO application_status_history (application_id, previous_status, new_status,
             changed_by, change_reason, changed_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(app.id.as_uuid())
    .bind(entry.previous_status.as_str())
    .bind(entry.new_status.as_str())
    .bind(entry.changed_by.as_uuid())
    .bind(&entry.change_reason)
    .bind(entry.changed_at.as_datetime())
    .execute(&mut *tx)
    .await?;

    tx.commit().await
}

/// Insert or replace the document for `(application, requirement)` and
/// store the recomputed completeness flag in the same transaction.
pub async fn upsert_document(
    pool: &PgPool,
    app: &Application,
    document: &Document,
) -> Result<(), sqlx::Error> {
    let file_size = i64::try_from(document.file_size)
        .map_err(|e| super::encode_error("document file_size", e))?;
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO application_documents (id, application_id, requirement_id, stored_path,
             original_filename, file_size, sha256, uploaded_at, verified, verification_notes,
             verified_by, verified_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         ON CONFLICT (application_id, requirement_id) DO UPDATE SET
             id = EXCLUDED.id,
             stored_path = EXCLUDED.stored_path,
             original_filename = EXCLUDED.original_filename,
             file_size = EXCLUDED.file_size,
             sha256 = EXCLUDED.sha256,
             uploaded_at = EXCLUDED.uploaded_at,
             verified = EXCLUDED.verified,
             verification_notes = EXCLUDED.verification_notes,
             verified_by = EXCLUDED.verified_by,
             verified_at = EXCLUDED.verified_at",
    )
    .bind(document.id.as_uuid())
    .bind(document.application_id.as_uuid())
    .bind(document.requirement_id.as_uuid())
    .bind(&document.stored_path)
    .bind(&document.original_filename)
    .bind(file_size)
    .bind(&document.sha256)
    .bind(document.uploaded_at.as_datetime())
    .bind(document.verified)
    .bind(&document.verification_notes)
    .bind(document.verified_by.map(|u| *u.as_uuid()))
    .bind(document.verified_at.map(|t| *t.as_datetime()))
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE applications SET is_complete = $1, updated_at = $2 WHERE id = $3")
        .bind(app.is_complete)
        .bind(app.updated_at.as_datetime())
        .bind(app.id.as_uuid())
        .execute(&mut *tx)
        .await?;

    tx.commit().await
}

pub async fn update_verification(pool: &PgPool, document: &Document) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE application_documents SET verified = $1, verification_notes = $2,
             verified_by = $3, verified_at = $4
         WHERE id = $5",
    )
    .bind(document.verified)
    .bind(&document.verification_notes)
    .bind(document.verified_by.map(|u| *u.as_uuid()))
    .bind(document.verified_at.map(|t| *t.as_datetime()))
    .bind(document.id.as_uuid())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Load every application with its documents and ordered history.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Application>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ApplicationRow>(
        "SELECT id, application_number, applicant_id, program_id, fields, status, is_complete,
             created_at, updated_at, submitted_at, reviewed_by, review_notes
         FROM applications ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    let mut documents: HashMap<Uuid, DocumentSet> = HashMap::new();
    let document_rows = sqlx::query_as::<_, DocumentRow>(
        "SELECT id, application_id, requirement_id, stored_path, original_filename, file_size,
             sha256, uploaded_at, verified, verification_notes, verified_by, verified_at
         FROM application_documents",
    )
    .fetch_all(pool)
    .await?;
    for row in document_rows {
        let application_id = row.application_id;
        if let Some(document) = row.into_record() {
            documents.entry(application_id).or_default().upsert(document);
        }
    }

    let mut history: HashMap<Uuid, Vec<StatusHistoryEntry>> = HashMap::new();
    let history_rows = sqlx::query_as::<_, HistoryRow>(
        "SELECT application_id, previous_status, new_status, changed_by, change_reason, changed_at
         FROM application_status_history ORDER BY application_id, id",
    )
    .fetch_all(pool)
    .await?;
    for row in history_rows {
        let application_id = row.application_id;
        if let Some(entry) = row.into_record() {
            history.entry(application_id).or_default().push(entry);
        }
    }

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id;
            row.into_record(
                documents.remove(&id).unwrap_or_default(),
                history.remove(&id).unwrap_or_default(),
            )
        })
        .collect())
}

#[derive(sqlx::FromRow)]
struct ApplicationRow {
    id: Uuid,
    application_number: String,
    applicant_id: Uuid,
    program_id: Uuid,
    fields: Json<ApplicationFields>,
    status: String,
    is_complete: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    reviewed_by: Option<Uuid>,
    review_notes: String,
}

impl ApplicationRow {
    fn into_record(
        self,
        documents: DocumentSet,
        history: Vec<StatusHistoryEntry>,
    ) -> Option<Application> {
        let id = self.id;
        let decoded = (|| -> Result<Application, String> {
            Ok(Application {
                id: ApplicationId::from_uuid(self.id),
                application_number: ApplicationNumber::parse(self.application_number)
                    .map_err(|e| e.to_string())?,
                applicant_id: UserId::from_uuid(self.applicant_id),
                program_id: ProgramId::from_uuid(self.program_id),
                fields: self.fields.0,
                status: self
                    .status
                    .parse::<ApplicationStatus>()
                    .map_err(|e| e.to_string())?,
                is_complete: self.is_complete,
                documents,
                history,
                created_at: Timestamp::from_utc(self.created_at),
                updated_at: Timestamp::from_utc(self.updated_at),
                submitted_at: self.submitted_at.map(Timestamp::from_utc),
                reviewed_by: self.reviewed_by.map(UserId::from_uuid),
                review_notes: self.review_notes,
            })
        })();
        decoded
            .map_err(|e| {
                tracing::error!(application_id = %id, error = %e, "skipping undecodable application row")
            })
            .ok()
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    application_id: Uuid,
    requirement_id: Uuid,
    stored_path: String,
    original_filename: String,
    file_size: i64,
    sha256: String,
    uploaded_at: DateTime<Utc>,
    verified: bool,
    verification_notes: String,
    verified_by: Option<Uuid>,
    verified_at: Option<DateTime<Utc>>,
}

impl DocumentRow {
    fn into_record(self) -> Option<Document> {
        let Ok(file_size) = u64::try_from(self.file_size) else {
            tracing::error!(document_id = %self.id, size = self.file_size, "skipping document with negative size");
            return None;
        };
        Some(Document {
            id: DocumentId::from_uuid(self.id),
            application_id: ApplicationId::from_uuid(self.application_id),
            requirement_id: RequirementId::from_uuid(self.requirement_id),
            stored_path: self.stored_path,
            original_filename: self.original_filename,
            file_size,
            sha256: self.sha256,
            uploaded_at: Timestamp::from_utc(self.uploaded_at),
            verified: self.verified,
            verification_notes: self.verification_notes,
            verified_by: self.verified_by.map(UserId::from_uuid),
            verified_at: self.verified_at.map(Timestamp::from_utc),
        })
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    application_id: Uuid,
    previous_status: String,
    new_status: String,
    changed_by: Uuid,
    change_reason: String,
    changed_at: DateTime<Utc>,
}

impl HistoryRow {
    fn into_record(self) -> Option<StatusHistoryEntry> {
        match (
            self.previous_status.parse::<ApplicationStatus>(),
            self.new_status.parse::<ApplicationStatus>(),
        ) {
            (Ok(previous_status), Ok(new_status)) => Some(StatusHistoryEntry {
                previous_status,
                new_status,
                changed_by: UserId::from_uuid(self.changed_by),
                change_reason: self.change_reason,
                changed_at: Timestamp::from_utc(self.changed_at),
            }),
            _ => {
                tracing::error!(
                    application_id = %self.application_id,
                    previous = %self.previous_status,
                    new = %self.new_status,
                    "skipping history row with unknown status"
                );
                None
            }
        }
    }
}
