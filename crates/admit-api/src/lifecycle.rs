//! # Application Lifecycle Service
//!
//! Facade over the catalog, the application aggregates, upload storage and
//! the optional Postgres write-through. Every route goes through here.
//!
//! ## Concurrency
//!
//! - Each application sits behind its own `tokio::sync::Mutex`. A mutation
//!   locks it, works on a clone, persists the clone, and only then swaps it
//!   in. A failed step leaves the stored aggregate untouched.
//! - `(applicant, program)` pairs are reserved in a `DashMap` before any
//!   I/O so concurrent duplicate creates cannot both succeed. A failed
//!   create releases its reservation.
//! - Catalog writes are serialized by an async mutex and follow the same
//!   clone, persist, swap sequence. Reads take a short `parking_lot` read
//!   lock that is never held across an await.
//! - A requirement change also locks every application of its program, in
//!   id order, until the new catalog and the recomputed completeness flags
//!   are both in place.

use std::collections::BTreeMap;
use std::sync::Arc;

use admit_core::{
    Actor, ApplicationId, ApplicationNumber, DepartmentId, DocumentId, FieldErrors, ProgramId,
    RequirementId, Role, Timestamp, UserId,
};
use admit_state::{
    extension_of, is_complete, Application, ApplicationError, ApplicationForm, ApplicationStatus,
    Catalog, CatalogError, Department, DepartmentDraft, Document, DocumentRequirement, Program,
    ProgramDraft, RequirementDraft,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{RwLock, RwLockReadGuard};
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::db;
use crate::db::catalog::RequirementWrite;
use crate::feed::{ChangeFeed, EventKind};
use crate::storage::{FileStorage, StorageError};

const PROGRAM_FIELD: &str = "program_id";
const DOCUMENT_TYPE_FIELD: &str = "document_type";
const DEFAULT_WITHDRAW_REASON: &str = "Withdrawn by applicant";

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Application not found")]
    ApplicationNotFound,

    #[error("Document not found")]
    DocumentNotFound,

    #[error("You have already applied for this program")]
    AlreadyApplied,

    #[error("Cannot delete a program that has applications")]
    ProgramInUse,

    #[error("{}", .0.joined())]
    Invalid(FieldErrors),

    #[error(transparent)]
    Application(#[from] ApplicationError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),
}

/// Per-application facts needed without locking the aggregate.
#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    applicant_id: UserId,
    program_id: ProgramId,
    status: ApplicationStatus,
    created_at: Timestamp,
}

impl IndexEntry {
    fn of(app: &Application) -> Self {
        Self {
            applicant_id: app.applicant_id,
            program_id: app.program_id,
            status: app.status,
            created_at: app.created_at,
        }
    }
}

type Handle = Arc<Mutex<Application>>;

/// The application lifecycle service.
#[derive(Debug)]
pub struct Lifecycle {
    catalog: RwLock<Catalog>,
    catalog_writes: Mutex<()>,
    applications: DashMap<ApplicationId, Handle>,
    index: DashMap<ApplicationId, IndexEntry>,
    /// `None` while a create for the pair is in flight.
    applied: DashMap<(UserId, ProgramId), Option<ApplicationId>>,
    numbers: DashMap<ApplicationNumber, ApplicationId>,
    documents: DashMap<DocumentId, ApplicationId>,
    storage: FileStorage,
    db: Option<PgPool>,
    feed: ChangeFeed,
}

impl Lifecycle {
    pub fn new(storage: FileStorage, db: Option<PgPool>) -> Self {
        Self {
            catalog: RwLock::new(Catalog::new()),
            catalog_writes: Mutex::new(()),
            applications: DashMap::new(),
            index: DashMap::new(),
            applied: DashMap::new(),
            numbers: DashMap::new(),
            documents: DashMap::new(),
            storage,
            db,
            feed: ChangeFeed::default(),
        }
    }

    /// Replace all in-memory state with persisted rows. Cached completeness
    /// is recomputed against the loaded catalog.
    pub fn restore(&self, catalog: Catalog, applications: Vec<Application>) {
        self.applications.clear();
        self.index.clear();
        self.applied.clear();
        self.numbers.clear();
        self.documents.clear();
        for mut app in applications {
            let requirements: Vec<DocumentRequirement> = catalog
                .requirements_for(&app.program_id)
                .into_iter()
                .cloned()
                .collect();
            app.recompute_completeness(&requirements);
            self.track(&app);
            self.applications.insert(app.id, Arc::new(Mutex::new(app)));
        }
        *self.catalog.write() = catalog;
    }

    fn track(&self, app: &Application) {
        self.index.insert(app.id, IndexEntry::of(app));
        self.applied
            .insert((app.applicant_id, app.program_id), Some(app.id));
        self.numbers.insert(app.application_number.clone(), app.id);
        for document in app.documents.iter() {
            self.documents.insert(document.id, app.id);
        }
    }

    // ── Read access ────────────────────────────────────────────────────

    /// Read guard over the catalog. Do not hold across an await.
    pub fn catalog(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read()
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    /// Applications holding a seat in `program_id`.
    pub fn occupied_seats(&self, program_id: &ProgramId) -> usize {
        self.index
            .iter()
            .filter(|e| e.program_id == *program_id && e.status.counts_against_capacity())
            .count()
    }

    /// Application count per status, every status present.
    pub fn status_counts(&self) -> BTreeMap<ApplicationStatus, usize> {
        let mut counts: BTreeMap<ApplicationStatus, usize> =
            ApplicationStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        for entry in self.index.iter() {
            *counts.entry(entry.status).or_default() += 1;
        }
        counts
    }

    pub fn application_count(&self) -> usize {
        self.index.len()
    }

    /// Whether the caller already has an application for `program_id`.
    /// Always false for staff.
    pub fn has_applied(&self, actor: &Actor, program_id: ProgramId) -> bool {
        actor.role == Role::Applicant
            && self
                .applied
                .get(&(actor.user_id, program_id))
                .is_some_and(|e| e.value().is_some())
    }

    pub async fn get(&self, actor: &Actor, id: ApplicationId) -> Result<Application, LifecycleError> {
        let handle = self.handle(id)?;
        let current = handle.lock().await;
        ensure_visible(&current, actor)?;
        Ok(current.clone())
    }

    /// Applications visible to `actor`, newest first.
    pub async fn list(&self, actor: &Actor) -> Vec<Application> {
        let mut ids: Vec<(ApplicationId, Timestamp)> = self
            .index
            .iter()
            .filter(|e| actor.is_staff() || actor.owns(&e.applicant_id))
            .map(|e| (*e.key(), e.created_at))
            .collect();
        ids.sort_by(|a, b| b.1.cmp(&a.1));

        let mut out = Vec::with_capacity(ids.len());
        for (id, _) in ids {
            if let Ok(handle) = self.handle(id) {
                out.push(handle.lock().await.clone());
            }
        }
        out
    }

    // ── Applications ───────────────────────────────────────────────────

    /// Create a draft application for the calling applicant.
    ///
    /// `program_id` is the raw reference from the request so that a
    /// missing or unknown program is reported next to the other field
    /// errors.
    pub async fn create(
        &self,
        actor: &Actor,
        program_id: Option<&str>,
        form: ApplicationForm,
    ) -> Result<Application, LifecycleError> {
        if actor.role != Role::Applicant {
            return Err(ApplicationError::RoleNotPermitted {
                role: actor.role,
                action: "create applications",
            }
            .into());
        }

        let (fields, program_id) = match (form.validate(), self.resolve_program(program_id)) {
            (Ok(fields), Ok(program_id)) => (fields, program_id),
            (fields, program) => {
                let mut errors = FieldErrors::new();
                if let Err(e) = fields {
                    errors.merge(e);
                }
                if let Err(e) = program {
                    errors.merge(e);
                }
                return Err(LifecycleError::Invalid(errors));
            }
        };

        let key = (actor.user_id, program_id);
        match self.applied.entry(key) {
            Entry::Occupied(_) => return Err(LifecycleError::AlreadyApplied),
            Entry::Vacant(slot) => {
                slot.insert(None);
            }
        }

        let now = Timestamp::now();
        let result = match self.check_program_open(&program_id, now) {
            Ok(requirements) => {
                self.insert_new(actor, program_id, fields, &requirements, now)
                    .await
            }
            Err(errors) => Err(LifecycleError::Invalid(errors)),
        };
        match result {
            Ok(app) => {
                self.applied.insert(key, Some(app.id));
                Ok(app)
            }
            Err(e) => {
                self.applied.remove(&key);
                Err(e)
            }
        }
    }

    fn resolve_program(&self, raw: Option<&str>) -> Result<ProgramId, FieldErrors> {
        let raw = raw
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FieldErrors::single(PROGRAM_FIELD, "This field is required."))?;
        let invalid = || FieldErrors::single(PROGRAM_FIELD, "Invalid program selected");
        let id: ProgramId = raw.parse().map_err(|_| invalid())?;
        if self.catalog.read().program(&id).is_none() {
            return Err(invalid());
        }
        Ok(id)
    }

    /// Window and seat checks, returning the program's active requirements.
    fn check_program_open(
        &self,
        program_id: &ProgramId,
        now: Timestamp,
    ) -> Result<Vec<DocumentRequirement>, FieldErrors> {
        let catalog = self.catalog.read();
        let program = catalog
            .program(program_id)
            .ok_or_else(|| FieldErrors::single(PROGRAM_FIELD, "Invalid program selected"))?;
        if !program.is_application_open(now) {
            return Err(FieldErrors::single(
                PROGRAM_FIELD,
                "Applications are closed for this program",
            ));
        }
        if program.available_seats(self.occupied_seats(program_id)) == 0 {
            return Err(FieldErrors::single(
                PROGRAM_FIELD,
                "No seats available for this program",
            ));
        }
        Ok(catalog
            .requirements_for(program_id)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn insert_new(
        &self,
        actor: &Actor,
        program_id: ProgramId,
        fields: admit_state::ApplicationFields,
        requirements: &[DocumentRequirement],
        now: Timestamp,
    ) -> Result<Application, LifecycleError> {
        let (id, number) = self.reserve_number(now);
        let app = match Application::new(id, actor, program_id, fields, requirements, now) {
            Ok(app) => app,
            Err(e) => {
                self.numbers.remove(&number);
                return Err(e.into());
            }
        };

        if let Some(pool) = &self.db {
            if let Err(e) = db::applications::insert(pool, &app).await {
                self.numbers.remove(&number);
                return Err(persist_failed(id, "create", e));
            }
        }

        self.index.insert(id, IndexEntry::of(&app));
        self.applications
            .insert(id, Arc::new(Mutex::new(app.clone())));
        self.feed
            .publish(id, app.applicant_id, EventKind::Created, now);
        tracing::info!(
            application_id = %id,
            application_number = %app.application_number,
            program_id = %program_id,
            "application created"
        );
        Ok(app)
    }

    /// Pick an id whose derived application number is unused.
    fn reserve_number(&self, now: Timestamp) -> (ApplicationId, ApplicationNumber) {
        loop {
            let id = ApplicationId::new();
            let number = ApplicationNumber::derive(now.year(), &id);
            if let Entry::Vacant(slot) = self.numbers.entry(number.clone()) {
                slot.insert(id);
                return (id, number);
            }
            tracing::debug!(number = %number, "application number collision, regenerating");
        }
    }

    /// Full replace of the applicant-supplied fields.
    pub async fn update(
        &self,
        actor: &Actor,
        id: ApplicationId,
        form: ApplicationForm,
    ) -> Result<Application, LifecycleError> {
        let handle = self.handle(id)?;
        let mut current = handle.lock().await;
        ensure_visible(&current, actor)?;
        current.ensure_editable(actor)?;
        let fields = form.validate().map_err(LifecycleError::Invalid)?;

        let now = Timestamp::now();
        let mut next = current.clone();
        next.update_fields(actor, fields, now)?;
        if let Some(pool) = &self.db {
            db::applications::update_fields(pool, &next)
                .await
                .map_err(|e| persist_failed(id, "update", e))?;
        }
        *current = next;

        self.feed
            .publish(id, current.applicant_id, EventKind::Updated, now);
        Ok(current.clone())
    }

    /// DRAFT → SUBMITTED by the owning applicant.
    pub async fn submit(
        &self,
        actor: &Actor,
        id: ApplicationId,
    ) -> Result<Application, LifecycleError> {
        self.transition(actor, id, |app, requirements, now| {
            app.submit(actor, requirements, now)
        })
        .await
    }

    /// Staff status change. Applicants are refused before any lookup.
    pub async fn change_status(
        &self,
        actor: &Actor,
        id: ApplicationId,
        status: &str,
        reason: &str,
    ) -> Result<Application, LifecycleError> {
        if !actor.is_staff() {
            return Err(ApplicationError::RoleNotPermitted {
                role: actor.role,
                action: "change application status",
            }
            .into());
        }
        let to: ApplicationStatus = status.trim().parse()?;
        self.transition(actor, id, |app, _, now| {
            app.change_status(actor, to, reason, now)
        })
        .await
    }

    /// Applicant withdrawal from any non-terminal status.
    pub async fn withdraw(
        &self,
        actor: &Actor,
        id: ApplicationId,
        reason: &str,
    ) -> Result<Application, LifecycleError> {
        let reason = match reason.trim() {
            "" => DEFAULT_WITHDRAW_REASON,
            given => given,
        };
        self.transition(actor, id, |app, _, now| app.withdraw(actor, reason, now))
            .await
    }

    /// Apply one status transition and persist it with its history entry.
    async fn transition<F>(
        &self,
        actor: &Actor,
        id: ApplicationId,
        apply: F,
    ) -> Result<Application, LifecycleError>
    where
        F: FnOnce(&mut Application, &[DocumentRequirement], Timestamp) -> Result<(), ApplicationError>,
    {
        let handle = self.handle(id)?;
        let mut current = handle.lock().await;
        ensure_visible(&current, actor)?;

        let requirements = self.requirements_snapshot(&current.program_id);
        let now = Timestamp::now();
        let mut next = current.clone();
        apply(&mut next, &requirements, now)?;

        if let (Some(pool), Some(entry)) = (&self.db, next.history.last()) {
            db::applications::record_transition(pool, &next, entry)
                .await
                .map_err(|e| persist_failed(id, "transition", e))?;
        }

        let from = current.status;
        *current = next;
        if let Some(mut entry) = self.index.get_mut(&id) {
            entry.status = current.status;
        }
        self.feed.publish(
            id,
            current.applicant_id,
            EventKind::StatusChanged {
                from,
                to: current.status,
            },
            now,
        );
        tracing::info!(
            application_id = %id,
            from = %from,
            to = %current.status,
            changed_by = %actor.user_id,
            "application status changed"
        );
        Ok(current.clone())
    }

    // ── Documents ──────────────────────────────────────────────────────

    /// Store an upload for one requirement, replacing any earlier document
    /// for it. The previous file is removed only after the new state is
    /// committed.
    pub async fn upload_document(
        &self,
        actor: &Actor,
        application_id: ApplicationId,
        requirement_id: RequirementId,
        original_filename: &str,
        bytes: &[u8],
    ) -> Result<Document, LifecycleError> {
        let handle = self.handle(application_id)?;
        let mut current = handle.lock().await;
        ensure_visible(&current, actor)?;

        let (requirement, requirements) = {
            let catalog = self.catalog.read();
            let requirement = catalog.requirement(&requirement_id).cloned().ok_or_else(|| {
                LifecycleError::Invalid(FieldErrors::single(
                    DOCUMENT_TYPE_FIELD,
                    "Invalid document type selected",
                ))
            })?;
            let requirements: Vec<DocumentRequirement> = catalog
                .requirements_for(&current.program_id)
                .into_iter()
                .cloned()
                .collect();
            (requirement, requirements)
        };

        let size = bytes.len() as u64;
        current.check_upload(actor, &requirement, original_filename, size)?;
        let extension = extension_of(original_filename).unwrap_or_default();
        let stored = self
            .storage
            .store(current.applicant_id, current.id, &extension, bytes)
            .await?;

        let now = Timestamp::now();
        let document = Document {
            id: DocumentId::new(),
            application_id,
            requirement_id,
            stored_path: stored.relative_path.clone(),
            original_filename: original_filename.to_string(),
            file_size: stored.size,
            sha256: stored.sha256,
            uploaded_at: now,
            verified: false,
            verification_notes: String::new(),
            verified_by: None,
            verified_at: None,
        };

        let mut next = current.clone();
        let replaced =
            match next.attach_document(actor, &requirement, document.clone(), &requirements, now) {
                Ok(replaced) => replaced,
                Err(e) => {
                    self.discard(&stored.relative_path).await;
                    return Err(e.into());
                }
            };
        if let Some(pool) = &self.db {
            if let Err(e) = db::applications::upsert_document(pool, &next, &document).await {
                self.discard(&stored.relative_path).await;
                return Err(persist_failed(application_id, "upload", e));
            }
        }
        *current = next;

        if let Some(old) = &replaced {
            self.documents.remove(&old.id);
        }
        self.documents.insert(document.id, application_id);
        self.feed.publish(
            application_id,
            current.applicant_id,
            EventKind::DocumentUploaded {
                requirement_id: *requirement_id.as_uuid(),
                is_complete: current.is_complete,
            },
            now,
        );
        tracing::info!(
            application_id = %application_id,
            document_id = %document.id,
            requirement = %requirement.document_name,
            size,
            replaced = replaced.is_some(),
            is_complete = current.is_complete,
            "document uploaded"
        );
        drop(current);

        if let Some(old) = replaced {
            self.discard(&old.stored_path).await;
        }
        Ok(document)
    }

    /// Staff verification of one document. Completeness is not affected.
    pub async fn verify_document(
        &self,
        actor: &Actor,
        document_id: DocumentId,
        verified: bool,
        notes: String,
    ) -> Result<Document, LifecycleError> {
        if !actor.is_staff() {
            return Err(ApplicationError::RoleNotPermitted {
                role: actor.role,
                action: "verify documents",
            }
            .into());
        }
        let application_id = self
            .documents
            .get(&document_id)
            .map(|e| *e.value())
            .ok_or(LifecycleError::DocumentNotFound)?;
        let handle = self.handle(application_id)?;
        let mut current = handle.lock().await;

        let now = Timestamp::now();
        let mut next = current.clone();
        let document = next
            .verify_document(actor, document_id, verified, notes, now)?
            .clone();
        if let Some(pool) = &self.db {
            db::applications::update_verification(pool, &document)
                .await
                .map_err(|e| persist_failed(application_id, "verify", e))?;
        }
        *current = next;

        self.feed.publish(
            application_id,
            current.applicant_id,
            EventKind::DocumentVerified {
                document_id: *document_id.as_uuid(),
                verified,
            },
            now,
        );
        tracing::info!(
            document_id = %document_id,
            verified,
            verified_by = %actor.user_id,
            "document verification recorded"
        );
        Ok(document)
    }

    /// Metadata and stored bytes of a document the caller may see.
    pub async fn read_document(
        &self,
        actor: &Actor,
        document_id: DocumentId,
    ) -> Result<(Document, Vec<u8>), LifecycleError> {
        let application_id = self
            .documents
            .get(&document_id)
            .map(|e| *e.value())
            .ok_or(LifecycleError::DocumentNotFound)?;
        let handle = self.handle(application_id)?;
        let document = {
            let current = handle.lock().await;
            ensure_visible(&current, actor).map_err(|_| LifecycleError::DocumentNotFound)?;
            let document = current
                .documents
                .iter()
                .find(|d| d.id == document_id)
                .cloned()
                .ok_or(LifecycleError::DocumentNotFound)?;
            document
        };
        let bytes = self.storage.read(&document.stored_path).await?;
        Ok((document, bytes))
    }

    async fn discard(&self, relative_path: &str) {
        if let Err(e) = self.storage.remove(relative_path).await {
            tracing::warn!(path = %relative_path, error = %e, "failed to remove stored upload");
        }
    }

    // ── Catalog ────────────────────────────────────────────────────────

    pub async fn create_department(
        &self,
        draft: DepartmentDraft,
    ) -> Result<Department, LifecycleError> {
        let _writer = self.catalog_writes.lock().await;
        let mut next = self.catalog.read().clone();
        let department = next.add_department(draft, Timestamp::now())?.clone();
        if let Some(pool) = &self.db {
            db::catalog::insert_department(pool, &department)
                .await
                .map_err(|e| catalog_persist_failed("create department", e))?;
        }
        *self.catalog.write() = next;
        tracing::info!(department_id = %department.id, code = %department.code, "department created");
        Ok(department)
    }

    pub async fn update_department(
        &self,
        id: DepartmentId,
        draft: DepartmentDraft,
    ) -> Result<Department, LifecycleError> {
        let _writer = self.catalog_writes.lock().await;
        let mut next = self.catalog.read().clone();
        let department = next.update_department(id, draft)?.clone();
        if let Some(pool) = &self.db {
            db::catalog::update_department(pool, &department)
                .await
                .map_err(|e| catalog_persist_failed("update department", e))?;
        }
        *self.catalog.write() = next;
        tracing::info!(department_id = %id, code = %department.code, "department updated");
        Ok(department)
    }

    /// Refused while any program belongs to the department.
    pub async fn delete_department(&self, id: DepartmentId) -> Result<Department, LifecycleError> {
        let _writer = self.catalog_writes.lock().await;
        let mut next = self.catalog.read().clone();
        let department = next.remove_department(id)?;
        if let Some(pool) = &self.db {
            db::catalog::delete_department(pool, id)
                .await
                .map_err(|e| catalog_persist_failed("delete department", e))?;
        }
        *self.catalog.write() = next;
        tracing::info!(department_id = %id, code = %department.code, "department deleted");
        Ok(department)
    }

    pub async fn create_program(&self, draft: ProgramDraft) -> Result<Program, LifecycleError> {
        let _writer = self.catalog_writes.lock().await;
        let mut next = self.catalog.read().clone();
        let program = next.add_program(draft, Timestamp::now())?.clone();
        if let Some(pool) = &self.db {
            db::catalog::insert_program(pool, &program)
                .await
                .map_err(|e| catalog_persist_failed("create program", e))?;
        }
        *self.catalog.write() = next;
        tracing::info!(program_id = %program.id, code = %program.code, "program created");
        Ok(program)
    }

    pub async fn update_program(
        &self,
        id: ProgramId,
        draft: ProgramDraft,
    ) -> Result<Program, LifecycleError> {
        let _writer = self.catalog_writes.lock().await;
        let mut next = self.catalog.read().clone();
        let program = next.update_program(id, draft, Timestamp::now())?.clone();
        if let Some(pool) = &self.db {
            db::catalog::update_program(pool, &program)
                .await
                .map_err(|e| catalog_persist_failed("update program", e))?;
        }
        *self.catalog.write() = next;
        tracing::info!(program_id = %id, "program updated");
        Ok(program)
    }

    /// Delete a program and its requirements. Refused while any
    /// application, committed or in flight, references it.
    pub async fn delete_program(&self, id: ProgramId) -> Result<Program, LifecycleError> {
        let _writer = self.catalog_writes.lock().await;
        let referenced = self.applied.iter().any(|e| e.key().1 == id)
            || self.index.iter().any(|e| e.program_id == id);
        if referenced {
            return Err(LifecycleError::ProgramInUse);
        }
        let mut next = self.catalog.read().clone();
        let program = next.remove_program(id)?;
        if let Some(pool) = &self.db {
            db::catalog::delete_program(pool, id)
                .await
                .map_err(|e| catalog_persist_failed("delete program", e))?;
        }
        *self.catalog.write() = next;
        tracing::info!(program_id = %id, "program deleted");
        Ok(program)
    }

    pub async fn add_requirement(
        &self,
        program_id: ProgramId,
        draft: RequirementDraft,
    ) -> Result<DocumentRequirement, LifecycleError> {
        let _writer = self.catalog_writes.lock().await;
        let mut next = self.catalog.read().clone();
        let requirement = next.add_requirement(program_id, draft)?.clone();
        self.commit_requirement(next, &requirement, RequirementWrite::Insert, "create requirement")
            .await?;
        tracing::info!(
            requirement_id = %requirement.id,
            program_id = %program_id,
            "document requirement created"
        );
        Ok(requirement)
    }

    pub async fn update_requirement(
        &self,
        id: RequirementId,
        draft: RequirementDraft,
    ) -> Result<DocumentRequirement, LifecycleError> {
        let _writer = self.catalog_writes.lock().await;
        let mut next = self.catalog.read().clone();
        let requirement = next.update_requirement(id, draft)?.clone();
        self.commit_requirement(next, &requirement, RequirementWrite::Update, "update requirement")
            .await?;
        tracing::info!(requirement_id = %id, "document requirement updated");
        Ok(requirement)
    }

    /// Delete = retire. Existing documents keep their requirement link.
    pub async fn retire_requirement(
        &self,
        id: RequirementId,
    ) -> Result<DocumentRequirement, LifecycleError> {
        let _writer = self.catalog_writes.lock().await;
        let mut next = self.catalog.read().clone();
        let requirement = next.retire_requirement(id, Timestamp::now())?.clone();
        self.commit_requirement(next, &requirement, RequirementWrite::Update, "retire requirement")
            .await?;
        tracing::info!(requirement_id = %id, "document requirement retired");
        Ok(requirement)
    }

    /// Swap in `next`, whose requirement set for `requirement.program_id`
    /// changed, and recompute the cached completeness of that program's
    /// applications.
    ///
    /// The applications stay locked from recomputation until the new catalog
    /// is visible, so a concurrent submit or upload sees either the old set
    /// with the old flag or the new set with the new flag. The requirement
    /// row and every changed flag are written in one transaction before
    /// anything in memory moves.
    async fn commit_requirement(
        &self,
        next: Catalog,
        requirement: &DocumentRequirement,
        write: RequirementWrite,
        op: &'static str,
    ) -> Result<(), LifecycleError> {
        let program_id = requirement.program_id;
        let requirements: Vec<DocumentRequirement> = next
            .requirements_for(&program_id)
            .into_iter()
            .cloned()
            .collect();

        // Sorted so that catalog writers always lock in the same order.
        let mut ids: Vec<ApplicationId> = self
            .index
            .iter()
            .filter(|e| e.program_id == program_id)
            .map(|e| *e.key())
            .collect();
        ids.sort();
        let mut locked = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(handle) = self.handle(id) {
                locked.push(handle.lock_owned().await);
            }
        }

        let changed: Vec<(usize, bool)> = locked
            .iter()
            .enumerate()
            .filter_map(|(i, app)| {
                let now_complete = is_complete(&requirements, &app.documents);
                (now_complete != app.is_complete).then_some((i, now_complete))
            })
            .collect();

        if let Some(pool) = &self.db {
            let flags: Vec<(ApplicationId, bool)> = changed
                .iter()
                .map(|(i, complete)| (locked[*i].id, *complete))
                .collect();
            db::catalog::save_requirement(pool, requirement, write, &flags)
                .await
                .map_err(|e| catalog_persist_failed(op, e))?;
        }
        *self.catalog.write() = next;

        let now = Timestamp::now();
        for (i, _) in changed {
            let app = &mut locked[i];
            let complete = app.recompute_completeness(&requirements);
            self.feed.publish(
                app.id,
                app.applicant_id,
                EventKind::CompletenessChanged {
                    is_complete: complete,
                },
                now,
            );
        }
        Ok(())
    }

    fn requirements_snapshot(&self, program_id: &ProgramId) -> Vec<DocumentRequirement> {
        self.catalog
            .read()
            .requirements_for(program_id)
            .into_iter()
            .cloned()
            .collect()
    }

    fn handle(&self, id: ApplicationId) -> Result<Handle, LifecycleError> {
        self.applications
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(LifecycleError::ApplicationNotFound)
    }
}

/// Applications the caller may not read are reported as missing.
fn ensure_visible(app: &Application, actor: &Actor) -> Result<(), LifecycleError> {
    if app.visible_to(actor) {
        Ok(())
    } else {
        Err(LifecycleError::ApplicationNotFound)
    }
}

fn persist_failed(id: ApplicationId, op: &'static str, e: sqlx::Error) -> LifecycleError {
    tracing::error!(application_id = %id, op, error = %e, "failed to persist application");
    LifecycleError::Database(e)
}

fn catalog_persist_failed(op: &'static str, e: sqlx::Error) -> LifecycleError {
    tracing::error!(op, error = %e, "failed to persist catalog change");
    LifecycleError::Database(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use admit_state::{AllowedFormats, ProgramStatus, ProgramType};

    struct Fixture {
        service: Lifecycle,
        program: ProgramId,
        marksheet: RequirementId,
        photo: RequirementId,
        _dir: tempfile::TempDir,
    }

    fn form() -> ApplicationForm {
        serde_json::from_value(serde_json::json!({
            "date_of_birth": "2006-04-12",
            "gender": "female",
            "permanent_address": "12 Lake Road, Pune",
            "emergency_contact_name": "R. Sharma",
            "emergency_contact_phone": "9876543210",
            "emergency_contact_relation": "Father",
            "tenth_percentage": 91.4,
            "tenth_board": "CBSE",
            "tenth_year": 2022
        }))
        .unwrap()
    }

    fn program_draft(department_id: admit_core::DepartmentId, capacity: u32) -> ProgramDraft {
        let now = chrono::Utc::now();
        ProgramDraft {
            name: "B.Tech Computer Science".into(),
            code: "BTCS".into(),
            department_id,
            program_type: ProgramType::Undergraduate,
            duration_years: 4,
            duration_semesters: 8,
            description: "Four year programme".into(),
            intake_capacity: capacity,
            fees_per_semester: admit_state::Amount::parse("85000").unwrap(),
            application_fee: admit_state::Amount::parse("500").unwrap(),
            min_percentage: 60.0,
            eligibility_criteria: "12th with PCM".into(),
            application_start_date: Timestamp::from_utc(now - chrono::Duration::days(1)),
            application_end_date: Timestamp::from_utc(now + chrono::Duration::days(30)),
            status: ProgramStatus::Active,
        }
    }

    fn requirement(name: &str, mandatory: bool) -> RequirementDraft {
        RequirementDraft {
            document_name: name.into(),
            description: String::new(),
            is_mandatory: mandatory,
            max_file_size_mb: 1,
            allowed_formats: AllowedFormats::default(),
        }
    }

    async fn fixture(capacity: u32) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let service = Lifecycle::new(FileStorage::new(dir.path()), None);
        let department = service
            .create_department(DepartmentDraft {
                name: "Engineering".into(),
                code: "ENG".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let program = service
            .create_program(program_draft(department.id, capacity))
            .await
            .unwrap();
        let marksheet = service
            .add_requirement(program.id, requirement("10th Marksheet", true))
            .await
            .unwrap();
        let photo = service
            .add_requirement(program.id, requirement("Photo", true))
            .await
            .unwrap();
        service
            .add_requirement(program.id, requirement("Resume", false))
            .await
            .unwrap();
        Fixture {
            service,
            program: program.id,
            marksheet: marksheet.id,
            photo: photo.id,
            _dir: dir,
        }
    }

    async fn draft(f: &Fixture, applicant: &Actor) -> Application {
        f.service
            .create(applicant, Some(f.program.to_string().as_str()), form())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn full_lifecycle_records_history() {
        let f = fixture(10).await;
        let applicant = Actor::applicant(UserId::new());
        let app = draft(&f, &applicant).await;
        assert!(!app.is_complete);

        f.service
            .upload_document(&applicant, app.id, f.marksheet, "marks.pdf", b"%PDF")
            .await
            .unwrap();
        assert!(!f.service.get(&applicant, app.id).await.unwrap().is_complete);
        f.service
            .upload_document(&applicant, app.id, f.photo, "me.jpg", b"jpeg")
            .await
            .unwrap();
        assert!(f.service.get(&applicant, app.id).await.unwrap().is_complete);

        let submitted = f.service.submit(&applicant, app.id).await.unwrap();
        assert_eq!(submitted.status, ApplicationStatus::Submitted);
        assert!(submitted.submitted_at.is_some());

        let officer = Actor::officer(UserId::new());
        let reviewed = f
            .service
            .change_status(&officer, app.id, "under_review", "initial screen")
            .await
            .unwrap();
        assert_eq!(reviewed.history.len(), 2);
        assert_eq!(reviewed.history[1].change_reason, "initial screen");
        assert_eq!(reviewed.reviewed_by, Some(officer.user_id));
    }

    #[tokio::test]
    async fn duplicate_application_conflicts() {
        let f = fixture(10).await;
        let applicant = Actor::applicant(UserId::new());
        draft(&f, &applicant).await;
        let err = f
            .service
            .create(&applicant, Some(f.program.to_string().as_str()), form())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyApplied));
        assert!(f.service.has_applied(&applicant, f.program));
        assert!(!f.service.has_applied(&Actor::officer(UserId::new()), f.program));
    }

    #[tokio::test]
    async fn concurrent_duplicate_creates_admit_one() {
        let f = fixture(10).await;
        let applicant = Actor::applicant(UserId::new());
        let program = f.program.to_string();
        let (a, b) = tokio::join!(
            f.service.create(&applicant, Some(program.as_str()), form()),
            f.service.create(&applicant, Some(program.as_str()), form()),
        );
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(f.service.application_count(), 1);
    }

    #[tokio::test]
    async fn create_reports_program_and_field_errors_together() {
        let f = fixture(10).await;
        let applicant = Actor::applicant(UserId::new());
        let mut bad = form();
        bad.permanent_address = None;
        let err = f
            .service
            .create(&applicant, Some("not-a-uuid"), bad)
            .await
            .unwrap_err();
        match err {
            LifecycleError::Invalid(fields) => {
                assert_eq!(fields.get("program_id").unwrap(), ["Invalid program selected"]);
                assert!(fields.get("permanent_address").is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!f.service.has_applied(&applicant, f.program));
    }

    #[tokio::test]
    async fn staff_cannot_create() {
        let f = fixture(10).await;
        let err = f
            .service
            .create(&Actor::officer(UserId::new()), Some(f.program.to_string().as_str()), form())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Application(ApplicationError::RoleNotPermitted { .. })
        ));
    }

    #[tokio::test]
    async fn full_program_refuses_new_applications() {
        let f = fixture(1).await;
        let first = Actor::applicant(UserId::new());
        let app = draft(&f, &first).await;
        f.service
            .upload_document(&first, app.id, f.marksheet, "m.pdf", b"1")
            .await
            .unwrap();
        f.service
            .upload_document(&first, app.id, f.photo, "p.png", b"2")
            .await
            .unwrap();
        f.service.submit(&first, app.id).await.unwrap();

        let err = f
            .service
            .create(&Actor::applicant(UserId::new()), Some(f.program.to_string().as_str()), form())
            .await
            .unwrap_err();
        match err {
            LifecycleError::Invalid(fields) => assert_eq!(
                fields.get("program_id").unwrap(),
                ["No seats available for this program"]
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn incomplete_submit_leaves_draft() {
        let f = fixture(10).await;
        let applicant = Actor::applicant(UserId::new());
        let app = draft(&f, &applicant).await;
        let err = f.service.submit(&applicant, app.id).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Application(ApplicationError::Incomplete { .. })
        ));
        let after = f.service.get(&applicant, app.id).await.unwrap();
        assert_eq!(after.status, ApplicationStatus::Draft);
        assert!(after.history.is_empty());
    }

    #[tokio::test]
    async fn other_applicants_see_not_found() {
        let f = fixture(10).await;
        let owner = Actor::applicant(UserId::new());
        let app = draft(&f, &owner).await;
        let stranger = Actor::applicant(UserId::new());
        assert!(matches!(
            f.service.get(&stranger, app.id).await,
            Err(LifecycleError::ApplicationNotFound)
        ));
        assert!(matches!(
            f.service.submit(&stranger, app.id).await,
            Err(LifecycleError::ApplicationNotFound)
        ));
        assert!(f.service.list(&stranger).await.is_empty());
        assert_eq!(f.service.list(&Actor::admin(UserId::new())).await.len(), 1);
    }

    #[tokio::test]
    async fn applicant_status_change_is_always_refused() {
        let f = fixture(10).await;
        let owner = Actor::applicant(UserId::new());
        let app = draft(&f, &owner).await;
        for target in ["submitted", "admitted", "bogus"] {
            let err = f
                .service
                .change_status(&owner, app.id, target, "")
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                LifecycleError::Application(ApplicationError::RoleNotPermitted { .. })
            ));
        }
    }

    #[tokio::test]
    async fn replacing_an_upload_removes_the_old_file() {
        let f = fixture(10).await;
        let applicant = Actor::applicant(UserId::new());
        let app = draft(&f, &applicant).await;
        let first = f
            .service
            .upload_document(&applicant, app.id, f.photo, "a.png", b"first")
            .await
            .unwrap();
        let second = f
            .service
            .upload_document(&applicant, app.id, f.photo, "b.png", b"second")
            .await
            .unwrap();

        let current = f.service.get(&applicant, app.id).await.unwrap();
        assert_eq!(current.documents.len(), 1);
        assert_eq!(current.documents.for_requirement(&f.photo).unwrap().id, second.id);
        assert!(f.service.storage().read(&first.stored_path).await.is_err());
        assert_eq!(
            f.service.storage().read(&second.stored_path).await.unwrap(),
            b"second"
        );
    }

    #[tokio::test]
    async fn rejected_upload_leaves_no_file() {
        let f = fixture(10).await;
        let applicant = Actor::applicant(UserId::new());
        let app = draft(&f, &applicant).await;
        let err = f
            .service
            .upload_document(&applicant, app.id, f.photo, "virus.exe", b"MZ")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Application(ApplicationError::Document(_))
        ));
        let root = f.service.storage().root().join("applications");
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn retiring_a_requirement_recomputes_completeness() {
        let f = fixture(10).await;
        let applicant = Actor::applicant(UserId::new());
        let app = draft(&f, &applicant).await;
        f.service
            .upload_document(&applicant, app.id, f.marksheet, "m.pdf", b"1")
            .await
            .unwrap();
        let mut events = f.service.feed().subscribe();

        f.service.retire_requirement(f.photo).await.unwrap();

        assert!(f.service.get(&applicant, app.id).await.unwrap().is_complete);
        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::CompletenessChanged { is_complete: true });
    }

    #[tokio::test]
    async fn adding_a_mandatory_requirement_marks_complete_drafts_incomplete() {
        let f = fixture(10).await;
        let applicant = Actor::applicant(UserId::new());
        let app = draft(&f, &applicant).await;
        for (requirement, name) in [(f.marksheet, "m.pdf"), (f.photo, "p.png")] {
            f.service
                .upload_document(&applicant, app.id, requirement, name, b"1")
                .await
                .unwrap();
        }
        assert!(f.service.get(&applicant, app.id).await.unwrap().is_complete);

        f.service
            .add_requirement(f.program, requirement("12th Marksheet", true))
            .await
            .unwrap();

        let after = f.service.get(&applicant, app.id).await.unwrap();
        assert!(!after.is_complete);
        assert_flag_matches_catalog(&f, &after);
    }

    /// The cached flag agrees with a fresh evaluation against the catalog.
    fn assert_flag_matches_catalog(f: &Fixture, app: &Application) {
        let catalog = f.service.catalog();
        let expected = is_complete(catalog.requirements_for(&app.program_id), &app.documents);
        drop(catalog);
        assert_eq!(app.is_complete, expected, "stale completeness flag");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn submit_racing_a_retirement_ends_consistent() {
        for _ in 0..25 {
            let f = fixture(10).await;
            let applicant = Actor::applicant(UserId::new());
            let app = draft(&f, &applicant).await;
            f.service
                .upload_document(&applicant, app.id, f.marksheet, "m.pdf", b"1")
                .await
                .unwrap();

            let (submitted, retired) = tokio::join!(
                f.service.submit(&applicant, app.id),
                f.service.retire_requirement(f.photo),
            );
            retired.unwrap();

            let after = f.service.get(&applicant, app.id).await.unwrap();
            assert!(after.is_complete);
            assert_flag_matches_catalog(&f, &after);
            match submitted {
                Ok(_) => {
                    assert_eq!(after.status, ApplicationStatus::Submitted);
                    assert_eq!(after.history.len(), 1);
                }
                Err(err) => {
                    assert!(matches!(
                        err,
                        LifecycleError::Application(ApplicationError::Incomplete { .. })
                    ));
                    assert_eq!(after.status, ApplicationStatus::Draft);
                    assert!(after.history.is_empty());
                }
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn submit_racing_the_last_upload_ends_consistent() {
        for _ in 0..25 {
            let f = fixture(10).await;
            let applicant = Actor::applicant(UserId::new());
            let app = draft(&f, &applicant).await;
            f.service
                .upload_document(&applicant, app.id, f.marksheet, "m.pdf", b"1")
                .await
                .unwrap();

            let (submitted, uploaded) = tokio::join!(
                f.service.submit(&applicant, app.id),
                f.service
                    .upload_document(&applicant, app.id, f.photo, "p.png", b"2"),
            );

            let after = f.service.get(&applicant, app.id).await.unwrap();
            assert_flag_matches_catalog(&f, &after);
            match (submitted, uploaded) {
                // Upload first, then a successful submit.
                (Ok(_), Ok(_)) => {
                    assert_eq!(after.status, ApplicationStatus::Submitted);
                    assert!(after.is_complete);
                    assert_eq!(after.history.len(), 1);
                }
                // Submit saw the incomplete draft; the upload then landed.
                (Err(_), Ok(_)) => {
                    assert_eq!(after.status, ApplicationStatus::Draft);
                    assert!(after.is_complete);
                    assert!(after.history.is_empty());
                }
                (submitted, uploaded) => {
                    panic!("unexpected outcome: submit {submitted:?}, upload {uploaded:?}")
                }
            }
        }
    }

    #[tokio::test]
    async fn department_with_programs_is_kept() {
        let f = fixture(10).await;
        let department = f.service.catalog().program(&f.program).unwrap().department_id;
        assert!(matches!(
            f.service.delete_department(department).await,
            Err(LifecycleError::Catalog(CatalogError::DepartmentInUse { .. }))
        ));

        let empty = f
            .service
            .create_department(DepartmentDraft {
                name: "Humanities".into(),
                code: "HUM".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let renamed = f
            .service
            .update_department(
                empty.id,
                DepartmentDraft {
                    name: "Humanities and Arts".into(),
                    code: "HUM".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Humanities and Arts");
        f.service.delete_department(empty.id).await.unwrap();
        assert!(f.service.catalog().department(&empty.id).is_none());
    }

    #[tokio::test]
    async fn verification_is_staff_only_and_keeps_completeness() {
        let f = fixture(10).await;
        let applicant = Actor::applicant(UserId::new());
        let app = draft(&f, &applicant).await;
        let doc = f
            .service
            .upload_document(&applicant, app.id, f.marksheet, "m.pdf", b"1")
            .await
            .unwrap();

        assert!(f
            .service
            .verify_document(&applicant, doc.id, true, String::new())
            .await
            .is_err());

        let officer = Actor::officer(UserId::new());
        let verified = f
            .service
            .verify_document(&officer, doc.id, false, "blurred".into())
            .await
            .unwrap();
        assert!(!verified.verified);
        assert_eq!(verified.verified_by, Some(officer.user_id));
        assert!(!f.service.get(&applicant, app.id).await.unwrap().is_complete);
    }

    #[tokio::test]
    async fn program_with_applications_cannot_be_deleted() {
        let f = fixture(10).await;
        draft(&f, &Actor::applicant(UserId::new())).await;
        assert!(matches!(
            f.service.delete_program(f.program).await,
            Err(LifecycleError::ProgramInUse)
        ));
    }

    #[tokio::test]
    async fn restore_rebuilds_indexes() {
        let f = fixture(10).await;
        let applicant = Actor::applicant(UserId::new());
        let app = draft(&f, &applicant).await;
        let catalog = f.service.catalog().clone();
        let snapshot = f.service.get(&applicant, app.id).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let restored = Lifecycle::new(FileStorage::new(dir.path()), None);
        restored.restore(catalog, vec![snapshot]);

        assert!(restored.has_applied(&applicant, f.program));
        assert_eq!(restored.status_counts()[&ApplicationStatus::Draft], 1);
        assert!(matches!(
            restored
                .create(&applicant, Some(f.program.to_string().as_str()), form())
                .await,
            Err(LifecycleError::AlreadyApplied)
        ));
    }
}
