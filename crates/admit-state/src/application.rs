//! # Application Lifecycle State Machine
//!
//! The application aggregate: applicant-supplied fields, attached documents,
//! the cached completeness flag, the current status and an append-only
//! status history.
//!
//! ## States
//!
//! ```text
//! Draft ──▶ Submitted ──▶ UnderReview ──▶ Shortlisted ──┐
//!              │               │               │        ├──▶ Admitted  (terminal)
//!              │               │               ▼        ├──▶ Rejected  (terminal)
//!              └───────────────┴──────────▶ Waitlisted ─┘
//!
//! any non-terminal ──▶ Withdrawn (terminal, applicant only)
//! ```
//!
//! Staff may revise a reviewed application between Shortlisted, Admitted,
//! Rejected and Waitlisted while it is not terminal. Every transition
//! checks the caller's role first, then the precondition, then writes the
//! new status and appends one history entry.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use admit_core::{
    Actor, ApplicationId, ApplicationNumber, DocumentId, FieldErrors, ProgramId, Role, Timestamp,
    UserId,
};

use crate::catalog::{max_len, percentage_in_range, require_text, DocumentRequirement};
use crate::completeness;
use crate::document::{check_upload, Document, DocumentError, DocumentSet};

/// Reason recorded on the history entry written by [`Application::submit`].
pub const SUBMIT_REASON: &str = "Application submitted by applicant";

// ─── Status ──────────────────────────────────────────────────────────

/// Lifecycle status of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    UnderReview,
    Shortlisted,
    Admitted,
    Rejected,
    Waitlisted,
    Withdrawn,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 8] = [
        Self::Draft,
        Self::Submitted,
        Self::UnderReview,
        Self::Shortlisted,
        Self::Admitted,
        Self::Rejected,
        Self::Waitlisted,
        Self::Withdrawn,
    ];

    /// Review outcomes staff may set on a reviewed application.
    const DECISIONS: [ApplicationStatus; 4] = [
        Self::Shortlisted,
        Self::Admitted,
        Self::Rejected,
        Self::Waitlisted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::Shortlisted => "shortlisted",
            Self::Admitted => "admitted",
            Self::Rejected => "rejected",
            Self::Waitlisted => "waitlisted",
            Self::Withdrawn => "withdrawn",
        }
    }

    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Admitted | Self::Rejected | Self::Withdrawn)
    }

    /// Whether an application in this state holds one of the program's seats.
    pub fn counts_against_capacity(&self) -> bool {
        matches!(
            self,
            Self::Submitted | Self::UnderReview | Self::Shortlisted | Self::Admitted
        )
    }

    /// Whether `role` may move an application from `self` to `to`.
    ///
    /// Submission is additionally gated on completeness and ownership,
    /// which this table does not see.
    pub fn permits(&self, to: ApplicationStatus, role: Role) -> bool {
        if self.is_terminal() || *self == to {
            return false;
        }
        match role {
            Role::Applicant => {
                matches!((self, to), (Self::Draft, Self::Submitted)) || to == Self::Withdrawn
            }
            Role::AdmissionOfficer | Role::Admin => match to {
                Self::UnderReview => *self == Self::Submitted,
                to if Self::DECISIONS.contains(&to) => *self != Self::Draft,
                _ => false,
            },
        }
    }

    /// Statuses `role` may move to from here, in declaration order.
    pub fn valid_transitions(&self, role: Role) -> Vec<ApplicationStatus> {
        Self::ALL
            .into_iter()
            .filter(|to| self.permits(*to, role))
            .collect()
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApplicationStatus {
    type Err = ApplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ApplicationError::UnknownStatus(s.to_string()))
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors raised by application lifecycle operations.
///
/// Every error leaves the aggregate unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApplicationError {
    /// The caller's role may not perform this operation.
    #[error("role {role} may not {action}")]
    RoleNotPermitted { role: Role, action: &'static str },

    /// The caller is not the applicant who owns the application.
    #[error("caller does not own this application")]
    NotOwner,

    /// The application is no longer a draft.
    #[error("application can only be edited while in draft (currently {status})")]
    NotEditable { status: ApplicationStatus },

    #[error("Application has already been submitted")]
    AlreadySubmitted,

    #[error("Please upload all required documents before submitting")]
    Incomplete {
        /// Names of the unmet mandatory requirements.
        missing: Vec<String>,
    },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },

    #[error("Application is in terminal state {state}")]
    TerminalState { state: ApplicationStatus },

    #[error("Application is already {status}")]
    SameStatus { status: ApplicationStatus },

    #[error("Invalid status")]
    UnknownStatus(String),

    /// Applicant-supplied fields failed validation.
    #[error("{0}")]
    Invalid(FieldErrors),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),
}

// ─── Applicant fields ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl std::str::FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            "other" => Ok(Self::Other),
            other => Err(format!("\"{other}\" is not a valid choice.")),
        }
    }
}

/// A numeric form value as it arrives from a client: a JSON number or a
/// string (possibly empty).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormNumber {
    Number(f64),
    Text(String),
}

impl FormNumber {
    /// `Ok(None)` for an empty string.
    fn to_float(&self) -> Result<Option<f64>, &'static str> {
        match self {
            Self::Number(n) => Ok(Some(*n)),
            Self::Text(s) if s.trim().is_empty() => Ok(None),
            Self::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| "A valid number is required."),
        }
    }

    fn to_year(&self) -> Result<Option<u32>, &'static str> {
        const NOT_INTEGER: &str = "A valid integer is required.";
        match self.to_float().map_err(|_| NOT_INTEGER)? {
            None => Ok(None),
            Some(n) if n.fract() != 0.0 || !n.is_finite() => Err(NOT_INTEGER),
            Some(n) if n < 0.0 => Err("Ensure this value is greater than or equal to 0."),
            Some(n) if n > f64::from(u32::MAX) => Err(NOT_INTEGER),
            Some(n) => Ok(Some(n as u32)),
        }
    }
}

/// Unvalidated application form as submitted on create and update.
///
/// Every key is optional on the wire so that missing and malformed values
/// are reported per field by [`ApplicationForm::validate`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApplicationForm {
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub nationality: Option<String>,
    pub permanent_address: Option<String>,
    pub current_address: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub emergency_contact_relation: Option<String>,
    pub tenth_percentage: Option<FormNumber>,
    pub tenth_board: Option<String>,
    pub tenth_year: Option<FormNumber>,
    pub twelfth_percentage: Option<FormNumber>,
    pub twelfth_board: Option<String>,
    pub twelfth_year: Option<FormNumber>,
    pub graduation_percentage: Option<FormNumber>,
    pub graduation_university: Option<String>,
    pub graduation_year: Option<FormNumber>,
    pub graduation_degree: Option<String>,
    pub extracurricular_activities: Option<String>,
    pub work_experience: Option<String>,
    pub statement_of_purpose: Option<String>,
}

const REQUIRED: &str = "This field is required.";

impl ApplicationForm {
    /// Validate into typed fields, collecting every problem per field.
    pub fn validate(self) -> Result<ApplicationFields, FieldErrors> {
        let mut errors = FieldErrors::new();

        let date_of_birth = match self.date_of_birth.as_deref().map(str::trim) {
            None | Some("") => {
                errors.add("date_of_birth", REQUIRED);
                None
            }
            Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    errors.add(
                        "date_of_birth",
                        "Date has wrong format. Use one of these formats instead: YYYY-MM-DD.",
                    );
                    None
                }
            },
        };

        let gender = match self.gender.as_deref() {
            None | Some("") => {
                errors.add("gender", REQUIRED);
                None
            }
            Some(raw) => raw
                .parse::<Gender>()
                .map_err(|msg| errors.add("gender", msg))
                .ok(),
        };

        let nationality = self
            .nationality
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "Indian".to_string());
        max_len(&mut errors, "nationality", &nationality, 100);

        let permanent_address = required_text(
            &mut errors,
            "permanent_address",
            self.permanent_address,
            usize::MAX,
        );
        let emergency_contact_name =
            required_text(&mut errors, "emergency_contact_name", self.emergency_contact_name, 200);
        let emergency_contact_phone =
            required_text(&mut errors, "emergency_contact_phone", self.emergency_contact_phone, 15);
        let emergency_contact_relation = required_text(
            &mut errors,
            "emergency_contact_relation",
            self.emergency_contact_relation,
            100,
        );
        let tenth_board = required_text(&mut errors, "tenth_board", self.tenth_board, 200);

        let tenth_percentage =
            percentage(&mut errors, "tenth_percentage", self.tenth_percentage.as_ref());
        if tenth_percentage.is_none() && errors.get("tenth_percentage").is_none() {
            errors.add("tenth_percentage", REQUIRED);
        }
        let tenth_year = year(&mut errors, "tenth_year", self.tenth_year.as_ref());
        if tenth_year.is_none() && errors.get("tenth_year").is_none() {
            errors.add("tenth_year", REQUIRED);
        }

        let twelfth_percentage =
            percentage(&mut errors, "twelfth_percentage", self.twelfth_percentage.as_ref());
        let twelfth_year = year(&mut errors, "twelfth_year", self.twelfth_year.as_ref());
        let graduation_percentage = percentage(
            &mut errors,
            "graduation_percentage",
            self.graduation_percentage.as_ref(),
        );
        let graduation_year = year(&mut errors, "graduation_year", self.graduation_year.as_ref());

        let twelfth_board = optional_text(&mut errors, "twelfth_board", self.twelfth_board, 200);
        let graduation_university =
            optional_text(&mut errors, "graduation_university", self.graduation_university, 200);
        let graduation_degree =
            optional_text(&mut errors, "graduation_degree", self.graduation_degree, 200);

        errors.into_result()?;

        // Every required value was checked above; a `None` here would have
        // added a field error and returned.
        match (date_of_birth, gender, tenth_percentage, tenth_year) {
            (Some(date_of_birth), Some(gender), Some(tenth_percentage), Some(tenth_year)) => {
                Ok(ApplicationFields {
                    date_of_birth,
                    gender,
                    nationality,
                    permanent_address,
                    current_address: self.current_address.unwrap_or_default(),
                    emergency_contact_name,
                    emergency_contact_phone,
                    emergency_contact_relation,
                    tenth_percentage,
                    tenth_board,
                    tenth_year,
                    twelfth_percentage,
                    twelfth_board,
                    twelfth_year,
                    graduation_percentage,
                    graduation_university,
                    graduation_year,
                    graduation_degree,
                    extracurricular_activities: self.extracurricular_activities.unwrap_or_default(),
                    work_experience: self.work_experience.unwrap_or_default(),
                    statement_of_purpose: self.statement_of_purpose.unwrap_or_default(),
                })
            }
            _ => Err(FieldErrors::single(
                admit_core::NON_FIELD_ERRORS,
                "Application form is incomplete.",
            )),
        }
    }
}

fn required_text(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<String>,
    max: usize,
) -> String {
    match value {
        None => {
            errors.add(field, REQUIRED);
            String::new()
        }
        Some(value) => {
            require_text(errors, field, &value, max);
            value.trim().to_string()
        }
    }
}

fn optional_text(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<String>,
    max: usize,
) -> String {
    let value = value.unwrap_or_default();
    max_len(errors, field, &value, max);
    value.trim().to_string()
}

fn percentage(errors: &mut FieldErrors, field: &str, value: Option<&FormNumber>) -> Option<f64> {
    match value?.to_float() {
        Ok(Some(p)) => {
            percentage_in_range(errors, field, p);
            Some(p)
        }
        Ok(None) => None,
        Err(msg) => {
            errors.add(field, msg);
            None
        }
    }
}

fn year(errors: &mut FieldErrors, field: &str, value: Option<&FormNumber>) -> Option<u32> {
    match value?.to_year() {
        Ok(year) => year,
        Err(msg) => {
            errors.add(field, msg);
            None
        }
    }
}

/// Validated applicant-supplied fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationFields {
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub nationality: String,
    pub permanent_address: String,
    pub current_address: String,
    pub emergency_contact_name: String,
    pub emergency_contact_phone: String,
    pub emergency_contact_relation: String,
    pub tenth_percentage: f64,
    pub tenth_board: String,
    pub tenth_year: u32,
    pub twelfth_percentage: Option<f64>,
    pub twelfth_board: String,
    pub twelfth_year: Option<u32>,
    pub graduation_percentage: Option<f64>,
    pub graduation_university: String,
    pub graduation_year: Option<u32>,
    pub graduation_degree: String,
    pub extracurricular_activities: String,
    pub work_experience: String,
    pub statement_of_purpose: String,
}

// ─── History ─────────────────────────────────────────────────────────

/// One status transition. Appended, never mutated or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub previous_status: ApplicationStatus,
    pub new_status: ApplicationStatus,
    pub changed_by: UserId,
    pub change_reason: String,
    pub changed_at: Timestamp,
}

// ─── Application ─────────────────────────────────────────────────────

/// An application to one program by one applicant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub application_number: ApplicationNumber,
    pub applicant_id: UserId,
    pub program_id: ProgramId,
    pub fields: ApplicationFields,
    pub status: ApplicationStatus,
    /// Cached result of the completeness evaluator.
    pub is_complete: bool,
    pub documents: DocumentSet,
    /// Ordered log of all status transitions, oldest first.
    pub history: Vec<StatusHistoryEntry>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub submitted_at: Option<Timestamp>,
    pub reviewed_by: Option<UserId>,
    pub review_notes: String,
}

impl Application {
    /// Create a draft for the calling applicant.
    ///
    /// Program availability and duplicate checks live with the caller,
    /// which sees the catalog and the other applications.
    pub fn new<'a>(
        id: ApplicationId,
        actor: &Actor,
        program_id: ProgramId,
        fields: ApplicationFields,
        requirements: impl IntoIterator<Item = &'a DocumentRequirement>,
        now: Timestamp,
    ) -> Result<Self, ApplicationError> {
        if actor.role != Role::Applicant {
            return Err(ApplicationError::RoleNotPermitted {
                role: actor.role,
                action: "create applications",
            });
        }
        let documents = DocumentSet::new();
        Ok(Self {
            id,
            application_number: ApplicationNumber::derive(now.year(), &id),
            applicant_id: actor.user_id,
            program_id,
            fields,
            status: ApplicationStatus::Draft,
            is_complete: completeness::is_complete(requirements, &documents),
            documents,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
            submitted_at: None,
            reviewed_by: None,
            review_notes: String::new(),
        })
    }

    /// Whether `actor` may read this application.
    pub fn visible_to(&self, actor: &Actor) -> bool {
        actor.is_staff() || actor.owns(&self.applicant_id)
    }

    /// Statuses `role` could move this application to next.
    pub fn valid_transitions(&self, role: Role) -> Vec<ApplicationStatus> {
        self.status
            .valid_transitions(role)
            .into_iter()
            .filter(|to| *to != ApplicationStatus::Submitted || self.is_complete)
            .collect()
    }

    /// Whether `actor` may edit the applicant-supplied fields right now.
    pub fn ensure_editable(&self, actor: &Actor) -> Result<(), ApplicationError> {
        self.require_owner(actor)?;
        if self.status != ApplicationStatus::Draft {
            return Err(ApplicationError::NotEditable {
                status: self.status,
            });
        }
        Ok(())
    }

    /// Replace the applicant-supplied fields (draft + owner only).
    pub fn update_fields(
        &mut self,
        actor: &Actor,
        fields: ApplicationFields,
        now: Timestamp,
    ) -> Result<(), ApplicationError> {
        self.ensure_editable(actor)?;
        self.fields = fields;
        self.updated_at = now;
        Ok(())
    }

    /// Check an upload before its bytes are stored.
    pub fn check_upload(
        &self,
        actor: &Actor,
        requirement: &DocumentRequirement,
        original_filename: &str,
        file_size: u64,
    ) -> Result<(), ApplicationError> {
        self.require_owner(actor)?;
        if self.status != ApplicationStatus::Draft {
            return Err(DocumentError::UploadsClosed.into());
        }
        check_upload(requirement, self.program_id, original_filename, file_size)?;
        Ok(())
    }

    /// Attach a stored document, replacing any earlier one for the same
    /// requirement, and recompute completeness.
    ///
    /// Returns the replaced document so its bytes can be removed once the
    /// new state is committed.
    pub fn attach_document<'a>(
        &mut self,
        actor: &Actor,
        requirement: &DocumentRequirement,
        document: Document,
        requirements: impl IntoIterator<Item = &'a DocumentRequirement>,
        now: Timestamp,
    ) -> Result<Option<Document>, ApplicationError> {
        self.check_upload(
            actor,
            requirement,
            &document.original_filename,
            document.file_size,
        )?;
        let replaced = self.documents.upsert(document);
        self.recompute_completeness(requirements);
        self.updated_at = now;
        Ok(replaced)
    }

    /// Record a staff verification decision on one document.
    pub fn verify_document(
        &mut self,
        actor: &Actor,
        document_id: DocumentId,
        verified: bool,
        notes: String,
        now: Timestamp,
    ) -> Result<&Document, ApplicationError> {
        if !actor.is_staff() {
            return Err(ApplicationError::RoleNotPermitted {
                role: actor.role,
                action: "verify documents",
            });
        }
        let document = self
            .documents
            .get_mut(&document_id)
            .ok_or(ApplicationError::DocumentNotFound(document_id))?;
        document.record_verification(verified, notes, actor.user_id, now);
        Ok(document)
    }

    /// Re-evaluate the cached completeness flag.
    pub fn recompute_completeness<'a>(
        &mut self,
        requirements: impl IntoIterator<Item = &'a DocumentRequirement>,
    ) -> bool {
        self.is_complete = completeness::is_complete(requirements, &self.documents);
        self.is_complete
    }

    /// Submit the draft (DRAFT → SUBMITTED). Owner only; every active
    /// mandatory requirement must have a document.
    pub fn submit<'a>(
        &mut self,
        actor: &Actor,
        requirements: impl IntoIterator<Item = &'a DocumentRequirement> + Clone,
        now: Timestamp,
    ) -> Result<(), ApplicationError> {
        self.require_owner(actor)?;
        if self.status != ApplicationStatus::Draft || self.submitted_at.is_some() {
            return Err(ApplicationError::AlreadySubmitted);
        }
        if !self.recompute_completeness(requirements.clone()) {
            return Err(ApplicationError::Incomplete {
                missing: completeness::missing_mandatory(requirements, &self.documents),
            });
        }
        self.submitted_at = Some(now);
        self.do_transition(ApplicationStatus::Submitted, actor.user_id, SUBMIT_REASON, now);
        Ok(())
    }

    /// Staff status change, including the revise path between decisions.
    pub fn change_status(
        &mut self,
        actor: &Actor,
        to: ApplicationStatus,
        reason: &str,
        now: Timestamp,
    ) -> Result<(), ApplicationError> {
        if !actor.is_staff() {
            return Err(ApplicationError::RoleNotPermitted {
                role: actor.role,
                action: "change application status",
            });
        }
        self.require_transition(to, actor.role)?;
        self.reviewed_by = Some(actor.user_id);
        self.review_notes = reason.to_string();
        self.do_transition(to, actor.user_id, reason, now);
        Ok(())
    }

    /// Applicant withdrawal from any non-terminal state.
    pub fn withdraw(
        &mut self,
        actor: &Actor,
        reason: &str,
        now: Timestamp,
    ) -> Result<(), ApplicationError> {
        self.require_owner(actor)?;
        self.require_transition(ApplicationStatus::Withdrawn, actor.role)?;
        self.do_transition(ApplicationStatus::Withdrawn, actor.user_id, reason, now);
        Ok(())
    }

    /// Whether the application is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn require_owner(&self, actor: &Actor) -> Result<(), ApplicationError> {
        if actor.role != Role::Applicant {
            return Err(ApplicationError::RoleNotPermitted {
                role: actor.role,
                action: "act on an applicant's behalf",
            });
        }
        if !actor.owns(&self.applicant_id) {
            return Err(ApplicationError::NotOwner);
        }
        Ok(())
    }

    fn require_transition(
        &self,
        to: ApplicationStatus,
        role: Role,
    ) -> Result<(), ApplicationError> {
        if self.status.is_terminal() {
            return Err(ApplicationError::TerminalState { state: self.status });
        }
        if self.status == to {
            return Err(ApplicationError::SameStatus { status: to });
        }
        if !self.status.permits(to, role) {
            return Err(ApplicationError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    fn do_transition(
        &mut self,
        to: ApplicationStatus,
        changed_by: UserId,
        reason: &str,
        now: Timestamp,
    ) {
        self.history.push(StatusHistoryEntry {
            previous_status: self.status,
            new_status: to,
            changed_by,
            change_reason: reason.to_string(),
            changed_at: now,
        });
        self.status = to;
        self.updated_at = now;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AllowedFormats;
    use admit_core::RequirementId;

    fn form() -> ApplicationForm {
        ApplicationForm {
            date_of_birth: Some("2006-04-12".to_string()),
            gender: Some("female".to_string()),
            permanent_address: Some("12 MG Road, Pune".to_string()),
            emergency_contact_name: Some("S. Kulkarni".to_string()),
            emergency_contact_phone: Some("9820012345".to_string()),
            emergency_contact_relation: Some("Parent".to_string()),
            tenth_percentage: Some(FormNumber::Number(91.4)),
            tenth_board: Some("CBSE".to_string()),
            tenth_year: Some(FormNumber::Text("2022".to_string())),
            ..Default::default()
        }
    }

    fn requirement(program_id: ProgramId, name: &str, mandatory: bool) -> DocumentRequirement {
        DocumentRequirement {
            id: RequirementId::new(),
            program_id,
            document_name: name.to_string(),
            description: String::new(),
            is_mandatory: mandatory,
            max_file_size_mb: 5,
            allowed_formats: AllowedFormats::default(),
            retired_at: None,
        }
    }

    fn document(app: &Application, req: &DocumentRequirement) -> Document {
        Document {
            id: DocumentId::new(),
            application_id: app.id,
            requirement_id: req.id,
            stored_path: format!("applications/{}/{}/x.pdf", app.applicant_id, app.id),
            original_filename: "scan.pdf".to_string(),
            file_size: 2048,
            sha256: "ab".repeat(32),
            uploaded_at: Timestamp::now(),
            verified: false,
            verification_notes: String::new(),
            verified_by: None,
            verified_at: None,
        }
    }

    struct Fixture {
        applicant: Actor,
        officer: Actor,
        reqs: Vec<DocumentRequirement>,
        app: Application,
    }

    fn fixture() -> Fixture {
        let program = ProgramId::new();
        let applicant = Actor::applicant(UserId::new());
        let reqs = vec![
            requirement(program, "10th Marksheet", true),
            requirement(program, "Photo", true),
            requirement(program, "Resume", false),
        ];
        let app = Application::new(
            ApplicationId::new(),
            &applicant,
            program,
            form().validate().unwrap(),
            &reqs,
            Timestamp::now(),
        )
        .unwrap();
        Fixture {
            applicant,
            officer: Actor::officer(UserId::new()),
            reqs,
            app,
        }
    }

    fn submitted_fixture() -> Fixture {
        let mut f = fixture();
        for i in 0..2 {
            let doc = document(&f.app, &f.reqs[i]);
            f.app
                .attach_document(&f.applicant, &f.reqs[i], doc, &f.reqs, Timestamp::now())
                .unwrap();
        }
        f.app.submit(&f.applicant, &f.reqs, Timestamp::now()).unwrap();
        f
    }

    // ── Status table ─────────────────────────────────────────────────

    #[test]
    fn terminal_states() {
        let terminal: Vec<_> = ApplicationStatus::ALL
            .into_iter()
            .filter(ApplicationStatus::is_terminal)
            .collect();
        assert_eq!(
            terminal,
            [
                ApplicationStatus::Admitted,
                ApplicationStatus::Rejected,
                ApplicationStatus::Withdrawn
            ]
        );
    }

    #[test]
    fn status_roundtrips_through_str() {
        for status in ApplicationStatus::ALL {
            assert_eq!(status.as_str().parse::<ApplicationStatus>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
        }
        assert!("archived".parse::<ApplicationStatus>().is_err());
    }

    #[test]
    fn staff_transitions_from_submitted() {
        assert_eq!(
            ApplicationStatus::Submitted.valid_transitions(Role::AdmissionOfficer),
            [
                ApplicationStatus::UnderReview,
                ApplicationStatus::Shortlisted,
                ApplicationStatus::Admitted,
                ApplicationStatus::Rejected,
                ApplicationStatus::Waitlisted,
            ]
        );
    }

    #[test]
    fn under_review_only_from_submitted() {
        assert!(!ApplicationStatus::Shortlisted
            .permits(ApplicationStatus::UnderReview, Role::Admin));
        assert!(!ApplicationStatus::Draft.permits(ApplicationStatus::UnderReview, Role::Admin));
    }

    #[test]
    fn staff_cannot_move_a_draft() {
        for role in [Role::AdmissionOfficer, Role::Admin] {
            assert!(ApplicationStatus::Draft.valid_transitions(role).is_empty());
        }
        assert_eq!(
            ApplicationStatus::Draft.valid_transitions(Role::Applicant),
            vec![ApplicationStatus::Submitted, ApplicationStatus::Withdrawn]
        );
    }

    #[test]
    fn staff_have_no_transitions_from_draft() {
        assert!(ApplicationStatus::Draft.valid_transitions(Role::Admin).is_empty());
    }

    #[test]
    fn applicant_transitions() {
        assert_eq!(
            ApplicationStatus::Draft.valid_transitions(Role::Applicant),
            [ApplicationStatus::Submitted, ApplicationStatus::Withdrawn]
        );
        assert_eq!(
            ApplicationStatus::Waitlisted.valid_transitions(Role::Applicant),
            [ApplicationStatus::Withdrawn]
        );
        assert!(ApplicationStatus::Admitted
            .valid_transitions(Role::Applicant)
            .is_empty());
    }

    #[test]
    fn capacity_counting_states() {
        let counted: Vec<_> = ApplicationStatus::ALL
            .into_iter()
            .filter(ApplicationStatus::counts_against_capacity)
            .collect();
        assert_eq!(
            counted,
            [
                ApplicationStatus::Submitted,
                ApplicationStatus::UnderReview,
                ApplicationStatus::Shortlisted,
                ApplicationStatus::Admitted
            ]
        );
    }

    // ── Form validation ──────────────────────────────────────────────

    #[test]
    fn valid_form_applies_defaults() {
        let fields = form().validate().unwrap();
        assert_eq!(fields.nationality, "Indian");
        assert_eq!(fields.tenth_year, 2022);
        assert_eq!(fields.twelfth_percentage, None);
    }

    #[test]
    fn empty_optional_numbers_become_null() {
        let json = serde_json::json!({
            "date_of_birth": "2006-04-12",
            "gender": "male",
            "permanent_address": "Pune",
            "emergency_contact_name": "A",
            "emergency_contact_phone": "1",
            "emergency_contact_relation": "Parent",
            "tenth_percentage": "88.5",
            "tenth_board": "SSC",
            "tenth_year": 2020,
            "twelfth_percentage": "",
            "twelfth_year": "",
            "graduation_percentage": null,
            "graduation_year": ""
        });
        let form: ApplicationForm = serde_json::from_value(json).unwrap();
        let fields = form.validate().unwrap();
        assert_eq!(fields.tenth_percentage, 88.5);
        assert_eq!(fields.twelfth_year, None);
        assert_eq!(fields.graduation_year, None);
    }

    #[test]
    fn errors_are_keyed_by_field() {
        let mut bad = form();
        bad.gender = Some("x".to_string());
        bad.tenth_percentage = Some(FormNumber::Number(120.0));
        bad.emergency_contact_phone = Some("1234567890123456".to_string());
        bad.date_of_birth = None;
        let errors = bad.validate().unwrap_err();
        assert_eq!(errors.get("gender").unwrap(), ["\"x\" is not a valid choice."]);
        assert_eq!(
            errors.get("tenth_percentage").unwrap(),
            ["Ensure this value is less than or equal to 100."]
        );
        assert!(errors.get("emergency_contact_phone").is_some());
        assert_eq!(errors.get("date_of_birth").unwrap(), [REQUIRED]);
    }

    #[test]
    fn empty_form_reports_every_required_field() {
        let errors = ApplicationForm::default().validate().unwrap_err();
        for field in [
            "date_of_birth",
            "gender",
            "permanent_address",
            "emergency_contact_name",
            "emergency_contact_phone",
            "emergency_contact_relation",
            "tenth_percentage",
            "tenth_board",
            "tenth_year",
        ] {
            assert!(errors.get(field).is_some(), "missing error for {field}");
        }
    }

    #[test]
    fn non_numeric_year_is_rejected() {
        let mut bad = form();
        bad.twelfth_year = Some(FormNumber::Text("twenty".to_string()));
        let errors = bad.validate().unwrap_err();
        assert_eq!(
            errors.get("twelfth_year").unwrap(),
            ["A valid integer is required."]
        );
    }

    // ── Creation and editing ─────────────────────────────────────────

    #[test]
    fn new_application_is_incomplete_draft() {
        let f = fixture();
        assert_eq!(f.app.status, ApplicationStatus::Draft);
        assert!(!f.app.is_complete);
        assert!(f.app.history.is_empty());
        assert!(f.app.submitted_at.is_none());
        assert!(f
            .app
            .application_number
            .as_str()
            .starts_with(&format!("APP{}", f.app.created_at.year())));
    }

    #[test]
    fn staff_cannot_create_applications() {
        let result = Application::new(
            ApplicationId::new(),
            &Actor::admin(UserId::new()),
            ProgramId::new(),
            form().validate().unwrap(),
            std::iter::empty(),
            Timestamp::now(),
        );
        assert!(matches!(
            result,
            Err(ApplicationError::RoleNotPermitted { .. })
        ));
    }

    #[test]
    fn only_owner_edits_draft() {
        let mut f = fixture();
        let stranger = Actor::applicant(UserId::new());
        let fields = form().validate().unwrap();
        assert_eq!(
            f.app.update_fields(&stranger, fields.clone(), Timestamp::now()),
            Err(ApplicationError::NotOwner)
        );
        f.app
            .update_fields(&f.applicant, fields, Timestamp::now())
            .unwrap();
    }

    #[test]
    fn submitted_application_is_read_only() {
        let mut f = submitted_fixture();
        let result = f
            .app
            .update_fields(&f.applicant, form().validate().unwrap(), Timestamp::now());
        assert!(matches!(result, Err(ApplicationError::NotEditable { .. })));
    }

    // ── Documents ────────────────────────────────────────────────────

    #[test]
    fn replacing_a_document_keeps_one_and_returns_old() {
        let mut f = fixture();
        let first = document(&f.app, &f.reqs[0]);
        let first_id = first.id;
        f.app
            .attach_document(&f.applicant, &f.reqs[0], first, &f.reqs, Timestamp::now())
            .unwrap();
        let second = document(&f.app, &f.reqs[0]);
        let replaced = f
            .app
            .attach_document(&f.applicant, &f.reqs[0], second, &f.reqs, Timestamp::now())
            .unwrap();
        assert_eq!(replaced.map(|d| d.id), Some(first_id));
        assert_eq!(f.app.documents.len(), 1);
        assert!(!f.app.is_complete);
    }

    #[test]
    fn uploads_close_after_submission() {
        let mut f = submitted_fixture();
        let doc = document(&f.app, &f.reqs[2]);
        let result = f
            .app
            .attach_document(&f.applicant, &f.reqs[2], doc, &f.reqs, Timestamp::now());
        assert_eq!(
            result,
            Err(ApplicationError::Document(DocumentError::UploadsClosed))
        );
    }

    #[test]
    fn verification_is_staff_only_and_ignores_completeness() {
        let mut f = fixture();
        let doc = document(&f.app, &f.reqs[0]);
        let doc_id = doc.id;
        f.app
            .attach_document(&f.applicant, &f.reqs[0], doc, &f.reqs, Timestamp::now())
            .unwrap();
        assert!(f
            .app
            .verify_document(&f.applicant, doc_id, true, String::new(), Timestamp::now())
            .is_err());
        let officer = f.officer;
        let verified = f
            .app
            .verify_document(&officer, doc_id, false, "blurry".to_string(), Timestamp::now())
            .unwrap();
        assert!(!verified.verified);
        assert_eq!(verified.verified_by, Some(officer.user_id));
        assert!(!f.app.is_complete);
    }

    #[test]
    fn verifying_unknown_document_is_not_found() {
        let mut f = fixture();
        let officer = f.officer;
        let missing = DocumentId::new();
        assert_eq!(
            f.app
                .verify_document(&officer, missing, true, String::new(), Timestamp::now())
                .map(|d| d.id),
            Err(ApplicationError::DocumentNotFound(missing))
        );
    }

    // ── Submission ───────────────────────────────────────────────────

    #[test]
    fn incomplete_submit_is_refused_and_names_missing() {
        let mut f = fixture();
        let doc = document(&f.app, &f.reqs[0]);
        f.app
            .attach_document(&f.applicant, &f.reqs[0], doc, &f.reqs, Timestamp::now())
            .unwrap();
        let err = f
            .app
            .submit(&f.applicant, &f.reqs, Timestamp::now())
            .unwrap_err();
        assert_eq!(
            err,
            ApplicationError::Incomplete {
                missing: vec!["Photo".to_string()]
            }
        );
        assert_eq!(f.app.status, ApplicationStatus::Draft);
        assert!(f.app.history.is_empty());
    }

    #[test]
    fn submit_sets_timestamp_and_history() {
        let f = submitted_fixture();
        assert_eq!(f.app.status, ApplicationStatus::Submitted);
        assert!(f.app.submitted_at.is_some());
        assert_eq!(f.app.history.len(), 1);
        assert_eq!(f.app.history[0].change_reason, SUBMIT_REASON);
        assert_eq!(f.app.history[0].changed_by, f.applicant.user_id);
    }

    #[test]
    fn second_submit_is_refused() {
        let mut f = submitted_fixture();
        let submitted_at = f.app.submitted_at;
        assert_eq!(
            f.app.submit(&f.applicant, &f.reqs, Timestamp::now()),
            Err(ApplicationError::AlreadySubmitted)
        );
        assert_eq!(f.app.submitted_at, submitted_at);
    }

    #[test]
    fn staff_cannot_submit_for_applicant() {
        let mut f = fixture();
        let officer = f.officer;
        assert!(matches!(
            f.app.submit(&officer, &f.reqs, Timestamp::now()),
            Err(ApplicationError::RoleNotPermitted { .. })
        ));
    }

    // ── Status changes ───────────────────────────────────────────────

    #[test]
    fn applicant_cannot_change_status() {
        let mut f = submitted_fixture();
        let before = f.app.clone();
        let result = f.app.change_status(
            &f.applicant,
            ApplicationStatus::Admitted,
            "",
            Timestamp::now(),
        );
        assert!(matches!(
            result,
            Err(ApplicationError::RoleNotPermitted { .. })
        ));
        assert_eq!(f.app, before);
    }

    #[test]
    fn staff_change_records_reviewer() {
        let mut f = submitted_fixture();
        let officer = f.officer;
        f.app
            .change_status(
                &officer,
                ApplicationStatus::UnderReview,
                "initial screen",
                Timestamp::now(),
            )
            .unwrap();
        assert_eq!(f.app.reviewed_by, Some(officer.user_id));
        assert_eq!(f.app.review_notes, "initial screen");
        let last = f.app.history.last().unwrap();
        assert_eq!(last.previous_status, ApplicationStatus::Submitted);
        assert_eq!(last.new_status, ApplicationStatus::UnderReview);
    }

    #[test]
    fn revise_between_decisions() {
        let mut f = submitted_fixture();
        let officer = f.officer;
        f.app
            .change_status(&officer, ApplicationStatus::Waitlisted, "", Timestamp::now())
            .unwrap();
        f.app
            .change_status(
                &officer,
                ApplicationStatus::Shortlisted,
                "seat freed",
                Timestamp::now(),
            )
            .unwrap();
        assert_eq!(f.app.status, ApplicationStatus::Shortlisted);
        assert_eq!(f.app.history.len(), 3);
    }

    #[test]
    fn terminal_rows_cannot_be_revised() {
        let mut f = submitted_fixture();
        let admin = Actor::admin(UserId::new());
        f.app
            .change_status(&admin, ApplicationStatus::Rejected, "", Timestamp::now())
            .unwrap();
        assert_eq!(
            f.app
                .change_status(&admin, ApplicationStatus::Admitted, "", Timestamp::now()),
            Err(ApplicationError::TerminalState {
                state: ApplicationStatus::Rejected
            })
        );
    }

    #[test]
    fn same_status_is_invalid() {
        let mut f = submitted_fixture();
        let officer = f.officer;
        assert_eq!(
            f.app
                .change_status(&officer, ApplicationStatus::Submitted, "", Timestamp::now()),
            Err(ApplicationError::SameStatus {
                status: ApplicationStatus::Submitted
            })
        );
    }

    #[test]
    fn staff_cannot_move_draft() {
        let mut f = fixture();
        let officer = f.officer;
        assert_eq!(
            f.app
                .change_status(&officer, ApplicationStatus::Shortlisted, "", Timestamp::now()),
            Err(ApplicationError::InvalidTransition {
                from: ApplicationStatus::Draft,
                to: ApplicationStatus::Shortlisted
            })
        );
    }

    #[test]
    fn staff_cannot_withdraw_or_resubmit() {
        let mut f = submitted_fixture();
        let officer = f.officer;
        for to in [ApplicationStatus::Withdrawn, ApplicationStatus::Draft] {
            assert!(matches!(
                f.app.change_status(&officer, to, "", Timestamp::now()),
                Err(ApplicationError::InvalidTransition { .. })
            ));
        }
    }

    // ── Withdrawal ───────────────────────────────────────────────────

    #[test]
    fn owner_withdraws_until_terminal() {
        let mut f = submitted_fixture();
        f.app
            .withdraw(&f.applicant, "accepted elsewhere", Timestamp::now())
            .unwrap();
        assert_eq!(f.app.status, ApplicationStatus::Withdrawn);
        assert!(f.app.is_terminal());
        assert!(matches!(
            f.app.withdraw(&f.applicant, "", Timestamp::now()),
            Err(ApplicationError::TerminalState { .. })
        ));
    }

    #[test]
    fn stranger_cannot_withdraw() {
        let mut f = fixture();
        assert_eq!(
            f.app
                .withdraw(&Actor::applicant(UserId::new()), "", Timestamp::now()),
            Err(ApplicationError::NotOwner)
        );
    }

    #[test]
    fn visibility() {
        let f = fixture();
        assert!(f.app.visible_to(&f.applicant));
        assert!(f.app.visible_to(&f.officer));
        assert!(!f.app.visible_to(&Actor::applicant(UserId::new())));
    }
}
