//! # admit-state — Admissions Domain Model
//!
//! Pure, I/O-free domain logic for the application lifecycle.
//!
//! ## Components
//!
//! - **Catalog** (`catalog.rs`): departments, programs and per-program
//!   document requirements. Requirements are retired rather than deleted.
//!
//! - **Document store** (`document.rs`): at most one document per
//!   (application, requirement), with size and format checks.
//!
//! - **Completeness evaluator** (`completeness.rs`): pure function over a
//!   program's requirements and an application's documents.
//!
//! - **Application** (`application.rs`): the aggregate and its status
//!   transition engine
//!   (Draft → Submitted → UnderReview → Shortlisted/Admitted/Rejected/Waitlisted,
//!   Withdrawn from any non-terminal state).
//!
//! ## Design
//!
//! Every mutation takes an explicit [`admit_core::Actor`] and a
//! [`admit_core::Timestamp`]. Role is checked before preconditions, and a
//! failed check leaves the aggregate unchanged.

pub mod application;
pub mod catalog;
pub mod completeness;
pub mod document;

pub use application::{
    Application, ApplicationError, ApplicationFields, ApplicationForm, ApplicationStatus,
    FormNumber, Gender, StatusHistoryEntry, SUBMIT_REASON,
};
pub use catalog::{
    extension_of, AllowedFormats, Amount, Catalog, CatalogError, Department, DepartmentDraft,
    DepartmentStatistics, DocumentRequirement, Program, ProgramDraft, ProgramFilter,
    ProgramStatus, ProgramType, RequirementDraft, BYTES_PER_MB, DEFAULT_ALLOWED_FORMATS,
    DEFAULT_MAX_FILE_SIZE_MB,
};
pub use completeness::{is_complete, missing_mandatory};
pub use document::{check_upload, Document, DocumentError, DocumentSet};
