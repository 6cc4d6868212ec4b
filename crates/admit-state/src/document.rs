//! # Document Store
//!
//! Uploaded files recorded against an application and one of its program's
//! document requirements. An application holds at most one document per
//! requirement; a new upload replaces the previous one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use admit_core::{ApplicationId, DocumentId, ProgramId, RequirementId, Timestamp, UserId};

use crate::catalog::{extension_of, DocumentRequirement};

/// Reasons an upload is refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Documents cannot be uploaded after submission")]
    UploadsClosed,

    #[error("The submitted file is empty.")]
    EmptyFile,

    #[error("File size exceeds maximum allowed size of {max_mb} MB")]
    TooLarge {
        /// Rejected size in bytes.
        size: u64,
        max_mb: u32,
    },

    #[error("File has no extension. Allowed formats: {allowed}")]
    MissingExtension { allowed: String },

    #[error("File format '{extension}' is not allowed. Allowed formats: {allowed}")]
    FormatNotAllowed { extension: String, allowed: String },

    #[error("This document type is not required for this application's program")]
    ForeignRequirement,

    #[error("This document requirement is no longer accepted")]
    RequirementRetired,
}

/// An uploaded file attached to an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub application_id: ApplicationId,
    pub requirement_id: RequirementId,
    /// Storage-relative path of the file bytes.
    pub stored_path: String,
    pub original_filename: String,
    pub file_size: u64,
    /// Lowercase hex SHA-256 of the content.
    pub sha256: String,
    pub uploaded_at: Timestamp,
    pub verified: bool,
    pub verification_notes: String,
    pub verified_by: Option<UserId>,
    pub verified_at: Option<Timestamp>,
}

impl Document {
    /// Record a verification decision. Never touches completeness.
    pub fn record_verification(
        &mut self,
        verified: bool,
        notes: String,
        by: UserId,
        at: Timestamp,
    ) {
        self.verified = verified;
        self.verification_notes = notes;
        self.verified_by = Some(by);
        self.verified_at = Some(at);
    }
}

/// Check a prospective upload against its requirement.
///
/// `program_id` is the program of the application receiving the file.
pub fn check_upload(
    requirement: &DocumentRequirement,
    program_id: ProgramId,
    original_filename: &str,
    file_size: u64,
) -> Result<(), DocumentError> {
    if requirement.program_id != program_id {
        return Err(DocumentError::ForeignRequirement);
    }
    if !requirement.is_active() {
        return Err(DocumentError::RequirementRetired);
    }
    if file_size == 0 {
        return Err(DocumentError::EmptyFile);
    }
    if file_size > requirement.max_file_size_bytes() {
        return Err(DocumentError::TooLarge {
            size: file_size,
            max_mb: requirement.max_file_size_mb,
        });
    }
    let allowed = requirement.allowed_formats.describe();
    let extension = extension_of(original_filename)
        .ok_or_else(|| DocumentError::MissingExtension {
            allowed: allowed.clone(),
        })?;
    if !requirement.allowed_formats.contains(&extension) {
        return Err(DocumentError::FormatNotAllowed { extension, allowed });
    }
    Ok(())
}

/// Documents of one application keyed by requirement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSet(BTreeMap<RequirementId, Document>);

impl DocumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `document`, returning the one it replaced.
    pub fn upsert(&mut self, document: Document) -> Option<Document> {
        self.0.insert(document.requirement_id, document)
    }

    pub fn remove(&mut self, requirement_id: &RequirementId) -> Option<Document> {
        self.0.remove(requirement_id)
    }

    pub fn for_requirement(&self, requirement_id: &RequirementId) -> Option<&Document> {
        self.0.get(requirement_id)
    }

    pub fn contains(&self, requirement_id: &RequirementId) -> bool {
        self.0.contains_key(requirement_id)
    }

    pub fn get(&self, id: &DocumentId) -> Option<&Document> {
        self.0.values().find(|d| d.id == *id)
    }

    pub fn get_mut(&mut self, id: &DocumentId) -> Option<&mut Document> {
        self.0.values_mut().find(|d| d.id == *id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Document> for DocumentSet {
    fn from_iter<I: IntoIterator<Item = Document>>(iter: I) -> Self {
        Self(iter.into_iter().map(|d| (d.requirement_id, d)).collect())
    }
}
