//! # Completeness Evaluator
//!
//! An application is complete when every active mandatory requirement of
//! its program has a document. Optional and retired requirements never
//! block. Verification status is not considered.

use crate::catalog::DocumentRequirement;
use crate::document::DocumentSet;

/// True iff every active mandatory requirement has a document.
///
/// A program with no mandatory requirements is always complete.
pub fn is_complete<'a, I>(requirements: I, documents: &DocumentSet) -> bool
where
    I: IntoIterator<Item = &'a DocumentRequirement>,
{
    requirements
        .into_iter()
        .filter(|r| blocks_submission(r))
        .all(|r| documents.contains(&r.id))
}

/// Names of the active mandatory requirements that have no document.
pub fn missing_mandatory<'a, I>(requirements: I, documents: &DocumentSet) -> Vec<String>
where
    I: IntoIterator<Item = &'a DocumentRequirement>,
{
    requirements
        .into_iter()
        .filter(|r| blocks_submission(r) && !documents.contains(&r.id))
        .map(|r| r.document_name.clone())
        .collect()
}

fn blocks_submission(requirement: &DocumentRequirement) -> bool {
    requirement.is_mandatory && requirement.is_active()
}
