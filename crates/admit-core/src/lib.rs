//! # admit-core — Foundational Types for the Admissions Service
//!
//! Leaf crate of the workspace. Defines the primitives every other crate
//! builds on and depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype identifiers.** `UserId`, `ProgramId`, `RequirementId`,
//!    `ApplicationId`, `DocumentId`, `DepartmentId` are distinct types.
//!    A requirement id cannot be passed where a program id is expected.
//!
//! 2. **Explicit actors.** Every mutating operation receives an [`Actor`]
//!    (user id + [`Role`]). There is no ambient session.
//!
//! 3. **UTC-only timestamps.** [`Timestamp`] is UTC with seconds precision.
//!
//! 4. **Field-keyed validation.** [`FieldErrors`] carries one or more
//!    messages per field name, matching the error body clients render.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `admit-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod role;
pub mod temporal;

pub use error::{FieldErrors, ValidationError, NON_FIELD_ERRORS};
pub use identity::{
    ApplicationId, ApplicationNumber, DepartmentId, DocumentId, ProgramId, RequirementId, UserId,
};
pub use role::{Actor, Role};
pub use temporal::Timestamp;
