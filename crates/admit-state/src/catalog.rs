//! # Program Catalog
//!
//! Departments, programs and the per-program document requirement list.
//!
//! The catalog is referenced by applications, never owned by them. A
//! requirement that is deleted after applications exist is *retired*: it
//! keeps its identity so uploaded documents stay linked, but it no longer
//! appears in listings, no longer counts toward completeness and refuses
//! new uploads.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use admit_core::{DepartmentId, FieldErrors, ProgramId, RequirementId, Timestamp, NON_FIELD_ERRORS};

/// Bytes per megabyte for upload limits.
pub const BYTES_PER_MB: u64 = 1_048_576;

/// Default per-requirement upload limit in megabytes.
pub const DEFAULT_MAX_FILE_SIZE_MB: u32 = 5;

/// Default allowed formats for a new requirement.
pub const DEFAULT_ALLOWED_FORMATS: &str = "pdf,jpg,jpeg,png";

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors raised by catalog mutations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    /// Submitted catalog fields failed validation.
    #[error("{0}")]
    Invalid(FieldErrors),

    /// Another department already uses this code.
    #[error("department with code '{0}' already exists")]
    DuplicateDepartmentCode(String),

    /// Another program already uses this code.
    #[error("Program with code '{0}' already exists")]
    DuplicateProgramCode(String),

    /// Programs still belong to the department.
    #[error("Cannot delete department with existing programs ({programs})")]
    DepartmentInUse { id: DepartmentId, programs: usize },

    #[error("department {0} not found")]
    DepartmentNotFound(DepartmentId),

    #[error("program {0} not found")]
    ProgramNotFound(ProgramId),

    #[error("document requirement {0} not found")]
    RequirementNotFound(RequirementId),
}

// ─── Amounts and formats ─────────────────────────────────────────────

/// A non-negative decimal amount with at most two fractional digits,
/// normalized to exactly two (`"1500.00"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub struct Amount(String);

impl Amount {
    const MAX_INTEGER_DIGITS: usize = 8;

    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        let (int_part, frac_part) = match raw.split_once('.') {
            Some((i, f)) => (i, f),
            None => (raw, ""),
        };
        let digits_only = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if int_part.is_empty() || !digits_only(int_part) || !digits_only(frac_part) {
            return Err("A valid number is required.".to_string());
        }
        if frac_part.len() > 2 {
            return Err("Ensure that there are no more than 2 decimal places.".to_string());
        }
        let int_part = int_part.trim_start_matches('0');
        if int_part.len() > Self::MAX_INTEGER_DIGITS {
            return Err(format!(
                "Ensure that there are no more than {} digits before the decimal point.",
                Self::MAX_INTEGER_DIGITS
            ));
        }
        let int_part = if int_part.is_empty() { "0" } else { int_part };
        Ok(Self(format!("{int_part}.{frac_part:0<2}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Integer(u64),
            Float(f64),
        }

        let text = match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s,
            Raw::Integer(n) => n.to_string(),
            Raw::Float(f) => f.to_string(),
        };
        Amount::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Lowercase set of permitted file extensions.
///
/// Serialized as the comma-separated list it was configured with
/// (`"pdf,jpg,jpeg,png"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub struct AllowedFormats(BTreeSet<String>);

impl AllowedFormats {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let formats: BTreeSet<String> = raw
            .split(',')
            .map(|f| f.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|f| !f.is_empty())
            .collect();
        if formats.is_empty() {
            return Err("At least one file format is required.".to_string());
        }
        if let Some(bad) = formats
            .iter()
            .find(|f| !f.chars().all(|c| c.is_ascii_alphanumeric()))
        {
            return Err(format!("'{bad}' is not a valid file extension."));
        }
        Ok(Self(formats))
    }

    /// Whether `extension` (any case, without the dot) is allowed.
    pub fn contains(&self, extension: &str) -> bool {
        self.0.contains(&extension.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Human-readable list, `"jpeg, jpg, pdf, png"`.
    pub fn describe(&self) -> String {
        self.iter().collect::<Vec<_>>().join(", ")
    }
}

impl Default for AllowedFormats {
    fn default() -> Self {
        Self(
            DEFAULT_ALLOWED_FORMATS
                .split(',')
                .map(str::to_string)
                .collect(),
        )
    }
}

impl From<AllowedFormats> for String {
    fn from(formats: AllowedFormats) -> Self {
        formats.iter().collect::<Vec<_>>().join(",")
    }
}

impl std::fmt::Display for AllowedFormats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from(self.clone()))
    }
}

impl<'de> Deserialize<'de> for AllowedFormats {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        AllowedFormats::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Lowercased extension of `filename`, without the dot.
///
/// `None` for names with no dot, a trailing dot, or only a leading dot
/// (`.bashrc`).
pub fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

// ─── Departments ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    pub code: String,
    pub description: String,
    pub head_of_department: String,
    pub created_at: Timestamp,
}

/// Admin-supplied department fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DepartmentDraft {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub head_of_department: String,
}

impl DepartmentDraft {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "name", &self.name, 200);
        require_text(&mut errors, "code", &self.code, 10);
        max_len(&mut errors, "head_of_department", &self.head_of_department, 200);
        errors
    }
}

// ─── Programs ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramType {
    Undergraduate,
    Postgraduate,
    Diploma,
    Certificate,
}

impl ProgramType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undergraduate => "undergraduate",
            Self::Postgraduate => "postgraduate",
            Self::Diploma => "diploma",
            Self::Certificate => "certificate",
        }
    }
}

impl std::str::FromStr for ProgramType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "undergraduate" => Ok(Self::Undergraduate),
            "postgraduate" => Ok(Self::Postgraduate),
            "diploma" => Ok(Self::Diploma),
            "certificate" => Ok(Self::Certificate),
            other => Err(format!("\"{other}\" is not a valid choice.")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramStatus {
    #[default]
    Active,
    Inactive,
    Closed,
}

impl ProgramStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Closed => "closed",
        }
    }
}

impl std::str::FromStr for ProgramStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "closed" => Ok(Self::Closed),
            other => Err(format!("\"{other}\" is not a valid choice.")),
        }
    }
}

/// Admin-supplied program fields, used for both create and full update.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgramDraft {
    pub name: String,
    pub code: String,
    pub department_id: DepartmentId,
    pub program_type: ProgramType,
    pub duration_years: u32,
    pub duration_semesters: u32,
    pub description: String,
    pub intake_capacity: u32,
    pub fees_per_semester: Amount,
    #[serde(default = "default_application_fee")]
    pub application_fee: Amount,
    pub min_percentage: f64,
    pub eligibility_criteria: String,
    pub application_start_date: Timestamp,
    pub application_end_date: Timestamp,
    #[serde(default)]
    pub status: ProgramStatus,
}

fn default_application_fee() -> Amount {
    Amount("500.00".to_string())
}

impl ProgramDraft {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "name", &self.name, 200);
        require_text(&mut errors, "code", &self.code, 20);
        require_text(&mut errors, "description", &self.description, usize::MAX);
        require_text(
            &mut errors,
            "eligibility_criteria",
            &self.eligibility_criteria,
            usize::MAX,
        );
        percentage_in_range(&mut errors, "min_percentage", self.min_percentage);
        if self.application_start_date >= self.application_end_date {
            errors.add(
                NON_FIELD_ERRORS,
                "Application start date must be before end date",
            );
        }
        errors
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: ProgramId,
    pub name: String,
    pub code: String,
    pub department_id: DepartmentId,
    pub program_type: ProgramType,
    pub duration_years: u32,
    pub duration_semesters: u32,
    pub description: String,
    pub intake_capacity: u32,
    pub fees_per_semester: Amount,
    pub application_fee: Amount,
    pub min_percentage: f64,
    pub eligibility_criteria: String,
    pub application_start_date: Timestamp,
    pub application_end_date: Timestamp,
    pub status: ProgramStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Program {
    fn from_draft(id: ProgramId, draft: ProgramDraft, now: Timestamp) -> Self {
        Self {
            id,
            name: draft.name,
            code: draft.code,
            department_id: draft.department_id,
            program_type: draft.program_type,
            duration_years: draft.duration_years,
            duration_semesters: draft.duration_semesters,
            description: draft.description,
            intake_capacity: draft.intake_capacity,
            fees_per_semester: draft.fees_per_semester,
            application_fee: draft.application_fee,
            min_percentage: draft.min_percentage,
            eligibility_criteria: draft.eligibility_criteria,
            application_start_date: draft.application_start_date,
            application_end_date: draft.application_end_date,
            status: draft.status,
            created_at: now,
            updated_at: now,
        }
    }

    /// Open when `start <= now <= end` and the program is active.
    pub fn is_application_open(&self, now: Timestamp) -> bool {
        self.status == ProgramStatus::Active
            && self.application_start_date <= now
            && now <= self.application_end_date
    }

    /// Capacity left after `occupied` seat-holding applications.
    pub fn available_seats(&self, occupied: usize) -> u32 {
        let occupied = u32::try_from(occupied).unwrap_or(u32::MAX);
        self.intake_capacity.saturating_sub(occupied)
    }
}

// ─── Document requirements ───────────────────────────────────────────

/// Admin-supplied requirement fields.
#[derive(Debug, Clone, Deserialize)]
pub struct RequirementDraft {
    pub document_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub is_mandatory: bool,
    #[serde(default = "default_max_size")]
    pub max_file_size_mb: u32,
    #[serde(default)]
    pub allowed_formats: AllowedFormats,
}

fn default_true() -> bool {
    true
}

fn default_max_size() -> u32 {
    DEFAULT_MAX_FILE_SIZE_MB
}

impl RequirementDraft {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "document_name", &self.document_name, 200);
        if self.max_file_size_mb == 0 {
            errors.add("max_file_size_mb", "Ensure this value is greater than or equal to 1.");
        }
        errors
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRequirement {
    pub id: RequirementId,
    pub program_id: ProgramId,
    pub document_name: String,
    pub description: String,
    pub is_mandatory: bool,
    pub max_file_size_mb: u32,
    pub allowed_formats: AllowedFormats,
    /// Set when the requirement was deleted; retired requirements are kept
    /// only so existing documents stay linked.
    pub retired_at: Option<Timestamp>,
}

impl DocumentRequirement {
    pub fn is_active(&self) -> bool {
        self.retired_at.is_none()
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        u64::from(self.max_file_size_mb) * BYTES_PER_MB
    }
}

// ─── Catalog ─────────────────────────────────────────────────────────

/// Program counts for one department.
#[derive(Debug, Clone, Copy)]
pub struct DepartmentStatistics<'a> {
    pub department: &'a Department,
    pub total_programs: usize,
    pub active_programs: usize,
}

/// Listing filter for public program search.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgramFilter {
    pub program_type: Option<ProgramType>,
    pub department: Option<DepartmentId>,
    /// Case-insensitive substring over name, code, description and
    /// department name.
    pub search: Option<String>,
}

/// In-memory catalog of departments, programs and requirements.
///
/// Mutations validate first and leave the catalog untouched on error.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    departments: BTreeMap<DepartmentId, Department>,
    programs: BTreeMap<ProgramId, Program>,
    requirements: BTreeMap<RequirementId, DocumentRequirement>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted rows.
    pub fn from_parts(
        departments: Vec<Department>,
        programs: Vec<Program>,
        requirements: Vec<DocumentRequirement>,
    ) -> Self {
        Self {
            departments: departments.into_iter().map(|d| (d.id, d)).collect(),
            programs: programs.into_iter().map(|p| (p.id, p)).collect(),
            requirements: requirements.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    // ── Departments ──────────────────────────────────────────────────

    /// Departments ordered by name.
    pub fn departments(&self) -> Vec<&Department> {
        let mut all: Vec<_> = self.departments.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn department(&self, id: &DepartmentId) -> Option<&Department> {
        self.departments.get(id)
    }

    pub fn add_department(
        &mut self,
        draft: DepartmentDraft,
        now: Timestamp,
    ) -> Result<&Department, CatalogError> {
        draft.validate().into_result().map_err(CatalogError::Invalid)?;
        let code = draft.code.trim().to_string();
        if self.departments.values().any(|d| d.code == code) {
            return Err(CatalogError::DuplicateDepartmentCode(code));
        }
        let department = Department {
            id: DepartmentId::new(),
            name: draft.name.trim().to_string(),
            code,
            description: draft.description,
            head_of_department: draft.head_of_department,
            created_at: now,
        };
        let id = department.id;
        Ok(self.departments.entry(id).or_insert(department))
    }

    /// Full replace of a department's admin-editable fields.
    pub fn update_department(
        &mut self,
        id: DepartmentId,
        draft: DepartmentDraft,
    ) -> Result<&Department, CatalogError> {
        draft.validate().into_result().map_err(CatalogError::Invalid)?;
        let code = draft.code.trim().to_string();
        if self.departments.values().any(|d| d.code == code && d.id != id) {
            return Err(CatalogError::DuplicateDepartmentCode(code));
        }
        let department = self
            .departments
            .get_mut(&id)
            .ok_or(CatalogError::DepartmentNotFound(id))?;
        department.name = draft.name.trim().to_string();
        department.code = code;
        department.description = draft.description;
        department.head_of_department = draft.head_of_department;
        Ok(department)
    }

    /// Remove a department that no program belongs to.
    pub fn remove_department(&mut self, id: DepartmentId) -> Result<Department, CatalogError> {
        if !self.departments.contains_key(&id) {
            return Err(CatalogError::DepartmentNotFound(id));
        }
        let programs = self
            .programs
            .values()
            .filter(|p| p.department_id == id)
            .count();
        if programs > 0 {
            return Err(CatalogError::DepartmentInUse { id, programs });
        }
        self.departments
            .remove(&id)
            .ok_or(CatalogError::DepartmentNotFound(id))
    }

    /// Program counts per department, ordered by department name.
    pub fn department_statistics(&self) -> Vec<DepartmentStatistics<'_>> {
        self.departments()
            .into_iter()
            .map(|department| {
                let owned = self
                    .programs
                    .values()
                    .filter(|p| p.department_id == department.id);
                let (total_programs, active_programs) =
                    owned.fold((0, 0), |(total, active), p| {
                        (total + 1, active + usize::from(p.status == ProgramStatus::Active))
                    });
                DepartmentStatistics {
                    department,
                    total_programs,
                    active_programs,
                }
            })
            .collect()
    }

    // ── Programs ─────────────────────────────────────────────────────

    pub fn program(&self, id: &ProgramId) -> Option<&Program> {
        self.programs.get(id)
    }

    pub fn programs(&self) -> impl Iterator<Item = &Program> {
        self.programs.values()
    }

    /// Active programs matching `filter`, ordered by name.
    pub fn active_programs(&self, filter: &ProgramFilter) -> Vec<&Program> {
        let needle = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        let mut matches: Vec<&Program> = self
            .programs
            .values()
            .filter(|p| p.status == ProgramStatus::Active)
            .filter(|p| filter.program_type.map_or(true, |t| p.program_type == t))
            .filter(|p| filter.department.map_or(true, |d| p.department_id == d))
            .filter(|p| match &needle {
                None => true,
                Some(needle) => {
                    let department_name = self
                        .departments
                        .get(&p.department_id)
                        .map(|d| d.name.to_lowercase())
                        .unwrap_or_default();
                    [
                        p.name.to_lowercase(),
                        p.code.to_lowercase(),
                        p.description.to_lowercase(),
                        department_name,
                    ]
                    .iter()
                    .any(|haystack| haystack.contains(needle.as_str()))
                }
            })
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        matches
    }

    pub fn add_program(
        &mut self,
        draft: ProgramDraft,
        now: Timestamp,
    ) -> Result<&Program, CatalogError> {
        self.check_program_draft(&draft, None)?;
        let program = Program::from_draft(ProgramId::new(), draft, now);
        let id = program.id;
        Ok(self.programs.entry(id).or_insert(program))
    }

    /// Full replace of a program's admin-editable fields.
    pub fn update_program(
        &mut self,
        id: ProgramId,
        draft: ProgramDraft,
        now: Timestamp,
    ) -> Result<&Program, CatalogError> {
        let created_at = self
            .programs
            .get(&id)
            .ok_or(CatalogError::ProgramNotFound(id))?
            .created_at;
        self.check_program_draft(&draft, Some(id))?;
        let mut program = Program::from_draft(id, draft, now);
        program.created_at = created_at;
        self.programs.insert(id, program);
        self.programs.get(&id).ok_or(CatalogError::ProgramNotFound(id))
    }

    /// Remove a program and its requirements. The caller is responsible for
    /// refusing removal while applications reference it.
    pub fn remove_program(&mut self, id: ProgramId) -> Result<Program, CatalogError> {
        let program = self
            .programs
            .remove(&id)
            .ok_or(CatalogError::ProgramNotFound(id))?;
        self.requirements.retain(|_, r| r.program_id != id);
        Ok(program)
    }

    fn check_program_draft(
        &self,
        draft: &ProgramDraft,
        existing: Option<ProgramId>,
    ) -> Result<(), CatalogError> {
        let mut errors = draft.validate();
        if !self.departments.contains_key(&draft.department_id) {
            errors.add("department_id", "Invalid department selected");
        }
        errors.into_result().map_err(CatalogError::Invalid)?;
        let duplicate = self
            .programs
            .values()
            .any(|p| p.code == draft.code && Some(p.id) != existing);
        if duplicate {
            return Err(CatalogError::DuplicateProgramCode(draft.code.clone()));
        }
        Ok(())
    }

    // ── Requirements ─────────────────────────────────────────────────

    /// Any requirement, including retired ones.
    pub fn requirement(&self, id: &RequirementId) -> Option<&DocumentRequirement> {
        self.requirements.get(id)
    }

    /// Active requirements of a program, ordered by name.
    pub fn requirements_for(&self, program_id: &ProgramId) -> Vec<&DocumentRequirement> {
        let mut reqs: Vec<_> = self
            .requirements
            .values()
            .filter(|r| r.program_id == *program_id && r.is_active())
            .collect();
        reqs.sort_by(|a, b| a.document_name.cmp(&b.document_name));
        reqs
    }

    pub fn add_requirement(
        &mut self,
        program_id: ProgramId,
        draft: RequirementDraft,
    ) -> Result<&DocumentRequirement, CatalogError> {
        if !self.programs.contains_key(&program_id) {
            return Err(CatalogError::ProgramNotFound(program_id));
        }
        draft.validate().into_result().map_err(CatalogError::Invalid)?;
        let requirement = DocumentRequirement {
            id: RequirementId::new(),
            program_id,
            document_name: draft.document_name.trim().to_string(),
            description: draft.description,
            is_mandatory: draft.is_mandatory,
            max_file_size_mb: draft.max_file_size_mb,
            allowed_formats: draft.allowed_formats,
            retired_at: None,
        };
        let id = requirement.id;
        Ok(self.requirements.entry(id).or_insert(requirement))
    }

    /// Replace the editable fields of an active requirement.
    pub fn update_requirement(
        &mut self,
        id: RequirementId,
        draft: RequirementDraft,
    ) -> Result<&DocumentRequirement, CatalogError> {
        draft.validate().into_result().map_err(CatalogError::Invalid)?;
        let requirement = self
            .requirements
            .get_mut(&id)
            .filter(|r| r.is_active())
            .ok_or(CatalogError::RequirementNotFound(id))?;
        requirement.document_name = draft.document_name.trim().to_string();
        requirement.description = draft.description;
        requirement.is_mandatory = draft.is_mandatory;
        requirement.max_file_size_mb = draft.max_file_size_mb;
        requirement.allowed_formats = draft.allowed_formats;
        Ok(requirement)
    }

    /// Retire an active requirement.
    pub fn retire_requirement(
        &mut self,
        id: RequirementId,
        now: Timestamp,
    ) -> Result<&DocumentRequirement, CatalogError> {
        let requirement = self
            .requirements
            .get_mut(&id)
            .filter(|r| r.is_active())
            .ok_or(CatalogError::RequirementNotFound(id))?;
        requirement.retired_at = Some(now);
        Ok(requirement)
    }
}

// ─── Field checks ────────────────────────────────────────────────────

pub(crate) fn require_text(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    if value.trim().is_empty() {
        errors.add(field, "This field may not be blank.");
    } else {
        max_len(errors, field, value, max);
    }
}

pub(crate) fn max_len(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.add(
            field,
            format!("Ensure this field has no more than {max} characters."),
        );
    }
}

pub(crate) fn percentage_in_range(errors: &mut FieldErrors, field: &str, value: f64) {
    if !value.is_finite() {
        errors.add(field, "A valid number is required.");
    } else if value < 0.0 {
        errors.add(field, "Ensure this value is greater than or equal to 0.");
    } else if value > 100.0 {
        errors.add(field, "Ensure this value is less than or equal to 100.");
    }
}
