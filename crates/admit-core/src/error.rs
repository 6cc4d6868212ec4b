//! # Error Types
//!
//! Validation primitives shared by every layer. Domain crates define their
//! own `thiserror` enums and wrap these where a field-level report is needed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key used for messages that do not belong to a single field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Errors raised by validated constructors in this crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Role name is not one of the known roles.
    #[error("unknown role: {0:?}")]
    UnknownRole(String),

    /// Timestamp could not be parsed.
    #[error("invalid timestamp {input:?}: {reason}")]
    InvalidTimestamp {
        /// The rejected input.
        input: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// Application number does not match `APP<year><8 hex>`.
    #[error("invalid application number: {0:?}")]
    InvalidApplicationNumber(String),
}

/// Field-keyed validation report.
///
/// Serializes as `{"field": ["message", ...]}`. Fields iterate in sorted
/// order so error bodies are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report with a single message for one field.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Append a message for `field`.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Merge another report into this one, keeping message order per field.
    pub fn merge(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages recorded for `field`, if any.
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Iterate over `(field, messages)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Flatten to one display string, `"field: message; field: message"`.
    ///
    /// Uses the same `"; "` separator clients use when rendering the body.
    pub fn joined(&self) -> String {
        self.0
            .iter()
            .flat_map(|(field, messages)| {
                messages.iter().map(move |m| {
                    if field == NON_FIELD_ERRORS {
                        m.clone()
                    } else {
                        format!("{field}: {m}")
                    }
                })
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.joined())
    }
}

impl std::error::Error for FieldErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_is_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
    }

    #[test]
    fn messages_accumulate_per_field() {
        let mut errors = FieldErrors::new();
        errors.add("tenth_year", "This field is required.");
        errors.add("tenth_year", "Ensure this value is at most 2100.");
        assert_eq!(errors.get("tenth_year").map(<[String]>::len), Some(2));
    }

    #[test]
    fn serializes_as_field_keyed_arrays() {
        let errors = FieldErrors::single("gender", "\"x\" is not a valid choice.");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"gender": ["\"x\" is not a valid choice."]})
        );
    }

    #[test]
    fn joined_uses_semicolon_separator() {
        let mut errors = FieldErrors::new();
        errors.add("b_field", "second");
        errors.add("a_field", "first");
        errors.add(NON_FIELD_ERRORS, "general");
        assert_eq!(errors.joined(), "a_field: first; b_field: second; general");
    }

    #[test]
    fn merge_keeps_both_sides() {
        let mut left = FieldErrors::single("x", "one");
        let mut right = FieldErrors::single("x", "two");
        right.add("y", "three");
        left.merge(right);
        assert_eq!(left.get("x").unwrap(), ["one", "two"]);
        assert_eq!(left.get("y").unwrap(), ["three"]);
    }
}
