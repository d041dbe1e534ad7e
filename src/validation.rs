//! Structured validation results for the save flows.
//!
//! Checks that used to live in form `clean()` hooks are explicit here: each
//! validator returns the full list of field-level problems so the caller can
//! report all of them at once, and nothing invalid reaches the repositories.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::DatabaseError;

/// One field-level validation problem, addressed to the submitting form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Failure of a create/update flow: either the input was rejected with
/// field-level messages, or the storage layer failed.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("validation failed ({} field{})", .0.len(), if .0.len() == 1 { "" } else { "s" })]
    Invalid(Vec<FieldError>),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl SaveError {
    /// Wrap a non-empty error list; `Ok` when there is nothing to report.
    pub fn from_errors(errors: Vec<FieldError>) -> Result<(), SaveError> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SaveError::Invalid(errors))
        }
    }
}

/// Shared field checks.
pub fn require_non_blank(errors: &mut Vec<FieldError>, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, "This field is required."));
    }
}

pub fn check_email(errors: &mut Vec<FieldError>, field: &'static str, value: Option<&str>) {
    if let Some(email) = value {
        if !email.trim().is_empty() && !email.contains('@') {
            errors.push(FieldError::new(field, "Enter a valid email address."));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_field_is_reported() {
        let mut errors = Vec::new();
        require_non_blank(&mut errors, "surname", "   ");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "surname");
    }

    #[test]
    fn email_without_at_is_reported() {
        let mut errors = Vec::new();
        check_email(&mut errors, "email", Some("not-an-email"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn absent_email_is_fine() {
        let mut errors = Vec::new();
        check_email(&mut errors, "email", None);
        check_email(&mut errors, "email", Some(""));
        assert!(errors.is_empty());
    }

    #[test]
    fn empty_error_list_is_ok() {
        assert!(SaveError::from_errors(Vec::new()).is_ok());
        let err = SaveError::from_errors(vec![FieldError::new("body", "required")]).unwrap_err();
        assert!(matches!(err, SaveError::Invalid(errors) if errors.len() == 1));
    }

    #[test]
    fn field_errors_serialize_for_the_form_layer() {
        let err = FieldError::new("scheduled_at", "Slot already taken.");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["field"], "scheduled_at");
        assert_eq!(json["message"], "Slot already taken.");
    }
}
