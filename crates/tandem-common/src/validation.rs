//! Input validation utilities.
//!
//! Centralized validation helpers for client-supplied values.

use validator::Validate;

use crate::error::RelayError;

/// A display name as sent in `join-user`.
#[derive(Debug, Validate)]
pub struct DisplayName {
    #[validate(length(min = 1, max = 64, message = "Name must be between 1 and 64 characters"))]
    pub name: String,
}

/// Validate a request body, returning a RelayError::InvalidName on failure.
pub fn validate_request<T: Validate>(body: &T) -> Result<(), RelayError> {
    body.validate().map_err(|e| RelayError::InvalidName {
        reason: format_validation_errors(e),
    })
}

/// Format validation errors into a human-readable string.
fn format_validation_errors(errors: validator::ValidationErrors) -> String {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for '{field}'"))
            })
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validate a participant display name.
///
/// Names are routing keys, so they must be non-blank and free of control
/// characters that would make log lines and presence lists ambiguous.
pub fn validate_display_name(name: &str) -> Result<(), RelayError> {
    validate_request(&DisplayName {
        name: name.to_string(),
    })?;

    if name.trim().is_empty() {
        return Err(RelayError::InvalidName {
            reason: "Name cannot be empty or whitespace only".into(),
        });
    }

    if name.chars().any(char::is_control) {
        return Err(RelayError::InvalidName {
            reason: "Name cannot contain control characters".into(),
        });
    }

    Ok(())
}
