//! The validation gate every save passes through.
//!
//! Backends must not bypass this: a document that fails here never reaches
//! backend I/O. Failures are logged as warnings naming the problem and are
//! returned as values, never raised.

use serde_json::Value;
use tracing::warn;
use worldstore_types::{ValidationError, WorldData};

/// Stateless predicate deciding whether a document is well-formed world data.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationPolicy;

impl ValidationPolicy {
    /// Whether `document` is a mapping carrying `world_name` and `saved_at`.
    pub fn validate(document: &Value) -> bool {
        Self::check(document).is_ok()
    }

    /// Validate `document` and return it as typed world data.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidationError`] describing the first problem found.
    pub fn check(document: &Value) -> Result<WorldData, ValidationError> {
        WorldData::from_ref(document).inspect_err(|e| {
            warn!(error = %e, "rejected world data");
        })
    }

    /// Validate an owned value, typically a payload decoded from a backend.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidationError`] describing the first problem found.
    pub fn check_owned(document: Value) -> Result<WorldData, ValidationError> {
        WorldData::from_value(document).inspect_err(|e| {
            warn!(error = %e, "stored world data failed validation");
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn valid_document_passes() {
        assert!(ValidationPolicy::validate(
            &json!({"world_name": "w1", "saved_at": "t1", "agents": []})
        ));
    }

    #[test]
    fn non_mapping_is_rejected() {
        assert!(!ValidationPolicy::validate(&json!("w1")));
        assert!(!ValidationPolicy::validate(&json!(null)));
        assert!(!ValidationPolicy::validate(&json!([{"world_name": "w1"}])));
    }

    #[test]
    fn missing_fields_are_rejected() {
        assert_eq!(
            ValidationPolicy::check(&json!({"saved_at": "t1"})),
            Err(ValidationError::MissingField("world_name"))
        );
        assert_eq!(
            ValidationPolicy::check(&json!({"world_name": "w1"})),
            Err(ValidationError::MissingField("saved_at"))
        );
    }

    #[test]
    fn null_values_still_count_as_present() {
        assert!(ValidationPolicy::validate(
            &json!({"world_name": "w1", "saved_at": null})
        ));
    }
}
