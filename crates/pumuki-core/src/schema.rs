//! Field-level checks shared by every artifact validator.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::SchemaError;

/// Artifact schema version accepted for manifest, lock, policy and custom rules.
pub const SCHEMA_VERSION: &str = "1.0";

static SEMVER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+\.\d+\.\d+(?:[-+][0-9A-Za-z.-]+)?$").expect("static semver regex")
});

pub fn is_semver(value: &str) -> bool {
    SEMVER_PATTERN.is_match(value)
}

pub(crate) fn require_version(found: &str) -> Result<(), SchemaError> {
    if found == SCHEMA_VERSION {
        Ok(())
    } else {
        Err(SchemaError::UnsupportedVersion {
            found: found.to_string(),
            expected: SCHEMA_VERSION,
        })
    }
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), SchemaError> {
    if value.trim().is_empty() {
        Err(SchemaError::EmptyField {
            field: field.to_string(),
        })
    } else {
        Ok(())
    }
}

pub(crate) fn require_semver(field: &str, value: &str) -> Result<(), SchemaError> {
    if is_semver(value) {
        Ok(())
    } else {
        Err(SchemaError::InvalidSemver {
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}
