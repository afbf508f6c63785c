//! Error types for skills compilation and resolution.

use std::path::PathBuf;

/// Errors raised while compiling or persisting skills artifacts.
///
/// Loaders never return these for bad input; they resolve to `None` instead.
/// These are reserved for broken authoring setups the caller must fix.
#[derive(Debug, thiserror::Error)]
pub enum SkillsError {
    /// Manifest references a template id that is not registered.
    #[error("unknown skills template \"{template}\" for bundle \"{bundle}\"")]
    UnknownTemplate { template: String, bundle: String },

    /// Guideline document referenced by a bundle does not exist.
    #[error("skills source file not found for bundle \"{bundle}\": {path}")]
    SourceMissing { bundle: String, path: String },

    /// Manifest absent or structurally invalid.
    #[error("skills sources manifest not found or invalid: {}", path.display())]
    ManifestUnavailable { path: PathBuf },

    /// Filesystem failure.
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Embedded or user-supplied document could not be parsed.
    #[error("failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    /// Canonical serialization failed.
    #[error("failed to serialize {what}: {message}")]
    Serialize { what: String, message: String },

    /// A built-in template failed validation.
    #[error("invalid template \"{template}\": {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// A rule condition is malformed.
    #[error("invalid condition: {reason}")]
    InvalidCondition { reason: String },
}

impl SkillsError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ManifestUnavailable { .. } => 2,
            Self::UnknownTemplate { .. } | Self::SourceMissing { .. } => 3,
            Self::InvalidTemplate { .. } | Self::InvalidCondition { .. } => 3,
            Self::Parse { .. } | Self::Serialize { .. } => 4,
            Self::Io { .. } => 5,
        }
    }

    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Result type for skills operations.
pub type SkillsResult<T> = Result<T, SkillsError>;

/// Structural validation failure for a loaded artifact.
///
/// Surfaces only in logs and in `validate()` results; loaders map it to `None`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("unsupported schema version \"{found}\" (expected \"{expected}\")")]
    UnsupportedVersion { found: String, expected: &'static str },

    #[error("field `{field}` must not be empty")]
    EmptyField { field: String },

    #[error("field `{field}` is not a semantic version: \"{value}\"")]
    InvalidSemver { field: String, value: String },

    #[error("bundle \"{bundle}\" has a malformed content hash")]
    InvalidHash { bundle: String },

    #[error("duplicate rule id \"{rule_id}\" in bundle \"{bundle}\"")]
    DuplicateRuleId { bundle: String, rule_id: String },
}
