//! Error types for the crudkit engine.

use crate::schema::FieldType;
use std::fmt;
use thiserror::Error;

/// All possible errors from the crudkit engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Lookup errors
    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("duplicate entity: {0}")]
    DuplicateEntity(String),

    // Patch errors
    #[error("validation failed: {0}")]
    Validation(ValidationError),

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        got: String,
    },

    // Collaborator errors
    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("storage timed out: {0}")]
    Timeout(String),

    #[error("storage call cancelled")]
    Cancelled,

    #[error("storage failure: {0}")]
    Storage(String),

    // Call-level errors
    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

/// Payload-free tag for an [`Error`], handy for grouping batch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    DuplicateEntity,
    Validation,
    TypeMismatch,
    Conflict,
    Timeout,
    Cancelled,
    Storage,
    InvalidBatch,
    InvalidSchema,
}

impl Error {
    /// The tag of this error without its payload.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::DuplicateEntity(_) => ErrorKind::DuplicateEntity,
            Error::Validation(_) => ErrorKind::Validation,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Storage(_) => ErrorKind::Storage,
            Error::InvalidBatch(_) => ErrorKind::InvalidBatch,
            Error::InvalidSchema(_) => ErrorKind::InvalidSchema,
        }
    }

    /// Whether repeating the same call may succeed without changing input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Conflict(_) | Error::Timeout(_) | Error::Cancelled
        )
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

/// Why a single patch key was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// The key names no declared field.
    Unknown,
    /// The key names the identifier field.
    Identifier,
    /// The key names a field only the repository may write (the version).
    ReadOnly,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::Unknown => write!(f, "unknown field"),
            ViolationKind::Identifier => write!(f, "identifier is immutable"),
            ViolationKind::ReadOnly => write!(f, "field is read-only"),
        }
    }
}

/// A rejected patch key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub kind: ViolationKind,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

/// Structural problems with a patch or query, all reported together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The patch has nothing to assign: no keys, or only ignored ones.
    EmptyPatch,
    /// The patch source was not a JSON object; holds the kind that was given.
    NotAnObject(String),
    /// Every offending field, in patch key order (see [`Patch::iter`]).
    ///
    /// [`Patch::iter`]: crate::Patch::iter
    Fields(Vec<FieldViolation>),
}

impl ValidationError {
    /// Names of the offending fields. Empty unless this is [`ValidationError::Fields`].
    pub fn fields(&self) -> Vec<&str> {
        match self {
            ValidationError::EmptyPatch | ValidationError::NotAnObject(_) => Vec::new(),
            ValidationError::Fields(violations) => {
                violations.iter().map(|v| v.field.as_str()).collect()
            }
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyPatch => write!(f, "patch is empty"),
            ValidationError::NotAnObject(got) => write!(f, "patch must be an object, got {got}"),
            ValidationError::Fields(violations) => {
                for (i, violation) in violations.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{}' ({})", violation.field, violation.kind)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
