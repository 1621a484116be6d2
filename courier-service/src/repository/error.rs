//! Repository error types
//!
//! Structured errors for the storage interface the core consumes. Backends
//! translate their native failures into these; the core maps them onto the
//! service taxonomy at the boundary.

use std::fmt;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Finding a single entity by ID
    FindById,
    /// Finding multiple entities
    FindAll,
    /// Creating a new entity
    Create,
    /// Updating an existing entity
    Update,
    /// Deleting an entity
    Delete,
    /// Appending to an append-only log
    Append,
    /// Atomic environment activation
    Activate,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FindById => write!(f, "find_by_id"),
            Self::FindAll => write!(f, "find_all"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Append => write!(f, "append"),
            Self::Activate => write!(f, "activate"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// Entity was not found
    NotFound,
    /// Entity already exists (duplicate key)
    AlreadyExists,
    /// Validation failed before the storage operation
    ValidationFailed,
    /// Failed to reach the backing store
    ConnectionFailed,
    /// Operation timed out
    Timeout,
    /// Serialization or deserialization error
    SerializationError,
    /// Other unclassified error
    Other,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::AlreadyExists => write!(f, "already_exists"),
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::SerializationError => write!(f, "serialization_error"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Structured repository error with operation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
        }
    }

    /// Create a "not found" error naming the entity and id
    pub fn not_found(entity: &str, id: impl fmt::Display) -> Self {
        Self::new(
            RepositoryOperation::FindById,
            RepositoryErrorKind::NotFound,
            format!("{entity} {id} not found"),
        )
    }

    /// Create a duplicate-key error
    pub fn already_exists(entity: &str, key: impl fmt::Display) -> Self {
        Self::new(
            RepositoryOperation::Create,
            RepositoryErrorKind::AlreadyExists,
            format!("{entity} {key} already exists"),
        )
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )
    }
}

impl std::error::Error for RepositoryError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_constructor() {
        let err = RepositoryError::not_found("Collection", "c-1");
        assert_eq!(err.kind, RepositoryErrorKind::NotFound);
        assert_eq!(err.operation, RepositoryOperation::FindById);
        assert_eq!(err.message, "Collection c-1 not found");
    }

    #[test]
    fn test_already_exists_constructor() {
        let err = RepositoryError::already_exists("GlobalVariable", "baseUrl");
        assert_eq!(err.kind, RepositoryErrorKind::AlreadyExists);
        assert_eq!(err.operation, RepositoryOperation::Create);
    }

    #[test]
    fn test_display_formatting() {
        let err = RepositoryError::new(
            RepositoryOperation::Activate,
            RepositoryErrorKind::Timeout,
            "lock wait exceeded",
        );
        let display = format!("{}", err);
        assert!(display.contains("timeout"));
        assert!(display.contains("activate"));
        assert!(display.contains("lock wait exceeded"));
    }
}
