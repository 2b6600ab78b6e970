//! Store error types
//!
//! Errors raised by [`Model`](super::Model) implementations. The binder only
//! inspects the [`StoreErrorKind`]: validation failures are rewritten into
//! structured client errors, everything else is passed through untouched.
//!
//! # Example
//!
//! ```rust
//! use acton_resource::store::{FieldError, StoreError, StoreErrorKind};
//!
//! let error = StoreError::validation_failed(vec![FieldError::required("name")]);
//! assert!(error.is_validation());
//! assert_eq!(error.field_errors.len(), 1);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Store operation being performed when the error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// Executing a multi-document query
    Find,
    /// Executing a single-document query
    FindOne,
    /// Building a new, unsaved document
    Instantiate,
    /// Persisting a new or modified document
    Save,
    /// Deleting a document
    Remove,
    /// Expanding a populate directive
    Populate,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Find => write!(f, "find"),
            Self::FindOne => write!(f, "find_one"),
            Self::Instantiate => write!(f, "instantiate"),
            Self::Save => write!(f, "save"),
            Self::Remove => write!(f, "remove"),
            Self::Populate => write!(f, "populate"),
        }
    }
}

/// Category of store error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// Document failed the model's validation rules
    ValidationFailed,
    /// Document addressed by a write no longer exists
    NotFound,
    /// Unique or referential constraint violated
    ConstraintViolation,
    /// Could not reach the backing store
    ConnectionFailed,
    /// Operation timed out
    Timeout,
    /// Query could not be executed by the store
    QueryFailed,
    /// Document could not be (de)serialized
    SerializationError,
    /// Anything else
    Other,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::NotFound => write!(f, "not_found"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::QueryFailed => write!(f, "query_failed"),
            Self::SerializationError => write!(f, "serialization_error"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Field-level validation error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field path
    pub field: String,
    /// Error code (e.g. "REQUIRED", "INVALID_TYPE")
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl FieldError {
    /// Create a field error
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    /// Error for a missing required field
    pub fn required(field: impl Into<String>) -> Self {
        let field = field.into();
        let message = format!("Path `{}` is required.", field);
        Self::new(field, "REQUIRED", message)
    }
}

/// Structured store error with operation context
///
/// # Example
///
/// ```rust
/// use acton_resource::store::{StoreError, StoreOperation};
///
/// let error = StoreError::connection_failed(StoreOperation::Find, "connection refused");
/// assert!(error.is_retriable());
/// println!("{}", error); // "Store connection_failed error during find: connection refused"
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    /// The operation being performed when the error occurred
    pub operation: StoreOperation,
    /// The category of error
    pub kind: StoreErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The model involved (e.g. "Item")
    pub entity_type: Option<String>,
    /// The id of the document involved
    pub entity_id: Option<String>,
    /// Field-level details, only populated for validation failures
    pub field_errors: Vec<FieldError>,
}

impl StoreError {
    /// Create a new store error
    pub fn new(
        operation: StoreOperation,
        kind: StoreErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
            field_errors: Vec::new(),
        }
    }

    /// Create a validation failure carrying field errors
    pub fn validation_failed(field_errors: Vec<FieldError>) -> Self {
        Self {
            field_errors,
            ..Self::new(
                StoreOperation::Save,
                StoreErrorKind::ValidationFailed,
                "Validation failed",
            )
        }
    }

    /// Create a "not found" error for a write against a vanished document
    pub fn not_found(
        operation: StoreOperation,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self::new(operation, StoreErrorKind::NotFound, "Document not found")
            .with_entity(entity_type, entity_id)
    }

    /// Create a connection failure
    pub fn connection_failed(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StoreErrorKind::ConnectionFailed, message)
    }

    /// Create a timeout error
    pub fn timeout(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StoreErrorKind::Timeout, message)
    }

    /// Create a query failure
    pub fn query_failed(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StoreErrorKind::QueryFailed, message)
    }

    /// Create a serialization error
    pub fn serialization_error(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StoreErrorKind::SerializationError, message)
    }

    /// Add entity context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: StoreOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Whether this is a model validation failure
    pub fn is_validation(&self) -> bool {
        self.kind == StoreErrorKind::ValidationFailed
    }

    /// Check if this error is transient
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            StoreErrorKind::ConnectionFailed | StoreErrorKind::Timeout
        )
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Store {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let (Some(entity_type), Some(entity_id)) = (&self.entity_type, &self.entity_id) {
            write!(f, " [{}: {}]", entity_type, entity_id)?;
        }
        if !self.field_errors.is_empty() {
            let fields: Vec<&str> = self.field_errors.iter().map(|e| e.field.as_str()).collect();
            write!(f, " (fields: {})", fields.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for StoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_operation_display() {
        assert_eq!(StoreOperation::Find.to_string(), "find");
        assert_eq!(StoreOperation::FindOne.to_string(), "find_one");
        assert_eq!(StoreOperation::Save.to_string(), "save");
        assert_eq!(StoreOperation::Remove.to_string(), "remove");
    }

    #[test]
    fn test_validation_failed_keeps_field_errors() {
        let error = StoreError::validation_failed(vec![
            FieldError::required("name"),
            FieldError::new("age", "INVALID_TYPE", "age must be a number"),
        ]);

        assert!(error.is_validation());
        assert_eq!(error.operation, StoreOperation::Save);
        assert_eq!(error.field_errors[0].code, "REQUIRED");
        assert_eq!(error.field_errors[1].field, "age");
    }

    #[test]
    fn test_required_message() {
        let field = FieldError::required("name");
        assert_eq!(field.message, "Path `name` is required.");
    }

    #[test]
    fn test_retriable_kinds() {
        assert!(StoreError::timeout(StoreOperation::Find, "slow").is_retriable());
        assert!(StoreError::connection_failed(StoreOperation::Save, "down").is_retriable());
        assert!(!StoreError::query_failed(StoreOperation::Find, "bad").is_retriable());
        assert!(!StoreError::validation_failed(vec![]).is_retriable());
    }

    #[test]
    fn test_display_with_entity_and_fields() {
        let not_found = StoreError::not_found(StoreOperation::Remove, "Item", "abc");
        assert_eq!(
            not_found.to_string(),
            "Store not_found error during remove: Document not found [Item: abc]"
        );

        let invalid = StoreError::validation_failed(vec![FieldError::required("name")]);
        assert!(invalid.to_string().ends_with("(fields: name)"));
    }
}
