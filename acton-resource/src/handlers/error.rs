//! API error types for resource handlers
//!
//! Every pipeline step fails with an [`ApiError`], which renders itself as a
//! JSON error body via `IntoResponse`.
//!
//! # Example
//!
//! ```rust
//! use acton_resource::handlers::{ApiError, ApiErrorKind, ApiOperation};
//!
//! let error = ApiError::not_found(ApiOperation::Detail, "Item", "507f1f77bcf86cd799439011");
//! assert!(matches!(error.kind, ApiErrorKind::NotFound));
//! assert_eq!(error.entity_id.as_deref(), Some("507f1f77bcf86cd799439011"));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::store::{FieldError, StoreError, StoreErrorKind};

/// Handler operation during which the error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOperation {
    /// Paginated query
    List,
    /// Fetch by id
    Detail,
    /// Create from the request body
    Insert,
    /// Modify by id
    Update,
    /// Delete by id
    Remove,
}

impl fmt::Display for ApiOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List => write!(f, "list"),
            Self::Detail => write!(f, "detail"),
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// Category of API error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// Resource was not found
    NotFound,
    /// Malformed query parameters or body
    BadRequest,
    /// Update without a usable body
    InvalidContent,
    /// Model validation failed
    ValidationFailed,
    /// Operation conflicts with a store constraint
    Conflict,
    /// Internal server error
    InternalError,
    /// Store temporarily unavailable
    ServiceUnavailable,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::BadRequest => write!(f, "bad_request"),
            Self::InvalidContent => write!(f, "invalid_content"),
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::Conflict => write!(f, "conflict"),
            Self::InternalError => write!(f, "internal_error"),
            Self::ServiceUnavailable => write!(f, "service_unavailable"),
        }
    }
}

impl ApiErrorKind {
    /// HTTP status code for this error kind
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest | Self::InvalidContent | Self::ValidationFailed => {
                StatusCode::BAD_REQUEST
            }
            Self::Conflict => StatusCode::CONFLICT,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Upper-case error code, e.g. `NOT_FOUND`
    #[must_use]
    pub fn error_code(&self) -> String {
        self.to_string().to_uppercase()
    }
}

/// Structured API error with operation context
///
/// Store errors that are not validation failures are kept untouched as
/// [`ApiError::cause`].
///
/// ```rust
/// use acton_resource::handlers::{ApiError, ApiErrorKind};
/// use acton_resource::store::{StoreError, StoreOperation};
///
/// let store = StoreError::connection_failed(StoreOperation::Find, "connection refused");
/// let error = ApiError::from(store.clone());
///
/// assert_eq!(error.kind, ApiErrorKind::ServiceUnavailable);
/// assert_eq!(error.cause, Some(store));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// The operation being performed when the error occurred
    pub operation: ApiOperation,
    /// The category of error
    pub kind: ApiErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The model involved (e.g. "Item")
    pub entity_type: Option<String>,
    /// The id of the document involved
    pub entity_id: Option<String>,
    /// Field-level validation errors
    pub field_errors: Vec<FieldError>,
    /// Originating store error, if any
    pub cause: Option<StoreError>,
}

impl ApiError {
    /// Create a new API error
    pub fn new(operation: ApiOperation, kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
            field_errors: Vec::new(),
            cause: None,
        }
    }

    /// "Resource not found" carrying the requested id
    pub fn not_found(
        operation: ApiOperation,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self::new(operation, ApiErrorKind::NotFound, "Resource not found")
            .with_entity(entity_type, entity_id)
    }

    /// Malformed query parameter or body
    pub fn bad_request(operation: ApiOperation, message: impl Into<String>) -> Self {
        Self::new(operation, ApiErrorKind::BadRequest, message)
    }

    /// Missing or unusable request body
    pub fn invalid_content(operation: ApiOperation) -> Self {
        Self::new(operation, ApiErrorKind::InvalidContent, "Invalid content")
    }

    /// "Validation failed" with field-level details
    pub fn validation_failed(operation: ApiOperation, field_errors: Vec<FieldError>) -> Self {
        Self {
            field_errors,
            ..Self::new(operation, ApiErrorKind::ValidationFailed, "Validation failed")
        }
    }

    /// Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ApiOperation::List, ApiErrorKind::InternalError, message)
    }

    /// Store unavailable
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ApiOperation::List, ApiErrorKind::ServiceUnavailable, message)
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
    pub fn with_operation(mut self, operation: ApiOperation) -> Self {
        self.operation = operation;
        self
    }

    /// HTTP status this error renders with
    pub fn status_code(&self) -> StatusCode {
        self.kind.status_code()
    }

    /// Check if this error is transient
    pub fn is_retriable(&self) -> bool {
        matches!(self.kind, ApiErrorKind::ServiceUnavailable)
    }

    fn grouped_field_errors(&self) -> Option<BTreeMap<String, Vec<FieldError>>> {
        if self.field_errors.is_empty() {
            return None;
        }
        let mut grouped: BTreeMap<String, Vec<FieldError>> = BTreeMap::new();
        for error in &self.field_errors {
            grouped
                .entry(error.field.clone())
                .or_default()
                .push(error.clone());
        }
        Some(grouped)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "API {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let (Some(entity_type), Some(entity_id)) = (&self.entity_type, &self.entity_id) {
            write!(f, " [{}: {}]", entity_type, entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Response body for API errors
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub error: String,
    pub code: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<FieldError>>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        tracing::error!(
            operation = %self.operation,
            kind = %self.kind,
            entity_type = ?self.entity_type,
            entity_id = ?self.entity_id,
            cause = ?self.cause.as_ref().map(ToString::to_string),
            retriable = self.is_retriable(),
            "API error: {}", self.message
        );

        let errors = self.grouped_field_errors();
        let response = ApiErrorResponse {
            error: self.message,
            code: self.kind.error_code(),
            status: status.as_u16(),
            operation: Some(self.operation.to_string()),
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            errors,
        };

        (status, Json(response)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let kind = match err.kind {
            StoreErrorKind::ValidationFailed => ApiErrorKind::ValidationFailed,
            StoreErrorKind::NotFound => ApiErrorKind::NotFound,
            StoreErrorKind::ConstraintViolation => ApiErrorKind::Conflict,
            StoreErrorKind::ConnectionFailed | StoreErrorKind::Timeout => {
                ApiErrorKind::ServiceUnavailable
            }
            StoreErrorKind::QueryFailed
            | StoreErrorKind::SerializationError
            | StoreErrorKind::Other => ApiErrorKind::InternalError,
        };

        // internal details stay in `cause`
        let message = match kind {
            ApiErrorKind::ValidationFailed => "Validation failed".to_string(),
            ApiErrorKind::ServiceUnavailable => "Service temporarily unavailable".to_string(),
            ApiErrorKind::InternalError => "An internal error occurred".to_string(),
            _ => err.message.clone(),
        };

        Self {
            operation: ApiOperation::List,
            kind,
            message,
            entity_type: err.entity_type.clone(),
            entity_id: err.entity_id.clone(),
            field_errors: err.field_errors.clone(),
            cause: Some(err),
        }
    }
}
