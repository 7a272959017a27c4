//! Engine error taxonomy.
//!
//! Errors carry a code mirroring the service's `__type` names so a caller can
//! branch on the kind without parsing messages.

use std::fmt;

use crate::native::ConversionError;

/// Well-known error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ErrorCode {
    /// A condition evaluated to false against the stored item.
    ConditionalCheckFailedException,
    /// The request is malformed.
    #[default]
    ValidationException,
    /// The table is not registered.
    ResourceNotFoundException,
    /// A table with that name already exists.
    ResourceInUseException,
    /// An update action does not fit the stored value.
    InvalidUpdate,
    /// Operand types do not fit the operation.
    TypeMismatch,
    /// An expression operator is unknown or misused.
    InvalidOperator,
    /// A value has no typed representation.
    InvalidValue,
}

impl ErrorCode {
    /// Returns the fully-qualified error type string for the JSON `__type` field.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::ConditionalCheckFailedException => {
                "com.amazonaws.dynamodb.v20120810#ConditionalCheckFailedException"
            }
            Self::ValidationException => "com.amazon.coral.validate#ValidationException",
            Self::ResourceNotFoundException => {
                "com.amazonaws.dynamodb.v20120810#ResourceNotFoundException"
            }
            Self::ResourceInUseException => {
                "com.amazonaws.dynamodb.v20120810#ResourceInUseException"
            }
            Self::InvalidUpdate => "dynamock#InvalidUpdate",
            Self::TypeMismatch => "dynamock#TypeMismatch",
            Self::InvalidOperator => "dynamock#InvalidOperator",
            Self::InvalidValue => "dynamock#InvalidValue",
        }
    }

    /// Returns the short error code string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConditionalCheckFailedException => "ConditionalCheckFailedException",
            Self::ValidationException => "ValidationException",
            Self::ResourceNotFoundException => "ResourceNotFoundException",
            Self::ResourceInUseException => "ResourceInUseException",
            Self::InvalidUpdate => "InvalidUpdate",
            Self::TypeMismatch => "TypeMismatch",
            Self::InvalidOperator => "InvalidOperator",
            Self::InvalidValue => "InvalidValue",
        }
    }

    /// Whether a caller may reasonably retry or branch on this error, as
    /// opposed to fixing its own code.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ConditionalCheckFailedException)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error produced by the engine.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct EngineError {
    /// The error code.
    pub code: ErrorCode,
    /// A human-readable error message.
    pub message: String,
    /// The underlying source error, if any.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl EngineError {
    /// Create a new `EngineError` from an error code.
    #[must_use]
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.as_str().to_owned(),
            code,
            source: None,
        }
    }

    /// Create a new `EngineError` with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
            source: None,
        }
    }

    /// Set the source error.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the `__type` string for a JSON error body.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        self.code.error_type()
    }

    // -- Convenience constructors --

    /// Condition evaluated to false.
    #[must_use]
    pub fn conditional_check_failed() -> Self {
        Self::with_message(
            ErrorCode::ConditionalCheckFailedException,
            "The conditional request failed",
        )
    }

    /// Validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::ValidationException, message)
    }

    /// Table not registered.
    #[must_use]
    pub fn resource_not_found(table: &str) -> Self {
        Self::with_message(
            ErrorCode::ResourceNotFoundException,
            format!("Requested resource not found: Table: {table} not found"),
        )
    }

    /// Table already registered.
    #[must_use]
    pub fn resource_in_use(table: &str) -> Self {
        Self::with_message(
            ErrorCode::ResourceInUseException,
            format!("Table already exists: {table}"),
        )
    }

    /// Update action that does not fit the stored value.
    #[must_use]
    pub fn invalid_update(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InvalidUpdate, message)
    }

    /// Operand type mismatch.
    #[must_use]
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::TypeMismatch, message)
    }

    /// Unknown or misused operator.
    #[must_use]
    pub fn invalid_operator(operator: &str) -> Self {
        Self::with_message(
            ErrorCode::InvalidOperator,
            format!("Invalid comparison operator '{operator}'"),
        )
    }

    /// A number string that does not parse.
    #[must_use]
    pub fn invalid_number(value: &str) -> Self {
        Self::validation(format!(
            "The parameter cannot be converted to a numeric value: {value}"
        ))
    }

    /// Storing an empty string or set.
    #[must_use]
    pub fn empty_value() -> Self {
        Self::validation("AttributeValue may not contain an empty value")
    }
}

impl From<ConversionError> for EngineError {
    fn from(err: ConversionError) -> Self {
        let code = match err {
            ConversionError::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            ConversionError::InvalidValue { .. } | ConversionError::NotAnObject { .. } => {
                ErrorCode::InvalidValue
            }
            ConversionError::EmptySet { .. } => ErrorCode::ValidationException,
        };
        Self::with_message(code, err.to_string()).with_source(err)
    }
}

/// Create an `EngineError` from an error code.
///
/// # Examples
///
/// ```
/// use dynamock_model::engine_error;
/// use dynamock_model::error::ErrorCode;
///
/// let err = engine_error!(ValidationException);
/// assert_eq!(err.code, ErrorCode::ValidationException);
///
/// let err = engine_error!(TypeMismatch, "ADD requires a number or set value");
/// assert_eq!(err.message, "ADD requires a number or set value");
/// ```
#[macro_export]
macro_rules! engine_error {
    ($code:ident) => {
        $crate::error::EngineError::new($crate::error::ErrorCode::$code)
    };
    ($code:ident, $msg:expr) => {
        $crate::error::EngineError::with_message($crate::error::ErrorCode::$code, $msg)
    };
}
