//! Conversions from internal errors into [`EngineError`].

use dynamock_model::EngineError;

use crate::expression::ExpressionError;

impl From<ExpressionError> for EngineError {
    fn from(err: ExpressionError) -> Self {
        EngineError::validation(err.to_string()).with_source(err)
    }
}

/// Error raised when a batch lists the same key twice for one table.
#[must_use]
pub fn duplicate_keys() -> EngineError {
    EngineError::validation("Provided list of item keys contains duplicates")
}

#[cfg(test)]
mod tests {
    use dynamock_model::ErrorCode;

    use super::*;

    #[test]
    fn test_should_map_expression_error_to_validation() {
        let err: EngineError = ExpressionError::UnresolvedValue {
            name: "v".to_owned(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::ValidationException);
        assert_eq!(err.message, "Unresolved expression attribute value: :v");
        assert!(std::error::Error::source(&err).is_some());
    }
}
