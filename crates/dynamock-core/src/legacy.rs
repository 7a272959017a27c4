//! Translation of the legacy request parameters.
//!
//! `Expected`, `KeyConditions`, `QueryFilter`, `ScanFilter` and
//! `AttributeUpdates` predate expression strings. Each entry becomes one
//! predicate or directive; entries are processed in attribute-name order so
//! the resulting tree does not depend on map iteration order.

use std::collections::HashMap;

use dynamock_model::EngineError;
use dynamock_model::types::{
    AttributeAction, AttributeValueUpdate, Condition, ExpectedAttributeValue,
};

use crate::expression::Expression;
use crate::update::{UpdateDirective, Updates};

fn sorted<V>(map: &HashMap<String, V>) -> Vec<(&String, &V)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

/// ANDs a `KeyConditions`, `QueryFilter` or `ScanFilter` map.
///
/// # Errors
///
/// Returns a validation error when an operator gets the wrong number of
/// values.
pub fn conditions_to_expression(
    conditions: &HashMap<String, Condition>,
) -> Result<Option<Expression>, EngineError> {
    let parts = sorted(conditions)
        .into_iter()
        .map(|(name, cond)| {
            Expression::condition(
                name.as_str(),
                cond.comparison_operator.as_str(),
                cond.attribute_value_list.clone(),
            )
            .map(Some)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Expression::and_all(parts))
}

/// ANDs an `Expected` map.
///
/// `Exists: false` asserts absence, a bare `Value` asserts equality and the
/// extended form applies `ComparisonOperator` to `AttributeValueList`.
///
/// # Errors
///
/// Returns a validation error for contradictory or empty entries.
pub fn expected_to_expression(
    expected: &HashMap<String, ExpectedAttributeValue>,
) -> Result<Option<Expression>, EngineError> {
    let parts = sorted(expected)
        .into_iter()
        .map(|(name, exp)| expected_entry(name, exp).map(Some))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Expression::and_all(parts))
}

fn expected_entry(name: &str, exp: &ExpectedAttributeValue) -> Result<Expression, EngineError> {
    if let Some(op) = exp.comparison_operator {
        if exp.value.is_some() || exp.exists.is_some() {
            return Err(EngineError::validation(format!(
                "One or more parameter values were invalid: Value or Exists cannot be used with ComparisonOperator for Attribute: {name}"
            )));
        }
        return Expression::condition(name, op.as_str(), exp.attribute_value_list.clone());
    }
    match (&exp.value, exp.exists) {
        (Some(_), Some(false)) => Err(EngineError::validation(format!(
            "One or more parameter values were invalid: Value cannot be used when Exists is false for Attribute: {name}"
        ))),
        (None, Some(false)) => Ok(Expression::null(name)),
        (Some(value), _) => Ok(Expression::eq(name, value.clone())),
        (None, _) => Err(EngineError::validation(format!(
            "One or more parameter values were invalid: Value must be provided when Exists is true for Attribute: {name}"
        ))),
    }
}

/// Turns an `AttributeUpdates` map into update directives.
///
/// # Errors
///
/// Returns a validation error when `PUT` or `ADD` has no value.
pub fn attribute_updates_to_updates(
    updates: &HashMap<String, AttributeValueUpdate>,
) -> Result<Updates, EngineError> {
    sorted(updates)
        .into_iter()
        .map(|(name, update)| {
            let action = update.action.unwrap_or_default();
            let directive = match (action, update.value.clone()) {
                (AttributeAction::Put, Some(v)) => UpdateDirective::Put(v),
                (AttributeAction::Add, Some(v)) => UpdateDirective::Increment(v),
                (AttributeAction::Delete, v) => UpdateDirective::Delete(v),
                (action, None) => {
                    return Err(EngineError::validation(format!(
                        "One or more parameter values were invalid: Only DELETE action is allowed when no attribute value is specified, got {action} for {name}"
                    )));
                }
            };
            Ok((name.clone(), directive))
        })
        .collect()
}
