//! Conversion between [`AttributeValue`] and plain JSON values.
//!
//! Strings, numbers and booleans map one to one. Arrays of strings become
//! string sets, arrays of numbers become number sets, and arrays holding
//! anything else become lists. Objects become maps.

use serde_json::{Map, Number, Value};
use tracing::warn;

use crate::attribute_value::{AttributeValue, Item};

/// Errors raised while turning a native value into an [`AttributeValue`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    /// A set-shaped array mixes strings and numbers.
    #[error("Array types must all be the same at {path}: found {first} and {other}")]
    TypeMismatch {
        /// Attribute path of the offending array.
        path: String,
        /// Kind of the first element.
        first: &'static str,
        /// Kind of the first element that differs.
        other: &'static str,
    },
    /// The value has no typed representation.
    #[error("Unknown object type at {path}: {kind}")]
    InvalidValue {
        /// Attribute path of the offending value.
        path: String,
        /// JSON kind that was rejected.
        kind: &'static str,
    },
    /// A set-shaped array has no elements.
    #[error("Sets may not be empty at {path}")]
    EmptySet {
        /// Attribute path of the offending array.
        path: String,
    },
    /// The top-level value of an item was not an object.
    #[error("An item must be a JSON object, got {kind}")]
    NotAnObject {
        /// JSON kind that was rejected.
        kind: &'static str,
    },
}

/// How strictly unsupported native values are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversionMode {
    /// Unsupported values are an error.
    #[default]
    Strict,
    /// Unsupported values are logged and stored as `N("0")`.
    LegacyFallback,
}

/// Converts a typed value into its plain JSON counterpart.
///
/// Number strings become JSON numbers when they parse; anything that does not
/// fit a JSON number is kept as its decimal string.
#[must_use]
pub fn to_native(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => number_to_native(n),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Ss(v) => Value::Array(v.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(v) => Value::Array(v.iter().map(|n| number_to_native(n)).collect()),
        AttributeValue::L(list) => Value::Array(list.iter().map(to_native).collect()),
        AttributeValue::M(m) => Value::Object(
            m.iter()
                .map(|(k, v)| (k.clone(), to_native(v)))
                .collect::<Map<_, _>>(),
        ),
        AttributeValue::Null(_) => Value::Null,
    }
}

/// Converts a typed item into a JSON object.
#[must_use]
pub fn item_to_native(item: &Item) -> Value {
    Value::Object(
        item.iter()
            .map(|(k, v)| (k.clone(), to_native(v)))
            .collect::<Map<_, _>>(),
    )
}

/// Converts a plain JSON value into a typed value.
pub fn from_native(value: &Value, mode: ConversionMode) -> Result<AttributeValue, ConversionError> {
    convert(value, "$", mode)
}

/// Converts a JSON object into a typed item.
pub fn item_from_native(value: &Value, mode: ConversionMode) -> Result<Item, ConversionError> {
    let Value::Object(obj) = value else {
        return Err(ConversionError::NotAnObject {
            kind: kind_of(value),
        });
    };
    obj.iter()
        .map(|(k, v)| convert(v, k, mode).map(|av| (k.clone(), av)))
        .collect()
}

fn convert(value: &Value, path: &str, mode: ConversionMode) -> Result<AttributeValue, ConversionError> {
    match value {
        Value::String(s) => Ok(AttributeValue::S(s.clone())),
        Value::Number(n) => Ok(AttributeValue::N(n.to_string())),
        Value::Bool(b) => Ok(AttributeValue::Bool(*b)),
        Value::Array(elems) => convert_array(elems, path, mode),
        Value::Object(obj) => {
            let mut m = std::collections::HashMap::with_capacity(obj.len());
            for (k, v) in obj {
                let child = format!("{path}.{k}");
                m.insert(k.clone(), convert(v, &child, mode)?);
            }
            Ok(AttributeValue::M(m))
        }
        Value::Null => match mode {
            ConversionMode::Strict => Err(ConversionError::InvalidValue {
                path: path.to_owned(),
                kind: "null",
            }),
            ConversionMode::LegacyFallback => {
                warn!(path, "storing unsupported null value as number 0");
                Ok(AttributeValue::N("0".to_owned()))
            }
        },
    }
}

fn convert_array(
    elems: &[Value],
    path: &str,
    mode: ConversionMode,
) -> Result<AttributeValue, ConversionError> {
    let Some(first) = elems.first() else {
        return Err(ConversionError::EmptySet {
            path: path.to_owned(),
        });
    };

    let set_shaped = elems
        .iter()
        .all(|e| matches!(e, Value::String(_) | Value::Number(_)));
    if !set_shaped {
        let list = elems
            .iter()
            .enumerate()
            .map(|(i, e)| convert(e, &format!("{path}[{i}]"), mode))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(AttributeValue::L(list));
    }

    if let Some(other) = elems.iter().find(|e| kind_of(e) != kind_of(first)) {
        return Err(ConversionError::TypeMismatch {
            path: path.to_owned(),
            first: kind_of(first),
            other: kind_of(other),
        });
    }

    if first.is_string() {
        Ok(AttributeValue::Ss(
            elems
                .iter()
                .filter_map(|e| e.as_str().map(str::to_owned))
                .collect(),
        ))
    } else {
        Ok(AttributeValue::Ns(elems.iter().map(Value::to_string).collect()))
    }
}

fn number_to_native(n: &str) -> Value {
    if let Ok(i) = n.parse::<i64>() {
        return Value::Number(i.into());
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or_else(|| Value::String(n.to_owned()), Value::Number)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_should_convert_scalars() {
        assert_eq!(
            from_native(&json!("userA"), ConversionMode::Strict).unwrap(),
            AttributeValue::S("userA".to_owned())
        );
        assert_eq!(
            from_native(&json!(29), ConversionMode::Strict).unwrap(),
            AttributeValue::N("29".to_owned())
        );
        assert_eq!(
            from_native(&json!(true), ConversionMode::Strict).unwrap(),
            AttributeValue::Bool(true)
        );
    }

    #[test]
    fn test_should_convert_homogeneous_arrays_to_sets() {
        assert_eq!(
            from_native(&json!([1, 3, 5]), ConversionMode::Strict).unwrap(),
            AttributeValue::Ns(vec!["1".to_owned(), "3".to_owned(), "5".to_owned()])
        );
        assert_eq!(
            from_native(&json!(["a", "b"]), ConversionMode::Strict).unwrap(),
            AttributeValue::Ss(vec!["a".to_owned(), "b".to_owned()])
        );
    }

    #[test]
    fn test_should_reject_mixed_set_elements() {
        let err = from_native(&json!(["a", 1]), ConversionMode::Strict).unwrap_err();
        assert!(matches!(err, ConversionError::TypeMismatch { first: "string", other: "number", .. }));
    }

    #[test]
    fn test_should_reject_empty_array() {
        let err = from_native(&json!({"tags": []}), ConversionMode::Strict).unwrap_err();
        assert_eq!(
            err,
            ConversionError::EmptySet {
                path: "$.tags".to_owned()
            }
        );
    }

    #[test]
    fn test_should_convert_nested_structures_to_lists_and_maps() {
        let value = from_native(
            &json!({"profile": {"tags": ["x"]}, "history": [{"n": 1}, [true]]}),
            ConversionMode::Strict,
        )
        .unwrap();
        let m = value.as_m().unwrap();
        let profile = m["profile"].as_m().unwrap();
        assert_eq!(profile["tags"], AttributeValue::Ss(vec!["x".to_owned()]));
        let history = m["history"].as_l().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1], AttributeValue::L(vec![AttributeValue::Bool(true)]));
    }

    #[test]
    fn test_should_reject_null_in_strict_mode() {
        let err = from_native(&Value::Null, ConversionMode::Strict).unwrap_err();
        assert!(matches!(err, ConversionError::InvalidValue { kind: "null", .. }));
    }

    #[test]
    fn test_should_fall_back_to_zero_in_legacy_mode() {
        let value = from_native(&Value::Null, ConversionMode::LegacyFallback).unwrap();
        assert_eq!(value, AttributeValue::N("0".to_owned()));
    }

    #[test]
    fn test_should_convert_number_set_back_to_numbers() {
        let native = to_native(&AttributeValue::Ns(vec!["1".to_owned(), "2.5".to_owned()]));
        assert_eq!(native, json!([1, 2.5]));
    }

    #[test]
    fn test_should_convert_item_both_ways() {
        let native = json!({"userId": "userA", "age": 29, "luckyNumbers": [1, 3, 5]});
        let item = item_from_native(&native, ConversionMode::Strict).unwrap();
        assert_eq!(item_to_native(&item), native);
    }

    #[test]
    fn test_should_reject_non_object_item() {
        let err = item_from_native(&json!([1]), ConversionMode::Strict).unwrap_err();
        assert_eq!(err, ConversionError::NotAnObject { kind: "array" });
    }
}
