//! Typed attribute values with the tagged JSON wire shape.
//!
//! `AttributeValue` is a tagged union where exactly one variant is present.
//! The JSON wire format uses single-key objects like `{"S": "hello"}`.

use std::collections::HashMap;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A stored item: attribute name to value.
pub type Item = HashMap<String, AttributeValue>;

/// A typed attribute value.
///
/// Numbers are always string-encoded to preserve arbitrary precision; they are
/// parsed only when compared or used in arithmetic.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// String value.
    S(String),
    /// Number value (string-encoded).
    N(String),
    /// Boolean value.
    Bool(bool),
    /// String set.
    Ss(Vec<String>),
    /// Number set (string-encoded).
    Ns(Vec<String>),
    /// List of attribute values.
    L(Vec<AttributeValue>),
    /// Map of attribute values.
    M(HashMap<String, AttributeValue>),
    /// Null value.
    Null(bool),
}

impl AttributeValue {
    /// Returns `true` if this is a string value.
    #[must_use]
    pub fn is_s(&self) -> bool {
        matches!(self, Self::S(_))
    }

    /// Returns `true` if this is a number value.
    #[must_use]
    pub fn is_n(&self) -> bool {
        matches!(self, Self::N(_))
    }

    /// Returns `true` for `SS` and `NS`.
    #[must_use]
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Ss(_) | Self::Ns(_))
    }

    /// Returns `true` if this is a null value.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(true))
    }

    /// Returns the string value if this is an `S` variant.
    #[must_use]
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number string if this is an `N` variant.
    #[must_use]
    pub fn as_n(&self) -> Option<&str> {
        match self {
            Self::N(n) => Some(n),
            _ => None,
        }
    }

    /// Returns the members of a string or number set.
    #[must_use]
    pub fn as_set(&self) -> Option<&[String]> {
        match self {
            Self::Ss(v) | Self::Ns(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the map if this is an `M` variant.
    #[must_use]
    pub fn as_m(&self) -> Option<&HashMap<String, AttributeValue>> {
        match self {
            Self::M(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the list if this is an `L` variant.
    #[must_use]
    pub fn as_l(&self) -> Option<&[AttributeValue]> {
        match self {
            Self::L(l) => Some(l),
            _ => None,
        }
    }

    /// Returns the boolean if this is a `Bool` variant.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// True for the values the service refuses to store: empty strings and
    /// empty sets, at any nesting depth.
    #[must_use]
    pub fn contains_empty_value(&self) -> bool {
        match self {
            Self::S(s) => s.is_empty(),
            Self::Ss(v) | Self::Ns(v) => v.is_empty(),
            Self::L(list) => list.iter().any(Self::contains_empty_value),
            Self::M(m) => m.values().any(Self::contains_empty_value),
            Self::N(_) | Self::Bool(_) | Self::Null(_) => false,
        }
    }

    /// The first number string, at any nesting depth, that is not a finite
    /// decimal number.
    #[must_use]
    pub fn first_invalid_number(&self) -> Option<&str> {
        let bad = |n: &String| !n.parse::<f64>().is_ok_and(f64::is_finite);
        match self {
            Self::N(n) => bad(n).then_some(n.as_str()),
            Self::Ns(v) => v.iter().find(|n| bad(*n)).map(String::as_str),
            Self::L(list) => list.iter().find_map(Self::first_invalid_number),
            Self::M(m) => m.values().find_map(Self::first_invalid_number),
            Self::S(_) | Self::Ss(_) | Self::Bool(_) | Self::Null(_) => None,
        }
    }

    /// Returns the wire type descriptor (e.g. "S", "N", "BOOL").
    #[must_use]
    pub fn type_descriptor(&self) -> &'static str {
        match self {
            Self::S(_) => "S",
            Self::N(_) => "N",
            Self::Bool(_) => "BOOL",
            Self::Ss(_) => "SS",
            Self::Ns(_) => "NS",
            Self::L(_) => "L",
            Self::M(_) => "M",
            Self::Null(_) => "NULL",
        }
    }
}

impl Eq for AttributeValue {}

impl std::hash::Hash for AttributeValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Self::S(s) | Self::N(s) => s.hash(state),
            Self::Bool(b) | Self::Null(b) => b.hash(state),
            Self::Ss(v) | Self::Ns(v) => v.hash(state),
            Self::L(v) => v.hash(state),
            Self::M(m) => {
                let mut pairs: Vec<_> = m.iter().collect();
                pairs.sort_by_key(|(k, _)| *k);
                for (k, v) in pairs {
                    k.hash(state);
                    v.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S(s) => write!(f, "{{S: {s}}}"),
            Self::N(n) => write!(f, "{{N: {n}}}"),
            Self::Bool(b) => write!(f, "{{BOOL: {b}}}"),
            Self::Ss(v) => write!(f, "{{SS: {v:?}}}"),
            Self::Ns(v) => write!(f, "{{NS: {v:?}}}"),
            Self::L(v) => write!(f, "{{L: {} items}}", v.len()),
            Self::M(m) => write!(f, "{{M: {} keys}}", m.len()),
            Self::Null(b) => write!(f, "{{NULL: {b}}}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::S(s.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::S(s)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        Self::N(n.to_string())
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::S(s) => map.serialize_entry("S", s)?,
            Self::N(n) => map.serialize_entry("N", n)?,
            Self::Bool(b) => map.serialize_entry("BOOL", b)?,
            Self::Ss(v) => map.serialize_entry("SS", v)?,
            Self::Ns(v) => map.serialize_entry("NS", v)?,
            Self::L(list) => map.serialize_entry("L", list)?,
            Self::M(m) => map.serialize_entry("M", m)?,
            Self::Null(b) => map.serialize_entry("NULL", b)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(AttributeValueVisitor)
    }
}

struct AttributeValueVisitor;

impl<'de> Visitor<'de> for AttributeValueVisitor {
    type Value = AttributeValue;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("an AttributeValue object with exactly one type key")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> Result<Self::Value, M::Error> {
        let Some(key) = map.next_key::<String>()? else {
            return Err(de::Error::custom(
                "AttributeValue must have exactly one key",
            ));
        };

        let value = match key.as_str() {
            "S" => AttributeValue::S(map.next_value()?),
            "N" => AttributeValue::N(map.next_value()?),
            "BOOL" => AttributeValue::Bool(map.next_value()?),
            "SS" => AttributeValue::Ss(map.next_value()?),
            "NS" => AttributeValue::Ns(map.next_value()?),
            "L" => AttributeValue::L(map.next_value()?),
            "M" => AttributeValue::M(map.next_value()?),
            "NULL" => AttributeValue::Null(map.next_value()?),
            other => {
                return Err(de::Error::unknown_field(
                    other,
                    &["S", "N", "BOOL", "SS", "NS", "L", "M", "NULL"],
                ));
            }
        };

        if map.next_key::<String>()?.is_some() {
            return Err(de::Error::custom(
                "AttributeValue must have exactly one key",
            ));
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_serialize_string_value() {
        let val = AttributeValue::S("hello".to_owned());
        let json = serde_json::to_string(&val).unwrap();
        assert_eq!(json, r#"{"S":"hello"}"#);
    }

    #[test]
    fn test_should_serialize_number_as_string() {
        let val = AttributeValue::N("42".to_owned());
        let json = serde_json::to_string(&val).unwrap();
        assert_eq!(json, r#"{"N":"42"}"#);
    }

    #[test]
    fn test_should_serialize_nested_list() {
        let val = AttributeValue::L(vec![
            AttributeValue::S("a".to_owned()),
            AttributeValue::Bool(false),
        ]);
        let json = serde_json::to_string(&val).unwrap();
        assert_eq!(json, r#"{"L":[{"S":"a"},{"BOOL":false}]}"#);
    }

    #[test]
    fn test_should_roundtrip_map_value() {
        let mut m = HashMap::new();
        m.insert("key".to_owned(), AttributeValue::Ns(vec!["1".to_owned()]));
        let val = AttributeValue::M(m);
        let json = serde_json::to_string(&val).unwrap();
        let deserialized: AttributeValue = serde_json::from_str(&json).unwrap();
        assert_eq!(val, deserialized);
    }

    #[test]
    fn test_should_reject_unknown_type_key() {
        let result: Result<AttributeValue, _> = serde_json::from_str(r#"{"B":"AAAA"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_should_reject_two_type_keys() {
        let result: Result<AttributeValue, _> = serde_json::from_str(r#"{"S":"a","N":"1"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_should_detect_nested_empty_values() {
        let mut m = HashMap::new();
        m.insert("inner".to_owned(), AttributeValue::S(String::new()));
        assert!(AttributeValue::M(m).contains_empty_value());
        assert!(AttributeValue::Ss(vec![]).contains_empty_value());
        assert!(!AttributeValue::N("0".to_owned()).contains_empty_value());
    }

    #[test]
    fn test_should_find_invalid_numbers() {
        assert_eq!(AttributeValue::N("abc".to_owned()).first_invalid_number(), Some("abc"));
        assert_eq!(AttributeValue::N("NaN".to_owned()).first_invalid_number(), Some("NaN"));
        assert_eq!(AttributeValue::N("-1.5e3".to_owned()).first_invalid_number(), None);
        let nested = AttributeValue::L(vec![AttributeValue::Ns(vec![
            "1".to_owned(),
            "x1".to_owned(),
        ])]);
        assert_eq!(nested.first_invalid_number(), Some("x1"));
        assert_eq!(AttributeValue::S("abc".to_owned()).first_invalid_number(), None);
    }
}
