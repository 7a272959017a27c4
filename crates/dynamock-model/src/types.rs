//! Shared wire types.
//!
//! Structs use `#[serde(rename_all = "PascalCase")]` to match the service's
//! JSON bodies. Enum variants use idiomatic Rust names with `#[serde(rename)]`
//! mapping to the `SCREAMING_SNAKE_CASE` wire strings.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::attribute_value::AttributeValue;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Key type within a key schema element.
///
/// `Hash` denotes the partition key; `Range` denotes the sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// Partition key.
    #[serde(rename = "HASH")]
    Hash,
    /// Sort key.
    #[serde(rename = "RANGE")]
    Range,
}

impl KeyType {
    /// Returns the wire-format string representation of this key type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hash => "HASH",
            Self::Range => "RANGE",
        }
    }
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar attribute types allowed for key attributes.
///
/// The wire protocol may carry other strings, which are kept as `Unknown` so
/// they can be rejected with a validation error instead of a parse error.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarAttributeType {
    /// String type.
    S,
    /// Number type.
    N,
    /// An unknown attribute type received from the caller.
    Unknown(String),
}

impl ScalarAttributeType {
    /// Returns the wire-format string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::S => "S",
            Self::N => "N",
            Self::Unknown(s) => s.as_str(),
        }
    }

    /// Returns `true` if `value` has this scalar type.
    #[must_use]
    pub fn matches(&self, value: &AttributeValue) -> bool {
        matches!(
            (self, value),
            (Self::S, AttributeValue::S(_)) | (Self::N, AttributeValue::N(_))
        )
    }
}

impl Serialize for ScalarAttributeType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ScalarAttributeType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "S" => Ok(Self::S),
            "N" => Ok(Self::N),
            _ => Ok(Self::Unknown(s)),
        }
    }
}

impl std::fmt::Display for ScalarAttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current status of a table. The in-memory engine only ever reports `Active`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TableStatus {
    /// The table is ready for use.
    #[default]
    #[serde(rename = "ACTIVE")]
    Active,
}

/// Attributes to retrieve in a `Query` or `Scan` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Select {
    /// All attributes of the item.
    #[default]
    #[serde(rename = "ALL_ATTRIBUTES")]
    AllAttributes,
    /// All projected attributes (for index queries).
    #[serde(rename = "ALL_PROJECTED_ATTRIBUTES")]
    AllProjectedAttributes,
    /// Only the attributes named by the projection.
    #[serde(rename = "SPECIFIC_ATTRIBUTES")]
    SpecificAttributes,
    /// Only the count of matching items.
    #[serde(rename = "COUNT")]
    Count,
}

impl Select {
    /// Returns the wire-format string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllAttributes => "ALL_ATTRIBUTES",
            Self::AllProjectedAttributes => "ALL_PROJECTED_ATTRIBUTES",
            Self::SpecificAttributes => "SPECIFIC_ATTRIBUTES",
            Self::Count => "COUNT",
        }
    }
}

impl std::fmt::Display for Select {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Determines what values are returned by write operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReturnValue {
    /// Nothing is returned.
    #[default]
    #[serde(rename = "NONE")]
    None,
    /// All attributes of the item as they appeared before the operation.
    #[serde(rename = "ALL_OLD")]
    AllOld,
    /// Only the updated attributes as they appeared before the operation.
    #[serde(rename = "UPDATED_OLD")]
    UpdatedOld,
    /// All attributes of the item as they appear after the operation.
    #[serde(rename = "ALL_NEW")]
    AllNew,
    /// Only the updated attributes as they appear after the operation.
    #[serde(rename = "UPDATED_NEW")]
    UpdatedNew,
}

impl ReturnValue {
    /// Returns the wire-format string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::AllOld => "ALL_OLD",
            Self::UpdatedOld => "UPDATED_OLD",
            Self::AllNew => "ALL_NEW",
            Self::UpdatedNew => "UPDATED_NEW",
        }
    }
}

impl std::fmt::Display for ReturnValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator for the legacy `Condition` parameters.
///
/// Used with `ScanFilter`, `QueryFilter`, `KeyConditions` and `Expected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOperator {
    /// Equal to.
    #[serde(rename = "EQ")]
    Eq,
    /// Not equal to.
    #[serde(rename = "NE")]
    Ne,
    /// Less than or equal to.
    #[serde(rename = "LE")]
    Le,
    /// Less than.
    #[serde(rename = "LT")]
    Lt,
    /// Greater than or equal to.
    #[serde(rename = "GE")]
    Ge,
    /// Greater than.
    #[serde(rename = "GT")]
    Gt,
    /// Attribute exists.
    #[serde(rename = "NOT_NULL")]
    NotNull,
    /// Attribute does not exist.
    #[serde(rename = "NULL")]
    Null,
    /// Attribute value contains the operand.
    #[serde(rename = "CONTAINS")]
    Contains,
    /// Attribute value does not contain the operand.
    #[serde(rename = "NOT_CONTAINS")]
    NotContains,
    /// Attribute value begins with the operand.
    #[serde(rename = "BEGINS_WITH")]
    BeginsWith,
    /// Attribute value is a member of the operand list.
    #[serde(rename = "IN")]
    In,
    /// Attribute value is between two operands (inclusive).
    #[serde(rename = "BETWEEN")]
    Between,
}

impl ComparisonOperator {
    /// Returns the wire-format string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Le => "LE",
            Self::Lt => "LT",
            Self::Ge => "GE",
            Self::Gt => "GT",
            Self::NotNull => "NOT_NULL",
            Self::Null => "NULL",
            Self::Contains => "CONTAINS",
            Self::NotContains => "NOT_CONTAINS",
            Self::BeginsWith => "BEGINS_WITH",
            Self::In => "IN",
            Self::Between => "BETWEEN",
        }
    }
}

impl std::fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action for the legacy `AttributeUpdates` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AttributeAction {
    /// Set the attribute value.
    #[default]
    #[serde(rename = "PUT")]
    Put,
    /// Delete the attribute, or remove elements from a set.
    #[serde(rename = "DELETE")]
    Delete,
    /// Add to a number or set attribute.
    #[serde(rename = "ADD")]
    Add,
}

impl AttributeAction {
    /// Returns the wire-format string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Add => "ADD",
        }
    }
}

impl std::fmt::Display for AttributeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Structs - Key Schema & Attributes
// ---------------------------------------------------------------------------

/// An element of the key schema for a table or index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeySchemaElement {
    /// The name of the key attribute.
    pub attribute_name: String,
    /// The role of the attribute in the key schema.
    pub key_type: KeyType,
}

/// An attribute definition: name and scalar type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttributeDefinition {
    /// The name of the attribute.
    pub attribute_name: String,
    /// The scalar data type of the attribute.
    pub attribute_type: ScalarAttributeType,
}

// ---------------------------------------------------------------------------
// Structs - Table Description
// ---------------------------------------------------------------------------

/// Secondary index entry of a table description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecondaryIndexDescription {
    /// The name of the index.
    pub index_name: String,
    /// The key schema for this index.
    pub key_schema: Vec<KeySchemaElement>,
    /// The number of items carrying the index keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_count: Option<i64>,
}

/// Description of a table, as returned by `DescribeTable`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableDescription {
    /// The name of the table.
    pub table_name: String,
    /// The current status of the table.
    pub table_status: TableStatus,
    /// The key schema for the table.
    pub key_schema: Vec<KeySchemaElement>,
    /// The attribute definitions for table and index keys.
    pub attribute_definitions: Vec<AttributeDefinition>,
    /// The date and time (epoch seconds) when the table was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date_time: Option<f64>,
    /// The number of items in the table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_count: Option<i64>,
    /// The total size of the table in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_size_bytes: Option<i64>,
    /// A unique identifier for the table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,
    /// The global secondary indexes on the table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_secondary_indexes: Vec<SecondaryIndexDescription>,
    /// The local secondary indexes on the table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local_secondary_indexes: Vec<SecondaryIndexDescription>,
}

// ---------------------------------------------------------------------------
// Structs - Consumed Capacity
// ---------------------------------------------------------------------------

/// Capacity consumed by an operation on one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConsumedCapacity {
    /// The name of the table that was affected.
    pub table_name: String,
    /// The total capacity units consumed by the operation.
    pub capacity_units: f64,
}

// ---------------------------------------------------------------------------
// Structs - Legacy parameters
// ---------------------------------------------------------------------------

/// A condition for the legacy filtering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Condition {
    /// The comparison operator.
    pub comparison_operator: ComparisonOperator,
    /// The attribute values to compare against.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attribute_value_list: Vec<AttributeValue>,
}

/// An attribute value update for the legacy `AttributeUpdates` parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttributeValueUpdate {
    /// The new value for the attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<AttributeValue>,
    /// The action to perform on the attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<AttributeAction>,
}

/// Expected attribute value for the legacy `Expected` parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExpectedAttributeValue {
    /// The value to compare against (simple form).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<AttributeValue>,
    /// Whether the attribute must exist (`true`) or not exist (`false`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    /// The comparison operator (extended form).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison_operator: Option<ComparisonOperator>,
    /// The attribute values to compare against (extended form).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attribute_value_list: Vec<AttributeValue>,
}

// ---------------------------------------------------------------------------
// Structs - Batch Operations
// ---------------------------------------------------------------------------

/// The keys and optional projection requested from a single table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeysAndAttributes {
    /// The primary keys of the items to retrieve.
    pub keys: Vec<HashMap<String, AttributeValue>>,
    /// Attribute names to retrieve. Empty means all attributes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes_to_get: Vec<String>,
    /// Projection expression naming the attributes to retrieve.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection_expression: Option<String>,
    /// Substitutions for `#name` tokens in the projection expression.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_names: HashMap<String, String>,
    /// Whether to use a consistent read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistent_read: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_serialize_key_schema_element() {
        let elem = KeySchemaElement {
            attribute_name: "userId".to_owned(),
            key_type: KeyType::Hash,
        };
        let json = serde_json::to_string(&elem).unwrap();
        assert_eq!(json, r#"{"AttributeName":"userId","KeyType":"HASH"}"#);
    }

    #[test]
    fn test_should_keep_unknown_scalar_type() {
        let t: ScalarAttributeType = serde_json::from_str(r#""B""#).unwrap();
        assert_eq!(t, ScalarAttributeType::Unknown("B".to_owned()));
        assert!(!t.matches(&AttributeValue::S("x".to_owned())));
    }

    #[test]
    fn test_should_deserialize_legacy_condition() {
        let json = r#"{"ComparisonOperator":"BETWEEN","AttributeValueList":[{"N":"1"},{"N":"9"}]}"#;
        let cond: Condition = serde_json::from_str(json).unwrap();
        assert_eq!(cond.comparison_operator, ComparisonOperator::Between);
        assert_eq!(cond.attribute_value_list.len(), 2);
    }

    #[test]
    fn test_should_omit_empty_fields_in_table_description() {
        let desc = TableDescription {
            table_name: "user".to_owned(),
            ..TableDescription::default()
        };
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json["TableStatus"], "ACTIVE");
        assert!(json.get("GlobalSecondaryIndexes").is_none());
        assert!(json.get("ItemCount").is_none());
    }
}
