//! Table and index key schemas.

use dynamock_model::types::{
    AttributeDefinition, KeySchemaElement, KeyType, ScalarAttributeType,
};

/// A single key attribute definition with its name and scalar type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAttribute {
    /// The attribute name.
    pub name: String,
    /// The scalar type (S or N).
    pub attr_type: ScalarAttributeType,
}

impl KeyAttribute {
    /// A string-typed key attribute.
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attr_type: ScalarAttributeType::S,
        }
    }

    /// A number-typed key attribute.
    pub fn number(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attr_type: ScalarAttributeType::N,
        }
    }
}

/// Partition key plus optional sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    /// Partition (HASH) key name and type.
    pub partition_key: KeyAttribute,
    /// Optional sort (RANGE) key name and type.
    pub sort_key: Option<KeyAttribute>,
}

impl KeySchema {
    /// True when `name` is one of the key attributes.
    #[must_use]
    pub fn is_key_attribute(&self, name: &str) -> bool {
        self.partition_key.name == name || self.sort_key.as_ref().is_some_and(|k| k.name == name)
    }

    /// The key attributes, partition key first.
    pub fn attributes(&self) -> impl Iterator<Item = &KeyAttribute> {
        std::iter::once(&self.partition_key).chain(self.sort_key.as_ref())
    }

    /// Wire `KeySchema` elements.
    #[must_use]
    pub fn elements(&self) -> Vec<KeySchemaElement> {
        let mut out = vec![KeySchemaElement {
            attribute_name: self.partition_key.name.clone(),
            key_type: KeyType::Hash,
        }];
        if let Some(sk) = &self.sort_key {
            out.push(KeySchemaElement {
                attribute_name: sk.name.clone(),
                key_type: KeyType::Range,
            });
        }
        out
    }
}

/// A secondary index. Indexes are not materialized; queries against them
/// re-derive order from the table's own storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    /// Index name.
    pub name: String,
    /// The index key.
    pub key: KeySchema,
}

/// Immutable description of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Primary key.
    pub key: KeySchema,
    /// Secondary indexes.
    pub indexes: Vec<IndexSchema>,
}

impl TableSchema {
    /// A table keyed by `partition_key` alone.
    pub fn new(name: impl Into<String>, partition_key: KeyAttribute) -> Self {
        Self {
            name: name.into(),
            key: KeySchema {
                partition_key,
                sort_key: None,
            },
            indexes: Vec::new(),
        }
    }

    /// Adds a sort key.
    #[must_use]
    pub fn with_sort_key(mut self, sort_key: KeyAttribute) -> Self {
        self.key.sort_key = Some(sort_key);
        self
    }

    /// Adds a local secondary index: same partition key, other sort key.
    #[must_use]
    pub fn with_local_index(mut self, name: impl Into<String>, sort_key: KeyAttribute) -> Self {
        self.indexes.push(IndexSchema {
            name: name.into(),
            key: KeySchema {
                partition_key: self.key.partition_key.clone(),
                sort_key: Some(sort_key),
            },
        });
        self
    }

    /// Adds a global secondary index with its own partition key.
    #[must_use]
    pub fn with_global_index(
        mut self,
        name: impl Into<String>,
        partition_key: KeyAttribute,
        sort_key: Option<KeyAttribute>,
    ) -> Self {
        self.indexes.push(IndexSchema {
            name: name.into(),
            key: KeySchema {
                partition_key,
                sort_key,
            },
        });
        self
    }

    /// The index called `name`.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// An index is global when its partition key differs from the table's.
    #[must_use]
    pub fn is_global(&self, index: &IndexSchema) -> bool {
        index.key.partition_key.name != self.key.partition_key.name
    }

    /// One definition per distinct key attribute across table and indexes.
    #[must_use]
    pub fn attribute_definitions(&self) -> Vec<AttributeDefinition> {
        let mut out: Vec<AttributeDefinition> = Vec::new();
        let all = self
            .key
            .attributes()
            .chain(self.indexes.iter().flat_map(|i| i.key.attributes()));
        for attr in all {
            if !out.iter().any(|d| d.attribute_name == attr.name) {
                out.push(AttributeDefinition {
                    attribute_name: attr.name.clone(),
                    attribute_type: attr.attr_type.clone(),
                });
            }
        }
        out
    }
}
