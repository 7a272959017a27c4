//! Operations the engine dispatches and counts.

use std::fmt;

/// Item-level operations served by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Put (insert or replace) an item.
    PutItem,
    /// Get an item by primary key.
    GetItem,
    /// Delete an item by primary key.
    DeleteItem,
    /// Update an item.
    UpdateItem,
    /// Query items by key condition.
    Query,
    /// Scan all items in a table.
    Scan,
    /// Get items from several tables at once.
    BatchGetItem,
}

impl Operation {
    /// Every operation, in a stable order.
    pub const ALL: [Self; 7] = [
        Self::PutItem,
        Self::GetItem,
        Self::DeleteItem,
        Self::UpdateItem,
        Self::Query,
        Self::Scan,
        Self::BatchGetItem,
    ];

    /// Returns the operation name string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PutItem => "PutItem",
            Self::GetItem => "GetItem",
            Self::DeleteItem => "DeleteItem",
            Self::UpdateItem => "UpdateItem",
            Self::Query => "Query",
            Self::Scan => "Scan",
            Self::BatchGetItem => "BatchGetItem",
        }
    }

    /// Parse an operation name string.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }

    /// Position in [`Operation::ALL`], used to index counter arrays.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_parse_operation_names() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_name(op.as_str()), Some(op));
        }
        assert_eq!(Operation::from_name("BatchWriteItem"), None);
    }

    #[test]
    fn test_should_index_in_declaration_order() {
        assert_eq!(Operation::PutItem.index(), 0);
        assert_eq!(Operation::BatchGetItem.index(), Operation::ALL.len() - 1);
    }
}
