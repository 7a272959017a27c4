//! Partitioned in-memory item storage.
//!
//! ```text
//! DashMap<PartitionKey, BTreeMap<SortableAttributeValue, Arc<Item>>>
//! ```
//!
//! - Writes go through [`TableStorage::write`], which holds the partition's
//!   entry lock while the caller checks the current item and decides what to
//!   store, so conditional writes to one partition are serialized.
//! - Items are immutable once stored. A write replaces the `Arc`, leaving any
//!   previously handed-out item intact.
//! - Tables without a sort key store each item under
//!   [`SortableAttributeValue::Sentinel`].

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use dashmap::DashMap;
use tracing::debug;

use dynamock_model::types::ScalarAttributeType;
use dynamock_model::{AttributeValue, EngineError, Item};

use crate::expression::{compare_numbers, normalize};
use crate::schema::{KeyAttribute, KeySchema};

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// A primary key: partition value and optional sort value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimaryKey {
    /// The partition (HASH) key value.
    pub partition_key: AttributeValue,
    /// The optional sort (RANGE) key value.
    pub sort_key: Option<SortableAttributeValue>,
}

impl PrimaryKey {
    fn sort_slot(&self) -> SortableAttributeValue {
        self.sort_key
            .clone()
            .unwrap_or(SortableAttributeValue::Sentinel)
    }
}

/// A key-eligible value with a total order.
///
/// Strings order by UTF-8 bytes and numbers numerically. `Sentinel` stands in
/// for the missing sort key of hash-only tables.
#[derive(Debug, Clone)]
pub enum SortableAttributeValue {
    /// String key.
    S(String),
    /// Number key (stored as the original string representation).
    N(String),
    /// Sort slot of a hash-only table.
    Sentinel,
}

impl SortableAttributeValue {
    /// Converts back into an [`AttributeValue`]; `None` for `Sentinel`.
    #[must_use]
    pub fn to_attribute_value(&self) -> Option<AttributeValue> {
        match self {
            Self::S(s) => Some(AttributeValue::S(s.clone())),
            Self::N(n) => Some(AttributeValue::N(n.clone())),
            Self::Sentinel => None,
        }
    }

    /// Wraps a key value. Only `S` and `N` are key-eligible.
    #[must_use]
    pub fn from_attribute_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::S(s) => Some(Self::S(s.clone())),
            AttributeValue::N(n) => Some(Self::N(n.clone())),
            _ => None,
        }
    }
}

fn parse_number(s: &str) -> f64 {
    s.trim().parse::<f64>().unwrap_or(f64::NAN)
}

impl PartialEq for SortableAttributeValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortableAttributeValue {}

impl PartialOrd for SortableAttributeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortableAttributeValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::S(a), Self::S(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Self::N(a), Self::N(b)) => compare_numbers(parse_number(a), parse_number(b)),
            (Self::Sentinel, Self::Sentinel) => Ordering::Equal,
            (Self::S(_), _) | (Self::N(_), Self::Sentinel) => Ordering::Less,
            (_, Self::S(_)) | (Self::Sentinel, Self::N(_)) => Ordering::Greater,
        }
    }
}

impl std::hash::Hash for SortableAttributeValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Self::S(s) => s.hash(state),
            Self::N(n) => normalize(parse_number(n)).to_bits().hash(state),
            Self::Sentinel => {}
        }
    }
}

/// Extracts the primary key of `item` according to `key_schema`.
///
/// # Errors
///
/// Returns a validation error when a key attribute is missing, has the
/// wrong type or is an empty string.
pub fn extract_primary_key(key_schema: &KeySchema, item: &Item) -> Result<PrimaryKey, EngineError> {
    let partition_key = key_value(&key_schema.partition_key, item)?;
    let sort_key = key_schema
        .sort_key
        .as_ref()
        .map(|sk| key_value(sk, item).map(|v| SortableAttributeValue::from_attribute_value(&v)))
        .transpose()?
        .flatten();
    Ok(PrimaryKey {
        partition_key,
        sort_key,
    })
}

/// Like [`extract_primary_key`], returning `None` instead of an error.
/// Used for index keys, where items without the attributes are skipped.
#[must_use]
pub fn try_extract_key(key_schema: &KeySchema, item: &Item) -> Option<PrimaryKey> {
    extract_primary_key(key_schema, item).ok()
}

fn key_value(attr: &KeyAttribute, item: &Item) -> Result<AttributeValue, EngineError> {
    let value = item.get(&attr.name).ok_or_else(|| {
        EngineError::validation(format!(
            "One or more parameter values were invalid: Missing the key {} in the item",
            attr.name
        ))
    })?;
    if !matches!(attr.attr_type, ScalarAttributeType::S | ScalarAttributeType::N)
        || !attr.attr_type.matches(value)
    {
        return Err(EngineError::validation(format!(
            "One or more parameter values were invalid: Type mismatch for key {} expected: {} actual: {}",
            attr.name,
            attr.attr_type,
            value.type_descriptor()
        )));
    }
    if value.contains_empty_value() {
        return Err(EngineError::validation(format!(
            "One or more parameter values are not valid. The AttributeValue for a key attribute cannot contain an empty string value. Key: {}",
            attr.name
        )));
    }
    if let Some(n) = value.first_invalid_number() {
        return Err(EngineError::invalid_number(n));
    }
    Ok(value.clone())
}

/// Rejects an item holding a number string that does not parse.
///
/// # Errors
///
/// Returns a validation error naming the first bad number.
pub fn check_numbers(item: &Item) -> Result<(), EngineError> {
    match item.values().find_map(AttributeValue::first_invalid_number) {
        Some(n) => Err(EngineError::invalid_number(n)),
        None => Ok(()),
    }
}

/// The key attributes of `item` as an item of their own.
#[must_use]
pub fn key_item(key_schema: &KeySchema, item: &Item) -> Item {
    key_schema
        .attributes()
        .filter_map(|a| item.get(&a.name).map(|v| (a.name.clone(), v.clone())))
        .collect()
}

// ---------------------------------------------------------------------------
// Sizes
// ---------------------------------------------------------------------------

/// Size of an item in bytes: attribute name lengths plus value sizes.
///
/// - **S**: length of the UTF-8 string
/// - **N**: `(len + 1) / 2 + 1`
/// - **Bool / Null**: 1 byte
/// - **SS / NS**: sum of element sizes
/// - **L**: `3 + sum(1 + element_size)`
/// - **M**: `3 + sum(key_len + 1 + value_size)`
#[must_use]
pub fn calculate_item_size(item: &Item) -> u64 {
    item.iter()
        .map(|(name, value)| name.len() as u64 + calculate_value_size(value))
        .sum()
}

/// Size of a single attribute value.
#[must_use]
pub fn calculate_value_size(value: &AttributeValue) -> u64 {
    match value {
        AttributeValue::S(s) => s.len() as u64,
        AttributeValue::N(n) => (n.len().div_ceil(2) + 1) as u64,
        AttributeValue::Bool(_) | AttributeValue::Null(_) => 1,
        AttributeValue::Ss(v) => v.iter().map(|s| s.len() as u64).sum(),
        AttributeValue::Ns(v) => v.iter().map(|n| (n.len().div_ceil(2) + 1) as u64).sum(),
        AttributeValue::L(list) => 3 + list.iter().map(|e| 1 + calculate_value_size(e)).sum::<u64>(),
        AttributeValue::M(map) => {
            3 + map
                .iter()
                .map(|(k, v)| k.len() as u64 + 1 + calculate_value_size(v))
                .sum::<u64>()
        }
    }
}

/// Serialized length of a primary key, compared against the key byte budget.
#[must_use]
pub fn key_size(key: &PrimaryKey) -> usize {
    let raw = |v: &AttributeValue| match v {
        AttributeValue::S(s) | AttributeValue::N(s) => s.len(),
        other => usize::try_from(calculate_value_size(other)).unwrap_or(usize::MAX),
    };
    raw(&key.partition_key)
        + key
            .sort_key
            .as_ref()
            .and_then(SortableAttributeValue::to_attribute_value)
            .map_or(0, |v| raw(&v))
}

// ---------------------------------------------------------------------------
// TableStorage
// ---------------------------------------------------------------------------

/// What a [`TableStorage::write`] callback wants done with the slot.
#[derive(Debug)]
pub enum Write {
    /// Leave the slot as it is.
    Keep,
    /// Store a new item.
    Store(Arc<Item>),
    /// Remove the stored item.
    Remove,
}

/// Rows of one partition in sort order.
pub type PartitionRows = Vec<(SortableAttributeValue, Arc<Item>)>;

/// In-memory storage for a single table.
#[derive(Debug, Default)]
pub struct TableStorage {
    data: DashMap<AttributeValue, BTreeMap<SortableAttributeValue, Arc<Item>>>,
    item_count: AtomicU64,
    total_size: AtomicU64,
}

impl TableStorage {
    /// Empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.item_count.load(AtomicOrdering::Relaxed)
    }

    /// Total size of stored items in bytes.
    #[must_use]
    pub fn total_size_bytes(&self) -> u64 {
        self.total_size.load(AtomicOrdering::Relaxed)
    }

    /// The item stored under `key`.
    #[must_use]
    pub fn get(&self, key: &PrimaryKey) -> Option<Arc<Item>> {
        self.data
            .get(&key.partition_key)
            .and_then(|partition| partition.get(&key.sort_slot()).cloned())
    }

    /// Runs `decide` on the item stored under `key` while holding the
    /// partition lock and applies the [`Write`] it returns.
    ///
    /// # Errors
    ///
    /// Propagates the error from `decide`; storage is then left untouched.
    pub fn write<T>(
        &self,
        key: &PrimaryKey,
        decide: impl FnOnce(Option<&Arc<Item>>) -> Result<(Write, T), EngineError>,
    ) -> Result<T, EngineError> {
        let slot = key.sort_slot();
        let result = {
            let mut partition = self.data.entry(key.partition_key.clone()).or_default();
            decide(partition.get(&slot)).map(|(write, out)| {
                match write {
                    Write::Keep => {}
                    Write::Store(item) => {
                        let new_size = calculate_item_size(&item);
                        self.total_size.fetch_add(new_size, AtomicOrdering::Relaxed);
                        if let Some(old) = partition.insert(slot, item) {
                            let old_size = calculate_item_size(&old);
                            self.total_size.fetch_sub(old_size, AtomicOrdering::Relaxed);
                            debug!(old_size, new_size, "replaced existing item");
                        } else {
                            self.item_count.fetch_add(1, AtomicOrdering::Relaxed);
                            debug!(new_size, "inserted new item");
                        }
                    }
                    Write::Remove => {
                        if let Some(old) = partition.remove(&slot) {
                            let size = calculate_item_size(&old);
                            self.item_count.fetch_sub(1, AtomicOrdering::Relaxed);
                            self.total_size.fetch_sub(size, AtomicOrdering::Relaxed);
                            debug!(size, "deleted item");
                        }
                    }
                }
                out
            })
        };
        self.data
            .remove_if(&key.partition_key, |_, partition| partition.is_empty());
        result
    }

    /// Rows of the partition `partition_key`, in ascending sort order.
    #[must_use]
    pub fn partition(&self, partition_key: &AttributeValue) -> PartitionRows {
        self.data.get(partition_key).map_or_else(Vec::new, |p| {
            p.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
        })
    }

    /// Every row, ordered by partition key then sort key.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(AttributeValue, PartitionRows)> {
        let mut partitions: Vec<(AttributeValue, PartitionRows)> = self
            .data
            .iter()
            .map(|entry| {
                let rows = entry
                    .value()
                    .iter()
                    .map(|(k, v)| (k.clone(), Arc::clone(v)))
                    .collect();
                (entry.key().clone(), rows)
            })
            .collect();
        partitions.sort_by(|a, b| {
            SortableAttributeValue::from_attribute_value(&a.0)
                .cmp(&SortableAttributeValue::from_attribute_value(&b.0))
        });
        partitions
    }

    /// Drops every item.
    pub fn clear(&self) {
        self.data.clear();
        self.item_count.store(0, AtomicOrdering::Relaxed);
        self.total_size.store(0, AtomicOrdering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use dynamock_model::ErrorCode;

    use super::*;

    fn composite_key_schema() -> KeySchema {
        KeySchema {
            partition_key: KeyAttribute::string("pk"),
            sort_key: Some(KeyAttribute::string("sk")),
        }
    }

    fn make_item(pairs: &[(&str, AttributeValue)]) -> Item {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    fn store(storage: &TableStorage, item: Item) {
        let key = extract_primary_key(&composite_key_schema(), &item).unwrap();
        storage
            .write(&key, |_| Ok((Write::Store(Arc::new(item)), ())))
            .unwrap();
    }

    #[test]
    fn test_should_store_get_and_remove() {
        let storage = TableStorage::new();
        let item = make_item(&[("pk", "a".into()), ("sk", "1".into()), ("v", 1_i64.into())]);
        store(&storage, item.clone());
        let key = extract_primary_key(&composite_key_schema(), &item).unwrap();
        assert_eq!(storage.get(&key).as_deref(), Some(&item));
        assert_eq!(storage.item_count(), 1);

        storage.write(&key, |_| Ok((Write::Remove, ()))).unwrap();
        assert!(storage.get(&key).is_none());
        assert_eq!(storage.item_count(), 0);
        assert_eq!(storage.total_size_bytes(), 0);
        assert!(storage.snapshot().is_empty());
    }

    #[test]
    fn test_should_leave_storage_untouched_on_error() {
        let storage = TableStorage::new();
        let item = make_item(&[("pk", "a".into()), ("sk", "1".into())]);
        let key = extract_primary_key(&composite_key_schema(), &item).unwrap();
        let result: Result<(), _> =
            storage.write(&key, |_| Err(EngineError::conditional_check_failed()));
        assert!(result.is_err());
        assert_eq!(storage.item_count(), 0);
        assert!(storage.snapshot().is_empty());
    }

    #[test]
    fn test_should_keep_old_arc_valid_after_replace() {
        let storage = TableStorage::new();
        let first = make_item(&[("pk", "a".into()), ("sk", "1".into()), ("v", 1_i64.into())]);
        store(&storage, first.clone());
        let key = extract_primary_key(&composite_key_schema(), &first).unwrap();
        let held = storage.get(&key).unwrap();

        let second = make_item(&[("pk", "a".into()), ("sk", "1".into()), ("v", 2_i64.into())]);
        store(&storage, second);
        assert_eq!(held["v"], AttributeValue::from(1_i64));
        assert_eq!(storage.get(&key).unwrap()["v"], AttributeValue::from(2_i64));
        assert_eq!(storage.item_count(), 1);
    }

    #[test]
    fn test_should_order_snapshot_by_partition_then_sort() {
        let storage = TableStorage::new();
        for (pk, sk) in [("b", "2"), ("a", "9"), ("b", "1"), ("a", "10")] {
            store(&storage, make_item(&[("pk", pk.into()), ("sk", sk.into())]));
        }
        let order: Vec<(String, String)> = storage
            .snapshot()
            .into_iter()
            .flat_map(|(pk, rows)| {
                rows.into_iter()
                    .map(move |(_, item)| (pk.as_s().unwrap().to_owned(), item["sk"].as_s().unwrap().to_owned()))
            })
            .collect();
        let expected: Vec<(String, String)> = [("a", "10"), ("a", "9"), ("b", "1"), ("b", "2")]
            .iter()
            .map(|(a, b)| ((*a).to_owned(), (*b).to_owned()))
            .collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn test_should_error_on_missing_key() {
        let item = make_item(&[("pk", "a".into())]);
        let err = extract_primary_key(&composite_key_schema(), &item).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationException);
        assert!(err.message.contains("Missing the key sk"));
    }

    #[test]
    fn test_should_error_on_invalid_key_type() {
        let item = make_item(&[("pk", 1_i64.into()), ("sk", "x".into())]);
        let err = extract_primary_key(&composite_key_schema(), &item).unwrap_err();
        assert!(err.message.contains("Type mismatch for key pk"));
    }

    #[test]
    fn test_should_error_on_empty_string_key() {
        let item = make_item(&[("pk", "".into()), ("sk", "x".into())]);
        assert!(extract_primary_key(&composite_key_schema(), &item).is_err());
    }

    #[test]
    fn test_should_sort_numbers_numerically() {
        let a = SortableAttributeValue::N("9".to_owned());
        let b = SortableAttributeValue::N("10".to_owned());
        assert!(a < b);
        assert_eq!(
            SortableAttributeValue::N("1.0".to_owned()),
            SortableAttributeValue::N("1".to_owned())
        );
    }

    #[test]
    fn test_should_sort_strings_by_bytes() {
        let a = SortableAttributeValue::S("B".to_owned());
        let b = SortableAttributeValue::S("a".to_owned());
        assert!(a < b);
    }

    #[test]
    fn test_should_calculate_item_size() {
        let item = make_item(&[("pk", "abc".into()), ("n", 12345_i64.into())]);
        // "pk" (2) + "abc" (3) + "n" (1) + number (5 digits -> 3 + 1 = 4)
        assert_eq!(calculate_item_size(&item), 10);
    }

    #[test]
    fn test_should_measure_key_size() {
        let item = make_item(&[("pk", "abcd".into()), ("sk", "xy".into())]);
        let key = extract_primary_key(&composite_key_schema(), &item).unwrap();
        assert_eq!(key_size(&key), 6);
    }
}
