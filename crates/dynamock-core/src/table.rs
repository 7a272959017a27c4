//! A single in-memory table.
//!
//! Secondary indexes are not materialized. A local index query walks the
//! partition of the table and re-sorts it by the index sort key; a global
//! index query walks the whole table.

use std::sync::Arc;

use anyhow::Context;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use dynamock_model::native::{item_from_native, item_to_native};
use dynamock_model::output::{
    DeleteItemOutput, GetItemOutput, PutItemOutput, QueryOutput, ScanOutput, UpdateItemOutput,
};
use dynamock_model::types::{
    ConsumedCapacity, ReturnValue, ScalarAttributeType, SecondaryIndexDescription, Select,
    TableDescription, TableStatus,
};
use dynamock_model::{AttributeValue, EngineError, Item};

use crate::config::EngineConfig;
use crate::expression::{Expression, Operator};
use crate::request::{
    DeleteItemRequest, GetItemRequest, PutItemRequest, QueryRequest, ScanRequest,
    UpdateItemRequest,
};
use crate::schema::{IndexSchema, KeyAttribute, KeySchema, TableSchema};
use crate::storage::{
    PrimaryKey, SortableAttributeValue, TableStorage, Write, calculate_item_size, check_numbers,
    extract_primary_key, key_item, key_size, try_extract_key,
};
use crate::update::UpdateDirective;

const READ_UNIT_BYTES: u64 = 4096;
const WRITE_UNIT_BYTES: u64 = 1024;

/// Sort position of a row within one query or scan.
type Cursor = Vec<SortableAttributeValue>;

/// A table: schema, configuration and item storage.
#[derive(Debug)]
pub struct TableEngine {
    schema: TableSchema,
    config: EngineConfig,
    storage: TableStorage,
    created_at: chrono::DateTime<chrono::Utc>,
    table_id: String,
}

/// Which key a query walks.
#[derive(Debug, Clone, Copy)]
enum Access<'a> {
    Primary,
    Local(&'a IndexSchema),
    Global(&'a IndexSchema),
}

impl<'a> Access<'a> {
    fn index(self) -> Option<&'a IndexSchema> {
        match self {
            Self::Primary => None,
            Self::Local(index) | Self::Global(index) => Some(index),
        }
    }
}

/// Rows of one page, before the filter runs.
#[derive(Debug)]
struct Page {
    rows: Vec<Arc<Item>>,
    last_evaluated_key: Option<Item>,
}

/// A page after filtering and projection.
#[derive(Debug)]
struct PageResult {
    items: Vec<Item>,
    count: i32,
    scanned_count: i32,
    last_evaluated_key: Item,
    consumed_capacity: ConsumedCapacity,
}

impl TableEngine {
    /// An empty table.
    #[must_use]
    pub fn new(schema: TableSchema, config: EngineConfig) -> Self {
        Self {
            schema,
            config,
            storage: TableStorage::new(),
            created_at: chrono::Utc::now(),
            table_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Key schema and indexes.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Number of stored items.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.storage.item_count()
    }

    /// Drops every item.
    pub fn clear(&self) {
        self.storage.clear();
    }

    // -----------------------------------------------------------------------
    // Item operations
    // -----------------------------------------------------------------------

    /// Reads one item.
    ///
    /// # Errors
    ///
    /// Returns a validation error when `key` does not match the key schema.
    pub fn get_item(&self, request: &GetItemRequest) -> Result<GetItemOutput, EngineError> {
        let key = self.resolve_key(&request.key)?;
        let item = self.storage.get(&key);
        debug!(table = %self.schema.name, found = item.is_some(), "get item");
        let size = item.as_deref().map_or(0, calculate_item_size);
        Ok(GetItemOutput {
            item: item.map(|i| project(&i, &request.projection)),
            consumed_capacity: Some(self.capacity(size, READ_UNIT_BYTES)),
        })
    }

    /// Stores an item, replacing any item with the same key.
    ///
    /// # Errors
    ///
    /// - validation error for a malformed item or key
    /// - `ConditionalCheckFailedException` when the condition does not hold;
    ///   storage is left untouched
    pub fn put_item(&self, request: &PutItemRequest) -> Result<PutItemOutput, EngineError> {
        check_old_only(request.return_values)?;
        let key = extract_primary_key(&self.schema.key, &request.item)?;
        self.check_key_size(&key)?;
        if request.item.values().any(AttributeValue::contains_empty_value) {
            return Err(EngineError::empty_value());
        }
        check_numbers(&request.item)?;
        if let Some(condition) = &request.condition {
            condition.validate()?;
        }

        let item = Arc::new(request.item.clone());
        let previous = self.storage.write(&key, |current| {
            check_condition(request.condition.as_ref(), current)?;
            Ok((Write::Store(Arc::clone(&item)), current.cloned()))
        })?;
        debug!(table = %self.schema.name, replaced = previous.is_some(), "put item");

        let size = calculate_item_size(&item).max(previous.as_deref().map_or(0, calculate_item_size));
        Ok(PutItemOutput {
            attributes: old_attributes(request.return_values, previous.as_deref()),
            consumed_capacity: Some(self.capacity(size, WRITE_UNIT_BYTES)),
        })
    }

    /// Deletes an item. Deleting a missing item is a no-op.
    ///
    /// # Errors
    ///
    /// - validation error for a malformed key
    /// - `ConditionalCheckFailedException` when the condition does not hold
    pub fn delete_item(&self, request: &DeleteItemRequest) -> Result<DeleteItemOutput, EngineError> {
        check_old_only(request.return_values)?;
        let key = self.resolve_key(&request.key)?;
        if let Some(condition) = &request.condition {
            condition.validate()?;
        }

        let previous = self.storage.write(&key, |current| {
            check_condition(request.condition.as_ref(), current)?;
            let write = if current.is_some() {
                Write::Remove
            } else {
                Write::Keep
            };
            Ok((write, current.cloned()))
        })?;
        debug!(table = %self.schema.name, deleted = previous.is_some(), "delete item");

        let size = previous.as_deref().map_or(0, calculate_item_size);
        Ok(DeleteItemOutput {
            attributes: old_attributes(request.return_values, previous.as_deref()),
            consumed_capacity: Some(self.capacity(size, WRITE_UNIT_BYTES)),
        })
    }

    /// Applies update directives to an item.
    ///
    /// A missing item is created from its key unless neither `upsert` nor
    /// the implicit upsert setting allows it. When the directives only
    /// delete, a missing item stays missing.
    ///
    /// # Errors
    ///
    /// - validation error for a malformed key or an update of a key attribute
    /// - `ConditionalCheckFailedException` when the condition does not hold,
    ///   or the item is missing and creating it is not allowed
    /// - `InvalidUpdate` / `TypeMismatch` when a directive does not fit
    pub fn update_item(&self, request: &UpdateItemRequest) -> Result<UpdateItemOutput, EngineError> {
        let key = self.resolve_key(&request.key)?;
        if let Some(name) = request
            .updates
            .attribute_names()
            .find(|name| self.schema.key.is_key_attribute(name))
        {
            return Err(EngineError::validation(format!(
                "One or more parameter values were invalid: Cannot update attribute {name}. This attribute is part of the key"
            )));
        }
        if let Some(condition) = &request.condition {
            condition.validate()?;
        } else if !request.upsert {
            warn!(
                table = %self.schema.name,
                "update issued without a condition or an upsert flag"
            );
        }

        let only_deletes = !request.updates.is_empty()
            && request
                .updates
                .iter()
                .all(|(_, d)| matches!(d, UpdateDirective::Delete(_)));

        let (previous, next) = self.storage.write(&key, |current| {
            check_condition(request.condition.as_ref(), current)?;
            let base = match current {
                Some(item) => Arc::clone(item),
                None if !request.upsert && !self.config.allow_implicit_upsert => {
                    return Err(EngineError::conditional_check_failed());
                }
                None if only_deletes => return Ok((Write::Keep, (None, None))),
                None => Arc::new(request.key.clone()),
            };
            let next = Arc::new(request.updates.apply(&base)?);
            Ok((
                Write::Store(Arc::clone(&next)),
                (current.cloned(), Some(next)),
            ))
        })?;
        debug!(
            table = %self.schema.name,
            created = previous.is_none() && next.is_some(),
            "update item"
        );

        let size = next
            .as_deref()
            .map_or(0, calculate_item_size)
            .max(previous.as_deref().map_or(0, calculate_item_size));
        let attributes = match request.return_values {
            ReturnValue::None => Item::new(),
            ReturnValue::AllOld => previous.as_deref().cloned().unwrap_or_default(),
            ReturnValue::AllNew => next.as_deref().cloned().unwrap_or_default(),
            ReturnValue::UpdatedOld => previous
                .as_deref()
                .map(|item| pick(item, request.updates.attribute_names()))
                .unwrap_or_default(),
            ReturnValue::UpdatedNew => next
                .as_deref()
                .map(|item| pick(item, request.updates.attribute_names()))
                .unwrap_or_default(),
        };
        Ok(UpdateItemOutput {
            attributes,
            consumed_capacity: Some(self.capacity(size, WRITE_UNIT_BYTES)),
        })
    }

    // -----------------------------------------------------------------------
    // Query & scan
    // -----------------------------------------------------------------------

    /// Reads the rows of one partition, of the table or of an index.
    ///
    /// The key condition selects the candidate rows. `limit` (capped by the
    /// configured page size) counts candidate rows, and the filter runs on
    /// the page afterwards, so a page can hold fewer matches than `limit`
    /// and still carry a `LastEvaluatedKey`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown index, a key condition
    /// that does not fit the key schema, a filter on a key attribute or a
    /// malformed `ExclusiveStartKey`.
    pub fn query(&self, request: &QueryRequest) -> Result<QueryOutput, EngineError> {
        let access = match request.index_name.as_deref() {
            None => Access::Primary,
            Some(name) => {
                let index = self.schema.index(name).ok_or_else(|| {
                    EngineError::validation(format!(
                        "The table does not have the specified index: {name}"
                    ))
                })?;
                if self.schema.is_global(index) {
                    Access::Global(index)
                } else {
                    Access::Local(index)
                }
            }
        };
        let key_schema = access.index().map_or(&self.schema.key, |i| &i.key);

        request.key_condition.validate()?;
        let (partition, sort_condition) = split_key_condition(&request.key_condition, key_schema)?;
        if let Some(filter) = &request.filter {
            filter.validate()?;
            if let Some(name) = filter
                .attribute_names()
                .into_iter()
                .find(|name| key_schema.is_key_attribute(name))
            {
                return Err(EngineError::validation(format!(
                    "Filter Expression can not contain key attribute {name}"
                )));
            }
        }

        let candidates: Vec<Arc<Item>> = match access {
            Access::Primary => self
                .storage
                .partition(partition)
                .into_iter()
                .map(|(_, item)| item)
                .collect(),
            Access::Local(index) => self
                .storage
                .partition(partition)
                .into_iter()
                .map(|(_, item)| item)
                .filter(|item| try_extract_key(&index.key, item).is_some())
                .collect(),
            Access::Global(index) => {
                let wanted = SortableAttributeValue::from_attribute_value(partition);
                self.storage
                    .snapshot()
                    .into_iter()
                    .flat_map(|(_, rows)| rows.into_iter().map(|(_, item)| item))
                    .filter(|item| try_extract_key(&index.key, item).is_some())
                    .filter(|item| {
                        item.get(&index.key.partition_key.name)
                            .and_then(SortableAttributeValue::from_attribute_value)
                            == wanted
                    })
                    .collect()
            }
        };

        let mut rows = Vec::with_capacity(candidates.len());
        for item in candidates {
            if let Some(sort) = sort_condition {
                if !sort.evaluate(&item)? {
                    continue;
                }
            }
            rows.push((self.cursor(&item, access), item));
        }

        let start = request
            .exclusive_start_key
            .as_ref()
            .map(|esk| self.start_cursor(esk, access))
            .transpose()?;
        let page = self.paginate(rows, request.scan_forward, start, request.limit, access);
        debug!(
            table = %self.schema.name,
            index = request.index_name.as_deref().unwrap_or("primary"),
            scanned = page.rows.len(),
            more = page.last_evaluated_key.is_some(),
            "query page"
        );

        let result = self.finish_page(page, request.filter.as_ref(), &request.projection, request.select)?;
        Ok(QueryOutput {
            items: result.items,
            count: result.count,
            scanned_count: result.scanned_count,
            last_evaluated_key: result.last_evaluated_key,
            consumed_capacity: Some(result.consumed_capacity),
        })
    }

    /// Reads the whole table ordered by partition key then sort key.
    ///
    /// With a segment `(s, n)` only partitions whose position in that order
    /// is congruent to `s` modulo `n` are read.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed segment, filter or
    /// `ExclusiveStartKey`.
    pub fn scan(&self, request: &ScanRequest) -> Result<ScanOutput, EngineError> {
        if let Some((segment, total)) = request.segment {
            if total == 0 || segment >= total {
                return Err(EngineError::validation(
                    "The Segment parameter must be between 0 and TotalSegments - 1",
                ));
            }
        }
        if let Some(filter) = &request.filter {
            filter.validate()?;
        }

        let rows: Vec<(Cursor, Arc<Item>)> = self
            .storage
            .snapshot()
            .into_iter()
            .enumerate()
            .filter(|(ordinal, _)| request.segment.is_none_or(|(s, n)| ordinal % n == s))
            .flat_map(|(_, (_, rows))| rows.into_iter().map(|(_, item)| item))
            .map(|item| (self.cursor(&item, Access::Primary), item))
            .collect();

        let start = request
            .exclusive_start_key
            .as_ref()
            .map(|esk| {
                extract_primary_key(&self.schema.key, esk)?;
                Ok::<_, EngineError>(self.cursor(esk, Access::Primary))
            })
            .transpose()?;
        let page = self.paginate(rows, true, start, request.limit, Access::Primary);
        debug!(
            table = %self.schema.name,
            segment = ?request.segment,
            scanned = page.rows.len(),
            more = page.last_evaluated_key.is_some(),
            "scan page"
        );

        let result = self.finish_page(page, request.filter.as_ref(), &request.projection, request.select)?;
        Ok(ScanOutput {
            items: result.items,
            count: result.count,
            scanned_count: result.scanned_count,
            last_evaluated_key: result.last_evaluated_key,
            consumed_capacity: Some(result.consumed_capacity),
        })
    }

    fn cursor(&self, item: &Item, access: Access<'_>) -> Cursor {
        let table_sort = sortable(item, self.schema.key.sort_key.as_ref());
        match access {
            Access::Primary => {
                vec![sortable(item, Some(&self.schema.key.partition_key)), table_sort]
            }
            Access::Local(index) => vec![sortable(item, index.key.sort_key.as_ref()), table_sort],
            Access::Global(index) => vec![
                sortable(item, index.key.sort_key.as_ref()),
                sortable(item, Some(&self.schema.key.partition_key)),
                table_sort,
            ],
        }
    }

    fn start_cursor(&self, esk: &Item, access: Access<'_>) -> Result<Cursor, EngineError> {
        extract_primary_key(&self.schema.key, esk)?;
        if let Some(index) = access.index() {
            extract_primary_key(&index.key, esk)?;
        }
        Ok(self.cursor(esk, access))
    }

    /// Sorts `rows`, skips everything up to `start` and cuts one page.
    fn paginate(
        &self,
        mut rows: Vec<(Cursor, Arc<Item>)>,
        forward: bool,
        start: Option<Cursor>,
        limit: Option<usize>,
        access: Access<'_>,
    ) -> Page {
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        if !forward {
            rows.reverse();
        }
        if let Some(start) = start {
            rows.retain(|(cursor, _)| if forward { *cursor > start } else { *cursor < start });
        }

        let effective = limit.map_or(self.config.page_limit(), |l| {
            l.min(self.config.page_limit())
        });
        let more = rows.len() > effective;
        rows.truncate(effective);
        let last_evaluated_key = if more {
            rows.last().map(|(_, item)| {
                let mut key = key_item(&self.schema.key, item);
                if let Some(index) = access.index() {
                    key.extend(key_item(&index.key, item));
                }
                key
            })
        } else {
            None
        };
        Page {
            rows: rows.into_iter().map(|(_, item)| item).collect(),
            last_evaluated_key,
        }
    }

    fn finish_page(
        &self,
        page: Page,
        filter: Option<&Expression>,
        projection: &[String],
        select: Select,
    ) -> Result<PageResult, EngineError> {
        let scanned_count = page.rows.len();
        let bytes: u64 = page.rows.iter().map(|item| calculate_item_size(item)).sum();

        let mut matched = Vec::with_capacity(page.rows.len());
        for item in &page.rows {
            let keep = match filter {
                Some(filter) => filter.evaluate(item)?,
                None => true,
            };
            if keep {
                matched.push(item);
            }
        }
        let count = matched.len();

        let (items, consumed_capacity) = if select == Select::Count {
            (Vec::new(), self.capacity(0, READ_UNIT_BYTES))
        } else {
            (
                matched.into_iter().map(|item| project(item, projection)).collect(),
                self.capacity(bytes, READ_UNIT_BYTES),
            )
        };
        Ok(PageResult {
            items,
            count: i32::try_from(count).unwrap_or(i32::MAX),
            scanned_count: i32::try_from(scanned_count).unwrap_or(i32::MAX),
            last_evaluated_key: page.last_evaluated_key.unwrap_or_default(),
            consumed_capacity,
        })
    }

    // -----------------------------------------------------------------------
    // Keys, capacity
    // -----------------------------------------------------------------------

    /// Validates a `Key` parameter: key attributes only, right types, within
    /// the key byte budget.
    fn resolve_key(&self, key: &Item) -> Result<PrimaryKey, EngineError> {
        let pk = extract_primary_key(&self.schema.key, key)?;
        if key.len() != self.schema.key.attributes().count() {
            return Err(EngineError::validation(
                "The provided key element does not match the schema",
            ));
        }
        self.check_key_size(&pk)?;
        Ok(pk)
    }

    fn check_key_size(&self, key: &PrimaryKey) -> Result<(), EngineError> {
        let size = key_size(key);
        if size > self.config.max_key_bytes {
            return Err(EngineError::validation(format!(
                "One or more parameter values were invalid: Aggregated size of all range keys has exceeded the size limit of {} bytes (got {size})",
                self.config.max_key_bytes
            )));
        }
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn capacity(&self, bytes: u64, unit: u64) -> ConsumedCapacity {
        ConsumedCapacity {
            table_name: self.schema.name.clone(),
            capacity_units: bytes.div_ceil(unit).max(1) as f64,
        }
    }

    // -----------------------------------------------------------------------
    // Fixtures & description
    // -----------------------------------------------------------------------

    /// Replaces the contents of the table with native JSON laid out as
    /// `hash -> range -> item`, or `hash -> item` without a sort key.
    ///
    /// Key attributes are taken from the map keys and override any copy
    /// inside the item.
    ///
    /// # Errors
    ///
    /// Returns an error when the layout is wrong or a value cannot be
    /// converted. The table is cleared first either way.
    pub fn set_data(&self, data: &Value) -> Result<(), EngineError> {
        self.storage.clear();
        let partitions = data
            .as_object()
            .ok_or_else(|| EngineError::validation("Table data must be a JSON object"))?;
        let mode = self.config.conversion_mode();

        for (hash, entry) in partitions {
            let hash_value = key_from_str(&self.schema.key.partition_key, hash);
            let put = |range: Option<&str>, native: &Value| -> Result<(), EngineError> {
                let mut item = item_from_native(native, mode)?;
                item.insert(self.schema.key.partition_key.name.clone(), hash_value.clone());
                if let (Some(sk), Some(range)) = (&self.schema.key.sort_key, range) {
                    item.insert(sk.name.clone(), key_from_str(sk, range));
                }
                let key = extract_primary_key(&self.schema.key, &item)?;
                check_numbers(&item)?;
                self.storage
                    .write(&key, |_| Ok((Write::Store(Arc::new(item)), ())))
            };
            if self.schema.key.sort_key.is_some() {
                let ranges = entry.as_object().ok_or_else(|| {
                    EngineError::validation(format!(
                        "Partition {hash} must map range keys to items"
                    ))
                })?;
                for (range, native) in ranges {
                    put(Some(range.as_str()), native)?;
                }
            } else {
                put(None, entry)?;
            }
        }
        debug!(table = %self.schema.name, items = self.storage.item_count(), "loaded table data");
        Ok(())
    }

    /// Dumps the table as native JSON in the layout [`set_data`] accepts.
    ///
    /// A stored `NULL` attribute is written as JSON `null`, which [`set_data`]
    /// only loads back with `legacy_value_fallback` on (as `N("0")`). Dumps of
    /// tables without `NULL` values round-trip in either mode.
    ///
    /// [`set_data`]: TableEngine::set_data
    #[must_use]
    pub fn get_data(&self) -> Value {
        let mut out = Map::new();
        for (hash, rows) in self.storage.snapshot() {
            let hash = key_to_string(&hash);
            let value = if self.schema.key.sort_key.is_some() {
                Value::Object(
                    rows.iter()
                        .filter_map(|(range, item)| {
                            range
                                .to_attribute_value()
                                .map(|r| (key_to_string(&r), item_to_native(item)))
                        })
                        .collect(),
                )
            } else {
                rows.first()
                    .map_or(Value::Null, |(_, item)| item_to_native(item))
            };
            out.insert(hash, value);
        }
        Value::Object(out)
    }

    /// Parses `json` and hands it to [`set_data`](TableEngine::set_data).
    ///
    /// # Errors
    ///
    /// Returns an error when `json` does not parse or does not fit the table.
    pub fn load_json(&self, json: &str) -> anyhow::Result<()> {
        let data: Value = serde_json::from_str(json)
            .with_context(|| format!("parsing fixture data for table {}", self.schema.name))?;
        self.set_data(&data)
            .with_context(|| format!("loading fixture data into table {}", self.schema.name))
    }

    /// The table description blob.
    #[must_use]
    pub fn describe(&self) -> TableDescription {
        #[allow(clippy::cast_precision_loss)]
        let creation_time = self.created_at.timestamp_millis() as f64 / 1000.0;
        let mut global = Vec::new();
        let mut local = Vec::new();
        for index in &self.schema.indexes {
            let description = SecondaryIndexDescription {
                index_name: index.name.clone(),
                key_schema: index.key.elements(),
                item_count: Some(self.index_item_count(index)),
            };
            if self.schema.is_global(index) {
                global.push(description);
            } else {
                local.push(description);
            }
        }
        TableDescription {
            table_name: self.schema.name.clone(),
            table_status: TableStatus::Active,
            key_schema: self.schema.key.elements(),
            attribute_definitions: self.schema.attribute_definitions(),
            creation_date_time: Some(creation_time),
            item_count: Some(i64::try_from(self.storage.item_count()).unwrap_or(i64::MAX)),
            table_size_bytes: Some(
                i64::try_from(self.storage.total_size_bytes()).unwrap_or(i64::MAX),
            ),
            table_id: Some(self.table_id.clone()),
            global_secondary_indexes: global,
            local_secondary_indexes: local,
        }
    }

    fn index_item_count(&self, index: &IndexSchema) -> i64 {
        let count = self
            .storage
            .snapshot()
            .iter()
            .flat_map(|(_, rows)| rows.iter())
            .filter(|(_, item)| try_extract_key(&index.key, item).is_some())
            .count();
        i64::try_from(count).unwrap_or(i64::MAX)
    }
}

/// Splits a key condition into the partition value and the optional sort
/// key predicate.
fn split_key_condition<'a>(
    expr: &'a Expression,
    key: &KeySchema,
) -> Result<(&'a AttributeValue, Option<&'a Expression>), EngineError> {
    let unsupported = || EngineError::validation("Query key condition not supported");
    let mut predicates = Vec::new();
    flatten_and(expr, &mut predicates);

    let mut partition = None;
    let mut sort = None;
    for predicate in predicates {
        let Expression::Operator { op, children } = predicate else {
            return Err(unsupported());
        };
        let Some(Expression::Attribute(name)) = children.first() else {
            return Err(unsupported());
        };
        if *name == key.partition_key.name {
            match (op, children.get(1)) {
                (Operator::Eq, Some(Expression::Literal(value))) if partition.is_none() => {
                    if !key.partition_key.attr_type.matches(value) {
                        return Err(EngineError::validation(
                            "One or more parameter values were invalid: Condition parameter type does not match schema type",
                        ));
                    }
                    partition = Some(value);
                }
                _ => return Err(unsupported()),
            }
        } else if key.sort_key.as_ref().is_some_and(|sk| sk.name == *name)
            && sort.is_none()
            && matches!(
                op,
                Operator::Eq
                    | Operator::Lt
                    | Operator::Le
                    | Operator::Gt
                    | Operator::Ge
                    | Operator::Between
                    | Operator::BeginsWith
            )
        {
            sort = Some(predicate);
        } else {
            return Err(unsupported());
        }
    }

    let partition = partition.ok_or_else(|| {
        EngineError::validation(format!(
            "Query condition missed key schema element: {}",
            key.partition_key.name
        ))
    })?;
    Ok((partition, sort))
}

fn flatten_and<'a>(expr: &'a Expression, out: &mut Vec<&'a Expression>) {
    match expr {
        Expression::Operator {
            op: Operator::And,
            children,
        } => {
            for child in children {
                flatten_and(child, out);
            }
        }
        other => out.push(other),
    }
}

fn check_condition(
    condition: Option<&Expression>,
    current: Option<&Arc<Item>>,
) -> Result<(), EngineError> {
    let Some(condition) = condition else {
        return Ok(());
    };
    let empty = Item::new();
    let item = current.map_or(&empty, |item| &**item);
    if condition.evaluate(item)? {
        Ok(())
    } else {
        Err(EngineError::conditional_check_failed())
    }
}

fn check_old_only(return_values: ReturnValue) -> Result<(), EngineError> {
    match return_values {
        ReturnValue::None | ReturnValue::AllOld => Ok(()),
        other => Err(EngineError::validation(format!(
            "Return values set to invalid value: {other}"
        ))),
    }
}

fn old_attributes(return_values: ReturnValue, previous: Option<&Item>) -> Item {
    match (return_values, previous) {
        (ReturnValue::AllOld, Some(item)) => item.clone(),
        _ => Item::new(),
    }
}

fn pick<'a>(item: &Item, names: impl Iterator<Item = &'a str>) -> Item {
    names
        .filter_map(|name| item.get(name).map(|v| (name.to_owned(), v.clone())))
        .collect()
}

fn project(item: &Item, attributes: &[String]) -> Item {
    if attributes.is_empty() {
        return item.clone();
    }
    pick(item, attributes.iter().map(String::as_str))
}

fn sortable(item: &Item, attr: Option<&KeyAttribute>) -> SortableAttributeValue {
    attr.and_then(|a| item.get(&a.name))
        .and_then(SortableAttributeValue::from_attribute_value)
        .unwrap_or(SortableAttributeValue::Sentinel)
}

fn key_from_str(attr: &KeyAttribute, raw: &str) -> AttributeValue {
    match attr.attr_type {
        ScalarAttributeType::N => AttributeValue::N(raw.to_owned()),
        _ => AttributeValue::S(raw.to_owned()),
    }
}

fn key_to_string(value: &AttributeValue) -> String {
    match value {
        AttributeValue::S(s) | AttributeValue::N(s) => s.clone(),
        other => other.to_string(),
    }
}
