//! The set of tables served together, plus batch reads across them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use dynamock_model::input::{
    BatchGetItemInput, DeleteItemInput, GetItemInput, PutItemInput, QueryInput, ScanInput,
    UpdateItemInput,
};
use dynamock_model::output::{
    BatchGetItemOutput, DeleteItemOutput, GetItemOutput, PutItemOutput, QueryOutput, ScanOutput,
    UpdateItemOutput,
};
use dynamock_model::types::{ConsumedCapacity, KeysAndAttributes, TableDescription};
use dynamock_model::{EngineError, Item, Operation};

use crate::config::EngineConfig;
use crate::error::duplicate_keys;
use crate::request::{
    BatchGetRequest, DeleteItemRequest, GetItemRequest, PutItemRequest, QueryRequest,
    ScanRequest, TableKeys, UpdateItemRequest,
};
use crate::schema::TableSchema;
use crate::stats::{CallStats, StatsSnapshot};
use crate::storage::extract_primary_key;
use crate::table::TableEngine;

/// Every table of one engine instance, keyed by name.
#[derive(Debug)]
pub struct EngineRegistry {
    config: EngineConfig,
    tables: DashMap<String, Arc<TableEngine>>,
    stats: CallStats,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl EngineRegistry {
    /// An empty registry whose tables share `config`.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            tables: DashMap::new(),
            stats: CallStats::new(),
        }
    }

    /// Configuration handed to new tables.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Tables
    // -----------------------------------------------------------------------

    /// Registers an empty table.
    ///
    /// # Errors
    ///
    /// Returns `ResourceInUseException` when the name is taken.
    pub fn create_table(&self, schema: TableSchema) -> Result<Arc<TableEngine>, EngineError> {
        match self.tables.entry(schema.name.clone()) {
            Entry::Occupied(e) => Err(EngineError::resource_in_use(e.key())),
            Entry::Vacant(e) => {
                info!(table = %schema.name, indexes = schema.indexes.len(), "created table");
                let table = Arc::new(TableEngine::new(schema, self.config.clone()));
                e.insert(Arc::clone(&table));
                Ok(table)
            }
        }
    }

    /// Removes a table and returns its last description.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFoundException` for an unknown table.
    pub fn delete_table(&self, name: &str) -> Result<TableDescription, EngineError> {
        let (_, table) = self
            .tables
            .remove(name)
            .ok_or_else(|| EngineError::resource_not_found(name))?;
        info!(table = %name, items = table.item_count(), "deleted table");
        Ok(table.describe())
    }

    /// The table called `name`.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFoundException` for an unknown table.
    pub fn table(&self, name: &str) -> Result<Arc<TableEngine>, EngineError> {
        self.tables
            .get(name)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| EngineError::resource_not_found(name))
    }

    /// Sorted table names.
    #[must_use]
    pub fn list_table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }

    /// Describes the table called `name`.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFoundException` for an unknown table.
    pub fn describe_table(&self, name: &str) -> Result<TableDescription, EngineError> {
        Ok(self.table(name)?.describe())
    }

    /// Drops every table and zeroes the statistics.
    pub fn reset(&self) {
        self.tables.clear();
        self.stats.reset();
    }

    /// Current call counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Zeroes the call counters.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    // -----------------------------------------------------------------------
    // Item operations
    // -----------------------------------------------------------------------

    /// See [`TableEngine::get_item`].
    ///
    /// # Errors
    ///
    /// `ResourceNotFoundException` for an unknown table, otherwise as the
    /// table operation.
    pub fn get_item(&self, request: &GetItemRequest) -> Result<GetItemOutput, EngineError> {
        self.stats.record(Operation::GetItem);
        self.table(&request.table_name)?.get_item(request)
    }

    /// See [`TableEngine::put_item`].
    ///
    /// # Errors
    ///
    /// `ResourceNotFoundException` for an unknown table, otherwise as the
    /// table operation.
    pub fn put_item(&self, request: &PutItemRequest) -> Result<PutItemOutput, EngineError> {
        self.stats.record(Operation::PutItem);
        self.table(&request.table_name)?.put_item(request)
    }

    /// See [`TableEngine::delete_item`].
    ///
    /// # Errors
    ///
    /// `ResourceNotFoundException` for an unknown table, otherwise as the
    /// table operation.
    pub fn delete_item(&self, request: &DeleteItemRequest) -> Result<DeleteItemOutput, EngineError> {
        self.stats.record(Operation::DeleteItem);
        self.table(&request.table_name)?.delete_item(request)
    }

    /// See [`TableEngine::update_item`].
    ///
    /// # Errors
    ///
    /// `ResourceNotFoundException` for an unknown table, otherwise as the
    /// table operation.
    pub fn update_item(&self, request: &UpdateItemRequest) -> Result<UpdateItemOutput, EngineError> {
        self.stats.record(Operation::UpdateItem);
        self.table(&request.table_name)?.update_item(request)
    }

    /// See [`TableEngine::query`].
    ///
    /// # Errors
    ///
    /// `ResourceNotFoundException` for an unknown table, otherwise as the
    /// table operation.
    pub fn query(&self, request: &QueryRequest) -> Result<QueryOutput, EngineError> {
        self.stats.record(Operation::Query);
        self.table(&request.table_name)?.query(request)
    }

    /// See [`TableEngine::scan`].
    ///
    /// # Errors
    ///
    /// `ResourceNotFoundException` for an unknown table, otherwise as the
    /// table operation.
    pub fn scan(&self, request: &ScanRequest) -> Result<ScanOutput, EngineError> {
        self.stats.record(Operation::Scan);
        self.table(&request.table_name)?.scan(request)
    }

    // -----------------------------------------------------------------------
    // Wire bodies
    // -----------------------------------------------------------------------

    /// Handle a wire `GetItem` body.
    ///
    /// # Errors
    ///
    /// Validation errors from intake, otherwise as [`get_item`](Self::get_item).
    pub fn handle_get_item(&self, input: GetItemInput) -> Result<GetItemOutput, EngineError> {
        self.get_item(&input.try_into()?)
    }

    /// Handle a wire `PutItem` body.
    ///
    /// # Errors
    ///
    /// Validation errors from intake, otherwise as [`put_item`](Self::put_item).
    pub fn handle_put_item(&self, input: PutItemInput) -> Result<PutItemOutput, EngineError> {
        self.put_item(&input.try_into()?)
    }

    /// Handle a wire `DeleteItem` body.
    ///
    /// # Errors
    ///
    /// Validation errors from intake, otherwise as
    /// [`delete_item`](Self::delete_item).
    pub fn handle_delete_item(&self, input: DeleteItemInput) -> Result<DeleteItemOutput, EngineError> {
        self.delete_item(&input.try_into()?)
    }

    /// Handle a wire `UpdateItem` body. Wire bodies never carry the upsert
    /// flag.
    ///
    /// # Errors
    ///
    /// Validation errors from intake, otherwise as
    /// [`update_item`](Self::update_item).
    pub fn handle_update_item(&self, input: UpdateItemInput) -> Result<UpdateItemOutput, EngineError> {
        self.update_item(&input.try_into()?)
    }

    /// Handle a wire `Query` body.
    ///
    /// # Errors
    ///
    /// Validation errors from intake, otherwise as [`query`](Self::query).
    pub fn handle_query(&self, input: QueryInput) -> Result<QueryOutput, EngineError> {
        self.query(&input.try_into()?)
    }

    /// Handle a wire `Scan` body.
    ///
    /// # Errors
    ///
    /// Validation errors from intake, otherwise as [`scan`](Self::scan).
    pub fn handle_scan(&self, input: ScanInput) -> Result<ScanOutput, EngineError> {
        self.scan(&input.try_into()?)
    }

    /// Handle a wire `BatchGetItem` body.
    ///
    /// # Errors
    ///
    /// Validation errors from intake, otherwise as
    /// [`batch_get`](Self::batch_get).
    pub fn handle_batch_get_item(&self, input: BatchGetItemInput) -> Result<BatchGetItemOutput, EngineError> {
        self.batch_get(&input.try_into()?)
    }

    // -----------------------------------------------------------------------
    // Batch get
    // -----------------------------------------------------------------------

    /// Reads keys from several tables.
    ///
    /// At most `min(max_result_size, 100)` keys are read per call, counted
    /// across all tables in request order. The rest come back unchanged in
    /// `UnprocessedKeys`, grouped by table.
    ///
    /// # Errors
    ///
    /// - `ResourceNotFoundException` for an unknown table
    /// - validation error when a table's key list holds the same key twice
    ///   or a key does not match the schema
    ///
    /// Nothing is read when validation fails.
    pub fn batch_get(&self, request: &BatchGetRequest) -> Result<BatchGetItemOutput, EngineError> {
        self.stats.record_batch(request.key_count());

        let mut resolved = Vec::with_capacity(request.tables.len());
        for entry in &request.tables {
            let table = self.table(&entry.table_name)?;
            let mut seen = HashSet::with_capacity(entry.keys.len());
            for key in &entry.keys {
                if !seen.insert(extract_primary_key(&table.schema().key, key)?) {
                    return Err(duplicate_keys());
                }
            }
            resolved.push((table, entry));
        }

        let budget = self.config.batch_get_limit();
        let mut processed = 0;
        let mut output = BatchGetItemOutput::default();
        for (table, entry) in resolved {
            let mut units = 0.0;
            for key in &entry.keys {
                if processed >= budget {
                    output
                        .unprocessed_keys
                        .entry(entry.table_name.clone())
                        .or_insert_with(|| KeysAndAttributes {
                            attributes_to_get: entry.projection.clone(),
                            ..KeysAndAttributes::default()
                        })
                        .keys
                        .push(key.clone());
                    continue;
                }
                processed += 1;
                let got = table.get_item(&GetItemRequest {
                    table_name: entry.table_name.clone(),
                    key: key.clone(),
                    projection: entry.projection.clone(),
                    consistent_read: false,
                })?;
                units += got.consumed_capacity.map_or(0.0, |c| c.capacity_units);
                let items = output.responses.entry(entry.table_name.clone()).or_default();
                if let Some(item) = got.item {
                    items.push(item);
                }
            }
            if units > 0.0 {
                output.consumed_capacity.push(ConsumedCapacity {
                    table_name: entry.table_name.clone(),
                    capacity_units: units,
                });
            }
        }
        debug!(
            keys = request.key_count(),
            processed,
            unprocessed = request.key_count() - processed,
            "batch get"
        );
        Ok(output)
    }

    /// Repeats [`batch_get`](Self::batch_get) on the unprocessed keys until
    /// none remain and merges the items per table, in arrival order.
    ///
    /// # Errors
    ///
    /// The first error of any round, or a validation error when a round
    /// reads no key at all.
    pub fn batch_get_all(&self, request: BatchGetRequest) -> Result<HashMap<String, Vec<Item>>, EngineError> {
        let mut merged: HashMap<String, Vec<Item>> = HashMap::new();
        let mut pending = request;
        while !pending.is_empty() {
            let output = self.batch_get(&pending)?;
            let left: usize = output.unprocessed_keys.values().map(|k| k.keys.len()).sum();
            if left >= pending.key_count() {
                return Err(EngineError::validation(format!(
                    "Batch get made no progress with {left} keys pending"
                )));
            }
            for (table, items) in output.responses {
                merged.entry(table).or_default().extend(items);
            }
            let mut next: Vec<TableKeys> = output
                .unprocessed_keys
                .into_iter()
                .map(|(table_name, keys)| TableKeys {
                    table_name,
                    keys: keys.keys,
                    projection: keys.attributes_to_get,
                })
                .collect();
            next.sort_by(|a, b| a.table_name.cmp(&b.table_name));
            pending = BatchGetRequest { tables: next };
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use dynamock_model::ErrorCode;
    use dynamock_model::native::item_from_native;
    use serde_json::{Value, json};

    use super::*;
    use crate::expression::Expression;
    use crate::schema::KeyAttribute;
    use crate::update::Updates;

    fn item(value: Value) -> Item {
        item_from_native(&value, dynamock_model::ConversionMode::Strict).unwrap()
    }

    fn registry_with(config: EngineConfig) -> EngineRegistry {
        let registry = EngineRegistry::new(config);
        registry
            .create_table(
                TableSchema::new("user", KeyAttribute::string("userId"))
                    .with_sort_key(KeyAttribute::string("column")),
            )
            .unwrap();
        registry
            .create_table(TableSchema::new("phone", KeyAttribute::string("number")))
            .unwrap();
        for i in 0..3 {
            registry
                .put_item(
                    &PutItemRequest::builder()
                        .table_name("user")
                        .item(item(json!({"userId": format!("u{i}"), "column": "@"})))
                        .build(),
                )
                .unwrap();
        }
        for i in 0..4 {
            registry
                .put_item(
                    &PutItemRequest::builder()
                        .table_name("phone")
                        .item(item(json!({"number": format!("555-{i}")})))
                        .build(),
                )
                .unwrap();
        }
        registry
    }

    fn batch() -> BatchGetRequest {
        BatchGetRequest::new()
            .table(
                TableKeys::builder()
                    .table_name("user")
                    .keys((0..3).map(|i| item(json!({"userId": format!("u{i}"), "column": "@"}))).collect())
                    .build(),
            )
            .table(
                TableKeys::builder()
                    .table_name("phone")
                    .keys((0..4).map(|i| item(json!({"number": format!("555-{i}")}))).collect())
                    .build(),
            )
    }

    #[test]
    fn test_should_batch_get_across_tables() {
        let registry = registry_with(EngineConfig::default());
        let output = registry.batch_get(&batch()).unwrap();
        assert_eq!(output.responses["user"].len(), 3);
        assert_eq!(output.responses["phone"].len(), 4);
        assert!(output.unprocessed_keys.is_empty());
        assert_eq!(registry.stats().batch_key_counts, vec![7]);
    }

    #[test]
    fn test_should_reject_duplicate_keys() {
        let registry = registry_with(EngineConfig::default());
        let mut request = batch();
        let first = request.tables[0].keys[0].clone();
        request.tables[0].keys.push(first);
        let err = registry.batch_get(&request).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationException);
        assert_eq!(err.message, "Provided list of item keys contains duplicates");
    }

    #[test]
    fn test_should_return_overflow_as_unprocessed() {
        let registry = registry_with(EngineConfig::builder().max_result_size(5).build());
        let request = batch();
        let output = registry.batch_get(&request).unwrap();
        assert_eq!(output.responses["user"].len(), 3);
        assert_eq!(output.responses["phone"].len(), 2);
        assert_eq!(output.unprocessed_keys["phone"].keys, request.tables[1].keys[2..].to_vec());

        let all = registry.batch_get_all(request).unwrap();
        assert_eq!(all["user"].len(), 3);
        assert_eq!(all["phone"].len(), 4);
        assert_eq!(registry.stats().batch_key_counts, vec![7, 7, 2]);
    }

    #[test]
    fn test_should_page_with_zero_result_size_raised_to_one() {
        let registry = registry_with(EngineConfig::builder().max_result_size(0).build());
        let output = registry.batch_get(&batch()).unwrap();
        assert_eq!(output.responses["user"].len(), 1);
        assert_eq!(registry.batch_get_all(batch()).unwrap()["phone"].len(), 4);

        let scan = registry
            .scan(&ScanRequest::builder().table_name("phone").build())
            .unwrap();
        assert_eq!(scan.count, 1);
        assert!(!scan.last_evaluated_key.is_empty());
    }

    #[test]
    fn test_should_project_batch_get_from_wire_body() {
        let registry = registry_with(EngineConfig::default());
        registry
            .put_item(
                &PutItemRequest::builder()
                    .table_name("phone")
                    .item(item(json!({"number": "555-0", "owner": "ann", "carrier": "x"})))
                    .build(),
            )
            .unwrap();
        let input: BatchGetItemInput = serde_json::from_value(json!({
            "RequestItems": {"phone": {
                "Keys": [{"number": {"S": "555-0"}}],
                "ProjectionExpression": "#o",
                "ExpressionAttributeNames": {"#o": "owner"}
            }}
        }))
        .unwrap();
        let output = registry.handle_batch_get_item(input).unwrap();
        let found = &output.responses["phone"][0];
        assert_eq!(found.len(), 1);
        assert_eq!(found["owner"], "ann".into());
    }

    #[test]
    fn test_should_fail_for_unknown_table() {
        let registry = EngineRegistry::default();
        let err = registry
            .get_item(&GetItemRequest::builder().table_name("nope").key(Item::new()).build())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ResourceNotFoundException);
    }

    #[test]
    fn test_should_reject_existing_table() {
        let registry = registry_with(EngineConfig::default());
        let err = registry
            .create_table(TableSchema::new("user", KeyAttribute::string("userId")))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ResourceInUseException);
        assert_eq!(registry.list_table_names(), vec!["phone".to_owned(), "user".to_owned()]);
    }

    #[test]
    fn test_should_count_operations() {
        let registry = registry_with(EngineConfig::default());
        registry
            .update_item(
                &UpdateItemRequest::builder()
                    .table_name("user")
                    .key(item(json!({"userId": "u0", "column": "@"})))
                    .updates(Updates::new().increment("age", 1_i64))
                    .condition(Expression::not_null("userId"))
                    .build(),
            )
            .unwrap();
        let stats = registry.stats();
        assert_eq!(stats.count(Operation::PutItem), 7);
        assert_eq!(stats.count(Operation::UpdateItem), 1);

        registry.reset_stats();
        assert_eq!(registry.stats().count(Operation::PutItem), 0);
    }

    #[test]
    fn test_should_handle_wire_bodies() {
        let registry = registry_with(EngineConfig::default());
        let input: UpdateItemInput = serde_json::from_value(json!({
            "TableName": "user",
            "Key": {"userId": {"S": "u1"}, "column": {"S": "@"}},
            "UpdateExpression": "SET nick = :n",
            "ConditionExpression": "attribute_exists(userId)",
            "ExpressionAttributeValues": {":n": {"S": "ace"}},
            "ReturnValues": "ALL_NEW"
        }))
        .unwrap();
        let output = registry.handle_update_item(input).unwrap();
        assert_eq!(output.attributes["nick"], "ace".into());

        let input: QueryInput = serde_json::from_value(json!({
            "TableName": "user",
            "KeyConditionExpression": "userId = :u",
            "ExpressionAttributeValues": {":u": {"S": "u1"}}
        }))
        .unwrap();
        let output = registry.handle_query(input).unwrap();
        assert_eq!(output.count, 1);
        assert_eq!(output.items[0]["nick"], "ace".into());
    }

    #[test]
    fn test_should_describe_and_delete_table() {
        let registry = registry_with(EngineConfig::default());
        let description = registry.describe_table("phone").unwrap();
        assert_eq!(description.item_count, Some(4));
        registry.delete_table("phone").unwrap();
        assert!(registry.describe_table("phone").is_err());

        registry.reset();
        assert!(registry.list_table_names().is_empty());
    }
}
