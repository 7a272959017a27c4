//! Typed requests for the item operations.
//!
//! Each request converts to its wire `*Input` with [`to_input`] (one
//! [`AliasCounter`] per request, so the key condition, filter, condition and
//! update never hand out the same token) and back with `TryFrom`, which
//! accepts both expression strings and the legacy per-attribute parameters.
//!
//! [`to_input`]: PutItemRequest::to_input

use std::collections::HashMap;

use typed_builder::TypedBuilder;

use dynamock_model::input::{
    BatchGetItemInput, DeleteItemInput, GetItemInput, PutItemInput, QueryInput, ScanInput,
    UpdateItemInput,
};
use dynamock_model::types::{KeysAndAttributes, ReturnValue, Select};
use dynamock_model::{AttributeValue, EngineError, Item};

use crate::expression::{AliasCounter, Expression, parse_condition, parse_projection, parse_update};
use crate::legacy;
use crate::naming;
use crate::update::Updates;

/// `GetItem` request.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct GetItemRequest {
    /// Table to read from.
    #[builder(setter(into))]
    pub table_name: String,
    /// Primary key of the item.
    pub key: Item,
    /// Attributes to return; empty means all.
    #[builder(default)]
    pub projection: Vec<String>,
    /// Accepted for wire compatibility; every read is consistent.
    #[builder(default)]
    pub consistent_read: bool,
}

/// `PutItem` request.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct PutItemRequest {
    /// Table to write to.
    #[builder(setter(into))]
    pub table_name: String,
    /// The full item, key attributes included.
    pub item: Item,
    /// Must hold for the stored item (or its absence) before the write.
    #[builder(default, setter(strip_option))]
    pub condition: Option<Expression>,
    /// `NONE` or `ALL_OLD`.
    #[builder(default)]
    pub return_values: ReturnValue,
}

/// `DeleteItem` request.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct DeleteItemRequest {
    /// Table to delete from.
    #[builder(setter(into))]
    pub table_name: String,
    /// Primary key of the item.
    pub key: Item,
    /// Must hold for the stored item (or its absence) before the delete.
    #[builder(default, setter(strip_option))]
    pub condition: Option<Expression>,
    /// `NONE` or `ALL_OLD`.
    #[builder(default)]
    pub return_values: ReturnValue,
}

/// `UpdateItem` request.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct UpdateItemRequest {
    /// Table holding the item.
    #[builder(setter(into))]
    pub table_name: String,
    /// Primary key of the item.
    pub key: Item,
    /// Directives to apply.
    pub updates: Updates,
    /// Must hold for the stored item (or its absence) before the update.
    #[builder(default, setter(strip_option))]
    pub condition: Option<Expression>,
    /// Create the item when it does not exist.
    #[builder(default)]
    pub upsert: bool,
    /// Attributes to return.
    #[builder(default = ReturnValue::AllNew)]
    pub return_values: ReturnValue,
}

/// `Query` request.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct QueryRequest {
    /// Table to query.
    #[builder(setter(into))]
    pub table_name: String,
    /// Secondary index to query instead of the primary key.
    #[builder(default, setter(strip_option, into))]
    pub index_name: Option<String>,
    /// Equality on the partition key, optionally ANDed with one sort key
    /// predicate.
    pub key_condition: Expression,
    /// Applied to the rows of the page after the key condition.
    #[builder(default, setter(strip_option))]
    pub filter: Option<Expression>,
    /// Attributes to return; empty means all.
    #[builder(default)]
    pub projection: Vec<String>,
    /// Ascending sort key order when `true`.
    #[builder(default = true)]
    pub scan_forward: bool,
    /// Most rows to evaluate.
    #[builder(default, setter(strip_option))]
    pub limit: Option<usize>,
    /// `LastEvaluatedKey` of the previous page.
    #[builder(default, setter(strip_option))]
    pub exclusive_start_key: Option<Item>,
    /// What to return.
    #[builder(default)]
    pub select: Select,
}

/// `Scan` request.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct ScanRequest {
    /// Table to scan.
    #[builder(setter(into))]
    pub table_name: String,
    /// Applied to the rows of the page.
    #[builder(default, setter(strip_option))]
    pub filter: Option<Expression>,
    /// Attributes to return; empty means all.
    #[builder(default)]
    pub projection: Vec<String>,
    /// Segment of a parallel scan, as `(segment, total_segments)`.
    #[builder(default, setter(strip_option))]
    pub segment: Option<(usize, usize)>,
    /// Most rows to evaluate.
    #[builder(default, setter(strip_option))]
    pub limit: Option<usize>,
    /// `LastEvaluatedKey` of the previous page.
    #[builder(default, setter(strip_option))]
    pub exclusive_start_key: Option<Item>,
    /// What to return.
    #[builder(default)]
    pub select: Select,
}

/// Keys wanted from one table in a batch get.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct TableKeys {
    /// Table to read from.
    #[builder(setter(into))]
    pub table_name: String,
    /// Primary keys, in request order.
    pub keys: Vec<Item>,
    /// Attributes to return; empty means all.
    #[builder(default)]
    pub projection: Vec<String>,
}

/// `BatchGetItem` request. Tables are processed in the order given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGetRequest {
    /// Per-table key lists.
    pub tables: Vec<TableKeys>,
}

impl BatchGetRequest {
    /// An empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the keys for one table.
    #[must_use]
    pub fn table(mut self, table: TableKeys) -> Self {
        self.tables.push(table);
        self
    }

    /// Total number of keys across tables.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.tables.iter().map(|t| t.keys.len()).sum()
    }

    /// True when no table has keys left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.key_count() == 0
    }
}

// ---------------------------------------------------------------------------
// Typed -> wire
// ---------------------------------------------------------------------------

/// Accumulates expression strings and their substitution maps for one request.
#[derive(Debug, Default)]
struct WireExpressions {
    counter: AliasCounter,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl WireExpressions {
    fn condition(&mut self, expr: Option<&Expression>) -> Result<Option<String>, EngineError> {
        let Some(expr) = expr else {
            return Ok(None);
        };
        let assigned = expr.assign_unique_names(&mut self.counter);
        let rendered = assigned.compile_to_string()?;
        if rendered.is_empty() {
            return Ok(None);
        }
        self.names.extend(assigned.collect_attribute_names());
        self.values.extend(assigned.collect_attribute_values());
        Ok(Some(rendered))
    }

    fn update(&mut self, updates: &Updates) -> Option<String> {
        let compiled = updates.compile(&mut self.counter);
        if compiled.expression.is_empty() {
            return None;
        }
        self.names.extend(compiled.attribute_names);
        self.values.extend(compiled.attribute_values);
        Some(compiled.expression)
    }

    fn projection(&mut self, attributes: &[String]) -> Option<String> {
        if attributes.is_empty() {
            return None;
        }
        let rendered = attributes
            .iter()
            .map(|name| {
                if naming::needs_alias(name) {
                    let alias = naming::alias(name);
                    self.names.insert(alias.clone(), name.clone());
                    alias
                } else {
                    name.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(",");
        Some(rendered)
    }
}

fn limit_to_wire(limit: Option<usize>) -> Option<i32> {
    limit.map(|l| i32::try_from(l).unwrap_or(i32::MAX))
}

impl GetItemRequest {
    /// Wire body for this request.
    #[must_use]
    pub fn to_input(&self) -> GetItemInput {
        let mut wire = WireExpressions::default();
        let projection_expression = wire.projection(&self.projection);
        GetItemInput {
            table_name: self.table_name.clone(),
            key: self.key.clone(),
            consistent_read: self.consistent_read.then_some(true),
            projection_expression,
            attributes_to_get: Vec::new(),
            expression_attribute_names: wire.names,
        }
    }
}

impl PutItemRequest {
    /// Wire body for this request.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the condition is malformed.
    pub fn to_input(&self) -> Result<PutItemInput, EngineError> {
        let mut wire = WireExpressions::default();
        let condition_expression = wire.condition(self.condition.as_ref())?;
        Ok(PutItemInput {
            table_name: self.table_name.clone(),
            item: self.item.clone(),
            condition_expression,
            expected: HashMap::new(),
            expression_attribute_names: wire.names,
            expression_attribute_values: wire.values,
            return_values: Some(self.return_values),
        })
    }
}

impl DeleteItemRequest {
    /// Wire body for this request.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the condition is malformed.
    pub fn to_input(&self) -> Result<DeleteItemInput, EngineError> {
        let mut wire = WireExpressions::default();
        let condition_expression = wire.condition(self.condition.as_ref())?;
        Ok(DeleteItemInput {
            table_name: self.table_name.clone(),
            key: self.key.clone(),
            condition_expression,
            expected: HashMap::new(),
            expression_attribute_names: wire.names,
            expression_attribute_values: wire.values,
            return_values: Some(self.return_values),
        })
    }
}

impl UpdateItemRequest {
    /// Wire body for this request. The upsert flag has no wire field.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the condition is malformed.
    pub fn to_input(&self) -> Result<UpdateItemInput, EngineError> {
        let mut wire = WireExpressions::default();
        let update_expression = wire.update(&self.updates);
        let condition_expression = wire.condition(self.condition.as_ref())?;
        Ok(UpdateItemInput {
            table_name: self.table_name.clone(),
            key: self.key.clone(),
            update_expression,
            attribute_updates: HashMap::new(),
            condition_expression,
            expected: HashMap::new(),
            expression_attribute_names: wire.names,
            expression_attribute_values: wire.values,
            return_values: Some(self.return_values),
        })
    }
}

impl QueryRequest {
    /// Wire body for this request.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the key condition or filter is
    /// malformed.
    pub fn to_input(&self) -> Result<QueryInput, EngineError> {
        let mut wire = WireExpressions::default();
        let key_condition_expression = wire.condition(Some(&self.key_condition))?;
        let filter_expression = wire.condition(self.filter.as_ref())?;
        let projection_expression = wire.projection(&self.projection);
        Ok(QueryInput {
            table_name: self.table_name.clone(),
            index_name: self.index_name.clone(),
            key_condition_expression,
            key_conditions: HashMap::new(),
            filter_expression,
            query_filter: HashMap::new(),
            projection_expression,
            attributes_to_get: Vec::new(),
            expression_attribute_names: wire.names,
            expression_attribute_values: wire.values,
            scan_index_forward: (!self.scan_forward).then_some(false),
            limit: limit_to_wire(self.limit),
            exclusive_start_key: self.exclusive_start_key.clone().unwrap_or_default(),
            select: (self.select != Select::AllAttributes).then_some(self.select),
            consistent_read: None,
        })
    }
}

impl ScanRequest {
    /// Wire body for this request.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the filter is malformed.
    pub fn to_input(&self) -> Result<ScanInput, EngineError> {
        let mut wire = WireExpressions::default();
        let filter_expression = wire.condition(self.filter.as_ref())?;
        let projection_expression = wire.projection(&self.projection);
        let (segment, total_segments) = self.segment.map_or((None, None), |(s, t)| {
            (
                Some(i32::try_from(s).unwrap_or(i32::MAX)),
                Some(i32::try_from(t).unwrap_or(i32::MAX)),
            )
        });
        Ok(ScanInput {
            table_name: self.table_name.clone(),
            filter_expression,
            scan_filter: HashMap::new(),
            projection_expression,
            attributes_to_get: Vec::new(),
            expression_attribute_names: wire.names,
            expression_attribute_values: wire.values,
            limit: limit_to_wire(self.limit),
            exclusive_start_key: self.exclusive_start_key.clone().unwrap_or_default(),
            segment,
            total_segments,
            select: (self.select != Select::AllAttributes).then_some(self.select),
            consistent_read: None,
        })
    }
}

impl BatchGetRequest {
    /// Wire body for this request. Keys for a table named twice are merged
    /// and the first projection given for it wins.
    #[must_use]
    pub fn to_input(&self) -> BatchGetItemInput {
        let mut request_items: HashMap<String, KeysAndAttributes> = HashMap::new();
        for table in &self.tables {
            let entry = request_items.entry(table.table_name.clone()).or_default();
            entry.keys.extend(table.keys.iter().cloned());
            if entry.projection_expression.is_none() {
                let mut wire = WireExpressions::default();
                entry.projection_expression = wire.projection(&table.projection);
                entry.expression_attribute_names = wire.names;
            }
        }
        BatchGetItemInput { request_items }
    }
}

// ---------------------------------------------------------------------------
// Wire -> typed
// ---------------------------------------------------------------------------

fn mixed_parameters(legacy: &str, expression: &str) -> EngineError {
    EngineError::validation(format!(
        "Can not use both expression and non-expression parameters in the same request: Non-expression parameters: {{{legacy}}} Expression parameters: {{{expression}}}"
    ))
}

fn parse_optional_condition(
    expression: Option<&str>,
    names: &HashMap<String, String>,
    values: &HashMap<String, AttributeValue>,
) -> Result<Option<Expression>, EngineError> {
    expression
        .map(|e| parse_condition(e, names, values))
        .transpose()
        .map_err(EngineError::from)
}

fn intake_condition(
    expression: Option<&str>,
    legacy: Option<Expression>,
    names: &HashMap<String, String>,
    values: &HashMap<String, AttributeValue>,
    (legacy_name, expression_name): (&str, &str),
) -> Result<Option<Expression>, EngineError> {
    match (expression, legacy) {
        (Some(_), Some(_)) => Err(mixed_parameters(legacy_name, expression_name)),
        (None, legacy) => Ok(legacy),
        (expression, None) => parse_optional_condition(expression, names, values),
    }
}

fn intake_projection(
    expression: Option<&str>,
    attributes_to_get: Vec<String>,
    names: &HashMap<String, String>,
) -> Result<Vec<String>, EngineError> {
    match expression {
        Some(_) if !attributes_to_get.is_empty() => Err(EngineError::validation(
            "Cannot have both AttributesToGet and ProjectionExpression",
        )),
        Some(e) => Ok(parse_projection(e, names)?),
        None => Ok(attributes_to_get),
    }
}

fn intake_limit(limit: Option<i32>) -> Result<Option<usize>, EngineError> {
    limit
        .map(|l| {
            usize::try_from(l)
                .ok()
                .filter(|l| *l > 0)
                .ok_or_else(|| EngineError::validation("Limit must be greater than 0"))
        })
        .transpose()
}

fn intake_start_key(key: Item) -> Option<Item> {
    (!key.is_empty()).then_some(key)
}

impl TryFrom<GetItemInput> for GetItemRequest {
    type Error = EngineError;

    fn try_from(input: GetItemInput) -> Result<Self, Self::Error> {
        let projection = intake_projection(
            input.projection_expression.as_deref(),
            input.attributes_to_get,
            &input.expression_attribute_names,
        )?;
        Ok(Self {
            table_name: input.table_name,
            key: input.key,
            projection,
            consistent_read: input.consistent_read.unwrap_or(false),
        })
    }
}

impl TryFrom<PutItemInput> for PutItemRequest {
    type Error = EngineError;

    fn try_from(input: PutItemInput) -> Result<Self, Self::Error> {
        let condition = intake_condition(
            input.condition_expression.as_deref(),
            legacy::expected_to_expression(&input.expected)?,
            &input.expression_attribute_names,
            &input.expression_attribute_values,
            ("Expected", "ConditionExpression"),
        )?;
        Ok(Self {
            table_name: input.table_name,
            item: input.item,
            condition,
            return_values: input.return_values.unwrap_or_default(),
        })
    }
}

impl TryFrom<DeleteItemInput> for DeleteItemRequest {
    type Error = EngineError;

    fn try_from(input: DeleteItemInput) -> Result<Self, Self::Error> {
        let condition = intake_condition(
            input.condition_expression.as_deref(),
            legacy::expected_to_expression(&input.expected)?,
            &input.expression_attribute_names,
            &input.expression_attribute_values,
            ("Expected", "ConditionExpression"),
        )?;
        Ok(Self {
            table_name: input.table_name,
            key: input.key,
            condition,
            return_values: input.return_values.unwrap_or_default(),
        })
    }
}

impl TryFrom<UpdateItemInput> for UpdateItemRequest {
    type Error = EngineError;

    fn try_from(input: UpdateItemInput) -> Result<Self, Self::Error> {
        let updates = match input.update_expression.as_deref() {
            Some(_) if !input.attribute_updates.is_empty() => {
                return Err(mixed_parameters("AttributeUpdates", "UpdateExpression"));
            }
            Some(e) => parse_update(
                e,
                &input.expression_attribute_names,
                &input.expression_attribute_values,
            )?,
            None => legacy::attribute_updates_to_updates(&input.attribute_updates)?,
        };
        let condition = intake_condition(
            input.condition_expression.as_deref(),
            legacy::expected_to_expression(&input.expected)?,
            &input.expression_attribute_names,
            &input.expression_attribute_values,
            ("Expected", "ConditionExpression"),
        )?;
        Ok(Self {
            table_name: input.table_name,
            key: input.key,
            updates,
            condition,
            upsert: false,
            return_values: input.return_values.unwrap_or_default(),
        })
    }
}

impl TryFrom<QueryInput> for QueryRequest {
    type Error = EngineError;

    fn try_from(input: QueryInput) -> Result<Self, Self::Error> {
        let names = &input.expression_attribute_names;
        let values = &input.expression_attribute_values;
        let key_condition = intake_condition(
            input.key_condition_expression.as_deref(),
            legacy::conditions_to_expression(&input.key_conditions)?,
            names,
            values,
            ("KeyConditions", "KeyConditionExpression"),
        )?
        .ok_or_else(|| {
            EngineError::validation("Either the KeyConditions or KeyConditionExpression parameter must be specified in the request.")
        })?;
        let filter = intake_condition(
            input.filter_expression.as_deref(),
            legacy::conditions_to_expression(&input.query_filter)?,
            names,
            values,
            ("QueryFilter", "FilterExpression"),
        )?;
        let projection = intake_projection(
            input.projection_expression.as_deref(),
            input.attributes_to_get,
            names,
        )?;
        Ok(Self {
            table_name: input.table_name,
            index_name: input.index_name,
            key_condition,
            filter,
            projection,
            scan_forward: input.scan_index_forward.unwrap_or(true),
            limit: intake_limit(input.limit)?,
            exclusive_start_key: intake_start_key(input.exclusive_start_key),
            select: input.select.unwrap_or_default(),
        })
    }
}

impl TryFrom<ScanInput> for ScanRequest {
    type Error = EngineError;

    fn try_from(input: ScanInput) -> Result<Self, Self::Error> {
        let filter = intake_condition(
            input.filter_expression.as_deref(),
            legacy::conditions_to_expression(&input.scan_filter)?,
            &input.expression_attribute_names,
            &input.expression_attribute_values,
            ("ScanFilter", "FilterExpression"),
        )?;
        let projection = intake_projection(
            input.projection_expression.as_deref(),
            input.attributes_to_get,
            &input.expression_attribute_names,
        )?;
        let segment = match (input.segment, input.total_segments) {
            (None, None) => None,
            (Some(segment), Some(total)) => {
                let total = usize::try_from(total)
                    .ok()
                    .filter(|t| *t > 0)
                    .ok_or_else(|| EngineError::validation("TotalSegments must be greater than 0"))?;
                let segment = usize::try_from(segment)
                    .ok()
                    .filter(|s| *s < total)
                    .ok_or_else(|| {
                        EngineError::validation(
                            "The Segment parameter must be between 0 and TotalSegments - 1",
                        )
                    })?;
                Some((segment, total))
            }
            _ => {
                return Err(EngineError::validation(
                    "The TotalSegments parameter is required but was not present in the request when parameter Segment is present",
                ));
            }
        };
        Ok(Self {
            table_name: input.table_name,
            filter,
            projection,
            segment,
            limit: intake_limit(input.limit)?,
            exclusive_start_key: intake_start_key(input.exclusive_start_key),
            select: input.select.unwrap_or_default(),
        })
    }
}

impl TryFrom<BatchGetItemInput> for BatchGetRequest {
    type Error = EngineError;

    fn try_from(input: BatchGetItemInput) -> Result<Self, Self::Error> {
        let mut tables = input
            .request_items
            .into_iter()
            .map(|(table_name, keys)| {
                let projection = intake_projection(
                    keys.projection_expression.as_deref(),
                    keys.attributes_to_get,
                    &keys.expression_attribute_names,
                )?;
                Ok(TableKeys {
                    table_name,
                    keys: keys.keys,
                    projection,
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;
        tables.sort_by(|a, b| a.table_name.cmp(&b.table_name));
        Ok(Self { tables })
    }
}

#[cfg(test)]
mod tests {
    use dynamock_model::ErrorCode;
    use dynamock_model::types::{ComparisonOperator, Condition, ExpectedAttributeValue};

    use super::*;
    use crate::update::UpdateDirective;

    fn key() -> Item {
        HashMap::from([
            ("userId".to_owned(), AttributeValue::from("userA")),
            ("column".to_owned(), AttributeValue::from("@")),
        ])
    }

    #[test]
    fn test_should_share_one_counter_across_sub_expressions() {
        let request = QueryRequest::builder()
            .table_name("user")
            .key_condition(Expression::eq("userId", "userA"))
            .filter(Expression::gt("age", 20_i64))
            .build();
        let input = request.to_input().unwrap();
        assert_eq!(input.key_condition_expression.as_deref(), Some("(userId = :V1)"));
        assert_eq!(input.filter_expression.as_deref(), Some("(age > :V3)"));
        assert_eq!(input.expression_attribute_values.len(), 2);
        assert!(input.expression_attribute_names.is_empty());
        assert_eq!(input.scan_index_forward, None);
    }

    #[test]
    fn test_should_omit_empty_condition() {
        let request = PutItemRequest::builder()
            .table_name("user")
            .item(key())
            .condition(Expression::all(Vec::new()))
            .build();
        let input = request.to_input().unwrap();
        assert!(input.condition_expression.is_none());
        assert!(input.expression_attribute_values.is_empty());
    }

    #[test]
    fn test_should_compile_update_and_condition_without_collisions() {
        let request = UpdateItemRequest::builder()
            .table_name("user")
            .key(key())
            .updates(Updates::new().increment("age", 1_i64))
            .condition(Expression::not_null("age"))
            .build();
        let input = request.to_input().unwrap();
        assert_eq!(input.update_expression.as_deref(), Some("ADD age :U1"));
        assert_eq!(input.condition_expression.as_deref(), Some("attribute_exists(age)"));
        assert_eq!(input.return_values, Some(ReturnValue::AllNew));
    }

    #[test]
    fn test_should_alias_reserved_projection_names() {
        let request = GetItemRequest::builder()
            .table_name("user")
            .key(key())
            .projection(vec!["status".to_owned(), "age".to_owned()])
            .build();
        let input = request.to_input();
        assert_eq!(input.projection_expression.as_deref(), Some("#status,age"));
        assert_eq!(input.expression_attribute_names["#status"], "status");

        let back = GetItemRequest::try_from(input).unwrap();
        assert_eq!(back.projection, vec!["status".to_owned(), "age".to_owned()]);
    }

    #[test]
    fn test_should_parse_wire_update_expression() {
        let input = UpdateItemInput {
            table_name: "user".to_owned(),
            key: key(),
            update_expression: Some("SET nick = :n ADD age :one".to_owned()),
            expression_attribute_values: HashMap::from([
                (":n".to_owned(), AttributeValue::from("sam")),
                (":one".to_owned(), AttributeValue::from(1_i64)),
            ]),
            ..UpdateItemInput::default()
        };
        let request = UpdateItemRequest::try_from(input).unwrap();
        assert!(!request.upsert);
        assert_eq!(
            request.updates.get("age"),
            Some(&UpdateDirective::Increment(AttributeValue::from(1_i64)))
        );
        assert_eq!(request.return_values, ReturnValue::None);
    }

    #[test]
    fn test_should_accept_legacy_key_conditions() {
        let input = QueryInput {
            table_name: "user".to_owned(),
            key_conditions: HashMap::from([(
                "userId".to_owned(),
                Condition {
                    comparison_operator: ComparisonOperator::Eq,
                    attribute_value_list: vec![AttributeValue::from("userA")],
                },
            )]),
            limit: Some(2),
            ..QueryInput::default()
        };
        let request = QueryRequest::try_from(input).unwrap();
        assert_eq!(request.key_condition, Expression::eq("userId", "userA"));
        assert_eq!(request.limit, Some(2));
    }

    #[test]
    fn test_should_reject_mixed_condition_parameters() {
        let input = PutItemInput {
            table_name: "user".to_owned(),
            item: key(),
            condition_expression: Some("attribute_not_exists(userId)".to_owned()),
            expected: HashMap::from([(
                "userId".to_owned(),
                ExpectedAttributeValue {
                    exists: Some(false),
                    ..ExpectedAttributeValue::default()
                },
            )]),
            ..PutItemInput::default()
        };
        let err = PutItemRequest::try_from(input).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationException);
        assert!(err.message.contains("{Expected}"));
    }

    #[test]
    fn test_should_require_a_key_condition() {
        let err = QueryRequest::try_from(QueryInput::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationException);
    }

    #[test]
    fn test_should_validate_segments() {
        let input = ScanInput {
            segment: Some(2),
            total_segments: Some(2),
            ..ScanInput::default()
        };
        assert!(ScanRequest::try_from(input).is_err());

        let input = ScanInput {
            segment: Some(1),
            total_segments: Some(2),
            ..ScanInput::default()
        };
        assert_eq!(ScanRequest::try_from(input).unwrap().segment, Some((1, 2)));
    }

    #[test]
    fn test_should_reject_non_positive_limit() {
        let input = ScanInput {
            limit: Some(0),
            ..ScanInput::default()
        };
        assert!(ScanRequest::try_from(input).is_err());
    }

    #[test]
    fn test_should_order_batch_tables_by_name() {
        let input = BatchGetItemInput {
            request_items: HashMap::from([
                ("b".to_owned(), KeysAndAttributes::default()),
                ("a".to_owned(), KeysAndAttributes::default()),
            ]),
        };
        let request = BatchGetRequest::try_from(input).unwrap();
        let names: Vec<&str> = request.tables.iter().map(|t| t.table_name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert!(request.is_empty());
    }

    #[test]
    fn test_should_carry_batch_projection_both_ways() {
        let request = BatchGetRequest::new().table(
            TableKeys::builder()
                .table_name("user")
                .keys(vec![key()])
                .projection(vec!["age".to_owned(), "name".to_owned()])
                .build(),
        );
        let input = request.to_input();
        let entry = &input.request_items["user"];
        assert_eq!(entry.projection_expression.as_deref(), Some("age,#name"));
        assert_eq!(entry.expression_attribute_names["#name"], "name");
        assert!(entry.attributes_to_get.is_empty());

        let back = BatchGetRequest::try_from(input).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn test_should_reject_batch_projection_mixed_with_attributes_to_get() {
        let input: BatchGetItemInput = serde_json::from_value(serde_json::json!({
            "RequestItems": {"user": {
                "Keys": [{"userId": {"S": "a"}}],
                "AttributesToGet": ["age"],
                "ProjectionExpression": "age"
            }}
        }))
        .unwrap();
        let err = BatchGetRequest::try_from(input).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationException);
    }
}
