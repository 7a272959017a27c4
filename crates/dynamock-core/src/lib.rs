//! In-memory DynamoDB engine for tests.
//!
//! An [`EngineRegistry`] holds named [`TableEngine`]s. Each table keeps its
//! items in a concurrent map of partitions, evaluates condition and filter
//! [`Expression`]s, applies [`Updates`], and pages query and scan results the
//! way the service does. Requests can be built as typed values or taken from
//! wire bodies.
#![allow(clippy::doc_markdown, clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod expression;
pub mod legacy;
pub mod naming;
pub mod registry;
pub mod request;
pub mod schema;
pub mod stats;
pub mod storage;
pub mod table;
pub mod update;

pub use config::EngineConfig;
pub use expression::{AliasCounter, Expression};
pub use registry::EngineRegistry;
pub use request::{
    BatchGetRequest, DeleteItemRequest, GetItemRequest, PutItemRequest, QueryRequest,
    ScanRequest, TableKeys, UpdateItemRequest,
};
pub use schema::{IndexSchema, KeyAttribute, KeySchema, TableSchema};
pub use stats::StatsSnapshot;
pub use table::TableEngine;
pub use update::{UpdateDirective, Updates};
