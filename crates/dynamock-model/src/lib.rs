//! Wire model for the dynamock in-memory engine.
//!
//! Typed attribute values, their conversion to and from plain JSON, the error
//! taxonomy, and the request/response bodies of the item operations. The
//! bodies match the service's JSON shapes so they can be handed to a real
//! client unchanged.
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

pub mod attribute_value;
pub mod error;
pub mod input;
pub mod native;
pub mod operations;
pub mod output;
pub mod types;

pub use attribute_value::{AttributeValue, Item};
pub use error::{EngineError, ErrorCode};
pub use native::{ConversionError, ConversionMode};
pub use operations::Operation;
