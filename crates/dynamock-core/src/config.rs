//! Engine configuration.

use std::env;

use serde::{Deserialize, Deserializer, Serialize};
use typed_builder::TypedBuilder;

use dynamock_model::ConversionMode;

/// Default page size cap for query and scan.
pub const DEFAULT_MAX_RESULT_SIZE: usize = 1000;
/// Default byte budget for a serialized hash plus range key.
pub const DEFAULT_MAX_KEY_BYTES: usize = 2048;
/// Hard cap on keys processed by one batch get.
pub const BATCH_GET_LIMIT: usize = 100;

/// Tunables shared by every table in a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Largest page a query or scan returns, and the cap on batch get keys
    /// together with [`BATCH_GET_LIMIT`]. Zero is raised to one.
    #[builder(default = DEFAULT_MAX_RESULT_SIZE, setter(transform = |n: usize| n.max(1)))]
    #[serde(deserialize_with = "at_least_one")]
    pub max_result_size: usize,
    /// Let an update without an upsert flag create a missing item.
    #[builder(default = true)]
    pub allow_implicit_upsert: bool,
    /// Store unsupported native values as `N("0")` instead of failing.
    #[builder(default = false)]
    pub legacy_value_fallback: bool,
    /// Byte budget for the hash plus range key of an item.
    #[builder(default = DEFAULT_MAX_KEY_BYTES)]
    pub max_key_bytes: usize,
}

impl EngineConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            max_result_size: env_usize("DYNAMOCK_MAX_RESULT_SIZE", DEFAULT_MAX_RESULT_SIZE).max(1),
            allow_implicit_upsert: env_bool("DYNAMOCK_ALLOW_IMPLICIT_UPSERT", true),
            legacy_value_fallback: env_bool("DYNAMOCK_LEGACY_VALUE_FALLBACK", false),
            max_key_bytes: env_usize("DYNAMOCK_MAX_KEY_BYTES", DEFAULT_MAX_KEY_BYTES),
        }
    }

    /// Conversion mode used when native fixtures are loaded.
    #[must_use]
    pub fn conversion_mode(&self) -> ConversionMode {
        if self.legacy_value_fallback {
            ConversionMode::LegacyFallback
        } else {
            ConversionMode::Strict
        }
    }

    /// Page size cap for query and scan, never below one.
    #[must_use]
    pub fn page_limit(&self) -> usize {
        self.max_result_size.max(1)
    }

    /// Number of keys a single batch get may process.
    #[must_use]
    pub fn batch_get_limit(&self) -> usize {
        self.page_limit().min(BATCH_GET_LIMIT)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn at_least_one<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    usize::deserialize(deserializer).map(|n| n.max(1))
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key).map_or(default, |v| parse_bool(&v))
}

fn parse_bool(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_create_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_result_size, 1000);
        assert!(config.allow_implicit_upsert);
        assert!(!config.legacy_value_fallback);
        assert_eq!(config.max_key_bytes, 2048);
        assert_eq!(config.conversion_mode(), ConversionMode::Strict);
    }

    #[test]
    fn test_should_build_with_typed_builder() {
        let config = EngineConfig::builder()
            .max_result_size(2)
            .allow_implicit_upsert(false)
            .legacy_value_fallback(true)
            .build();
        assert_eq!(config.max_result_size, 2);
        assert!(!config.allow_implicit_upsert);
        assert_eq!(config.conversion_mode(), ConversionMode::LegacyFallback);
        assert_eq!(config.batch_get_limit(), 2);
    }

    #[test]
    fn test_should_cap_batch_limit_at_hundred() {
        assert_eq!(EngineConfig::default().batch_get_limit(), 100);
    }

    #[test]
    fn test_should_parse_bool_flags() {
        assert!(parse_bool("YES"));
        assert!(parse_bool("1"));
        assert!(parse_bool("True"));
        assert!(!parse_bool("off"));
    }

    #[test]
    fn test_should_deserialize_partial_camel_case() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"maxResultSize": 5, "allowImplicitUpsert": false}"#).unwrap();
        assert_eq!(config.max_result_size, 5);
        assert!(!config.allow_implicit_upsert);
        assert_eq!(config.max_key_bytes, DEFAULT_MAX_KEY_BYTES);
    }

    #[test]
    fn test_should_raise_zero_result_size_to_one() {
        assert_eq!(EngineConfig::builder().max_result_size(0).build().max_result_size, 1);
        let config: EngineConfig = serde_json::from_str(r#"{"maxResultSize": 0}"#).unwrap();
        assert_eq!(config.max_result_size, 1);

        let literal = EngineConfig {
            max_result_size: 0,
            ..EngineConfig::default()
        };
        assert_eq!(literal.page_limit(), 1);
        assert_eq!(literal.batch_get_limit(), 1);
    }
}
