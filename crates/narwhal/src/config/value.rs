//! Typed configuration tree.
//!
//! Table definitions arrive as untyped YAML/JSON. They are parsed into
//! [`ConfigValue`], which tags every string as either a literal or a
//! parameter-store reference, and are resolved into the reference-free
//! [`ResolvedValue`] before any component reads them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix marking a configuration string as a parameter-store key.
pub const REFERENCE_SENTINEL: &str = "/";

/// Returns true if the string is a parameter-store reference.
pub fn is_reference(value: &str) -> bool {
    value.starts_with(REFERENCE_SENTINEL)
}

/// An unresolved configuration value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum ConfigValue {
    /// A plain string used as-is.
    Literal(String),
    /// A parameter-store key to be resolved.
    Reference(String),
    /// A non-string scalar (number, boolean or null).
    Scalar(Value),
    /// A nested mapping, in source order.
    Mapping(IndexMap<String, ConfigValue>),
    /// An ordered sequence.
    Sequence(Vec<ConfigValue>),
}

impl From<Value> for ConfigValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) if is_reference(&s) => ConfigValue::Reference(s),
            Value::String(s) => ConfigValue::Literal(s),
            Value::Object(map) => ConfigValue::Mapping(
                map.into_iter()
                    .map(|(key, value)| (key, ConfigValue::from(value)))
                    .collect(),
            ),
            Value::Array(items) => {
                ConfigValue::Sequence(items.into_iter().map(ConfigValue::from).collect())
            }
            scalar => ConfigValue::Scalar(scalar),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::from(Value::String(value.to_string()))
    }
}

/// A configuration value with every reference replaced.
///
/// A reference whose lookup failed becomes [`ResolvedValue::Null`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResolvedValue {
    Text(String),
    Scalar(Value),
    Null,
    Mapping(IndexMap<String, ResolvedValue>),
    Sequence(Vec<ResolvedValue>),
}

impl ResolvedValue {
    /// Carry a value over without resolving anything inside it.
    ///
    /// Used for structures nested inside sequences, which resolution leaves
    /// untouched: references in them are kept as their raw key text.
    pub fn verbatim(value: &ConfigValue) -> Self {
        match value {
            ConfigValue::Literal(s) | ConfigValue::Reference(s) => ResolvedValue::Text(s.clone()),
            ConfigValue::Scalar(Value::Null) => ResolvedValue::Null,
            ConfigValue::Scalar(v) => ResolvedValue::Scalar(v.clone()),
            ConfigValue::Mapping(map) => ResolvedValue::Mapping(
                map.iter()
                    .map(|(key, value)| (key.clone(), ResolvedValue::verbatim(value)))
                    .collect(),
            ),
            ConfigValue::Sequence(items) => {
                ResolvedValue::Sequence(items.iter().map(ResolvedValue::verbatim).collect())
            }
        }
    }

    /// The string content, if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ResolvedValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ResolvedValue::Null)
    }
}

impl From<Option<String>> for ResolvedValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(ResolvedValue::Null, ResolvedValue::Text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strings_are_tagged() {
        assert_eq!(
            ConfigValue::from("orders"),
            ConfigValue::Literal("orders".to_string())
        );
        assert_eq!(
            ConfigValue::from("/dev/orders"),
            ConfigValue::Reference("/dev/orders".to_string())
        );
    }

    #[test]
    fn test_nested_shapes_preserved() {
        let value = ConfigValue::from(json!({
            "TABLE_NAME": "/{env}/orders",
            "options": {"retain": 7, "owner": "data"},
            "UPSERT_KEYS": ["id", 3, "/{env}/key"]
        }));

        let ConfigValue::Mapping(map) = value else {
            panic!("expected mapping");
        };
        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys, vec!["TABLE_NAME", "options", "UPSERT_KEYS"]);
        assert!(matches!(map["TABLE_NAME"], ConfigValue::Reference(_)));
        assert!(matches!(map["options"], ConfigValue::Mapping(_)));

        let ConfigValue::Sequence(items) = &map["UPSERT_KEYS"] else {
            panic!("expected sequence");
        };
        assert_eq!(items[0], ConfigValue::Literal("id".to_string()));
        assert_eq!(items[1], ConfigValue::Scalar(json!(3)));
        assert_eq!(items[2], ConfigValue::Reference("/{env}/key".to_string()));
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let yaml = "TABLE_NAME: /prod/orders\nretries: 3\n";
        let value: ConfigValue = load_yaml(yaml);
        let ConfigValue::Mapping(map) = value else {
            panic!("expected mapping");
        };
        assert_eq!(map["retries"], ConfigValue::Scalar(json!(3)));
    }

    fn load_yaml(yaml: &str) -> ConfigValue {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value.yaml");
        std::fs::write(&path, yaml).unwrap();
        narwhal_core::load_definitions_file(&path).unwrap()
    }

    #[test]
    fn test_verbatim_keeps_reference_text() {
        let value = ConfigValue::from(json!({"key": "/dev/secret", "n": null}));
        let resolved = ResolvedValue::verbatim(&value);
        assert_eq!(
            serde_json::to_value(&resolved).unwrap(),
            json!({"key": "/dev/secret", "n": null})
        );
    }
}
