//! Attribute value access.
//!
//! Configuration reaches the expand converters as `serde_json::Value` trees
//! already validated against the declared schema. These helpers read typed
//! fields out of those trees; a missing or empty value reads as `None` so
//! the converter leaves the corresponding API field unset.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The object form of a value, if it is one.
pub fn obj(value: &Value) -> Option<&Map<String, Value>> {
    value.as_object()
}

/// The first element of a block list. Single-nested blocks arrive as a list
/// of at most one object.
pub fn first(value: &Value) -> Option<&Map<String, Value>> {
    value.as_array()?.first()?.as_object()
}

/// String field, with the empty string reading as absent.
pub fn str_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

pub fn i64_field(map: &Map<String, Value>, key: &str) -> Option<i64> {
    map.get(key).and_then(Value::as_i64)
}

pub fn i32_field(map: &Map<String, Value>, key: &str) -> Option<i32> {
    i64_field(map, key).map(|v| v as i32)
}

pub fn bool_field(map: &Map<String, Value>, key: &str) -> Option<bool> {
    map.get(key).and_then(Value::as_bool)
}

/// Map-of-strings field. Non-string entries are skipped.
pub fn string_map(map: &Map<String, Value>, key: &str) -> BTreeMap<String, String> {
    map.get(key)
        .and_then(Value::as_object)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// List-of-strings field, in configuration order.
pub fn str_list(map: &Map<String, Value>, key: &str) -> Vec<String> {
    map.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// The objects of a nested block list, in configuration order.
pub fn block_list<'a>(map: &'a Map<String, Value>, key: &str) -> Vec<&'a Map<String, Value>> {
    map.get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_string_reads_as_absent() {
        let map = json!({"name": "alice", "api_group": ""});
        let map = map.as_object().unwrap();
        assert_eq!(str_field(map, "name"), Some("alice".to_string()));
        assert_eq!(str_field(map, "api_group"), None);
        assert_eq!(str_field(map, "missing"), None);
    }

    #[test]
    fn first_unwraps_single_block_lists() {
        let value = json!([{"name": "web"}]);
        assert_eq!(
            first(&value).and_then(|m| str_field(m, "name")),
            Some("web".to_string())
        );
        assert!(first(&json!([])).is_none());
        assert!(first(&Value::Null).is_none());
    }

    #[test]
    fn string_map_skips_non_strings() {
        let map = json!({"labels": {"app": "web", "count": 3}});
        let labels = string_map(map.as_object().unwrap(), "labels");
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get("app"), Some(&"web".to_string()));
    }

    #[test]
    fn block_list_keeps_order() {
        let map = json!({"container": [{"name": "a"}, {"name": "b"}]});
        let blocks = block_list(map.as_object().unwrap(), "container");
        assert_eq!(blocks.len(), 2);
        assert_eq!(str_field(blocks[1], "name"), Some("b".to_string()));
    }
}
