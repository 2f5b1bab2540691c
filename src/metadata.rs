//! Shared `metadata` block.
//!
//! Every managed resource declares the same metadata block; namespaced
//! resources add a `namespace` attribute. The expand/flatten pair converts
//! between the block and the API `ObjectMeta`, keeping the server-assigned
//! fields (generation, resource version, uid) computed.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::schema::{AttributeType, NestedBlock, SchemaAttribute, SchemaBlock};
use crate::value;

/// Metadata block for cluster-scoped resources. Identifying fields are
/// force-new: a rename is a different object.
pub fn metadata_block(object_name: &str) -> NestedBlock {
    NestedBlock::single(metadata_fields(object_name, true)).with_min_items(1)
}

/// Metadata block for namespaced resources.
pub fn namespaced_metadata_block(object_name: &str) -> NestedBlock {
    let block = metadata_fields(object_name, true).with_attribute(
        "namespace",
        SchemaAttribute::string()
            .with_description(&format!(
                "Namespace defines the space within which the {} must be unique.",
                object_name
            ))
            .optional()
            .force_new(),
    );
    NestedBlock::single(block).with_min_items(1)
}

/// Metadata block for objects embedded in another resource (pod templates,
/// volume claim templates). Embedded metadata updates with its parent, so
/// nothing here is force-new on its own.
pub fn embedded_metadata_block(object_name: &str) -> NestedBlock {
    NestedBlock::single(metadata_fields(object_name, false)).with_min_items(1)
}

fn metadata_fields(object_name: &str, force_new: bool) -> SchemaBlock {
    let mut name = SchemaAttribute::string()
        .with_description(&format!(
            "Name of the {}, must be unique. Cannot be updated.",
            object_name
        ))
        .optional()
        .computed();
    let mut generate_name = SchemaAttribute::string()
        .with_description(
            "Prefix, used by the server, to generate a unique name only if the `name` field has not been provided.",
        )
        .optional();
    if force_new {
        name = name.force_new();
        generate_name = generate_name.force_new();
    }

    SchemaBlock::new()
        .with_attribute("name", name)
        .with_attribute("generate_name", generate_name)
        .with_attribute(
            "labels",
            SchemaAttribute::map(AttributeType::String)
                .with_description(&format!(
                    "Map of string keys and values that can be used to organize and categorize the {}.",
                    object_name
                ))
                .optional(),
        )
        .with_attribute(
            "annotations",
            SchemaAttribute::map(AttributeType::String)
                .with_description(&format!(
                    "An unstructured key value map stored with the {} that may be used to store arbitrary metadata.",
                    object_name
                ))
                .optional(),
        )
        .with_attribute(
            "generation",
            SchemaAttribute::number()
                .with_description("A sequence number representing a specific generation of the desired state.")
                .computed(),
        )
        .with_attribute(
            "resource_version",
            SchemaAttribute::string()
                .with_description("An opaque value that represents the internal version of this object.")
                .computed(),
        )
        .with_attribute(
            "uid",
            SchemaAttribute::string()
                .with_description("The unique in time and space value for this object.")
                .computed(),
        )
        .with_description("Standard object metadata.")
}

pub fn expand_metadata(config: &Value) -> ObjectMeta {
    let Some(map) = value::first(config) else {
        return ObjectMeta::default();
    };
    ObjectMeta {
        name: value::str_field(map, "name"),
        generate_name: value::str_field(map, "generate_name"),
        namespace: value::str_field(map, "namespace"),
        labels: non_empty(value::string_map(map, "labels")),
        annotations: non_empty(value::string_map(map, "annotations")),
        ..ObjectMeta::default()
    }
}

pub fn flatten_metadata(meta: &ObjectMeta) -> Value {
    let mut map = Map::new();
    if let Some(name) = &meta.name {
        map.insert("name".to_string(), json!(name));
    }
    if let Some(generate_name) = &meta.generate_name {
        map.insert("generate_name".to_string(), json!(generate_name));
    }
    if let Some(namespace) = &meta.namespace {
        map.insert("namespace".to_string(), json!(namespace));
    }
    if let Some(labels) = non_empty_ref(&meta.labels) {
        map.insert("labels".to_string(), json!(labels));
    }
    if let Some(annotations) = non_empty_ref(&meta.annotations) {
        map.insert("annotations".to_string(), json!(annotations));
    }
    if let Some(generation) = meta.generation {
        map.insert("generation".to_string(), json!(generation));
    }
    if let Some(resource_version) = &meta.resource_version {
        map.insert("resource_version".to_string(), json!(resource_version));
    }
    if let Some(uid) = &meta.uid {
        map.insert("uid".to_string(), json!(uid));
    }
    Value::Array(vec![Value::Object(map)])
}

fn non_empty(map: BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

fn non_empty_ref(map: &Option<BTreeMap<String, String>>) -> Option<&BTreeMap<String, String>> {
    map.as_ref().filter(|m| !m.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expand_reads_block_fields() {
        let config = json!([{
            "name": "web",
            "namespace": "apps",
            "labels": {"app": "web"},
            "annotations": {}
        }]);

        let meta = expand_metadata(&config);
        assert_eq!(meta.name.as_deref(), Some("web"));
        assert_eq!(meta.namespace.as_deref(), Some("apps"));
        assert_eq!(meta.labels.unwrap().get("app"), Some(&"web".to_string()));
        assert!(meta.annotations.is_none());
    }

    #[test]
    fn expand_of_absent_block_is_default() {
        assert_eq!(expand_metadata(&Value::Null), ObjectMeta::default());
        assert_eq!(expand_metadata(&json!([])), ObjectMeta::default());
    }

    #[test]
    fn flatten_includes_server_assigned_fields() {
        let meta = ObjectMeta {
            name: Some("web".to_string()),
            namespace: Some("apps".to_string()),
            generation: Some(2),
            resource_version: Some("41".to_string()),
            uid: Some("d9607e19".to_string()),
            ..ObjectMeta::default()
        };

        let flat = flatten_metadata(&meta);
        let map = flat.as_array().unwrap()[0].as_object().unwrap();
        assert_eq!(map["name"], json!("web"));
        assert_eq!(map["generation"], json!(2));
        assert_eq!(map["resource_version"], json!("41"));
        assert_eq!(map["uid"], json!("d9607e19"));
        assert!(!map.contains_key("labels"));
    }

    #[test]
    fn round_trip_preserves_configured_fields() {
        let config = json!([{
            "name": "web",
            "labels": {"app": "web", "tier": "frontend"}
        }]);

        let flat = flatten_metadata(&expand_metadata(&config));
        let map = flat.as_array().unwrap()[0].as_object().unwrap();
        assert_eq!(map["name"], json!("web"));
        assert_eq!(map["labels"], json!({"app": "web", "tier": "frontend"}));
    }

    #[test]
    fn namespaced_block_adds_namespace() {
        let block = namespaced_metadata_block("stateful set");
        assert!(block.block.attributes.contains_key("namespace"));
        assert!(!metadata_block("cluster role binding")
            .block
            .attributes
            .contains_key("namespace"));
    }

    #[test]
    fn embedded_block_is_not_force_new() {
        let embedded = embedded_metadata_block("pod template");
        assert!(embedded.block.force_new_paths().is_empty());

        let top_level = metadata_block("cluster role binding");
        assert!(top_level
            .block
            .force_new_paths()
            .contains(&"name".to_string()));
    }
}
