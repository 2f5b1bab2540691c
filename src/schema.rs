//! Terraform Schema Types
//!
//! The schema model the provider reports to the host: attribute types,
//! required/optional/computed/force-new flags, nested blocks, and the
//! JSON-RPC envelope and diagnostics used across the host interface.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attribute type for schema
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Number,
    Bool,
    List(Box<AttributeType>),
    Map(Box<AttributeType>),
}

/// Schema attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaAttribute {
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub computed: bool,
    #[serde(default)]
    pub sensitive: bool,
    /// Any change to this attribute requires destroying and recreating the
    /// resource instead of updating it in place.
    #[serde(default)]
    pub force_new: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl SchemaAttribute {
    fn new(attr_type: AttributeType) -> Self {
        Self {
            attr_type,
            description: None,
            required: false,
            optional: false,
            computed: false,
            sensitive: false,
            force_new: false,
            default: None,
        }
    }

    pub fn string() -> Self {
        Self::new(AttributeType::String)
    }

    pub fn number() -> Self {
        Self::new(AttributeType::Number)
    }

    pub fn bool() -> Self {
        Self::new(AttributeType::Bool)
    }

    pub fn list(element_type: AttributeType) -> Self {
        Self::new(AttributeType::List(Box::new(element_type)))
    }

    pub fn map(element_type: AttributeType) -> Self {
        Self::new(AttributeType::Map(Box::new(element_type)))
    }

    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self.optional = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self.required = false;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// Block type for nested blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaBlock {
    pub attributes: HashMap<String, SchemaAttribute>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub blocks: HashMap<String, NestedBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SchemaBlock {
    pub fn new() -> Self {
        Self {
            attributes: HashMap::new(),
            blocks: HashMap::new(),
            description: None,
        }
    }

    pub fn with_attribute(mut self, name: &str, attr: SchemaAttribute) -> Self {
        self.attributes.insert(name.to_string(), attr);
        self
    }

    pub fn with_block(mut self, name: &str, block: NestedBlock) -> Self {
        self.blocks.insert(name.to_string(), block);
        self
    }

    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }

    /// All paths in this block whose change forces resource replacement.
    ///
    /// A block flagged force-new contributes its own path and is compared
    /// wholesale; otherwise nested force-new attributes are reported
    /// individually as `block.attribute` paths.
    pub fn force_new_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_force_new_paths("", &mut paths);
        paths.sort();
        paths
    }

    fn collect_force_new_paths(&self, prefix: &str, paths: &mut Vec<String>) {
        for (name, attr) in &self.attributes {
            if attr.force_new {
                paths.push(join_path(prefix, name));
            }
        }
        for (name, nested) in &self.blocks {
            let path = join_path(prefix, name);
            if nested.force_new {
                paths.push(path);
            } else {
                nested.block.collect_force_new_paths(&path, paths);
            }
        }
    }
}

impl Default for SchemaBlock {
    fn default() -> Self {
        Self::new()
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Nested block type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedBlock {
    pub nesting_mode: NestingMode,
    pub block: SchemaBlock,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<i64>,
    #[serde(default)]
    pub force_new: bool,
}

impl NestedBlock {
    /// A block that appears at most once.
    pub fn single(block: SchemaBlock) -> Self {
        Self {
            nesting_mode: NestingMode::Single,
            block,
            min_items: None,
            max_items: Some(1),
            force_new: false,
        }
    }

    /// A block that may repeat, in configuration order.
    pub fn list(block: SchemaBlock) -> Self {
        Self {
            nesting_mode: NestingMode::List,
            block,
            min_items: None,
            max_items: None,
            force_new: false,
        }
    }

    pub fn with_min_items(mut self, min: i64) -> Self {
        self.min_items = Some(min);
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NestingMode {
    Single,
    List,
}

/// Resource schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSchema {
    pub version: i64,
    pub block: SchemaBlock,
}

impl ResourceSchema {
    pub fn new(version: i64, block: SchemaBlock) -> Self {
        Self { version, block }
    }
}

/// Provider schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSchema {
    pub provider: SchemaBlock,
    pub resource_schemas: HashMap<String, ResourceSchema>,
}

impl ProviderSchema {
    pub fn new(provider: SchemaBlock) -> Self {
        Self {
            provider,
            resource_schemas: HashMap::new(),
        }
    }

    pub fn with_resource(mut self, name: &str, schema: ResourceSchema) -> Self {
        self.resource_schemas.insert(name.to_string(), schema);
        self
    }
}

// ============================================================================
// Host protocol messages
// ============================================================================

/// JSON-RPC request
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: i64,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error
#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcResponse {
    pub fn success(id: i64, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: i64, code: i32, message: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.to_string(),
            }),
        }
    }
}

/// Diagnostic severity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

/// Diagnostic message surfaced to the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: &str) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.to_string(),
            detail: None,
        }
    }

    #[allow(dead_code)]
    pub fn warning(summary: &str) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.to_string(),
            detail: None,
        }
    }

    #[allow(dead_code)]
    pub fn with_detail(mut self, detail: &str) -> Self {
        self.detail = Some(detail.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_builder_flags() {
        let attr = SchemaAttribute::string()
            .with_description("role name")
            .required()
            .force_new();

        assert!(attr.required);
        assert!(!attr.optional);
        assert!(attr.force_new);
        assert_eq!(attr.description, Some("role name".to_string()));
    }

    #[test]
    fn block_builder() {
        let block = SchemaBlock::new()
            .with_attribute("name", SchemaAttribute::string().required())
            .with_attribute("replicas", SchemaAttribute::number().optional())
            .with_description("test block");

        assert!(block.attributes.contains_key("name"));
        assert!(block.attributes.contains_key("replicas"));
        assert_eq!(block.description, Some("test block".to_string()));
    }

    #[test]
    fn force_new_paths_cover_attributes_and_blocks() {
        let nested = SchemaBlock::new()
            .with_attribute("service_name", SchemaAttribute::string().required().force_new())
            .with_attribute("replicas", SchemaAttribute::number().optional());
        let block = SchemaBlock::new()
            .with_attribute("id", SchemaAttribute::string().computed())
            .with_block("spec", NestedBlock::single(nested))
            .with_block(
                "subject",
                NestedBlock::list(SchemaBlock::new()).force_new(),
            );

        assert_eq!(
            block.force_new_paths(),
            vec!["spec.service_name".to_string(), "subject".to_string()]
        );
    }

    #[test]
    fn force_new_block_hides_inner_paths() {
        let inner = SchemaBlock::new()
            .with_attribute("kind", SchemaAttribute::string().required().force_new());
        let block = SchemaBlock::new().with_block("role_ref", NestedBlock::single(inner).force_new());

        assert_eq!(block.force_new_paths(), vec!["role_ref".to_string()]);
    }

    #[test]
    fn rpc_response_success() {
        let response = RpcResponse::success(1, serde_json::json!({"status": "ok"}));
        assert!(response.result.is_some());
        assert!(response.error.is_none());
    }

    #[test]
    fn rpc_response_error() {
        let response = RpcResponse::error(1, -32600, "Invalid request");
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, -32600);
    }
}
