//! Managed resource types.
//!
//! Each resource implements the [`Resource`] lifecycle contract: expand the
//! configured state into an API object, call the cluster, flatten the
//! response back into state, and keep the opaque id in sync.

mod cluster_role_binding;
mod stateful_set;

pub use cluster_role_binding::ClusterRoleBindingResource;
pub use stateful_set::StatefulSetResource;

use crate::client::KubeClient;
use crate::schema::{Diagnostic, ResourceSchema};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Result type for resource operations
pub type ResourceResult<T> = Result<T, Vec<Diagnostic>>;

/// One resource instance's attribute values, as stored in Terraform state.
#[derive(Debug, Clone, Default)]
pub struct ResourceState {
    pub values: HashMap<String, Value>,
}

impl ResourceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: HashMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .map(String::from)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// Value at a dotted path. Path segments index objects by key and lists
    /// by position; a non-numeric segment against a list reads through the
    /// first element, which is how single-nested blocks are stored.
    pub fn value_at(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.values.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Array(items) => match segment.parse::<usize>() {
                    Ok(index) => items.get(index)?,
                    Err(_) => items.first()?.get(segment)?,
                },
                Value::Object(map) => map.get(segment)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// A planned change and the force-new paths that make it a replacement.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    pub state: ResourceState,
    pub requires_replace: Vec<String>,
}

/// Resource trait
#[async_trait]
pub trait Resource: Send + Sync {
    /// Resource type name
    fn type_name(&self) -> &str;

    /// Get the schema for this resource
    fn schema(&self) -> ResourceSchema;

    /// Create the remote object, set the id, and return refreshed state.
    async fn create(
        &self,
        client: &KubeClient,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState>;

    /// Refresh state from the remote object named by the id.
    async fn read(
        &self,
        client: &KubeClient,
        current: &ResourceState,
    ) -> ResourceResult<ResourceState>;

    /// Whether the remote object named by the id still exists. Only a 404
    /// answer is `false`; any other failure is surfaced.
    async fn exists(&self, client: &KubeClient, current: &ResourceState) -> ResourceResult<bool>;

    /// Update the remote object in place.
    async fn update(
        &self,
        client: &KubeClient,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState>;

    /// Delete the remote object named by the id.
    async fn delete(&self, client: &KubeClient, current: &ResourceState) -> ResourceResult<()>;

    /// Plan a change. Any differing value at a schema force-new path marks
    /// the plan as a replacement.
    fn plan_change(
        &self,
        prior: Option<&ResourceState>,
        proposed: &ResourceState,
    ) -> ResourceResult<PlannedChange> {
        let mut requires_replace = Vec::new();
        if let Some(prior) = prior {
            for path in self.schema().block.force_new_paths() {
                if prior.value_at(&path) != proposed.value_at(&path) {
                    requires_replace.push(path);
                }
            }
        }
        Ok(PlannedChange {
            state: proposed.clone(),
            requires_replace,
        })
    }
}

/// All resources this provider manages.
pub fn all_resources() -> Vec<Box<dyn Resource>> {
    vec![
        Box::new(ClusterRoleBindingResource),
        Box::new(StatefulSetResource),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_getters() {
        let mut state = ResourceState::new();
        state.set("id", json!("apps/web"));
        state.set("replicas", json!(3));

        assert_eq!(state.get_string("id"), Some("apps/web".to_string()));
        assert_eq!(state.get("replicas"), Some(&json!(3)));
        assert!(state.get_string("missing").is_none());
    }

    #[test]
    fn value_at_walks_blocks_and_lists() {
        let mut state = ResourceState::new();
        state.set(
            "spec",
            json!([{
                "service_name": "web",
                "volume_claim_templates": [
                    {"wait_until_bound": true},
                    {"wait_until_bound": false}
                ]
            }]),
        );

        assert_eq!(state.value_at("spec.service_name"), Some(&json!("web")));
        assert_eq!(
            state.value_at("spec.0.volume_claim_templates.1.wait_until_bound"),
            Some(&json!(false))
        );
        assert!(state.value_at("spec.missing").is_none());
        assert!(state.value_at("spec.0.volume_claim_templates.7").is_none());
    }

    #[test]
    fn registry_has_both_resources() {
        let names: Vec<String> = all_resources()
            .iter()
            .map(|r| r.type_name().to_string())
            .collect();
        assert!(names.contains(&"kubernetes_cluster_role_binding".to_string()));
        assert!(names.contains(&"kubernetes_stateful_set".to_string()));
    }
}
