//! The `kubernetes_cluster_role_binding` resource.
//!
//! Binds a cluster role to a list of subjects. The binding is immutable on
//! the authorization side, so `role_ref` and `subject` are force-new and
//! in-place update is refused.

use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleRef, Subject};
use serde_json::{json, Map, Value};

use crate::client::{ClientError, KubeClient};
use crate::id::{build_id, parse_id};
use crate::metadata::{expand_metadata, flatten_metadata, metadata_block};
use crate::resources::{Resource, ResourceResult, ResourceState};
use crate::schema::{Diagnostic, NestedBlock, ResourceSchema, SchemaAttribute, SchemaBlock};
use crate::value;

pub struct ClusterRoleBindingResource;

#[async_trait]
impl Resource for ClusterRoleBindingResource {
    fn type_name(&self) -> &str {
        "kubernetes_cluster_role_binding"
    }

    fn schema(&self) -> ResourceSchema {
        let role_ref_block = SchemaBlock::new()
            .with_attribute(
                "api_group",
                SchemaAttribute::string()
                    .with_description("The API group of the referenced role. Defaults to `rbac.authorization.k8s.io`.")
                    .optional(),
            )
            .with_attribute(
                "kind",
                SchemaAttribute::string()
                    .with_description("The kind of the role being referenced, normally `ClusterRole`.")
                    .required(),
            )
            .with_attribute(
                "name",
                SchemaAttribute::string()
                    .with_description("Name of the role being referenced.")
                    .required(),
            )
            .with_description("The role to bind the subjects to. Cannot be updated.");

        let subject_block = SchemaBlock::new()
            .with_attribute(
                "api_group",
                SchemaAttribute::string()
                    .with_description("The API group of the subject. Empty for `ServiceAccount` subjects, `rbac.authorization.k8s.io` for `User` and `Group` subjects.")
                    .optional(),
            )
            .with_attribute(
                "kind",
                SchemaAttribute::string()
                    .with_description("Kind of the subject: `User`, `Group`, or `ServiceAccount`.")
                    .required(),
            )
            .with_attribute(
                "name",
                SchemaAttribute::string()
                    .with_description("Name of the subject.")
                    .required(),
            )
            .with_attribute(
                "namespace",
                SchemaAttribute::string()
                    .with_description("Namespace of the subject. Only meaningful for namespaced subjects such as `ServiceAccount`.")
                    .optional(),
            )
            .with_description("A subject the role applies to. Cannot be updated.");

        let block = SchemaBlock::new()
            .with_attribute("id", SchemaAttribute::string().computed())
            .with_block("metadata", metadata_block("cluster role binding"))
            .with_block("role_ref", NestedBlock::single(role_ref_block).with_min_items(1).force_new())
            .with_block("subject", NestedBlock::list(subject_block).with_min_items(1).force_new())
            .with_description("Manages a Kubernetes cluster role binding");

        ResourceSchema::new(1, block)
    }

    async fn create(
        &self,
        client: &KubeClient,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let binding = ClusterRoleBinding {
            metadata: expand_metadata(planned.get("metadata").unwrap_or(&Value::Null)),
            role_ref: expand_role_ref(planned.get("role_ref").unwrap_or(&Value::Null)),
            subjects: Some(expand_subjects(subject_entries(planned))),
        };

        tracing::info!(name = ?binding.metadata.name, "creating new cluster role binding");
        let created = client
            .create_cluster_role_binding(&binding)
            .await
            .map_err(|e| vec![Diagnostic::error(&e.to_string())])?;

        let name = created.metadata.name.clone().unwrap_or_default();
        tracing::info!(%name, "submitted new cluster role binding");

        let mut state = planned.clone();
        state.set("id", json!(build_id(None, &name)));
        self.read(client, &state).await
    }

    async fn read(
        &self,
        client: &KubeClient,
        current: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let (_, name) = binding_id(current)?;

        tracing::info!(%name, "reading cluster role binding");
        let binding = client
            .get_cluster_role_binding(&name)
            .await
            .map_err(|e| vec![Diagnostic::error(&e.to_string())])?;

        let mut state = ResourceState::new();
        state.set("id", json!(build_id(None, &name)));
        state.set("metadata", flatten_metadata(&binding.metadata));
        state.set("role_ref", flatten_role_ref(&binding.role_ref));
        state.set(
            "subject",
            flatten_subjects(binding.subjects.as_deref().unwrap_or(&[])),
        );
        Ok(state)
    }

    async fn exists(&self, client: &KubeClient, current: &ResourceState) -> ResourceResult<bool> {
        let (_, name) = binding_id(current)?;

        tracing::info!(%name, "checking cluster role binding");
        match client.get_cluster_role_binding(&name).await {
            Ok(_) => Ok(true),
            Err(ClientError::NotFound(_)) => Ok(false),
            Err(e) => Err(vec![Diagnostic::error(&e.to_string())]),
        }
    }

    async fn update(
        &self,
        _client: &KubeClient,
        _current: &ResourceState,
        _planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        Err(vec![Diagnostic::error(
            "cluster role bindings cannot be updated in place; role_ref and subject changes force a new resource",
        )])
    }

    async fn delete(&self, client: &KubeClient, current: &ResourceState) -> ResourceResult<()> {
        let (_, name) = binding_id(current)?;

        tracing::info!(%name, "deleting cluster role binding");
        client
            .delete_cluster_role_binding(&name)
            .await
            .map_err(|e| vec![Diagnostic::error(&e.to_string())])?;

        tracing::info!(%name, "cluster role binding deleted");
        Ok(())
    }
}

fn binding_id(state: &ResourceState) -> Result<(Option<String>, String), Vec<Diagnostic>> {
    let id = state
        .get_string("id")
        .ok_or_else(|| vec![Diagnostic::error("cluster role binding id is not set")])?;
    parse_id(&id).map_err(|e| vec![Diagnostic::error(&e.to_string())])
}

fn subject_entries(state: &ResourceState) -> &[Value] {
    state
        .get("subject")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn expand_role_ref(config: &Value) -> RoleRef {
    let Some(map) = value::first(config) else {
        return RoleRef::default();
    };
    RoleRef {
        api_group: value::str_field(map, "api_group").unwrap_or_default(),
        kind: value::str_field(map, "kind").unwrap_or_default(),
        name: value::str_field(map, "name").unwrap_or_default(),
    }
}

fn expand_subjects(entries: &[Value]) -> Vec<Subject> {
    let mut subjects = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(map) = value::obj(entry) else {
            continue;
        };
        subjects.push(Subject {
            api_group: value::str_field(map, "api_group"),
            kind: value::str_field(map, "kind").unwrap_or_default(),
            name: value::str_field(map, "name").unwrap_or_default(),
            namespace: value::str_field(map, "namespace"),
        });
    }
    subjects
}

fn flatten_role_ref(role_ref: &RoleRef) -> Value {
    let mut map = Map::new();
    if !role_ref.api_group.is_empty() {
        map.insert("api_group".to_string(), json!(role_ref.api_group));
    }
    map.insert("kind".to_string(), json!(role_ref.kind));
    map.insert("name".to_string(), json!(role_ref.name));
    Value::Array(vec![Value::Object(map)])
}

fn flatten_subjects(subjects: &[Subject]) -> Value {
    let mut out = Vec::with_capacity(subjects.len());
    for subject in subjects {
        let mut map = Map::new();
        if let Some(api_group) = subject.api_group.as_ref().filter(|g| !g.is_empty()) {
            map.insert("api_group".to_string(), json!(api_group));
        }
        map.insert("kind".to_string(), json!(subject.kind));
        map.insert("name".to_string(), json!(subject.name));
        // namespace stays in state even when empty, unlike api_group
        map.insert(
            "namespace".to_string(),
            json!(subject.namespace.clone().unwrap_or_default()),
        );
        out.push(Value::Object(map));
    }
    Value::Array(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_marks_binding_blocks_force_new() {
        let schema = ClusterRoleBindingResource.schema();
        assert!(schema.block.blocks.contains_key("metadata"));
        let paths = schema.block.force_new_paths();
        assert!(paths.contains(&"role_ref".to_string()));
        assert!(paths.contains(&"subject".to_string()));
    }

    #[test]
    fn expand_role_ref_fields() {
        let config = json!([{
            "api_group": "rbac.authorization.k8s.io",
            "kind": "ClusterRole",
            "name": "cluster-admin"
        }]);

        let role_ref = expand_role_ref(&config);
        assert_eq!(role_ref.api_group, "rbac.authorization.k8s.io");
        assert_eq!(role_ref.kind, "ClusterRole");
        assert_eq!(role_ref.name, "cluster-admin");
    }

    #[test]
    fn expand_subjects_of_empty_list_is_empty_not_absent() {
        assert_eq!(expand_subjects(&[]), Vec::<Subject>::new());
    }

    #[test]
    fn expand_subjects_keeps_order() {
        let entries = vec![
            json!({"kind": "User", "name": "alice", "api_group": "rbac.authorization.k8s.io"}),
            json!({"kind": "ServiceAccount", "name": "deployer", "namespace": "ci"}),
        ];

        let subjects = expand_subjects(&entries);
        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[0].kind, "User");
        assert_eq!(
            subjects[0].api_group.as_deref(),
            Some("rbac.authorization.k8s.io")
        );
        assert!(subjects[0].namespace.is_none());
        assert_eq!(subjects[1].name, "deployer");
        assert_eq!(subjects[1].namespace.as_deref(), Some("ci"));
    }

    #[test]
    fn flatten_subjects_omits_empty_api_group_but_keeps_namespace() {
        let subjects = vec![Subject {
            api_group: None,
            kind: "User".to_string(),
            name: "alice".to_string(),
            namespace: None,
        }];

        let flat = flatten_subjects(&subjects);
        let map = flat.as_array().unwrap()[0].as_object().unwrap();
        assert!(!map.contains_key("api_group"));
        assert_eq!(map["kind"], json!("User"));
        assert_eq!(map["namespace"], json!(""));
    }

    #[test]
    fn subject_round_trip_preserves_fields() {
        let entries = vec![json!({
            "api_group": "rbac.authorization.k8s.io",
            "kind": "Group",
            "name": "admins",
            "namespace": ""
        })];

        let flat = flatten_subjects(&expand_subjects(&entries));
        let map = flat.as_array().unwrap()[0].as_object().unwrap();
        assert_eq!(map["api_group"], json!("rbac.authorization.k8s.io"));
        assert_eq!(map["kind"], json!("Group"));
        assert_eq!(map["name"], json!("admins"));
        assert_eq!(map["namespace"], json!(""));
    }

    #[test]
    fn role_ref_round_trip() {
        let config = json!([{
            "api_group": "rbac.authorization.k8s.io",
            "kind": "ClusterRole",
            "name": "view"
        }]);

        let flat = flatten_role_ref(&expand_role_ref(&config));
        assert_eq!(flat, config);
    }

    #[test]
    fn plan_marks_role_ref_change_as_replacement() {
        let resource = ClusterRoleBindingResource;
        let mut prior = ResourceState::new();
        prior.set("role_ref", json!([{"kind": "ClusterRole", "name": "view"}]));
        prior.set("subject", json!([{"kind": "User", "name": "alice"}]));
        let mut proposed = prior.clone();
        proposed.set("role_ref", json!([{"kind": "ClusterRole", "name": "edit"}]));

        let plan = resource.plan_change(Some(&prior), &proposed).unwrap();
        assert_eq!(plan.requires_replace, vec!["role_ref".to_string()]);
    }
}
