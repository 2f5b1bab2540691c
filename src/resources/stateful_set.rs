//! The `kubernetes_stateful_set` resource.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{
    RollingUpdateStatefulSetStrategy, StatefulSet, StatefulSetSpec, StatefulSetUpdateStrategy,
};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec,
    PodTemplateSpec, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::client::{ClientError, KubeClient};
use crate::id::{build_id, parse_id};
use crate::metadata::{
    embedded_metadata_block, expand_metadata, flatten_metadata, namespaced_metadata_block,
};
use crate::resources::{Resource, ResourceResult, ResourceState};
use crate::schema::{
    AttributeType, Diagnostic, NestedBlock, ResourceSchema, SchemaAttribute, SchemaBlock,
};
use crate::value;

pub struct StatefulSetResource;

#[async_trait]
impl Resource for StatefulSetResource {
    fn type_name(&self) -> &str {
        "kubernetes_stateful_set"
    }

    fn schema(&self) -> ResourceSchema {
        let block = SchemaBlock::new()
            .with_attribute("id", SchemaAttribute::string().computed())
            .with_block("metadata", namespaced_metadata_block("stateful set"))
            .with_block("spec", NestedBlock::single(spec_block()).with_min_items(1))
            .with_description("Manages a Kubernetes stateful set");

        ResourceSchema::new(1, block)
    }

    async fn create(
        &self,
        client: &KubeClient,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let metadata = expand_metadata(planned.get("metadata").unwrap_or(&Value::Null));
        let namespace = metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());
        let set = StatefulSet {
            metadata,
            spec: Some(expand_stateful_set_spec(
                planned.get("spec").unwrap_or(&Value::Null),
            )),
            ..StatefulSet::default()
        };

        tracing::info!(name = ?set.metadata.name, %namespace, "creating new stateful set");
        let created = client
            .create_stateful_set(&namespace, &set)
            .await
            .map_err(|e| vec![Diagnostic::error(&e.to_string())])?;

        let name = created.metadata.name.clone().unwrap_or_default();
        let namespace = created.metadata.namespace.clone().unwrap_or(namespace);
        tracing::info!(%name, %namespace, "submitted new stateful set");

        let mut state = planned.clone();
        state.set("id", json!(build_id(Some(&namespace), &name)));
        self.read(client, &state).await
    }

    async fn read(
        &self,
        client: &KubeClient,
        current: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let (namespace, name) = stateful_set_id(current)?;

        tracing::info!(%name, %namespace, "reading stateful set");
        let set = client
            .get_stateful_set(&namespace, &name)
            .await
            .map_err(|e| vec![Diagnostic::error(&e.to_string())])?;

        let mut state = ResourceState::new();
        state.set("id", json!(build_id(Some(&namespace), &name)));
        state.set("metadata", flatten_metadata(&set.metadata));
        if let Some(spec) = &set.spec {
            state.set("spec", flatten_stateful_set_spec(spec, current));
        }
        Ok(state)
    }

    async fn exists(&self, client: &KubeClient, current: &ResourceState) -> ResourceResult<bool> {
        let (namespace, name) = stateful_set_id(current)?;

        tracing::info!(%name, %namespace, "checking stateful set");
        match client.get_stateful_set(&namespace, &name).await {
            Ok(_) => Ok(true),
            Err(ClientError::NotFound(_)) => Ok(false),
            Err(e) => Err(vec![Diagnostic::error(&e.to_string())]),
        }
    }

    async fn update(
        &self,
        client: &KubeClient,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let (namespace, name) = stateful_set_id(current)?;

        let live = client
            .get_stateful_set(&namespace, &name)
            .await
            .map_err(|e| vec![Diagnostic::error(&e.to_string())])?;

        let mut set = StatefulSet {
            metadata: expand_metadata(planned.get("metadata").unwrap_or(&Value::Null)),
            spec: Some(expand_stateful_set_spec(
                planned.get("spec").unwrap_or(&Value::Null),
            )),
            ..StatefulSet::default()
        };
        set.metadata.name = Some(name.clone());
        set.metadata.namespace = Some(namespace.clone());
        // replace requires the live object's resource version
        set.metadata.resource_version = live.metadata.resource_version.clone();

        tracing::info!(%name, %namespace, "replacing stateful set");
        client
            .replace_stateful_set(&namespace, &name, &set)
            .await
            .map_err(|e| vec![Diagnostic::error(&e.to_string())])?;

        let mut state = planned.clone();
        state.set("id", json!(build_id(Some(&namespace), &name)));
        self.read(client, &state).await
    }

    async fn delete(&self, client: &KubeClient, current: &ResourceState) -> ResourceResult<()> {
        let (namespace, name) = stateful_set_id(current)?;

        tracing::info!(%name, %namespace, "deleting stateful set");
        client
            .delete_stateful_set(&namespace, &name)
            .await
            .map_err(|e| vec![Diagnostic::error(&e.to_string())])?;

        tracing::info!(%name, %namespace, "stateful set deleted");
        Ok(())
    }
}

fn stateful_set_id(state: &ResourceState) -> Result<(String, String), Vec<Diagnostic>> {
    let id = state
        .get_string("id")
        .ok_or_else(|| vec![Diagnostic::error("stateful set id is not set")])?;
    match parse_id(&id) {
        Ok((Some(namespace), name)) => Ok((namespace, name)),
        Ok((None, _)) => Err(vec![Diagnostic::error(&format!(
            "malformed stateful set id {:?}, expected <namespace>/<name>",
            id
        ))]),
        Err(e) => Err(vec![Diagnostic::error(&e.to_string())]),
    }
}

// ============================================================================
// Schema blocks
// ============================================================================

fn spec_block() -> SchemaBlock {
    SchemaBlock::new()
        .with_attribute(
            "replicas",
            SchemaAttribute::number()
                .with_description("The desired number of replicas of the given template.")
                .optional()
                .with_default(json!(1)),
        )
        .with_attribute(
            "selector",
            SchemaAttribute::map(AttributeType::String)
                .with_description("A label query over pods that should match the replica count.")
                .required()
                .force_new(),
        )
        .with_attribute(
            "service_name",
            SchemaAttribute::string()
                .with_description("The name of the service that governs this stateful set.")
                .required()
                .force_new(),
        )
        .with_attribute(
            "pod_management_policy",
            SchemaAttribute::string()
                .with_description("Controls how pods are created during initial scale up: `OrderedReady` or `Parallel`.")
                .optional()
                .computed()
                .force_new(),
        )
        .with_attribute(
            "revision_history_limit",
            SchemaAttribute::number()
                .with_description("The maximum number of revisions maintained in the stateful set's revision history.")
                .optional()
                .computed(),
        )
        .with_block(
            "template",
            NestedBlock::single(template_block()).with_min_items(1),
        )
        .with_block("update_strategy", NestedBlock::single(update_strategy_block()))
        .with_block(
            "volume_claim_templates",
            NestedBlock::list(volume_claim_template_block()).force_new(),
        )
        .with_description("Spec defines the desired identities of pods in this set.")
}

fn template_block() -> SchemaBlock {
    SchemaBlock::new()
        .with_block("metadata", embedded_metadata_block("pod template"))
        .with_block(
            "spec",
            NestedBlock::single(pod_spec_block()).with_min_items(1),
        )
        .with_description("The object that describes the pod that will be created if insufficient replicas are detected.")
}

fn pod_spec_block() -> SchemaBlock {
    let env_block = SchemaBlock::new()
        .with_attribute("name", SchemaAttribute::string().required())
        .with_attribute("value", SchemaAttribute::string().optional());

    let port_block = SchemaBlock::new()
        .with_attribute(
            "container_port",
            SchemaAttribute::number()
                .with_description("Number of port to expose on the pod's IP address.")
                .required(),
        )
        .with_attribute("name", SchemaAttribute::string().optional())
        .with_attribute("protocol", SchemaAttribute::string().optional());

    let volume_mount_block = SchemaBlock::new()
        .with_attribute("name", SchemaAttribute::string().required())
        .with_attribute(
            "mount_path",
            SchemaAttribute::string()
                .with_description("Path within the container at which the volume should be mounted.")
                .required(),
        )
        .with_attribute("read_only", SchemaAttribute::bool().optional());

    let container_block = SchemaBlock::new()
        .with_attribute("name", SchemaAttribute::string().required())
        .with_attribute("image", SchemaAttribute::string().required())
        .with_attribute(
            "command",
            SchemaAttribute::list(AttributeType::String).optional(),
        )
        .with_attribute(
            "args",
            SchemaAttribute::list(AttributeType::String).optional(),
        )
        .with_attribute(
            "image_pull_policy",
            SchemaAttribute::string().optional().computed(),
        )
        .with_block("env", NestedBlock::list(env_block))
        .with_block("port", NestedBlock::list(port_block))
        .with_block("volume_mount", NestedBlock::list(volume_mount_block))
        .with_description("A container belonging to the pod.");

    SchemaBlock::new()
        .with_block(
            "container",
            NestedBlock::list(container_block).with_min_items(1),
        )
        .with_attribute(
            "service_account_name",
            SchemaAttribute::string().optional(),
        )
        .with_attribute(
            "restart_policy",
            SchemaAttribute::string().optional().computed(),
        )
        .with_attribute(
            "node_selector",
            SchemaAttribute::map(AttributeType::String).optional(),
        )
        .with_attribute(
            "termination_grace_period_seconds",
            SchemaAttribute::number().optional().computed(),
        )
}

fn update_strategy_block() -> SchemaBlock {
    let rolling_update_block = SchemaBlock::new().with_attribute(
        "partition",
        SchemaAttribute::number()
            .with_description("The ordinal at which the stateful set should be partitioned for updates.")
            .optional(),
    );

    SchemaBlock::new()
        .with_attribute(
            "type",
            SchemaAttribute::string()
                .with_description("Strategy type: `RollingUpdate` or `OnDelete`.")
                .optional()
                .computed(),
        )
        .with_block("rolling_update", NestedBlock::single(rolling_update_block))
        .with_description("The strategy used to replace pods when a revision is made to the template.")
}

fn volume_claim_template_block() -> SchemaBlock {
    let resources_block = SchemaBlock::new()
        .with_attribute(
            "limits",
            SchemaAttribute::map(AttributeType::String).optional(),
        )
        .with_attribute(
            "requests",
            SchemaAttribute::map(AttributeType::String).optional(),
        );

    let claim_spec_block = SchemaBlock::new()
        .with_attribute(
            "access_modes",
            SchemaAttribute::list(AttributeType::String)
                .with_description("The desired access modes the volume should have.")
                .required(),
        )
        .with_block("resources", NestedBlock::single(resources_block))
        .with_attribute(
            "selector",
            SchemaAttribute::map(AttributeType::String)
                .with_description("A label query over volumes to consider for binding.")
                .optional(),
        )
        .with_attribute("volume_name", SchemaAttribute::string().optional().computed())
        .with_attribute(
            "storage_class_name",
            SchemaAttribute::string().optional().computed(),
        );

    SchemaBlock::new()
        .with_block("metadata", embedded_metadata_block("volume claim template"))
        .with_block(
            "spec",
            NestedBlock::single(claim_spec_block).with_min_items(1),
        )
        .with_attribute(
            "use_default_provisioning",
            SchemaAttribute::bool()
                .with_description("Provision the claim through the cluster's default storage class.")
                .optional(),
        )
        .with_attribute(
            "wait_until_bound",
            SchemaAttribute::bool()
                .with_description("Whether to wait for the claim to reach `Bound` state.")
                .optional()
                .with_default(json!(true)),
        )
        .with_description("A claim that pods are allowed to reference. Cannot be updated.")
}

// ============================================================================
// Expanders
// ============================================================================

fn expand_stateful_set_spec(config: &Value) -> StatefulSetSpec {
    let Some(map) = value::first(config) else {
        return StatefulSetSpec::default();
    };
    StatefulSetSpec {
        replicas: value::i32_field(map, "replicas"),
        selector: LabelSelector {
            match_labels: non_empty_labels(value::string_map(map, "selector")),
            ..LabelSelector::default()
        },
        service_name: Some(value::str_field(map, "service_name").unwrap_or_default()),
        pod_management_policy: value::str_field(map, "pod_management_policy"),
        revision_history_limit: value::i32_field(map, "revision_history_limit"),
        template: expand_pod_template(map.get("template").unwrap_or(&Value::Null)),
        update_strategy: expand_update_strategy(map.get("update_strategy").unwrap_or(&Value::Null)),
        volume_claim_templates: Some(expand_volume_claim_templates(value::block_list(
            map,
            "volume_claim_templates",
        ))),
        ..StatefulSetSpec::default()
    }
}

fn expand_update_strategy(config: &Value) -> Option<StatefulSetUpdateStrategy> {
    let map = value::first(config)?;
    let type_ = value::str_field(map, "type");
    // rolling_update is only meaningful for the RollingUpdate strategy
    let rolling_update = if type_.as_deref() == Some("RollingUpdate") {
        map.get("rolling_update")
            .and_then(value::first)
            .map(expand_rolling_update)
    } else {
        None
    };
    Some(StatefulSetUpdateStrategy {
        rolling_update,
        type_,
    })
}

fn expand_rolling_update(map: &Map<String, Value>) -> RollingUpdateStatefulSetStrategy {
    RollingUpdateStatefulSetStrategy {
        partition: value::i32_field(map, "partition"),
        ..RollingUpdateStatefulSetStrategy::default()
    }
}

fn expand_pod_template(config: &Value) -> PodTemplateSpec {
    let Some(map) = value::first(config) else {
        return PodTemplateSpec::default();
    };
    PodTemplateSpec {
        metadata: Some(expand_metadata(map.get("metadata").unwrap_or(&Value::Null))),
        spec: map.get("spec").and_then(value::first).map(expand_pod_spec),
    }
}

fn expand_pod_spec(map: &Map<String, Value>) -> PodSpec {
    PodSpec {
        containers: expand_containers(value::block_list(map, "container")),
        service_account_name: value::str_field(map, "service_account_name"),
        restart_policy: value::str_field(map, "restart_policy"),
        node_selector: non_empty_labels(value::string_map(map, "node_selector")),
        termination_grace_period_seconds: value::i64_field(map, "termination_grace_period_seconds"),
        ..PodSpec::default()
    }
}

fn expand_containers(entries: Vec<&Map<String, Value>>) -> Vec<Container> {
    let mut containers = Vec::with_capacity(entries.len());
    for entry in entries {
        let env = expand_env(value::block_list(entry, "env"));
        let ports = expand_ports(value::block_list(entry, "port"));
        let volume_mounts = expand_volume_mounts(value::block_list(entry, "volume_mount"));
        containers.push(Container {
            name: value::str_field(entry, "name").unwrap_or_default(),
            image: value::str_field(entry, "image"),
            command: non_empty_strings(value::str_list(entry, "command")),
            args: non_empty_strings(value::str_list(entry, "args")),
            image_pull_policy: value::str_field(entry, "image_pull_policy"),
            env: (!env.is_empty()).then_some(env),
            ports: (!ports.is_empty()).then_some(ports),
            volume_mounts: (!volume_mounts.is_empty()).then_some(volume_mounts),
            ..Container::default()
        });
    }
    containers
}

fn expand_env(entries: Vec<&Map<String, Value>>) -> Vec<EnvVar> {
    let mut env = Vec::with_capacity(entries.len());
    for entry in entries {
        env.push(EnvVar {
            name: value::str_field(entry, "name").unwrap_or_default(),
            value: value::str_field(entry, "value"),
            ..EnvVar::default()
        });
    }
    env
}

fn expand_ports(entries: Vec<&Map<String, Value>>) -> Vec<ContainerPort> {
    let mut ports = Vec::with_capacity(entries.len());
    for entry in entries {
        ports.push(ContainerPort {
            container_port: value::i32_field(entry, "container_port").unwrap_or_default(),
            name: value::str_field(entry, "name"),
            protocol: value::str_field(entry, "protocol"),
            ..ContainerPort::default()
        });
    }
    ports
}

fn expand_volume_mounts(entries: Vec<&Map<String, Value>>) -> Vec<VolumeMount> {
    let mut mounts = Vec::with_capacity(entries.len());
    for entry in entries {
        mounts.push(VolumeMount {
            name: value::str_field(entry, "name").unwrap_or_default(),
            mount_path: value::str_field(entry, "mount_path").unwrap_or_default(),
            read_only: value::bool_field(entry, "read_only"),
            ..VolumeMount::default()
        });
    }
    mounts
}

fn expand_volume_claim_templates(entries: Vec<&Map<String, Value>>) -> Vec<PersistentVolumeClaim> {
    let mut claims = Vec::with_capacity(entries.len());
    for entry in entries {
        claims.push(PersistentVolumeClaim {
            metadata: expand_metadata(entry.get("metadata").unwrap_or(&Value::Null)),
            spec: Some(expand_volume_claim_spec(
                entry.get("spec").unwrap_or(&Value::Null),
            )),
            ..PersistentVolumeClaim::default()
        });
    }
    claims
}

fn expand_volume_claim_spec(config: &Value) -> PersistentVolumeClaimSpec {
    let Some(map) = value::first(config) else {
        return PersistentVolumeClaimSpec::default();
    };
    let selector_labels = value::string_map(map, "selector");
    PersistentVolumeClaimSpec {
        access_modes: non_empty_strings(value::str_list(map, "access_modes")),
        resources: map
            .get("resources")
            .and_then(value::first)
            .map(expand_volume_resources),
        selector: (!selector_labels.is_empty()).then(|| LabelSelector {
            match_labels: Some(selector_labels),
            ..LabelSelector::default()
        }),
        storage_class_name: value::str_field(map, "storage_class_name"),
        volume_name: value::str_field(map, "volume_name"),
        ..PersistentVolumeClaimSpec::default()
    }
}

fn expand_volume_resources(map: &Map<String, Value>) -> VolumeResourceRequirements {
    VolumeResourceRequirements {
        limits: quantity_map(map, "limits"),
        requests: quantity_map(map, "requests"),
    }
}

fn quantity_map(map: &Map<String, Value>, key: &str) -> Option<BTreeMap<String, Quantity>> {
    let entries = value::string_map(map, key);
    if entries.is_empty() {
        return None;
    }
    Some(entries.into_iter().map(|(k, v)| (k, Quantity(v))).collect())
}

fn non_empty_strings(values: Vec<String>) -> Option<Vec<String>> {
    (!values.is_empty()).then_some(values)
}

fn non_empty_labels(map: BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    (!map.is_empty()).then_some(map)
}

// ============================================================================
// Flatteners
// ============================================================================

fn flatten_stateful_set_spec(spec: &StatefulSetSpec, prior: &ResourceState) -> Value {
    let mut map = Map::new();
    if let Some(replicas) = spec.replicas {
        map.insert("replicas".to_string(), json!(replicas));
    }
    if let Some(policy) = &spec.pod_management_policy {
        map.insert("pod_management_policy".to_string(), json!(policy));
    }
    if let Some(limit) = spec.revision_history_limit {
        map.insert("revision_history_limit".to_string(), json!(limit));
    }
    map.insert("service_name".to_string(), json!(spec.service_name));
    if let Some(labels) = &spec.selector.match_labels {
        map.insert("selector".to_string(), json!(labels));
    }
    if let Some(strategy) = &spec.update_strategy {
        map.insert(
            "update_strategy".to_string(),
            flatten_update_strategy(strategy),
        );
    }
    map.insert("template".to_string(), flatten_pod_template(&spec.template));
    map.insert(
        "volume_claim_templates".to_string(),
        flatten_volume_claim_templates(spec.volume_claim_templates.as_deref().unwrap_or(&[]), prior),
    );
    Value::Array(vec![Value::Object(map)])
}

fn flatten_update_strategy(strategy: &StatefulSetUpdateStrategy) -> Value {
    let mut map = Map::new();
    if let Some(type_) = strategy.type_.as_ref().filter(|t| !t.is_empty()) {
        map.insert("type".to_string(), json!(type_));
    }
    if let Some(rolling_update) = &strategy.rolling_update {
        map.insert(
            "rolling_update".to_string(),
            flatten_rolling_update(rolling_update),
        );
    }
    Value::Array(vec![Value::Object(map)])
}

fn flatten_rolling_update(rolling_update: &RollingUpdateStatefulSetStrategy) -> Value {
    let mut map = Map::new();
    if let Some(partition) = rolling_update.partition {
        map.insert("partition".to_string(), json!(partition));
    }
    Value::Array(vec![Value::Object(map)])
}

fn flatten_pod_template(template: &PodTemplateSpec) -> Value {
    let mut map = Map::new();
    if let Some(metadata) = &template.metadata {
        map.insert("metadata".to_string(), flatten_metadata(metadata));
    }
    if let Some(spec) = &template.spec {
        map.insert("spec".to_string(), flatten_pod_spec(spec));
    }
    Value::Array(vec![Value::Object(map)])
}

fn flatten_pod_spec(spec: &PodSpec) -> Value {
    let mut map = Map::new();
    map.insert("container".to_string(), flatten_containers(&spec.containers));
    if let Some(name) = &spec.service_account_name {
        map.insert("service_account_name".to_string(), json!(name));
    }
    if let Some(policy) = &spec.restart_policy {
        map.insert("restart_policy".to_string(), json!(policy));
    }
    if let Some(selector) = spec.node_selector.as_ref().filter(|m| !m.is_empty()) {
        map.insert("node_selector".to_string(), json!(selector));
    }
    if let Some(grace) = spec.termination_grace_period_seconds {
        map.insert("termination_grace_period_seconds".to_string(), json!(grace));
    }
    Value::Array(vec![Value::Object(map)])
}

fn flatten_containers(containers: &[Container]) -> Value {
    let mut out = Vec::with_capacity(containers.len());
    for container in containers {
        let mut map = Map::new();
        map.insert("name".to_string(), json!(container.name));
        if let Some(image) = &container.image {
            map.insert("image".to_string(), json!(image));
        }
        if let Some(command) = container.command.as_ref().filter(|c| !c.is_empty()) {
            map.insert("command".to_string(), json!(command));
        }
        if let Some(args) = container.args.as_ref().filter(|a| !a.is_empty()) {
            map.insert("args".to_string(), json!(args));
        }
        if let Some(policy) = &container.image_pull_policy {
            map.insert("image_pull_policy".to_string(), json!(policy));
        }
        if let Some(env) = container.env.as_ref().filter(|e| !e.is_empty()) {
            map.insert("env".to_string(), flatten_env(env));
        }
        if let Some(ports) = container.ports.as_ref().filter(|p| !p.is_empty()) {
            map.insert("port".to_string(), flatten_ports(ports));
        }
        if let Some(mounts) = container.volume_mounts.as_ref().filter(|m| !m.is_empty()) {
            map.insert("volume_mount".to_string(), flatten_volume_mounts(mounts));
        }
        out.push(Value::Object(map));
    }
    Value::Array(out)
}

fn flatten_env(env: &[EnvVar]) -> Value {
    let mut out = Vec::with_capacity(env.len());
    for var in env {
        let mut map = Map::new();
        map.insert("name".to_string(), json!(var.name));
        if let Some(v) = &var.value {
            map.insert("value".to_string(), json!(v));
        }
        out.push(Value::Object(map));
    }
    Value::Array(out)
}

fn flatten_ports(ports: &[ContainerPort]) -> Value {
    let mut out = Vec::with_capacity(ports.len());
    for port in ports {
        let mut map = Map::new();
        map.insert("container_port".to_string(), json!(port.container_port));
        if let Some(name) = &port.name {
            map.insert("name".to_string(), json!(name));
        }
        if let Some(protocol) = &port.protocol {
            map.insert("protocol".to_string(), json!(protocol));
        }
        out.push(Value::Object(map));
    }
    Value::Array(out)
}

fn flatten_volume_mounts(mounts: &[VolumeMount]) -> Value {
    let mut out = Vec::with_capacity(mounts.len());
    for mount in mounts {
        let mut map = Map::new();
        map.insert("name".to_string(), json!(mount.name));
        map.insert("mount_path".to_string(), json!(mount.mount_path));
        if let Some(read_only) = mount.read_only {
            map.insert("read_only".to_string(), json!(read_only));
        }
        out.push(Value::Object(map));
    }
    Value::Array(out)
}

fn flatten_volume_claim_templates(
    claims: &[PersistentVolumeClaim],
    prior: &ResourceState,
) -> Value {
    let mut out = Vec::with_capacity(claims.len());
    for (i, claim) in claims.iter().enumerate() {
        let mut map = Map::new();
        map.insert("metadata".to_string(), flatten_metadata(&claim.metadata));
        if let Some(spec) = &claim.spec {
            map.insert("spec".to_string(), flatten_volume_claim_spec(spec));
        }
        // provisioning flags are provider-only and never echoed by the server
        for flag in ["use_default_provisioning", "wait_until_bound"] {
            let path = format!("spec.0.volume_claim_templates.{}.{}", i, flag);
            if let Some(v) = prior.value_at(&path) {
                map.insert(flag.to_string(), v.clone());
            }
        }
        out.push(Value::Object(map));
    }
    Value::Array(out)
}

fn flatten_volume_claim_spec(spec: &PersistentVolumeClaimSpec) -> Value {
    let mut map = Map::new();
    if let Some(modes) = spec.access_modes.as_ref().filter(|m| !m.is_empty()) {
        map.insert("access_modes".to_string(), json!(modes));
    }
    if let Some(resources) = &spec.resources {
        map.insert("resources".to_string(), flatten_volume_resources(resources));
    }
    if let Some(labels) = spec
        .selector
        .as_ref()
        .and_then(|s| s.match_labels.as_ref())
        .filter(|m| !m.is_empty())
    {
        map.insert("selector".to_string(), json!(labels));
    }
    if let Some(volume_name) = &spec.volume_name {
        map.insert("volume_name".to_string(), json!(volume_name));
    }
    if let Some(class) = &spec.storage_class_name {
        map.insert("storage_class_name".to_string(), json!(class));
    }
    Value::Array(vec![Value::Object(map)])
}

fn flatten_volume_resources(resources: &VolumeResourceRequirements) -> Value {
    let mut map = Map::new();
    if let Some(limits) = resources.limits.as_ref().filter(|m| !m.is_empty()) {
        map.insert("limits".to_string(), quantity_values(limits));
    }
    if let Some(requests) = resources.requests.as_ref().filter(|m| !m.is_empty()) {
        map.insert("requests".to_string(), quantity_values(requests));
    }
    Value::Array(vec![Value::Object(map)])
}

fn quantity_values(quantities: &BTreeMap<String, Quantity>) -> Value {
    Value::Object(
        quantities
            .iter()
            .map(|(k, q)| (k.clone(), json!(q.0)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec_config() -> Value {
        json!([{
            "replicas": 3,
            "selector": {"app": "web"},
            "service_name": "web",
            "template": [{
                "metadata": [{"labels": {"app": "web"}}],
                "spec": [{
                    "container": [{
                        "name": "web",
                        "image": "nginx:1.25",
                        "env": [{"name": "MODE", "value": "prod"}],
                        "port": [{"container_port": 80, "name": "http"}],
                        "volume_mount": [{"name": "data", "mount_path": "/var/lib/data"}]
                    }],
                    "termination_grace_period_seconds": 30
                }]
            }],
            "update_strategy": [{
                "type": "RollingUpdate",
                "rolling_update": [{"partition": 2}]
            }],
            "volume_claim_templates": [{
                "metadata": [{"name": "data"}],
                "spec": [{
                    "access_modes": ["ReadWriteOnce"],
                    "resources": [{"requests": {"storage": "10Gi"}}],
                    "storage_class_name": "standard"
                }],
                "wait_until_bound": true
            }]
        }])
    }

    #[test]
    fn schema_force_new_paths() {
        let schema = StatefulSetResource.schema();
        let paths = schema.block.force_new_paths();
        assert!(paths.contains(&"spec.selector".to_string()));
        assert!(paths.contains(&"spec.service_name".to_string()));
        assert!(paths.contains(&"spec.volume_claim_templates".to_string()));
        assert!(paths.contains(&"metadata.name".to_string()));
        assert!(paths.contains(&"metadata.namespace".to_string()));
        assert!(!paths.contains(&"spec.replicas".to_string()));
        // template metadata updates with the set, it must not force replacement
        assert!(!paths.contains(&"spec.template.metadata.name".to_string()));
    }

    #[test]
    fn expand_full_spec() {
        let spec = expand_stateful_set_spec(&spec_config());

        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.service_name, "web");
        assert_eq!(
            spec.selector.match_labels.as_ref().unwrap().get("app"),
            Some(&"web".to_string())
        );

        let container = &spec.template.spec.as_ref().unwrap().containers[0];
        assert_eq!(container.name, "web");
        assert_eq!(container.image.as_deref(), Some("nginx:1.25"));
        assert_eq!(container.env.as_ref().unwrap()[0].name, "MODE");
        assert_eq!(container.ports.as_ref().unwrap()[0].container_port, 80);
        assert_eq!(
            container.volume_mounts.as_ref().unwrap()[0].mount_path,
            "/var/lib/data"
        );

        let strategy = spec.update_strategy.as_ref().unwrap();
        assert_eq!(strategy.type_.as_deref(), Some("RollingUpdate"));
        assert_eq!(
            strategy.rolling_update.as_ref().unwrap().partition,
            Some(2)
        );

        let claims = spec.volume_claim_templates.as_ref().unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].metadata.name.as_deref(), Some("data"));
        let claim_spec = claims[0].spec.as_ref().unwrap();
        assert_eq!(
            claim_spec.access_modes.as_ref().unwrap(),
            &vec!["ReadWriteOnce".to_string()]
        );
        assert_eq!(
            claim_spec
                .resources
                .as_ref()
                .unwrap()
                .requests
                .as_ref()
                .unwrap()
                .get("storage"),
            Some(&Quantity("10Gi".to_string()))
        );
        assert_eq!(claim_spec.storage_class_name.as_deref(), Some("standard"));
    }

    #[test]
    fn expand_of_absent_spec_is_default() {
        assert_eq!(
            expand_stateful_set_spec(&Value::Null),
            StatefulSetSpec::default()
        );
    }

    #[test]
    fn rolling_update_requires_rolling_update_type() {
        let config = json!([{
            "type": "OnDelete",
            "rolling_update": [{"partition": 2}]
        }]);
        let strategy = expand_update_strategy(&config).unwrap();
        assert_eq!(strategy.type_.as_deref(), Some("OnDelete"));
        assert!(strategy.rolling_update.is_none());

        // no explicit type means the server default, not RollingUpdate config
        let config = json!([{"rolling_update": [{"partition": 2}]}]);
        let strategy = expand_update_strategy(&config).unwrap();
        assert!(strategy.type_.is_none());
        assert!(strategy.rolling_update.is_none());
    }

    #[test]
    fn flatten_round_trips_configured_fields() {
        let spec = expand_stateful_set_spec(&spec_config());

        let mut prior = ResourceState::new();
        prior.set("spec", spec_config());

        let flat = flatten_stateful_set_spec(&spec, &prior);
        let map = flat.as_array().unwrap()[0].as_object().unwrap();

        assert_eq!(map["replicas"], json!(3));
        assert_eq!(map["service_name"], json!("web"));
        assert_eq!(map["selector"], json!({"app": "web"}));

        let template = map["template"].as_array().unwrap()[0].as_object().unwrap();
        let pod_spec = template["spec"].as_array().unwrap()[0].as_object().unwrap();
        let container = pod_spec["container"].as_array().unwrap()[0]
            .as_object()
            .unwrap();
        assert_eq!(container["name"], json!("web"));
        assert_eq!(container["image"], json!("nginx:1.25"));
        assert_eq!(container["env"], json!([{"name": "MODE", "value": "prod"}]));
        assert_eq!(
            container["port"],
            json!([{"container_port": 80, "name": "http"}])
        );

        let claims = map["volume_claim_templates"].as_array().unwrap();
        let claim = claims[0].as_object().unwrap();
        // carried through from prior state, not from the server object
        assert_eq!(claim["wait_until_bound"], json!(true));
        assert!(!claim.contains_key("use_default_provisioning"));
        let claim_spec = claim["spec"].as_array().unwrap()[0].as_object().unwrap();
        assert_eq!(claim_spec["access_modes"], json!(["ReadWriteOnce"]));
        assert_eq!(
            claim_spec["resources"],
            json!([{"requests": {"storage": "10Gi"}}])
        );
    }

    #[test]
    fn flatten_includes_server_defaults() {
        let spec = StatefulSetSpec {
            replicas: Some(1),
            pod_management_policy: Some("OrderedReady".to_string()),
            revision_history_limit: Some(10),
            service_name: "web".to_string(),
            update_strategy: Some(StatefulSetUpdateStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateStatefulSetStrategy {
                    partition: Some(0),
                    ..RollingUpdateStatefulSetStrategy::default()
                }),
            }),
            ..StatefulSetSpec::default()
        };

        let flat = flatten_stateful_set_spec(&spec, &ResourceState::new());
        let map = flat.as_array().unwrap()[0].as_object().unwrap();
        assert_eq!(map["pod_management_policy"], json!("OrderedReady"));
        assert_eq!(map["revision_history_limit"], json!(10));
        assert_eq!(
            map["update_strategy"],
            json!([{"type": "RollingUpdate", "rolling_update": [{"partition": 0}]}])
        );
    }

    #[test]
    fn malformed_id_fails_locally() {
        let mut state = ResourceState::new();
        state.set("id", json!("just-a-name"));
        assert!(stateful_set_id(&state).is_err());

        state.set("id", json!("apps/web"));
        assert_eq!(
            stateful_set_id(&state).unwrap(),
            ("apps".to_string(), "web".to_string())
        );
    }
}
