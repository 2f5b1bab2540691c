//! Provider implementation.
//!
//! Dispatches host JSON-RPC requests onto the resource lifecycle handlers
//! and owns the configured Kubernetes client and the Tokio runtime the
//! async client calls execute on.

use crate::client::KubeClient;
use crate::resources::{all_resources, Resource, ResourceState};
use crate::schema::{
    Diagnostic, ProviderSchema, RpcRequest, RpcResponse, SchemaAttribute, SchemaBlock,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::runtime::Runtime;

/// Provider configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub config_path: Option<String>,
    pub config_context: Option<String>,
    pub insecure: Option<bool>,
}

/// Kubernetes Terraform provider
pub struct KubernetesProvider {
    client: Arc<RwLock<Option<KubeClient>>>,
    resources: HashMap<String, Box<dyn Resource>>,
    runtime: Runtime,
}

impl KubernetesProvider {
    pub fn new() -> anyhow::Result<Self> {
        let resources: HashMap<String, Box<dyn Resource>> = all_resources()
            .into_iter()
            .map(|r| (r.type_name().to_string(), r))
            .collect();

        Ok(Self {
            client: Arc::new(RwLock::new(None)),
            resources,
            runtime: Runtime::new()?,
        })
    }

    fn get_schema(&self) -> ProviderSchema {
        let provider_block = SchemaBlock::new()
            .with_attribute(
                "config_path",
                SchemaAttribute::string()
                    .with_description("Path to the kubeconfig file. Defaults to the ambient environment (KUBECONFIG, in-cluster service account).")
                    .optional(),
            )
            .with_attribute(
                "config_context",
                SchemaAttribute::string()
                    .with_description("Context to use from the kubeconfig file.")
                    .optional(),
            )
            .with_attribute(
                "insecure",
                SchemaAttribute::bool()
                    .with_description("Skip TLS verification of the API server certificate.")
                    .optional()
                    .with_default(serde_json::json!(false)),
            )
            .with_description("Kubernetes cluster provider");

        let mut schema = ProviderSchema::new(provider_block);
        for (name, resource) in &self.resources {
            schema = schema.with_resource(name, resource.schema());
        }
        schema
    }

    fn configure(&self, config: ProviderConfig) -> Vec<Diagnostic> {
        let connected = self.runtime.block_on(KubeClient::connect(
            config.config_path.as_deref(),
            config.config_context.as_deref(),
            config.insecure.unwrap_or(false),
        ));

        match connected {
            Ok(client) => {
                *self.client.write().unwrap() = Some(client);
                Vec::new()
            }
            Err(e) => vec![Diagnostic::error(&format!(
                "failed to configure kubernetes client: {}",
                e
            ))],
        }
    }

    fn get_client(&self) -> Result<KubeClient, Diagnostic> {
        self.client
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| Diagnostic::error("provider is not configured"))
    }

    fn get_resource(&self, params: &Value) -> Result<&dyn Resource, Diagnostic> {
        let type_name = params
            .get("type_name")
            .and_then(Value::as_str)
            .unwrap_or("");
        self.resources
            .get(type_name)
            .map(|resource| resource.as_ref())
            .ok_or_else(|| Diagnostic::error(&format!("unknown resource type: {}", type_name)))
    }

    /// Handle an RPC request
    pub fn handle_request(&self, input: &str) -> String {
        let request: RpcRequest = match serde_json::from_str(input) {
            Ok(r) => r,
            Err(e) => {
                return serde_json::to_string(&RpcResponse::error(
                    0,
                    -32700,
                    &format!("Parse error: {}", e),
                ))
                .unwrap_or_default();
            }
        };

        let response = match request.method.as_str() {
            "GetProviderSchema" => self.handle_get_schema(request.id),
            "ConfigureProvider" => self.handle_configure(request.id, &request.params),
            "ValidateResourceConfig" => self.handle_validate(request.id, &request.params),
            "PlanResourceChange" => self.handle_plan(request.id, &request.params),
            "ApplyResourceChange" => self.handle_apply(request.id, &request.params),
            "ReadResource" => self.handle_read(request.id, &request.params),
            "ImportResourceState" => self.handle_import(request.id, &request.params),
            "StopProvider" => RpcResponse::success(request.id, serde_json::json!({})),
            _ => RpcResponse::error(
                request.id,
                -32601,
                &format!("Method not found: {}", request.method),
            ),
        };

        serde_json::to_string(&response).unwrap_or_else(|e| {
            serde_json::to_string(&RpcResponse::error(
                request.id,
                -32603,
                &format!("Serialization error: {}", e),
            ))
            .unwrap_or_default()
        })
    }

    fn handle_get_schema(&self, id: i64) -> RpcResponse {
        let schema = self.get_schema();
        RpcResponse::success(id, serde_json::to_value(schema).unwrap_or_default())
    }

    fn handle_configure(&self, id: i64, params: &Value) -> RpcResponse {
        let config: ProviderConfig = params
            .get("config")
            .and_then(|c| serde_json::from_value(c.clone()).ok())
            .unwrap_or_default();

        let diagnostics = self.configure(config);
        RpcResponse::success(id, serde_json::json!({ "diagnostics": diagnostics }))
    }

    fn handle_validate(&self, id: i64, params: &Value) -> RpcResponse {
        match self.get_resource(params) {
            Ok(_) => RpcResponse::success(id, serde_json::json!({ "diagnostics": [] })),
            Err(diag) => diagnostics_response(id, vec![diag]),
        }
    }

    fn handle_plan(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.get_resource(params) {
            Ok(r) => r,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let proposed = state_param(params, "proposed_new_state").unwrap_or_default();
        let prior = state_param(params, "prior_state");

        match resource.plan_change(prior.as_ref(), &proposed) {
            Ok(planned) => RpcResponse::success(
                id,
                serde_json::json!({
                    "planned_state": planned.state.values,
                    "requires_replace": planned.requires_replace,
                    "diagnostics": []
                }),
            ),
            Err(diagnostics) => diagnostics_response(id, diagnostics),
        }
    }

    fn handle_apply(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.get_resource(params) {
            Ok(r) => r,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };
        let client = match self.get_client() {
            Ok(c) => c,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let planned = state_param(params, "planned_state");
        let prior = state_param(params, "prior_state");
        let is_destroy = params
            .get("planned_state")
            .map(Value::is_null)
            .unwrap_or(false);

        let result = self.runtime.block_on(async {
            if is_destroy {
                if let Some(prior) = prior {
                    resource.delete(&client, &prior).await.map(|_| None)
                } else {
                    Ok(None)
                }
            } else {
                let planned = planned.unwrap_or_default();
                match prior {
                    None => resource.create(&client, &planned).await.map(Some),
                    Some(prior) => resource.update(&client, &prior, &planned).await.map(Some),
                }
            }
        });

        match result {
            Ok(Some(new_state)) => RpcResponse::success(
                id,
                serde_json::json!({ "new_state": new_state.values, "diagnostics": [] }),
            ),
            Ok(None) => RpcResponse::success(
                id,
                serde_json::json!({ "new_state": null, "diagnostics": [] }),
            ),
            Err(diagnostics) => diagnostics_response(id, diagnostics),
        }
    }

    fn handle_read(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.get_resource(params) {
            Ok(r) => r,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };
        let client = match self.get_client() {
            Ok(c) => c,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let current = state_param(params, "current_state").unwrap_or_default();

        let result = self.runtime.block_on(async {
            // existence decides whether orphaned state gets dropped
            if !resource.exists(&client, &current).await? {
                return Ok(None);
            }
            resource.read(&client, &current).await.map(Some)
        });

        match result {
            Ok(Some(state)) => RpcResponse::success(
                id,
                serde_json::json!({ "new_state": state.values, "diagnostics": [] }),
            ),
            Ok(None) => RpcResponse::success(
                id,
                serde_json::json!({ "new_state": null, "diagnostics": [] }),
            ),
            Err(diagnostics) => diagnostics_response(id, diagnostics),
        }
    }

    fn handle_import(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.get_resource(params) {
            Ok(r) => r,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };
        let client = match self.get_client() {
            Ok(c) => c,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let resource_id = params.get("id").and_then(Value::as_str).unwrap_or("");
        // the given id passes through unchanged and keys a plain read
        let mut import_state = ResourceState::new();
        import_state.set("id", serde_json::json!(resource_id));

        let result = self
            .runtime
            .block_on(async { resource.read(&client, &import_state).await });

        match result {
            Ok(state) => RpcResponse::success(
                id,
                serde_json::json!({
                    "imported_resources": [{
                        "type_name": resource.type_name(),
                        "state": state.values
                    }],
                    "diagnostics": []
                }),
            ),
            Err(diagnostics) => diagnostics_response(id, diagnostics),
        }
    }
}

fn state_param(params: &Value, key: &str) -> Option<ResourceState> {
    params.get(key)?.as_object().map(|obj| {
        ResourceState::from_values(obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    })
}

fn diagnostics_response(id: i64, diagnostics: Vec<Diagnostic>) -> RpcResponse {
    RpcResponse::success(id, serde_json::json!({ "diagnostics": diagnostics }))
}
