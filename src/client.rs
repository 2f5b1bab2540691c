//! Kubernetes API client for the provider.
//!
//! Wraps a [`kube::Client`] with the per-resource calls the lifecycle
//! handlers need. Errors pass through unmodified except HTTP 404, which is
//! translated to [`ClientError::NotFound`] so existence checks can answer
//! without an error.

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use kube::api::{DeleteParams, PostParams};
use kube::config::{Config, KubeConfigOptions, Kubeconfig};
use kube::{Api, Client};
use thiserror::Error;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),
    #[error("unable to infer cluster configuration: {0}")]
    InferConfig(#[from] kube::config::InferConfigError),
    #[error(transparent)]
    Kube(#[from] kube::Error),
    #[error("{0} not found")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Kubernetes API client handle, one per configured provider.
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    /// Connect using an explicit kubeconfig, or fall back to the
    /// environment (`KUBECONFIG`, in-cluster service account).
    pub async fn connect(
        config_path: Option<&str>,
        config_context: Option<&str>,
        insecure: bool,
    ) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)?;
                let options = KubeConfigOptions {
                    context: config_context.map(String::from),
                    ..KubeConfigOptions::default()
                };
                Config::from_custom_kubeconfig(kubeconfig, &options).await?
            }
            None => Config::infer().await?,
        };
        if insecure {
            config.accept_invalid_certs = true;
        }
        Ok(Self {
            client: Client::try_from(config)?,
        })
    }

    fn cluster_role_bindings(&self) -> Api<ClusterRoleBinding> {
        Api::all(self.client.clone())
    }

    fn stateful_sets(&self, namespace: &str) -> Api<StatefulSet> {
        Api::namespaced(self.client.clone(), namespace)
    }

    // Cluster role binding operations

    pub async fn create_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> Result<ClusterRoleBinding> {
        Ok(self
            .cluster_role_bindings()
            .create(&PostParams::default(), binding)
            .await?)
    }

    pub async fn get_cluster_role_binding(&self, name: &str) -> Result<ClusterRoleBinding> {
        self.cluster_role_bindings()
            .get(name)
            .await
            .map_err(|err| not_found(err, format!("cluster role binding {}", name)))
    }

    pub async fn delete_cluster_role_binding(&self, name: &str) -> Result<()> {
        self.cluster_role_bindings()
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|err| not_found(err, format!("cluster role binding {}", name)))
    }

    // Stateful set operations

    pub async fn create_stateful_set(
        &self,
        namespace: &str,
        set: &StatefulSet,
    ) -> Result<StatefulSet> {
        Ok(self
            .stateful_sets(namespace)
            .create(&PostParams::default(), set)
            .await?)
    }

    pub async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<StatefulSet> {
        self.stateful_sets(namespace)
            .get(name)
            .await
            .map_err(|err| not_found(err, format!("stateful set {}/{}", namespace, name)))
    }

    pub async fn replace_stateful_set(
        &self,
        namespace: &str,
        name: &str,
        set: &StatefulSet,
    ) -> Result<StatefulSet> {
        self.stateful_sets(namespace)
            .replace(name, &PostParams::default(), set)
            .await
            .map_err(|err| not_found(err, format!("stateful set {}/{}", namespace, name)))
    }

    pub async fn delete_stateful_set(&self, namespace: &str, name: &str) -> Result<()> {
        self.stateful_sets(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|err| not_found(err, format!("stateful set {}/{}", namespace, name)))
    }
}

fn not_found(err: kube::Error, what: String) -> ClientError {
    match err {
        kube::Error::Api(response) if response.code == 404 => ClientError::NotFound(what),
        other => ClientError::Kube(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "server said no".to_string(),
            reason: "Oops".to_string(),
            code,
        })
    }

    #[test]
    fn translates_404_to_not_found() {
        let err = not_found(api_error(404), "cluster role binding admin".to_string());
        assert!(matches!(err, ClientError::NotFound(_)));
        assert_eq!(err.to_string(), "cluster role binding admin not found");
    }

    #[test]
    fn other_api_errors_pass_through() {
        let err = not_found(api_error(403), "cluster role binding admin".to_string());
        match err {
            ClientError::Kube(kube::Error::Api(response)) => {
                assert_eq!(response.code, 403);
                assert_eq!(response.message, "server said no");
            }
            other => panic!("unexpected translation: {:?}", other),
        }
    }
}
