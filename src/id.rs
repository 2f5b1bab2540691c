//! Resource identifier codec.
//!
//! Terraform correlates local state with remote objects through an opaque
//! string id. Namespaced resources use `<namespace>/<name>`; cluster-scoped
//! resources use the bare object name. The id is built once at creation and
//! parsed on every subsequent operation, before any network call.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("malformed resource id {0:?}, expected <namespace>/<name> or <name>")]
    Malformed(String),
}

pub fn build_id(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(namespace) => format!("{}/{}", namespace, name),
        None => name.to_string(),
    }
}

pub fn parse_id(id: &str) -> Result<(Option<String>, String), IdError> {
    if id.is_empty() {
        return Err(IdError::Malformed(id.to_string()));
    }
    match id.split_once('/') {
        None => Ok((None, id.to_string())),
        Some((namespace, name)) => {
            if namespace.is_empty() || name.is_empty() || name.contains('/') {
                return Err(IdError::Malformed(id.to_string()));
            }
            Ok((Some(namespace.to_string()), name.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_namespaced() {
        let id = build_id(Some("kube-system"), "web");
        assert_eq!(id, "kube-system/web");
        assert_eq!(
            parse_id(&id).unwrap(),
            (Some("kube-system".to_string()), "web".to_string())
        );
    }

    #[test]
    fn round_trip_cluster_scoped() {
        let id = build_id(None, "admin-binding");
        assert_eq!(id, "admin-binding");
        assert_eq!(parse_id(&id).unwrap(), (None, "admin-binding".to_string()));
    }

    #[test]
    fn rejects_malformed_ids() {
        for id in ["", "/", "ns/", "/name", "a/b/c"] {
            assert_eq!(parse_id(id), Err(IdError::Malformed(id.to_string())));
        }
    }
}
