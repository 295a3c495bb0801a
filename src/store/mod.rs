//! # Object Store
//!
//! Typed access to the cluster objects the operator reads and writes. The
//! [`ObjectStore`] trait is the seam between the gateway logic and the
//! Kubernetes API so that resolution, provisioning and admission flows can be
//! driven against an in-memory store in tests.
//!
//! [`StoreError::NotFound`] is kept apart from every other failure: callers
//! treat it as "does not exist yet" rather than as an error.

mod cluster;

pub use cluster::KubeObjectStore;

use crate::crd::{ApplicationGateway, ApplicationGatewayStatus};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("failed to {operation} {kind} {name}: {source}")]
    Api {
        operation: &'static str,
        kind: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    /// The request reached the store but could not be completed
    #[error("failed to {operation} {kind} {name}: {reason}")]
    Rejected {
        operation: &'static str,
        kind: String,
        name: String,
        reason: String,
    },
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Turns a NotFound lookup into `Ok(None)`
pub trait StoreResultExt<T> {
    fn found(self) -> Result<Option<T>, StoreError>;
}

impl<T> StoreResultExt<T> for Result<T, StoreError> {
    fn found(self) -> Result<Option<T>, StoreError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Severity of a published cluster event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
    Normal,
    Warning,
}

/// Namespaced object access used by the operator
///
/// Implementations must be safe for concurrent use: admission requests and
/// reconciles share one store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, StoreError>;

    /// Create a ConfigMap; `generateName` is honoured and the stored object returned
    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, StoreError>;

    async fn replace_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, StoreError>;

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, StoreError>;

    async fn replace_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, StoreError>;

    async fn create_service(&self, namespace: &str, service: &Service)
        -> Result<Service, StoreError>;

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, StoreError>;

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, StoreError>;

    async fn replace_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, StoreError>;

    /// Merge-patch the status subresource of a gateway
    async fn patch_gateway_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ApplicationGatewayStatus,
    ) -> Result<(), StoreError>;

    /// Publish a cluster event about a gateway.
    ///
    /// Events are fire-and-forget: failures are logged, never returned.
    async fn publish_event(
        &self,
        gateway: &ApplicationGateway,
        severity: EventSeverity,
        reason: &str,
        note: String,
    );
}

/// Read one data entry of a Secret as UTF-8
#[must_use]
pub fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    if let Some(bytes) = secret.data.as_ref().and_then(|data| data.get(key)) {
        return String::from_utf8(bytes.0.clone()).ok();
    }
    secret
        .string_data
        .as_ref()
        .and_then(|data| data.get(key))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    #[test]
    fn test_found_maps_not_found_to_none() {
        let missing: Result<(), StoreError> = Err(StoreError::NotFound {
            kind: "ConfigMap".into(),
            name: "gw".into(),
        });
        assert!(matches!(missing.found(), Ok(None)));

        let rejected: Result<(), StoreError> = Err(StoreError::Rejected {
            operation: "create",
            kind: "ConfigMap".into(),
            name: "gw".into(),
            reason: "quota exceeded".into(),
        });
        assert!(rejected.found().is_err());
    }

    #[test]
    fn test_secret_value_reads_data_and_string_data() {
        let secret = Secret {
            data: Some(BTreeMap::from([(
                "client_id".to_string(),
                ByteString(b"abc".to_vec()),
            )])),
            string_data: Some(BTreeMap::from([(
                "baUsername".to_string(),
                "admin".to_string(),
            )])),
            ..Default::default()
        };
        assert_eq!(secret_value(&secret, "client_id").as_deref(), Some("abc"));
        assert_eq!(secret_value(&secret, "baUsername").as_deref(), Some("admin"));
        assert_eq!(secret_value(&secret, "missing"), None);
    }
}
