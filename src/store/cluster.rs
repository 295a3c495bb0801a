//! Kubernetes API backed [`ObjectStore`]

use super::{EventSeverity, ObjectStore, StoreError};
use crate::constants::OPERATOR_NAME;
use crate::crd::{ApplicationGateway, ApplicationGatewayStatus};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, warn};

pub struct KubeObjectStore {
    client: Client,
    recorder: Recorder,
}

impl std::fmt::Debug for KubeObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectStore").finish_non_exhaustive()
    }
}

impl KubeObjectStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: OPERATOR_NAME.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client.clone(), reporter),
            client,
        }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get<K>(&self, namespace: &str, name: &str) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        self.api::<K>(namespace)
            .get(name)
            .await
            .map_err(|e| map_error("get", K::kind(&()).as_ref(), name, e))
    }

    async fn create<K>(&self, namespace: &str, object: &K) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
    {
        let name = display_name(object);
        self.api::<K>(namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|e| map_error("create", K::kind(&()).as_ref(), &name, e))
    }

    async fn replace<K>(&self, namespace: &str, object: &K) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
    {
        let name = object.name_any();
        self.api::<K>(namespace)
            .replace(&name, &PostParams::default(), object)
            .await
            .map_err(|e| map_error("update", K::kind(&()).as_ref(), &name, e))
    }

    async fn delete<K>(&self, namespace: &str, name: &str) -> Result<(), StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_error("delete", K::kind(&()).as_ref(), name, e))
    }
}

fn display_name<K: Resource>(object: &K) -> String {
    let meta = object.meta();
    meta.name
        .clone()
        .or_else(|| meta.generate_name.as_ref().map(|prefix| format!("{prefix}*")))
        .unwrap_or_default()
}

fn map_error(operation: &'static str, kind: &str, name: &str, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        other => StoreError::Api {
            operation,
            kind: kind.to_string(),
            name: name.to_string(),
            source: other,
        },
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, StoreError> {
        self.get(namespace, name).await
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, StoreError> {
        self.create(namespace, config_map).await
    }

    async fn replace_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, StoreError> {
        self.replace(namespace, config_map).await
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.delete::<ConfigMap>(namespace, name).await
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, StoreError> {
        self.get(namespace, name).await
    }

    async fn replace_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, StoreError> {
        self.replace(namespace, secret).await
    }

    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> Result<Service, StoreError> {
        self.create(namespace, service).await
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.delete::<Service>(namespace, name).await
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, StoreError> {
        self.get(namespace, name).await
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, StoreError> {
        self.create(namespace, deployment).await
    }

    async fn replace_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, StoreError> {
        self.replace(namespace, deployment).await
    }

    async fn patch_gateway_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ApplicationGatewayStatus,
    ) -> Result<(), StoreError> {
        let api: Api<ApplicationGateway> = self.api(namespace);
        let patch = serde_json::json!({ "status": status });
        debug!(resource.name = name, "patching gateway status");
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map(|_| ())
            .map_err(|e| map_error("patch status of", "ApplicationGateway", name, e))
    }

    async fn publish_event(
        &self,
        gateway: &ApplicationGateway,
        severity: EventSeverity,
        reason: &str,
        note: String,
    ) {
        let event = Event {
            type_: match severity {
                EventSeverity::Normal => EventType::Normal,
                EventSeverity::Warning => EventType::Warning,
            },
            reason: reason.to_string(),
            note: Some(note),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        let reference = gateway.object_ref(&());
        if let Err(e) = self.recorder.publish(&event, &reference).await {
            warn!(reason, error = %e, "Failed to publish Kubernetes event");
        }
    }
}
