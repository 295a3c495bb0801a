//! # Admission Patch Builder
//!
//! Create, update and delete flows of the mutating webhook.
//!
//! ```text
//! CREATE  validate ─▶ Service? ─▶ resolve + ConfigMap ─▶ volume/container/annotation patch
//!                       ▲               │ fail                │ fail
//!                       └── delete ◀────┴──────── delete ◀────┘
//! UPDATE  changed keys ─▶ recompute only the implicated objects, drop stale ones
//! DELETE  best-effort delete of the recorded Service and ConfigMap
//! ```

use super::annotations::{changed_keys, mutation_required, GatewayAnnotations, UpdateScope};
use super::patch::PatchBuilder;
use super::sidecar::{render_config_map, render_container, render_service, SidecarNames, WorkloadKind};
use crate::config::FailurePolicy;
use crate::constants::{CONFIG_MAP_NAME_ANNOTATION, IGNORED_NAMESPACES, SERVICE_NAME_ANNOTATION};
use crate::controller::reconciler::workload::config_volume;
use crate::error::{Error, Result};
use crate::observability::metrics;
use crate::source::{sources_from_entries, ConfigSourceResolver, ConfigurationSource};
use crate::store::ObjectStore;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, PodSpec};
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

/// Outcome of a successful review
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Admit unchanged
    Allow,
    /// Admit with an RFC6902 patch
    Patch(json_patch::Patch),
}

const VOLUMES: &[&str] = &["spec", "volumes"];
const CONTAINERS: &[&str] = &["spec", "containers"];

/// Metadata and pod spec of an admitted Pod or Deployment
#[derive(Debug)]
struct AdmittedObject {
    /// `None` when the object carries no annotation map at all
    annotations: Option<BTreeMap<String, String>>,
    empty: BTreeMap<String, String>,
    pod: PodSpec,
}

impl AdmittedObject {
    fn decode(object: &DynamicObject, kind: WorkloadKind) -> Result<Self> {
        let value = serde_json::to_value(object)
            .map_err(|e| Error::validation(format!("could not read admitted object: {e}")))?;
        let invalid = |e: serde_json::Error| Error::validation(format!("invalid {kind:?}: {e}"));

        let (metadata, pod) = match kind {
            WorkloadKind::Pod => {
                let pod: Pod = serde_json::from_value(value).map_err(invalid)?;
                (pod.metadata, pod.spec)
            }
            WorkloadKind::Deployment => {
                let deployment: Deployment = serde_json::from_value(value).map_err(invalid)?;
                (
                    deployment.metadata,
                    deployment.spec.and_then(|s| s.template.spec),
                )
            }
        };

        Ok(Self {
            annotations: metadata.annotations,
            empty: BTreeMap::new(),
            pod: pod.unwrap_or_default(),
        })
    }

    fn all_annotations(&self) -> &BTreeMap<String, String> {
        self.annotations.as_ref().unwrap_or(&self.empty)
    }

    fn volume_count(&self) -> usize {
        self.pod.volumes.as_ref().map_or(0, Vec::len)
    }

    fn volume_index(&self, name: &str) -> Option<usize> {
        self.pod.volumes.as_ref()?.iter().position(|v| v.name == name)
    }

    fn container_index(&self, name: &str) -> Option<usize> {
        self.pod.containers.iter().position(|c| c.name == name)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| Error::validation(format!("could not encode patch value: {e}")))
}

fn operation_label(operation: &Operation) -> &'static str {
    match operation {
        Operation::Create => "create",
        Operation::Update => "update",
        Operation::Delete => "delete",
        Operation::Connect => "connect",
    }
}

pub struct AdmissionPatchBuilder {
    store: Arc<dyn ObjectStore>,
    resolver: Arc<ConfigSourceResolver>,
    failure_policy: FailurePolicy,
}

impl std::fmt::Debug for AdmissionPatchBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionPatchBuilder")
            .field("failure_policy", &self.failure_policy)
            .finish_non_exhaustive()
    }
}

impl AdmissionPatchBuilder {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        resolver: Arc<ConfigSourceResolver>,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            store,
            resolver,
            failure_policy,
        }
    }

    /// Review a request and turn the outcome into an admission response.
    ///
    /// Failed creates and updates are denied or admitted unchanged depending
    /// on the failure policy. Deletes are always admitted.
    pub async fn handle(&self, request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
        let operation = operation_label(&request.operation);
        let span = info_span!(
            "admission",
            uid = request.uid.as_str(),
            operation,
            kind = request.kind.kind.as_str(),
            resource.name = request.name.as_str(),
            resource.namespace = request.namespace.as_deref().unwrap_or_default()
        );

        async move {
            match self.review(request).await {
                Ok(Mutation::Allow) => {
                    metrics::increment_admission_requests(operation, "allowed");
                    AdmissionResponse::from(request)
                }
                Ok(Mutation::Patch(patch)) => {
                    let operations = patch.0.len();
                    match AdmissionResponse::from(request).with_patch(patch) {
                        Ok(response) => {
                            info!(operations, "Admitted with sidecar patch");
                            metrics::increment_admission_requests(operation, "patched");
                            response
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to serialize patch");
                            metrics::increment_admission_requests(operation, "denied");
                            AdmissionResponse::from(request)
                                .deny(format!("patch serialization error: {e}"))
                        }
                    }
                }
                Err(e) => match self.failure_policy {
                    FailurePolicy::Fail => {
                        warn!(error = %e, "Denying admission");
                        metrics::increment_admission_requests(operation, "denied");
                        AdmissionResponse::from(request).deny(e.to_string())
                    }
                    FailurePolicy::Ignore => {
                        warn!(error = %e, "Admitting unchanged after failure");
                        metrics::increment_admission_requests(operation, "ignored");
                        AdmissionResponse::from(request)
                    }
                },
            }
        }
        .instrument(span)
        .await
    }

    /// Decide the mutation for one request
    pub async fn review(&self, request: &AdmissionRequest<DynamicObject>) -> Result<Mutation> {
        let Some(kind) = WorkloadKind::from_kind(&request.kind.kind) else {
            return Ok(Mutation::Allow);
        };
        let namespace = request.namespace.as_deref().unwrap_or_default();
        if IGNORED_NAMESPACES.contains(&namespace) {
            debug!("Skipping mutation in system namespace");
            return Ok(Mutation::Allow);
        }

        match request.operation {
            Operation::Create => self.create(request, kind, namespace).await,
            Operation::Update => self.update(request, kind, namespace).await,
            Operation::Delete => {
                self.delete(request, kind, namespace).await;
                Ok(Mutation::Allow)
            }
            Operation::Connect => Ok(Mutation::Allow),
        }
    }

    async fn create(
        &self,
        request: &AdmissionRequest<DynamicObject>,
        kind: WorkloadKind,
        namespace: &str,
    ) -> Result<Mutation> {
        // Pods generated by a ReplicaSet have no name yet
        if request.name.is_empty() {
            return Ok(Mutation::Allow);
        }
        let Some(object) = request.object.as_ref() else {
            return Ok(Mutation::Allow);
        };
        let target = AdmittedObject::decode(object, kind)?;
        if !mutation_required(target.all_annotations(), None, kind.is_pod()) {
            return Ok(Mutation::Allow);
        }

        let annotations = GatewayAnnotations::new(target.all_annotations());
        let sources = sources_from_entries(&annotations.validate()?)?;
        let names = SidecarNames::new(&request.name, kind);

        let service = match annotations.service_port() {
            Some(port) => Some(self.create_service(namespace, &names, port).await?),
            None => None,
        };

        let config_map = match self.create_config_map(namespace, &names, &sources).await {
            Ok(name) => name,
            Err(e) => {
                self.discard_service(namespace, service.as_deref()).await;
                return Err(e);
            }
        };

        let patch = create_patch(
            kind,
            &target,
            &names,
            &annotations,
            service.as_deref(),
            &config_map,
        );

        match patch {
            Ok(patch) => Ok(Mutation::Patch(patch.build())),
            Err(e) => {
                self.discard_service(namespace, service.as_deref()).await;
                self.discard_config_map(namespace, Some(&config_map)).await;
                Err(e)
            }
        }
    }

    async fn update(
        &self,
        request: &AdmissionRequest<DynamicObject>,
        kind: WorkloadKind,
        namespace: &str,
    ) -> Result<Mutation> {
        let (Some(object), Some(old_object)) = (request.object.as_ref(), request.old_object.as_ref())
        else {
            return Ok(Mutation::Allow);
        };
        let target = AdmittedObject::decode(object, kind)?;
        let live = AdmittedObject::decode(old_object, kind)?;

        let incoming = target.all_annotations();
        if !mutation_required(incoming, Some(live.all_annotations()), kind.is_pod()) {
            return Ok(Mutation::Allow);
        }
        let changed = changed_keys(incoming, live.all_annotations(), kind.is_pod());
        let scope = UpdateScope::from_changes(&changed);
        debug!(changed = ?changed, scope = ?scope, "Annotation changes");

        let annotations = GatewayAnnotations::new(incoming);
        let previous = GatewayAnnotations::new(live.all_annotations());
        let sources = sources_from_entries(&annotations.validate()?)?;
        let names = SidecarNames::new(&request.name, kind);

        let mut recorded = BTreeMap::new();

        let mut created_service = None;
        let mut stale_service = None;
        if scope.service {
            if let Some(port) = annotations.service_port() {
                created_service = Some(self.create_service(namespace, &names, port).await?);
            }
            stale_service = annotations.service_name().or(previous.service_name());
            recorded.insert(
                SERVICE_NAME_ANNOTATION.to_string(),
                created_service.clone().unwrap_or_default(),
            );
        }

        let current_config_map = annotations
            .config_map_name()
            .or(previous.config_map_name());
        let mut created_config_map = None;
        if scope.config {
            match self.create_config_map(namespace, &names, &sources).await {
                Ok(created) => {
                    recorded.insert(CONFIG_MAP_NAME_ANNOTATION.to_string(), created.clone());
                    created_config_map = Some(created);
                }
                Err(e) => {
                    self.discard_service(namespace, created_service.as_deref()).await;
                    return Err(e);
                }
            }
        }

        let config_map = created_config_map.as_deref().or(current_config_map);
        let patch = match update_patch(kind, &target, &names, &annotations, scope, config_map, &recorded)
        {
            Ok(patch) => patch,
            Err(e) => {
                self.discard_service(namespace, created_service.as_deref()).await;
                self.discard_config_map(namespace, created_config_map.as_deref()).await;
                return Err(e);
            }
        };

        // Replaced objects are only removed once their successors exist
        if scope.service {
            self.discard_service(namespace, stale_service).await;
        }
        if created_config_map.is_some() {
            self.discard_config_map(namespace, current_config_map).await;
        }

        Ok(if patch.is_empty() {
            Mutation::Allow
        } else {
            Mutation::Patch(patch.build())
        })
    }

    async fn delete(
        &self,
        request: &AdmissionRequest<DynamicObject>,
        kind: WorkloadKind,
        namespace: &str,
    ) {
        let Some(old_object) = request.old_object.as_ref() else {
            return;
        };
        let live = match AdmittedObject::decode(old_object, kind) {
            Ok(live) => live,
            Err(e) => {
                warn!(error = %e, "Could not read deleted object, nothing cleaned up");
                return;
            }
        };

        let annotations = GatewayAnnotations::new(live.all_annotations());
        if !annotations.has_vendor_keys() {
            return;
        }
        self.discard_service(namespace, annotations.service_name()).await;
        self.discard_config_map(namespace, annotations.config_map_name()).await;
    }

    async fn create_service(&self, namespace: &str, names: &SidecarNames, port: &str) -> Result<String> {
        let created = self
            .store
            .create_service(namespace, &render_service(names, namespace, port))
            .await?;
        let name = created.metadata.name.unwrap_or_default();
        info!(service = name.as_str(), "Created gateway service");
        Ok(name)
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        names: &SidecarNames,
        sources: &[ConfigurationSource],
    ) -> Result<String> {
        let document = self.resolver.resolve(namespace, sources).await?.to_yaml()?;
        let created = self
            .store
            .create_config_map(namespace, &render_config_map(names, namespace, &document))
            .await?;
        let name = created.metadata.name.unwrap_or_default();
        info!(config_map = name.as_str(), "Created gateway ConfigMap");
        Ok(name)
    }

    async fn discard_service(&self, namespace: &str, name: Option<&str>) {
        let Some(name) = name.filter(|n| !n.is_empty()) else {
            return;
        };
        match self.store.delete_service(namespace, name).await {
            Ok(()) => info!(service = name, "Deleted gateway service"),
            Err(e) if e.is_not_found() => debug!(service = name, "Service already gone"),
            Err(e) => warn!(service = name, error = %e, "Failed to delete gateway service"),
        }
    }

    async fn discard_config_map(&self, namespace: &str, name: Option<&str>) {
        let Some(name) = name.filter(|n| !n.is_empty()) else {
            return;
        };
        match self.store.delete_config_map(namespace, name).await {
            Ok(()) => info!(config_map = name, "Deleted gateway ConfigMap"),
            Err(e) if e.is_not_found() => debug!(config_map = name, "ConfigMap already gone"),
            Err(e) => warn!(config_map = name, error = %e, "Failed to delete gateway ConfigMap"),
        }
    }
}

/// Volume, container and annotation patch for a freshly admitted object
fn create_patch(
    kind: WorkloadKind,
    target: &AdmittedObject,
    names: &SidecarNames,
    annotations: &GatewayAnnotations<'_>,
    service: Option<&str>,
    config_map: &str,
) -> Result<PatchBuilder> {
    let mut patch = PatchBuilder::new(kind.patch_base());
    patch.append(
        VOLUMES,
        target.volume_count(),
        to_json(&config_volume(config_map))?,
    );
    patch.append(
        CONTAINERS,
        target.pod.containers.len(),
        to_json(&render_container(names, annotations)?)?,
    );
    // An absent service clears any stale recorded name
    patch.set_annotations(
        target.annotations.as_ref(),
        &recorded_names(Some(service.unwrap_or_default()), Some(config_map)),
    );
    Ok(patch)
}

/// Container, volume and annotation patch for the implicated parts of an update
fn update_patch(
    kind: WorkloadKind,
    target: &AdmittedObject,
    names: &SidecarNames,
    annotations: &GatewayAnnotations<'_>,
    scope: UpdateScope,
    config_map: Option<&str>,
    recorded: &BTreeMap<String, String>,
) -> Result<PatchBuilder> {
    let mut patch = PatchBuilder::new(kind.patch_base());
    if scope.container {
        if let (true, Some(config_map)) = (scope.config, config_map) {
            let volume = config_volume(config_map);
            patch.upsert(
                VOLUMES,
                target.volume_index(&volume.name),
                target.volume_count(),
                to_json(&volume)?,
            );
        }
        patch.upsert(
            CONTAINERS,
            target.container_index(&names.container),
            target.pod.containers.len(),
            to_json(&render_container(names, annotations)?)?,
        );
    }
    if !recorded.is_empty() {
        patch.set_annotations(target.annotations.as_ref(), recorded);
    }
    Ok(patch)
}

/// Annotation updates recording the generated objects; empty values remove the key
fn recorded_names(service: Option<&str>, config_map: Option<&str>) -> BTreeMap<String, String> {
    let mut recorded = BTreeMap::new();
    if let Some(service) = service {
        recorded.insert(SERVICE_NAME_ANNOTATION.to_string(), service.to_string());
    }
    if let Some(config_map) = config_map {
        recorded.insert(CONFIG_MAP_NAME_ANNOTATION.to_string(), config_map.to_string());
    }
    recorded
}
