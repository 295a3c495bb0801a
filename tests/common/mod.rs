//! Shared fakes for the integration tests
//!
//! `FakeStore` keeps objects in memory and honours `generateName`;
//! `FakeFetcher` answers from a fixed route table and records every request.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use app_gateway_operator::crd::{ApplicationGateway, ApplicationGatewayStatus};
use app_gateway_operator::error::{Error, Result};
use app_gateway_operator::http::{HttpFetcher, HttpRequest, HttpResponse};
use app_gateway_operator::store::{EventSeverity, ObjectStore, StoreError};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::Resource;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub severity: EventSeverity,
    pub reason: String,
    pub note: String,
}

#[derive(Default)]
struct State {
    config_maps: BTreeMap<Key, ConfigMap>,
    secrets: BTreeMap<Key, Secret>,
    services: BTreeMap<Key, Service>,
    deployments: BTreeMap<Key, Deployment>,
    statuses: BTreeMap<Key, ApplicationGatewayStatus>,
    events: Vec<RecordedEvent>,
    calls: Vec<String>,
    failing: BTreeSet<&'static str>,
    generated: u32,
}

/// In-memory object store
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call of `operation` (e.g. `"create_config_map"`) fail
    pub fn fail_on(&self, operation: &'static str) {
        self.state.lock().unwrap().failing.insert(operation);
    }

    pub fn insert_config_map(&self, config_map: ConfigMap) {
        let k = key(
            config_map.metadata.namespace.as_deref().unwrap(),
            config_map.metadata.name.as_deref().unwrap(),
        );
        self.state.lock().unwrap().config_maps.insert(k, config_map);
    }

    pub fn insert_secret(&self, secret: Secret) {
        let k = key(
            secret.metadata.namespace.as_deref().unwrap(),
            secret.metadata.name.as_deref().unwrap(),
        );
        self.state.lock().unwrap().secrets.insert(k, secret);
    }

    pub fn insert_service(&self, service: Service) {
        let k = key(
            service.metadata.namespace.as_deref().unwrap(),
            service.metadata.name.as_deref().unwrap(),
        );
        self.state.lock().unwrap().services.insert(k, service);
    }

    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.state.lock().unwrap().config_maps.get(&key(namespace, name)).cloned()
    }

    pub fn config_map_names(&self, namespace: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .config_maps
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.state.lock().unwrap().secrets.get(&key(namespace, name)).cloned()
    }

    pub fn service_names(&self, namespace: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .services
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.state.lock().unwrap().deployments.get(&key(namespace, name)).cloned()
    }

    pub fn status(&self, namespace: &str, name: &str) -> Option<ApplicationGatewayStatus> {
        self.state.lock().unwrap().statuses.get(&key(namespace, name)).cloned()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.state.lock().unwrap().events.clone()
    }

    /// Mutating calls in order, as `"<operation> <name>"`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.split(' ').next() == Some(operation))
            .count()
    }
}

impl State {
    fn check(&self, operation: &'static str, kind: &str, name: &str) -> Result<(), StoreError> {
        if self.failing.contains(operation) {
            return Err(StoreError::Rejected {
                operation,
                kind: kind.to_string(),
                name: name.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    /// Name a new object, honouring `generateName`
    fn assign_name(&mut self, metadata: &mut ObjectMeta) -> String {
        if metadata.name.is_none() {
            self.generated += 1;
            let prefix = metadata.generate_name.clone().unwrap_or_default();
            metadata.name = Some(format!("{prefix}{:05}", self.generated));
        }
        metadata.name.clone().unwrap_or_default()
    }
}

fn not_found(kind: &str, name: &str) -> StoreError {
    StoreError::NotFound {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

fn already_exists(operation: &'static str, kind: &str, name: &str) -> StoreError {
    StoreError::Rejected {
        operation,
        kind: kind.to_string(),
        name: name.to_string(),
        reason: "already exists".to_string(),
    }
}

macro_rules! create {
    ($self:ident, $map:ident, $op:literal, $kind:literal, $namespace:ident, $object:ident) => {{
        let mut state = $self.state.lock().unwrap();
        let mut object = $object.clone();
        object.metadata.namespace = Some($namespace.to_string());
        let name = state.assign_name(&mut object.metadata);
        state.check($op, $kind, &name)?;
        if state.$map.contains_key(&key($namespace, &name)) {
            return Err(already_exists($op, $kind, &name));
        }
        state.calls.push(format!("{} {}", $op, name));
        state.$map.insert(key($namespace, &name), object.clone());
        Ok(object)
    }};
}

macro_rules! replace {
    ($self:ident, $map:ident, $op:literal, $kind:literal, $namespace:ident, $object:ident) => {{
        let mut state = $self.state.lock().unwrap();
        let name = $object.metadata.name.clone().unwrap_or_default();
        state.check($op, $kind, &name)?;
        if !state.$map.contains_key(&key($namespace, &name)) {
            return Err(not_found($kind, &name));
        }
        state.calls.push(format!("{} {}", $op, name));
        state.$map.insert(key($namespace, &name), $object.clone());
        Ok($object.clone())
    }};
}

macro_rules! delete {
    ($self:ident, $map:ident, $op:literal, $kind:literal, $namespace:ident, $name:ident) => {{
        let mut state = $self.state.lock().unwrap();
        state.check($op, $kind, $name)?;
        state.calls.push(format!("{} {}", $op, $name));
        state
            .$map
            .remove(&key($namespace, $name))
            .map(|_| ())
            .ok_or_else(|| not_found($kind, $name))
    }};
}

macro_rules! get {
    ($self:ident, $map:ident, $op:literal, $kind:literal, $namespace:ident, $name:ident) => {{
        let state = $self.state.lock().unwrap();
        state.check($op, $kind, $name)?;
        state
            .$map
            .get(&key($namespace, $name))
            .cloned()
            .ok_or_else(|| not_found($kind, $name))
    }};
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, StoreError> {
        get!(self, config_maps, "get_config_map", "ConfigMap", namespace, name)
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, StoreError> {
        create!(self, config_maps, "create_config_map", "ConfigMap", namespace, config_map)
    }

    async fn replace_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, StoreError> {
        replace!(self, config_maps, "replace_config_map", "ConfigMap", namespace, config_map)
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        delete!(self, config_maps, "delete_config_map", "ConfigMap", namespace, name)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, StoreError> {
        get!(self, secrets, "get_secret", "Secret", namespace, name)
    }

    async fn replace_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, StoreError> {
        replace!(self, secrets, "replace_secret", "Secret", namespace, secret)
    }

    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> Result<Service, StoreError> {
        create!(self, services, "create_service", "Service", namespace, service)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        delete!(self, services, "delete_service", "Service", namespace, name)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, StoreError> {
        get!(self, deployments, "get_deployment", "Deployment", namespace, name)
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, StoreError> {
        create!(self, deployments, "create_deployment", "Deployment", namespace, deployment)
    }

    async fn replace_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, StoreError> {
        replace!(self, deployments, "replace_deployment", "Deployment", namespace, deployment)
    }

    async fn patch_gateway_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ApplicationGatewayStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.check("patch_gateway_status", "ApplicationGateway", name)?;
        state.calls.push(format!("patch_gateway_status {name}"));
        state.statuses.insert(key(namespace, name), status.clone());
        Ok(())
    }

    async fn publish_event(
        &self,
        gateway: &ApplicationGateway,
        severity: EventSeverity,
        reason: &str,
        note: String,
    ) {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("publish_event {}", gateway.meta().name.clone().unwrap_or_default()));
        state.events.push(RecordedEvent {
            severity,
            reason: reason.to_string(),
            note,
        });
    }
}

/// Outbound HTTP answered from a route table
#[derive(Default)]
pub struct FakeFetcher {
    routes: Mutex<HashMap<String, HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: &str, status: u16, body: &str) -> &Self {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            HttpResponse {
                status,
                body: body.to_string(),
            },
        );
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.url == url)
            .collect()
    }
}

#[async_trait]
impl HttpFetcher for FakeFetcher {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        self.routes
            .lock()
            .unwrap()
            .get(&url)
            .cloned()
            .ok_or_else(|| Error::fetch(url, "connection refused"))
    }
}

pub fn config_map(namespace: &str, name: &str, data: &[(&str, &str)]) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        ),
        ..Default::default()
    }
}

pub fn secret(namespace: &str, name: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}

pub fn secret_string(secret: &Secret, key: &str) -> Option<String> {
    app_gateway_operator::store::secret_value(secret, key)
}
