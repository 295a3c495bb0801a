//! # Sidecar Rendering
//!
//! Objects the webhook injects next to an annotated Pod or Deployment: the
//! gateway container, its config volume, the generated ConfigMap and the
//! optional NodePort Service.

use super::annotations::GatewayAnnotations;
use crate::constants::{
    CONFIG_DATA_KEY, DEFAULT_NODE_PORT, GATEWAY_SERVICE_PORT, HEALTH_CHECK_COMMAND,
    SIDECAR_CONTAINER_PORT,
};
use crate::controller::reconciler::diff::pull_policy;
use crate::controller::reconciler::workload::config_volume_mount;
use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, ContainerPort, EnvVar, ExecAction, Probe, Service, ServicePort,
    ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

/// Kind of workload admitted by the webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Pod,
    Deployment,
}

impl WorkloadKind {
    #[must_use]
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "Pod" => Some(Self::Pod),
            "Deployment" => Some(Self::Deployment),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_pod(self) -> bool {
        self == Self::Pod
    }

    /// Pointer tokens of the object holding the pod spec
    #[must_use]
    pub fn patch_base(self) -> &'static [&'static str] {
        match self {
            Self::Pod => &[],
            Self::Deployment => &["spec", "template"],
        }
    }
}

/// Names of the generated sidecar objects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarNames {
    /// Value of the `app` label, the admitted object's name
    pub app: String,
    pub container: String,
    pub service: String,
    pub config_map: String,
}

impl SidecarNames {
    #[must_use]
    pub fn new(object_name: &str, kind: WorkloadKind) -> Self {
        let stem = match kind {
            WorkloadKind::Pod => format!("{object_name}-pod"),
            WorkloadKind::Deployment => object_name.to_string(),
        };
        let name = |suffix: &str| format!("{stem}-app-gateway-sidecar-{suffix}").to_lowercase();

        Self {
            app: object_name.to_string(),
            container: name("pod"),
            service: name("svc"),
            config_map: name("configmap"),
        }
    }

    fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("app".to_string(), self.app.clone())])
    }
}

fn exec_check(initial_delay_seconds: i32, period_seconds: i32) -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(vec![HEALTH_CHECK_COMMAND.to_string()]),
        }),
        initial_delay_seconds: Some(initial_delay_seconds),
        period_seconds: Some(period_seconds),
        ..Default::default()
    }
}

/// Gateway sidecar container
pub fn render_container(names: &SidecarNames, annotations: &GatewayAnnotations<'_>) -> Result<Container> {
    let image = annotations
        .image()
        .ok_or_else(|| Error::validation("no gateway image has been specified"))?;

    let env: Vec<EnvVar> = annotations
        .env()
        .into_iter()
        .map(|(name, value)| EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            ..Default::default()
        })
        .collect();

    Ok(Container {
        name: names.container.clone(),
        image: Some(image.to_string()),
        image_pull_policy: Some(pull_policy(annotations.image_pull_policy())),
        ports: Some(vec![ContainerPort {
            container_port: SIDECAR_CONTAINER_PORT,
            ..Default::default()
        }]),
        volume_mounts: Some(vec![config_volume_mount()]),
        env: (!env.is_empty()).then_some(env),
        readiness_probe: Some(exec_check(5, 10)),
        liveness_probe: Some(exec_check(120, 20)),
        ..Default::default()
    })
}

/// NodePort Service exposing the gateway port.
///
/// An unparsable port annotation falls back to the default node port.
#[must_use]
pub fn render_service(names: &SidecarNames, namespace: &str, port: &str) -> Service {
    let node_port = port.trim().parse::<i32>().unwrap_or(DEFAULT_NODE_PORT);

    Service {
        metadata: ObjectMeta {
            generate_name: Some(names.service.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(names.labels()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("NodePort".to_string()),
            selector: Some(names.labels()),
            ports: Some(vec![ServicePort {
                name: Some(names.service.clone()),
                port: GATEWAY_SERVICE_PORT,
                node_port: Some(node_port),
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::Int(GATEWAY_SERVICE_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// ConfigMap holding the merged document, named by the API server
#[must_use]
pub fn render_config_map(names: &SidecarNames, namespace: &str, document: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            generate_name: Some(names.config_map.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(names.labels()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            CONFIG_DATA_KEY.to_string(),
            document.to_string(),
        )])),
        ..Default::default()
    }
}
