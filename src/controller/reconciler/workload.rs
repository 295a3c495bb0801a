//! # Workload Rendering
//!
//! Builds the gateway Deployment from a [`DesiredWorkloadState`] and applies
//! an update decided by [`super::diff::plan`] to a live Deployment.

use super::diff::{DesiredWorkloadState, ExecHealthCheck};
use crate::constants::{
    CHANGE_CAUSE_ANNOTATION, CONFIG_MAP_LABEL, CONFIG_MOUNT_PATH, CONFIG_VERSION_LABEL,
    LANG_LABEL, SIDECAR_VOLUME_NAME, WORKLOAD_VERSION,
};
use crate::crd::ApplicationGateway;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EnvVar, ExecAction, LocalObjectReference, PodSpec,
    PodTemplateSpec, Probe, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::Resource;
use std::collections::BTreeMap;

/// `app` and `version` labels shared by the Deployment and its selector
#[must_use]
pub fn selector_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), name.to_string()),
        ("version".to_string(), WORKLOAD_VERSION.to_string()),
    ])
}

fn template_labels(desired: &DesiredWorkloadState) -> BTreeMap<String, String> {
    let mut labels = selector_labels(&desired.name);
    labels.insert(
        CONFIG_VERSION_LABEL.to_string(),
        desired.config_version.clone(),
    );
    labels.insert(LANG_LABEL.to_string(), desired.lang.clone());
    labels.insert(
        CONFIG_MAP_LABEL.to_string(),
        desired.config_map_name.clone(),
    );
    labels
}

fn lang_env(lang: &str) -> Vec<EnvVar> {
    vec![EnvVar {
        name: "LANG".to_string(),
        value: Some(lang.to_string()),
        ..Default::default()
    }]
}

#[must_use]
pub fn exec_check(check: &ExecHealthCheck) -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(vec![check.command.clone()]),
        }),
        initial_delay_seconds: Some(check.initial_delay_seconds),
        period_seconds: Some(check.period_seconds),
        failure_threshold: Some(check.failure_threshold),
        success_threshold: Some(check.success_threshold),
        timeout_seconds: Some(check.timeout_seconds),
        ..Default::default()
    }
}

/// Volume exposing the generated ConfigMap to the gateway container
#[must_use]
pub fn config_volume(config_map_name: &str) -> Volume {
    Volume {
        name: SIDECAR_VOLUME_NAME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map_name.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[must_use]
pub fn config_volume_mount() -> VolumeMount {
    VolumeMount {
        name: SIDECAR_VOLUME_NAME.to_string(),
        mount_path: CONFIG_MOUNT_PATH.to_string(),
        ..Default::default()
    }
}

/// Render the Deployment for a gateway that has none yet
#[must_use]
pub fn render_deployment(gateway: &ApplicationGateway, desired: &DesiredWorkloadState) -> Deployment {
    let container = Container {
        name: desired.name.clone(),
        image: Some(desired.image.clone()),
        image_pull_policy: Some(desired.image_pull_policy.clone()),
        volume_mounts: Some(vec![config_volume_mount()]),
        env: Some(lang_env(&desired.lang)),
        readiness_probe: Some(exec_check(&desired.readiness_probe)),
        liveness_probe: Some(exec_check(&desired.liveness_probe)),
        ..Default::default()
    };

    let image_pull_secrets = (!desired.image_pull_secrets.is_empty()).then(|| {
        desired
            .image_pull_secrets
            .iter()
            .map(|name| LocalObjectReference { name: name.clone() })
            .collect()
    });

    Deployment {
        metadata: ObjectMeta {
            name: Some(desired.name.clone()),
            namespace: gateway.metadata.namespace.clone(),
            labels: Some(selector_labels(&desired.name)),
            owner_references: gateway.controller_owner_ref(&()).map(|owner| vec![owner]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(desired.replicas),
            selector: LabelSelector {
                match_labels: Some(selector_labels(&desired.name)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(template_labels(desired)),
                    annotations: Some(desired.annotations.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: desired.service_account.clone(),
                    volumes: Some(vec![config_volume(&desired.config_map_name)]),
                    image_pull_secrets,
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Apply every converging field to a live Deployment in one go
pub fn apply_update(deployment: &mut Deployment, desired: &DesiredWorkloadState, change_cause: &str) {
    deployment
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(CHANGE_CAUSE_ANNOTATION.to_string(), change_cause.to_string());

    let spec = deployment.spec.get_or_insert_with(Default::default);
    let template_meta = spec.template.metadata.get_or_insert_with(Default::default);
    template_meta
        .labels
        .get_or_insert_with(BTreeMap::new)
        .extend(template_labels(desired));

    let pod = spec.template.spec.get_or_insert_with(Default::default);
    pod.service_account_name = desired.service_account.clone();

    // The config volume follows the ConfigMap name
    let volumes = pod.volumes.get_or_insert_with(Vec::new);
    match volumes.iter_mut().find(|v| v.name == SIDECAR_VOLUME_NAME) {
        Some(volume) => *volume = config_volume(&desired.config_map_name),
        None => volumes.push(config_volume(&desired.config_map_name)),
    }

    if pod.containers.is_empty() {
        pod.containers.push(Container {
            name: desired.name.clone(),
            ..Default::default()
        });
    }
    let container = &mut pod.containers[0];
    container.image = Some(desired.image.clone());
    container.env = Some(lang_env(&desired.lang));
}

/// Set the replica count only
pub fn apply_scale(deployment: &mut Deployment, replicas: i32) {
    deployment.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
}
