//! # ApplicationGateway Spec
//!
//! `ApplicationGateway` spec types and default values.

use serde::{Deserialize, Serialize};

/// ApplicationGateway Custom Resource Definition
///
/// Declares a gateway Deployment together with the ordered list of sources
/// its configuration document is assembled from.
///
/// # Example
///
/// ```yaml
/// apiVersion: app-gateway.operator.dev/v1
/// kind: ApplicationGateway
/// metadata:
///   name: edge
///   namespace: default
/// spec:
///   replicas: 2
///   deployment:
///     image: registry.example.com/gateway:24.12
///     lang: en_US.utf8
///   configuration:
///     - type: configmap
///       name: edge-base
///       dataKey: config.yaml
///     - type: literal
///       value: |
///         server:
///           local_applications:
///             cred_viewer: {path_segment: creds}
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ApplicationGateway",
    group = "app-gateway.operator.dev",
    version = "v1",
    namespaced,
    status = "crate::crd::ApplicationGatewayStatus",
    shortname = "agw",
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}, {"name":"Version", "type":"string", "jsonPath":".status.version"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationGatewaySpec {
    /// Number of gateway replicas
    #[serde(default = "default_replicas")]
    pub replicas: i32,
    /// Container and pod settings for the gateway Deployment
    pub deployment: GatewayDeployment,
    /// Ordered configuration sources; later entries override earlier ones
    #[serde(default)]
    pub configuration: Vec<crate::crd::ConfigurationEntry>,
}

/// Deployment settings of the gateway workload
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayDeployment {
    /// Gateway container image
    pub image: String,
    /// Image pull policy (Always, Never, IfNotPresent)
    #[serde(default)]
    pub image_pull_policy: Option<String>,
    /// Secrets used to pull the gateway image
    #[serde(default)]
    pub image_pull_secrets: Vec<PullSecretRef>,
    /// Service account the gateway pods run as
    #[serde(default)]
    pub service_account_name: Option<String>,
    /// Value of the LANG environment variable inside the gateway
    #[serde(default = "default_lang")]
    pub lang: String,
    /// Suffix appended to the resource name for the generated ConfigMap
    /// Default: "-config-gateway-generated"
    #[serde(default)]
    pub generated_config_map_suffix: Option<String>,
    #[serde(default)]
    pub readiness_probe: Option<HealthCheckSettings>,
    #[serde(default)]
    pub liveness_probe: Option<HealthCheckSettings>,
    /// Extra annotations placed on the gateway pod template
    #[serde(default)]
    pub custom_annotations: Vec<CustomAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct PullSecretRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct CustomAnnotation {
    pub key: String,
    pub value: String,
}

/// Exec health check settings
///
/// Values below their minimum fall back to the defaults applied when the
/// Deployment is rendered.
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckSettings {
    /// Command executed by the check (default: /sbin/health_check.sh)
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub initial_delay_seconds: Option<i32>,
    #[serde(default)]
    pub period_seconds: Option<i32>,
    #[serde(default)]
    pub failure_threshold: Option<i32>,
    #[serde(default)]
    pub success_threshold: Option<i32>,
    #[serde(default)]
    pub timeout_seconds: Option<i32>,
}

#[must_use]
pub fn default_replicas() -> i32 {
    1
}

#[must_use]
pub fn default_lang() -> String {
    "C".to_string()
}
