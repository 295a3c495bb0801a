//! # Reconcile Diff
//!
//! Pure decision logic comparing the desired gateway workload with the live
//! Deployment.
//!
//! ```text
//! live absent                    ──▶ Create
//! replicas differ                ──▶ ScaleReplicas (nothing else this pass)
//! version/lang/account/image     ──▶ Update { change_cause }
//! nothing differs                ──▶ Requeue (timed re-check)
//! ```

use crate::constants::{CONFIG_VERSION_LABEL, LANG_LABEL};
use crate::crd::{ApplicationGateway, HealthCheckSettings};
use k8s_openapi::api::apps::v1::Deployment;
use std::collections::BTreeMap;

/// Workload the gateway resource asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredWorkloadState {
    pub name: String,
    pub replicas: i32,
    pub image: String,
    pub image_pull_policy: String,
    pub image_pull_secrets: Vec<String>,
    pub service_account: Option<String>,
    pub lang: String,
    pub readiness_probe: ExecHealthCheck,
    pub liveness_probe: ExecHealthCheck,
    /// Custom plus static pod template annotations
    pub annotations: BTreeMap<String, String>,
    pub config_version: String,
    pub config_map_name: String,
}

/// Exec health check with defaults applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecHealthCheck {
    pub command: String,
    pub initial_delay_seconds: i32,
    pub period_seconds: i32,
    pub failure_threshold: i32,
    pub success_threshold: i32,
    pub timeout_seconds: i32,
}

impl ExecHealthCheck {
    #[must_use]
    pub fn readiness(settings: Option<&HealthCheckSettings>) -> Self {
        Self::from_settings(settings)
    }

    /// Liveness checks only accept a success threshold of 1
    #[must_use]
    pub fn liveness(settings: Option<&HealthCheckSettings>) -> Self {
        Self {
            success_threshold: 1,
            ..Self::from_settings(settings)
        }
    }

    fn from_settings(settings: Option<&HealthCheckSettings>) -> Self {
        let settings = settings.cloned().unwrap_or_default();
        let at_least = |value: Option<i32>, min: i32, default: i32| match value {
            Some(v) if v >= min => v,
            _ => default,
        };

        Self {
            command: settings
                .command
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| crate::constants::HEALTH_CHECK_COMMAND.to_string()),
            initial_delay_seconds: at_least(settings.initial_delay_seconds, 0, 0),
            period_seconds: at_least(settings.period_seconds, 1, 10),
            failure_threshold: at_least(settings.failure_threshold, 1, 3),
            success_threshold: at_least(settings.success_threshold, 1, 1),
            timeout_seconds: at_least(settings.timeout_seconds, 1, 1),
        }
    }
}

/// Normalize an image pull policy (`never`/`always`, anything else `IfNotPresent`)
#[must_use]
pub fn pull_policy(raw: Option<&str>) -> String {
    match raw.map(|p| p.trim().to_ascii_lowercase()).as_deref() {
        Some("never") => "Never",
        Some("always") => "Always",
        _ => "IfNotPresent",
    }
    .to_string()
}

impl DesiredWorkloadState {
    #[must_use]
    pub fn from_gateway(
        gateway: &ApplicationGateway,
        config_version: &str,
        config_map_name: &str,
    ) -> Self {
        let name = gateway.metadata.name.clone().unwrap_or_default();
        let deployment = &gateway.spec.deployment;

        let mut annotations: BTreeMap<String, String> = deployment
            .custom_annotations
            .iter()
            .map(|a| (a.key.clone(), a.value.clone()))
            .collect();
        annotations
            .entry(crate::constants::DEFAULT_CONTAINER_ANNOTATION.to_string())
            .or_insert_with(|| name.clone());

        Self {
            replicas: gateway.spec.replicas,
            image: deployment.image.clone(),
            image_pull_policy: pull_policy(deployment.image_pull_policy.as_deref()),
            image_pull_secrets: deployment
                .image_pull_secrets
                .iter()
                .map(|s| s.name.clone())
                .collect(),
            service_account: deployment
                .service_account_name
                .clone()
                .filter(|s| !s.is_empty()),
            lang: deployment.lang.clone(),
            readiness_probe: ExecHealthCheck::readiness(deployment.readiness_probe.as_ref()),
            liveness_probe: ExecHealthCheck::liveness(deployment.liveness_probe.as_ref()),
            annotations,
            config_version: config_version.to_string(),
            config_map_name: config_map_name.to_string(),
            name,
        }
    }
}

/// Fields of a live Deployment the diff looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveWorkload {
    pub replicas: Option<i32>,
    pub config_version: Option<String>,
    pub lang: Option<String>,
    pub service_account: Option<String>,
    pub image: Option<String>,
}

impl LiveWorkload {
    #[must_use]
    pub fn from_deployment(deployment: &Deployment) -> Self {
        let spec = deployment.spec.as_ref();
        let template = spec.map(|s| &s.template);
        let labels = template
            .and_then(|t| t.metadata.as_ref())
            .and_then(|m| m.labels.as_ref());
        let pod = template.and_then(|t| t.spec.as_ref());

        Self {
            replicas: spec.and_then(|s| s.replicas),
            config_version: labels.and_then(|l| l.get(CONFIG_VERSION_LABEL).cloned()),
            lang: labels.and_then(|l| l.get(LANG_LABEL).cloned()),
            service_account: pod
                .and_then(|p| p.service_account_name.clone())
                .filter(|s| !s.is_empty()),
            image: pod
                .and_then(|p| p.containers.first())
                .and_then(|c| c.image.clone()),
        }
    }
}

/// Convergence step for one reconcile pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    /// No Deployment yet
    Create,
    /// Only the replica count is changed this pass
    ScaleReplicas(i32),
    /// Apply every differing field plus env and the change-cause annotation
    Update { change_cause: String },
    /// Converged, check again later
    Requeue,
}

/// Decide the next convergence step
#[must_use]
pub fn plan(desired: &DesiredWorkloadState, live: Option<&LiveWorkload>) -> ReconcileAction {
    let Some(live) = live else {
        return ReconcileAction::Create;
    };

    // The API server defaults an unset replica count to 1
    if live.replicas.unwrap_or(1) != desired.replicas {
        return ReconcileAction::ScaleReplicas(desired.replicas);
    }

    let mut causes = ChangeCause::default();

    if live.config_version.as_deref() != Some(desired.config_version.as_str()) {
        causes.push("Configuration change".to_string(), "configuration change");
    }

    let live_lang = live.lang.as_deref().unwrap_or_default();
    if live_lang != desired.lang {
        causes.push(
            format!("Language changed from {live_lang} to {}", desired.lang),
            "language change",
        );
    }

    if live.service_account != desired.service_account {
        causes.push(
            format!(
                "Service account changed from {} to {}",
                live.service_account.as_deref().unwrap_or_default(),
                desired.service_account.as_deref().unwrap_or_default()
            ),
            "service account change",
        );
    }

    let live_image = live.image.as_deref().unwrap_or_default();
    if live_image != desired.image {
        causes.push(
            format!("Image changed from {live_image} to {}", desired.image),
            "image change",
        );
    }

    match causes.finish() {
        Some(change_cause) => ReconcileAction::Update { change_cause },
        None => ReconcileAction::Requeue,
    }
}

/// First cause is spelled out, later ones are appended as short labels
#[derive(Default)]
struct ChangeCause(Option<String>);

impl ChangeCause {
    fn push(&mut self, first: String, subsequent: &str) {
        self.0 = Some(match self.0.take() {
            None => first,
            Some(cause) => format!("{cause}, {subsequent}"),
        });
    }

    fn finish(self) -> Option<String> {
        self.0
    }
}
