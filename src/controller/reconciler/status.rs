//! # Status
//!
//! Status reporting for gateways. Success writes the rolled out version and a
//! `Ready=True` condition; failure publishes a Warning event and flips the
//! gateway to not ready. The status subresource is only patched when
//! something other than the transition time changed.

use crate::crd::{ApplicationGateway, ApplicationGatewayStatus, Condition};
use crate::error::Error;
use crate::store::{EventSeverity, ObjectStore, StoreError};
use tracing::{debug, warn};

pub const READY_CONDITION: &str = "Ready";

/// Build the next status, keeping the transition time of an unchanged condition
#[must_use]
pub fn next_status(
    gateway: &ApplicationGateway,
    ready: bool,
    reason: &str,
    message: String,
    rollout: Option<(i32, &str, &str)>,
) -> ApplicationGatewayStatus {
    let previous = gateway.status.clone().unwrap_or_default();
    let status_value = if ready { "True" } else { "False" };

    let last_transition_time = previous
        .conditions
        .iter()
        .find(|c| c.r#type == READY_CONDITION && c.status == status_value)
        .and_then(|c| c.last_transition_time.clone())
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());

    let (replicas, version, config_map_name) = match rollout {
        Some((replicas, version, config_map)) => (
            Some(replicas),
            Some(version.to_string()),
            Some(config_map.to_string()),
        ),
        None => (
            previous.replicas,
            previous.version.clone(),
            previous.config_map_name.clone(),
        ),
    };

    ApplicationGatewayStatus {
        ready,
        replicas,
        version,
        config_map_name,
        conditions: vec![Condition {
            r#type: READY_CONDITION.to_string(),
            status: status_value.to_string(),
            last_transition_time: Some(last_transition_time),
            reason: Some(reason.to_string()),
            message: Some(message),
        }],
        observed_generation: gateway.metadata.generation,
    }
}

/// Patch the status subresource unless it already matches
pub async fn update_status(
    store: &dyn ObjectStore,
    gateway: &ApplicationGateway,
    status: ApplicationGatewayStatus,
) -> Result<(), StoreError> {
    if gateway.status.as_ref() == Some(&status) {
        debug!("status unchanged, skipping patch");
        return Ok(());
    }
    let namespace = gateway.metadata.namespace.as_deref().unwrap_or_default();
    let name = gateway.metadata.name.as_deref().unwrap_or_default();
    store.patch_gateway_status(namespace, name, &status).await
}

/// Surface a failed reconciliation on the gateway.
///
/// Publishes a Warning event and marks the gateway not ready. A failed
/// status patch is only logged.
pub async fn manage_error(store: &dyn ObjectStore, gateway: &ApplicationGateway, error: &Error) {
    store
        .publish_event(gateway, EventSeverity::Warning, "Failed", error.to_string())
        .await;

    let status = next_status(gateway, false, "Failed", error.to_string(), None);
    if let Err(e) = update_status(store, gateway, status).await {
        warn!(error = %e, "Could not mark the gateway as not ready");
    }
}
