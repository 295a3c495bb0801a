//! # Reconciliation Logic
//!
//! One pass over an `ApplicationGateway`:
//!
//! 1. Read the live Deployment (absent is fine)
//! 2. Resolve the configuration sources into one document
//! 3. Create or update the generated ConfigMap
//! 4. Plan and apply the next convergence step
//! 5. Update the status subresource
//!
//! Errors are surfaced as a Warning event and a not-ready status before they
//! are handed to the error policy for backoff.

use super::config_map::{discard_config_map, ensure_config_map};
use super::diff::{plan, DesiredWorkloadState, LiveWorkload, ReconcileAction};
use super::status::{manage_error, next_status, update_status};
use super::types::{resource_key, Reconciler, ReconcilerError};
use super::workload::{apply_scale, apply_update, render_deployment};
use crate::crd::ApplicationGateway;
use crate::error::Result;
use crate::observability::metrics;
use crate::source::sources_from_entries;
use crate::store::{EventSeverity, StoreResultExt};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, Instrument};

/// Reconcile one gateway
///
/// Backoff on failure is applied by the error policy, not here.
pub async fn reconcile(
    gateway: Arc<ApplicationGateway>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    let name = gateway.metadata.name.clone().unwrap_or_default();
    let namespace = gateway.metadata.namespace.clone().unwrap_or_default();

    let span = info_span!(
        "reconcile",
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        resource.kind = "ApplicationGateway"
    );

    async move {
        info!("Reconciling ApplicationGateway");
        metrics::increment_reconciliations();

        let result = reconcile_gateway(&gateway, &ctx).await;
        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

        match result {
            Ok(action) => {
                ctx.reset_backoff(&resource_key(&namespace, &name));
                Ok(action)
            }
            Err(e) => {
                manage_error(ctx.store.as_ref(), &gateway, &e).await;
                Err(ReconcilerError::Gateway(e))
            }
        }
    }
    .instrument(span)
    .await
}

async fn reconcile_gateway(gateway: &ApplicationGateway, ctx: &Reconciler) -> Result<Action> {
    let store = ctx.store.as_ref();
    let name = gateway.metadata.name.as_deref().unwrap_or_default();
    let namespace = gateway.metadata.namespace.as_deref().unwrap_or_default();

    let live = store.get_deployment(namespace, name).await.found()?;

    let sources = sources_from_entries(&gateway.spec.configuration)?;
    let document = ctx.resolver.resolve(namespace, &sources).await?.to_yaml()?;
    let generated = ensure_config_map(store, gateway, live.as_ref(), &document).await?;
    let (config_map_name, version) = (generated.name.as_str(), generated.version.as_str());

    let desired = DesiredWorkloadState::from_gateway(gateway, version, config_map_name);
    let action = plan(&desired, live.as_ref().map(LiveWorkload::from_deployment).as_ref());
    debug!(action = ?action, "Planned convergence step");

    let (requeue, message) = match (action, live) {
        (ReconcileAction::Create, _) => {
            let created = store
                .create_deployment(namespace, &render_deployment(gateway, &desired))
                .await;
            if let Err(e) = created {
                // Nothing records a fresh ConfigMap yet, a retry would generate another
                if generated.created {
                    discard_config_map(store, namespace, config_map_name).await;
                }
                return Err(e.into());
            }
            store
                .publish_event(
                    gateway,
                    EventSeverity::Normal,
                    "Created",
                    format!("Created Deployment {name} with config version {version}"),
                )
                .await;
            (Action::await_change(), "Deployment created".to_string())
        }
        (ReconcileAction::ScaleReplicas(replicas), Some(mut deployment)) => {
            apply_scale(&mut deployment, replicas);
            store.replace_deployment(namespace, &deployment).await?;
            info!(replicas, "Scaled gateway Deployment");
            (Action::await_change(), format!("Scaled to {replicas} replicas"))
        }
        (ReconcileAction::Update { change_cause }, Some(mut deployment)) => {
            apply_update(&mut deployment, &desired, &change_cause);
            store.replace_deployment(namespace, &deployment).await?;
            info!(change_cause = change_cause.as_str(), "Updated gateway Deployment");
            store
                .publish_event(gateway, EventSeverity::Normal, "Updated", change_cause.clone())
                .await;
            (Action::await_change(), change_cause)
        }
        _ => {
            metrics::increment_requeues("resync");
            (
                Action::requeue(ctx.config.resync_interval()),
                "Gateway is up to date".to_string(),
            )
        }
    };

    let status = next_status(
        gateway,
        true,
        "Reconciled",
        message,
        Some((desired.replicas, version, config_map_name)),
    );
    update_status(store, gateway, status).await?;

    Ok(requeue)
}
